#[cfg(target_pointer_width = "64")]
pub type Word = u64;
#[cfg(target_pointer_width = "32")]
pub type Word = u32;

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod x86 {
    use bitflags::bitflags;
    use log::trace;
    use nix::unistd::Pid;

    use std::mem::size_of;

    use crate::breakpoint::hardware::Error;
    use crate::target::UserArea;

    use super::Word;

    pub const MAX_BREAKPOINTS: usize = 4;

    pub const DEBUG_STATUS_REG: usize = 6;
    pub const DEBUG_CONTROL_REG: usize = 7;

    /// `int3`
    pub const TRAP_INSN: [u8; 1] = [0xcc];

    const DR_ENABLE_SIZE: u32 = 2;
    const DR_CONTROL_SHIFT: u32 = 16;
    const DR_CONTROL_SIZE: u32 = 4;

    const DR_RW_EXECUTE: u8 = 0b00;
    const DR_LEN_1: u8 = 0b00;

    const fn dr7_enable_field_shift(i: usize) -> u32 {
        (i as u32).wrapping_mul(DR_ENABLE_SIZE)
    }

    const fn dr7_kind_field_shift(i: usize) -> u32 {
        (i as u32).wrapping_mul(DR_CONTROL_SIZE).wrapping_add(DR_CONTROL_SHIFT)
    }

    const fn dr7_len_field_shift(i: usize) -> u32 {
        dr7_kind_field_shift(i).wrapping_add(2)
    }

    #[inline(always)]
    fn dr7_breakpoint_enabled(i: usize) -> Word {
        (1 as Word).checked_shl(dr7_enable_field_shift(i)).unwrap_or(0)
    }

    #[inline(always)]
    fn dr7_enable_mask(i: usize) -> Word {
        (((1 as Word) << DR_ENABLE_SIZE) - 1)
            .checked_shl(dr7_enable_field_shift(i))
            .unwrap_or(0)
    }

    #[inline(always)]
    fn dr7_control_mask(i: usize) -> Word {
        (((1 as Word) << DR_CONTROL_SIZE) - 1)
            .checked_shl(dr7_kind_field_shift(i))
            .unwrap_or(0)
    }

    #[inline(always)]
    fn dr7_kind_field(i: usize, kind: u8) -> Word {
        (kind as Word)
            .checked_shl(dr7_kind_field_shift(i))
            .unwrap_or(0)
    }

    #[inline(always)]
    fn dr7_len_field(i: usize, len: u8) -> Word {
        (len as Word)
            .checked_shl(dr7_len_field_shift(i))
            .unwrap_or(0)
    }

    /// Byte offset of `u_debugreg[index]` within the thread's `struct user`.
    pub fn debug_offset(index: usize) -> Word {
        (std::mem::offset_of!(libc::user, u_debugreg) + index * size_of::<Word>()) as Word
    }

    /// Address of the trap instruction that reported a stop at `pc`.
    pub fn trap_address(pc: Word) -> Word {
        pc.wrapping_sub(TRAP_INSN.len() as Word)
    }

    bitflags! {
        pub struct Status: Word {
            const B0 = 0x0001;
            const B1 = 0x0002;
            const B2 = 0x0004;
            const B3 = 0x0008;
            const BD = 0x2000;
            const BS = 0x4000;
            const BT = 0x8000;
        }
    }

    impl Status {
        pub fn slots() -> Self {
            Self::B0 | Self::B1 | Self::B2 | Self::B3
        }

        pub fn triggered(&self) -> Option<usize> {
            (0..MAX_BREAKPOINTS).find(|i| self.bits() & (1 << i) != 0)
        }
    }

    /// Debug registers of a single stopped thread.
    pub struct DebugRegisters<'a, U: ?Sized> {
        user: &'a mut U,
        pid: Pid,
    }

    impl<'a, U: UserArea + ?Sized> DebugRegisters<'a, U> {
        pub fn new(user: &'a mut U, pid: Pid) -> Self {
            Self { user, pid }
        }

        pub fn pid(&self) -> Pid {
            self.pid
        }

        pub fn read_register(&self, id: usize) -> nix::Result<Word> {
            self.user.peek_user(self.pid, debug_offset(id))
        }

        pub fn write_register(&mut self, id: usize, value: Word) -> nix::Result<()> {
            trace!("{}: dr{} <- {:#x}", self.pid, id, value);
            self.user.poke_user(self.pid, debug_offset(id), value)
        }

        pub fn control(&self) -> Result<Word, Error> {
            Ok(self.read_register(DEBUG_CONTROL_REG)?)
        }

        pub fn status(&self) -> Result<Status, Error> {
            Ok(Status::from_bits_truncate(self.read_register(DEBUG_STATUS_REG)?))
        }

        pub fn is_armed(&self, slot: usize) -> Result<bool, Error> {
            Self::check_slot(slot)?;
            Ok(self.control()? & dr7_enable_mask(slot) != 0)
        }

        /// Programs `slot` to trap on execution of `address`. An `address` of
        /// zero disarms the slot instead.
        pub fn arm(&mut self, slot: usize, address: Word) -> Result<(), Error> {
            Self::check_slot(slot)?;

            let mut control = self.control()?;
            let mask = dr7_enable_mask(slot) | dr7_control_mask(slot);

            if address == 0 {
                control &= !mask;
                self.write_register(DEBUG_CONTROL_REG, control)?;
                return Ok(());
            }

            if control & dr7_enable_mask(slot) != 0 {
                return Err(Error::SlotAlreadyArmed(slot));
            }

            self.write_register(slot, address)?;

            control &= !mask;
            control |= dr7_kind_field(slot, DR_RW_EXECUTE)
                | dr7_len_field(slot, DR_LEN_1)
                | dr7_breakpoint_enabled(slot);

            self.write_register(DEBUG_CONTROL_REG, control)?;

            Ok(())
        }

        /// Clears the enable and mode bits of `slot`, whatever it holds.
        pub fn disarm(&mut self, slot: usize) -> Result<(), Error> {
            self.arm(slot, 0)
        }

        /// Slot whose condition was reported by the last debug exception.
        pub fn triggered(&self) -> Result<Option<usize>, Error> {
            Ok(self.status()?.triggered())
        }

        pub fn acknowledge(&mut self) -> Result<(), Error> {
            let status = self.read_register(DEBUG_STATUS_REG)?;
            self.write_register(DEBUG_STATUS_REG, status & !Status::slots().bits())?;
            Ok(())
        }

        pub fn reset(&mut self) -> Result<(), Error> {
            self.write_register(DEBUG_CONTROL_REG, 0)?;
            self.write_register(DEBUG_STATUS_REG, 0)?;
            for i in 0..MAX_BREAKPOINTS {
                self.write_register(i, 0)?;
            }
            Ok(())
        }

        fn check_slot(slot: usize) -> Result<(), Error> {
            if slot < MAX_BREAKPOINTS {
                Ok(())
            } else {
                Err(Error::InvalidSlot(slot))
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use fnv::FnvHashMap as HashMap;
        use nix::errno::Errno;

        #[derive(Default)]
        struct Area {
            words: HashMap<Word, Word>,
            fail_writes: bool,
        }

        impl UserArea for Area {
            fn peek_user(&self, _tid: Pid, offset: Word) -> nix::Result<Word> {
                Ok(self.words.get(&offset).copied().unwrap_or(0))
            }

            fn poke_user(&mut self, _tid: Pid, offset: Word, value: Word) -> nix::Result<()> {
                if self.fail_writes {
                    return Err(Errno::ESRCH.into());
                }
                self.words.insert(offset, value);
                Ok(())
            }
        }

        impl Area {
            fn reg(&self, id: usize) -> Word {
                self.words.get(&debug_offset(id)).copied().unwrap_or(0)
            }
        }

        fn pid() -> Pid {
            Pid::from_raw(4242)
        }

        #[test]
        fn offsets_follow_user_layout() {
            assert_eq!(debug_offset(1) - debug_offset(0), size_of::<Word>() as Word);
            assert_eq!(debug_offset(7) - debug_offset(0), 7 * size_of::<Word>() as Word);
        }

        #[test]
        fn arm_sets_address_and_local_enable() {
            let mut area = Area::default();
            let mut regs = DebugRegisters::new(&mut area, pid());

            regs.arm(2, 0x401000).unwrap();
            assert!(regs.is_armed(2).unwrap());
            assert!(!regs.is_armed(0).unwrap());

            assert_eq!(area.reg(2), 0x401000);
            assert_eq!(area.reg(DEBUG_CONTROL_REG), 1 << 4);
        }

        #[test]
        fn arm_clears_stale_mode_bits() {
            let mut area = Area::default();
            // slot 1 disabled but left with write/4-byte mode bits
            area.words.insert(debug_offset(DEBUG_CONTROL_REG), 0b1101 << 20 | 1);

            let mut regs = DebugRegisters::new(&mut area, pid());
            regs.arm(1, 0x1000).unwrap();

            assert_eq!(area.reg(DEBUG_CONTROL_REG), 1 | 1 << 2);
        }

        #[test]
        fn arm_refuses_live_slot() {
            let mut area = Area::default();
            let mut regs = DebugRegisters::new(&mut area, pid());

            regs.arm(0, 0x1000).unwrap();
            assert!(matches!(regs.arm(0, 0x2000), Err(Error::SlotAlreadyArmed(0))));
            assert_eq!(area.reg(0), 0x1000);
        }

        #[test]
        fn global_enable_counts_as_armed() {
            let mut area = Area::default();
            area.words.insert(debug_offset(DEBUG_CONTROL_REG), 1 << 7);

            let mut regs = DebugRegisters::new(&mut area, pid());
            assert!(matches!(regs.arm(3, 0x1000), Err(Error::SlotAlreadyArmed(3))));
        }

        #[test]
        fn invalid_slot() {
            let mut area = Area::default();
            let mut regs = DebugRegisters::new(&mut area, pid());

            assert!(matches!(regs.arm(4, 0x1000), Err(Error::InvalidSlot(4))));
            assert!(matches!(regs.disarm(9), Err(Error::InvalidSlot(9))));
            assert!(area.words.is_empty());
        }

        #[test]
        fn disarm_only_touches_its_slot() {
            let mut area = Area::default();
            let mut regs = DebugRegisters::new(&mut area, pid());

            for slot in 0..MAX_BREAKPOINTS {
                regs.arm(slot, 0x1000 * (slot as Word + 1)).unwrap();
            }
            regs.disarm(1).unwrap();

            assert!(regs.is_armed(0).unwrap());
            assert!(!regs.is_armed(1).unwrap());
            assert!(regs.is_armed(2).unwrap());
            assert!(regs.is_armed(3).unwrap());

            // the address register is left as it was
            assert_eq!(area.reg(1), 0x2000);
        }

        #[test]
        fn arm_with_zero_address_disarms() {
            let mut area = Area::default();
            let mut regs = DebugRegisters::new(&mut area, pid());

            regs.arm(3, 0x1000).unwrap();
            regs.arm(3, 0).unwrap();
            assert!(!regs.is_armed(3).unwrap());
            assert_eq!(area.reg(DEBUG_CONTROL_REG), 0);
        }

        #[test]
        fn register_failures_propagate() {
            let mut area = Area {
                fail_writes: true,
                ..Area::default()
            };
            let mut regs = DebugRegisters::new(&mut area, pid());

            assert!(matches!(
                regs.arm(0, 0x1000),
                Err(Error::Register(nix::Error::Sys(Errno::ESRCH)))
            ));
        }

        #[test]
        fn status_reports_lowest_slot() {
            let mut area = Area::default();
            area.words.insert(debug_offset(DEBUG_STATUS_REG), 0x4000 | 0b1100);

            let mut regs = DebugRegisters::new(&mut area, pid());
            assert_eq!(regs.triggered().unwrap(), Some(2));
            assert!(regs.status().unwrap().contains(Status::BS));

            regs.acknowledge().unwrap();
            assert_eq!(regs.triggered().unwrap(), None);
            assert_eq!(area.reg(DEBUG_STATUS_REG), 0x4000);
        }

        #[test]
        fn reset_zeroes_everything() {
            let mut area = Area::default();
            let mut regs = DebugRegisters::new(&mut area, pid());

            regs.arm(0, 0x1000).unwrap();
            regs.reset().unwrap();

            assert!(area.words.values().all(|v| *v == 0));
        }

        #[test]
        fn trap_address_points_at_int3() {
            assert_eq!(trap_address(0x401001), 0x401000);
        }
    }
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub use self::x86::*;
