#![allow(dead_code)]

use fnv::FnvHashMap as HashMap;
use nix::errno::Errno;

use fugue_breakpoints::arch::{debug_offset, Word, DEBUG_CONTROL_REG, DEBUG_STATUS_REG};
use fugue_breakpoints::{Config, DebuggedProcess, Memory, Pid, SymbolTable, UserArea};

pub const TEXT: Word = 0x40_1000;
pub const TEXT_END: Word = 0x40_2000;

pub fn setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn tid() -> Pid {
    Pid::from_raw(1337)
}

/// Debug registers and text of a tracee that only exists in memory.
#[derive(Debug, Default)]
pub struct FakeTarget {
    user: HashMap<(Pid, Word), Word>,
    memory: HashMap<Word, u8>,
    pub fail_user_writes: bool,
    pub fail_reads: bool,
    pub fail_writes: bool,
}

impl FakeTarget {
    /// Unpatched text reads as a byte derived from its address.
    pub fn pristine(address: Word) -> u8 {
        (address as u8) ^ 0x5a
    }

    pub fn byte(&self, address: Word) -> u8 {
        self.memory
            .get(&address)
            .copied()
            .unwrap_or_else(|| Self::pristine(address))
    }

    pub fn register(&self, tid: Pid, id: usize) -> Word {
        self.user.get(&(tid, debug_offset(id))).copied().unwrap_or(0)
    }

    pub fn control(&self, tid: Pid) -> Word {
        self.register(tid, DEBUG_CONTROL_REG)
    }

    pub fn set_register(&mut self, tid: Pid, id: usize, value: Word) {
        self.user.insert((tid, debug_offset(id)), value);
    }

    pub fn set_status(&mut self, tid: Pid, value: Word) {
        self.set_register(tid, DEBUG_STATUS_REG, value);
    }
}

impl UserArea for FakeTarget {
    fn peek_user(&self, tid: Pid, offset: Word) -> nix::Result<Word> {
        Ok(self.user.get(&(tid, offset)).copied().unwrap_or(0))
    }

    fn poke_user(&mut self, tid: Pid, offset: Word, value: Word) -> nix::Result<()> {
        if self.fail_user_writes {
            return Err(Errno::ESRCH.into());
        }
        self.user.insert((tid, offset), value);
        Ok(())
    }
}

impl Memory for FakeTarget {
    fn read_memory(&self, _tid: Pid, address: Word, buffer: &mut [u8]) -> nix::Result<()> {
        if self.fail_reads {
            return Err(Errno::EIO.into());
        }
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = self.byte(address + i as Word);
        }
        Ok(())
    }

    fn write_memory(&mut self, _tid: Pid, address: Word, buffer: &[u8]) -> nix::Result<()> {
        if self.fail_writes {
            return Err(Errno::EIO.into());
        }
        for (i, byte) in buffer.iter().enumerate() {
            self.memory.insert(address + i as Word, *byte);
        }
        Ok(())
    }
}

pub fn symbols() -> SymbolTable {
    let mut table = SymbolTable::new();
    table
        .insert_function("main", "main.c", TEXT..TEXT + 0x800, 10)
        .insert_function("worker", "worker.c", TEXT + 0x800..TEXT_END, 40);
    for i in 0..0x20 {
        table.insert_line(TEXT + i * 0x40, 11 + i as u32);
    }
    table
}

pub type Process = DebuggedProcess<SymbolTable, FakeTarget>;

pub fn process() -> Process {
    process_with(&Config::default())
}

pub fn process_with(config: &Config) -> Process {
    setup();
    DebuggedProcess::with_target(symbols(), FakeTarget::default(), config)
}

pub fn software_only() -> Process {
    let mut config = Config::default();
    config.hardware.slots = 0;
    process_with(&config)
}
