use log::{debug, warn};
use parking_lot::Mutex;
use thiserror::Error;

use std::sync::Arc;

use crate::arch::{self, DebugRegisters, Word, MAX_BREAKPOINTS, TRAP_INSN};
use crate::breakpoint::hardware as hwbp;
use crate::breakpoint::{Breakpoint, Breakpoints, Id, Placement};
use crate::config::Config;
use crate::symbol::SymbolResolver;
use crate::target::{Ptrace, Target};
use crate::util::AsPid;

#[derive(Debug, Error)]
pub enum Error {
    #[error("address {0:#x} does not map to known code")]
    InvalidAddress(Word),
    #[error("breakpoint already exists at {file}:{line} ({address:#x})")]
    BreakpointExists {
        file: String,
        line: u32,
        address: Word,
    },
    #[error("hardware breakpoint: {0}")]
    Hardware(#[from] hwbp::Error),
    #[error("memory read at {0:#x} failed: {1}")]
    MemoryRead(Word, nix::Error),
    #[error("memory write at {0:#x} failed: {1}")]
    MemoryWrite(Word, nix::Error),
    #[error("could not clear breakpoint at {0:#x}: {1}")]
    ClearFailed(Word, nix::Error),
    #[error("no breakpoint set at {0:#x}")]
    NoSuchBreakpoint(Word),
    #[error("no breakpoint ids left after {0}")]
    IdsExhausted(Id),
    #[error("cleared {} breakpoints before failing: {source}", .cleared.len())]
    PartiallyCleared {
        cleared: Vec<Breakpoint>,
        #[source]
        source: Box<Error>,
    },
}

/// A registry behind a lock that is held for each whole operation.
pub type SharedProcess<R, T = Ptrace> = Arc<Mutex<DebuggedProcess<R, T>>>;

/// Breakpoint state of one traced process.
///
/// Breakpoints are placed in a free debug register when the configuration
/// allows it and patched into memory with a trap instruction otherwise. Debug
/// registers are per thread: a hardware breakpoint is armed on the thread it
/// was set through, and [`install_hardware`](Self::install_hardware) copies
/// the current slots onto any other thread the caller wants covered.
/// Clearing only disarms the thread passed to
/// [`clear_breakpoint`](Self::clear_breakpoint); callers re-run
/// `install_hardware` on such sibling threads afterwards, or their stale slots
/// make later placements there fail with `SlotAlreadyArmed`.
pub struct DebuggedProcess<R, T = Ptrace> {
    resolver: R,
    target: T,
    breakpoints: Breakpoints,
    hardware_slots: usize,
    next_id: Id,
}

impl<R: SymbolResolver> DebuggedProcess<R, Ptrace> {
    pub fn new(resolver: R) -> Self {
        Self::with_target(resolver, Ptrace, &Config::default())
    }
}

impl<R: SymbolResolver, T: Target> DebuggedProcess<R, T> {
    pub fn with_target(resolver: R, target: T, config: &Config) -> Self {
        Self {
            resolver,
            target,
            breakpoints: Breakpoints::new(),
            hardware_slots: config.hardware.slots.min(MAX_BREAKPOINTS),
            next_id: config.ids.first,
        }
    }

    pub fn into_shared(self) -> SharedProcess<R, T> {
        Arc::new(Mutex::new(self))
    }

    pub fn resolver(&self) -> &R {
        &self.resolver
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn exists(&self, address: Word) -> bool {
        self.breakpoints.exists(address)
    }

    pub fn breakpoint(&self, address: Word) -> Option<&Breakpoint> {
        self.breakpoints.get(address)
    }

    /// All breakpoints, oldest first.
    pub fn breakpoints(&self) -> Vec<&Breakpoint> {
        let mut bps = self.breakpoints.iter().collect::<Vec<_>>();
        bps.sort_by_key(|bp| bp.id());
        bps
    }

    /// Debug register slot holding the breakpoint at `address`.
    pub fn slot(&self, address: Word) -> Option<usize> {
        match self.breakpoints.placement(address)? {
            Placement::Hardware(slot) => Some(slot),
            Placement::Software => None,
        }
    }

    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }

    pub fn set_breakpoint<P: AsPid>(&mut self, tid: P, address: Word) -> Result<Breakpoint, Error> {
        let tid = tid.as_pid();

        // zero is the disarm sentinel of the debug register controller
        if address == 0 {
            return Err(Error::InvalidAddress(address));
        }

        let location = self
            .resolver
            .resolve(address)
            .ok_or(Error::InvalidAddress(address))?;

        if let Some(bp) = self.breakpoints.get(address) {
            return Err(Error::BreakpointExists {
                file: bp.file().to_owned(),
                line: bp.line(),
                address,
            });
        }

        let id = self.next_id;
        let next_id = id.checked_add(1).ok_or(Error::IdsExhausted(id))?;

        if let Some(slot) = self.breakpoints.hardware().free_slot(self.hardware_slots) {
            DebugRegisters::new(&mut self.target, tid).arm(slot, address)?;

            self.next_id = next_id;
            let bp = Breakpoint::new(id, address, location, Vec::new());
            debug!(
                "{}: breakpoint {} at {:#x} ({}) in dr{}",
                tid, bp.id(), address, bp.function(), slot
            );

            self.breakpoints.insert(Placement::Hardware(slot), bp.clone());
            return Ok(bp);
        }

        let mut original = vec![0u8; TRAP_INSN.len()];
        self.target
            .read_memory(tid, address, &mut original)
            .map_err(|e| Error::MemoryRead(address, e))?;
        self.target
            .write_memory(tid, address, &TRAP_INSN)
            .map_err(|e| Error::MemoryWrite(address, e))?;

        self.next_id = next_id;
        let bp = Breakpoint::new(id, address, location, original);
        debug!(
            "{}: breakpoint {} at {:#x} ({}) patched over {:02x?}",
            tid, bp.id(), address, bp.function(), bp.original()
        );

        self.breakpoints.insert(Placement::Software, bp.clone());
        Ok(bp)
    }

    pub fn clear_breakpoint<P: AsPid>(&mut self, tid: P, address: Word) -> Result<Breakpoint, Error> {
        let tid = tid.as_pid();

        match self.breakpoints.placement(address) {
            Some(Placement::Hardware(slot)) => {
                DebugRegisters::new(&mut self.target, tid).disarm(slot)?;
            }
            Some(Placement::Software) => {
                let original = self
                    .breakpoints
                    .software()
                    .get(address)
                    .map(Breakpoint::original)
                    .unwrap_or_default();

                if let Err(e) = self.target.write_memory(tid, address, original) {
                    warn!("{}: could not restore {:#x}: {}", tid, address, e);
                    return Err(Error::ClearFailed(address, e));
                }
            }
            None => return Err(Error::NoSuchBreakpoint(address)),
        }

        let (_, bp) = self
            .breakpoints
            .remove(address)
            .ok_or(Error::NoSuchBreakpoint(address))?;

        debug!("{}: cleared breakpoint {} at {:#x}", tid, bp.id(), address);

        Ok(bp)
    }

    /// Clears every breakpoint, oldest first. On failure the breakpoint that
    /// could not be cleared and all later ones stay in place, and the records
    /// already removed are handed back in [`Error::PartiallyCleared`].
    pub fn clear_all<P: AsPid>(&mut self, tid: P) -> Result<Vec<Breakpoint>, Error> {
        let tid = tid.as_pid();
        let addresses = self
            .breakpoints()
            .into_iter()
            .map(Breakpoint::address)
            .collect::<Vec<_>>();

        let mut cleared = Vec::with_capacity(addresses.len());
        for address in addresses {
            match self.clear_breakpoint(tid, address) {
                Ok(bp) => cleared.push(bp),
                Err(e) => {
                    return Err(Error::PartiallyCleared {
                        cleared,
                        source: Box::new(e),
                    })
                }
            }
        }

        Ok(cleared)
    }

    /// Breakpoint whose debug register condition stopped `tid`, if any. The
    /// status bits are cleared so the next stop is not attributed to it again.
    pub fn hardware_hit<P: AsPid>(&mut self, tid: P) -> Result<Option<&Breakpoint>, Error> {
        let mut regs = DebugRegisters::new(&mut self.target, tid.as_pid());

        let slot = match regs.triggered()? {
            Some(slot) => slot,
            None => return Ok(None),
        };
        regs.acknowledge()?;

        Ok(self.breakpoints.hardware().get(slot))
    }

    /// Software breakpoint whose trap left the program counter at `pc`.
    pub fn software_hit(&self, pc: Word) -> Option<&Breakpoint> {
        self.breakpoints.software().get(arch::trap_address(pc))
    }

    /// Resets the debug registers of `tid` and arms every occupied slot on
    /// it, so the thread traps on the same hardware breakpoints.
    pub fn install_hardware<P: AsPid>(&mut self, tid: P) -> Result<(), Error> {
        let tid = tid.as_pid();
        let mut regs = DebugRegisters::new(&mut self.target, tid);

        regs.reset()?;
        for (slot, bp) in self.breakpoints.hardware().iter() {
            regs.arm(slot, bp.address())?;
        }

        debug!(
            "{}: installed {} hardware breakpoints",
            tid,
            self.breakpoints.hardware().len()
        );

        Ok(())
    }
}
