use thiserror::Error;

use crate::arch::{Word, MAX_BREAKPOINTS};
use crate::breakpoint::Breakpoint;

#[derive(Debug, Error)]
pub enum Error {
    #[error("debug register slot {0} does not exist")]
    InvalidSlot(usize),
    #[error("debug register slot {0} is already armed")]
    SlotAlreadyArmed(usize),
    #[error("debug register access failed: {0}")]
    Register(#[from] nix::Error),
}

/// Breakpoints held in debug registers; the index of an entry is the index of
/// the register that encodes it.
#[derive(Debug, Clone, Default)]
pub struct Slots {
    slots: [Option<Breakpoint>; MAX_BREAKPOINTS],
}

impl Slots {
    pub fn new() -> Self {
        Self::default()
    }

    /// First empty slot below `limit`.
    pub fn free_slot(&self, limit: usize) -> Option<usize> {
        self.slots
            .iter()
            .take(limit)
            .position(Option::is_none)
    }

    pub fn position(&self, address: Word) -> Option<usize> {
        self.slots
            .iter()
            .position(|bp| matches!(bp, Some(bp) if bp.address() == address))
    }

    pub fn get(&self, slot: usize) -> Option<&Breakpoint> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub(crate) fn insert(&mut self, slot: usize, breakpoint: Breakpoint) {
        debug_assert!(self.slots[slot].is_none());
        self.slots[slot] = Some(breakpoint);
    }

    pub(crate) fn take(&mut self, slot: usize) -> Option<Breakpoint> {
        self.slots.get_mut(slot).and_then(Option::take)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Breakpoint)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, bp)| bp.as_ref().map(|bp| (i, bp)))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|bp| bp.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
