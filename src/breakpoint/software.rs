use fnv::FnvHashMap as HashMap;

use crate::arch::Word;
use crate::breakpoint::Breakpoint;

/// Breakpoints patched into the tracee's text, keyed by address.
#[derive(Debug, Clone, Default)]
pub struct Patches {
    patches: HashMap<Word, Breakpoint>,
}

impl Patches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, address: Word) -> bool {
        self.patches.contains_key(&address)
    }

    pub fn get(&self, address: Word) -> Option<&Breakpoint> {
        self.patches.get(&address)
    }

    pub(crate) fn insert(&mut self, breakpoint: Breakpoint) {
        debug_assert!(!breakpoint.original().is_empty());
        self.patches.insert(breakpoint.address(), breakpoint);
    }

    pub(crate) fn remove(&mut self, address: Word) -> Option<Breakpoint> {
        self.patches.remove(&address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.patches.values()
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}
