use serde::Serialize;

use crate::arch::Word;
use crate::symbol::Location;

pub mod hardware;
pub mod software;

pub type Id = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Hardware,
    Software,
}

/// A breakpoint tracked by a [`DebuggedProcess`](crate::DebuggedProcess).
///
/// Software breakpoints carry the bytes their trap instruction replaced;
/// hardware breakpoints never touch memory and carry none.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Breakpoint {
    id: Id,
    address: Word,
    function: String,
    file: String,
    line: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    original: Vec<u8>,
}

impl Breakpoint {
    pub(crate) fn new(id: Id, address: Word, location: Location, original: Vec<u8>) -> Self {
        Self {
            id,
            address,
            function: location.function,
            file: location.file,
            line: location.line,
            original,
        }
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn address(&self) -> Word {
        self.address
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn original(&self) -> &[u8] {
        &self.original
    }

    pub fn kind(&self) -> Kind {
        if self.original.is_empty() {
            Kind::Hardware
        } else {
            Kind::Software
        }
    }

    pub fn is_hardware(&self) -> bool {
        matches!(self.kind(), Kind::Hardware)
    }

    pub fn is_software(&self) -> bool {
        matches!(self.kind(), Kind::Software)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    Hardware(usize),
    Software,
}

/// The breakpoints of one process, whichever store holds them. An address is
/// never present in both.
#[derive(Debug, Clone, Default)]
pub struct Breakpoints {
    hardware: hardware::Slots,
    software: software::Patches,
}

impl Breakpoints {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, address: Word) -> bool {
        self.placement(address).is_some()
    }

    pub fn placement(&self, address: Word) -> Option<Placement> {
        if let Some(slot) = self.hardware.position(address) {
            Some(Placement::Hardware(slot))
        } else if self.software.contains(address) {
            Some(Placement::Software)
        } else {
            None
        }
    }

    pub fn get(&self, address: Word) -> Option<&Breakpoint> {
        match self.placement(address)? {
            Placement::Hardware(slot) => self.hardware.get(slot),
            Placement::Software => self.software.get(address),
        }
    }

    pub(crate) fn insert(&mut self, placement: Placement, breakpoint: Breakpoint) {
        debug_assert!(!self.exists(breakpoint.address()));
        match placement {
            Placement::Hardware(slot) => self.hardware.insert(slot, breakpoint),
            Placement::Software => self.software.insert(breakpoint),
        }
    }

    pub(crate) fn remove(&mut self, address: Word) -> Option<(Placement, Breakpoint)> {
        let placement = self.placement(address)?;
        let breakpoint = match placement {
            Placement::Hardware(slot) => self.hardware.take(slot),
            Placement::Software => self.software.remove(address),
        }?;
        Some((placement, breakpoint))
    }

    pub fn hardware(&self) -> &hardware::Slots {
        &self.hardware
    }

    pub fn software(&self) -> &software::Patches {
        &self.software
    }

    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint> {
        self.hardware
            .iter()
            .map(|(_, bp)| bp)
            .chain(self.software.iter())
    }

    pub fn len(&self) -> usize {
        self.hardware.len() + self.software.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
