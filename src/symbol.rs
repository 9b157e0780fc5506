use nix::unistd::Pid;
use thiserror::Error;

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;

use crate::arch::Word;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read mappings of `{0}`: {1}")]
    Mappings(Pid, String),
}

/// Source location of an address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub function: String,
    pub file: String,
    pub line: u32,
}

pub trait SymbolResolver {
    /// `None` when `address` is not known code.
    fn resolve(&self, address: Word) -> Option<Location>;
}

impl<R: SymbolResolver + ?Sized> SymbolResolver for &R {
    fn resolve(&self, address: Word) -> Option<Location> {
        (**self).resolve(address)
    }
}

impl<R: SymbolResolver + ?Sized> SymbolResolver for Box<R> {
    fn resolve(&self, address: Word) -> Option<Location> {
        (**self).resolve(address)
    }
}

#[derive(Debug, Clone)]
struct Function {
    name: String,
    file: String,
    end: Word,
    line: u32,
}

/// Function ranges and line starts, filled in by whoever owns the symbol
/// information of the tracee.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    functions: BTreeMap<Word, Function>,
    lines: BTreeMap<Word, u32>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a function covering `range`, declared at `line` of `file`.
    pub fn insert_function<N, F>(&mut self, name: N, file: F, range: Range<Word>, line: u32) -> &mut Self
    where N: Into<String>,
          F: Into<String> {
        self.functions.insert(
            range.start,
            Function {
                name: name.into(),
                file: file.into(),
                end: range.end,
                line,
            },
        );
        self
    }

    /// Records that the code for `line` starts at `address`.
    pub fn insert_line(&mut self, address: Word, line: u32) -> &mut Self {
        self.lines.insert(address, line);
        self
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl SymbolResolver for SymbolTable {
    fn resolve(&self, address: Word) -> Option<Location> {
        let (start, function) = self.functions.range(..=address).next_back()?;
        if address >= function.end {
            return None;
        }

        let line = self
            .lines
            .range(*start..=address)
            .next_back()
            .map(|(_, line)| *line)
            .unwrap_or(function.line);

        Some(Location {
            function: function.name.clone(),
            file: function.file.clone(),
            line,
        })
    }
}

/// An executable, file-backed mapping of the tracee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub range: Range<Word>,
    pub offset: Word,
    pub path: String,
}

/// Resolves addresses to `module+offset` using the tracee's memory map, for
/// targets without line information. Lines are always reported as 0.
#[derive(Debug, Clone, Default)]
pub struct MappingsResolver {
    regions: Vec<Region>,
}

impl MappingsResolver {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    pub fn from_pid(pid: Pid) -> Result<Self, Error> {
        let mappings = procmaps::Mappings::from_pid(pid.as_raw())
            .map_err(|e| Error::Mappings(pid, format!("{:?}", e)))?;

        let regions = mappings
            .iter()
            .filter(|m| m.perms.executable)
            .filter_map(|m| match m.pathname {
                procmaps::Path::MappedFile(ref path) => Some(Region {
                    range: m.base as Word..m.ceiling as Word,
                    offset: m.offset as Word,
                    path: path.clone(),
                }),
                _ => None,
            })
            .collect();

        Ok(Self::new(regions))
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }
}

impl SymbolResolver for MappingsResolver {
    fn resolve(&self, address: Word) -> Option<Location> {
        let region = self.regions.iter().find(|r| r.range.contains(&address))?;
        let module = Path::new(&region.path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| region.path.clone());
        let offset = address - region.range.start + region.offset;

        Some(Location {
            function: format!("{}+{:#x}", module, offset),
            file: region.path.clone(),
            line: 0,
        })
    }
}
