use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::arch::MAX_BREAKPOINTS;
use crate::breakpoint::Id;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not read configuration {0:?}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("could not parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Hardware {
    /// Debug register slots the registry may place breakpoints in; zero
    /// forces every breakpoint into memory.
    pub slots: usize,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            slots: MAX_BREAKPOINTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Ids {
    pub first: Id,
}

impl Default for Ids {
    fn default() -> Self {
        Self { first: 1 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub hardware: Hardware,
    pub ids: Ids,
}

impl Config {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| Error::Read(path.to_owned(), e))?;
        text.parse()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.hardware.slots > MAX_BREAKPOINTS {
            return Err(Error::Invalid(format!(
                "hardware.slots is {} but only {} debug registers exist",
                self.hardware.slots, MAX_BREAKPOINTS
            )));
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
