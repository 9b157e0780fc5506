pub mod arch;
pub mod breakpoint;
pub mod config;
pub mod process;
pub mod symbol;
pub mod target;
mod util;

pub use nix::unistd::Pid;
pub use nix::Error as SystemError;

pub use breakpoint::{Breakpoint, Id, Kind};
pub use config::Config;
pub use process::{DebuggedProcess, Error, SharedProcess};
pub use symbol::{Location, SymbolResolver, SymbolTable};
pub use target::{Memory, Ptrace, Target, UserArea};
pub use util::AsPid;
