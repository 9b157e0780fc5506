use nix::errno::Errno;
use nix::libc;
use nix::sys::ptrace::{AddressType, Request, RequestType};
use nix::unistd::Pid;

use std::os::raw::{c_long, c_void};

use crate::arch::Word;

pub trait AsPid {
    fn as_pid(self) -> Pid;
}

impl AsPid for Pid {
    fn as_pid(self) -> Pid {
        self
    }
}

#[repr(transparent)]
pub struct AddressLike(AddressType);

impl From<Word> for AddressLike {
    fn from(t: Word) -> Self {
        Self(t as _)
    }
}

#[repr(transparent)]
pub struct DataLike(*mut c_void);

impl From<Word> for DataLike {
    fn from(t: Word) -> Self {
        Self(t as _)
    }
}

pub(crate) fn ptrace<A, D>(request: Request, pid: Pid, addr: A, data: D) -> nix::Result<c_long>
where A: Into<AddressLike>,
      D: Into<DataLike> {

    let addr = addr.into();
    let data = data.into();

    unsafe {
        Errno::result(libc::ptrace(request as RequestType, libc::pid_t::from(pid), addr.0, data.0))
    }
}

/// PEEK* requests return the word read, so -1 is only an error when errno
/// was raised by the call.
pub(crate) fn ptrace_peek<A>(request: Request, pid: Pid, addr: A) -> nix::Result<c_long>
where A: Into<AddressLike> {

    let addr = addr.into();

    Errno::clear();
    let value = unsafe {
        libc::ptrace(request as RequestType, libc::pid_t::from(pid), addr.0, std::ptr::null_mut::<c_void>())
    };

    match Errno::last() {
        Errno::UnknownErrno => Ok(value),
        _ if value != -1 => Ok(value),
        errno => Err(errno.into()),
    }
}
