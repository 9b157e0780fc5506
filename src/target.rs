use nix::sys::ptrace::Request as PTraceRequest;
use nix::unistd::Pid;

use std::mem::size_of;

use crate::arch::Word;
use crate::util::{ptrace, ptrace_peek};

/// Word-sized access to the user area of a stopped thread: the storage
/// `PTRACE_PEEKUSER`/`PTRACE_POKEUSER` operate on, which includes the debug
/// registers.
pub trait UserArea {
    fn peek_user(&self, tid: Pid, offset: Word) -> nix::Result<Word>;
    fn poke_user(&mut self, tid: Pid, offset: Word, value: Word) -> nix::Result<()>;
}

/// Raw access to the address space of the traced process.
pub trait Memory {
    fn read_memory(&self, tid: Pid, address: Word, buffer: &mut [u8]) -> nix::Result<()>;
    fn write_memory(&mut self, tid: Pid, address: Word, buffer: &[u8]) -> nix::Result<()>;
}

/// Everything the registry needs from a tracee.
pub trait Target: UserArea + Memory {}

impl<T: UserArea + Memory> Target for T {}

/// A [`Target`] backed directly by ptrace(2) on the calling thread's tracees.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ptrace;

impl UserArea for Ptrace {
    fn peek_user(&self, tid: Pid, offset: Word) -> nix::Result<Word> {
        ptrace_peek(PTraceRequest::PTRACE_PEEKUSER, tid, offset).map(|v| v as Word)
    }

    fn poke_user(&mut self, tid: Pid, offset: Word, value: Word) -> nix::Result<()> {
        ptrace(PTraceRequest::PTRACE_POKEUSER, tid, offset, value).map(|_| ())
    }
}

impl Memory for Ptrace {
    fn read_memory(&self, tid: Pid, address: Word, buffer: &mut [u8]) -> nix::Result<()> {
        let mut addr = address;
        let mut data = [0u8; size_of::<Word>()];
        let mut offset = size_of::<Word>();

        for byte in buffer.iter_mut() {
            if offset == size_of::<Word>() {
                offset = addr as usize & (size_of::<Word>() - 1);
                addr -= offset as Word;
                let d = ptrace_peek(PTraceRequest::PTRACE_PEEKDATA, tid, addr)?;
                data.copy_from_slice(&(d as Word).to_ne_bytes()[..]);
                addr += size_of::<Word>() as Word;
            }

            *byte = data[offset];
            offset += 1;
        }

        Ok(())
    }

    fn write_memory(&mut self, tid: Pid, address: Word, buffer: &[u8]) -> nix::Result<()> {
        let mut addr = address;
        let mut data = [0u8; size_of::<Word>()];
        let mut to_write = buffer.len();
        let mut buf_pos = 0;

        let mut align_off = addr as usize % size_of::<Word>();
        if align_off != 0 {
            addr -= align_off as Word;
        }

        while to_write != 0 {
            let size = (size_of::<Word>() - align_off).min(to_write);

            // partial words keep the bytes around the patch
            if size != size_of::<Word>() {
                let d = ptrace_peek(PTraceRequest::PTRACE_PEEKDATA, tid, addr)?;
                data.copy_from_slice(&(d as Word).to_ne_bytes()[..]);
            }

            data[align_off..align_off + size].copy_from_slice(&buffer[buf_pos..buf_pos + size]);

            ptrace(
                PTraceRequest::PTRACE_POKEDATA,
                tid,
                addr,
                Word::from_ne_bytes(data),
            )?;

            to_write -= size;
            buf_pos += size;
            addr += size_of::<Word>() as Word;
            align_off = 0;
        }

        Ok(())
    }
}
