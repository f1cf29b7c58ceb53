// SPDX-License-Identifier: MPL-2.0

//! System call entry points.
//!
//! Every handler validates its inputs and returns the first matching
//! negative-errno condition without side effects, then delegates to
//! the subsystem that does the work.

mod brk;
mod close;
mod dup;
mod exit;
mod fork;
mod lseek;
mod mmap;
mod munmap;
mod read;
mod wait4;
mod write;

use crate::{prelude::*, process::Process};

pub use self::{
    brk::sys_brk,
    close::sys_close,
    dup::{sys_dup, sys_dup2},
    exit::sys_exit,
    fork::sys_fork,
    lseek::sys_lseek,
    mmap::{sys_mmap, MMapFlags},
    munmap::sys_munmap,
    read::sys_read,
    wait4::sys_waitpid,
    write::sys_write,
};

/// The execution context a syscall runs in.
pub struct Context<'a> {
    pub process: &'a Arc<Process>,
}

impl<'a> Context<'a> {
    pub fn new(process: &'a Arc<Process>) -> Self {
        Self { process }
    }
}

/// What a syscall hands back to the trap return path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyscallReturn {
    /// Return this value to user space.
    Return(isize),
}
