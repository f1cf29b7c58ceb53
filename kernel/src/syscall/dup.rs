// SPDX-License-Identifier: MPL-2.0

use super::{Context, SyscallReturn};
use crate::prelude::*;

/// `dup(2)`: duplicates `fd` onto the lowest free descriptor.
pub fn sys_dup(ctx: &Context, fd: usize) -> Result<SyscallReturn> {
    debug!("fd = {}", fd);
    let new_fd = ctx.process.file_table().lock().dup(fd)?;
    Ok(SyscallReturn::Return(new_fd as isize))
}

/// `dup2(2)`: duplicates `old_fd` onto exactly `new_fd`.
pub fn sys_dup2(ctx: &Context, old_fd: usize, new_fd: usize) -> Result<SyscallReturn> {
    debug!("old_fd = {}, new_fd = {}", old_fd, new_fd);
    let fd = ctx.process.file_table().lock().dup2(old_fd, new_fd)?;
    Ok(SyscallReturn::Return(fd as isize))
}
