// SPDX-License-Identifier: MPL-2.0

use super::{Context, SyscallReturn};
use crate::prelude::*;

/// `read(2)`: reads from the file into the caller's memory at
/// `buf_addr`.
pub fn sys_read(ctx: &Context, fd: usize, buf_addr: Vaddr, len: usize) -> Result<SyscallReturn> {
    debug!("fd = {}, buf_addr = {:#x}, len = {}", fd, buf_addr, len);
    let file = ctx.process.file_table().lock().get(fd)?;
    let mut buf = vec![0u8; len];
    let read = file.read(&mut buf)?;
    ctx.process
        .root_vmar()
        .write_bytes(buf_addr, &buf[..read])?;
    Ok(SyscallReturn::Return(read as isize))
}
