// SPDX-License-Identifier: MPL-2.0

use super::{Context, SyscallReturn};
use crate::prelude::*;

/// `write(2)`: writes the caller's memory at `buf_addr` to the file.
pub fn sys_write(ctx: &Context, fd: usize, buf_addr: Vaddr, len: usize) -> Result<SyscallReturn> {
    debug!("fd = {}, buf_addr = {:#x}, len = {}", fd, buf_addr, len);
    let file = ctx.process.file_table().lock().get(fd)?;
    let mut buf = vec![0u8; len];
    ctx.process.root_vmar().read_bytes(buf_addr, &mut buf)?;
    let written = file.write(&buf)?;
    Ok(SyscallReturn::Return(written as isize))
}
