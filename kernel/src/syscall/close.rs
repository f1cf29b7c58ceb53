// SPDX-License-Identifier: MPL-2.0

use super::{Context, SyscallReturn};
use crate::prelude::*;

/// `close(2)`.
pub fn sys_close(ctx: &Context, fd: usize) -> Result<SyscallReturn> {
    debug!("fd = {}", fd);
    ctx.process.file_table().lock().close(fd)?;
    Ok(SyscallReturn::Return(0))
}
