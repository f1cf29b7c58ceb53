// SPDX-License-Identifier: MPL-2.0

use super::{Context, SyscallReturn};
use crate::{fs::SeekFrom, prelude::*};

/// `lseek(2)`.
pub fn sys_lseek(ctx: &Context, fd: usize, pos: SeekFrom) -> Result<SyscallReturn> {
    debug!("fd = {}, pos = {:?}", fd, pos);
    let file = ctx.process.file_table().lock().get(fd)?;
    let offset = file.seek(pos)?;
    Ok(SyscallReturn::Return(offset as isize))
}
