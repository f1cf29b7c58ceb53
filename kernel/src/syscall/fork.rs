// SPDX-License-Identifier: MPL-2.0

use minos_frame::cpu::UserContext;

use super::{Context, SyscallReturn};
use crate::{prelude::*, process::clone_process};

/// `fork(2)`. The parent observes the child's pid; the child's thread
/// is created with a zeroed syscall return register and scheduled.
pub fn sys_fork(ctx: &Context, parent_ctx: &UserContext) -> Result<SyscallReturn> {
    let child = clone_process(ctx.process, parent_ctx)?;
    Ok(SyscallReturn::Return(child.pid() as isize))
}
