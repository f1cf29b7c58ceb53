// SPDX-License-Identifier: MPL-2.0

use super::{Context, SyscallReturn};
use crate::{
    prelude::*,
    process::{do_exit, ExitCode},
};

/// `exit(2)`. The calling process becomes a zombie; the parent's
/// `waitpid` reaps it.
pub fn sys_exit(ctx: &Context, exit_code: ExitCode) -> Result<SyscallReturn> {
    do_exit(ctx.process, exit_code);
    Ok(SyscallReturn::Return(0))
}
