// SPDX-License-Identifier: MPL-2.0

use super::{Context, SyscallReturn};
use crate::{
    prelude::*,
    process::{wait_child_exit, ExitCode, ProcessFilter, WaitOptions},
};

/// `waitpid(2)`. `pid` of −1 waits for any child; a positive `pid`
/// waits for that child. The reaped child's status is stored through
/// `status`; with `WNOHANG` and nothing to reap, the call returns 0.
pub fn sys_waitpid(
    ctx: &Context,
    pid: i32,
    status: &mut ExitCode,
    options: WaitOptions,
) -> Result<SyscallReturn> {
    debug!("pid = {}, options = {:?}", pid, options.bits());
    let filter = match pid {
        -1 => ProcessFilter::Any,
        pid if pid > 0 => ProcessFilter::WithPid(pid as u32),
        _ => return_errno_with_message!(Errno::EINVAL, "process-group waits are not supported"),
    };
    match wait_child_exit(ctx.process, filter, options)? {
        Some((child_pid, exit_code)) => {
            *status = exit_code;
            Ok(SyscallReturn::Return(child_pid as isize))
        }
        None => Ok(SyscallReturn::Return(0)),
    }
}
