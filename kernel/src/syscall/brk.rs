// SPDX-License-Identifier: MPL-2.0

use super::{Context, SyscallReturn};
use crate::prelude::*;

/// `brk(None)` queries the current break; `brk(Some(addr))` moves it.
pub fn sys_brk(ctx: &Context, new_brk: Option<Vaddr>) -> Result<SyscallReturn> {
    debug!("new_brk = {:x?}", new_brk);
    let brk = ctx.process.vm().brk(new_brk)?;
    Ok(SyscallReturn::Return(brk as isize))
}
