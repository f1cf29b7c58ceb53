// SPDX-License-Identifier: MPL-2.0

use minos_frame::vm::{is_page_aligned, page_number};

use super::{Context, SyscallReturn};
use crate::{
    prelude::*,
    vm::vmar::{is_userspace_vaddr, ROOT_VMAR_CAP_ADDR},
};

pub fn sys_munmap(ctx: &Context, addr: Vaddr, len: usize) -> Result<SyscallReturn> {
    debug!("addr = {:#x}, len = {:#x}", addr, len);
    if !is_page_aligned(addr) || len == 0 {
        return_errno_with_message!(Errno::EINVAL, "misaligned or empty unmap request");
    }
    if !is_userspace_vaddr(addr) {
        return_errno_with_message!(Errno::EINVAL, "unmap outside user space");
    }
    let lopage = page_number(addr);
    let npages = len.div_ceil(PAGE_SIZE);
    if lopage + npages > page_number(ROOT_VMAR_CAP_ADDR) {
        return_errno_with_message!(Errno::EINVAL, "unmap range leaves user space");
    }

    let root_vmar = ctx.process.root_vmar();
    root_vmar.remove_mapping(lopage..lopage + npages)?;
    root_vmar.invalidate_range(lopage..lopage + npages);
    Ok(SyscallReturn::Return(0))
}
