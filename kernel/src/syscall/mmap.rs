// SPDX-License-Identifier: MPL-2.0

//! This mod defines mmap flags and the handler to syscall mmap.

use minos_frame::vm::{is_page_aligned, page_number};

use super::{Context, SyscallReturn};
use crate::{
    fs::Vnode,
    prelude::*,
    vm::{
        perms::VmPerms,
        vmar::is_userspace_vaddr,
    },
};

bitflags! {
    /// Flags accepted by `mmap(2)`. Exactly one of `MAP_SHARED` and
    /// `MAP_PRIVATE` must be given.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MMapFlags: u32 {
        const MAP_SHARED    = 0x1;
        const MAP_PRIVATE   = 0x2;
        const MAP_FIXED     = 0x10;
        const MAP_ANONYMOUS = 0x20;
    }
}

pub fn sys_mmap(
    ctx: &Context,
    addr: Vaddr,
    len: usize,
    perms: VmPerms,
    flags: MMapFlags,
    fd: usize,
    offset: usize,
) -> Result<SyscallReturn> {
    debug!(
        "addr = {:#x}, len = {:#x}, perms = {:?}, flags = {:?}, fd = {}, offset = {:#x}",
        addr, len, perms, flags, fd, offset
    );

    if !is_page_aligned(addr) || !is_page_aligned(offset) || len == 0 {
        return_errno_with_message!(Errno::EINVAL, "misaligned or empty mapping request");
    }
    if flags.contains(MMapFlags::MAP_SHARED) == flags.contains(MMapFlags::MAP_PRIVATE) {
        return_errno_with_message!(
            Errno::EINVAL,
            "exactly one of MAP_SHARED and MAP_PRIVATE is required"
        );
    }
    if flags.contains(MMapFlags::MAP_FIXED) && !is_userspace_vaddr(addr) {
        return_errno_with_message!(Errno::EINVAL, "fixed address outside user space");
    }
    let is_shared = flags.contains(MMapFlags::MAP_SHARED);

    let vnode: Option<Arc<dyn Vnode>> = if flags.contains(MMapFlags::MAP_ANONYMOUS) {
        if offset != 0 {
            return_errno_with_message!(Errno::EINVAL, "anonymous mapping with nonzero offset");
        }
        None
    } else {
        let file = ctx.process.file_table().lock().get(fd)?;
        let mode = file.access_mode();
        if !mode.is_readable() {
            return_errno_with_message!(Errno::EACCES, "mapped file is not open for reading");
        }
        if is_shared && perms.contains(VmPerms::WRITE) && !mode.is_writable() {
            return_errno_with_message!(
                Errno::EACCES,
                "shared writable mapping of a read-only file"
            );
        }
        Some(file.vnode().clone())
    };

    let npages = len.div_ceil(PAGE_SIZE);
    let root_vmar = ctx.process.root_vmar();
    let mut options = root_vmar
        .new_map(npages, perms)
        .shared(is_shared)
        .vmo_offset(page_number(offset));
    if let Some(vnode) = vnode {
        options = options.vnode(vnode);
    }
    if addr != 0 {
        options = options.at(page_number(addr));
    }
    let start = options.build()?;

    // Any translations left over from a mapping this one replaced are
    // stale now.
    root_vmar.invalidate_range(start..start + npages);

    trace!(
        "map range = {:#x} - {:#x}",
        start * PAGE_SIZE,
        (start + npages) * PAGE_SIZE
    );
    Ok(SyscallReturn::Return((start * PAGE_SIZE) as isize))
}
