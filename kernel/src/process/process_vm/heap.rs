// SPDX-License-Identifier: MPL-2.0

use core::sync::atomic::{AtomicUsize, Ordering};

use align_ext::AlignExt;
use minos_frame::vm::page_number;

use crate::{
    prelude::*,
    vm::{
        perms::VmPerms,
        vmar::{Vmar, ROOT_VMAR_CAP_ADDR},
    },
};

/// The base address of the user heap.
pub const USER_HEAP_BASE: Vaddr = 0x1000_0000;

/// The heap window of one process.
///
/// The heap is always represented by at most one mapping, whose first
/// page stands in for the tail of the data segment the loader would
/// have produced; the break starts just past it and never moves below
/// that point. The mapping has page granularity while the break itself
/// is byte-accurate.
#[derive(Debug)]
pub struct Heap {
    /// The page holding the (modeled) end of the data segment.
    base: Vaddr,
    /// The current break.
    current: AtomicUsize,
}

impl Heap {
    pub const fn new() -> Self {
        Self {
            base: USER_HEAP_BASE,
            current: AtomicUsize::new(USER_HEAP_BASE + PAGE_SIZE),
        }
    }

    /// Maps the heap's initial page into a fresh address space.
    pub(super) fn alloc_and_map(&self, root_vmar: &Arc<Vmar>) -> Result<()> {
        root_vmar
            .new_map(1, VmPerms::READ | VmPerms::WRITE)
            .at(page_number(self.base))
            .build()?;
        Ok(())
    }

    /// The lower limit of the break.
    pub fn start_brk(&self) -> Vaddr {
        self.base + PAGE_SIZE
    }

    /// Queries or moves the break.
    ///
    /// Growing requires the new tail pages to be free of other
    /// mappings; shrinking unmaps the freed pages and flushes their
    /// translations. Moving the break to its current value is a no-op
    /// that returns it.
    pub fn brk(&self, root_vmar: &Arc<Vmar>, new_brk: Option<Vaddr>) -> Result<Vaddr> {
        let Some(new_brk) = new_brk else {
            return Ok(self.current.load(Ordering::Acquire));
        };
        if new_brk < self.start_brk() {
            return_errno_with_message!(Errno::ENOMEM, "cannot move the break below its start");
        }
        if new_brk > ROOT_VMAR_CAP_ADDR {
            return_errno_with_message!(Errno::ENOMEM, "cannot move the break past user space");
        }

        let current = self.current.load(Ordering::Acquire);
        // The page just below the break always belongs to the heap
        // mapping.
        let anchor = page_number(current - 1);
        let new_end_vpn = page_number(new_brk.align_up(PAGE_SIZE));

        let old = root_vmar.resize_area(anchor, new_end_vpn)?;
        if new_end_vpn < old.end {
            root_vmar.invalidate_range(new_end_vpn..old.end);
        }
        self.current.store(new_brk, Ordering::Release);
        trace!("break moved from {:#x} to {:#x}", current, new_brk);
        Ok(new_brk)
    }
}

impl Clone for Heap {
    fn clone(&self) -> Self {
        let current = self.current.load(Ordering::Acquire);
        Self {
            base: self.base,
            current: AtomicUsize::new(current),
        }
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
