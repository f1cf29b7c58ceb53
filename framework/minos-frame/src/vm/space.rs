// SPDX-License-Identifier: MPL-2.0

use alloc::collections::BTreeMap;
use core::{
    ops::Range,
    sync::atomic::{AtomicUsize, Ordering},
};

use bitflags::bitflags;
use spin::Mutex;

use super::{is_page_aligned, Paddr, Vaddr};
use crate::{config::PAGE_SIZE, Error, Result};

bitflags! {
    /// Hardware page-table entry flags.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct PteFlags: u8 {
        /// The entry maps a frame.
        const PRESENT  = 1 << 0;
        /// Writes through this entry are allowed.
        const WRITABLE = 1 << 1;
        /// User-mode accesses through this entry are allowed.
        const USER     = 1 << 2;
    }
}

/// A TLB invalidation request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TlbFlushOp {
    /// Flush every entry.
    All,
    /// Flush entries translating addresses in the range.
    Range(Range<Vaddr>),
    /// Flush the entry translating one address.
    Address(Vaddr),
}

/// A virtual memory space: the page table of one address space.
///
/// A `VmSpace` records which virtual pages are currently installed in
/// hardware and with what permissions. It says nothing about what
/// *should* be mapped; that policy belongs to the address-space map
/// layered above, which installs entries on demand from the page-fault
/// handler and tears them down on unmap, fork, and exit.
pub struct VmSpace {
    entries: Mutex<BTreeMap<Vaddr, Pte>>,
    tlb_flushes: AtomicUsize,
}

#[derive(Clone, Copy, Debug)]
struct Pte {
    paddr: Paddr,
    flags: PteFlags,
}

impl VmSpace {
    /// Creates an empty VM space.
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            tlb_flushes: AtomicUsize::new(0),
        }
    }

    /// Installs (or re-installs) the entry translating `vaddr`.
    ///
    /// Re-installation with different flags is the common case for
    /// copy-on-write promotion, so an existing entry is silently
    /// overwritten.
    pub fn map(&self, vaddr: Vaddr, paddr: Paddr, flags: PteFlags) -> Result<()> {
        if !is_page_aligned(vaddr) || !is_page_aligned(paddr) {
            return Err(Error::InvalidArgs);
        }
        debug_assert!(flags.contains(PteFlags::PRESENT));
        self.entries.lock().insert(vaddr, Pte { paddr, flags });
        Ok(())
    }

    /// Removes every entry translating an address in `range`.
    ///
    /// The range may contain gaps where nothing is mapped.
    pub fn unmap_range(&self, range: &Range<Vaddr>) -> Result<()> {
        if !is_page_aligned(range.start) || !is_page_aligned(range.end) {
            return Err(Error::InvalidArgs);
        }
        let mut entries = self.entries.lock();
        let vaddrs: alloc::vec::Vec<Vaddr> =
            entries.range(range.clone()).map(|(va, _)| *va).collect();
        for va in vaddrs {
            entries.remove(&va);
        }
        Ok(())
    }

    /// Looks up the entry translating `vaddr`, if any.
    pub fn query(&self, vaddr: Vaddr) -> Option<(Paddr, PteFlags)> {
        let page_base = vaddr - vaddr % PAGE_SIZE;
        self.entries
            .lock()
            .get(&page_base)
            .map(|pte| (pte.paddr, pte.flags))
    }

    /// Returns the number of installed entries.
    pub fn num_mapped(&self) -> usize {
        self.entries.lock().len()
    }

    /// Performs a TLB invalidation.
    ///
    /// The model has no real TLB; the operation is recorded so that
    /// callers' shootdown discipline remains observable.
    pub fn flush(&self, op: TlbFlushOp) {
        log::trace!("tlb flush: {:?}", op);
        self.tlb_flushes.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns how many TLB invalidations have been issued.
    pub fn tlb_flush_count(&self) -> usize {
        self.tlb_flushes.load(Ordering::Relaxed)
    }
}

impl Default for VmSpace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_query_unmap() {
        let space = VmSpace::new();
        let flags = PteFlags::PRESENT | PteFlags::USER;
        space.map(0x1000, 0x8000_0000, flags).unwrap();

        let (paddr, got) = space.query(0x1234).unwrap();
        assert_eq!(paddr, 0x8000_0000);
        assert_eq!(got, flags);

        space.unmap_range(&(0x1000..0x2000)).unwrap();
        assert!(space.query(0x1000).is_none());
    }

    #[test]
    fn test_unmap_range_with_gaps() {
        let space = VmSpace::new();
        let flags = PteFlags::PRESENT | PteFlags::USER;
        space.map(0x1000, 0x8000_0000, flags).unwrap();
        space.map(0x4000, 0x8000_1000, flags).unwrap();

        space.unmap_range(&(0x0..0x10000)).unwrap();
        assert_eq!(space.num_mapped(), 0);
    }

    #[test]
    fn test_remap_overwrites_flags() {
        let space = VmSpace::new();
        space
            .map(0x1000, 0x8000_0000, PteFlags::PRESENT | PteFlags::USER)
            .unwrap();
        space
            .map(
                0x1000,
                0x8000_0000,
                PteFlags::PRESENT | PteFlags::USER | PteFlags::WRITABLE,
            )
            .unwrap();
        let (_, flags) = space.query(0x1000).unwrap();
        assert!(flags.contains(PteFlags::WRITABLE));
    }

    #[test]
    fn test_misaligned_rejected() {
        let space = VmSpace::new();
        assert!(space.map(0x1001, 0x8000_0000, PteFlags::PRESENT).is_err());
    }
}
