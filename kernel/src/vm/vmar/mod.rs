// SPDX-License-Identifier: MPL-2.0

//! Virtual Memory Address Regions (VMARs).
//!
//! A `Vmar` is one process's address-space map: the ordered, disjoint
//! collection of [`VmMapping`]s binding virtual page ranges to windows
//! of memory objects, plus the `VmSpace` (page table) that caches
//! resolved translations. Mappings are policy; the `VmSpace` holds
//! only what the page-fault handler has installed so far.

mod interval_set;
pub mod vm_mapping;

use core::fmt;

use minos_frame::{
    config::{MAX_USERSPACE_VADDR, USER_LOWEST_VADDR},
    vm::{page_number, PteFlags, TlbFlushOp, VmSpace},
};

use self::interval_set::{Interval, IntervalSet};
pub use self::vm_mapping::VmMapping;
use crate::{
    fs::Vnode,
    prelude::*,
    vm::{
        page_fault_handler::{PageFaultHandler, PageFaultInfo},
        perms::VmPerms,
        vmo::Vmo,
    },
};

/// The lowest mappable user address.
pub const ROOT_VMAR_LOWEST_ADDR: Vaddr = USER_LOWEST_VADDR;
/// The first address past the end of user space.
pub const ROOT_VMAR_CAP_ADDR: Vaddr = MAX_USERSPACE_VADDR;

/// Returns whether the input `vaddr` is a legal user space virtual
/// address.
pub fn is_userspace_vaddr(vaddr: Vaddr) -> bool {
    (ROOT_VMAR_LOWEST_ADDR..ROOT_VMAR_CAP_ADDR).contains(&vaddr)
}

const fn user_low_vpn() -> usize {
    page_number(ROOT_VMAR_LOWEST_ADDR)
}

const fn user_high_vpn() -> usize {
    page_number(ROOT_VMAR_CAP_ADDR)
}

/// The direction in which a free-range search scans the address
/// space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocDir {
    /// Prefer the lowest-address gap that fits.
    LowToHigh,
    /// Prefer the highest-address gap that fits.
    HighToLow,
}

/// A point-in-time description of one mapping, for callers outside
/// the VMAR lock.
#[derive(Clone, Debug)]
pub struct MappingInfo {
    pub range: Range<usize>,
    pub vmo_offset: usize,
    pub perms: VmPerms,
    pub is_shared: bool,
    pub vmo: Arc<Vmo>,
}

struct VmarInner {
    mappings: IntervalSet<usize, VmMapping>,
}

/// One process's address-space map.
pub struct Vmar {
    vm_space: VmSpace,
    inner: Mutex<VmarInner>,
}

impl Vmar {
    /// Creates an empty address-space map, not yet owned by any
    /// process.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            vm_space: VmSpace::new(),
            inner: Mutex::new(VmarInner {
                mappings: IntervalSet::new(),
            }),
        })
    }

    /// Returns the attached `VmSpace`.
    pub fn vm_space(&self) -> &VmSpace {
        &self.vm_space
    }

    /// Starts building a new mapping of `npages` pages. See
    /// [`VmarMapOptions`].
    pub fn new_map(&self, npages: usize, perms: VmPerms) -> VmarMapOptions<'_> {
        VmarMapOptions::new(self, npages, perms)
    }

    /// First-fit search for `npages` of unmapped space, scanning in
    /// the given direction. Does not alter the map.
    pub fn find_range(&self, npages: usize, dir: AllocDir) -> Option<usize> {
        let inner = self.inner.lock();
        Self::find_free_region(&inner, npages, dir)
    }

    fn find_free_region(inner: &VmarInner, npages: usize, dir: AllocDir) -> Option<usize> {
        debug_assert!(npages > 0);
        match dir {
            AllocDir::LowToHigh => {
                let mut low = user_low_vpn();
                for mapping in inner.mappings.iter() {
                    let range = mapping.range();
                    if range.start - low >= npages {
                        return Some(low);
                    }
                    low = range.end;
                }
                (user_high_vpn() - low >= npages).then_some(low)
            }
            AllocDir::HighToLow => {
                let mut high = user_high_vpn();
                for mapping in inner.mappings.iter().rev() {
                    let range = mapping.range();
                    if high - range.end >= npages {
                        return Some(high - npages);
                    }
                    high = range.start;
                }
                (high - user_low_vpn() >= npages).then(|| high - npages)
            }
        }
    }

    /// Returns the mapping containing virtual page `vpn`, if any.
    pub fn lookup(&self, vpn: usize) -> Option<MappingInfo> {
        let inner = self.inner.lock();
        inner.mappings.find_one(&vpn).map(|mapping| MappingInfo {
            range: mapping.range(),
            vmo_offset: mapping.vmo_offset(),
            perms: mapping.perms(),
            is_shared: mapping.is_shared(),
            vmo: mapping.vmo().clone(),
        })
    }

    /// Returns whether no mapping intersects
    /// `[start_vpn, start_vpn + npages)`.
    pub fn is_range_empty(&self, start_vpn: usize, npages: usize) -> bool {
        let inner = self.inner.lock();
        let result = inner
            .mappings
            .find(&(start_vpn..start_vpn + npages))
            .next()
            .is_none();
        result
    }

    /// Returns the number of mappings in the map.
    pub fn num_mappings(&self) -> usize {
        self.inner.lock().mappings.len()
    }

    /// Excises the virtual page range from the map.
    ///
    /// A mapping partially covered by the range is trimmed or split;
    /// a wholly covered mapping is destroyed, releasing its object
    /// reference. Hardware translations are *not* touched here;
    /// callers coordinate invalidation and TLB flushing.
    pub fn remove_mapping(&self, range: Range<usize>) -> Result<()> {
        if range.start >= range.end {
            return_errno_with_message!(Errno::EINVAL, "cannot unmap an empty range");
        }
        let mut inner = self.inner.lock();
        Self::remove_locked(&mut inner, &range);
        debug_assert!(inner.mappings.find(&range).next().is_none());
        Ok(())
    }

    fn remove_locked(inner: &mut VmarInner, range: &Range<usize>) {
        for mut vma in inner.mappings.take(range) {
            let r = vma.range();
            if r.start < range.start && range.end < r.end {
                // The unmapped range is strictly inside: split in two.
                let high = vma.split_off(range.end);
                vma.set_end(range.start);
                inner.mappings.insert(vma);
                inner.mappings.insert(high);
            } else if r.start < range.start {
                // The range covers the tail.
                vma.set_end(range.start);
                inner.mappings.insert(vma);
            } else if range.end < r.end {
                // The range covers the head.
                vma.advance_head(range.end);
                inner.mappings.insert(vma);
            }
            // Wholly covered: dropping the mapping releases its
            // object reference.
        }
    }

    /// Drops the installed translations for the page range and flushes
    /// the TLB for it.
    pub fn invalidate_range(&self, vpns: Range<usize>) {
        let bytes = vpns.start * PAGE_SIZE..vpns.end * PAGE_SIZE;
        self.vm_space.unmap_range(&bytes).unwrap();
        self.vm_space.flush(TlbFlushOp::Range(bytes));
    }

    /// Drops every installed user translation and flushes the whole
    /// TLB. Fork uses this on the parent so that its next write to any
    /// private page faults into the freshly interposed shadow.
    pub fn invalidate_all(&self) {
        self.vm_space
            .unmap_range(&(ROOT_VMAR_LOWEST_ADDR..ROOT_VMAR_CAP_ADDR))
            .unwrap();
        self.vm_space.flush(TlbFlushOp::All);
    }

    /// Moves the end of the mapping containing `at_vpn`, returning its
    /// previous range. Growing requires the grown tail to be free of
    /// other mappings.
    pub fn resize_area(&self, at_vpn: usize, new_end_vpn: usize) -> Result<Range<usize>> {
        let mut inner = self.inner.lock();
        let old = inner
            .mappings
            .find_one(&at_vpn)
            .map(|mapping| mapping.range())
            .ok_or(Error::with_message(
                Errno::EFAULT,
                "no mapping at the resize point",
            ))?;
        if new_end_vpn <= old.start {
            return_errno_with_message!(Errno::EINVAL, "a mapping may not become empty");
        }
        if new_end_vpn > user_high_vpn() {
            return_errno_with_message!(Errno::ENOMEM, "resize beyond the user address space");
        }
        if new_end_vpn > old.end
            && inner
                .mappings
                .find(&(old.end..new_end_vpn))
                .next()
                .is_some()
        {
            return_errno_with_message!(Errno::ENOMEM, "another mapping is in the way");
        }
        if new_end_vpn != old.end {
            inner
                .mappings
                .find_one_mut(&at_vpn)
                .unwrap()
                .set_end(new_end_vpn);
        }
        Ok(old)
    }

    /// Kernel-side read of this address space. The caller is trusted:
    /// mapping protections are not checked, but every touched page
    /// must be mapped.
    pub fn read_bytes(&self, vaddr: Vaddr, buf: &mut [u8]) -> Result<()> {
        let inner = self.inner.lock();
        let mut done = 0;
        while done < buf.len() {
            let pos = vaddr + done;
            let vpn = page_number(pos);
            let mapping = inner.mappings.find_one(&vpn).ok_or(Error::with_message(
                Errno::EFAULT,
                "read of an unmapped user address",
            ))?;
            let index = mapping.page_index_of(vpn);
            let frame = mapping.vmo().lookup_page(index, false)?;
            let page_off = pos % PAGE_SIZE;
            let chunk = (buf.len() - done).min(PAGE_SIZE - page_off);
            frame.read_bytes(page_off, &mut buf[done..done + chunk])?;
            done += chunk;
        }
        Ok(())
    }

    /// Kernel-side write into this address space. The caller is
    /// trusted; written pages are dirtied.
    pub fn write_bytes(&self, vaddr: Vaddr, buf: &[u8]) -> Result<()> {
        let inner = self.inner.lock();
        let mut done = 0;
        while done < buf.len() {
            let pos = vaddr + done;
            let vpn = page_number(pos);
            let mapping = inner.mappings.find_one(&vpn).ok_or(Error::with_message(
                Errno::EFAULT,
                "write to an unmapped user address",
            ))?;
            let index = mapping.page_index_of(vpn);
            let frame = mapping.vmo().lookup_page(index, true)?;
            let page_off = pos % PAGE_SIZE;
            let chunk = (buf.len() - done).min(PAGE_SIZE - page_off);
            frame.write_bytes(page_off, &buf[done..done + chunk])?;
            mapping.vmo().dirty_page(index);
            done += chunk;
        }
        Ok(())
    }

    /// Structurally clones the map for fork: each new mapping has the
    /// same range, protection, and flags, and shares the same memory
    /// object (one reference added). Shadow interposition is fork's
    /// job, not this function's. The new map starts with an empty
    /// `VmSpace`; the child faults its translations in on demand.
    pub fn duplicate(&self) -> Arc<Vmar> {
        let new = Vmar::new();
        {
            let inner = self.inner.lock();
            let mut new_inner = new.inner.lock();
            for mapping in inner.mappings.iter() {
                new_inner.mappings.insert(mapping.clone());
            }
        }
        new
    }

    /// Walks `parent` and `child` in lockstep and interposes a fresh
    /// shadow object over each private mapping pair, so that
    /// subsequent writes by either side diverge.
    ///
    /// `child` must be a [`Vmar::duplicate`] of `parent` that no other
    /// thread can observe yet.
    pub(crate) fn interpose_private_shadows(parent: &Vmar, child: &Vmar) {
        let mut parent_inner = parent.inner.lock();
        let mut child_inner = child.inner.lock();
        let pairs = parent_inner
            .mappings
            .iter_mut()
            .zip(child_inner.mappings.iter_mut());
        for (parent_vma, child_vma) in pairs {
            debug_assert_eq!(parent_vma.range(), child_vma.range());
            if parent_vma.is_shared() {
                continue;
            }
            let old_vmo = parent_vma.vmo().clone();
            trace!("interposing twin shadows over {:?}", old_vmo);
            parent_vma.replace_vmo(Vmo::new_shadow(old_vmo.clone()));
            child_vma.replace_vmo(Vmo::new_shadow(old_vmo));
        }
    }
}

impl PageFaultHandler for Vmar {
    /// Handles a user page fault against this address space.
    ///
    /// On success the correct frame (after any copy-on-write
    /// promotion) is installed in the `VmSpace`. The entry is made
    /// WRITABLE only when the fault itself was a write to a writable
    /// mapping; a read fault on a writable mapping stays read-only so
    /// that the first write still faults and promotes.
    fn handle_page_fault(&self, info: &PageFaultInfo) -> Result<()> {
        trace!(
            "page fault at address {:#x}, perms: {:?}",
            info.address,
            info.required_perms
        );
        if !is_userspace_vaddr(info.address) {
            return_errno_with_message!(Errno::EFAULT, "fault address outside user space");
        }
        let vpn = page_number(info.address);
        let inner = self.inner.lock();
        let Some(mapping) = inner.mappings.find_one(&vpn) else {
            return_errno_with_message!(Errno::EFAULT, "fault address is not mapped");
        };
        if !mapping.perms().contains(info.required_perms) {
            return_errno_with_message!(Errno::EACCES, "mapping forbids the access");
        }

        let is_write = info.required_perms.contains(VmPerms::WRITE);
        let index = mapping.page_index_of(vpn);
        let frame = mapping.vmo().lookup_page(index, is_write)?;
        if is_write {
            mapping.vmo().dirty_page(index);
        }

        let mut flags = PteFlags::PRESENT | PteFlags::USER;
        if is_write && mapping.perms().contains(VmPerms::WRITE) {
            flags |= PteFlags::WRITABLE;
        }
        self.vm_space
            .map(vpn * PAGE_SIZE, frame.paddr(), flags)
            .map_err(|_| Error::with_message(Errno::ENOMEM, "page table update failed"))?;
        Ok(())
    }
}

impl fmt::Debug for Vmar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_list().entries(inner.mappings.iter()).finish()
    }
}

/// Options for creating a new mapping.
///
/// The backing object is resolved at build time:
/// * no vnode: a fresh anonymous object;
/// * a vnode mapped shared: the vnode's own mapped object, shared
///   with every other mapper;
/// * a vnode mapped private: a fresh shadow object whose chain
///   bottoms out at the vnode's mapped object.
pub struct VmarMapOptions<'a> {
    vmar: &'a Vmar,
    npages: usize,
    perms: VmPerms,
    vnode: Option<Arc<dyn Vnode>>,
    is_shared: bool,
    vmo_offset: usize,
    lopage: Option<usize>,
    dir: AllocDir,
}

impl<'a> VmarMapOptions<'a> {
    fn new(vmar: &'a Vmar, npages: usize, perms: VmPerms) -> Self {
        Self {
            vmar,
            npages,
            perms,
            vnode: None,
            is_shared: false,
            vmo_offset: 0,
            lopage: None,
            dir: AllocDir::HighToLow,
        }
    }

    /// Backs the mapping with a file instead of anonymous memory.
    pub fn vnode(mut self, vnode: Arc<dyn Vnode>) -> Self {
        self.vnode = Some(vnode);
        self
    }

    /// Sets whether stores are shared with other mappers of the same
    /// object. The default is a private, copy-on-write mapping.
    pub fn shared(mut self, is_shared: bool) -> Self {
        self.is_shared = is_shared;
        self
    }

    /// Sets the page index within the object that the first mapped
    /// page refers to. The default is zero.
    pub fn vmo_offset(mut self, pages: usize) -> Self {
        self.vmo_offset = pages;
        self
    }

    /// Pins the mapping at a fixed starting page instead of searching
    /// for free space. An existing mapping overlapping the range is
    /// unmapped first.
    pub fn at(mut self, lopage: usize) -> Self {
        self.lopage = Some(lopage);
        self
    }

    /// Sets the direction of the free-space search used when no fixed
    /// page is given.
    pub fn dir(mut self, dir: AllocDir) -> Self {
        self.dir = dir;
        self
    }

    /// Creates the mapping and adds it to the VMAR, returning its
    /// first virtual page number.
    ///
    /// Operations are ordered so that the map is only mutated once
    /// every step that can fail has succeeded.
    pub fn build(self) -> Result<usize> {
        let Self {
            vmar,
            npages,
            perms,
            vnode,
            is_shared,
            vmo_offset,
            lopage,
            dir,
        } = self;

        if npages == 0 {
            return_errno_with_message!(Errno::EINVAL, "cannot map zero pages");
        }
        let start = match lopage {
            Some(page) => page,
            None => vmar
                .find_range(npages, dir)
                .ok_or(Error::with_message(Errno::ENOMEM, "no free range fits"))?,
        };
        let range = start..start + npages;
        if range.start < user_low_vpn() || range.end > user_high_vpn() {
            return_errno_with_message!(Errno::EINVAL, "mapping outside the user address space");
        }

        let vmo = match (vnode, is_shared) {
            (None, _) => Vmo::new_anon(),
            (Some(vnode), true) => vnode.mapped_vmo(),
            (Some(vnode), false) => Vmo::new_shadow(vnode.mapped_vmo()),
        };
        trace!(
            "build mapping, range = {:#x?}, perms = {:?}, vmo = {:?}",
            range.start * PAGE_SIZE..range.end * PAGE_SIZE,
            perms,
            vmo
        );
        let mapping = VmMapping::new(range.clone(), vmo, vmo_offset, perms, is_shared);

        // Nothing below can fail.
        let mut inner = vmar.inner.lock();
        if lopage.is_some() {
            Vmar::remove_locked(&mut inner, &range);
        }
        inner.mappings.insert(mapping);
        Ok(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_anon(vmar: &Arc<Vmar>, npages: usize, at: Option<usize>) -> usize {
        let mut options = vmar.new_map(npages, VmPerms::READ | VmPerms::WRITE);
        if let Some(page) = at {
            options = options.at(page);
        }
        options.build().unwrap()
    }

    #[test]
    fn test_mappings_sorted_and_disjoint() {
        let vmar = Vmar::new();
        map_anon(&vmar, 4, Some(0x100));
        map_anon(&vmar, 4, Some(0x300));
        map_anon(&vmar, 4, Some(0x200));

        let mut last_end = 0;
        let inner = vmar.inner.lock();
        for mapping in inner.mappings.iter() {
            let range = mapping.range();
            assert!(range.start >= last_end);
            last_end = range.end;
        }
        assert_eq!(inner.mappings.len(), 3);
    }

    #[test]
    fn test_lookup_hits_and_misses() {
        let vmar = Vmar::new();
        map_anon(&vmar, 4, Some(0x100));

        assert!(vmar.lookup(0x100).is_some());
        assert!(vmar.lookup(0x103).is_some());
        assert!(vmar.lookup(0x104).is_none());
        assert!(vmar.lookup(0xff).is_none());
    }

    #[test]
    fn test_find_range_low_to_high() {
        let vmar = Vmar::new();
        let low = user_low_vpn();
        map_anon(&vmar, 2, Some(low));
        map_anon(&vmar, 2, Some(low + 4));

        // First fit from the bottom lands in the two-page hole.
        assert_eq!(vmar.find_range(2, AllocDir::LowToHigh), Some(low + 2));
        // A larger request skips past the hole.
        assert_eq!(vmar.find_range(3, AllocDir::LowToHigh), Some(low + 6));
    }

    #[test]
    fn test_find_range_high_to_low() {
        let vmar = Vmar::new();
        let high = user_high_vpn();
        map_anon(&vmar, 2, Some(high - 2));

        assert_eq!(vmar.find_range(2, AllocDir::HighToLow), Some(high - 4));
    }

    #[test]
    fn test_remove_covers_whole_mapping() {
        let vmar = Vmar::new();
        map_anon(&vmar, 4, Some(0x100));
        vmar.remove_mapping(0x100..0x104).unwrap();

        for vpn in 0x100..0x104 {
            assert!(vmar.lookup(vpn).is_none());
        }
        assert_eq!(vmar.num_mappings(), 0);
    }

    #[test]
    fn test_remove_trims_tail() {
        let vmar = Vmar::new();
        map_anon(&vmar, 4, Some(0x100));
        vmar.remove_mapping(0x102..0x104).unwrap();

        let info = vmar.lookup(0x100).unwrap();
        assert_eq!(info.range, 0x100..0x102);
        assert!(vmar.lookup(0x102).is_none());
    }

    #[test]
    fn test_remove_trims_head_and_advances_offset() {
        let vmar = Vmar::new();
        map_anon(&vmar, 4, Some(0x100));
        vmar.remove_mapping(0x100..0x102).unwrap();

        let info = vmar.lookup(0x102).unwrap();
        assert_eq!(info.range, 0x102..0x104);
        // The page-index identity must hold across the trim.
        assert_eq!(info.vmo_offset, 2);
        assert!(vmar.lookup(0x101).is_none());
    }

    #[test]
    fn test_remove_splits_mapping() {
        let vmar = Vmar::new();
        map_anon(&vmar, 16, Some(0x100));
        let vmo = vmar.lookup(0x100).unwrap().vmo;
        let refs_before = Arc::strong_count(&vmo);
        let mappers_before = vmo.mapper_count();

        vmar.remove_mapping(0x106..0x10a).unwrap();

        let low = vmar.lookup(0x100).unwrap();
        let high = vmar.lookup(0x10a).unwrap();
        assert_eq!(low.range, 0x100..0x106);
        assert_eq!(high.range, 0x10a..0x110);
        assert_eq!(high.vmo_offset, 0xa);
        assert!(vmar.lookup(0x108).is_none());

        // Both halves share the object: one extra reference, one
        // extra mapper on the bottom object.
        assert!(Arc::ptr_eq(&low.vmo, &high.vmo));
        assert_eq!(Arc::strong_count(&vmo), refs_before + 1);
        assert_eq!(vmo.mapper_count(), mappers_before + 1);
    }

    #[test]
    fn test_map_then_unmap_restores_shape() {
        let vmar = Vmar::new();
        map_anon(&vmar, 4, Some(0x100));
        map_anon(&vmar, 4, Some(0x200));
        assert_eq!(vmar.num_mappings(), 2);

        let start = map_anon(&vmar, 8, None);
        assert_eq!(vmar.num_mappings(), 3);
        vmar.remove_mapping(start..start + 8).unwrap();

        assert_eq!(vmar.num_mappings(), 2);
        assert!(vmar.lookup(0x100).is_some());
        assert!(vmar.lookup(0x200).is_some());
    }

    #[test]
    fn test_fixed_map_replaces_overlap() {
        let vmar = Vmar::new();
        map_anon(&vmar, 4, Some(0x100));
        let old_vmo = vmar.lookup(0x100).unwrap().vmo;

        map_anon(&vmar, 2, Some(0x102));

        assert_eq!(vmar.num_mappings(), 2);
        let replaced = vmar.lookup(0x102).unwrap();
        assert!(!Arc::ptr_eq(&replaced.vmo, &old_vmo));
        assert_eq!(vmar.lookup(0x100).unwrap().range, 0x100..0x102);
    }

    #[test]
    fn test_is_range_empty() {
        let vmar = Vmar::new();
        map_anon(&vmar, 4, Some(0x100));

        assert!(vmar.is_range_empty(0x104, 4));
        assert!(!vmar.is_range_empty(0x102, 4));
        assert!(!vmar.is_range_empty(0xfe, 4));
    }

    #[test]
    fn test_read_write_through_map() {
        let vmar = Vmar::new();
        let start = map_anon(&vmar, 2, Some(0x100));
        let vaddr = start * PAGE_SIZE + 100;

        vmar.write_bytes(vaddr, b"payload").unwrap();
        let mut buf = [0u8; 7];
        vmar.read_bytes(vaddr, &mut buf).unwrap();
        assert_eq!(&buf, b"payload");
    }

    #[test]
    fn test_write_spanning_page_boundary() {
        let vmar = Vmar::new();
        let start = map_anon(&vmar, 2, Some(0x100));
        let vaddr = start * PAGE_SIZE + PAGE_SIZE - 3;

        vmar.write_bytes(vaddr, b"abcdef").unwrap();
        let mut buf = [0u8; 6];
        vmar.read_bytes(vaddr, &mut buf).unwrap();
        assert_eq!(&buf, b"abcdef");
    }

    #[test]
    fn test_sparse_anon_reads_zero() {
        let vmar = Vmar::new();
        let start = map_anon(&vmar, 2, Some(0x100));

        let mut buf = [0xffu8; 32];
        vmar.read_bytes(start * PAGE_SIZE, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 32]);
    }

    #[test]
    fn test_duplicate_shares_objects() {
        let vmar = Vmar::new();
        map_anon(&vmar, 4, Some(0x100));
        let vmo = vmar.lookup(0x100).unwrap().vmo;
        let refs_before = Arc::strong_count(&vmo);

        let copy = vmar.duplicate();

        let copied = copy.lookup(0x100).unwrap();
        assert_eq!(copied.range, 0x100..0x104);
        assert!(Arc::ptr_eq(&copied.vmo, &vmo));
        assert_eq!(Arc::strong_count(&vmo), refs_before + 1);
        // No translations are inherited.
        assert_eq!(copy.vm_space().num_mapped(), 0);
    }

    #[test]
    fn test_fault_installs_translation() {
        let vmar = Vmar::new();
        let start = map_anon(&vmar, 1, Some(0x100));
        let vaddr = start * PAGE_SIZE;

        vmar.handle_page_fault(&PageFaultInfo {
            address: vaddr,
            required_perms: VmPerms::READ,
        })
        .unwrap();

        let (_, flags) = vmar.vm_space().query(vaddr).unwrap();
        assert!(flags.contains(PteFlags::PRESENT | PteFlags::USER));
        // Read fault on a writable mapping stays read-only so the
        // first write still faults.
        assert!(!flags.contains(PteFlags::WRITABLE));

        vmar.handle_page_fault(&PageFaultInfo {
            address: vaddr,
            required_perms: VmPerms::WRITE,
        })
        .unwrap();
        let (_, flags) = vmar.vm_space().query(vaddr).unwrap();
        assert!(flags.contains(PteFlags::WRITABLE));
    }

    #[test]
    fn test_fault_on_unmapped_address_is_efault() {
        let vmar = Vmar::new();
        let err = vmar
            .handle_page_fault(&PageFaultInfo {
                address: 0x100 * PAGE_SIZE,
                required_perms: VmPerms::READ,
            })
            .unwrap_err();
        assert_eq!(err.error(), Errno::EFAULT);
    }

    #[test]
    fn test_fault_against_protection_is_eacces() {
        let vmar = Vmar::new();
        let start = vmar
            .new_map(1, VmPerms::READ)
            .at(0x100)
            .build()
            .unwrap();

        let err = vmar
            .handle_page_fault(&PageFaultInfo {
                address: start * PAGE_SIZE,
                required_perms: VmPerms::WRITE,
            })
            .unwrap_err();
        assert_eq!(err.error(), Errno::EACCES);
    }

    #[test]
    fn test_fault_with_no_perms_forbids_reads() {
        let vmar = Vmar::new();
        let start = vmar
            .new_map(1, VmPerms::empty())
            .at(0x100)
            .build()
            .unwrap();

        let err = vmar
            .handle_page_fault(&PageFaultInfo {
                address: start * PAGE_SIZE,
                required_perms: VmPerms::READ,
            })
            .unwrap_err();
        assert_eq!(err.error(), Errno::EACCES);
    }

    #[test]
    fn test_zero_page_map_rejected() {
        let vmar = Vmar::new();
        let err = vmar
            .new_map(0, VmPerms::READ)
            .build()
            .unwrap_err();
        assert_eq!(err.error(), Errno::EINVAL);
    }
}
