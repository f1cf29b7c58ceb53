// SPDX-License-Identifier: MPL-2.0

//! Virtual Memory Objects (VMOs).
//!
//! A VMO is a source of page contents. Three kinds exist:
//!
//! * **Anonymous.** Pages are zero-filled on first touch and have no
//!   backing store; once resident they stay pinned in memory.
//! * **File-backed.** Pages are fetched from a [`Pager`] (in practice,
//!   a vnode) and dirty pages are written back when the object dies.
//! * **Shadow.** A private copy-on-write overlay above a parent
//!   object. Reads fall through the chain to the first object with a
//!   resident copy; the first write forces a private copy attributed
//!   to the shadow itself.
//!
//! VMOs are shared and reference-counted: mappings and child shadows
//! each own one `Arc` reference. The resident pages in the page cache
//! are *attributed* to an object, not counted as references, so the
//! last `Arc` going away is exactly the point at which the object is
//! unreachable from any mapping and must be reaped: its pages are
//! unpinned and freed (file pages written back first) and a shadow
//! releases its reference to its parent. Chains can be very long;
//! both the lookup walk and the teardown are iterative.

mod pager;

use core::{
    fmt,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

use minos_frame::vm::VmFrame;

pub use self::pager::Pager;
use crate::{mm::page_cache, prelude::*};

/// The identity of a memory object: the page cache attribution key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VmoId(u64);

impl VmoId {
    fn alloc() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        VmoId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for VmoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "vmo#{}", self.0)
    }
}

enum VmoBacking {
    /// Zero-filled, store-less pages.
    Anon,
    /// Pages fetched from and written back to a pager. Holding the
    /// pager `Arc` is what keeps the underlying vnode alive while
    /// mappings exist.
    File { pager: Arc<dyn Pager> },
    /// A copy-on-write overlay. `bottom` is the bottom-most non-shadow
    /// ancestor, maintained so that reaching it never requires walking
    /// the chain.
    Shadow { parent: Arc<Vmo>, bottom: Arc<Vmo> },
}

/// A memory object. Always handled as `Arc<Vmo>`.
pub struct Vmo {
    id: VmoId,
    backing: VmoBacking,
    /// On a non-shadow object: how many live mappings have an object
    /// chain that bottoms out here. Kept zero on shadows.
    mappers: AtomicUsize,
}

impl Vmo {
    /// Creates an anonymous object.
    pub fn new_anon() -> Arc<Self> {
        Arc::new(Self {
            id: VmoId::alloc(),
            backing: VmoBacking::Anon,
            mappers: AtomicUsize::new(0),
        })
    }

    /// Creates a file-backed object over `pager`.
    ///
    /// Vnodes call this once and hand the same object to every mapper
    /// so that shared mappings observe each other's stores.
    pub fn new_file(pager: Arc<dyn Pager>) -> Arc<Self> {
        Arc::new(Self {
            id: VmoId::alloc(),
            backing: VmoBacking::File { pager },
            mappers: AtomicUsize::new(0),
        })
    }

    /// Creates a shadow object over `parent`, which may itself be a
    /// shadow.
    pub fn new_shadow(parent: Arc<Vmo>) -> Arc<Self> {
        let bottom = match &parent.backing {
            VmoBacking::Shadow { bottom, .. } => bottom.clone(),
            _ => parent.clone(),
        };
        Arc::new(Self {
            id: VmoId::alloc(),
            backing: VmoBacking::Shadow { parent, bottom },
            mappers: AtomicUsize::new(0),
        })
    }

    pub fn id(&self) -> VmoId {
        self.id
    }

    pub fn is_shadow(&self) -> bool {
        matches!(self.backing, VmoBacking::Shadow { .. })
    }

    /// The parent of a shadow object, `None` otherwise.
    pub fn shadow_parent(&self) -> Option<Arc<Vmo>> {
        match &self.backing {
            VmoBacking::Shadow { parent, .. } => Some(parent.clone()),
            _ => None,
        }
    }

    /// The bottom-most non-shadow ancestor of a shadow object, `None`
    /// when this object is not a shadow (it is its own bottom then).
    pub fn shadow_bottom(&self) -> Option<Arc<Vmo>> {
        match &self.backing {
            VmoBacking::Shadow { bottom, .. } => Some(bottom.clone()),
            _ => None,
        }
    }

    /// The number of shadow links between this object and its bottom.
    pub fn chain_length(&self) -> usize {
        let mut len = 0;
        let mut cur = self;
        while let VmoBacking::Shadow { parent, .. } = &cur.backing {
            len += 1;
            cur = parent.as_ref();
        }
        len
    }

    pub(crate) fn add_mapper(&self) {
        debug_assert!(!self.is_shadow());
        self.mappers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn remove_mapper(&self) {
        debug_assert!(!self.is_shadow());
        let prev = self.mappers.fetch_sub(1, Ordering::Relaxed);
        debug_assert!(prev > 0);
    }

    /// How many live mappings bottom out at this (non-shadow) object.
    pub fn mapper_count(&self) -> usize {
        self.mappers.load(Ordering::Relaxed)
    }

    /// Returns the frame holding this object's page `index`.
    ///
    /// For a write access on a shadow object, the page is forced
    /// resident on *this* object: the cache miss invokes
    /// [`Vmo::fill_page`], which copies the current contents from the
    /// chain below. The returned frame is therefore private to this
    /// object and never shared with an ancestor.
    ///
    /// For a read access on a shadow object, the chain is walked
    /// downward and the first resident copy wins; the bottom object
    /// produces the page if no shadow holds one. The walk is iterative
    /// because chains can outgrow any reasonable stack.
    pub fn lookup_page(&self, index: usize, for_write: bool) -> Result<VmFrame> {
        if !self.is_shadow() || for_write {
            return page_cache().get(self, index);
        }
        let mut cur = self;
        loop {
            match &cur.backing {
                VmoBacking::Shadow { parent, .. } => {
                    if let Some(frame) = page_cache().get_resident(cur.id, index) {
                        return Ok(frame);
                    }
                    cur = parent.as_ref();
                }
                _ => return page_cache().get(cur, index),
            }
        }
    }

    /// Produces the contents of page `index` into `frame`.
    ///
    /// Called by the page cache with the slot held busy and the cache
    /// lock released.
    pub(crate) fn fill_page(&self, index: usize, frame: &VmFrame) -> Result<()> {
        match &self.backing {
            VmoBacking::Anon => {
                frame.zero();
                page_cache().pin(self.id, index);
                Ok(())
            }
            VmoBacking::File { pager } => pager.read_page(index, frame),
            VmoBacking::Shadow { parent, .. } => {
                // The page is not resident on this shadow (otherwise
                // there would have been no miss); copy the first
                // resident version found below, or fetch from the
                // bottom object. Iterative for the same reason as the
                // lookup walk.
                let mut cur = parent.as_ref();
                loop {
                    match &cur.backing {
                        VmoBacking::Shadow { parent: next, .. } => {
                            if let Some(src) = page_cache().get_resident(cur.id, index) {
                                frame.copy_from_frame(&src);
                                page_cache().pin(self.id, index);
                                return Ok(());
                            }
                            cur = next.as_ref();
                        }
                        _ => {
                            let src = page_cache().get(cur, index)?;
                            frame.copy_from_frame(&src);
                            page_cache().pin(self.id, index);
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Notes that page `index` has been modified.
    ///
    /// Only file-backed pages track dirtiness; anonymous and shadow
    /// pages have no backing store to diverge from.
    pub fn dirty_page(&self, index: usize) {
        if let VmoBacking::File { .. } = self.backing {
            page_cache().mark_dirty(self.id, index);
        }
    }

    /// Writes page `index` back to the backing store if it is dirty.
    pub fn clean_page(&self, index: usize) -> Result<()> {
        let VmoBacking::File { pager } = &self.backing else {
            return Ok(());
        };
        let Some(frame) = page_cache().get_resident(self.id, index) else {
            return Ok(());
        };
        if page_cache().clear_dirty(self.id, index) {
            pager.write_page(index, &frame)?;
        }
        Ok(())
    }

    /// Reads bytes at byte `offset` within the object.
    pub fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let pos = offset + done;
            let index = pos / PAGE_SIZE;
            let page_off = pos % PAGE_SIZE;
            let chunk = (buf.len() - done).min(PAGE_SIZE - page_off);
            let frame = self.lookup_page(index, false)?;
            frame.read_bytes(page_off, &mut buf[done..done + chunk])?;
            done += chunk;
        }
        Ok(())
    }

    /// Writes bytes at byte `offset` within the object.
    pub fn write_bytes(&self, offset: usize, buf: &[u8]) -> Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let pos = offset + done;
            let index = pos / PAGE_SIZE;
            let page_off = pos % PAGE_SIZE;
            let chunk = (buf.len() - done).min(PAGE_SIZE - page_off);
            let frame = self.lookup_page(index, true)?;
            frame.write_bytes(page_off, &buf[done..done + chunk])?;
            self.dirty_page(index);
            done += chunk;
        }
        Ok(())
    }

    fn release_pages(&self) {
        let writeback = match &self.backing {
            VmoBacking::File { pager } => Some(pager.as_ref()),
            _ => None,
        };
        page_cache().release_vmo(self.id, writeback);
    }

    fn detach_parent(&mut self) -> Option<Arc<Vmo>> {
        match core::mem::replace(&mut self.backing, VmoBacking::Anon) {
            VmoBacking::Shadow { parent, .. } => Some(parent),
            other => {
                self.backing = other;
                None
            }
        }
    }
}

impl Drop for Vmo {
    fn drop(&mut self) {
        self.release_pages();
        // Tear down the chain iteratively: detach each exclusively
        // held ancestor before letting it drop, so the stack depth
        // stays constant no matter how long the chain is. An ancestor
        // still referenced elsewhere ends the walk.
        let mut parent = self.detach_parent();
        while let Some(ancestor) = parent {
            parent = match Arc::try_unwrap(ancestor) {
                Ok(mut vmo) => vmo.detach_parent(),
                Err(_) => None,
            };
        }
    }
}

impl fmt::Debug for Vmo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.backing {
            VmoBacking::Anon => "anon",
            VmoBacking::File { .. } => "file",
            VmoBacking::Shadow { .. } => "shadow",
        };
        write!(f, "{:?}({})", self.id, kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anon_pages_zero_filled_and_pinned() {
        let vmo = Vmo::new_anon();
        let frame = vmo.lookup_page(0, false).unwrap();
        let mut buf = [0xffu8; 8];
        frame.read_bytes(0, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 8]);
        assert_eq!(page_cache().pin_count(vmo.id(), 0), Some(1));
    }

    #[test]
    fn test_release_rule_frees_resident_pages() {
        let vmo = Vmo::new_anon();
        let id = vmo.id();
        vmo.lookup_page(0, true).unwrap();
        vmo.lookup_page(3, true).unwrap();
        assert_eq!(page_cache().nr_resident(id), 2);
        drop(vmo);
        assert_eq!(page_cache().nr_resident(id), 0);
    }

    #[test]
    fn test_shadow_read_falls_through_to_parent() {
        let parent = Vmo::new_anon();
        parent.write_bytes(0, &[0xaa]).unwrap();
        let shadow = Vmo::new_shadow(parent.clone());

        let mut buf = [0u8; 1];
        shadow.read_bytes(0, &mut buf).unwrap();
        assert_eq!(buf, [0xaa]);
        // Read never allocates on the shadow itself.
        assert_eq!(page_cache().nr_resident(shadow.id()), 0);
    }

    #[test]
    fn test_shadow_write_promotes_private_copy() {
        let parent = Vmo::new_anon();
        parent.write_bytes(0, &[0xaa]).unwrap();
        let shadow = Vmo::new_shadow(parent.clone());

        shadow.write_bytes(0, &[0xbb]).unwrap();

        let mut buf = [0u8; 1];
        shadow.read_bytes(0, &mut buf).unwrap();
        assert_eq!(buf, [0xbb]);
        parent.read_bytes(0, &mut buf).unwrap();
        assert_eq!(buf, [0xaa]);
        assert_eq!(page_cache().nr_resident(shadow.id()), 1);
        assert_eq!(page_cache().pin_count(shadow.id(), 0), Some(1));
    }

    #[test]
    fn test_shadow_copy_preserves_parent_contents() {
        let parent = Vmo::new_anon();
        parent.write_bytes(10, b"before").unwrap();
        let shadow = Vmo::new_shadow(parent.clone());

        // A write to one byte must copy the whole page, not zero it.
        shadow.write_bytes(0, &[1]).unwrap();
        let mut buf = [0u8; 6];
        shadow.read_bytes(10, &mut buf).unwrap();
        assert_eq!(&buf, b"before");
    }

    #[test]
    fn test_bottom_pointer_skips_chain() {
        let bottom = Vmo::new_anon();
        let s1 = Vmo::new_shadow(bottom.clone());
        let s2 = Vmo::new_shadow(s1.clone());
        let s3 = Vmo::new_shadow(s2.clone());

        assert!(Arc::ptr_eq(&s3.shadow_bottom().unwrap(), &bottom));
        assert!(bottom.shadow_bottom().is_none());
        assert_eq!(s3.chain_length(), 3);
        assert_eq!(bottom.chain_length(), 0);
    }

    #[test]
    fn test_long_chain_walk_and_teardown() {
        let bottom = Vmo::new_anon();
        bottom.write_bytes(0, &[0x5a]).unwrap();

        let mut top = Vmo::new_shadow(bottom.clone());
        for _ in 1..10_000 {
            top = Vmo::new_shadow(top);
        }
        assert_eq!(top.chain_length(), 10_000);

        // Read through the whole chain without recursing.
        let mut buf = [0u8; 1];
        top.read_bytes(0, &mut buf).unwrap();
        assert_eq!(buf, [0x5a]);

        // Tearing down the chain must not recurse either.
        drop(top);
        assert_eq!(page_cache().nr_resident(bottom.id()), 1);
    }

    #[test]
    fn test_middle_shadow_copy_wins_over_bottom() {
        let bottom = Vmo::new_anon();
        bottom.write_bytes(0, &[1]).unwrap();
        let middle = Vmo::new_shadow(bottom.clone());
        middle.write_bytes(0, &[2]).unwrap();
        let top = Vmo::new_shadow(middle.clone());

        let mut buf = [0u8; 1];
        top.read_bytes(0, &mut buf).unwrap();
        assert_eq!(buf, [2]);

        // Promoting on the top copies the middle version, not the
        // bottom one.
        top.write_bytes(1, &[9]).unwrap();
        top.read_bytes(0, &mut buf).unwrap();
        assert_eq!(buf, [2]);
    }
}
