// SPDX-License-Identifier: MPL-2.0

use core::fmt;

use super::interval_set::Interval;
use crate::{
    prelude::*,
    vm::{perms::VmPerms, vmo::Vmo},
};

/// A contiguous run of virtual pages bound to a window of one memory
/// object, with one protection and one sharing policy.
///
/// A mapping is exclusively owned by the VMAR it lives in. It holds
/// exactly one reference on its memory object and is registered as a
/// mapper on the bottom object of that object's chain for as long as
/// it lives.
pub struct VmMapping {
    /// The virtual page-number range, half-open and never empty.
    range: Range<usize>,
    /// The page index within the VMO that `range.start` maps to.
    vmo_offset: usize,
    perms: VmPerms,
    is_shared: bool,
    vmo: Arc<Vmo>,
}

/// The bottom object of `vmo`'s chain: its last non-shadow ancestor,
/// or `vmo` itself when it is not a shadow.
fn bottom_of(vmo: &Arc<Vmo>) -> Arc<Vmo> {
    vmo.shadow_bottom().unwrap_or_else(|| vmo.clone())
}

impl VmMapping {
    pub(super) fn new(
        range: Range<usize>,
        vmo: Arc<Vmo>,
        vmo_offset: usize,
        perms: VmPerms,
        is_shared: bool,
    ) -> Self {
        debug_assert!(range.start < range.end);
        bottom_of(&vmo).add_mapper();
        Self {
            range,
            vmo_offset,
            perms,
            is_shared,
            vmo,
        }
    }

    pub fn perms(&self) -> VmPerms {
        self.perms
    }

    pub fn is_shared(&self) -> bool {
        self.is_shared
    }

    pub fn is_private(&self) -> bool {
        !self.is_shared
    }

    pub fn vmo(&self) -> &Arc<Vmo> {
        &self.vmo
    }

    pub fn vmo_offset(&self) -> usize {
        self.vmo_offset
    }

    pub fn contains(&self, vpn: usize) -> bool {
        self.range.contains(&vpn)
    }

    /// The object page index backing virtual page `vpn`.
    pub(super) fn page_index_of(&self, vpn: usize) -> usize {
        debug_assert!(self.contains(vpn));
        vpn - self.range.start + self.vmo_offset
    }

    /// Moves the end of the mapping. Used both to trim the tail away
    /// and to grow the heap mapping; the mapping must stay non-empty.
    pub(super) fn set_end(&mut self, new_end: usize) {
        debug_assert!(new_end > self.range.start);
        self.range.end = new_end;
    }

    /// Moves the start of the mapping up, keeping the
    /// page-index identity intact by advancing the object offset by
    /// the same amount.
    pub(super) fn advance_head(&mut self, new_start: usize) {
        debug_assert!(self.range.start < new_start && new_start < self.range.end);
        self.vmo_offset += new_start - self.range.start;
        self.range.start = new_start;
    }

    /// Splits the mapping at `at`, leaving the low half in place and
    /// returning the high half. The high half takes a new reference on
    /// the shared memory object.
    pub(super) fn split_off(&mut self, at: usize) -> VmMapping {
        debug_assert!(self.range.start < at && at < self.range.end);
        let high = VmMapping::new(
            at..self.range.end,
            self.vmo.clone(),
            self.vmo_offset + (at - self.range.start),
            self.perms,
            self.is_shared,
        );
        self.range.end = at;
        high
    }

    /// Swaps in a new backing object, releasing the reference on the
    /// old one. Used by fork to interpose fresh shadow objects.
    pub(super) fn replace_vmo(&mut self, new_vmo: Arc<Vmo>) {
        bottom_of(&new_vmo).add_mapper();
        let old_vmo = core::mem::replace(&mut self.vmo, new_vmo);
        bottom_of(&old_vmo).remove_mapper();
    }
}

impl Clone for VmMapping {
    fn clone(&self) -> Self {
        Self::new(
            self.range.clone(),
            self.vmo.clone(),
            self.vmo_offset,
            self.perms,
            self.is_shared,
        )
    }
}

impl Drop for VmMapping {
    fn drop(&mut self) {
        bottom_of(&self.vmo).remove_mapper();
    }
}

impl Interval<usize> for VmMapping {
    fn range(&self) -> Range<usize> {
        self.range.clone()
    }
}

impl fmt::Debug for VmMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:#x}-{:#x} {}{}{} {} {:?} off={}",
            self.range.start * PAGE_SIZE,
            self.range.end * PAGE_SIZE,
            if self.perms.contains(VmPerms::READ) { 'r' } else { '-' },
            if self.perms.contains(VmPerms::WRITE) { 'w' } else { '-' },
            if self.perms.contains(VmPerms::EXEC) { 'x' } else { '-' },
            if self.is_shared { " SHARED" } else { "PRIVATE" },
            self.vmo,
            self.vmo_offset,
        )
    }
}
