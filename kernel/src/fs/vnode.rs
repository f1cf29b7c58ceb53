// SPDX-License-Identifier: MPL-2.0

use crate::{
    prelude::*,
    vm::vmo::{Pager, Vmo},
};

/// An in-memory file object.
///
/// A vnode is both a [`Pager`] (it can move whole pages between frames
/// and its backing bytes) and the owner of at most one *mapped object*:
/// the file-backed memory object every mapping of this file shares.
/// Two processes that map the same vnode shared therefore see the same
/// page frames, and a store by one is visible to the other on its next
/// fault.
pub trait Vnode: Pager {
    /// The current size of the file in bytes.
    fn size(&self) -> usize;

    /// Returns the memory object backing mappings of this file,
    /// creating it on first use.
    ///
    /// The object holds a reference to the vnode; the vnode holds the
    /// object only weakly, so that once the last mapping goes away the
    /// object dies and its dirty pages are written back.
    fn mapped_vmo(self: Arc<Self>) -> Arc<Vmo>;

    /// Reads up to `buf.len()` bytes at byte `offset`, returning how
    /// many were read. Short reads happen only at end of file.
    fn read_at(self: Arc<Self>, offset: usize, buf: &mut [u8]) -> Result<usize>;

    /// Writes `buf` at byte `offset`, returning how many bytes were
    /// written.
    fn write_at(self: Arc<Self>, offset: usize, buf: &[u8]) -> Result<usize>;
}
