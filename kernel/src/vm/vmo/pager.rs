// SPDX-License-Identifier: MPL-2.0

use minos_frame::vm::VmFrame;

use crate::prelude::*;

/// The backing store of a file-backed memory object.
///
/// A pager moves whole pages between a frame and wherever the file's
/// bytes persistently live. Reading may block on I/O; the page cache
/// keeps the page busy for the duration.
pub trait Pager: Send + Sync {
    /// Reads the `idx`-th page of the backing store into `frame`.
    ///
    /// Pages past the end of the store read as zeros.
    fn read_page(&self, idx: usize, frame: &VmFrame) -> Result<()>;

    /// Writes `frame` back to the `idx`-th page of the backing store.
    fn write_page(&self, idx: usize, frame: &VmFrame) -> Result<()>;

    /// Returns the number of pages the backing store currently holds.
    fn npages(&self) -> usize;
}
