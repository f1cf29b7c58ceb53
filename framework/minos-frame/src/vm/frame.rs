// SPDX-License-Identifier: MPL-2.0

use alloc::{boxed::Box, sync::Arc, vec};
use core::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
};

use spin::Mutex;

use super::Paddr;
use crate::{config::PAGE_SIZE, Error, Result};

// Fake physical addresses are handed out from a bump counter well
// above any address the kernel model itself uses.
const FRAME_PADDR_BASE: usize = 0x8000_0000;

static NEXT_PADDR: AtomicUsize = AtomicUsize::new(FRAME_PADDR_BASE);

/// A handle to a page frame (a physical memory page).
///
/// A cloned `VmFrame` refers to the same page frame as the original;
/// the frame is freed when the last handle is dropped. Frames are
/// zero-filled on allocation.
#[derive(Clone)]
pub struct VmFrame {
    inner: Arc<FrameInner>,
}

struct FrameInner {
    paddr: Paddr,
    bytes: Mutex<Box<[u8]>>,
}

impl VmFrame {
    /// Allocates a free, zero-filled frame.
    pub fn alloc() -> Result<Self> {
        let paddr = NEXT_PADDR.fetch_add(PAGE_SIZE, Ordering::Relaxed);
        let bytes = vec![0u8; PAGE_SIZE].into_boxed_slice();
        Ok(Self {
            inner: Arc::new(FrameInner {
                paddr,
                bytes: Mutex::new(bytes),
            }),
        })
    }

    /// Returns the physical address of the frame.
    pub fn paddr(&self) -> Paddr {
        self.inner.paddr
    }

    /// Returns the number of handles that refer to this frame.
    pub fn reference_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Reads `buf.len()` bytes starting at `offset` within the frame.
    pub fn read_bytes(&self, offset: usize, buf: &mut [u8]) -> Result<()> {
        if offset.checked_add(buf.len()).map_or(true, |end| end > PAGE_SIZE) {
            return Err(Error::InvalidArgs);
        }
        let bytes = self.inner.bytes.lock();
        buf.copy_from_slice(&bytes[offset..offset + buf.len()]);
        Ok(())
    }

    /// Writes `buf` starting at `offset` within the frame.
    pub fn write_bytes(&self, offset: usize, buf: &[u8]) -> Result<()> {
        if offset.checked_add(buf.len()).map_or(true, |end| end > PAGE_SIZE) {
            return Err(Error::InvalidArgs);
        }
        let mut bytes = self.inner.bytes.lock();
        bytes[offset..offset + buf.len()].copy_from_slice(buf);
        Ok(())
    }

    /// Copies the full contents of `src` into this frame.
    pub fn copy_from_frame(&self, src: &VmFrame) {
        if core::ptr::eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&src.inner)) {
            return;
        }
        let src_bytes = src.inner.bytes.lock();
        let mut bytes = self.inner.bytes.lock();
        bytes.copy_from_slice(&src_bytes);
    }

    /// Fills the frame with zeros.
    pub fn zero(&self) {
        let mut bytes = self.inner.bytes.lock();
        bytes.fill(0);
    }
}

impl fmt::Debug for VmFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmFrame")
            .field("paddr", &format_args!("{:#x}", self.inner.paddr))
            .finish()
    }
}
