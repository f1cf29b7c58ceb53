// SPDX-License-Identifier: MPL-2.0

use minos_frame::vm::VmFrame;

use super::vnode::Vnode;
use crate::{
    prelude::*,
    vm::vmo::{Pager, Vmo},
};

/// A vnode whose backing store is a byte vector in kernel memory.
///
/// This is the stand-in for an on-disk file: page reads and writes
/// copy between frames and the vector, so the page cache, dirty
/// tracking, and write-back behave exactly as they would over a real
/// block device, minus the I/O latency.
pub struct RamVnode {
    disk: Mutex<Vec<u8>>,
    mapped: Mutex<Weak<Vmo>>,
}

impl RamVnode {
    /// Creates a file of `size` zero bytes.
    pub fn new(size: usize) -> Arc<Self> {
        Arc::new(Self {
            disk: Mutex::new(vec![0u8; size]),
            mapped: Mutex::new(Weak::new()),
        })
    }

    /// Creates a file holding a copy of `contents`.
    pub fn with_contents(contents: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            disk: Mutex::new(contents.to_vec()),
            mapped: Mutex::new(Weak::new()),
        })
    }

    /// Reads the raw backing bytes, bypassing the page cache. Only
    /// write-back makes cached stores visible here.
    pub fn backing_bytes(&self) -> Vec<u8> {
        self.disk.lock().clone()
    }
}

impl Pager for RamVnode {
    fn read_page(&self, idx: usize, frame: &VmFrame) -> Result<()> {
        let disk = self.disk.lock();
        let start = idx * PAGE_SIZE;
        let mut page = [0u8; PAGE_SIZE];
        if start < disk.len() {
            let n = (disk.len() - start).min(PAGE_SIZE);
            page[..n].copy_from_slice(&disk[start..start + n]);
        }
        frame.write_bytes(0, &page)?;
        Ok(())
    }

    fn write_page(&self, idx: usize, frame: &VmFrame) -> Result<()> {
        let mut disk = self.disk.lock();
        let start = idx * PAGE_SIZE;
        let end = start + PAGE_SIZE;
        if disk.len() < end {
            disk.resize(end, 0);
        }
        frame.read_bytes(0, &mut disk[start..end])?;
        Ok(())
    }

    fn npages(&self) -> usize {
        self.disk.lock().len().div_ceil(PAGE_SIZE)
    }
}

impl Vnode for RamVnode {
    fn size(&self) -> usize {
        self.disk.lock().len()
    }

    fn mapped_vmo(self: Arc<Self>) -> Arc<Vmo> {
        let mut mapped = self.mapped.lock();
        if let Some(vmo) = mapped.upgrade() {
            return vmo;
        }
        let vmo = Vmo::new_file(self.clone());
        *mapped = Arc::downgrade(&vmo);
        vmo
    }

    fn read_at(self: Arc<Self>, offset: usize, buf: &mut [u8]) -> Result<usize> {
        let size = self.size();
        if offset >= size {
            return Ok(0);
        }
        let len = buf.len().min(size - offset);
        let vmo = self.mapped_vmo();
        vmo.read_bytes(offset, &mut buf[..len])?;
        Ok(len)
    }

    fn write_at(self: Arc<Self>, offset: usize, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        {
            // Growing the file only moves the size; the new bytes land
            // in the page cache and reach the backing store on
            // write-back.
            let mut disk = self.disk.lock();
            let end = offset + buf.len();
            if disk.len() < end {
                disk.resize(end, 0);
            }
        }
        let vmo = self.mapped_vmo();
        vmo.write_bytes(offset, buf)?;
        Ok(buf.len())
    }
}
