// SPDX-License-Identifier: MPL-2.0

//! The layout of one process's user virtual memory: the root VMAR
//! holding all mappings, plus the heap window managed by `brk`.

mod heap;

pub use self::heap::{Heap, USER_HEAP_BASE};
use crate::{prelude::*, vm::vmar::Vmar};

/// The user virtual memory of one process.
pub struct ProcessVm {
    root_vmar: Mutex<Option<Arc<Vmar>>>,
    heap: Heap,
}

impl ProcessVm {
    /// Allocates a fresh address space with the heap's initial data
    /// page mapped.
    pub fn alloc() -> Result<Self> {
        let root_vmar = Vmar::new();
        let heap = Heap::new();
        heap.alloc_and_map(&root_vmar)?;
        Ok(Self {
            root_vmar: Mutex::new(Some(root_vmar)),
            heap,
        })
    }

    /// Builds the child's memory for fork: a structural copy of the
    /// parent's VMAR (objects shared, translations not) and the same
    /// heap bounds. Shadow interposition is the fork path's job.
    pub fn fork_from(other: &ProcessVm) -> Self {
        let root_vmar = other.root_vmar().duplicate();
        Self {
            root_vmar: Mutex::new(Some(root_vmar)),
            heap: other.heap.clone(),
        }
    }

    /// The root VMAR. Panics after [`ProcessVm::clear`]; only the exit
    /// path tears the address space down, and nothing faults on a
    /// zombie.
    pub fn root_vmar(&self) -> Arc<Vmar> {
        self.root_vmar
            .lock()
            .as_ref()
            .expect("the address space was torn down")
            .clone()
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Moves the program break. `None` queries the current break.
    pub fn brk(&self, new_brk: Option<Vaddr>) -> Result<Vaddr> {
        self.heap.brk(&self.root_vmar(), new_brk)
    }

    /// Drops the address space: every mapping releases its memory
    /// object reference.
    pub(super) fn clear(&self) {
        *self.root_vmar.lock() = None;
    }
}
