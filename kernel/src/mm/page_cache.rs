// SPDX-License-Identifier: MPL-2.0

//! The central page cache.
//!
//! Every page frame holding the contents of some memory object is
//! interned here, keyed by `(object id, page index)`. The cache is the
//! single attribution point for resident pages: a memory object asks it
//! for a page (`get`), probes it without filling (`get_resident`), and
//! releases every page attributed to it when the object dies.
//!
//! A slot is *busy* from the moment it is inserted until its contents
//! are valid. The cache lock is never held while a page is being
//! filled; concurrent lookups of a busy slot sleep on the slot's wait
//! queue and observe only fully populated pages.

use minos_frame::{sync::WaitQueue, vm::VmFrame};

use crate::{
    prelude::*,
    vm::vmo::{Pager, Vmo, VmoId},
};

static PAGE_CACHE: PageCache = PageCache::new();

/// Returns the system-wide page cache.
pub fn page_cache() -> &'static PageCache {
    &PAGE_CACHE
}

/// The state of a cached page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PageState {
    /// The contents have not been produced yet. Only ever observed
    /// together with the busy flag.
    Uninit,
    /// The contents are valid and match the backing store.
    UpToDate,
    /// The contents are valid and newer than the backing store.
    Dirty,
}

struct PageSlot {
    frame: VmFrame,
    state: PageState,
    pin_count: usize,
    busy: bool,
    waitq: Arc<WaitQueue>,
}

/// The outcome of probing one cache slot under the lock.
enum Probe {
    Hit(VmFrame),
    Busy(Arc<WaitQueue>),
    Miss,
}

/// The cache of resident pages, keyed by `(VmoId, page index)`.
pub struct PageCache {
    slots: Mutex<BTreeMap<(VmoId, usize), PageSlot>>,
}

impl PageCache {
    const fn new() -> Self {
        Self {
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    fn probe(&self, key: (VmoId, usize)) -> Probe {
        let slots = self.slots.lock();
        match slots.get(&key) {
            Some(slot) if slot.busy => Probe::Busy(slot.waitq.clone()),
            Some(slot) => Probe::Hit(slot.frame.clone()),
            None => Probe::Miss,
        }
    }

    fn is_busy(&self, key: (VmoId, usize)) -> bool {
        self.slots.lock().get(&key).map_or(false, |slot| slot.busy)
    }

    /// Returns the page of `vmo` at `index`, filling it on a miss.
    ///
    /// On a miss a fresh frame is inserted busy, the cache lock is
    /// released, and the object's `fill_page` produces the contents
    /// (possibly re-entering the cache for an ancestor object). The
    /// slot becomes visible to other lookups only once valid.
    pub fn get(&self, vmo: &Vmo, index: usize) -> Result<VmFrame> {
        let key = (vmo.id(), index);
        loop {
            match self.probe(key) {
                Probe::Hit(frame) => return Ok(frame),
                Probe::Busy(waitq) => {
                    waitq.wait_until(|| (!self.is_busy(key)).then_some(()));
                    continue;
                }
                Probe::Miss => {}
            }

            let frame = {
                let mut slots = self.slots.lock();
                if slots.contains_key(&key) {
                    // Lost the race to another filler; probe again.
                    continue;
                }
                let frame = VmFrame::alloc()?;
                slots.insert(
                    key,
                    PageSlot {
                        frame: frame.clone(),
                        state: PageState::Uninit,
                        pin_count: 0,
                        busy: true,
                        waitq: Arc::new(WaitQueue::new()),
                    },
                );
                frame
            };

            let filled = vmo.fill_page(index, &frame);

            let mut slots = self.slots.lock();
            let waitq = slots[&key].waitq.clone();
            return match filled {
                Ok(()) => {
                    let slot = slots.get_mut(&key).unwrap();
                    slot.busy = false;
                    slot.state = PageState::UpToDate;
                    waitq.wake_all();
                    Ok(frame)
                }
                Err(e) => {
                    slots.remove(&key);
                    waitq.wake_all();
                    Err(e)
                }
            };
        }
    }

    /// Returns the page of object `id` at `index` iff it is resident,
    /// waiting first if it is busy.
    pub fn get_resident(&self, id: VmoId, index: usize) -> Option<VmFrame> {
        let key = (id, index);
        loop {
            match self.probe(key) {
                Probe::Hit(frame) => return Some(frame),
                Probe::Busy(waitq) => {
                    waitq.wait_until(|| (!self.is_busy(key)).then_some(()));
                }
                Probe::Miss => return None,
            }
        }
    }

    /// Pins the page so that it may not be evicted or freed from under
    /// its object. Pinning a busy slot is allowed; the filling object
    /// pins its own page before the fill completes.
    pub fn pin(&self, id: VmoId, index: usize) {
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(&(id, index))
            .expect("pin of non-resident page");
        slot.pin_count += 1;
    }

    /// Drops one pin from the page.
    pub fn unpin(&self, id: VmoId, index: usize) {
        let mut slots = self.slots.lock();
        let slot = slots
            .get_mut(&(id, index))
            .expect("unpin of non-resident page");
        debug_assert!(slot.pin_count > 0);
        slot.pin_count -= 1;
    }

    /// Marks the page as modified relative to its backing store.
    pub fn mark_dirty(&self, id: VmoId, index: usize) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get_mut(&(id, index)) {
            slot.state = PageState::Dirty;
        } else {
            warn!("dirtying a page that is not in the page cache");
        }
    }

    /// Downgrades the page from dirty to up-to-date, returning whether
    /// it was dirty. The caller performs the actual write-back.
    pub fn clear_dirty(&self, id: VmoId, index: usize) -> bool {
        let mut slots = self.slots.lock();
        match slots.get_mut(&(id, index)) {
            Some(slot) if slot.state == PageState::Dirty => {
                slot.state = PageState::UpToDate;
                true
            }
            _ => false,
        }
    }

    /// Removes one page from the cache, dropping its frame.
    pub fn free(&self, id: VmoId, index: usize) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.remove(&(id, index)) {
            debug_assert!(!slot.busy);
            debug_assert_eq!(slot.pin_count, 0);
        }
    }

    /// Releases every page attributed to object `id`: pinned pages are
    /// unpinned, dirty pages are written back through `writeback` when
    /// one is given, and the frames are freed.
    ///
    /// Write-back happens outside the cache lock.
    pub(crate) fn release_vmo(&self, id: VmoId, writeback: Option<&dyn Pager>) {
        let removed: Vec<(usize, PageSlot)> = {
            let mut slots = self.slots.lock();
            let keys: Vec<(VmoId, usize)> = slots
                .range((id, 0)..=(id, usize::MAX))
                .map(|(key, _)| *key)
                .collect();
            keys.into_iter()
                .map(|key| (key.1, slots.remove(&key).unwrap()))
                .collect()
        };
        for (index, slot) in removed {
            debug_assert!(!slot.busy);
            debug_assert!(slot.pin_count <= 1);
            if slot.state == PageState::Dirty {
                if let Some(pager) = writeback {
                    if let Err(e) = pager.write_page(index, &slot.frame) {
                        warn!("page {} lost on release: write-back failed: {}", index, e);
                    }
                }
            }
        }
    }

    /// Returns the number of resident pages attributed to object `id`.
    pub fn nr_resident(&self, id: VmoId) -> usize {
        self.slots
            .lock()
            .range((id, 0)..=(id, usize::MAX))
            .count()
    }

    /// Returns the pin count of the page, or `None` if not resident.
    pub fn pin_count(&self, id: VmoId, index: usize) -> Option<usize> {
        self.slots
            .lock()
            .get(&(id, index))
            .map(|slot| slot.pin_count)
    }

    /// Returns whether the page is resident and dirty.
    pub fn is_dirty(&self, id: VmoId, index: usize) -> bool {
        self.slots
            .lock()
            .get(&(id, index))
            .map_or(false, |slot| slot.state == PageState::Dirty)
    }
}
