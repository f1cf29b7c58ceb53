// SPDX-License-Identifier: MPL-2.0

//! Intervals and interval sets used in VMARs.

use core::ops::Bound;

use crate::prelude::*;

/// The interval of an item in an interval set.
///
/// All items in the interval set must have a range.
pub trait Interval<K: Clone> {
    /// Returns the range of the interval.
    fn range(&self) -> Range<K>;
}

/// A collection that contains non-overlapping intervals as items,
/// ordered by their start point.
///
/// In particular, the collection allows one to retrieve interval items
/// that intersect with a point of value or range of values.
#[derive(Debug)]
pub struct IntervalSet<K, V>
where
    K: Clone + Ord,
    V: Interval<K>,
{
    btree: BTreeMap<K, V>,
}

impl<K, V> Default for IntervalSet<K, V>
where
    K: Clone + Ord,
    V: Interval<K>,
{
    fn default() -> Self {
        Self::new()
    }
}

#[allow(dead_code)]
impl<K, V> IntervalSet<K, V>
where
    K: Clone + Ord,
    V: Interval<K>,
{
    /// Creates a new interval set.
    pub const fn new() -> Self {
        Self {
            btree: BTreeMap::new(),
        }
    }

    /// Inserts an interval item into the interval set.
    ///
    /// The item's range must be disjoint from every existing item's.
    pub fn insert(&mut self, item: V) {
        let start = item.range().start;
        self.btree.insert(start, item);
    }

    /// Removes the interval item starting at `key`.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.btree.remove(key)
    }

    /// Returns an iterator over the interval items in ascending order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &V> {
        self.btree.values()
    }

    /// Returns a mutable iterator over the interval items in ascending
    /// order. Mutation must not move an item's start point.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut V> {
        self.btree.values_mut()
    }

    /// Returns the number of interval items.
    pub fn len(&self) -> usize {
        self.btree.len()
    }

    /// Returns whether the set holds no items.
    pub fn is_empty(&self) -> bool {
        self.btree.is_empty()
    }

    /// Finds the interval item that contains the given point, if any.
    pub fn find_one(&self, point: &K) -> Option<&V> {
        // Only the last item starting at or before the point can
        // contain it.
        self.btree
            .range(..=point.clone())
            .next_back()
            .map(|(_, item)| item)
            .filter(|item| item.range().end > *point)
    }

    /// Finds the interval item that contains the given point and
    /// returns it mutably. Mutation must not move the start point past
    /// the point queried for.
    pub fn find_one_mut(&mut self, point: &K) -> Option<&mut V> {
        let key = self
            .btree
            .range(..=point.clone())
            .next_back()
            .filter(|(_, item)| item.range().end > *point)
            .map(|(key, _)| key.clone())?;
        self.btree.get_mut(&key)
    }

    /// Finds all interval items that intersect with the given range,
    /// in ascending order.
    pub fn find<'a>(&'a self, range: &Range<K>) -> impl Iterator<Item = &'a V> {
        let is_empty = range.start >= range.end;
        // One item starting at or before the range may reach into it;
        // every other intersecting item starts inside the range.
        let head = if is_empty {
            None
        } else {
            self.btree
                .range(..=range.start.clone())
                .next_back()
                .map(|(_, item)| item)
                .filter(|item| item.range().end > range.start)
        };
        let rest = if is_empty {
            None
        } else {
            Some(
                self.btree
                    .range((
                        Bound::Excluded(range.start.clone()),
                        Bound::Excluded(range.end.clone()),
                    ))
                    .map(|(_, item)| item),
            )
        };
        head.into_iter().chain(rest.into_iter().flatten())
    }

    /// Takes the interval item that contains the given point, if any.
    pub fn take_one(&mut self, point: &K) -> Option<V> {
        let key = self.find_one(point)?.range().start;
        self.btree.remove(&key)
    }

    /// Takes all interval items that intersect with the given range,
    /// in ascending order.
    pub fn take(&mut self, range: &Range<K>) -> Vec<V> {
        let keys: Vec<K> = self.find(range).map(|item| item.range().start).collect();
        keys.iter()
            .map(|key| self.btree.remove(key).unwrap())
            .collect()
    }

    /// Clears the interval set, removing all items.
    pub fn clear(&mut self) {
        self.btree.clear();
    }
}
