//! Address → entry mapping with recency order.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use super::entry::TileEntry;
use crate::coord::TileAddress;

pub(super) struct Slot {
    pub(super) entry: Arc<TileEntry>,
    pub(super) stamp: u64,
    pub(super) size: u64,
}

/// State guarded by the table lock.
///
/// Invariants kept by every operation:
/// - each address appears once in `slots`
/// - `recency` holds exactly one stamp per slot, and the slot records it
/// - `total_bytes` is the sum of slot sizes
pub(super) struct TableInner {
    pub(super) slots: HashMap<TileAddress, Slot>,
    pub(super) recency: BTreeMap<u64, TileAddress>,
    pub(super) next_stamp: u64,
    pub(super) total_bytes: u64,
}

impl TableInner {
    /// Moves `address` to the most-recently-touched position.
    pub(super) fn bump(&mut self, address: &TileAddress) {
        let stamp = self.next_stamp;
        if let Some(slot) = self.slots.get_mut(address) {
            self.recency.remove(&slot.stamp);
            slot.stamp = stamp;
            self.recency.insert(stamp, *address);
            self.next_stamp += 1;
        }
    }

    pub(super) fn take(&mut self, address: &TileAddress) -> Option<Arc<TileEntry>> {
        let slot = self.slots.remove(address)?;
        self.recency.remove(&slot.stamp);
        self.total_bytes = self.total_bytes.saturating_sub(slot.size);
        slot.entry.release();
        Some(slot.entry)
    }
}

/// Requested and resolved tiles of one source.
///
/// An address is present from the moment it is first requested until it is
/// evicted, invalidated, dropped after a failed fetch, or the source is torn
/// down. Presence is what deduplicates requests.
pub struct RequestTable {
    pub(super) inner: Mutex<TableInner>,
}

impl RequestTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner {
                slots: HashMap::new(),
                recency: BTreeMap::new(),
                next_stamp: 0,
                total_bytes: 0,
            }),
        }
    }

    /// Inserts a pending entry for an absent address, or bumps the recency of
    /// a present one.
    ///
    /// Returns `true` only when the entry was inserted, i.e. when the caller
    /// must start a fetch.
    pub fn touch_or_insert(&self, address: TileAddress) -> bool {
        let mut inner = self.inner.lock();
        if inner.slots.contains_key(&address) {
            inner.bump(&address);
            return false;
        }
        let stamp = inner.next_stamp;
        inner.next_stamp += 1;
        inner.recency.insert(stamp, address);
        inner.slots.insert(
            address,
            Slot {
                entry: Arc::new(TileEntry::pending(address)),
                stamp,
                size: 0,
            },
        );
        true
    }

    pub fn get(&self, address: &TileAddress) -> Option<Arc<TileEntry>> {
        self.inner
            .lock()
            .slots
            .get(address)
            .map(|slot| Arc::clone(&slot.entry))
    }

    pub fn contains(&self, address: &TileAddress) -> bool {
        self.inner.lock().slots.contains_key(address)
    }

    /// Stores a fetch result for a present address.
    ///
    /// Results for addresses that were evicted or invalidated while in flight
    /// are discarded and `None` is returned.
    pub fn update(&self, address: &TileAddress, bytes: Option<Bytes>) -> Option<Arc<TileEntry>> {
        let mut inner = self.inner.lock();
        let slot = inner.slots.get_mut(address)?;
        let previous = slot.size;
        slot.size = slot.entry.resolve(bytes);
        let size = slot.size;
        let entry = Arc::clone(&slot.entry);
        inner.total_bytes = inner.total_bytes.saturating_sub(previous) + size;
        Some(entry)
    }

    /// Removes and releases an entry.
    pub fn remove(&self, address: &TileAddress) -> Option<Arc<TileEntry>> {
        self.inner.lock().take(address)
    }

    /// Removes and releases every entry. Returns how many were removed.
    pub fn drain(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.slots.len();
        for (_, slot) in inner.slots.drain() {
            slot.entry.release();
        }
        inner.recency.clear();
        inner.total_bytes = 0;
        count
    }

    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().slots.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.inner.lock().total_bytes
    }

    /// Addresses of entries whose fetch has not completed.
    pub fn pending_addresses(&self) -> Vec<TileAddress> {
        self.inner
            .lock()
            .slots
            .iter()
            .filter(|(_, slot)| slot.entry.is_pending())
            .map(|(address, _)| *address)
            .collect()
    }

    /// Addresses from least to most recently touched.
    pub fn recency_order(&self) -> Vec<TileAddress> {
        self.inner.lock().recency.values().copied().collect()
    }
}

impl Default for RequestTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(level: u8, x: u32, y: u32) -> TileAddress {
        TileAddress::new(level, x, y)
    }

    #[test]
    fn test_insert_then_touch() {
        let table = RequestTable::new();
        assert!(table.touch_or_insert(addr(1, 0, 0)));
        assert!(!table.touch_or_insert(addr(1, 0, 0)));
        assert_eq!(table.len(), 1);
        assert!(table.get(&addr(1, 0, 0)).unwrap().is_pending());
    }

    #[test]
    fn test_touch_moves_to_most_recent() {
        let table = RequestTable::new();
        table.touch_or_insert(addr(1, 0, 0));
        table.touch_or_insert(addr(1, 1, 0));
        table.touch_or_insert(addr(1, 0, 1));
        table.touch_or_insert(addr(1, 0, 0));

        assert_eq!(
            table.recency_order(),
            vec![addr(1, 1, 0), addr(1, 0, 1), addr(1, 0, 0)]
        );
    }

    #[test]
    fn test_update_tracks_total_bytes() {
        let table = RequestTable::new();
        table.touch_or_insert(addr(1, 0, 0));
        table.touch_or_insert(addr(1, 1, 0));

        table.update(&addr(1, 0, 0), Some(Bytes::from(vec![0u8; 100])));
        table.update(&addr(1, 1, 0), Some(Bytes::from(vec![0u8; 50])));
        assert_eq!(table.total_bytes(), 150);

        // Replacing a resolved entry swaps its size
        table.update(&addr(1, 1, 0), Some(Bytes::from(vec![0u8; 20])));
        assert_eq!(table.total_bytes(), 120);
    }

    #[test]
    fn test_update_absent_address_is_discarded() {
        let table = RequestTable::new();
        assert!(table
            .update(&addr(3, 1, 1), Some(Bytes::from_static(b"late")))
            .is_none());
        assert!(table.is_empty());
        assert_eq!(table.total_bytes(), 0);
    }

    #[test]
    fn test_remove_releases_entry() {
        let table = RequestTable::new();
        table.touch_or_insert(addr(1, 0, 0));
        table.update(&addr(1, 0, 0), Some(Bytes::from_static(b"abc")));
        let entry = table.get(&addr(1, 0, 0)).unwrap();

        table.remove(&addr(1, 0, 0));
        assert!(entry.is_released());
        assert_eq!(table.total_bytes(), 0);
        assert!(table.recency_order().is_empty());
    }

    #[test]
    fn test_drain_empties_table() {
        let table = RequestTable::new();
        for x in 0..4 {
            table.touch_or_insert(addr(2, x, 0));
            table.update(&addr(2, x, 0), Some(Bytes::from_static(b"abcd")));
        }
        assert_eq!(table.drain(), 4);
        assert!(table.is_empty());
        assert_eq!(table.total_bytes(), 0);
        assert!(table.recency_order().is_empty());
    }

    #[test]
    fn test_pending_addresses() {
        let table = RequestTable::new();
        table.touch_or_insert(addr(1, 0, 0));
        table.touch_or_insert(addr(1, 1, 0));
        table.update(&addr(1, 0, 0), None);
        assert_eq!(table.pending_addresses(), vec![addr(1, 1, 0)]);
    }
}
