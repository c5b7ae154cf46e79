//! In-memory cache storage using moka.
//!
//! Wraps `moka::sync::Cache` with a byte weigher and a per-entry expiry
//! derived from the `Expires` date the tile server sent. Expired entries are
//! never returned, even before moka's maintenance has reclaimed them.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use moka::sync::Cache as MokaCache;
use moka::Expiry;

use crate::cache::storage::{BoxFuture, CacheStorage, StorageError};

#[derive(Debug, Clone)]
struct StoredTile {
    bytes: Bytes,
    expires: Option<DateTime<Utc>>,
}

impl StoredTile {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires <= now)
    }

    fn time_to_live(&self) -> Option<Duration> {
        let expires = self.expires?;
        Some(
            (expires - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO),
        )
    }
}

/// Expires each entry at the date it was saved with.
struct ExpiresAt;

impl Expiry<String, StoredTile> for ExpiresAt {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredTile,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.time_to_live()
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredTile,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.time_to_live()
    }
}

/// In-memory tile storage.
///
/// Bounded by total bytes with moka's LRU-style eviction. Safe to share
/// between sources.
pub struct MemoryCacheStorage {
    cache: MokaCache<String, StoredTile>,
    max_size_bytes: AtomicU64,
}

impl MemoryCacheStorage {
    /// Creates a storage holding at most `max_size_bytes` of tile data.
    pub fn new(max_size_bytes: u64) -> Self {
        let cache = MokaCache::builder()
            // Weight each entry by its data size
            .weigher(|_key: &String, value: &StoredTile| -> u32 {
                value.bytes.len().min(u32::MAX as usize) as u32
            })
            .max_capacity(max_size_bytes)
            .expire_after(ExpiresAt)
            .build();

        Self {
            cache,
            max_size_bytes: AtomicU64::new(max_size_bytes),
        }
    }

    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes.load(Ordering::Relaxed)
    }

    pub fn size_bytes(&self) -> u64 {
        self.cache.weighted_size()
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn remove(&self, name: &str) -> bool {
        self.cache.remove(name).is_some()
    }

    /// Runs moka's pending maintenance (eviction, expiry, counters).
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }
}

impl CacheStorage for MemoryCacheStorage {
    fn load(&self, name: &str) -> Result<Option<Bytes>, StorageError> {
        Ok(self
            .cache
            .get(name)
            .filter(|tile| !tile.is_expired(Utc::now()))
            .map(|tile| tile.bytes))
    }

    fn load_async(&self, name: &str) -> BoxFuture<'_, Result<Option<Bytes>, StorageError>> {
        let name = name.to_string();
        Box::pin(async move { self.load(&name) })
    }

    fn save(
        &self,
        name: &str,
        expires: Option<DateTime<Utc>>,
        bytes: Bytes,
    ) -> Result<(), StorageError> {
        let size = bytes.len() as u64;
        let max = self.max_size_bytes();
        if size > max {
            return Err(StorageError::TooLarge { size, max });
        }
        if expires.is_some_and(|e| e <= Utc::now()) {
            // Already stale, nothing worth keeping.
            self.cache.invalidate(name);
            return Ok(());
        }
        self.cache
            .insert(name.to_string(), StoredTile { bytes, expires });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_new() {
        let storage = MemoryCacheStorage::new(1_000_000);
        assert_eq!(storage.max_size_bytes(), 1_000_000);
        assert_eq!(storage.entry_count(), 0);
        assert_eq!(storage.size_bytes(), 0);
    }

    #[test]
    fn test_memory_storage_save_and_load() {
        let storage = MemoryCacheStorage::new(1_000_000);
        storage
            .save("osm.1x0x0", None, Bytes::from_static(&[1, 2, 3]))
            .unwrap();

        let value = storage.load("osm.1x0x0").unwrap();
        assert_eq!(value, Some(Bytes::from_static(&[1, 2, 3])));
    }

    #[test]
    fn test_memory_storage_load_missing() {
        let storage = MemoryCacheStorage::new(1_000_000);
        assert!(storage.load("nonexistent").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_storage_load_async() {
        let storage = MemoryCacheStorage::new(1_000_000);
        storage
            .save("osm.2x1x1", None, Bytes::from_static(b"tile"))
            .unwrap();

        let value = storage.load_async("osm.2x1x1").await.unwrap();
        assert_eq!(value, Some(Bytes::from_static(b"tile")));
    }

    #[test]
    fn test_memory_storage_future_expiry_is_kept() {
        let storage = MemoryCacheStorage::new(1_000_000);
        let expires = Utc::now() + chrono::Duration::hours(1);
        storage
            .save("osm.3x0x0", Some(expires), Bytes::from_static(b"fresh"))
            .unwrap();
        assert!(storage.load("osm.3x0x0").unwrap().is_some());
    }

    #[test]
    fn test_memory_storage_past_expiry_is_not_stored() {
        let storage = MemoryCacheStorage::new(1_000_000);
        let expires = Utc::now() - chrono::Duration::seconds(5);
        storage
            .save("osm.3x0x0", Some(expires), Bytes::from_static(b"stale"))
            .unwrap();
        assert!(storage.load("osm.3x0x0").unwrap().is_none());
    }

    #[test]
    fn test_memory_storage_expires_after_date() {
        let storage = MemoryCacheStorage::new(1_000_000);
        let expires = Utc::now() + chrono::Duration::milliseconds(50);
        storage
            .save("osm.4x0x0", Some(expires), Bytes::from_static(b"short"))
            .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        assert!(storage.load("osm.4x0x0").unwrap().is_none());
    }

    #[test]
    fn test_memory_storage_rejects_oversized() {
        let storage = MemoryCacheStorage::new(4);
        let result = storage.save("big", None, Bytes::from_static(b"too large"));
        assert!(matches!(result, Err(StorageError::TooLarge { .. })));
    }

    #[test]
    fn test_memory_storage_replace_existing() {
        let storage = MemoryCacheStorage::new(1_000_000);
        storage.save("k", None, Bytes::from_static(&[1, 2, 3])).unwrap();
        storage
            .save("k", None, Bytes::from_static(&[4, 5, 6, 7]))
            .unwrap();
        storage.run_pending_tasks();

        assert_eq!(
            storage.load("k").unwrap(),
            Some(Bytes::from_static(&[4, 5, 6, 7]))
        );
        assert_eq!(storage.entry_count(), 1);
    }

    #[test]
    fn test_memory_storage_eviction_by_size() {
        let storage = MemoryCacheStorage::new(2500);
        for i in 0..3 {
            storage
                .save(&format!("key{}", i), None, Bytes::from(vec![0u8; 1000]))
                .unwrap();
        }
        storage.run_pending_tasks();
        std::thread::sleep(Duration::from_millis(50));
        storage.run_pending_tasks();

        assert!(
            storage.size_bytes() <= 2500,
            "Expected size <= 2500, got {}",
            storage.size_bytes()
        );
    }

    #[test]
    fn test_memory_storage_remove() {
        let storage = MemoryCacheStorage::new(1_000_000);
        storage.save("k", None, Bytes::from_static(b"v")).unwrap();
        assert!(storage.remove("k"));
        assert!(!storage.remove("k"));
    }
}
