//! Lock-free atomic metrics collection.
//!
//! All operations use `Relaxed` ordering: the counters are independent
//! measurements and no reader relies on ordering between them.

use super::FetchSnapshot;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Counters for one tile source.
pub struct FetchMetrics {
    start_time: Instant,

    // === Scheduling ===
    passes: AtomicU64,
    tiles_requested: AtomicU64,

    // === Storage ===
    storage_hits: AtomicU64,
    storage_misses: AtomicU64,
    storage_writes: AtomicU64,

    // === Downloads ===
    downloads_started: AtomicU64,
    downloads_completed: AtomicU64,
    bytes_downloaded: AtomicU64,
    retries: AtomicU64,
    not_found: AtomicU64,
    auth_challenges: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    out_of_view: AtomicU64,
    empty_tiles: AtomicU64,

    // === Eviction ===
    evictions: AtomicU64,
    bytes_evicted: AtomicU64,
}

impl FetchMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            passes: AtomicU64::new(0),
            tiles_requested: AtomicU64::new(0),
            storage_hits: AtomicU64::new(0),
            storage_misses: AtomicU64::new(0),
            storage_writes: AtomicU64::new(0),
            downloads_started: AtomicU64::new(0),
            downloads_completed: AtomicU64::new(0),
            bytes_downloaded: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            auth_challenges: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            out_of_view: AtomicU64::new(0),
            empty_tiles: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            bytes_evicted: AtomicU64::new(0),
        }
    }

    pub fn pass_completed(&self) {
        self.passes.fetch_add(1, Ordering::Relaxed);
    }

    /// A new address entered the request table.
    pub fn tile_requested(&self) {
        self.tiles_requested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn storage_hit(&self) {
        self.storage_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn storage_miss(&self) {
        self.storage_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn storage_write(&self) {
        self.storage_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// One HTTP attempt started.
    pub fn download_started(&self) {
        self.downloads_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn download_completed(&self, bytes: u64) {
        self.downloads_completed.fetch_add(1, Ordering::Relaxed);
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn retry_scheduled(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn auth_challenge(&self) {
        self.auth_challenges.fetch_add(1, Ordering::Relaxed);
    }

    /// A tile was given up on (attempts exhausted, auth refused, bad stream).
    pub fn tile_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// An in-flight download was withdrawn before it finished.
    pub fn cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn out_of_view(&self) {
        self.out_of_view.fetch_add(1, Ordering::Relaxed);
    }

    pub fn empty_tile(&self) {
        self.empty_tiles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn evicted(&self, tiles: u64, bytes: u64) {
        self.evictions.fetch_add(tiles, Ordering::Relaxed);
        self.bytes_evicted.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Copies every counter.
    pub fn snapshot(&self) -> FetchSnapshot {
        let uptime = self.start_time.elapsed();
        let bytes_downloaded = self.bytes_downloaded.load(Ordering::Relaxed);
        let secs = uptime.as_secs_f64();
        FetchSnapshot {
            uptime,
            passes: self.passes.load(Ordering::Relaxed),
            tiles_requested: self.tiles_requested.load(Ordering::Relaxed),
            storage_hits: self.storage_hits.load(Ordering::Relaxed),
            storage_misses: self.storage_misses.load(Ordering::Relaxed),
            storage_writes: self.storage_writes.load(Ordering::Relaxed),
            downloads_started: self.downloads_started.load(Ordering::Relaxed),
            downloads_completed: self.downloads_completed.load(Ordering::Relaxed),
            bytes_downloaded,
            retries: self.retries.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            auth_challenges: self.auth_challenges.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            out_of_view: self.out_of_view.load(Ordering::Relaxed),
            empty_tiles: self.empty_tiles.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            bytes_evicted: self.bytes_evicted.load(Ordering::Relaxed),
            bytes_per_second: if secs > 0.0 {
                bytes_downloaded as f64 / secs
            } else {
                0.0
            },
        }
    }
}

impl Default for FetchMetrics {
    fn default() -> Self {
        Self::new()
    }
}
