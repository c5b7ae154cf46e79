//! State shared by a source's scheduler, fetch executor and public handle.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use tokio::sync::{watch, Notify};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{EvictionBudget, EvictionReport, MinTilePolicy, RequestTable};
use crate::config::SourceConfig;
use crate::coord::{TileAddress, ViewportSnapshot};
use crate::scheduler::is_visible;
use crate::telemetry::FetchMetrics;

pub(crate) struct SourceShared {
    pub(crate) name: String,
    pub(crate) max_level: u8,
    pub(crate) table: RequestTable,
    pub(crate) viewport: watch::Sender<Option<ViewportSnapshot>>,
    /// Bumped every time a tile with bytes becomes available.
    pub(crate) available: watch::Sender<u64>,
    /// Full pass with the last viewport.
    pub(crate) refresh: Notify,
    /// Eviction only.
    pub(crate) maintain: Notify,
    pub(crate) abort: CancellationToken,
    pub(crate) metrics: FetchMetrics,
    max_cache_bytes: AtomicU64,
    min_tile_number: AtomicUsize,
    max_evictions_per_pass: Option<usize>,
    min_tile_policy: MinTilePolicy,
    level_count: usize,
}

impl SourceShared {
    pub(crate) fn new(config: &SourceConfig) -> Self {
        let cache = config.cache();
        let (viewport, _) = watch::channel(None);
        let (available, _) = watch::channel(0);
        Self {
            name: config.name().to_string(),
            max_level: config.max_level(),
            table: RequestTable::new(),
            viewport,
            available,
            refresh: Notify::new(),
            maintain: Notify::new(),
            abort: CancellationToken::new(),
            metrics: FetchMetrics::new(),
            max_cache_bytes: AtomicU64::new(cache.max_cache_bytes()),
            min_tile_number: AtomicUsize::new(
                cache.min_tile_policy().min_tile_number(0, config.level_count()),
            ),
            max_evictions_per_pass: cache.max_evictions_per_pass(),
            min_tile_policy: cache.min_tile_policy(),
            level_count: config.level_count(),
        }
    }

    pub(crate) fn current_viewport(&self) -> Option<ViewportSnapshot> {
        *self.viewport.borrow()
    }

    /// Visibility against the latest viewport. False before the first one.
    pub(crate) fn is_visible(&self, address: TileAddress) -> bool {
        self.current_viewport()
            .is_some_and(|viewport| is_visible(&address, &viewport, self.max_level))
    }

    pub(crate) fn notify_available(&self) {
        self.available.send_modify(|generation| *generation += 1);
    }

    pub(crate) fn max_cache_bytes(&self) -> u64 {
        self.max_cache_bytes.load(Ordering::Relaxed)
    }

    pub(crate) fn set_max_cache_bytes(&self, bytes: u64) {
        self.max_cache_bytes.store(bytes, Ordering::Relaxed);
    }

    pub(crate) fn min_tile_number(&self) -> usize {
        self.min_tile_number.load(Ordering::Relaxed)
    }

    /// Recomputes the protected tile count for `visible` tiles on screen.
    pub(crate) fn set_visible_tile_count(&self, visible: usize) {
        let min = self
            .min_tile_policy
            .min_tile_number(visible, self.level_count);
        self.min_tile_number.store(min, Ordering::Relaxed);
        debug!(source = %self.name, visible, min_tile_number = min, "Protected tile count updated");
    }

    pub(crate) fn budget(&self) -> EvictionBudget {
        EvictionBudget {
            max_cache_bytes: self.max_cache_bytes(),
            min_tile_number: self.min_tile_number(),
            max_evictions_per_pass: self.max_evictions_per_pass,
        }
    }

    /// Runs one eviction pass and records it.
    pub(crate) fn evict(&self) -> EvictionReport {
        let report = self.table.evict(&self.budget());
        if !report.evicted.is_empty() {
            self.metrics
                .evicted(report.evicted.len() as u64, report.bytes_freed);
            debug!(source = %self.name, "{}", report);
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TileCacheConfig;
    use bytes::Bytes;

    fn make_shared(max_bytes: u64, policy: MinTilePolicy) -> SourceShared {
        let config = SourceConfig::new("test", 10).with_cache(
            TileCacheConfig::new()
                .with_max_cache_bytes(max_bytes)
                .with_min_tile_policy(policy),
        );
        SourceShared::new(&config)
    }

    #[test]
    fn test_visibility_needs_a_viewport() {
        let shared = make_shared(1024, MinTilePolicy::Fixed(0));
        let address = TileAddress::new(0, 0, 0);
        assert!(!shared.is_visible(address));

        shared
            .viewport
            .send_replace(Some(ViewportSnapshot::new(0.0, 0.0, 1.0, 512.0, 512.0)));
        assert!(shared.is_visible(address));
    }

    #[test]
    fn test_available_generation_increments() {
        let shared = make_shared(1024, MinTilePolicy::Fixed(0));
        let rx = shared.available.subscribe();
        shared.notify_available();
        shared.notify_available();
        assert_eq!(*rx.borrow(), 2);
    }

    #[test]
    fn test_visible_count_drives_budget() {
        let shared = make_shared(1024, MinTilePolicy::Fixed(7));
        shared.set_visible_tile_count(100);
        assert_eq!(shared.budget().min_tile_number, 7);

        let shared = make_shared(1024, MinTilePolicy::default());
        shared.set_visible_tile_count(20);
        assert_eq!(
            shared.min_tile_number(),
            MinTilePolicy::default().min_tile_number(20, 11)
        );
    }

    #[test]
    fn test_evict_records_metrics() {
        let shared = make_shared(150, MinTilePolicy::Fixed(0));
        for x in 0..4 {
            let address = TileAddress::new(3, x, 0);
            shared.table.touch_or_insert(address);
            shared.table.update(&address, Some(Bytes::from(vec![0u8; 100])));
        }
        let report = shared.evict();
        assert_eq!(report.evicted.len(), 3);
        assert_eq!(shared.metrics.snapshot().evictions, 3);
        assert_eq!(shared.metrics.snapshot().bytes_evicted, 300);
        assert_eq!(shared.table.total_bytes(), 100);
    }
}
