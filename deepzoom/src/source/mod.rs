//! Tile source: the per-pyramid façade the renderer talks to.
//!
//! A [`TileSource`] owns the request table, a scheduler task and a fetch
//! executor, and shares a [`DownloadDispatcher`] with every other source.
//!
//! # Example
//!
//! ```ignore
//! use deepzoom::config::{DownloadConfig, SourceConfig};
//! use deepzoom::dispatcher::DownloadDispatcher;
//! use deepzoom::provider::ReqwestClient;
//! use deepzoom::{TileSource, ViewportSnapshot};
//!
//! let download = DownloadConfig::default();
//! let dispatcher = DownloadDispatcher::start(&download);
//! let http = Arc::new(ReqwestClient::new(&download)?);
//! let source = TileSource::start(provider, SourceConfig::new("osm", 19), dispatcher, http, None)?;
//!
//! let mut available = source.subscribe();
//! source.process(ViewportSnapshot::new(0.0, 0.0, 1.0, 1024.0, 768.0));
//! available.changed().await?;
//! ```

mod shared;

pub(crate) use shared::SourceShared;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::cache::{CacheStorage, TileEntry};
use crate::config::SourceConfig;
use crate::coord::{TileAddress, TileOffset, ViewportSnapshot};
use crate::decode::{Bitmap, ImageDecoder, TileDecoder};
use crate::dispatcher::DownloadDispatcher;
use crate::fetch::{ExecutorParts, FetchExecutor};
use crate::provider::{HttpClient, ProviderContext, TileProvider};
use crate::render::{resolve_in_table, TileResolver};
use crate::scheduler::Scheduler;
use crate::telemetry::FetchSnapshot;

/// Errors starting a tile source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Tile sources must be started inside a tokio runtime")]
    NoRuntime,

    #[error("Failed to start provider thread: {0}")]
    ProviderSpawn(#[from] std::io::Error),
}

/// A bitmap to draw for a screen tile, possibly borrowed from an ancestor.
#[derive(Debug, Clone)]
pub struct ResolvedTile {
    pub entry: Arc<TileEntry>,
    pub bitmap: Arc<Bitmap>,
    /// Where the requested tile sits inside `entry`'s tile. Zero levels
    /// when the tile itself resolved.
    pub offset: TileOffset,
}

impl ResolvedTile {
    /// True when the bitmap belongs to a coarser tile.
    pub fn is_fallback(&self) -> bool {
        self.offset.levels > 0
    }
}

/// Tiles of one pyramid for one view.
pub struct TileSource {
    shared: Arc<SourceShared>,
    executor: Arc<FetchExecutor>,
    context: ProviderContext,
    decoder: Arc<dyn TileDecoder>,
    scheduler: JoinHandle<()>,
    tile_width: u32,
    tile_height: u32,
    stopped: AtomicBool,
}

impl TileSource {
    /// Moves `provider` onto its own thread and starts the scheduler.
    ///
    /// `storage` is ignored when the source's cache config disables it.
    pub fn start<P: TileProvider>(
        provider: P,
        config: SourceConfig,
        dispatcher: Arc<DownloadDispatcher>,
        http: Arc<dyn HttpClient>,
        storage: Option<Arc<dyn CacheStorage>>,
    ) -> Result<Self, SourceError> {
        tokio::runtime::Handle::try_current().map_err(|_| SourceError::NoRuntime)?;

        let (provider, context) = ProviderContext::spawn(provider)?;
        let shared = Arc::new(SourceShared::new(&config));
        let storage = storage.filter(|_| config.cache().storage_enabled());

        let executor = FetchExecutor::new(ExecutorParts {
            shared: Arc::clone(&shared),
            provider,
            http,
            storage,
            dispatcher,
            credential: config.credential().cloned(),
            max_attempts: config.max_attempts(),
            cache_policy: config.cache_policy(),
        });
        let scheduler = Scheduler::spawn(Arc::clone(&shared), Arc::clone(&executor));

        info!(
            source = config.name(),
            max_level = config.max_level(),
            max_cache_bytes = config.cache().max_cache_bytes(),
            "Tile source started"
        );

        Ok(Self {
            shared,
            executor,
            context,
            decoder: Arc::new(ImageDecoder),
            scheduler,
            tile_width: config.tile_width(),
            tile_height: config.tile_height(),
            stopped: AtomicBool::new(false),
        })
    }

    /// Replaces the bitmap decoder.
    pub fn with_decoder(mut self, decoder: Arc<dyn TileDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn max_level(&self) -> u8 {
        self.shared.max_level
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Publishes a new viewport. The source's tile size replaces whatever the
    /// snapshot carried. Only the latest snapshot is ever scheduled.
    pub fn process(&self, viewport: ViewportSnapshot) {
        if self.is_stopped() {
            return;
        }
        let viewport = viewport.with_tile_size(self.tile_width, self.tile_height);
        self.shared.viewport.send_replace(Some(viewport));
    }

    /// Schedules a full pass with the last viewport.
    pub fn refresh(&self) {
        self.shared.refresh.notify_one();
    }

    pub fn viewport(&self) -> Option<ViewportSnapshot> {
        self.shared.current_viewport()
    }

    /// Drops `address` from the cache and schedules a pass to fetch it again.
    pub fn invalidate(&self, address: TileAddress) {
        self.executor.cancel(address);
        self.shared.table.remove(&address);
        self.refresh();
    }

    pub fn set_max_cache_bytes(&self, bytes: u64) {
        self.shared.set_max_cache_bytes(bytes);
        self.shared.maintain.notify_one();
    }

    /// Overrides the visible tile count that derives the protected minimum.
    /// Recomputed automatically when the viewport's pixel size changes.
    pub fn set_visible_tile_count(&self, visible: usize) {
        self.shared.set_visible_tile_count(visible);
        self.shared.maintain.notify_one();
    }

    // =========================================================================
    // Renderer access
    // =========================================================================

    /// Cached entry for `address`, pending or resolved.
    pub fn tile(&self, address: TileAddress) -> Option<Arc<TileEntry>> {
        self.shared.table.get(&address)
    }

    /// Decoded bitmap of `address` itself, if its bytes have arrived.
    pub fn bitmap(&self, address: TileAddress) -> Option<Arc<Bitmap>> {
        self.tile(address)?.bitmap(self.decoder.as_ref())
    }

    /// Finds something to draw for `address`: the tile itself or its
    /// nearest ancestor with a decodable bitmap. The entry found is marked
    /// in use.
    pub fn resolve(&self, address: TileAddress) -> Option<ResolvedTile> {
        resolve_in_table(&self.shared.table, self.decoder.as_ref(), address)
    }

    /// Availability notifications. The value is a generation counter that
    /// increases whenever a tile with bytes becomes available.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.available.subscribe()
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    pub fn metrics(&self) -> FetchSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Number of cached entries, pending ones included.
    pub fn len(&self) -> usize {
        self.shared.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.table.is_empty()
    }

    pub fn cached_bytes(&self) -> u64 {
        self.shared.table.total_bytes()
    }

    pub fn max_cache_bytes(&self) -> u64 {
        self.shared.max_cache_bytes()
    }

    pub fn min_tile_number(&self) -> usize {
        self.shared.min_tile_number()
    }

    /// Addresses whose fetch has not completed.
    pub fn pending(&self) -> Vec<TileAddress> {
        self.shared.table.pending_addresses()
    }

    /// Downloads queued or running for this source.
    pub fn downloads_in_flight(&self) -> usize {
        self.executor.in_flight()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// True while the scheduler task is alive.
    pub fn is_running(&self) -> bool {
        !self.scheduler.is_finished()
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Stops scheduling, cancels this source's downloads, releases every
    /// cached entry and shuts the provider thread down. Idempotent.
    pub fn stop_download(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.abort.cancel();
        let cancelled = self.executor.cancel_all();
        let released = self.shared.table.drain();
        self.context.shutdown();
        info!(
            source = %self.shared.name,
            cancelled,
            released,
            "Tile source stopped"
        );
    }
}

impl TileResolver for TileSource {
    fn resolve(&self, address: TileAddress) -> Option<ResolvedTile> {
        TileSource::resolve(self, address)
    }
}

impl Drop for TileSource {
    fn drop(&mut self) {
        self.stop_download();
    }
}
