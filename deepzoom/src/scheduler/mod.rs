//! Visibility scheduling.
//!
//! One scheduler task per source decides which tiles a viewport needs and
//! hands new addresses to the fetch executor. It waits on three wake
//! sources and never performs I/O itself:
//!
//! | Wake                    | Work                                  |
//! |-------------------------|---------------------------------------|
//! | new viewport snapshot   | full pass, then eviction              |
//! | refresh                 | full pass with the last snapshot      |
//! | maintenance (completion)| eviction only                         |
//!
//! Viewport updates arrive through a `watch` channel, so a burst of updates
//! collapses into the latest one and a running pass can tell that it has
//! been superseded.

mod pass;
mod plan;
mod validator;

pub use pass::{run_pass, PassReport, PassSink};
pub use plan::{current_level, plan, LevelPlan, TileBounds, PRIMARY_TIER_DEPTH};
pub use validator::{deepest_useful_level, is_visible, tile_screen_rect};

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::coord::{TileAddress, ViewportSnapshot};
use crate::fetch::FetchExecutor;
use crate::source::SourceShared;

/// Connects a pass to the source it runs for.
struct SourceSink<'a> {
    shared: &'a SourceShared,
    executor: &'a FetchExecutor,
    viewport_rx: &'a watch::Receiver<Option<ViewportSnapshot>>,
}

impl PassSink for SourceSink<'_> {
    fn superseded(&self) -> bool {
        self.viewport_rx.has_changed().unwrap_or(true)
    }

    fn aborted(&self) -> bool {
        self.shared.abort.is_cancelled()
    }

    fn dropped(&mut self, address: TileAddress) {
        self.executor.cancel(address);
        self.shared.metrics.out_of_view();
    }

    fn launch(&mut self, address: TileAddress) {
        self.shared.metrics.tile_requested();
        self.executor.request(address);
    }
}

pub(crate) struct Scheduler {
    shared: Arc<SourceShared>,
    executor: Arc<FetchExecutor>,
    viewport_rx: watch::Receiver<Option<ViewportSnapshot>>,
    last_viewport: Option<ViewportSnapshot>,
}

impl Scheduler {
    pub(crate) fn spawn(shared: Arc<SourceShared>, executor: Arc<FetchExecutor>) -> JoinHandle<()> {
        let viewport_rx = shared.viewport.subscribe();
        let scheduler = Self {
            shared,
            executor,
            viewport_rx,
            last_viewport: None,
        };
        tokio::spawn(scheduler.run())
    }

    async fn run(mut self) {
        debug!(source = %self.shared.name, "Scheduler started");
        let shared = Arc::clone(&self.shared);
        loop {
            tokio::select! {
                biased;
                _ = shared.abort.cancelled() => break,
                changed = self.viewport_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.full_pass();
                }
                _ = shared.refresh.notified() => self.full_pass(),
                _ = shared.maintain.notified() => {
                    self.shared.evict();
                }
            }
        }
        debug!(source = %self.shared.name, "Scheduler stopped");
    }

    fn full_pass(&mut self) {
        let Some(viewport) = *self.viewport_rx.borrow_and_update() else {
            return;
        };

        if self
            .last_viewport
            .map_or(true, |last| last.size_differs(&viewport))
        {
            self.shared
                .set_visible_tile_count(viewport.visible_tile_capacity());
        }
        self.last_viewport = Some(viewport);

        let mut sink = SourceSink {
            shared: &self.shared,
            executor: &self.executor,
            viewport_rx: &self.viewport_rx,
        };
        let report = run_pass(&self.shared.table, &viewport, self.shared.max_level, &mut sink);
        let eviction = self.shared.evict();
        self.shared.metrics.pass_completed();

        trace!(
            source = %self.shared.name,
            evicted = eviction.evicted.len(),
            cached = self.shared.table.len(),
            bytes = self.shared.table.total_bytes(),
            "Pass: {}",
            report
        );
    }
}
