//! Fetch telemetry for observability and user feedback.
//!
//! Lock-free atomic counters updated by the scheduler, executor and evictor,
//! read through point-in-time snapshots.
//!
//! # Architecture
//!
//! ```text
//! Scheduler / Executor / Evictor ───► FetchMetrics ───► FetchSnapshot ───► Views
//!                                     (atomic counters)  (point-in-time)   (CLI, etc.)
//! ```
//!
//! # Example
//!
//! ```
//! use deepzoom::telemetry::FetchMetrics;
//!
//! let metrics = FetchMetrics::new();
//! metrics.tile_requested();
//! metrics.download_completed(4096);
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.downloads_completed, 1);
//! ```

mod metrics;
mod snapshot;

pub use metrics::FetchMetrics;
pub use snapshot::FetchSnapshot;
