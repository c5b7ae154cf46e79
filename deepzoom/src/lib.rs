//! DeepZoom - tile acquisition and caching for pannable, zoomable surfaces
//!
//! This library decides which quadtree tiles a viewport needs, fetches them
//! through a shared bounded download pool, keeps them in a byte-budgeted cache
//! that protects on-screen content, and tells the renderer when new tiles
//! become available.
//!
//! # Architecture
//!
//! ```text
//!  Renderer ──► TileSource::process(viewport)
//!                   │
//!                   ▼
//!              Scheduler task ──► RequestTable ◄── Evictor
//!                   │                  ▲
//!                   ▼                  │
//!              FetchExecutor ──► DownloadDispatcher ──► HttpClient
//!                   │                                     │
//!                   └──────── CacheStorage ◄──────────────┘
//!                   │
//!                   ▼
//!  Renderer ◄── availability watch ── FrameTracker / resolve()
//! ```

pub mod cache;
pub mod config;
pub mod coord;
pub mod decode;
pub mod dispatcher;
pub mod fetch;
pub mod logging;
pub mod provider;
pub mod render;
pub mod scheduler;
pub mod source;
pub mod telemetry;

pub use coord::{TileAddress, ViewportSnapshot};
pub use source::{ResolvedTile, TileSource};

/// Crate version, as recorded in Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_not_empty() {
        assert!(!VERSION.is_empty(), "Version should not be empty");
    }
}
