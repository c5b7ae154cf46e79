//! Configuration types for deepzoom components.
//!
//! Each struct groups the parameters of one concern and offers defaults plus
//! `with_*` builders. [`ConfigFile`] maps them to and from
//! `~/.deepzoom/config.ini`.
//!
//! # Example
//!
//! ```
//! use deepzoom::config::{DownloadConfig, SourceConfig, TileCacheConfig};
//!
//! let download = DownloadConfig::new().with_max_concurrent_downloads(4);
//! let source = SourceConfig::new("osm", 19)
//!     .with_cache(TileCacheConfig::new().with_max_cache_bytes(32 * 1024 * 1024));
//! assert_eq!(source.cache().max_cache_bytes(), 32 * 1024 * 1024);
//! ```

mod cache;
mod download;
mod file;
mod size;
mod source;

pub use cache::{TileCacheConfig, DEFAULT_MAX_CACHE_BYTES, DEFAULT_STORAGE_SIZE};
pub use download::{
    DownloadConfig, RequestCachePolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CONCURRENT_DOWNLOADS,
    DEFAULT_RETRY_DELAY_MS, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT,
};
pub use file::{
    config_directory, config_file_path, AuthSettings, CacheSettings, ConfigFile, ConfigFileError,
    DownloadSettings, LoggingSettings,
};
pub use size::{format_size, parse_size, SizeParseError};
pub use source::SourceConfig;
