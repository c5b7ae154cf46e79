//! Per-source configuration.

use super::cache::TileCacheConfig;
use super::download::{RequestCachePolicy, DEFAULT_MAX_ATTEMPTS};
use crate::coord::{DEFAULT_TILE_SIZE, MAX_LEVEL};
use crate::provider::Credential;

/// Settings for one tile source.
///
/// Concurrency is not here: it belongs to the shared
/// [`DownloadDispatcher`](crate::dispatcher::DownloadDispatcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    name: String,
    max_level: u8,
    tile_width: u32,
    tile_height: u32,
    max_attempts: u32,
    cache_policy: RequestCachePolicy,
    credential: Option<Credential>,
    cache: TileCacheConfig,
}

impl SourceConfig {
    /// Creates a configuration for a pyramid whose deepest level is
    /// `max_level` (clamped to [`MAX_LEVEL`]).
    pub fn new(name: impl Into<String>, max_level: u8) -> Self {
        Self {
            name: name.into(),
            max_level: max_level.min(MAX_LEVEL),
            tile_width: DEFAULT_TILE_SIZE,
            tile_height: DEFAULT_TILE_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cache_policy: RequestCachePolicy::default(),
            credential: None,
            cache: TileCacheConfig::default(),
        }
    }

    pub fn with_tile_size(mut self, width: u32, height: u32) -> Self {
        self.tile_width = width.max(1);
        self.tile_height = height.max(1);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_cache_policy(mut self, policy: RequestCachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    /// Credential sent with the first request, before any challenge.
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_cache(mut self, cache: TileCacheConfig) -> Self {
        self.cache = cache;
        self
    }

    /// Name used in log lines.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_level(&self) -> u8 {
        self.max_level
    }

    /// Number of levels in the pyramid, level 0 included.
    pub fn level_count(&self) -> usize {
        usize::from(self.max_level) + 1
    }

    pub fn tile_width(&self) -> u32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> u32 {
        self.tile_height
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn cache_policy(&self) -> RequestCachePolicy {
        self.cache_policy
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn cache(&self) -> &TileCacheConfig {
        &self.cache
    }
}
