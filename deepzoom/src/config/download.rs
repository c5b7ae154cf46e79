//! Download dispatcher and HTTP configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Process-wide download concurrency.
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 6;

/// Per-request HTTP timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Delay before a degraded (previously failed) task is retried.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 100;

/// Attempts per tile before it is dropped until the next scheduling pass.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

pub const DEFAULT_USER_AGENT: &str = concat!("deepzoom/", env!("CARGO_PKG_VERSION"));

/// HTTP-level cache behaviour requested from servers and proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestCachePolicy {
    /// Let intermediaries serve cached copies.
    #[default]
    CacheIfAvailable,
    /// Ask intermediaries to revalidate before serving.
    Revalidate,
    /// Bypass intermediary caches.
    NoCache,
    /// Bypass and ask that the response is not stored.
    NoStore,
}

impl RequestCachePolicy {
    /// `Cache-Control` request header value, if any.
    pub fn cache_control(&self) -> Option<&'static str> {
        match self {
            RequestCachePolicy::CacheIfAvailable => None,
            RequestCachePolicy::Revalidate => Some("max-age=0"),
            RequestCachePolicy::NoCache => Some("no-cache"),
            RequestCachePolicy::NoStore => Some("no-store"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestCachePolicy::CacheIfAvailable => "cache-if-available",
            RequestCachePolicy::Revalidate => "revalidate",
            RequestCachePolicy::NoCache => "no-cache",
            RequestCachePolicy::NoStore => "no-store",
        }
    }
}

impl fmt::Display for RequestCachePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestCachePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cache-if-available" | "default" => Ok(Self::CacheIfAvailable),
            "revalidate" => Ok(Self::Revalidate),
            "no-cache" | "reload" => Ok(Self::NoCache),
            "no-store" => Ok(Self::NoStore),
            other => Err(format!(
                "unknown cache policy '{}' (expected cache-if-available, revalidate, no-cache or no-store)",
                other
            )),
        }
    }
}

/// Configuration for the download dispatcher and its HTTP client.
///
/// # Example
///
/// ```
/// use deepzoom::config::DownloadConfig;
/// use std::time::Duration;
///
/// let config = DownloadConfig::new()
///     .with_max_concurrent_downloads(12)
///     .with_retry_delay(Duration::from_millis(250));
/// assert_eq!(config.max_concurrent_downloads(), 12);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    max_concurrent_downloads: usize,
    timeout: Duration,
    retry_delay: Duration,
    max_attempts: u32,
    cache_policy: RequestCachePolicy,
    user_agent: String,
}

impl DownloadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upper bound on simultaneous downloads across every source.
    /// Values below one are raised to one.
    pub fn with_max_concurrent_downloads(mut self, max: usize) -> Self {
        self.max_concurrent_downloads = max.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Wait before a failed task becomes eligible again.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Attempts per tile, including the first. Values below one are raised
    /// to one.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_cache_policy(mut self, policy: RequestCachePolicy) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn max_concurrent_downloads(&self) -> usize {
        self.max_concurrent_downloads
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn cache_policy(&self) -> RequestCachePolicy {
        self.cache_policy
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cache_policy: RequestCachePolicy::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DownloadConfig::default();
        assert_eq!(
            config.max_concurrent_downloads(),
            DEFAULT_MAX_CONCURRENT_DOWNLOADS
        );
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(
            config.retry_delay(),
            Duration::from_millis(DEFAULT_RETRY_DELAY_MS)
        );
        assert_eq!(config.max_attempts(), DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.cache_policy(), RequestCachePolicy::CacheIfAvailable);
        assert!(config.user_agent().starts_with("deepzoom/"));
    }

    #[test]
    fn test_builder_chain() {
        let config = DownloadConfig::new()
            .with_max_concurrent_downloads(2)
            .with_timeout(Duration::from_secs(5))
            .with_max_attempts(3)
            .with_cache_policy(RequestCachePolicy::NoStore)
            .with_user_agent("viewer/1.0");

        assert_eq!(config.max_concurrent_downloads(), 2);
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.max_attempts(), 3);
        assert_eq!(config.cache_policy(), RequestCachePolicy::NoStore);
        assert_eq!(config.user_agent(), "viewer/1.0");
    }

    #[test]
    fn test_zero_values_are_clamped() {
        let config = DownloadConfig::new()
            .with_max_concurrent_downloads(0)
            .with_max_attempts(0);
        assert_eq!(config.max_concurrent_downloads(), 1);
        assert_eq!(config.max_attempts(), 1);
    }

    #[test]
    fn test_cache_policy_round_trip_names() {
        for policy in [
            RequestCachePolicy::CacheIfAvailable,
            RequestCachePolicy::Revalidate,
            RequestCachePolicy::NoCache,
            RequestCachePolicy::NoStore,
        ] {
            assert_eq!(policy.to_string().parse::<RequestCachePolicy>(), Ok(policy));
        }
        assert_eq!(
            "Reload".parse::<RequestCachePolicy>(),
            Ok(RequestCachePolicy::NoCache)
        );
        assert!("sometimes".parse::<RequestCachePolicy>().is_err());
    }

    #[test]
    fn test_cache_control_headers() {
        assert_eq!(RequestCachePolicy::CacheIfAvailable.cache_control(), None);
        assert_eq!(RequestCachePolicy::NoCache.cache_control(), Some("no-cache"));
    }
}
