//! Configuration file handling for ~/.deepzoom/config.ini.
//!
//! Missing files and missing keys fall back to defaults. Unknown keys are
//! ignored; malformed values are reported with their section and key.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use super::cache::{TileCacheConfig, DEFAULT_MAX_CACHE_BYTES, DEFAULT_STORAGE_SIZE};
use super::download::{
    DownloadConfig, RequestCachePolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_CONCURRENT_DOWNLOADS,
    DEFAULT_RETRY_DELAY_MS, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT,
};
use super::size::{format_size, parse_size};
use crate::cache::{MinTilePolicy, DEFAULT_MAX_EVICTIONS_PER_PASS};
use crate::provider::Credential;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

fn invalid(section: &str, key: &str, value: &str, reason: impl Into<String>) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

// =============================================================================
// Settings
// =============================================================================

/// `[download]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSettings {
    pub max_concurrent: usize,
    pub timeout_secs: u64,
    pub retry_delay_ms: u64,
    pub max_attempts: u32,
    pub cache_policy: RequestCachePolicy,
    pub user_agent: String,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cache_policy: RequestCachePolicy::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub max_cache_size: u64,
    pub min_tile_policy: MinTilePolicy,
    pub max_evictions_per_pass: usize,
    pub storage_enabled: bool,
    pub storage_size: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_cache_size: DEFAULT_MAX_CACHE_BYTES,
            min_tile_policy: MinTilePolicy::default(),
            max_evictions_per_pass: DEFAULT_MAX_EVICTIONS_PER_PASS,
            storage_enabled: true,
            storage_size: DEFAULT_STORAGE_SIZE,
        }
    }
}

/// `[auth]` section. Both fields must be present for a credential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthSettings {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Log directory; `None` uses the config directory.
    pub directory: Option<PathBuf>,
    pub file: String,
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: None,
            file: crate::logging::default_log_file().to_string(),
            level: "info".to_string(),
        }
    }
}

/// Contents of `config.ini`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub download: DownloadSettings,
    pub cache: CacheSettings,
    pub auth: AuthSettings,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Loads from the default path (~/.deepzoom/config.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Loads from `path`, returning defaults when the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }

    pub fn save(&self) -> Result<(), ConfigFileError> {
        self.save_to(&config_file_path())
    }

    /// Writes a commented INI file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }
        std::fs::write(path, to_config_string(self))
            .map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Creates the default config file if it doesn't exist and returns its path.
    pub fn ensure_exists() -> Result<PathBuf, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Ok(path)
    }

    pub fn download_config(&self) -> DownloadConfig {
        let d = &self.download;
        DownloadConfig::new()
            .with_max_concurrent_downloads(d.max_concurrent)
            .with_timeout(Duration::from_secs(d.timeout_secs))
            .with_retry_delay(Duration::from_millis(d.retry_delay_ms))
            .with_max_attempts(d.max_attempts)
            .with_cache_policy(d.cache_policy)
            .with_user_agent(d.user_agent.clone())
    }

    pub fn tile_cache_config(&self) -> TileCacheConfig {
        let c = &self.cache;
        TileCacheConfig::new()
            .with_max_cache_bytes(c.max_cache_size)
            .with_min_tile_policy(c.min_tile_policy)
            .with_max_evictions_per_pass(c.max_evictions_per_pass)
            .with_storage_enabled(c.storage_enabled)
    }

    /// Preconfigured credential, when both username and password are set.
    pub fn credential(&self) -> Option<Credential> {
        match (&self.auth.username, &self.auth.password) {
            (Some(user), Some(password)) => Some(Credential::new(user, password)),
            _ => None,
        }
    }
}

/// ~/.deepzoom, or ./.deepzoom when no home directory is known.
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".deepzoom")
}

/// ~/.deepzoom/config.ini
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

// =============================================================================
// Parsing
// =============================================================================

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn parse_number<T: std::str::FromStr>(
    section: &str,
    key: &str,
    value: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, "must be a non-negative integer"))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigFileError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value, "must be true or false")),
    }
}

fn parse_byte_size(section: &str, key: &str, value: &str) -> Result<u64, ConfigFileError> {
    parse_size(value).map_err(|_| invalid(section, key, value, "expected a size like '10MB'"))
}

/// Overlays the values found in `ini` onto the defaults.
fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    if let Some(section) = ini.section(Some("download")) {
        let name = "download";
        if let Some(v) = section.get("max_concurrent") {
            config.download.max_concurrent = parse_number(name, "max_concurrent", v)?;
            if config.download.max_concurrent == 0 {
                return Err(invalid(name, "max_concurrent", v, "must be at least 1"));
            }
        }
        if let Some(v) = section.get("timeout") {
            config.download.timeout_secs = parse_number(name, "timeout", v)?;
        }
        if let Some(v) = section.get("retry_delay_ms") {
            config.download.retry_delay_ms = parse_number(name, "retry_delay_ms", v)?;
        }
        if let Some(v) = section.get("max_attempts") {
            config.download.max_attempts = parse_number(name, "max_attempts", v)?;
            if config.download.max_attempts == 0 {
                return Err(invalid(name, "max_attempts", v, "must be at least 1"));
            }
        }
        if let Some(v) = section.get("cache_policy") {
            config.download.cache_policy = v
                .parse()
                .map_err(|reason: String| invalid(name, "cache_policy", v, reason))?;
        }
        if let Some(v) = section.get("user_agent").and_then(non_empty) {
            config.download.user_agent = v;
        }
    }

    if let Some(section) = ini.section(Some("cache")) {
        let name = "cache";
        if let Some(v) = section.get("max_size") {
            config.cache.max_cache_size = parse_byte_size(name, "max_size", v)?;
        }
        if let Some(v) = section.get("min_tiles") {
            config.cache.min_tile_policy = v
                .parse()
                .map_err(|reason: String| invalid(name, "min_tiles", v, reason))?;
        }
        if let Some(v) = section.get("max_evictions_per_pass") {
            config.cache.max_evictions_per_pass =
                parse_number(name, "max_evictions_per_pass", v)?;
        }
        if let Some(v) = section.get("storage") {
            config.cache.storage_enabled = parse_bool(name, "storage", v)?;
        }
        if let Some(v) = section.get("storage_size") {
            config.cache.storage_size = parse_byte_size(name, "storage_size", v)?;
        }
    }

    if let Some(section) = ini.section(Some("auth")) {
        config.auth.username = section.get("username").and_then(non_empty);
        config.auth.password = section.get("password").and_then(non_empty);
    }

    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory").and_then(non_empty) {
            config.logging.directory = Some(expand_tilde(&v));
        }
        if let Some(v) = section.get("file").and_then(non_empty) {
            config.logging.file = v;
        }
        if let Some(v) = section.get("level").and_then(non_empty) {
            config.logging.level = v.to_lowercase();
        }
    }

    Ok(config)
}

fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

// =============================================================================
// Writing
// =============================================================================

fn to_config_string(config: &ConfigFile) -> String {
    let directory = config
        .logging
        .directory
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();

    format!(
        r#"[download]
; Simultaneous downloads across every tile source (default: {default_concurrent})
max_concurrent = {max_concurrent}
; Per-request timeout in seconds
timeout = {timeout}
; Delay before a failed tile is retried, in milliseconds
retry_delay_ms = {retry_delay_ms}
; Attempts per tile before it is dropped until the viewport changes
max_attempts = {max_attempts}
; HTTP cache behaviour: cache-if-available, revalidate, no-cache, no-store
cache_policy = {cache_policy}
user_agent = {user_agent}

[cache]
; Byte budget of fetched tiles per source. Supports KB, MB, GB suffixes
max_size = {max_size}
; Tiles always kept regardless of size:
;   geometric         - derived from the visible tile count and pyramid depth
;   geometric:F:B     - same, with explicit floor and per-level bonus
;   fixed:N           - exactly N tiles
min_tiles = {min_tiles}
; Evictions per scheduling pass (0 = unlimited)
max_evictions_per_pass = {max_evictions}
; Keep downloaded tiles in the shared storage cache
storage = {storage}
storage_size = {storage_size}

[auth]
; Credential sent before any authentication challenge (leave empty for none)
username = {username}
password = {password}

[logging]
; Log directory (default: ~/.deepzoom)
directory = {directory}
file = {file}
; trace, debug, info, warn, error
level = {level}
"#,
        default_concurrent = DEFAULT_MAX_CONCURRENT_DOWNLOADS,
        max_concurrent = config.download.max_concurrent,
        timeout = config.download.timeout_secs,
        retry_delay_ms = config.download.retry_delay_ms,
        max_attempts = config.download.max_attempts,
        cache_policy = config.download.cache_policy,
        user_agent = config.download.user_agent,
        max_size = format_size(config.cache.max_cache_size),
        min_tiles = config.cache.min_tile_policy,
        max_evictions = config.cache.max_evictions_per_pass,
        storage = config.cache.storage_enabled,
        storage_size = format_size(config.cache.storage_size),
        username = config.auth.username.as_deref().unwrap_or(""),
        password = config.auth.password.as_deref().unwrap_or(""),
        directory = directory,
        file = config.logging.file,
        level = config.logging.level,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.ini");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&dir.path().join("missing.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            "[download]\nmax_concurrent = 3\n\n[cache]\nmax_size = 2MB\nmin_tiles = fixed:40\n",
        );
        let config = ConfigFile::load_from(&path).unwrap();

        assert_eq!(config.download.max_concurrent, 3);
        assert_eq!(config.download.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert_eq!(config.cache.max_cache_size, 2 * 1024 * 1024);
        assert_eq!(config.cache.min_tile_policy, MinTilePolicy::Fixed(40));
        assert!(config.cache.storage_enabled);
    }

    #[test]
    fn test_invalid_size_names_key() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[cache]\nmax_size = lots\n");
        match ConfigFile::load_from(&path) {
            Err(ConfigFileError::InvalidValue { section, key, .. }) => {
                assert_eq!(section, "cache");
                assert_eq!(key, "max_size");
            }
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[download]\nmax_attempts = 0\n");
        assert!(matches!(
            ConfigFile::load_from(&path),
            Err(ConfigFileError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_credential_requires_both_fields() {
        let mut config = ConfigFile::default();
        config.auth.username = Some("viewer".to_string());
        assert!(config.credential().is_none());

        config.auth.password = Some("hunter2".to_string());
        let credential = config.credential().unwrap();
        assert_eq!(credential.username(), "viewer");
        assert_eq!(credential.password(), "hunter2");
    }

    #[test]
    fn test_save_then_load_preserves_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.ini");

        let mut config = ConfigFile::default();
        config.download.max_concurrent = 9;
        config.download.cache_policy = RequestCachePolicy::NoStore;
        config.cache.max_cache_size = 32 * 1024 * 1024;
        config.cache.min_tile_policy = MinTilePolicy::Geometric {
            floor: 2,
            level_bonus: 3,
        };
        config.cache.storage_enabled = false;
        config.auth.username = Some("viewer".to_string());
        config.auth.password = Some("secret".to_string());
        config.logging.level = "debug".to_string();
        config.save_to(&path).unwrap();

        let loaded = ConfigFile::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_conversions() {
        let mut config = ConfigFile::default();
        config.download.max_concurrent = 2;
        config.cache.max_evictions_per_pass = 0;

        assert_eq!(config.download_config().max_concurrent_downloads(), 2);
        assert_eq!(config.tile_cache_config().max_evictions_per_pass(), None);
    }
}
