//! Arguments and setup shared across CLI commands.

use std::path::{Path, PathBuf};

use clap::Args;
use deepzoom::config::ConfigFile;
use deepzoom::coord::{MAX_LEVEL, DEFAULT_TILE_SIZE};
use deepzoom::logging::{default_log_dir, init_console_logging, init_logging, LoggingGuard};
use deepzoom::ViewportSnapshot;
use tracing::info;

use crate::error::CliError;

/// Describes the control and the visible part of the pyramid.
#[derive(Debug, Clone, Args)]
pub struct ViewportArgs {
    /// Control width in pixels
    #[arg(long, default_value_t = 1024.0)]
    pub width: f64,

    /// Control height in pixels
    #[arg(long, default_value_t = 768.0)]
    pub height: f64,

    /// Logical x of the visible top-left corner (0.0 - 1.0 spans the image)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub origin_x: f64,

    /// Logical y of the visible top-left corner
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub origin_y: f64,

    /// Logical width of the visible window (1.0 fits the image, smaller zooms in)
    #[arg(long, default_value_t = 1.0)]
    pub viewport_width: f64,

    /// Tile edge length in pixels
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
    pub tile_size: u32,

    /// Deepest level the pyramid has
    #[arg(long, default_value_t = 18)]
    pub max_level: u8,
}

impl ViewportArgs {
    pub fn snapshot(&self) -> ViewportSnapshot {
        ViewportSnapshot::new(
            self.origin_x,
            self.origin_y,
            self.viewport_width,
            self.width,
            self.height,
        )
        .with_tile_size(self.tile_size, self.tile_size)
    }

    /// Rejects viewports that could never show a tile.
    pub fn validate(&self) -> Result<(), CliError> {
        if self.max_level > MAX_LEVEL {
            return Err(CliError::Config(format!(
                "--max-level must be at most {}",
                MAX_LEVEL
            )));
        }
        if !self.snapshot().is_laid_out() {
            return Err(CliError::Config(
                "--width, --height, --viewport-width and --tile-size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Loads `path`, or the default config file when none is given.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    let config = match path {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };
    Ok(config)
}

/// Starts logging as the config file asks.
///
/// Logs go to a file when `[logging] directory` is set and to stderr
/// otherwise. `verbose` raises the level to debug.
pub fn start_logging(config: &ConfigFile, verbose: bool) -> Result<Option<LoggingGuard>, CliError> {
    let level = if verbose {
        "debug"
    } else {
        config.logging.level.as_str()
    };

    let guard = match &config.logging.directory {
        Some(dir) => {
            let guard = init_logging(dir, &config.logging.file, level)
                .map_err(|e| CliError::LoggingInit(e.to_string()))?;
            Some(guard)
        }
        None => {
            init_console_logging(level);
            None
        }
    };
    info!("DeepZoom v{}", deepzoom::VERSION);
    Ok(guard)
}

/// Where file logging would write if enabled.
pub fn log_directory(config: &ConfigFile) -> PathBuf {
    config
        .logging
        .directory
        .clone()
        .unwrap_or_else(default_log_dir)
}
