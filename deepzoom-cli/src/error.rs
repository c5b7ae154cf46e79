//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and exit codes.

use std::fmt;
use std::process;

use deepzoom::config::ConfigFileError;
use deepzoom::provider::HttpError;
use deepzoom::source::SourceError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Invalid arguments or settings
    Config(String),
    /// Config file could not be read or written
    ConfigFile(ConfigFileError),
    /// HTTP client could not be built
    Http(HttpError),
    /// Tile source failed to start
    Source(SourceError),
    /// Async runtime could not be created
    Runtime(std::io::Error),
    /// Not every tile arrived before the deadline
    Timeout { resolved: usize, total: usize },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Timeout { .. } => {
                eprintln!();
                eprintln!("Common causes:");
                eprintln!("  1. The URL template points at a server that answers 404");
                eprintln!("  2. The server requires credentials: set [auth] in config.ini");
                eprintln!("  3. The network is slow: raise --timeout");
                process::exit(2)
            }
            CliError::ConfigFile(_) => {
                eprintln!();
                eprintln!("Run 'deepzoom config path' to locate the file.");
                process::exit(1)
            }
            _ => process::exit(1),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Http(e) => write!(f, "{}", e),
            CliError::Source(e) => write!(f, "Failed to start tile source: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::Timeout { resolved, total } => {
                write!(f, "Timed out with {} of {} tiles resolved", resolved, total)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::ConfigFile(e) => Some(e),
            CliError::Http(e) => Some(e),
            CliError::Source(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::ConfigFile(e)
    }
}

impl From<HttpError> for CliError {
    fn from(e: HttpError) -> Self {
        CliError::Http(e)
    }
}

impl From<SourceError> for CliError {
    fn from(e: SourceError) -> Self {
        CliError::Source(e)
    }
}
