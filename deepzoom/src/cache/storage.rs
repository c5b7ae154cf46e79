//! Cache storage collaborator.
//!
//! Storage sits behind the request table: the fetch executor reads it before
//! going to the network and writes successful downloads back to it. Entries
//! are keyed by a tile name derived from source identity and address, and
//! carry the expiry advertised by the server.
//!
//! # Dyn Compatibility
//!
//! Async methods return [`BoxFuture`] so storages can be shared as
//! `Arc<dyn CacheStorage>` across every source.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error in a backing store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The entry would not fit in the store.
    #[error("Entry too large: {size} bytes (max: {max})")]
    TooLarge { size: u64, max: u64 },

    /// Provider-specific error.
    #[error("Storage error: {0}")]
    Backend(String),
}

/// Persistent or shared tile store keyed by tile name.
pub trait CacheStorage: Send + Sync {
    /// Reads a stored tile.
    ///
    /// Returns `Ok(None)` when the name is unknown or the entry has expired.
    fn load(&self, name: &str) -> Result<Option<Bytes>, StorageError>;

    /// Reads a stored tile without blocking the caller's executor.
    fn load_async(&self, name: &str) -> BoxFuture<'_, Result<Option<Bytes>, StorageError>>;

    /// Stores a tile. `expires` of `None` keeps it until the store evicts it.
    fn save(
        &self,
        name: &str,
        expires: Option<DateTime<Utc>>,
        bytes: Bytes,
    ) -> Result<(), StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::TooLarge { size: 100, max: 50 };
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn test_storage_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: StorageError = io_err.into();
        assert!(matches!(err, StorageError::Io(_)));
    }
}
