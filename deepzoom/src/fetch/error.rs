//! Fetch failure taxonomy.

use thiserror::Error;

use crate::coord::TileAddress;

/// Why a fetch attempt did not produce bytes.
///
/// None of these reach the renderer; a failed tile simply stays unresolved
/// until a later pass asks for it again.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Network error, timeout, unexpected status or truncated body.
    /// Retried from the degraded queue.
    #[error("Transient failure fetching {address}: {reason}")]
    Transient { address: TileAddress, reason: String },

    /// The server answered 404.
    #[error("Tile {address} not found")]
    NotFound { address: TileAddress },

    /// Authentication failed and no new credential was available.
    #[error("Tile {address} requires {scheme} authentication")]
    AuthRequired { address: TileAddress, scheme: String },

    #[error("Fetch of {address} cancelled")]
    Cancelled { address: TileAddress },

    /// The tile left the viewport before it arrived.
    #[error("Tile {address} is no longer visible")]
    OutOfView { address: TileAddress },
}

impl FetchError {
    pub fn transient(address: TileAddress, reason: impl Into<String>) -> Self {
        FetchError::Transient {
            address,
            reason: reason.into(),
        }
    }

    pub fn address(&self) -> TileAddress {
        match self {
            FetchError::Transient { address, .. }
            | FetchError::NotFound { address }
            | FetchError::AuthRequired { address, .. }
            | FetchError::Cancelled { address }
            | FetchError::OutOfView { address } => *address,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Transient { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        let address = TileAddress::new(5, 3, 3);
        assert!(FetchError::transient(address, "timeout").is_retryable());
        assert!(!FetchError::NotFound { address }.is_retryable());
        assert!(!FetchError::Cancelled { address }.is_retryable());
    }

    #[test]
    fn test_display_includes_address() {
        let err = FetchError::NotFound {
            address: TileAddress::new(5, 3, 3),
        };
        assert_eq!(err.to_string(), "Tile L5/3/3 not found");
        assert_eq!(err.address(), TileAddress::new(5, 3, 3));
    }
}
