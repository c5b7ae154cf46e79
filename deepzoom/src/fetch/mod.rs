//! Tile fetching.
//!
//! The [`FetchExecutor`] turns a newly requested address into bytes in the
//! request table: from cache storage, a provider stream, or an HTTP download
//! through the shared dispatcher. Failures never reach the renderer; a tile
//! that could not be fetched is removed from the table so a later pass can
//! ask for it again.

mod auth;
mod error;
mod executor;

pub use auth::{AuthDecision, CredentialStore};
pub use error::FetchError;
pub use executor::FetchExecutor;
pub(crate) use executor::ExecutorParts;
