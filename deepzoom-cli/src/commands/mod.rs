//! CLI command implementations.
//!
//! - [`config`] - Configuration file management (init, show, path)
//! - [`fetch`] - Fetch the tiles one viewport needs
//! - [`plan`] - Show what a viewport would request, without network I/O

pub mod common;
pub mod config;
pub mod fetch;
pub mod plan;
