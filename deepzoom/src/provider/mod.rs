//! Tile provider abstraction.
//!
//! A [`TileProvider`] tells a source where each tile comes from. Providers
//! are not required to be thread-safe: every call runs on one dedicated
//! thread owned by a [`ProviderContext`], and the rest of the crate talks to
//! it through a cloneable [`ProviderHandle`].
//!
//! HTTP access goes through the [`HttpClient`] trait so sources can be
//! driven by a scripted client in tests.

mod context;
mod http;

pub use context::{ProviderContext, ProviderError, ProviderHandle};
pub use http::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestClient};

use std::collections::HashMap;
use std::fmt;
use std::io::Read;

use crate::coord::TileAddress;

/// Where the bytes of one tile come from.
pub enum TileLayer {
    /// Download from this URI.
    Uri(String),
    /// Read this stream to completion.
    Stream(Box<dyn Read + Send>),
    /// The provider has nothing for the address.
    Empty,
}

impl fmt::Debug for TileLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileLayer::Uri(uri) => f.debug_tuple("Uri").field(uri).finish(),
            TileLayer::Stream(_) => f.write_str("Stream(..)"),
            TileLayer::Empty => f.write_str("Empty"),
        }
    }
}

/// Username and password sent as HTTP basic authentication.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    username: String,
    password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    /// URI that answered 401.
    pub uri: String,
    /// Authentication scheme, e.g. `Basic`.
    pub scheme: String,
    /// `key="value"` parameters such as `realm`.
    pub attributes: HashMap<String, String>,
}

impl AuthChallenge {
    pub fn realm(&self) -> Option<&str> {
        self.attributes.get("realm").map(String::as_str)
    }
}

/// Describes a tile pyramid.
///
/// Implementations only need `Send`: all calls for one source happen
/// sequentially on that source's provider thread.
pub trait TileProvider: Send + 'static {
    /// Identifier used in cache names and logs.
    fn source_id(&self) -> &str;

    fn tile_layer(&mut self, address: TileAddress) -> TileLayer;

    /// Answers an authentication challenge.
    ///
    /// `previous` is the credential the failed request used. Returning
    /// `None`, or the same credential again, gives up on the tile.
    fn authenticate(
        &mut self,
        _challenge: &AuthChallenge,
        _previous: Option<&Credential>,
    ) -> Option<Credential> {
        None
    }

    /// Whether bytes downloaded from `uri` may be stored for `address`.
    ///
    /// Defaults to checking that the provider would still hand out the same
    /// URI.
    fn is_valid_cache_uri(&mut self, address: TileAddress, uri: &str) -> bool {
        matches!(self.tile_layer(address), TileLayer::Uri(current) if current == uri)
    }

    /// Storage key for `address`.
    fn cache_name(&self, address: TileAddress) -> String {
        format!(
            "{}.{}x{}x{}",
            self.source_id(),
            address.level,
            address.x,
            address.y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl TileProvider for Fixed {
        fn source_id(&self) -> &str {
            "fixed"
        }

        fn tile_layer(&mut self, address: TileAddress) -> TileLayer {
            TileLayer::Uri(format!("http://tiles.test/{}", address))
        }
    }

    #[test]
    fn test_default_cache_name() {
        assert_eq!(Fixed.cache_name(TileAddress::new(5, 3, 7)), "fixed.5x3x7");
    }

    #[test]
    fn test_default_cache_uri_check() {
        let address = TileAddress::new(1, 0, 1);
        assert!(Fixed.is_valid_cache_uri(address, "http://tiles.test/L1/0/1"));
        assert!(!Fixed.is_valid_cache_uri(address, "http://tiles.test/L1/1/1"));
    }

    #[test]
    fn test_credential_debug_hides_password() {
        let text = format!("{:?}", Credential::new("user", "hunter2"));
        assert!(text.contains("user"));
        assert!(!text.contains("hunter2"));
    }
}
