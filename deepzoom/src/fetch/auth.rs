//! HTTP authentication challenges and per-source credentials.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::provider::{AuthChallenge, Credential, ProviderHandle};

/// Leading token of the header: the scheme.
fn scheme_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*([^\s,]+)").unwrap())
}

/// `key="value"` pairs separated by whitespace or commas.
fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"(?:\s+|\s*,\s*)([^\s=,]+)="([^"]*)""#).unwrap())
}

impl AuthChallenge {
    /// Parses a `WWW-Authenticate` header such as `Basic realm="tiles"`.
    ///
    /// Returns `None` when the header has no scheme.
    pub fn parse(uri: &str, header: &str) -> Option<Self> {
        let scheme = scheme_pattern().captures(header)?.get(1)?.as_str().to_string();
        let attributes: HashMap<String, String> = attribute_pattern()
            .captures_iter(header)
            .map(|caps| (caps[1].to_string(), caps[2].to_string()))
            .collect();
        Some(Self {
            uri: uri.to_string(),
            scheme,
            attributes,
        })
    }
}

/// Result of handling a 401.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthDecision {
    /// Retry once with this credential.
    Retry(Credential),
    /// Nothing new to try; the tile is dropped.
    GiveUp { scheme: String },
}

/// The credential a source currently sends.
///
/// Acquisition is serialized: while one worker asks the provider, others
/// that hit 401 wait and then reuse whatever it obtained.
pub struct CredentialStore {
    current: Mutex<Option<Credential>>,
}

impl CredentialStore {
    pub fn new(initial: Option<Credential>) -> Self {
        Self {
            current: Mutex::new(initial),
        }
    }

    pub async fn current(&self) -> Option<Credential> {
        self.current.lock().await.clone()
    }

    /// Decides how to answer a 401 from `uri`.
    ///
    /// `used` is the credential the failed request carried. When another
    /// worker has already replaced it, the replacement is reused without
    /// asking the provider.
    pub async fn acquire(
        &self,
        provider: &ProviderHandle,
        uri: &str,
        header: Option<&str>,
        used: Option<&Credential>,
    ) -> AuthDecision {
        let mut current = self.current.lock().await;
        if let Some(existing) = current.as_ref() {
            if Some(existing) != used {
                debug!(uri, "Reusing credential obtained by another request");
                return AuthDecision::Retry(existing.clone());
            }
        }

        let Some(challenge) = header.and_then(|h| AuthChallenge::parse(uri, h)) else {
            warn!(uri, "401 without a usable WWW-Authenticate header");
            return AuthDecision::GiveUp {
                scheme: String::from("unknown"),
            };
        };
        let scheme = challenge.scheme.clone();

        match provider.authenticate(challenge, used.cloned()).await {
            Ok(Some(credential)) if Some(&credential) != used => {
                debug!(uri, scheme = %scheme, user = credential.username(), "New credential obtained");
                *current = Some(credential.clone());
                AuthDecision::Retry(credential)
            }
            Ok(_) => {
                debug!(uri, scheme = %scheme, "Provider has no new credential");
                AuthDecision::GiveUp { scheme }
            }
            Err(e) => {
                warn!(uri, error = %e, "Credential request failed");
                AuthDecision::GiveUp { scheme }
            }
        }
    }
}
