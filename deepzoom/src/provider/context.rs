//! Dedicated provider thread.
//!
//! The provider lives on its own OS thread and serves queries one at a time
//! from an unbounded channel; each query carries a oneshot for its reply.
//! Callers await the reply, the provider thread never awaits anything. As
//! long as provider code does not block on a download worker, the dispatcher
//! or a request table, the round trip cannot deadlock.

use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{AuthChallenge, Credential, TileLayer, TileProvider};
use crate::coord::TileAddress;

/// The provider thread is gone (shut down or panicked).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("Provider context for '{0}' is unavailable")]
    Unavailable(String),
}

enum ProviderQuery {
    TileLayer {
        address: TileAddress,
        reply: oneshot::Sender<TileLayer>,
    },
    Authenticate {
        challenge: AuthChallenge,
        previous: Option<Credential>,
        reply: oneshot::Sender<Option<Credential>>,
    },
    IsValidCacheUri {
        address: TileAddress,
        uri: String,
        reply: oneshot::Sender<bool>,
    },
    CacheName {
        address: TileAddress,
        reply: oneshot::Sender<String>,
    },
    Shutdown,
}

/// Cloneable async front for a provider running on its own thread.
#[derive(Clone)]
pub struct ProviderHandle {
    source_id: Arc<str>,
    tx: mpsc::UnboundedSender<ProviderQuery>,
}

impl ProviderHandle {
    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn ask<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ProviderQuery,
    ) -> Result<T, ProviderError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| self.unavailable())?;
        rx.await.map_err(|_| self.unavailable())
    }

    fn unavailable(&self) -> ProviderError {
        ProviderError::Unavailable(self.source_id.to_string())
    }

    pub async fn tile_layer(&self, address: TileAddress) -> Result<TileLayer, ProviderError> {
        self.ask(|reply| ProviderQuery::TileLayer { address, reply })
            .await
    }

    pub async fn authenticate(
        &self,
        challenge: AuthChallenge,
        previous: Option<Credential>,
    ) -> Result<Option<Credential>, ProviderError> {
        self.ask(|reply| ProviderQuery::Authenticate {
            challenge,
            previous,
            reply,
        })
        .await
    }

    pub async fn is_valid_cache_uri(
        &self,
        address: TileAddress,
        uri: &str,
    ) -> Result<bool, ProviderError> {
        let uri = uri.to_string();
        self.ask(|reply| ProviderQuery::IsValidCacheUri {
            address,
            uri,
            reply,
        })
        .await
    }

    pub async fn cache_name(&self, address: TileAddress) -> Result<String, ProviderError> {
        self.ask(|reply| ProviderQuery::CacheName { address, reply })
            .await
    }
}

/// Owns the provider thread. Dropping it stops the thread once queued
/// queries are answered.
pub struct ProviderContext {
    source_id: Arc<str>,
    tx: mpsc::UnboundedSender<ProviderQuery>,
}

impl ProviderContext {
    /// Moves `provider` onto a new thread.
    pub fn spawn<P: TileProvider>(provider: P) -> std::io::Result<(ProviderHandle, Self)> {
        let source_id: Arc<str> = Arc::from(provider.source_id());
        let (tx, rx) = mpsc::unbounded_channel();

        thread::Builder::new()
            .name(format!("deepzoom-provider-{}", source_id))
            .spawn(move || serve(provider, rx))?;

        let handle = ProviderHandle {
            source_id: Arc::clone(&source_id),
            tx: tx.clone(),
        };
        Ok((handle, Self { source_id, tx }))
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Asks the thread to exit. Queries sent afterwards fail with
    /// [`ProviderError::Unavailable`].
    pub fn shutdown(&self) {
        let _ = self.tx.send(ProviderQuery::Shutdown);
    }
}

impl Drop for ProviderContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve<P: TileProvider>(mut provider: P, mut rx: mpsc::UnboundedReceiver<ProviderQuery>) {
    debug!(source = provider.source_id(), "Provider thread started");
    while let Some(query) = rx.blocking_recv() {
        // A dropped reply receiver means the asker gave up; nothing to do.
        match query {
            ProviderQuery::TileLayer { address, reply } => {
                let _ = reply.send(provider.tile_layer(address));
            }
            ProviderQuery::Authenticate {
                challenge,
                previous,
                reply,
            } => {
                let _ = reply.send(provider.authenticate(&challenge, previous.as_ref()));
            }
            ProviderQuery::IsValidCacheUri {
                address,
                uri,
                reply,
            } => {
                let _ = reply.send(provider.is_valid_cache_uri(address, &uri));
            }
            ProviderQuery::CacheName { address, reply } => {
                let _ = reply.send(provider.cache_name(address));
            }
            ProviderQuery::Shutdown => break,
        }
    }
    rx.close();
    let mut dropped = 0usize;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        warn!(
            source = provider.source_id(),
            dropped, "Provider thread stopped with queries pending"
        );
    }
    debug!(source = provider.source_id(), "Provider thread stopped");
}
