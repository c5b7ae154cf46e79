//! Download task types.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::cache::BoxFuture;
use crate::coord::TileAddress;
use crate::fetch::FetchError;

// =============================================================================
// Task identity
// =============================================================================

/// Global counter so task ids are unique across every source.
static TASK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier of a queued download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        Self(TASK_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

// =============================================================================
// Handler seam
// =============================================================================

/// What a worker hands to [`DownloadHandler::execute`] for one attempt.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub id: TaskId,
    pub address: TileAddress,
    pub uri: Arc<str>,
    /// Zero-based attempt number.
    pub attempt: u32,
    pub cancel: CancellationToken,
}

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Bytes delivered; the handler has already recorded them.
    Completed,
    /// Given up on; the handler has already cleaned up.
    Dropped(FetchError),
    /// Try again from the degraded queue.
    Retry(FetchError),
    Cancelled,
}

/// The source side of a download, reached through a weak handle.
pub trait DownloadHandler: Send + Sync + 'static {
    /// Checked before every attempt.
    fn validate(&self, address: TileAddress) -> bool;

    /// Called instead of `execute` when validation fails.
    fn discard(&self, id: TaskId, address: TileAddress);

    /// Performs one attempt end to end.
    fn execute(self: Arc<Self>, ctx: TaskContext) -> BoxFuture<'static, TaskOutcome>;
}

// =============================================================================
// Download task
// =============================================================================

/// A download waiting in, or travelling through, the dispatcher.
pub struct DownloadTask {
    id: TaskId,
    address: TileAddress,
    uri: Arc<str>,
    handler: Weak<dyn DownloadHandler>,
    cancel: CancellationToken,
    attempts: u32,
    ready_at: Option<Instant>,
    enqueued_at: Instant,
}

impl DownloadTask {
    pub fn new(
        address: TileAddress,
        uri: impl Into<Arc<str>>,
        handler: Weak<dyn DownloadHandler>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id: TaskId::next(),
            address,
            uri: uri.into(),
            handler,
            cancel,
            attempts: 0,
            ready_at: None,
            enqueued_at: Instant::now(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn address(&self) -> TileAddress {
        self.address
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Attempts already made.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Earliest instant a degraded task may run again.
    pub fn ready_at(&self) -> Option<Instant> {
        self.ready_at
    }

    pub(super) fn is_ready(&self, now: Instant) -> bool {
        self.ready_at.map_or(true, |at| at <= now)
    }

    pub(super) fn handler(&self) -> Option<Arc<dyn DownloadHandler>> {
        self.handler.upgrade()
    }

    pub(super) fn schedule_retry(&mut self, ready_at: Instant) {
        self.attempts += 1;
        self.ready_at = Some(ready_at);
    }

    pub(super) fn context(&self) -> TaskContext {
        TaskContext {
            id: self.id,
            address: self.address,
            uri: Arc::clone(&self.uri),
            attempt: self.attempts,
            cancel: self.cancel.clone(),
        }
    }

    /// Time since the task was created.
    pub fn age(&self) -> std::time::Duration {
        self.enqueued_at.elapsed()
    }
}

impl fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadTask")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("uri", &self.uri)
            .field("attempts", &self.attempts)
            .field("ready_at", &self.ready_at)
            .finish()
    }
}
