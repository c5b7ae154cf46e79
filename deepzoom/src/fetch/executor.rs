//! Per-source fetch orchestration.
//!
//! # Request flow
//!
//! ```text
//! request(address) ──► intake channel (one task per source, in order)
//!     │
//!     ▼
//! provider.tile_layer ──► Empty  ──► resolve without bytes
//!     │                ──► Stream ──► read on a blocking thread ──► resolve
//!     ▼ Uri
//! storage.load_async ──► hit ──► resolve (no download, no re-save)
//!     │ miss
//!     ▼
//! dispatcher (active queue) ──► attempt ──► 2xx ──► save ──► resolve ──► notify
//!                                 │    ──► 401 ──► credential ──► one retry
//!                                 │    ──► 404 ──► remove entry
//!                                 └──► other ──► degraded queue until max attempts
//! ```

use std::io::Read;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::auth::{AuthDecision, CredentialStore};
use super::error::FetchError;
use crate::cache::{BoxFuture, CacheStorage, TileEntry};
use crate::config::RequestCachePolicy;
use crate::coord::TileAddress;
use crate::dispatcher::{
    DownloadDispatcher, DownloadHandler, DownloadTask, TaskContext, TaskId, TaskOutcome,
};
use crate::provider::{Credential, HttpClient, HttpRequest, HttpResponse, ProviderHandle, TileLayer};
use crate::source::SourceShared;

/// Why a single HTTP exchange failed, before retry policy is applied.
enum Failure {
    Unauthorized { header: Option<String> },
    NotFound,
    Other(String),
}

/// Collaborators a [`FetchExecutor`] is built from.
pub(crate) struct ExecutorParts {
    pub shared: Arc<SourceShared>,
    pub provider: ProviderHandle,
    pub http: Arc<dyn HttpClient>,
    pub storage: Option<Arc<dyn CacheStorage>>,
    pub dispatcher: Arc<DownloadDispatcher>,
    pub credential: Option<Credential>,
    pub max_attempts: u32,
    pub cache_policy: RequestCachePolicy,
}

/// A newly requested address and the table entry it was requested for.
struct Intake {
    address: TileAddress,
    entry: Arc<TileEntry>,
}

/// Fetches tiles for one source and records the results in its table.
///
/// Requests are taken in the order the scheduler issues them and handed to
/// the dispatcher in that same order, so coarse tiles queue before their
/// descendants.
pub struct FetchExecutor {
    this: Weak<FetchExecutor>,
    shared: Arc<SourceShared>,
    provider: ProviderHandle,
    http: Arc<dyn HttpClient>,
    storage: Option<Arc<dyn CacheStorage>>,
    dispatcher: Arc<DownloadDispatcher>,
    credentials: CredentialStore,
    intake: mpsc::UnboundedSender<Intake>,
    /// Downloads handed to the dispatcher and not yet finished.
    in_flight: DashMap<TileAddress, TaskId>,
    max_attempts: u32,
    cache_policy: RequestCachePolicy,
}

impl FetchExecutor {
    /// Builds the executor and spawns its intake task on the current runtime.
    pub(crate) fn new(parts: ExecutorParts) -> Arc<Self> {
        let (intake, rx) = mpsc::unbounded_channel();
        let executor = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            shared: parts.shared,
            provider: parts.provider,
            http: parts.http,
            storage: parts.storage,
            dispatcher: parts.dispatcher,
            credentials: CredentialStore::new(parts.credential),
            intake,
            in_flight: DashMap::new(),
            max_attempts: parts.max_attempts.max(1),
            cache_policy: parts.cache_policy,
        });
        tokio::spawn(Self::run_intake(
            Arc::downgrade(&executor),
            executor.shared.abort.clone(),
            rx,
        ));
        executor
    }

    /// Starts fetching a newly inserted address.
    pub fn request(&self, address: TileAddress) {
        let Some(entry) = self.shared.table.get(&address) else {
            return;
        };
        if self.intake.send(Intake { address, entry }).is_err() {
            self.shared.table.remove(&address);
        }
    }

    /// Cancels the download of `address`, if one is queued or running.
    pub fn cancel(&self, address: TileAddress) -> bool {
        match self.in_flight.remove(&address) {
            Some((_, id)) => {
                trace!(address = %address, task = %id, "Download cancelled");
                self.dispatcher.remove(id);
                self.shared.metrics.cancelled();
                true
            }
            None => false,
        }
    }

    /// Cancels every download of this source.
    pub fn cancel_all(&self) -> usize {
        let addresses: Vec<TileAddress> = self.in_flight.iter().map(|e| *e.key()).collect();
        addresses
            .into_iter()
            .filter(|address| self.cancel(*address))
            .count()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    // =========================================================================
    // Layer dispatch
    // =========================================================================

    /// Serves requests one at a time until the source stops or goes away.
    async fn run_intake(
        this: Weak<FetchExecutor>,
        abort: CancellationToken,
        mut rx: mpsc::UnboundedReceiver<Intake>,
    ) {
        loop {
            let next = tokio::select! {
                biased;
                _ = abort.cancelled() => break,
                next = rx.recv() => next,
            };
            let Some(intake) = next else {
                break;
            };
            let Some(executor) = this.upgrade() else {
                break;
            };
            executor.begin(intake).await;
        }
        trace!("Fetch intake stopped");
    }

    /// Whether `intake`'s entry is still the one in the table. False once the
    /// address was dropped, even if a later pass inserted it again.
    fn is_current(&self, intake: &Intake) -> bool {
        self.shared
            .table
            .get(&intake.address)
            .is_some_and(|entry| Arc::ptr_eq(&entry, &intake.entry))
    }

    async fn begin(self: Arc<Self>, intake: Intake) {
        let address = intake.address;
        let layer = match self.provider.tile_layer(address).await {
            Ok(layer) => layer,
            Err(e) => {
                debug!(address = %address, error = %e, "No tile layer");
                self.shared.table.remove(&address);
                return;
            }
        };
        if self.shared.abort.is_cancelled() {
            return;
        }
        if !self.is_current(&intake) {
            trace!(address = %address, "Request superseded before fetch");
            return;
        }

        match layer {
            TileLayer::Empty => {
                self.shared.metrics.empty_tile();
                self.resolve(address, None);
            }
            TileLayer::Stream(reader) => {
                tokio::spawn(async move { self.read_stream(address, reader).await });
            }
            TileLayer::Uri(uri) => {
                if let Some(bytes) = self.load_stored(address).await {
                    self.resolve(address, Some(bytes));
                } else {
                    self.enqueue_download(&intake, uri);
                }
            }
        }
    }

    async fn read_stream(&self, address: TileAddress, mut reader: Box<dyn Read + Send>) {
        let read = tokio::task::spawn_blocking(move || {
            let mut buffer = Vec::new();
            reader.read_to_end(&mut buffer).map(|_| buffer)
        })
        .await;

        match read {
            Ok(Ok(buffer)) => self.resolve(address, Some(Bytes::from(buffer))),
            Ok(Err(e)) => {
                warn!(address = %address, error = %e, "Tile stream read failed");
                self.shared.metrics.tile_failed();
                self.shared.table.remove(&address);
            }
            Err(e) => {
                warn!(address = %address, error = %e, "Tile stream reader panicked");
                self.shared.metrics.tile_failed();
                self.shared.table.remove(&address);
            }
        }
    }

    async fn load_stored(&self, address: TileAddress) -> Option<Bytes> {
        let storage = self.storage.as_ref()?;
        let name = self.provider.cache_name(address).await.ok()?;
        match storage.load_async(&name).await {
            Ok(Some(bytes)) => {
                trace!(address = %address, name = %name, "Storage hit");
                self.shared.metrics.storage_hit();
                Some(bytes)
            }
            Ok(None) => {
                self.shared.metrics.storage_miss();
                None
            }
            Err(e) => {
                debug!(address = %address, error = %e, "Storage read failed");
                self.shared.metrics.storage_miss();
                None
            }
        }
    }

    fn enqueue_download(&self, intake: &Intake, uri: String) {
        let address = intake.address;
        if self.shared.abort.is_cancelled() || !self.is_current(intake) {
            return;
        }
        let handler: Weak<dyn DownloadHandler> = self.this.clone();
        let task = DownloadTask::new(address, uri, handler, self.shared.abort.child_token());
        let id = task.id();
        if let Some(stale) = self.in_flight.insert(address, id) {
            self.dispatcher.remove(stale);
        }
        // A stop that raced the checks above has already run cancel_all.
        if self.shared.abort.is_cancelled() {
            self.release(address, id);
            return;
        }
        if !self.dispatcher.enqueue(task, true) {
            self.release(address, id);
            self.shared.table.remove(&address);
        }
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Records a result in the table and wakes whoever needs to know.
    fn resolve(&self, address: TileAddress, bytes: Option<Bytes>) {
        let has_bytes = bytes.is_some();
        if self.shared.table.update(&address, bytes).is_none() {
            trace!(address = %address, "Result for removed tile discarded");
            return;
        }
        self.shared.maintain.notify_one();

        if !self.shared.is_visible(address) {
            self.shared.table.remove(&address);
            self.shared.metrics.out_of_view();
            return;
        }
        if has_bytes {
            self.shared.notify_available();
        }
    }

    /// Releases the download slot of `id`. False if another task owns it.
    fn release(&self, address: TileAddress, id: TaskId) -> bool {
        self.in_flight
            .remove_if(&address, |_, current| *current == id)
            .is_some()
    }

    async fn save(&self, address: TileAddress, uri: &str, expires: Option<DateTime<Utc>>, body: &Bytes) {
        let Some(storage) = self.storage.as_ref() else {
            return;
        };
        if !matches!(self.provider.is_valid_cache_uri(address, uri).await, Ok(true)) {
            trace!(address = %address, "URI changed, download not stored");
            return;
        }
        let Ok(name) = self.provider.cache_name(address).await else {
            return;
        };
        match storage.save(&name, expires, body.clone()) {
            Ok(()) => self.shared.metrics.storage_write(),
            Err(e) => debug!(address = %address, error = %e, "Storage write failed"),
        }
    }

    // =========================================================================
    // One attempt
    // =========================================================================

    async fn exchange(
        &self,
        ctx: &TaskContext,
        credential: Option<Credential>,
    ) -> Result<HttpResponse, Failure> {
        self.shared.metrics.download_started();
        let request = HttpRequest::new(ctx.uri.to_string())
            .with_credential(credential)
            .with_cache_policy(self.cache_policy);

        let response = self
            .http
            .get(request)
            .await
            .map_err(|e| Failure::Other(e.to_string()))?;

        match response.status {
            401 => Err(Failure::Unauthorized {
                header: response.www_authenticate,
            }),
            404 => Err(Failure::NotFound),
            status if !response.is_success() => Err(Failure::Other(format!("HTTP {}", status))),
            _ => match response.content_length {
                Some(expected) if expected > 0 && expected != response.body.len() as u64 => {
                    Err(Failure::Other(format!(
                        "expected {} bytes, received {}",
                        expected,
                        response.body.len()
                    )))
                }
                _ => Ok(response),
            },
        }
    }

    async fn attempt(&self, ctx: &TaskContext) -> Result<HttpResponse, FetchError> {
        let address = ctx.address;
        let used = self.credentials.current().await;

        match self.exchange(ctx, used.clone()).await {
            Ok(response) => Ok(response),
            Err(Failure::NotFound) => Err(FetchError::NotFound { address }),
            Err(Failure::Other(reason)) => Err(FetchError::transient(address, reason)),
            Err(Failure::Unauthorized { header }) => {
                self.shared.metrics.auth_challenge();
                let decision = self
                    .credentials
                    .acquire(&self.provider, &ctx.uri, header.as_deref(), used.as_ref())
                    .await;
                match decision {
                    AuthDecision::GiveUp { scheme } => {
                        Err(FetchError::AuthRequired { address, scheme })
                    }
                    AuthDecision::Retry(credential) => {
                        debug!(address = %address, "Retrying with new credential");
                        match self.exchange(ctx, Some(credential)).await {
                            Ok(response) => Ok(response),
                            Err(Failure::Unauthorized { .. }) => Err(FetchError::transient(
                                address,
                                "credential rejected",
                            )),
                            Err(Failure::NotFound) => {
                                Err(FetchError::transient(address, "HTTP 404 after authentication"))
                            }
                            Err(Failure::Other(reason)) => {
                                Err(FetchError::transient(address, reason))
                            }
                        }
                    }
                }
            }
        }
    }

    async fn run_task(self: Arc<Self>, ctx: TaskContext) -> TaskOutcome {
        let address = ctx.address;
        match self.attempt(&ctx).await {
            Ok(response) => {
                if ctx.cancel.is_cancelled() {
                    return TaskOutcome::Cancelled;
                }
                let body = response.body;
                self.shared.metrics.download_completed(body.len() as u64);
                trace!(address = %address, bytes = body.len(), attempt = ctx.attempt, "Downloaded");

                self.save(address, &ctx.uri, response.expires, &body).await;
                if self.release(address, ctx.id) {
                    self.resolve(address, Some(body));
                }
                TaskOutcome::Completed
            }
            Err(error) => self.fail(&ctx, error),
        }
    }

    fn fail(&self, ctx: &TaskContext, error: FetchError) -> TaskOutcome {
        let address = ctx.address;
        if error.is_retryable() && ctx.attempt + 1 < self.max_attempts {
            self.shared.metrics.retry_scheduled();
            debug!(address = %address, attempt = ctx.attempt, error = %error, "Attempt failed, will retry");
            return TaskOutcome::Retry(error);
        }

        match &error {
            FetchError::NotFound { .. } => {
                self.shared.metrics.not_found();
                debug!(address = %address, "Tile not found");
            }
            _ => {
                self.shared.metrics.tile_failed();
                warn!(address = %address, attempts = ctx.attempt + 1, error = %error, "Giving up on tile");
            }
        }
        if self.release(address, ctx.id) {
            self.shared.table.remove(&address);
        }
        TaskOutcome::Dropped(error)
    }
}

impl DownloadHandler for FetchExecutor {
    fn validate(&self, address: TileAddress) -> bool {
        !self.shared.abort.is_cancelled()
            && self.shared.table.contains(&address)
            && self.shared.is_visible(address)
    }

    fn discard(&self, id: TaskId, address: TileAddress) {
        if self.release(address, id) && self.shared.table.remove(&address).is_some() {
            self.shared.metrics.out_of_view();
            trace!(address = %address, "Out of view before download");
        }
    }

    fn execute(self: Arc<Self>, ctx: TaskContext) -> BoxFuture<'static, TaskOutcome> {
        Box::pin(self.run_task(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DownloadConfig, SourceConfig};
    use crate::coord::ViewportSnapshot;
    use crate::provider::{HttpError, ProviderContext, TileProvider};
    use parking_lot::Mutex;
    use std::time::Duration;

    struct UriProvider;

    impl TileProvider for UriProvider {
        fn source_id(&self) -> &str {
            "unit"
        }

        fn tile_layer(&mut self, address: TileAddress) -> TileLayer {
            TileLayer::Uri(format!("mock://{}", address))
        }
    }

    /// Answers 200 after `delay` and records every URL.
    struct RecordingHttp {
        delay: Duration,
        urls: Mutex<Vec<String>>,
    }

    impl HttpClient for RecordingHttp {
        fn get(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, HttpError>> {
            Box::pin(async move {
                self.urls.lock().push(request.url.clone());
                tokio::time::sleep(self.delay).await;
                Ok(HttpResponse::new(200, Bytes::from_static(b"tile")))
            })
        }
    }

    struct Fixture {
        executor: Arc<FetchExecutor>,
        shared: Arc<SourceShared>,
        http: Arc<RecordingHttp>,
        dispatcher: Arc<DownloadDispatcher>,
        _context: ProviderContext,
    }

    fn fixture(delay: Duration) -> Fixture {
        let shared = Arc::new(SourceShared::new(&SourceConfig::new("unit", 10)));
        let (provider, context) = ProviderContext::spawn(UriProvider).unwrap();
        let dispatcher =
            DownloadDispatcher::start(&DownloadConfig::new().with_max_concurrent_downloads(1));
        let http = Arc::new(RecordingHttp {
            delay,
            urls: Mutex::new(Vec::new()),
        });
        let executor = FetchExecutor::new(ExecutorParts {
            shared: Arc::clone(&shared),
            provider,
            http: Arc::clone(&http) as Arc<dyn HttpClient>,
            storage: None,
            dispatcher: Arc::clone(&dispatcher),
            credential: None,
            max_attempts: 1,
            cache_policy: RequestCachePolicy::default(),
        });
        shared
            .viewport
            .send_replace(Some(ViewportSnapshot::new(0.0, 0.0, 1.0, 512.0, 512.0)));
        Fixture {
            executor,
            shared,
            http,
            dispatcher,
            _context: context,
        }
    }

    fn intake_for(shared: &SourceShared, address: TileAddress) -> Intake {
        Intake {
            address,
            entry: shared.table.get(&address).unwrap(),
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_reinserted_address_is_downloaded_once() {
        let f = fixture(Duration::ZERO);
        let address = TileAddress::new(1, 0, 0);
        f.shared.table.touch_or_insert(address);
        let stale = intake_for(&f.shared, address);

        // Swept and requested again by a later pass.
        f.shared.table.remove(&address);
        f.shared.table.touch_or_insert(address);

        Arc::clone(&f.executor).begin(stale).await;
        assert_eq!(f.executor.in_flight(), 0);
        assert_eq!(f.dispatcher.queued(), 0);

        f.executor.request(address);
        wait_until(|| f.shared.table.get(&address).is_some_and(|e| e.is_resolved())).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(f.http.urls.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_intake_is_not_enqueued() {
        let f = fixture(Duration::ZERO);
        let address = TileAddress::new(1, 1, 0);
        f.shared.table.touch_or_insert(address);
        let stale = intake_for(&f.shared, address);
        f.shared.table.remove(&address);
        f.shared.table.touch_or_insert(address);

        f.executor
            .enqueue_download(&stale, "mock://L1/1/0".to_string());
        assert_eq!(f.executor.in_flight(), 0);
        assert_eq!(f.dispatcher.queued(), 0);
    }

    #[tokio::test]
    async fn test_enqueue_after_stop_leaves_no_slot() {
        let f = fixture(Duration::ZERO);
        let address = TileAddress::new(1, 0, 1);
        f.shared.table.touch_or_insert(address);
        let intake = intake_for(&f.shared, address);

        f.shared.abort.cancel();
        f.executor
            .enqueue_download(&intake, "mock://L1/0/1".to_string());

        assert_eq!(f.executor.in_flight(), 0);
        assert_eq!(f.dispatcher.queued(), 0);
        assert!(f.http.urls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_tile_leaving_view_during_download_is_removed() {
        let f = fixture(Duration::from_millis(100));
        let address = TileAddress::new(1, 1, 1);
        let available = f.shared.available.subscribe();
        f.shared.table.touch_or_insert(address);
        f.executor.request(address);
        wait_until(|| !f.http.urls.lock().is_empty()).await;

        // Pan so only the left half is visible while the bytes are in flight.
        f.shared
            .viewport
            .send_replace(Some(ViewportSnapshot::new(-0.5, 0.0, 1.0, 512.0, 512.0)));
        wait_until(|| f.shared.metrics.snapshot().out_of_view == 1).await;

        assert!(!f.shared.table.contains(&address));
        assert_eq!(f.shared.metrics.snapshot().downloads_completed, 1);
        assert_eq!(*available.borrow(), 0);
    }
}
