//! Process-wide download dispatcher.
//!
//! One dispatcher is shared by every tile source. It owns two FIFO queues:
//! the active queue for first attempts and the degraded queue for retries.
//! A single loop pops tasks, preferring the active queue, and hands each to
//! a worker task once a semaphore permit is available.
//!
//! ```text
//!  enqueue(task, true)  ──► [ active   ] ──┐
//!                                          ├──► permit ──► worker ──► handler.execute()
//!  worker Retry outcome ──► [ degraded ] ──┘                  │
//!        ▲          (popped once ready_at has passed)         │
//!        └────────────────────────────────────────────────────┘
//! ```
//!
//! Degraded tasks share one timer: the loop sleeps until the head of the
//! degraded queue is ready, or until something new is enqueued.

mod task;

pub use task::{DownloadHandler, DownloadTask, TaskContext, TaskId, TaskOutcome};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::DownloadConfig;

/// What the loop should do next.
enum Next {
    Run(DownloadTask),
    /// Only degraded tasks remain; the head becomes ready at this instant.
    WaitUntil(Instant),
    Idle,
}

/// Shared, bounded download worker pool.
///
/// Construct with [`DownloadDispatcher::start`] inside a tokio runtime and
/// share the returned `Arc` between sources.
pub struct DownloadDispatcher {
    active: Mutex<VecDeque<DownloadTask>>,
    degraded: Mutex<VecDeque<DownloadTask>>,
    /// Every task that has been enqueued and not yet finished or removed.
    tasks: DashMap<TaskId, CancellationToken>,
    wake: Notify,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    in_flight: AtomicUsize,
    retry_delay: Duration,
    shutdown: CancellationToken,
}

impl DownloadDispatcher {
    /// Creates the dispatcher and spawns its loop on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start(config: &DownloadConfig) -> Arc<Self> {
        let dispatcher = Arc::new(Self {
            active: Mutex::new(VecDeque::new()),
            degraded: Mutex::new(VecDeque::new()),
            tasks: DashMap::new(),
            wake: Notify::new(),
            permits: Arc::new(Semaphore::new(config.max_concurrent_downloads())),
            max_concurrent: config.max_concurrent_downloads(),
            in_flight: AtomicUsize::new(0),
            retry_delay: config.retry_delay(),
            shutdown: CancellationToken::new(),
        });

        info!(
            max_concurrent = config.max_concurrent_downloads(),
            retry_delay_ms = config.retry_delay().as_millis() as u64,
            "Download dispatcher started"
        );
        tokio::spawn(Arc::clone(&dispatcher).run());
        dispatcher
    }

    /// Queues `task`. `active` selects the active queue; otherwise the task
    /// goes to the degraded queue and waits for its retry instant.
    ///
    /// Returns `false` when the task is already known or the dispatcher is
    /// shut down.
    pub fn enqueue(&self, task: DownloadTask, active: bool) -> bool {
        if self.shutdown.is_cancelled() {
            return false;
        }
        match self.tasks.entry(task.id()) {
            dashmap::mapref::entry::Entry::Occupied(_) => return false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(task.cancel_token().clone());
            }
        }

        trace!(task = %task.id(), address = %task.address(), active, "Task enqueued");
        if active {
            self.active.lock().push_back(task);
        } else {
            self.degraded.lock().push_back(task);
        }
        self.wake.notify_one();
        true
    }

    /// Cancels a task and forgets it. Returns `false` if it was unknown.
    pub fn remove(&self, id: TaskId) -> bool {
        match self.tasks.remove(&id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether `id` is queued or running.
    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Stops the loop and cancels every known task.
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        for entry in self.tasks.iter() {
            entry.value().cancel();
        }
        self.tasks.clear();
        self.active.lock().clear();
        self.degraded.lock().clear();
        self.wake.notify_one();
        info!("Download dispatcher shut down");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Tasks waiting in either queue, removed ones included until popped.
    pub fn queued(&self) -> usize {
        self.active.lock().len() + self.degraded.lock().len()
    }

    /// Attempts currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Relaxed)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    // =========================================================================
    // Loop
    // =========================================================================

    async fn run(self: Arc<Self>) {
        loop {
            let permit = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let Some(task) = self.next_task().await else {
                break;
            };
            tokio::spawn(Arc::clone(&self).work(task, permit));
        }
        debug!("Download dispatcher loop exited");
    }

    /// Waits for the next runnable task. `None` on shutdown.
    async fn next_task(&self) -> Option<DownloadTask> {
        loop {
            // Registered before looking at the queues so an enqueue in
            // between is not missed.
            let notified = self.wake.notified();
            match self.pop_ready(Instant::now()) {
                Next::Run(task) => return Some(task),
                Next::WaitUntil(at) => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return None,
                        _ = notified => {}
                        _ = tokio::time::sleep_until(at.into()) => {}
                    }
                }
                Next::Idle => {
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return None,
                        _ = notified => {}
                    }
                }
            }
        }
    }

    fn is_live(&self, task: &DownloadTask) -> bool {
        !task.cancel_token().is_cancelled() && self.tasks.contains_key(&task.id())
    }

    fn pop_ready(&self, now: Instant) -> Next {
        {
            let mut active = self.active.lock();
            while let Some(task) = active.pop_front() {
                if self.is_live(&task) {
                    return Next::Run(task);
                }
                self.forget(task.id());
            }
        }

        let mut degraded = self.degraded.lock();
        while let Some(head) = degraded.front() {
            if !self.is_live(head) {
                let id = head.id();
                degraded.pop_front();
                self.forget(id);
                continue;
            }
            if head.is_ready(now) {
                return degraded.pop_front().map_or(Next::Idle, Next::Run);
            }
            return Next::WaitUntil(head.ready_at().unwrap_or(now));
        }
        Next::Idle
    }

    fn forget(&self, id: TaskId) {
        self.tasks.remove(&id);
    }

    // =========================================================================
    // Worker
    // =========================================================================

    async fn work(self: Arc<Self>, mut task: DownloadTask, permit: OwnedSemaphorePermit) {
        let Some(handler) = task.handler() else {
            trace!(task = %task.id(), "Source gone, task discarded");
            self.forget(task.id());
            return;
        };
        if !self.is_live(&task) {
            self.forget(task.id());
            return;
        }
        if !handler.validate(task.address()) {
            handler.discard(task.id(), task.address());
            self.forget(task.id());
            return;
        }

        self.in_flight.fetch_add(1, Ordering::Relaxed);
        let cancel = task.cancel_token().clone();
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => TaskOutcome::Cancelled,
            outcome = Arc::clone(&handler).execute(task.context()) => outcome,
        };
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
        drop(permit);
        drop(handler);

        match outcome {
            TaskOutcome::Retry(reason) if self.is_live(&task) && !self.is_shutdown() => {
                task.schedule_retry(Instant::now() + self.retry_delay);
                debug!(
                    task = %task.id(),
                    address = %task.address(),
                    attempt = task.attempts(),
                    reason = %reason,
                    "Task degraded"
                );
                self.degraded.lock().push_back(task);
                self.wake.notify_one();
            }
            TaskOutcome::Dropped(reason) => {
                debug!(task = %task.id(), reason = %reason, "Task dropped");
                self.forget(task.id());
            }
            _ => self.forget(task.id()),
        }
    }
}
