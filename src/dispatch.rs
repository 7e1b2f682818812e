//! Fan-out dispatcher: bounded-concurrency processing of one batch.
//!
//! One task is spawned per input item onto a pool bounded by a semaphore of
//! exactly `worker_count` permits. The pool exists for the duration of one
//! `dispatch` call - no cross-batch state. Every per-task fault (error
//! return, panic, timeout) is converted at the task boundary into a
//! synthesized failed [`TaskResult`], so a single bad item can never abort
//! its siblings or the batch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::error::VolleyError;
use crate::process::Processor;
use crate::task::TaskResult;

/// Unique identifier for one dispatched batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BatchId(pub Uuid);

impl BatchId {
    pub fn new() -> Self {
        BatchId(Uuid::new_v4())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BatchId {
    fn from(uuid: Uuid) -> Self {
        BatchId(uuid)
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Configuration for the dispatcher.
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    /// Per-task timeout in milliseconds. A timed out task yields a
    /// synthesized failed result while its siblings continue. `None`
    /// disables the timeout.
    pub task_timeout_ms: Option<u64>,

    /// Overall batch deadline in milliseconds, measured from the start of
    /// the dispatch call. When it expires, unfinished tasks are aborted and
    /// each still-pending item yields a synthesized failed result. `None`
    /// disables the deadline.
    pub batch_deadline_ms: Option<u64>,
}

/// Dispatches one batch of items across a bounded worker pool.
///
/// The dispatcher tracks in-flight/processed/failed counters for the batch
/// and tags every log line with its [`BatchId`].
pub struct Dispatcher {
    batch_id: BatchId,
    config: DispatchConfig,
    tasks_in_flight: Arc<AtomicUsize>,
    tasks_processed: Arc<AtomicU64>,
    tasks_failed: Arc<AtomicU64>,
    #[cfg(feature = "metrics")]
    metrics: Option<crate::metrics::VolleyMetrics>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatchConfig::default())
    }
}

impl Dispatcher {
    /// Create a new dispatcher for one batch.
    pub fn new(config: DispatchConfig) -> Self {
        Self {
            batch_id: BatchId::new(),
            config,
            tasks_in_flight: Arc::new(AtomicUsize::new(0)),
            tasks_processed: Arc::new(AtomicU64::new(0)),
            tasks_failed: Arc::new(AtomicU64::new(0)),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Attach a metrics registry; task completions will be recorded to it.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: crate::metrics::VolleyMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    /// Tasks currently holding a pool slot.
    pub fn tasks_in_flight(&self) -> usize {
        self.tasks_in_flight.load(Ordering::Relaxed)
    }

    pub fn tasks_processed(&self) -> u64 {
        self.tasks_processed.load(Ordering::Relaxed)
    }

    pub fn tasks_failed(&self) -> u64 {
        self.tasks_failed.load(Ordering::Relaxed)
    }

    /// Process every item through `processor` under a pool of exactly
    /// `worker_count` concurrent slots.
    ///
    /// Returns one [`TaskResult`] per item, gathered in completion order
    /// (callers needing input order re-key on [`TaskResult::query`]). The
    /// call resolves only once every submitted task has completed - there
    /// is no partial return and no cancellation path. `worker_count` bounds
    /// in-flight concurrency, not total items; slots are recycled as tasks
    /// finish.
    #[tracing::instrument(
        skip_all,
        fields(batch_id = %self.batch_id, item_count = items.len(), worker_count)
    )]
    pub async fn dispatch<P>(
        &self,
        items: Vec<String>,
        processor: Arc<P>,
        worker_count: usize,
    ) -> Vec<TaskResult>
    where
        P: Processor + 'static,
    {
        if items.is_empty() {
            tracing::debug!("Empty batch, nothing to dispatch");
            return Vec::new();
        }

        let worker_count = worker_count.max(1);
        let semaphore = Arc::new(Semaphore::new(worker_count));
        let mut join_set: JoinSet<(usize, TaskResult)> = JoinSet::new();

        // Items not yet completed, kept so deadline expiry can still yield
        // exactly one result per item.
        let mut pending: BTreeMap<usize, String> = items.iter().cloned().enumerate().collect();

        let started = tokio::time::Instant::now();
        let deadline = self
            .config
            .batch_deadline_ms
            .map(|ms| started + Duration::from_millis(ms));

        for (index, item) in items.into_iter().enumerate() {
            let semaphore = semaphore.clone();
            let processor = processor.clone();
            let tasks_in_flight = self.tasks_in_flight.clone();
            let task_timeout_ms = self.config.task_timeout_ms;
            let batch_id = self.batch_id;

            join_set.spawn(async move {
                // Never closed while the JoinSet holds this task.
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("worker pool semaphore closed");

                tasks_in_flight.fetch_add(1, Ordering::Relaxed);
                let _guard = scopeguard::guard((), |_| {
                    tasks_in_flight.fetch_sub(1, Ordering::Relaxed);
                });

                tracing::debug!(batch_id = %batch_id, query = %item, "Processing item");

                let attempt = async {
                    match task_timeout_ms {
                        Some(timeout_ms) => {
                            let timeout = Duration::from_millis(timeout_ms);
                            match tokio::time::timeout(timeout, processor.process(&item)).await {
                                Ok(outcome) => outcome,
                                Err(_) => Err(VolleyError::TaskTimeout(timeout_ms)),
                            }
                        }
                        None => processor.process(&item).await,
                    }
                };

                // Faults are isolated at this boundary: error returns and
                // panics both become synthesized failed results.
                let result = match std::panic::AssertUnwindSafe(attempt).catch_unwind().await {
                    Ok(Ok(result)) => result,
                    Ok(Err(fault)) => {
                        let message = match fault {
                            VolleyError::Task(message) => message,
                            other => other.to_string(),
                        };
                        tracing::warn!(
                            batch_id = %batch_id,
                            query = %item,
                            error = %message,
                            "Task failed, synthesizing error result"
                        );
                        TaskResult::failed(item, message)
                    }
                    Err(payload) => {
                        let message = panic_message(payload);
                        tracing::error!(
                            batch_id = %batch_id,
                            query = %item,
                            panic = %message,
                            "Task panicked, synthesizing error result"
                        );
                        TaskResult::failed(item, message)
                    }
                };

                (index, result)
            });
        }

        let mut results = Vec::with_capacity(pending.len());
        let mut deadline_expired = false;

        loop {
            let joined = match deadline {
                Some(at) if !deadline_expired => {
                    match tokio::time::timeout_at(at, join_set.join_next()).await {
                        Ok(joined) => joined,
                        Err(_) => {
                            deadline_expired = true;
                            tracing::warn!(
                                unfinished = pending.len(),
                                "Batch deadline expired, aborting unfinished tasks"
                            );
                            join_set.abort_all();
                            continue;
                        }
                    }
                }
                _ => join_set.join_next().await,
            };

            match joined {
                Some(Ok((index, result))) => {
                    pending.remove(&index);
                    self.record_completion(&result);
                    results.push(result);
                }
                Some(Err(join_error)) => {
                    // Panics are caught inside the task, so a join error
                    // only means the task was aborted at the deadline.
                    tracing::debug!(error = %join_error, "Task aborted before completion");
                }
                None => break,
            }
        }

        // Items whose tasks never finished still yield exactly one result.
        if !pending.is_empty() {
            let deadline_ms = self.config.batch_deadline_ms.unwrap_or_default();
            for (_, item) in pending {
                let result =
                    TaskResult::failed(item, VolleyError::DeadlineExceeded(deadline_ms).to_string());
                self.record_completion(&result);
                results.push(result);
            }
        }

        tracing::info!(
            result_count = results.len(),
            processed = self.tasks_processed(),
            failed = self.tasks_failed(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch drained"
        );

        results
    }

    fn record_completion(&self, result: &TaskResult) {
        if result.success {
            self.tasks_processed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        }

        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_task(result.success, Duration::from_secs_f64(result.processing_time));
            metrics.set_tasks_in_flight(self.tasks_in_flight());
        }
    }
}

/// Best-effort human-readable message from a panic payload.
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}
