// src/batch.rs
//
// Bounded-concurrency batch executor.
//
// Every item is spawned up front as its own task, gated by a per-batch
// semaphore sized to min(items, concurrency). Results are harvested on the
// calling task in submission order, so the success/failure collections are
// only ever touched from one place and need no locking.

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::constants::MAX_CONCURRENCY;
use crate::error::BlobResult;
use crate::ops::{OperationOutcome, WorkItem};

/// Count-derived summary of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Partitioned result of a batch (after all retry passes, where applicable).
///
/// `succeeded` holds result keys (e.g. blob names), `failed` holds the
/// original item identifiers. Every submitted item lands in exactly one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    /// Last error seen for each failed item.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
    pub summary: BatchSummary,
}

impl BatchResult {
    pub fn from_outcomes(outcomes: Vec<OperationOutcome>) -> Self {
        let mut result = BatchResult::default();
        for outcome in outcomes {
            result.record(outcome);
        }
        result
    }

    fn record(&mut self, outcome: OperationOutcome) {
        if outcome.is_success() {
            let key = outcome.result_key.unwrap_or(outcome.item.source);
            self.succeeded.push(key);
        } else {
            if let Some(detail) = outcome.error_detail {
                self.errors.insert(outcome.item.source.clone(), detail);
            }
            self.failed.push(outcome.item.source);
        }
        self.refresh_summary();
    }

    pub(crate) fn refresh_summary(&mut self) {
        self.summary = BatchSummary {
            total: self.succeeded.len() + self.failed.len(),
            succeeded: self.succeeded.len(),
            failed: self.failed.len(),
        };
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    /// Human-readable one-liner, e.g. "Uploaded 2/3 items. 1 operations failed".
    pub fn message(&self, verb: &str) -> String {
        let s = &self.summary;
        if s.failed == 0 {
            format!("Successfully {} all {} items", verb.to_lowercase(), s.succeeded)
        } else {
            format!(
                "{} {}/{} items. {} operations failed",
                capitalize(verb),
                s.succeeded,
                s.total,
                s.failed
            )
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Spawned tasks not yet harvested. Dropping the pool before harvesting
/// finishes (the batch future was cancelled) aborts whatever is left.
struct TaskPool {
    pending: VecDeque<(WorkItem, JoinHandle<OperationOutcome>)>,
}

impl TaskPool {
    fn next(&mut self) -> Option<(WorkItem, JoinHandle<OperationOutcome>)> {
        self.pending.pop_front()
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        for (_, handle) in self.pending.drain(..) {
            handle.abort();
        }
    }
}

/// Runs N independent single-item operations with at most `concurrency` in flight.
#[derive(Debug, Clone, Copy)]
pub struct BatchExecutor {
    concurrency: usize,
    wait_timeout: Duration,
}

impl BatchExecutor {
    pub fn new(concurrency: usize, wait_timeout: Duration) -> Self {
        Self {
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            wait_timeout,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Run `op` over every item and return one outcome per item, in submission order.
    ///
    /// `op` returns the item's result key on success. An error or panic inside
    /// one item becomes that item's `Failure` and never disturbs its siblings.
    /// An item whose harvest wait exceeds the timeout is recorded as failed and
    /// left running; the remote operation may still complete afterwards.
    pub async fn run<F, Fut>(&self, label: &str, items: Vec<WorkItem>, op: F) -> Vec<OperationOutcome>
    where
        F: Fn(WorkItem) -> Fut,
        Fut: Future<Output = BlobResult<String>> + Send + 'static,
    {
        if items.is_empty() {
            return Vec::new();
        }

        // Cap the number of concurrent tasks to the number of items
        let effective_jobs = std::cmp::min(self.concurrency, items.len());
        info!("Starting {} of {} item(s) (jobs={})", label, items.len(), effective_jobs);

        let sem = Arc::new(Semaphore::new(effective_jobs));
        let mut pool = TaskPool { pending: VecDeque::with_capacity(items.len()) };
        for item in items {
            let sem = sem.clone();
            let fut = op(item.clone());
            let task_item = item.clone();
            let handle = tokio::spawn(async move {
                let _permit = match sem.acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => return OperationOutcome::failure(task_item, "worker pool closed"),
                };
                match fut.await {
                    Ok(key) => OperationOutcome::success(task_item, key),
                    Err(e) => OperationOutcome::failure(task_item, e.to_string()),
                }
            });
            pool.pending.push_back((item, handle));
        }

        let mut outcomes = Vec::with_capacity(pool.pending.len());
        while let Some((item, handle)) = pool.next() {
            let outcome = match timeout(self.wait_timeout, handle).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(join_err)) => {
                    OperationOutcome::failure(item, format!("task failed: {}", join_err))
                }
                Err(_) => OperationOutcome::failure(
                    item,
                    format!("no result within {:?}", self.wait_timeout),
                ),
            };
            match &outcome.error_detail {
                Some(detail) => warn!("{} of {} failed: {}", label, outcome.item.source, detail),
                None => debug!("{} of {} succeeded", label, outcome.item.source),
            }
            outcomes.push(outcome);
        }

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        info!(
            "Finished {} of {} item(s): {} succeeded, {} failed",
            label,
            outcomes.len(),
            outcomes.len() - failed,
            failed
        );
        outcomes
    }
}
