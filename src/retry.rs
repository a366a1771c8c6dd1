// src/retry.rs
//
// Upload retry controller: one initial pass, then up to `retry_passes`
// further passes over whatever failed in the previous pass.

use std::collections::BTreeMap;
use std::future::Future;
use tracing::{info, warn};

use crate::batch::{BatchExecutor, BatchResult};
use crate::error::BlobResult;
use crate::ops::WorkItem;

/// Run `op` over `items`, re-submitting only failures, for at most
/// `1 + retry_passes` passes.
///
/// Each pass is a fresh batch; the only state carried between passes is the
/// shrinking set of remaining items. Items still failing after the last pass
/// are reported as permanently failed, with the error from their last attempt.
pub async fn run_with_retries<F, Fut>(
    executor: &BatchExecutor,
    label: &str,
    items: Vec<WorkItem>,
    retry_passes: usize,
    op: F,
) -> BatchResult
where
    F: Fn(WorkItem) -> Fut,
    Fut: Future<Output = BlobResult<String>> + Send + 'static,
{
    let mut result = BatchResult::default();
    let mut remaining = items;
    let mut last_errors: BTreeMap<String, String> = BTreeMap::new();

    for pass in 0..=retry_passes {
        if remaining.is_empty() {
            break;
        }
        if pass > 0 {
            info!(
                "{}: retry pass {}/{} for {} item(s)",
                label,
                pass,
                retry_passes,
                remaining.len()
            );
        }

        let outcomes = executor.run(label, remaining, &op).await;
        let mut failed = Vec::new();
        for outcome in outcomes {
            if outcome.is_success() {
                last_errors.remove(&outcome.item.source);
                let key = outcome.result_key.unwrap_or(outcome.item.source);
                result.succeeded.push(key);
            } else {
                if let Some(detail) = outcome.error_detail {
                    last_errors.insert(outcome.item.source.clone(), detail);
                }
                failed.push(outcome.item);
            }
        }
        remaining = failed;
    }

    if !remaining.is_empty() {
        warn!(
            "{}: {} item(s) failed after {} pass(es)",
            label,
            remaining.len(),
            retry_passes + 1
        );
    }
    result.failed = remaining.into_iter().map(|item| item.source).collect();
    result.errors = last_errors;
    result.refresh_summary();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BlobError;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Fails `source` the first `k` times it is attempted.
    fn flaky(k: usize) -> impl Fn(WorkItem) -> std::pin::Pin<Box<dyn Future<Output = BlobResult<String>> + Send>> {
        let attempts: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
        move |item: WorkItem| {
            let attempts = attempts.clone();
            Box::pin(async move {
                let n = {
                    let mut map = attempts.lock().unwrap();
                    let n = map.entry(item.source.clone()).or_insert(0);
                    *n += 1;
                    *n
                };
                if item.source.starts_with("flaky") && n <= k {
                    Err(BlobError::backend(anyhow::anyhow!("transient")))
                } else {
                    Ok(item.source)
                }
            })
        }
    }

    fn items(names: &[&str]) -> Vec<WorkItem> {
        names.iter().map(|n| WorkItem::new(*n)).collect()
    }

    #[tokio::test]
    async fn zero_retry_passes_is_one_attempt() {
        let exec = BatchExecutor::new(4, Duration::from_secs(5));
        let r = run_with_retries(&exec, "upload", items(&["a", "flaky-b"]), 0, flaky(1)).await;
        assert_eq!(r.succeeded, vec!["a"]);
        assert_eq!(r.failed, vec!["flaky-b"]);
        assert_eq!(r.errors["flaky-b"], "backend error: transient");
    }

    #[tokio::test]
    async fn converges_when_passes_cover_failures() {
        let exec = BatchExecutor::new(4, Duration::from_secs(5));
        let r = run_with_retries(&exec, "upload", items(&["a", "flaky-b", "c"]), 2, flaky(2)).await;
        assert_eq!(r.succeeded, vec!["a", "c", "flaky-b"]);
        assert!(r.failed.is_empty());
        assert!(r.errors.is_empty());
        assert_eq!(r.summary.total, 3);
    }
}
