// src/copy.rs
//
// Async copy driver: begin-copy, poll the destination's copy status until a
// terminal state or the deadline, then clean up on anything but success.
// Rename is built on top: copy to completion, then delete the source.

use serde::Serialize;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};

use crate::constants::{COPY_POLL_DIVISOR, MAX_COPY_POLL_INTERVAL};
use crate::object_store::{BlobStore, CopyStatus};

/// Lifecycle of one async copy. `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CopyState {
    Pending,
    Success,
    Failed,
    Aborted,
    TimedOut,
}

impl CopyState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CopyState::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CopyState::Success)
    }
}

impl From<CopyStatus> for CopyState {
    fn from(status: CopyStatus) -> Self {
        match status {
            CopyStatus::Pending => CopyState::Pending,
            CopyStatus::Success => CopyState::Success,
            CopyStatus::Failed => CopyState::Failed,
            CopyStatus::Aborted => CopyState::Aborted,
        }
    }
}

/// Deadline and poll cadence for one copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl CopyPolicy {
    /// Poll interval is `timeout / 10`, capped at one second.
    pub fn from_timeout(timeout: Duration) -> Self {
        let poll_interval = std::cmp::min(MAX_COPY_POLL_INTERVAL, timeout / COPY_POLL_DIVISOR);
        Self { timeout, poll_interval }
    }
}

/// Drive one copy from `begin_copy` to a terminal state.
///
/// Blocks the calling task until the copy resolves or `policy.timeout`
/// elapses. Once the copy has started, every non-success exit aborts it and
/// deletes the destination, both best effort: their failures are logged and
/// never change the returned state. A `begin_copy` error returns `Failed`
/// and leaves the destination alone.
pub async fn run_copy(
    store: &dyn BlobStore,
    source: &str,
    destination: &str,
    policy: &CopyPolicy,
) -> CopyState {
    let copy_id = match store.begin_copy(source, destination).await {
        Ok(id) => id,
        // Nothing was written, so whatever sits at the destination is not ours to remove.
        Err(e) => {
            warn!("begin_copy {} -> {} failed: {}", source, destination, e);
            return CopyState::Failed;
        }
    };
    debug!("copy {} started: {} -> {}", copy_id, source, destination);

    let started = Instant::now();
    let state = loop {
        match store.copy_status(destination).await {
            Ok(CopyStatus::Pending) => {}
            Ok(status) => break CopyState::from(status),
            // Status reads are retried until the deadline like a pending copy.
            Err(e) => debug!("copy status of {} unavailable: {}", destination, e),
        }
        if started.elapsed() >= policy.timeout {
            break CopyState::TimedOut;
        }
        sleep(policy.poll_interval).await;
    };

    if state.is_success() {
        debug!("copy {} completed in {:?}", copy_id, started.elapsed());
        return state;
    }

    warn!(
        "copy {} -> {} ended {:?} after {:?}",
        source,
        destination,
        state,
        started.elapsed()
    );
    if let Err(e) = store.abort_copy(destination, &copy_id).await {
        warn!("abort_copy {} on {} failed: {}", copy_id, destination, e);
    }
    cleanup_destination(store, destination).await;
    state
}

async fn cleanup_destination(store: &dyn BlobStore, destination: &str) {
    match store.exists(destination).await {
        Ok(true) => {
            if let Err(e) = store.delete(destination).await {
                warn!("cleanup of {} failed: {}", destination, e);
            } else {
                debug!("removed partial copy {}", destination);
            }
        }
        Ok(false) => {}
        Err(e) => warn!("cleanup of {} skipped, existence check failed: {}", destination, e),
    }
}

/// Copy `source` to `destination`. The source is never modified.
pub async fn copy_blob(
    store: &dyn BlobStore,
    source: &str,
    destination: &str,
    policy: &CopyPolicy,
) -> bool {
    match store.exists(source).await {
        Ok(true) => {}
        Ok(false) => {
            warn!("copy source {} does not exist", source);
            return false;
        }
        Err(e) => {
            warn!("copy source {} could not be checked: {}", source, e);
            return false;
        }
    }
    let state = run_copy(store, source, destination, policy).await;
    if state.is_success() {
        info!("copied {} -> {}", source, destination);
    }
    state.is_success()
}

/// Rename = copy to completion, then delete the source.
///
/// If the copy does not succeed the source is left untouched and the
/// destination cleaned up. If the copy succeeds but the source delete fails
/// (after one retry) both blobs exist and `false` is returned.
pub async fn rename_blob(
    store: &dyn BlobStore,
    source: &str,
    destination: &str,
    policy: &CopyPolicy,
) -> bool {
    if !copy_blob(store, source, destination, policy).await {
        return false;
    }

    let mut last_err = None;
    for attempt in 1..=2 {
        match store.delete(source).await {
            Ok(()) => {
                info!("renamed {} -> {}", source, destination);
                return true;
            }
            Err(e) => {
                debug!("rename: delete of source {} failed (attempt {}): {}", source, attempt, e);
                last_err = Some(e);
            }
        }
    }
    if let Some(e) = last_err {
        error!(
            "rename {} -> {}: copy succeeded but source delete failed, both blobs exist: {}",
            source, destination, e
        );
    }
    false
}
