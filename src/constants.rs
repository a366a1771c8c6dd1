// src/constants.rs
//
// Centralized constants for blobbatch to avoid hardcoded values throughout the codebase

use std::time::Duration;

/// Default number of single-item operations in flight per batch
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Hard ceiling on the worker pool size, regardless of configuration
pub const MAX_CONCURRENCY: usize = 256;

/// Default per-item harvest wait and copy deadline (seconds)
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// Default number of additional upload passes over the failed subset
pub const DEFAULT_RETRY_PASSES: usize = 2;

/// Upper bound on the async-copy poll interval
pub const MAX_COPY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The poll interval is `timeout / COPY_POLL_DIVISOR`, capped at `MAX_COPY_POLL_INTERVAL`
pub const COPY_POLL_DIVISOR: u32 = 10;

/// Default lifetime of a time-limited URL (hours)
pub const DEFAULT_URL_EXPIRY_HOURS: u32 = 24;

/// Longest lifetime a time-limited URL may be issued for (7 days)
pub const MAX_URL_EXPIRY_HOURS: u32 = 168;

/// Directory (relative to the file store root) holding point-in-time snapshots
pub const SNAPSHOT_DIR: &str = ".snapshots";

/// Prefix for temporary files created while staging URL sources
pub const STAGING_FILE_PREFIX: &str = "blobbatch-stage-";

// ============================================================================
// Environment variables
// ============================================================================

pub const ENV_CONCURRENCY: &str = "BLOBBATCH_CONCURRENCY";
pub const ENV_OPERATION_TIMEOUT: &str = "BLOBBATCH_OPERATION_TIMEOUT";
pub const ENV_COPY_TIMEOUT: &str = "BLOBBATCH_COPY_TIMEOUT";
pub const ENV_RETRY_PASSES: &str = "BLOBBATCH_RETRY_PASSES";
pub const ENV_STORE_URI: &str = "BLOBBATCH_STORE";

/// Default S3 region when neither the environment nor the profile provides one
pub const DEFAULT_REGION: &str = "us-east-1";
