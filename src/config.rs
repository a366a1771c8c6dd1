// src/config.rs
//
// Runtime configuration. Built once at startup and passed by reference;
// nothing here is global.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CONCURRENCY, DEFAULT_OPERATION_TIMEOUT_SECS, DEFAULT_RETRY_PASSES,
    DEFAULT_URL_EXPIRY_HOURS, ENV_CONCURRENCY, ENV_COPY_TIMEOUT, ENV_OPERATION_TIMEOUT,
    ENV_RETRY_PASSES, MAX_CONCURRENCY,
};
use crate::copy::CopyPolicy;
use crate::error::{BlobError, BlobResult};

/// Knobs for the batch engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Max single-item operations in flight per batch.
    pub concurrency: usize,
    /// How long the harvester waits for any one item.
    pub operation_timeout: Duration,
    /// Deadline for one async copy to reach a terminal state.
    pub copy_timeout: Duration,
    /// Additional upload passes over the failed subset.
    pub retry_passes: usize,
    pub url_expiry_default_hours: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            operation_timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
            copy_timeout: Duration::from_secs(DEFAULT_OPERATION_TIMEOUT_SECS),
            retry_passes: DEFAULT_RETRY_PASSES,
            url_expiry_default_hours: DEFAULT_URL_EXPIRY_HOURS,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `BLOBBATCH_*` variables (after loading `.env`).
    pub fn from_env() -> BlobResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> BlobResult<Self> {
        let mut cfg = Self::default();
        if let Some(v) = lookup(ENV_CONCURRENCY) {
            cfg.concurrency = parse_number(ENV_CONCURRENCY, &v)?;
        }
        if let Some(v) = lookup(ENV_OPERATION_TIMEOUT) {
            cfg.operation_timeout = parse_duration(ENV_OPERATION_TIMEOUT, &v)?;
        }
        if let Some(v) = lookup(ENV_COPY_TIMEOUT) {
            cfg.copy_timeout = parse_duration(ENV_COPY_TIMEOUT, &v)?;
        }
        if let Some(v) = lookup(ENV_RETRY_PASSES) {
            cfg.retry_passes = parse_number(ENV_RETRY_PASSES, &v)?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> BlobResult<()> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(BlobError::invalid(format!(
                "concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENCY, self.concurrency
            )));
        }
        if self.operation_timeout.is_zero() || self.copy_timeout.is_zero() {
            return Err(BlobError::invalid("timeouts must be non-zero"));
        }
        Ok(())
    }

    pub fn copy_policy(&self) -> CopyPolicy {
        CopyPolicy::from_timeout(self.copy_timeout)
    }
}

/// Which store to talk to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// `file:///root` or `s3://bucket/prefix`
    pub uri: String,
}

impl StoreConfig {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> BlobResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| BlobError::invalid(format!("{}='{}': {}", key, value, e)))
}

/// Accepts humantime strings (`300s`, `5m`) or a bare number of seconds.
fn parse_duration(key: &str, value: &str) -> BlobResult<Duration> {
    let v = value.trim();
    if let Ok(secs) = v.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(v).map_err(|e| BlobError::invalid(format!("{}='{}': {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_overrides() {
        let cfg = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.operation_timeout, Duration::from_secs(300));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            (ENV_CONCURRENCY, "4"),
            (ENV_OPERATION_TIMEOUT, "90s"),
            (ENV_COPY_TIMEOUT, "120"),
            (ENV_RETRY_PASSES, "0"),
        ]))
        .unwrap();
        assert_eq!(cfg.concurrency, 4);
        assert_eq!(cfg.operation_timeout, Duration::from_secs(90));
        assert_eq!(cfg.copy_timeout, Duration::from_secs(120));
        assert_eq!(cfg.retry_passes, 0);
        assert_eq!(cfg.copy_policy().poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(EngineConfig::from_lookup(lookup(&[(ENV_CONCURRENCY, "many")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[(ENV_CONCURRENCY, "0")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[(ENV_COPY_TIMEOUT, "soon")])).is_err());
    }
}
