// src/engine.rs
//
// Caller-facing API. Validates arguments up front, then drives the batch
// executor, retry controller and copy driver against one BlobStore.
// Everything returned here is plain data, ready for JSON.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::batch::{BatchExecutor, BatchResult};
use crate::config::EngineConfig;
use crate::constants::MAX_URL_EXPIRY_HOURS;
use crate::copy::{copy_blob, rename_blob};
use crate::error::{BlobError, BlobResult};
use crate::local_fs::{self, LocalListing};
use crate::object_store::{BlobInfo, BlobStore, SnapshotInfo, UrlPermissions};
use crate::ops::{self, SourceRef, WorkItem};
use crate::retry::run_with_retries;

/// A time-limited URL plus what it grants.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeLimitedUrl {
    pub blob_name: String,
    pub duration_hours: u32,
    pub permissions: UrlPermissions,
    pub expires_at: DateTime<Utc>,
    pub url: String,
}

/// Outcome of uploading a local directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryUploadResult {
    pub directory: String,
    pub message: String,
    #[serde(flatten)]
    pub batch: BatchResult,
}

pub struct BlobEngine {
    store: Arc<dyn BlobStore>,
    config: EngineConfig,
    http: reqwest::Client,
}

fn require_name(what: &str, value: &str) -> BlobResult<()> {
    if value.trim().is_empty() {
        Err(BlobError::invalid(format!("missing or empty '{}'", what)))
    } else {
        Ok(())
    }
}

/// Reject empty lists and empty entries; drop repeated entries, keeping the first.
fn unique_items(what: &str, values: &[String]) -> BlobResult<Vec<WorkItem>> {
    if values.is_empty() {
        return Err(BlobError::invalid(format!("'{}' must be a non-empty list", what)));
    }
    let mut seen = HashSet::new();
    let mut items = Vec::with_capacity(values.len());
    for v in values {
        require_name(what, v)?;
        if seen.insert(v.as_str()) {
            items.push(WorkItem::new(v.clone()));
        } else {
            debug!("ignoring repeated entry {} in '{}'", v, what);
        }
    }
    Ok(items)
}

/// Upload items for `sources`, each with its resolved blob name as destination.
/// Two distinct sources landing on the same blob name are rejected.
fn upload_items_for(sources: &[String]) -> BlobResult<Vec<WorkItem>> {
    let items = unique_items("sources", sources)?;
    let mut owners: HashMap<String, String> = HashMap::with_capacity(items.len());
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let name = SourceRef::parse(&item.source).blob_name()?;
        if let Some(first) = owners.get(&name) {
            return Err(BlobError::invalid(format!(
                "sources '{}' and '{}' both upload to blob '{}'",
                first, item.source, name
            )));
        }
        owners.insert(name.clone(), item.source.clone());
        out.push(WorkItem::with_destination(item.source, name));
    }
    Ok(out)
}

impl BlobEngine {
    pub fn new(store: Arc<dyn BlobStore>, config: EngineConfig) -> Self {
        Self::with_http_client(store, config, reqwest::Client::new())
    }

    /// Like `new`, with the HTTP client used to fetch URL sources.
    pub fn with_http_client(store: Arc<dyn BlobStore>, config: EngineConfig, http: reqwest::Client) -> Self {
        Self { store, config, http }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn executor(&self) -> BatchExecutor {
        BatchExecutor::new(self.config.concurrency, self.config.operation_timeout)
    }

    /// Upload one local file or URL. `Ok(false)` means the remote side failed.
    pub async fn upload_one(&self, source: &str) -> BlobResult<bool> {
        require_name("source", source)?;
        match ops::upload_one(self.store.as_ref(), &self.http, source).await {
            Ok(name) => {
                info!("uploaded {} as {}", source, name);
                Ok(true)
            }
            Err(e) if e.is_invalid_argument() => Err(e),
            Err(e) => {
                warn!("upload of {} failed: {}", source, e);
                Ok(false)
            }
        }
    }

    /// Upload many sources with up to `retry_passes` extra passes over failures.
    /// `succeeded` holds blob names, `failed` the original source references.
    /// Sources that resolve to the same blob name are an `InvalidArgument`.
    pub async fn upload_many(&self, sources: &[String], retry_passes: usize) -> BlobResult<BatchResult> {
        let items = upload_items_for(sources)?;
        Ok(self.upload_items(items, retry_passes).await)
    }

    async fn upload_items(&self, items: Vec<WorkItem>, retry_passes: usize) -> BatchResult {
        let store = self.store.clone();
        let http = self.http.clone();
        run_with_retries(&self.executor(), "upload", items, retry_passes, move |item: WorkItem| {
            let store = store.clone();
            let http = http.clone();
            async move {
                ops::upload_as(store.as_ref(), &http, &item.source, item.destination.as_deref()).await
            }
        })
        .await
    }

    /// Download blobs into `destination_dir` (created if missing). No retries.
    pub async fn download_many(&self, names: &[String], destination_dir: &str) -> BlobResult<BatchResult> {
        let items = unique_items("names", names)?;
        require_name("destination_dir", destination_dir)?;
        let dir = local_fs::expand_home(destination_dir);
        fs::create_dir_all(&dir).await?;

        let store = self.store.clone();
        let outcomes = self
            .executor()
            .run("download", items, move |item: WorkItem| {
                let store = store.clone();
                let dir: PathBuf = dir.clone();
                async move {
                    ops::download_one(store.as_ref(), &item.source, &dir).await?;
                    Ok(item.source)
                }
            })
            .await;
        Ok(BatchResult::from_outcomes(outcomes))
    }

    /// Delete blobs. A blob that does not exist counts as failed. No retries.
    pub async fn delete_many(&self, names: &[String]) -> BlobResult<BatchResult> {
        let items = unique_items("names", names)?;
        let store = self.store.clone();
        let outcomes = self
            .executor()
            .run("delete", items, move |item: WorkItem| {
                let store = store.clone();
                async move {
                    ops::delete_one(store.as_ref(), &item.source).await?;
                    Ok(item.source)
                }
            })
            .await;
        Ok(BatchResult::from_outcomes(outcomes))
    }

    fn check_pair(source: &str, destination: &str) -> BlobResult<()> {
        require_name("source", source)?;
        require_name("destination", destination)?;
        if source == destination {
            return Err(BlobError::invalid("source and destination are the same blob"));
        }
        Ok(())
    }

    /// Server-side copy, polled to completion. The failure sub-reason is only logged.
    pub async fn copy(&self, source: &str, destination: &str) -> BlobResult<bool> {
        Self::check_pair(source, destination)?;
        Ok(copy_blob(self.store.as_ref(), source, destination, &self.config.copy_policy()).await)
    }

    /// Copy then delete the source. Not atomic; see `copy::rename_blob`.
    pub async fn rename(&self, source: &str, destination: &str) -> BlobResult<bool> {
        Self::check_pair(source, destination)?;
        Ok(rename_blob(self.store.as_ref(), source, destination, &self.config.copy_policy()).await)
    }

    /// List blobs by prefix, optionally filtered by a name regex.
    /// `max_results == 0` means no limit.
    pub async fn list_blobs(
        &self,
        prefix: Option<&str>,
        regex: Option<&str>,
        max_results: usize,
    ) -> BlobResult<Vec<BlobInfo>> {
        let re = match regex.filter(|r| !r.is_empty()) {
            Some(r) => Some(
                Regex::new(r).map_err(|e| BlobError::invalid(format!("bad regex '{}': {}", r, e)))?,
            ),
            None => None,
        };
        let mut blobs = self.store.list(prefix.filter(|p| !p.is_empty())).await?;
        if let Some(re) = re {
            blobs.retain(|b| re.is_match(&b.name));
        }
        if max_results > 0 {
            blobs.truncate(max_results);
        }
        Ok(blobs)
    }

    pub async fn create_snapshot(&self, name: &str) -> BlobResult<SnapshotInfo> {
        require_name("blob_name", name)?;
        let snap = self.store.create_snapshot(name).await?;
        info!("snapshot {} of {}", snap.snapshot_id, name);
        Ok(snap)
    }

    /// Issue a URL valid for `duration_hours` (1..=168). `None` uses the configured default.
    pub async fn generate_url(
        &self,
        name: &str,
        duration_hours: Option<u32>,
        permissions: UrlPermissions,
    ) -> BlobResult<TimeLimitedUrl> {
        require_name("blob_name", name)?;
        let hours = duration_hours.unwrap_or(self.config.url_expiry_default_hours);
        if hours == 0 || hours > MAX_URL_EXPIRY_HOURS {
            return Err(BlobError::invalid(format!(
                "duration must be between 1 and {} hours, got {}",
                MAX_URL_EXPIRY_HOURS, hours
            )));
        }
        if permissions.is_empty() {
            return Err(BlobError::invalid("at least one permission must be granted"));
        }
        let expiry = Duration::from_secs(u64::from(hours) * 3600);
        let url = self.store.time_limited_url(name, expiry, permissions).await?;
        Ok(TimeLimitedUrl {
            blob_name: name.to_string(),
            duration_hours: hours,
            permissions,
            expires_at: Utc::now() + chrono::Duration::hours(i64::from(hours)),
            url,
        })
    }

    /// Upload every matching file under `directory`, with the configured retry passes.
    pub async fn upload_directory(
        &self,
        directory: &str,
        pattern: Option<&str>,
        recursive: bool,
        blob_prefix: Option<&str>,
    ) -> BlobResult<DirectoryUploadResult> {
        let files = local_fs::collect_upload_files(directory, pattern, recursive, blob_prefix).await?;
        if files.is_empty() {
            return Ok(DirectoryUploadResult {
                directory: directory.to_string(),
                message: format!("No matching files found in {}", directory),
                batch: BatchResult::default(),
            });
        }
        let items = files
            .into_iter()
            .map(|f| WorkItem::with_destination(f.path.display().to_string(), f.blob_name))
            .collect();
        let batch = self.upload_items(items, self.config.retry_passes).await;
        Ok(DirectoryUploadResult {
            directory: directory.to_string(),
            message: batch.message("uploaded"),
            batch,
        })
    }

    pub async fn list_local_files(
        &self,
        directory: &str,
        pattern: Option<&str>,
        include_directories: bool,
    ) -> BlobResult<LocalListing> {
        local_fs::list_local_files(directory, pattern, include_directories).await
    }
}
