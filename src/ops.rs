// src/ops.rs
//
// Single-item operations: one remote call each, no retries.
// Errors come back as `BlobError`; the batch layer turns them into outcomes.

use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

use crate::constants::STAGING_FILE_PREFIX;
use crate::error::{BlobError, BlobResult};
use crate::object_store::BlobStore;

/// One unit of work submitted to a batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WorkItem {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
}

impl WorkItem {
    pub fn new(source: impl Into<String>) -> Self {
        Self { source: source.into(), destination: None }
    }

    pub fn with_destination(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self { source: source.into(), destination: Some(destination.into()) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// Result of one WorkItem for one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub item: WorkItem,
    pub status: OutcomeStatus,
    /// Resolved key on success, e.g. the blob name an upload landed at.
    pub result_key: Option<String>,
    pub error_detail: Option<String>,
}

impl OperationOutcome {
    pub fn success(item: WorkItem, result_key: impl Into<String>) -> Self {
        Self {
            item,
            status: OutcomeStatus::Success,
            result_key: Some(result_key.into()),
            error_detail: None,
        }
    }

    pub fn failure(item: WorkItem, detail: impl Into<String>) -> Self {
        Self {
            item,
            status: OutcomeStatus::Failure,
            result_key: None,
            error_detail: Some(detail.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Where an upload's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRef {
    Url(String),
    Local(PathBuf),
}

impl SourceRef {
    pub fn parse(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            SourceRef::Url(source.to_string())
        } else {
            SourceRef::Local(PathBuf::from(source))
        }
    }

    /// Blob name the source uploads to: the file name, or the URL's last path segment.
    pub fn blob_name(&self) -> BlobResult<String> {
        match self {
            SourceRef::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| BlobError::invalid(format!("no file name in {:?}", path))),
            SourceRef::Url(url) => {
                let parsed = reqwest::Url::parse(url)
                    .map_err(|e| BlobError::invalid(format!("bad URL '{}': {}", url, e)))?;
                parsed
                    .path_segments()
                    .and_then(|segs| segs.filter(|s| !s.is_empty()).last())
                    .map(str::to_string)
                    .ok_or_else(|| BlobError::invalid(format!("no file name in URL '{}'", url)))
            }
        }
    }
}

/// Download `url` into a fresh staging file. The file is removed when the
/// returned handle drops, whichever path the caller leaves by.
async fn stage_url(http: &reqwest::Client, url: &str) -> BlobResult<tempfile::NamedTempFile> {
    let staging = tempfile::Builder::new()
        .prefix(STAGING_FILE_PREFIX)
        .suffix(".tmp")
        .tempfile()?;

    let staging_err = |reason: String| BlobError::Staging {
        source_url: url.to_string(),
        reason,
    };
    let mut resp = http
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| staging_err(e.to_string()))?;

    let mut file = fs::File::create(staging.path()).await?;
    let mut total = 0usize;
    while let Some(chunk) = resp.chunk().await.map_err(|e| staging_err(e.to_string()))? {
        total += chunk.len();
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    trace!("staged {} ({} bytes) at {}", url, total, staging.path().display());
    Ok(staging)
}

/// Upload one local file or URL. Returns the blob name it was stored under.
pub async fn upload_one(
    store: &dyn BlobStore,
    http: &reqwest::Client,
    source: &str,
) -> BlobResult<String> {
    upload_as(store, http, source, None).await
}

/// Upload one source under `name`, or under the source's own file name when `None`.
pub async fn upload_as(
    store: &dyn BlobStore,
    http: &reqwest::Client,
    source: &str,
    name: Option<&str>,
) -> BlobResult<String> {
    if source.is_empty() {
        return Err(BlobError::invalid("upload source is empty"));
    }
    let source_ref = SourceRef::parse(source);
    let blob_name = match name {
        Some(n) => n.to_string(),
        None => source_ref.blob_name()?,
    };

    let data = match &source_ref {
        SourceRef::Local(path) => fs::read(path).await?,
        SourceRef::Url(url) => {
            let staging = stage_url(http, url).await?;
            fs::read(staging.path()).await?
        }
    };
    debug!("uploading {} -> {} ({} bytes)", source, blob_name, data.len());
    store.put(&blob_name, Bytes::from(data)).await?;
    Ok(blob_name)
}

/// Resolve a download target: a directory becomes `dir/<blob file name>`.
pub async fn resolve_download_path(name: &str, destination: &Path) -> PathBuf {
    let is_dir = fs::metadata(destination)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false);
    if is_dir {
        let file_name = name.rsplit('/').next().unwrap_or(name);
        destination.join(file_name)
    } else {
        destination.to_path_buf()
    }
}

/// Download one blob to `destination` (a file path or an existing directory).
pub async fn download_one(
    store: &dyn BlobStore,
    name: &str,
    destination: &Path,
) -> BlobResult<PathBuf> {
    if name.is_empty() {
        return Err(BlobError::invalid("blob name is empty"));
    }
    let target = resolve_download_path(name, destination).await;
    let data = store.get(name).await?;
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    fs::write(&target, &data).await?;
    debug!("downloaded {} -> {} ({} bytes)", name, target.display(), data.len());
    Ok(target)
}

/// Delete one blob. A missing blob is a failure, not a silent success.
pub async fn delete_one(store: &dyn BlobStore, name: &str) -> BlobResult<()> {
    if name.is_empty() {
        return Err(BlobError::invalid("blob name is empty"));
    }
    store.delete(name).await?;
    debug!("deleted {}", name);
    Ok(())
}
