// src/object_store.rs
//
// Pluggable blob-store abstraction with consistent URI schemes.
// Supported schemes: file://, s3://
// Every backend exposes the same single-item operations; batching, retries and
// copy polling live above this layer and never see backend types.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{BlobError, BlobResult};
use crate::file_store::FileSystemBlobStore;
use crate::s3_store::S3BlobStore;

/// Status of a server-side copy, as reported by the store for the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CopyStatus {
    Pending,
    Success,
    Failed,
    Aborted,
}

/// Provider-neutral listing entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobInfo {
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Result of a point-in-time snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    pub blob_name: String,
    pub snapshot_id: String,
    pub url: String,
}

/// Permissions carried by a time-limited URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UrlPermissions {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
}

impl Default for UrlPermissions {
    fn default() -> Self {
        Self { read: true, write: false, delete: false }
    }
}

impl UrlPermissions {
    pub fn is_empty(&self) -> bool {
        !(self.read || self.write || self.delete)
    }

    /// Compact permission string in `rwd` order, e.g. `"rd"`.
    pub fn as_letters(&self) -> String {
        let mut s = String::with_capacity(3);
        if self.read { s.push('r'); }
        if self.write { s.push('w'); }
        if self.delete { s.push('d'); }
        s
    }
}

/// A minimal scheme enum so we can route URIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    File,
    S3,
    Unknown,
}

/// Best-effort scheme inference from a URI.
pub fn infer_scheme(uri: &str) -> Scheme {
    if uri.starts_with("file://") { Scheme::File }
    else if uri.starts_with("s3://") { Scheme::S3 }
    else { Scheme::Unknown }
}

/// BlobStore trait for pluggable storage backends.
///
/// Names are relative to the store's container (bucket/prefix or root
/// directory). Each method performs one remote call; none of them retries.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short backend label used in logs and errors.
    fn backend_name(&self) -> &'static str;

    /// Upload a whole blob, overwriting any existing one.
    async fn put(&self, name: &str, data: Bytes) -> BlobResult<()>;

    /// Read a whole blob into memory.
    async fn get(&self, name: &str) -> BlobResult<Bytes>;

    /// Delete a blob. Deleting a missing blob is `NotFound`.
    async fn delete(&self, name: &str) -> BlobResult<()>;

    /// Start a server-side copy. Completion is observed through `copy_status`.
    /// Returns an opaque copy id for `abort_copy`.
    async fn begin_copy(&self, source: &str, destination: &str) -> BlobResult<String>;

    /// Copy status of the destination blob.
    async fn copy_status(&self, destination: &str) -> BlobResult<CopyStatus>;

    /// Abort a pending copy.
    async fn abort_copy(&self, destination: &str, copy_id: &str) -> BlobResult<()>;

    async fn exists(&self, name: &str) -> BlobResult<bool>;

    async fn create_snapshot(&self, name: &str) -> BlobResult<SnapshotInfo>;

    /// Issue a URL granting `permissions` on `name` for `expiry`.
    async fn time_limited_url(
        &self,
        name: &str,
        expiry: Duration,
        permissions: UrlPermissions,
    ) -> BlobResult<String>;

    /// List blobs, optionally restricted to names starting with `prefix`.
    async fn list(&self, prefix: Option<&str>) -> BlobResult<Vec<BlobInfo>>;
}

/// Factory: pick a backend from the URI scheme.
///
/// - `file:///srv/blobs` -> [`FileSystemBlobStore`] rooted at `/srv/blobs`
/// - `s3://bucket/prefix` -> [`S3BlobStore`] using the ambient AWS configuration
pub async fn store_for_uri(uri: &str) -> BlobResult<Arc<dyn BlobStore>> {
    match infer_scheme(uri) {
        Scheme::File => Ok(Arc::new(FileSystemBlobStore::from_uri(uri)?)),
        Scheme::S3 => Ok(Arc::new(S3BlobStore::from_uri(uri).await?)),
        Scheme::Unknown => Err(BlobError::invalid(format!(
            "unsupported store URI '{}': expected file:// or s3://",
            uri
        ))),
    }
}

/// Guess a MIME type from a blob name's extension.
pub fn guess_content_type(name: &str) -> Option<&'static str> {
    let ext = name.rsplit_once('.')?.1.to_ascii_lowercase();
    let ct = match ext.as_str() {
        "pdf" => "application/pdf",
        "json" => "application/json",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => return None,
    };
    Some(ct)
}
