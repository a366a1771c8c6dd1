// src/file_store.rs
//
// FileSystemBlobStore implementation for POSIX file I/O
// This provides the same BlobStore interface for a local directory tree

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, trace};

use crate::constants::SNAPSHOT_DIR;
use crate::error::{BlobError, BlobResult};
use crate::object_store::{
    BlobInfo, BlobStore, CopyStatus, SnapshotInfo, UrlPermissions, guess_content_type,
};

/// Copy bookkeeping for one destination.
#[derive(Debug, Clone)]
struct CopyRecord {
    copy_id: String,
    status: CopyStatus,
}

/// Filesystem adapter that implements BlobStore on a root directory.
///
/// Name mapping:
/// - `report.pdf`        -> `<root>/report.pdf`
/// - `2024/q1/report.pdf` -> `<root>/2024/q1/report.pdf`
///
/// The local filesystem has no server-side async copy; `begin_copy` copies
/// the bytes before returning and the copy is reported as `Success` from then on.
pub struct FileSystemBlobStore {
    root: PathBuf,
    copies: Mutex<HashMap<String, CopyRecord>>,
    next_copy: AtomicU64,
}

impl FileSystemBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            copies: Mutex::new(HashMap::new()),
            next_copy: AtomicU64::new(1),
        }
    }

    /// Build from `file:///absolute/root` or `file://./relative/root`.
    pub fn from_uri(uri: &str) -> BlobResult<Self> {
        let path = uri
            .strip_prefix("file://")
            .ok_or_else(|| BlobError::invalid(format!("expected file:// URI, got '{}'", uri)))?;
        if path.is_empty() {
            return Err(BlobError::invalid("file:// URI has an empty root path"));
        }
        Ok(Self::new(path))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a blob name onto a path under the root, refusing anything that escapes it.
    fn resolve(&self, name: &str) -> BlobResult<PathBuf> {
        if name.is_empty() {
            return Err(BlobError::invalid("blob name is empty"));
        }
        let rel = Path::new(name);
        for comp in rel.components() {
            match comp {
                Component::Normal(_) => {}
                Component::CurDir => {}
                _ => {
                    return Err(BlobError::invalid(format!(
                        "blob name '{}' must be a relative path without '..'",
                        name
                    )));
                }
            }
        }
        if rel.starts_with(SNAPSHOT_DIR) {
            return Err(BlobError::invalid(format!("blob name '{}' is reserved", name)));
        }
        Ok(self.root.join(rel))
    }

    fn not_found_or(name: &str, e: std::io::Error) -> BlobError {
        if e.kind() == ErrorKind::NotFound {
            BlobError::not_found(name)
        } else {
            BlobError::Io(e)
        }
    }

    fn record_copy(&self, destination: &str, status: CopyStatus) -> String {
        let seq = self.next_copy.fetch_add(1, Ordering::Relaxed);
        let copy_id = format!("copy-{:08}", seq);
        if let Ok(mut copies) = self.copies.lock() {
            copies.insert(
                destination.to_string(),
                CopyRecord { copy_id: copy_id.clone(), status },
            );
        }
        copy_id
    }

    fn forget_copy(&self, destination: &str) {
        if let Ok(mut copies) = self.copies.lock() {
            copies.remove(destination);
        }
    }

    fn file_url(path: &Path) -> String {
        let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        format!("file://{}", abs.display())
    }

    async fn ensure_parent(path: &Path) -> BlobResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FileSystemBlobStore {
    fn backend_name(&self) -> &'static str {
        "file"
    }

    async fn put(&self, name: &str, data: Bytes) -> BlobResult<()> {
        let path = self.resolve(name)?;
        Self::ensure_parent(&path).await?;
        trace!("file put {} ({} bytes)", path.display(), data.len());
        fs::write(&path, &data).await?;
        Ok(())
    }

    async fn get(&self, name: &str) -> BlobResult<Bytes> {
        let path = self.resolve(name)?;
        let data = fs::read(&path).await.map_err(|e| Self::not_found_or(name, e))?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, name: &str) -> BlobResult<()> {
        let path = self.resolve(name)?;
        fs::remove_file(&path).await.map_err(|e| Self::not_found_or(name, e))?;
        self.forget_copy(name);
        debug!("file delete {}", path.display());
        Ok(())
    }

    async fn begin_copy(&self, source: &str, destination: &str) -> BlobResult<String> {
        let src = self.resolve(source)?;
        let dst = self.resolve(destination)?;
        Self::ensure_parent(&dst).await?;

        // Copy beside the destination and rename over it, so a failed copy
        // never leaves a truncated blob where an existing one used to be.
        let seq = self.next_copy.fetch_add(1, Ordering::Relaxed);
        let file_name = dst
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let part = dst.with_file_name(format!(".{}.{}.part", file_name, seq));
        let copied = match fs::copy(&src, &part).await {
            Ok(bytes) => fs::rename(&part, &dst).await.map(|_| bytes),
            Err(e) => Err(e),
        };
        match copied {
            Ok(bytes) => {
                debug!("file copy {} -> {} ({} bytes)", src.display(), dst.display(), bytes);
                Ok(self.record_copy(destination, CopyStatus::Success))
            }
            Err(e) => {
                let _ = fs::remove_file(&part).await;
                Err(Self::not_found_or(source, e))
            }
        }
    }

    async fn copy_status(&self, destination: &str) -> BlobResult<CopyStatus> {
        let recorded = self
            .copies
            .lock()
            .ok()
            .and_then(|copies| copies.get(destination).map(|r| r.status));
        if let Some(status) = recorded {
            return Ok(status);
        }
        // A blob with no copy history is simply complete.
        if self.exists(destination).await? {
            Ok(CopyStatus::Success)
        } else {
            Err(BlobError::not_found(destination))
        }
    }

    async fn abort_copy(&self, destination: &str, copy_id: &str) -> BlobResult<()> {
        let mut copies = self
            .copies
            .lock()
            .map_err(|_| BlobError::backend(anyhow::anyhow!("copy table lock poisoned")))?;
        match copies.get_mut(destination) {
            Some(rec) if rec.copy_id == copy_id && rec.status == CopyStatus::Pending => {
                rec.status = CopyStatus::Aborted;
                Ok(())
            }
            Some(rec) if rec.copy_id == copy_id => Err(BlobError::invalid(format!(
                "copy {} on '{}' is not pending ({:?})",
                copy_id, destination, rec.status
            ))),
            _ => Err(BlobError::invalid(format!(
                "no copy {} recorded for '{}'",
                copy_id, destination
            ))),
        }
    }

    async fn exists(&self, name: &str) -> BlobResult<bool> {
        let path = self.resolve(name)?;
        Ok(fs::try_exists(&path).await? && fs::metadata(&path).await?.is_file())
    }

    async fn create_snapshot(&self, name: &str) -> BlobResult<SnapshotInfo> {
        let src = self.resolve(name)?;
        let snapshot_id = Utc::now().format("%Y%m%dT%H%M%S%.6fZ").to_string();
        let dst = self.root.join(SNAPSHOT_DIR).join(name).join(&snapshot_id);
        Self::ensure_parent(&dst).await?;
        fs::copy(&src, &dst).await.map_err(|e| Self::not_found_or(name, e))?;
        debug!("file snapshot {} -> {}", src.display(), dst.display());
        Ok(SnapshotInfo {
            blob_name: name.to_string(),
            url: Self::file_url(&dst),
            snapshot_id,
        })
    }

    async fn time_limited_url(
        &self,
        name: &str,
        expiry: Duration,
        permissions: UrlPermissions,
    ) -> BlobResult<String> {
        if !self.exists(name).await? {
            return Err(BlobError::not_found(name));
        }
        let path = self.resolve(name)?;
        let ttl = chrono::Duration::from_std(expiry)
            .map_err(|e| BlobError::invalid(format!("expiry out of range: {}", e)))?;
        let expires = (Utc::now() + ttl).to_rfc3339_opts(SecondsFormat::Secs, true);
        Ok(format!(
            "{}?se={}&sp={}",
            Self::file_url(&path),
            expires,
            permissions.as_letters()
        ))
    }

    async fn list(&self, prefix: Option<&str>) -> BlobResult<Vec<BlobInfo>> {
        let mut out = Vec::new();
        if !fs::try_exists(&self.root).await? {
            return Ok(out);
        }
        let mut stack = vec![self.root.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                let meta = entry.metadata().await?;
                if meta.is_dir() {
                    if dir == self.root && entry.file_name() == SNAPSHOT_DIR {
                        continue;
                    }
                    stack.push(path);
                    continue;
                }
                let rel = match path.strip_prefix(&self.root) {
                    Ok(rel) => rel,
                    Err(_) => continue,
                };
                let name = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                if let Some(p) = prefix {
                    if !name.starts_with(p) {
                        continue;
                    }
                }
                out.push(BlobInfo {
                    content_type: guess_content_type(&name).map(str::to_string),
                    last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
                    size: meta.len(),
                    metadata: BTreeMap::new(),
                    name,
                });
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_rejects_escapes() {
        let store = FileSystemBlobStore::new("/tmp/root");
        assert!(store.resolve("../etc/passwd").is_err());
        assert!(store.resolve("/abs").is_err());
        assert!(store.resolve("").is_err());
        assert!(store.resolve(".snapshots/x").is_err());
        assert_eq!(
            store.resolve("a/b.txt").unwrap(),
            PathBuf::from("/tmp/root/a/b.txt")
        );
    }

    #[test]
    fn from_uri_strips_scheme() {
        let store = FileSystemBlobStore::from_uri("file:///srv/blobs").unwrap();
        assert_eq!(store.root(), Path::new("/srv/blobs"));
        assert!(FileSystemBlobStore::from_uri("file://").is_err());
        assert!(FileSystemBlobStore::from_uri("s3://bucket").is_err());
    }
}
