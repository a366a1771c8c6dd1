// tests/common/mod.rs
//
// Shared test fixtures: an in-memory BlobStore with fault injection and
// concurrency instrumentation, plus local file helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use blobbatch::{BlobError, BlobInfo, BlobResult, BlobStore, CopyStatus, SnapshotInfo, UrlPermissions};

/// In-memory store that counts concurrent single-item calls and can be told
/// to fail puts, fail deletes, or report scripted copy statuses.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<BTreeMap<String, Bytes>>,
    copies: Mutex<HashMap<String, (String, CopyStatus)>>,
    put_faults: Mutex<HashMap<String, usize>>,
    delete_faults: Mutex<HashSet<String>>,
    copy_script: Mutex<Option<CopyStatus>>,
    reject_copies: AtomicBool,
    latency: Mutex<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    put_calls: AtomicUsize,
    abort_calls: AtomicUsize,
}

struct InFlight<'a>(&'a MemoryStore);

impl<'a> InFlight<'a> {
    fn enter(store: &'a MemoryStore) -> Self {
        let now = store.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        store.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(store)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        let s = Self::default();
        *s.latency.lock().unwrap() = latency;
        s
    }

    pub fn insert(&self, name: &str, data: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert(name.to_string(), Bytes::copy_from_slice(data));
    }

    pub fn contents(&self, name: &str) -> Option<Bytes> {
        self.blobs.lock().unwrap().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.blobs.lock().unwrap().keys().cloned().collect()
    }

    /// Fail the next `times` puts of `name`.
    pub fn fail_puts(&self, name: &str, times: usize) {
        self.put_faults.lock().unwrap().insert(name.to_string(), times);
    }

    pub fn fail_deletes(&self, name: &str) {
        self.delete_faults.lock().unwrap().insert(name.to_string());
    }

    /// Every copy begun from now on writes a partial destination and reports `status`.
    pub fn script_copies(&self, status: CopyStatus) {
        *self.copy_script.lock().unwrap() = Some(status);
    }

    /// Every `begin_copy` from now on fails before writing anything.
    pub fn reject_copies(&self) {
        self.reject_copies.store(true, Ordering::SeqCst);
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn abort_calls(&self) -> usize {
        self.abort_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, name: &str, data: Bytes) -> BlobResult<()> {
        let _guard = InFlight::enter(self);
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        {
            let mut faults = self.put_faults.lock().unwrap();
            if let Some(left) = faults.get_mut(name) {
                if *left > 0 {
                    *left -= 1;
                    return Err(BlobError::backend(anyhow::anyhow!("injected put failure")));
                }
            }
        }
        self.blobs.lock().unwrap().insert(name.to_string(), data);
        Ok(())
    }

    async fn get(&self, name: &str) -> BlobResult<Bytes> {
        let _guard = InFlight::enter(self);
        self.simulate_latency().await;
        self.contents(name).ok_or_else(|| BlobError::not_found(name))
    }

    async fn delete(&self, name: &str) -> BlobResult<()> {
        let _guard = InFlight::enter(self);
        self.simulate_latency().await;
        if self.delete_faults.lock().unwrap().contains(name) {
            return Err(BlobError::backend(anyhow::anyhow!("injected delete failure")));
        }
        self.copies.lock().unwrap().remove(name);
        match self.blobs.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(BlobError::not_found(name)),
        }
    }

    async fn begin_copy(&self, source: &str, destination: &str) -> BlobResult<String> {
        if self.reject_copies.load(Ordering::SeqCst) {
            return Err(BlobError::backend(anyhow::anyhow!("503 SlowDown")));
        }
        let data = self.contents(source).ok_or_else(|| BlobError::not_found(source))?;
        let scripted = *self.copy_script.lock().unwrap();
        let status = scripted.unwrap_or(CopyStatus::Success);
        let stored = if status == CopyStatus::Success {
            data
        } else {
            // partially materialized destination
            data.slice(0..data.len() / 2)
        };
        self.blobs.lock().unwrap().insert(destination.to_string(), stored);
        let copy_id = format!("copy-{}", destination);
        self.copies
            .lock()
            .unwrap()
            .insert(destination.to_string(), (copy_id.clone(), status));
        Ok(copy_id)
    }

    async fn copy_status(&self, destination: &str) -> BlobResult<CopyStatus> {
        self.copies
            .lock()
            .unwrap()
            .get(destination)
            .map(|(_, s)| *s)
            .ok_or_else(|| BlobError::not_found(destination))
    }

    async fn abort_copy(&self, destination: &str, copy_id: &str) -> BlobResult<()> {
        self.abort_calls.fetch_add(1, Ordering::SeqCst);
        let mut copies = self.copies.lock().unwrap();
        match copies.get_mut(destination) {
            Some((id, status)) if id == copy_id && *status == CopyStatus::Pending => {
                *status = CopyStatus::Aborted;
                Ok(())
            }
            _ => Err(BlobError::invalid("no pending copy")),
        }
    }

    async fn exists(&self, name: &str) -> BlobResult<bool> {
        Ok(self.blobs.lock().unwrap().contains_key(name))
    }

    async fn create_snapshot(&self, name: &str) -> BlobResult<SnapshotInfo> {
        let data = self.contents(name).ok_or_else(|| BlobError::not_found(name))?;
        let snapshot_id = "snap-1".to_string();
        self.insert(&format!("{}@{}", name, snapshot_id), &data);
        Ok(SnapshotInfo {
            blob_name: name.to_string(),
            url: format!("memory://{}?snapshot={}", name, snapshot_id),
            snapshot_id,
        })
    }

    async fn time_limited_url(
        &self,
        name: &str,
        expiry: Duration,
        permissions: UrlPermissions,
    ) -> BlobResult<String> {
        if self.contents(name).is_none() {
            return Err(BlobError::not_found(name));
        }
        Ok(format!(
            "memory://{}?ttl={}&sp={}",
            name,
            expiry.as_secs(),
            permissions.as_letters()
        ))
    }

    async fn list(&self, prefix: Option<&str>) -> BlobResult<Vec<BlobInfo>> {
        Ok(self
            .blobs
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| prefix.map_or(true, |p| k.starts_with(p)))
            .map(|(k, v)| BlobInfo {
                name: k.clone(),
                size: v.len() as u64,
                content_type: None,
                last_modified: None,
                metadata: BTreeMap::new(),
            })
            .collect())
    }
}

/// Write `names` (each containing its own name as content) into `dir`.
pub fn write_files(dir: &Path, names: &[&str]) -> Vec<String> {
    names
        .iter()
        .map(|n| {
            let p: PathBuf = dir.join(n);
            std::fs::write(&p, n.as_bytes()).unwrap();
            p.display().to_string()
        })
        .collect()
}
