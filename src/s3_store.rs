// src/s3_store.rs
//
// S3 adapter for the BlobStore trait, built on the async AWS Rust SDK.
//
// CopyObject completes server-side before it returns, so the copy status of a
// destination is derived from HEAD: present means Success, absent while a
// copy is outstanding means Pending.

use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{Client, config::Region};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::constants::DEFAULT_REGION;
use crate::error::{BlobError, BlobResult};
use crate::object_store::{
    BlobInfo, BlobStore, CopyStatus, SnapshotInfo, UrlPermissions, guess_content_type,
};

/// Split `s3://bucket/prefix/` into `("bucket", "prefix/")`.
pub fn parse_s3_uri(uri: &str) -> BlobResult<(String, String)> {
    let rest = uri
        .strip_prefix("s3://")
        .ok_or_else(|| BlobError::invalid(format!("URI must start with s3://: '{}'", uri)))?;
    let (bucket, prefix) = match rest.split_once('/') {
        Some((b, p)) => (b, p),
        None => (rest, ""),
    };
    if bucket.is_empty() {
        return Err(BlobError::invalid(format!("missing bucket in '{}'", uri)));
    }
    let mut prefix = prefix.to_string();
    if !prefix.is_empty() && !prefix.ends_with('/') {
        prefix.push('/');
    }
    Ok((bucket.to_string(), prefix))
}

/// Bytes left as-is in an `x-amz-copy-source` key: unreserved characters and `/`.
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a key for the `x-amz-copy-source` header, keeping `/`.
fn encode_copy_source(key: &str) -> String {
    utf8_percent_encode(key, COPY_SOURCE).to_string()
}

/// S3 blob store bound to one bucket and key prefix.
pub struct S3BlobStore {
    client: Client,
    bucket: String,
    prefix: String,
    /// destination name -> copy id, for copies begun but not yet observed complete
    pending: Mutex<HashMap<String, String>>,
}

impl S3BlobStore {
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Build a client from the ambient AWS environment (`AWS_REGION`,
    /// `AWS_ENDPOINT_URL`, credentials chain) and bind it to `s3://bucket/prefix`.
    pub async fn from_uri(uri: &str) -> BlobResult<Self> {
        let (bucket, prefix) = parse_s3_uri(uri)?;

        let region = RegionProviderChain::first_try(env::var("AWS_REGION").ok().map(Region::new))
            .or_default_provider()
            .or_else(Region::new(DEFAULT_REGION));

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);
        if let Ok(endpoint) = env::var("AWS_ENDPOINT_URL") {
            if !endpoint.is_empty() {
                loader = loader.endpoint_url(endpoint);
            }
        }
        let cfg = loader.load().await;

        // Path-style addressing keeps S3-compatible services (MinIO, Ceph) working.
        let s3_config = aws_sdk_s3::config::Builder::from(&cfg)
            .force_path_style(true)
            .build();

        debug!("Created S3 blob store for bucket={} prefix={}", bucket, prefix);
        Ok(Self::new(Client::from_conf(s3_config), bucket, prefix))
    }

    fn key(&self, name: &str) -> BlobResult<String> {
        if name.is_empty() {
            return Err(BlobError::invalid("blob name is empty"));
        }
        Ok(format!("{}{}", self.prefix, name))
    }

    fn name_from_key<'a>(&self, key: &'a str) -> &'a str {
        key.strip_prefix(self.prefix.as_str()).unwrap_or(key)
    }

    fn set_pending(&self, destination: &str, copy_id: Option<String>) {
        if let Ok(mut pending) = self.pending.lock() {
            match copy_id {
                Some(id) => {
                    pending.insert(destination.to_string(), id);
                }
                None => {
                    pending.remove(destination);
                }
            }
        }
    }

    fn is_pending(&self, destination: &str) -> bool {
        self.pending
            .lock()
            .map(|p| p.contains_key(destination))
            .unwrap_or(false)
    }

    async fn head_version(&self, name: &str) -> BlobResult<Option<String>> {
        let key = self.key(name)?;
        match self.client.head_object().bucket(&self.bucket).key(&key).send().await {
            Ok(out) => Ok(out.version_id().map(str::to_string)),
            Err(e) if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) => {
                Err(BlobError::not_found(name))
            }
            Err(e) => Err(BlobError::backend(e)),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    fn backend_name(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, name: &str, data: Bytes) -> BlobResult<()> {
        let key = self.key(name)?;
        let mut req = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data));
        if let Some(ct) = guess_content_type(name) {
            req = req.content_type(ct);
        }
        req.send().await.map_err(BlobError::backend)?;
        Ok(())
    }

    async fn get(&self, name: &str) -> BlobResult<Bytes> {
        let key = self.key(name)?;
        let out = match self.client.get_object().bucket(&self.bucket).key(&key).send().await {
            Ok(out) => out,
            Err(e) if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) => {
                return Err(BlobError::not_found(name));
            }
            Err(e) => return Err(BlobError::backend(e)),
        };
        let body = out.body.collect().await.map_err(BlobError::backend)?;
        Ok(body.into_bytes())
    }

    async fn delete(&self, name: &str) -> BlobResult<()> {
        // DeleteObject succeeds on missing keys; HEAD first so a missing blob is NotFound.
        if !self.exists(name).await? {
            return Err(BlobError::not_found(name));
        }
        let key = self.key(name)?;
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(BlobError::backend)?;
        self.set_pending(name, None);
        Ok(())
    }

    async fn begin_copy(&self, source: &str, destination: &str) -> BlobResult<String> {
        let src_key = self.key(source)?;
        let dst_key = self.key(destination)?;
        let copy_source = format!("{}/{}", self.bucket, encode_copy_source(&src_key));
        let copy_id = format!("{}->{}", src_key, dst_key);
        self.set_pending(destination, Some(copy_id.clone()));

        let out = self
            .client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(copy_source)
            .key(&dst_key)
            .send()
            .await
            .map_err(|e| {
                self.set_pending(destination, None);
                BlobError::backend(e)
            })?;

        let copy_id = out
            .copy_object_result()
            .and_then(|r| r.e_tag())
            .map(str::to_string)
            .unwrap_or(copy_id);
        debug!("s3 copy s3://{}/{} -> {} ({})", self.bucket, src_key, dst_key, copy_id);
        Ok(copy_id)
    }

    async fn copy_status(&self, destination: &str) -> BlobResult<CopyStatus> {
        if self.exists(destination).await? {
            self.set_pending(destination, None);
            return Ok(CopyStatus::Success);
        }
        if self.is_pending(destination) {
            Ok(CopyStatus::Pending)
        } else {
            Err(BlobError::not_found(destination))
        }
    }

    async fn abort_copy(&self, destination: &str, copy_id: &str) -> BlobResult<()> {
        // CopyObject has no abort; forgetting the pending entry is all there is to do.
        debug!("s3 abort_copy on {} ({}) is a no-op", destination, copy_id);
        self.set_pending(destination, None);
        Ok(())
    }

    async fn exists(&self, name: &str) -> BlobResult<bool> {
        match self.head_version(name).await {
            Ok(_) => Ok(true),
            Err(BlobError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn create_snapshot(&self, name: &str) -> BlobResult<SnapshotInfo> {
        let key = self.key(name)?;
        match self.head_version(name).await? {
            Some(version) if version != "null" => Ok(SnapshotInfo {
                blob_name: name.to_string(),
                url: format!("s3://{}/{}?versionId={}", self.bucket, key, version),
                snapshot_id: version,
            }),
            _ => Err(BlobError::Unsupported {
                operation: "create_snapshot on an unversioned bucket",
                backend: "s3",
            }),
        }
    }

    async fn time_limited_url(
        &self,
        name: &str,
        expiry: Duration,
        permissions: UrlPermissions,
    ) -> BlobResult<String> {
        let key = self.key(name)?;
        let granted = [permissions.read, permissions.write, permissions.delete]
            .iter()
            .filter(|p| **p)
            .count();
        if granted != 1 {
            return Err(BlobError::invalid(
                "an S3 presigned URL carries exactly one of read, write or delete",
            ));
        }
        let cfg = PresigningConfig::expires_in(expiry).map_err(BlobError::backend)?;

        let presigned = if permissions.read {
            self.client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .presigned(cfg)
                .await
                .map_err(BlobError::backend)?
        } else if permissions.write {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .presigned(cfg)
                .await
                .map_err(BlobError::backend)?
        } else {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(&key)
                .presigned(cfg)
                .await
                .map_err(BlobError::backend)?
        };
        Ok(presigned.uri().to_string())
    }

    async fn list(&self, prefix: Option<&str>) -> BlobResult<Vec<BlobInfo>> {
        let full_prefix = format!("{}{}", self.prefix, prefix.unwrap_or(""));
        let mut out = Vec::new();
        let mut cont: Option<String> = None;
        loop {
            let mut req = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&full_prefix);
            if let Some(token) = &cont {
                req = req.continuation_token(token);
            }
            let resp = req.send().await.map_err(BlobError::backend)?;
            for obj in resp.contents() {
                let Some(key) = obj.key() else { continue };
                let name = self.name_from_key(key).to_string();
                out.push(BlobInfo {
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    content_type: guess_content_type(&name).map(str::to_string),
                    last_modified: obj
                        .last_modified()
                        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos())),
                    metadata: BTreeMap::new(),
                    name,
                });
            }
            match resp.next_continuation_token() {
                Some(token) => cont = Some(token.to_string()),
                None => break,
            }
        }
        Ok(out)
    }
}
