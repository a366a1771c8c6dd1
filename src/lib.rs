// src/lib.rs
//
// Crate root: public re-exports.
//
// Layering, leaves first:
//   object_store / file_store / s3_store  single-call gateway backends
//   ops                                   single-item wrappers
//   copy                                  async copy driver (copy, rename)
//   batch                                 bounded-concurrency executor
//   retry                                 upload retry passes
//   engine                                validated, caller-facing API

pub mod constants;
pub mod config;
pub mod error;

pub mod object_store;
pub mod file_store;
pub mod s3_store;

pub mod ops;
pub mod copy;
pub mod batch;
pub mod retry;
pub mod local_fs;
pub mod engine;

pub use config::{EngineConfig, StoreConfig};
pub use error::{BlobError, BlobResult};

pub use object_store::{
    BlobInfo,
    BlobStore,
    CopyStatus,
    Scheme,
    SnapshotInfo,
    UrlPermissions,
    infer_scheme,
    store_for_uri,
};
pub use file_store::FileSystemBlobStore;
pub use s3_store::S3BlobStore;

pub use ops::{OperationOutcome, OutcomeStatus, SourceRef, WorkItem};
pub use copy::{CopyPolicy, CopyState, copy_blob, rename_blob, run_copy};
pub use batch::{BatchExecutor, BatchResult, BatchSummary};
pub use retry::run_with_retries;
pub use local_fs::{LocalFile, LocalListing};
pub use engine::{BlobEngine, DirectoryUploadResult, TimeLimitedUrl};
