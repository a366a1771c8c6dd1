// src/error.rs
//
// Error types for gateway and engine operations.

use thiserror::Error;

/// Result type for blob store and engine operations.
pub type BlobResult<T> = Result<T, BlobError>;

#[derive(Debug, Error)]
pub enum BlobError {
    /// Blob not present in the store.
    #[error("blob not found: {name}")]
    NotFound { name: String },

    /// Caller supplied an empty or malformed argument; no remote call was made.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport or SDK failure reported by a backend.
    #[error("backend error: {0}")]
    Backend(#[source] anyhow::Error),

    /// Downloading a URL source into its staging file failed.
    #[error("failed to stage {source_url}: {reason}")]
    Staging { source_url: String, reason: String },

    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        operation: &'static str,
        backend: &'static str,
    },
}

impl BlobError {
    pub fn not_found(name: impl Into<String>) -> Self {
        BlobError::NotFound { name: name.into() }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        BlobError::InvalidArgument(msg.into())
    }

    pub fn backend(err: impl Into<anyhow::Error>) -> Self {
        BlobError::Backend(err.into())
    }

    /// True when the error was raised before any remote call was attempted.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, BlobError::InvalidArgument(_))
    }
}
