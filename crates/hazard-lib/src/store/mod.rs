//! Artifact store boundary
//!
//! A key-value blob store with list-by-prefix, get, put, buffered reads and
//! existence checks. The pipeline only assumes that a put is visible to a
//! later list/get issued by the same process.

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncBufRead;

pub const CONTENT_TYPE_OCTET: &str = "application/octet-stream";
pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_CSV: &str = "text/csv";

/// Errors raised by store implementations, propagated as-is by the pipeline
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no such key: {0}")]
    NoSuchKey(String),

    #[error("no such bucket: {0}")]
    NoSuchBucket(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Buffered reader over one object's bytes
pub type ObjectReader = Box<dyn AsyncBufRead + Send + Unpin>;

/// Listing entry for a stored object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Trait for artifact store implementations
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Create the bucket if it does not exist yet
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError>;

    /// Check whether a bucket exists
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError>;

    /// List objects whose key starts with `prefix`, in no particular order
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError>;

    /// Fetch an object's bytes
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Open an object for buffered reading.
    ///
    /// The default fetches the whole object; stores that can read
    /// incrementally override it.
    async fn open(&self, key: &str) -> Result<ObjectReader, StoreError> {
        let bytes = self.get(key).await?;
        Ok(Box::new(std::io::Cursor::new(bytes)))
    }

    /// Write an object, replacing any previous content under the key
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError>;

    /// Check whether an object exists
    async fn head(&self, key: &str) -> Result<bool, StoreError>;
}

/// Reject keys that could escape the bucket or are otherwise unusable
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty()
        || key.starts_with('/')
        || key.split('/').any(|part| part == ".." || part == ".")
        || key.contains('\\')
    {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
