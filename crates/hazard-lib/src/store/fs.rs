//! Filesystem-backed artifact store
//!
//! A bucket is a directory under the store root and keys are relative paths
//! inside it. The filesystem keeps no content type, so `put` only logs it.

use super::{validate_key, ArtifactStore, ObjectInfo, ObjectReader, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::debug;

/// Directory-per-bucket store
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    bucket: String,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn bucket_dir(&self) -> PathBuf {
        self.root.join(&self.bucket)
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.bucket_dir().join(key))
    }

    async fn ensure_bucket(&self) -> Result<PathBuf, StoreError> {
        let dir = self.bucket_dir();
        if !tokio::fs::try_exists(&dir).await? {
            return Err(StoreError::NoSuchBucket(self.bucket.clone()));
        }
        Ok(dir)
    }
}

/// Walk `dir` recursively, collecting regular files as (relative key, metadata)
async fn walk(base: &Path, dir: &Path, out: &mut Vec<ObjectInfo>) -> Result<(), StoreError> {
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let metadata = entry.metadata().await?;
            if metadata.is_dir() {
                pending.push(path);
                continue;
            }
            // Skip in-flight temporary writes
            if path.extension().map(|e| e == "tmp").unwrap_or(false) {
                continue;
            }
            let Ok(relative) = path.strip_prefix(base) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let last_modified: DateTime<Utc> = metadata.modified()?.into();
            out.push(ObjectInfo {
                key,
                last_modified,
                size: metadata.len(),
            });
        }
    }
    Ok(())
}

#[async_trait]
impl ArtifactStore for FsStore {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        validate_key(bucket)?;
        tokio::fs::create_dir_all(self.root.join(bucket)).await?;
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError> {
        validate_key(bucket)?;
        Ok(tokio::fs::try_exists(self.root.join(bucket)).await?)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
        let base = self.ensure_bucket().await?;
        let mut objects = Vec::new();
        walk(&base, &base, &mut objects).await?;
        objects.retain(|o| o.key.starts_with(prefix));
        Ok(objects)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.object_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NoSuchKey(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn open(&self, key: &str) -> Result<ObjectReader, StoreError> {
        let path = self.object_path(key)?;
        match tokio::fs::File::open(&path).await {
            Ok(file) => Ok(Box::new(BufReader::new(file))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NoSuchKey(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        self.ensure_bucket().await?;
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Write to temp file first, then rename into place
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?;
        let temp_path = path.with_file_name(format!("{}.tmp", file_name));
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, &path).await?;

        debug!(key = %key, size = bytes.len(), content_type = %content_type, "Stored object");
        Ok(())
    }

    async fn head(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.object_path(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }
}
