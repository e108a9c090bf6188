//! In-process artifact store

use super::{validate_key, ArtifactStore, ObjectInfo, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
    last_modified: DateTime<Utc>,
}

/// Map-backed store for tests and local runs.
///
/// Listing order follows the underlying hash map and is deliberately
/// unordered, so callers cannot depend on it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
    buckets: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object with an explicit modification time
    pub fn insert_with_modified(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
        last_modified: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        validate_key(key)?;
        let mut objects = self.objects.write().map_err(poisoned)?;
        objects.insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
                last_modified,
            },
        );
        Ok(())
    }

    /// Content type recorded for a key
    pub fn content_type(&self, key: &str) -> Option<String> {
        self.objects
            .read()
            .ok()?
            .get(key)
            .map(|o| o.content_type.clone())
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> StoreError {
    StoreError::Io(std::io::Error::new(
        std::io::ErrorKind::Other,
        format!("lock poisoned: {}", e),
    ))
}

#[async_trait]
impl ArtifactStore for InMemoryStore {
    async fn create_bucket(&self, bucket: &str) -> Result<(), StoreError> {
        self.buckets
            .write()
            .map_err(poisoned)?
            .insert(bucket.to_string());
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StoreError> {
        Ok(self.buckets.read().map_err(poisoned)?.contains(bucket))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectInfo>, StoreError> {
        let objects = self.objects.read().map_err(poisoned)?;
        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectInfo {
                key: key.clone(),
                last_modified: obj.last_modified,
                size: obj.bytes.len() as u64,
            })
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let objects = self.objects.read().map_err(poisoned)?;
        objects
            .get(key)
            .map(|o| o.bytes.clone())
            .ok_or_else(|| StoreError::NoSuchKey(key.to_string()))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), StoreError> {
        self.insert_with_modified(key, bytes, content_type, Utc::now())
    }

    async fn head(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.objects.read().map_err(poisoned)?.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CONTENT_TYPE_CSV;

    #[tokio::test]
    async fn test_put_get_head() {
        let store = InMemoryStore::new();
        assert!(!store.head("raw/a.csv").await.unwrap());

        store
            .put("raw/a.csv", b"x,y\n1,2\n".to_vec(), CONTENT_TYPE_CSV)
            .await
            .unwrap();

        assert!(store.head("raw/a.csv").await.unwrap());
        assert_eq!(store.get("raw/a.csv").await.unwrap(), b"x,y\n1,2\n");
        assert_eq!(store.content_type("raw/a.csv").as_deref(), Some(CONTENT_TYPE_CSV));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = InMemoryStore::new();
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NoSuchKey(_)));
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let store = InMemoryStore::new();
        store.put("raw/2024-01-01/a.csv", vec![1], CONTENT_TYPE_CSV).await.unwrap();
        store.put("raw/2024-01-02/b.csv", vec![1, 2], CONTENT_TYPE_CSV).await.unwrap();
        store.put("models/m.model", vec![], CONTENT_TYPE_CSV).await.unwrap();

        let mut keys: Vec<_> = store
            .list("raw/")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["raw/2024-01-01/a.csv", "raw/2024-01-02/b.csv"]);
    }

    #[tokio::test]
    async fn test_buckets() {
        let store = InMemoryStore::new();
        assert!(!store.bucket_exists("neows").await.unwrap());
        store.create_bucket("neows").await.unwrap();
        assert!(store.bucket_exists("neows").await.unwrap());
    }
}
