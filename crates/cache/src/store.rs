//! Named cache buckets
//!
//! A bucket maps request URLs (GET only) to stored responses and lists its
//! keys in insertion order. [`MemoryCacheStorage`] keeps everything in
//! process memory behind an async lock.

use crate::Response;
use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("cache storage backend failure: {0}")]
    Backend(String),
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    async fn bucket_names(&self) -> Result<Vec<String>, StorageError>;

    async fn has_bucket(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Returns whether the bucket existed
    async fn delete_bucket(&self, bucket: &str) -> Result<bool, StorageError>;

    /// Store every entry or none of them, creating the bucket if needed
    async fn put_all(
        &self,
        bucket: &str,
        entries: Vec<(String, Response)>,
    ) -> Result<(), StorageError>;

    async fn put(&self, bucket: &str, url: &str, response: Response) -> Result<(), StorageError> {
        self.put_all(bucket, vec![(url.to_string(), response)]).await
    }

    async fn lookup(&self, bucket: &str, url: &str) -> Result<Option<Response>, StorageError>;

    /// Keys in insertion order; empty for a missing bucket
    async fn keys(&self, bucket: &str) -> Result<Vec<String>, StorageError>;

    /// Returns whether the entry existed
    async fn delete_entry(&self, bucket: &str, url: &str) -> Result<bool, StorageError>;
}

type Bucket = IndexMap<String, Response>;

#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    buckets: RwLock<IndexMap<String, Bucket>>,
}

impl MemoryCacheStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryCacheStorage {
    async fn bucket_names(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.buckets.read().await.keys().cloned().collect())
    }

    async fn has_bucket(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<bool, StorageError> {
        Ok(self.buckets.write().await.shift_remove(bucket).is_some())
    }

    async fn put_all(
        &self,
        bucket: &str,
        entries: Vec<(String, Response)>,
    ) -> Result<(), StorageError> {
        let mut buckets = self.buckets.write().await;
        let bucket = buckets.entry(bucket.to_string()).or_default();

        for (url, response) in entries {
            // a re-put moves the key to the end of the listing
            bucket.shift_remove(&url);
            bucket.insert(url, response);
        }

        Ok(())
    }

    async fn lookup(&self, bucket: &str, url: &str) -> Result<Option<Response>, StorageError> {
        let buckets = self.buckets.read().await;
        Ok(buckets.get(bucket).and_then(|entries| entries.get(url)).cloned())
    }

    async fn keys(&self, bucket: &str) -> Result<Vec<String>, StorageError> {
        let buckets = self.buckets.read().await;
        Ok(buckets.get(bucket).map(|entries| entries.keys().cloned().collect()).unwrap_or_default())
    }

    async fn delete_entry(&self, bucket: &str, url: &str) -> Result<bool, StorageError> {
        let mut buckets = self.buckets.write().await;
        Ok(buckets.get_mut(bucket).is_some_and(|entries| entries.shift_remove(url).is_some()))
    }
}
