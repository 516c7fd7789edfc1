use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

use crate::store::{BlobStore, BlobStoreError};
use crate::{BucketName, ObjectKey};

type Objects = BTreeMap<ObjectKey, Vec<u8>>;

/// A blob store keeping all buckets in memory.
///
/// Used for local development and tests, contents are gone when the process exits.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<RwLock<HashMap<BucketName, Objects>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn write_lock(&self) -> RwLockWriteGuard<'_, HashMap<BucketName, Objects>> {
        self.inner.write().await
    }

    async fn read_lock(&self) -> RwLockReadGuard<'_, HashMap<BucketName, Objects>> {
        self.inner.read().await
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        let buckets = self.read_lock().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| BlobStoreError::BucketMissing(bucket.to_string()))?;
        objects
            .get(key)
            .cloned()
            .ok_or_else(|| BlobStoreError::not_found(bucket, key))
    }

    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), BlobStoreError> {
        let mut buckets = self.write_lock().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| BlobStoreError::BucketMissing(bucket.to_string()))?;
        objects.insert(key.to_string(), body.to_vec());
        trace!(bucket, key, bytes = body.len(), "stored object in memory");
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), BlobStoreError> {
        let mut buckets = self.write_lock().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| BlobStoreError::BucketMissing(bucket.to_string()))?;
        objects.remove(key);
        Ok(())
    }

    async fn copy(&self, bucket: &str, src: &str, dst: &str) -> Result<(), BlobStoreError> {
        let mut buckets = self.write_lock().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| BlobStoreError::BucketMissing(bucket.to_string()))?;
        let body = objects
            .get(src)
            .cloned()
            .ok_or_else(|| BlobStoreError::not_found(bucket, src))?;
        objects.insert(dst.to_string(), body);
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectKey>, BlobStoreError> {
        let buckets = self.read_lock().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| BlobStoreError::BucketMissing(bucket.to_string()))?;
        Ok(objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), BlobStoreError> {
        self.write_lock()
            .await
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }
}
