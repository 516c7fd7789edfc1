use std::fmt::Debug;

use async_trait::async_trait;
use thiserror::Error;

use crate::{BucketName, ObjectKey};

/// Storage failures, normalised across backends.
#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("object {key} not found in bucket {bucket}")]
    NotFound { bucket: BucketName, key: ObjectKey },

    #[error("bucket {0} does not exist")]
    BucketMissing(BucketName),

    #[error("storage backend error: {0}")]
    Other(String),
}

impl BlobStoreError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    /// True for both a missing object and a missing bucket: in either case there is nothing to
    /// read.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::BucketMissing(_))
    }
}

/// Key/value blob service with list-by-prefix capability.
///
/// Implementations give read-after-write consistency per key and atomic per-object operations,
/// nothing more: there are no cross-object transactions.
#[async_trait]
pub trait BlobStore: Debug + Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, BlobStoreError>;

    async fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), BlobStoreError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), BlobStoreError>;

    /// Server-side copy of `src` to `dst` within the same bucket.
    async fn copy(&self, bucket: &str, src: &str, dst: &str) -> Result<(), BlobStoreError>;

    /// All object keys starting with `prefix`, in lexicographic order.
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectKey>, BlobStoreError>;

    async fn create_bucket(&self, bucket: &str) -> Result<(), BlobStoreError>;
}
