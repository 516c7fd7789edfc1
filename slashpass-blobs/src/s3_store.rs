use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, BucketConfiguration, Region};
use tracing::{debug, trace};

use crate::store::{BlobStore, BlobStoreError};
use crate::ObjectKey;

/// S3 error codes which mean the bucket itself is gone, as opposed to a single object.
const NO_SUCH_BUCKET: &str = "NoSuchBucket";

/// Blob store backed by an S3 compatible object storage (AWS, MinIO, ..).
#[derive(Debug, Clone)]
pub struct S3BlobStore {
    region: Region,
    credentials: Credentials,
    path_style: bool,
}

impl S3BlobStore {
    /// Creates a new S3 blob store interface.
    ///
    /// Path-style addressing should be used for custom endpoints which do not resolve
    /// `<bucket>.<host>` sub-domains.
    pub fn new(region: Region, credentials: Credentials, path_style: bool) -> Self {
        Self {
            region,
            credentials,
            path_style,
        }
    }

    fn bucket(&self, name: &str) -> Result<Box<Bucket>, BlobStoreError> {
        let bucket = Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(|err| BlobStoreError::Other(err.to_string()))?;
        Ok(if self.path_style {
            bucket.with_path_style()
        } else {
            bucket
        })
    }
}

/// Maps an S3 error response onto the normalised storage errors.
fn classify(err: S3Error, bucket: &str, key: &str) -> BlobStoreError {
    match err {
        S3Error::HttpFailWithBody(status, body) => from_status(status, &body, bucket, key),
        err => BlobStoreError::Other(err.to_string()),
    }
}

fn from_status(status: u16, body: &str, bucket: &str, key: &str) -> BlobStoreError {
    match status {
        404 if body.contains(NO_SUCH_BUCKET) => BlobStoreError::BucketMissing(bucket.to_string()),
        404 => BlobStoreError::not_found(bucket, key),
        _ => BlobStoreError::Other(format!("unexpected status {status} for {bucket}/{key}: {body}")),
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get(&self, bucket_name: &str, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        let bucket = self.bucket(bucket_name)?;
        let response = bucket
            .get_object(key)
            .await
            .map_err(|err| classify(err, bucket_name, key))?;
        if !is_success(response.status_code()) {
            let body = String::from_utf8_lossy(response.as_slice());
            return Err(from_status(response.status_code(), &body, bucket_name, key));
        }
        trace!(key, bucket_name, bytes = response.as_slice().len(), "read object");
        Ok(response.as_slice().to_vec())
    }

    async fn put(&self, bucket_name: &str, key: &str, body: &[u8]) -> Result<(), BlobStoreError> {
        let bucket = self.bucket(bucket_name)?;
        let response = bucket
            .put_object(key, body)
            .await
            .map_err(|err| classify(err, bucket_name, key))?;
        if !is_success(response.status_code()) {
            let body = String::from_utf8_lossy(response.as_slice());
            return Err(from_status(response.status_code(), &body, bucket_name, key));
        }
        trace!(key, bucket_name, bytes = body.len(), "stored object");
        Ok(())
    }

    async fn delete(&self, bucket_name: &str, key: &str) -> Result<(), BlobStoreError> {
        let bucket = self.bucket(bucket_name)?;
        let response = bucket
            .delete_object(key)
            .await
            .map_err(|err| classify(err, bucket_name, key))?;
        if !is_success(response.status_code()) {
            let body = String::from_utf8_lossy(response.as_slice());
            return Err(from_status(response.status_code(), &body, bucket_name, key));
        }
        trace!(key, bucket_name, "removed object");
        Ok(())
    }

    async fn copy(&self, bucket_name: &str, src: &str, dst: &str) -> Result<(), BlobStoreError> {
        let bucket = self.bucket(bucket_name)?;
        let status = bucket
            .copy_object_internal(src, dst)
            .await
            .map_err(|err| classify(err, bucket_name, src))?;
        if !is_success(status) {
            return Err(from_status(status, "", bucket_name, src));
        }
        trace!(src, dst, bucket_name, "copied object");
        Ok(())
    }

    async fn list(&self, bucket_name: &str, prefix: &str) -> Result<Vec<ObjectKey>, BlobStoreError> {
        let bucket = self.bucket(bucket_name)?;
        let results = bucket
            .list(prefix.to_string(), None)
            .await
            .map_err(|err| classify(err, bucket_name, prefix))?;
        let mut keys: Vec<ObjectKey> = results
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| object.key)
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn create_bucket(&self, bucket_name: &str) -> Result<(), BlobStoreError> {
        let config = BucketConfiguration::default();
        let response = if self.path_style {
            Bucket::create_with_path_style(
                bucket_name,
                self.region.clone(),
                self.credentials.clone(),
                config,
            )
            .await
        } else {
            Bucket::create(
                bucket_name,
                self.region.clone(),
                self.credentials.clone(),
                config,
            )
            .await
        }
        .map_err(|err| BlobStoreError::Other(err.to_string()))?;

        if !response.success() {
            return Err(BlobStoreError::Other(format!(
                "failed to create bucket {bucket_name}: {} {}",
                response.response_code, response.response_text
            )));
        }
        debug!(bucket_name, "created bucket");
        Ok(())
    }
}
