use std::sync::Arc;

use chrono::Utc;
use slashpass_core::{SecretPath, is_hidden_key};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::store::{BlobStore, BlobStoreError};
use crate::{BucketName, ObjectKey};

#[derive(Debug, Error)]
pub enum SecretStoreError {
    /// The object to be mutated could not be backed up because it does not exist.
    #[error("refusing to modify {0}: there is no stored secret to back up")]
    BackupPrecondition(SecretPath),

    #[error(transparent)]
    Storage(#[from] BlobStoreError),
}

/// Secrets of all channels, stored encrypted in one bucket.
///
/// Every overwrite or removal of a secret is preceded by a copy of its current version to a
/// hidden backup object (`<channel>/<route>.<file>.<timestamp>`). Backups are never read back by
/// the relay, they are a recovery trail for operators.
///
/// Backup and mutation are two separate requests to the blob store: a concurrent write to the
/// same path in between is possible and not guarded against.
#[derive(Debug, Clone)]
pub struct SecretStore {
    store: Arc<dyn BlobStore>,
    bucket: BucketName,
    clock: fn() -> i64,
}

fn unix_timestamp() -> i64 {
    Utc::now().timestamp()
}

impl SecretStore {
    pub fn new(store: Arc<dyn BlobStore>, bucket: BucketName) -> Self {
        Self {
            store,
            bucket,
            clock: unix_timestamp,
        }
    }

    /// Replaces the source of backup timestamps.
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the raw stored (still encrypted) bytes of an object.
    pub async fn get(&self, key: &str) -> Result<Vec<u8>, BlobStoreError> {
        self.store.get(&self.bucket, key).await
    }

    /// Overwrites an existing secret after backing it up.
    ///
    /// If the bucket does not exist yet it is created and the secret written without a backup.
    pub async fn put(&self, path: &SecretPath, body: &[u8]) -> Result<(), SecretStoreError> {
        match self.backup(path).await {
            Ok(true) => {}
            Ok(false) => return Err(SecretStoreError::BackupPrecondition(path.clone())),
            Err(BlobStoreError::BucketMissing(bucket)) => {
                info!(%bucket, "storage bucket does not exist, creating it");
                self.store.create_bucket(&bucket).await?;
            }
            Err(err) => return Err(err.into()),
        }

        self.store
            .put(&self.bucket, &path.to_string(), body)
            .await?;
        debug!(%path, "stored secret");
        Ok(())
    }

    /// Writes a secret which has no previous version.
    pub async fn create(&self, path: &SecretPath, body: &[u8]) -> Result<(), SecretStoreError> {
        let key = path.to_string();
        match self.store.put(&self.bucket, &key, body).await {
            Err(BlobStoreError::BucketMissing(bucket)) => {
                info!(%bucket, "storage bucket does not exist, creating it");
                self.store.create_bucket(&bucket).await?;
                self.store.put(&self.bucket, &key, body).await?;
            }
            result => result?,
        }
        debug!(%path, "stored new secret");
        Ok(())
    }

    /// Removes a secret after backing it up. Refused when there is nothing to back up.
    pub async fn remove(&self, path: &SecretPath) -> Result<(), SecretStoreError> {
        match self.backup(path).await {
            Ok(true) => {}
            Ok(false) | Err(BlobStoreError::BucketMissing(_)) => {
                warn!(%path, "refusing to remove secret without a backup");
                return Err(SecretStoreError::BackupPrecondition(path.clone()));
            }
            Err(err) => return Err(err.into()),
        }

        self.store.delete(&self.bucket, &path.to_string()).await?;
        debug!(%path, "removed secret");
        Ok(())
    }

    /// Copies the current version of a secret to its backup key.
    ///
    /// Returns `false` when there is no object at `path`, other storage errors are passed on.
    pub async fn backup(&self, path: &SecretPath) -> Result<bool, BlobStoreError> {
        let backup_key = path.backup_key((self.clock)());
        match self
            .store
            .copy(&self.bucket, &path.to_string(), &backup_key)
            .await
        {
            Ok(()) => {
                debug!(%path, %backup_key, "saved backup copy");
                Ok(true)
            }
            Err(BlobStoreError::NotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Lists the keys of all secrets under `prefix`, leaving out backups and other hidden
    /// objects.
    ///
    /// A missing bucket is created on the fly and yields an empty listing.
    pub async fn list(&self, prefix: &str) -> Result<Vec<ObjectKey>, BlobStoreError> {
        let keys = match self.store.list(&self.bucket, prefix).await {
            Ok(keys) => keys,
            Err(BlobStoreError::BucketMissing(bucket)) => {
                info!(%bucket, "storage bucket does not exist, creating it");
                self.store.create_bucket(&bucket).await?;
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        Ok(keys.into_iter().filter(|key| !is_hidden_key(key)).collect())
    }
}
