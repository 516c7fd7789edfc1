use std::sync::Arc;

use reqwest::{Client, Url};
use slashpass_blobs::{BlobStore, BlobStoreError, BucketName};
use slashpass_core::{KeyError, PublicKey, PEER_KEY_OBJECT};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PeerKeyError {
    /// The chat frontend could not be reached or refused to hand out its key.
    #[error("unable to retrieve peer key from {url}: {reason}")]
    Retrieval { url: String, reason: String },

    #[error("peer key is not usable: {0}")]
    Malformed(#[from] KeyError),

    #[error(transparent)]
    Storage(#[from] BlobStoreError),
}

/// Public key of the chat frontend, cached in the storage bucket.
///
/// The first successful fetch is trusted and persisted under [`PEER_KEY_OBJECT`], later calls
/// are served from the bucket until the entry is evicted.
#[derive(Debug, Clone)]
pub struct PeerKeyCache {
    store: Arc<dyn BlobStore>,
    bucket: BucketName,
    client: Client,
    url: Url,
}

impl PeerKeyCache {
    /// `url` is the full location of the peer's key, usually `<slack_server>/public_key`.
    /// Requests are bounded by the timeout configured on `client`.
    pub fn new(store: Arc<dyn BlobStore>, bucket: BucketName, client: Client, url: Url) -> Self {
        Self {
            store,
            bucket,
            client,
            url,
        }
    }

    /// Returns the peer key, fetching and caching it when the bucket holds none.
    pub async fn resolve(&self) -> Result<PublicKey, PeerKeyError> {
        match self.store.get(&self.bucket, PEER_KEY_OBJECT).await {
            Ok(pem) => {
                debug!("using cached peer key");
                return Ok(PublicKey::from_pem(&pem)?);
            }
            Err(err) if err.is_absent() => {}
            Err(err) => return Err(err.into()),
        }

        let pem = self.fetch().await?;
        let key = PublicKey::from_pem(&pem)?;

        if let Err(err) = self.store.put(&self.bucket, PEER_KEY_OBJECT, &pem).await {
            warn!(bucket = %self.bucket, "could not cache peer key: {}", err);
        } else {
            info!(bucket = %self.bucket, "cached peer key fetched from {}", self.url);
        }
        Ok(key)
    }

    /// Drops the cached key, the next [`PeerKeyCache::resolve`] fetches it again.
    pub async fn evict(&self) -> Result<(), BlobStoreError> {
        match self.store.delete(&self.bucket, PEER_KEY_OBJECT).await {
            Err(err) if err.is_absent() => Ok(()),
            result => result,
        }
    }

    async fn fetch(&self) -> Result<Vec<u8>, PeerKeyError> {
        let retrieval = |reason: String| PeerKeyError::Retrieval {
            url: self.url.to_string(),
            reason,
        };

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|err| retrieval(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(retrieval(format!("request failed with status {status}")));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| retrieval(err.to_string()))?;
        Ok(body.to_vec())
    }
}
