use std::collections::BTreeSet;
use std::sync::Arc;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use slashpass_blobs::{BlobStoreError, ObjectKey, SecretStore, SecretStoreError};
use slashpass_core::{encrypt, EnvelopeError, Keypair, SecretPath, PEER_KEY_OBJECT};
use thiserror::Error;
use tracing::{debug, info};

use crate::onetime::{LinkIssuer, OneTimeLinkError};
use crate::peer_key::{PeerKeyCache, PeerKeyError};
use crate::token::{TokenError, TokenResolver};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no secret stored under {0:?}")]
    SecretNotFound(String),

    #[error("invalid secret path: {0}")]
    InvalidPath(String),

    #[error("encrypted secret is not valid base64: {0}")]
    Armor(#[from] base64::DecodeError),

    #[error(transparent)]
    PeerKey(#[from] PeerKeyError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error(transparent)]
    OneTimeLink(#[from] OneTimeLinkError),

    #[error(transparent)]
    Secrets(#[from] SecretStoreError),

    #[error(transparent)]
    Storage(#[from] BlobStoreError),
}

/// Usage counters over the storage bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecretStats {
    pub total_secrets: usize,
    pub total_channels: usize,
}

/// The relay's operations, shared by all request handlers.
///
/// Secrets are stored encrypted with the relay's own key. Anything handed back to the chat
/// frontend (listings, one-time links) is encrypted with the frontend's key instead.
#[derive(Debug)]
pub struct Gateway {
    keypair: Arc<Keypair>,
    secrets: SecretStore,
    peer_key: PeerKeyCache,
    tokens: TokenResolver,
    links: Arc<dyn LinkIssuer>,
    home: String,
}

impl Gateway {
    /// `home` is the chat frontend's base url, linked from the insertion page.
    pub fn new(
        keypair: Arc<Keypair>,
        secrets: SecretStore,
        peer_key: PeerKeyCache,
        tokens: TokenResolver,
        links: Arc<dyn LinkIssuer>,
        home: String,
    ) -> Self {
        Self {
            keypair,
            secrets,
            peer_key,
            tokens,
            links,
            home,
        }
    }

    pub fn home(&self) -> &str {
        &self.home
    }

    pub fn peer_key(&self) -> &PeerKeyCache {
        &self.peer_key
    }

    /// PEM encoded public key of the relay.
    pub fn get_public_key(&self) -> &str {
        self.keypair.public_key_pem()
    }

    /// Creates a one-time link revealing the secret stored under `key`.
    ///
    /// The link is encrypted for the chat frontend as a single block. No link is issued unless
    /// the frontend's key is available to encrypt it.
    pub async fn create_onetime_link(&self, key: Option<&str>) -> Result<Vec<u8>, GatewayError> {
        let key = key.ok_or_else(|| GatewayError::SecretNotFound(String::new()))?;
        let stored = match self.secrets.get(key).await {
            Ok(stored) => stored,
            Err(err) if err.is_absent() => {
                return Err(GatewayError::SecretNotFound(key.to_string()))
            }
            Err(err) => return Err(err.into()),
        };

        let peer_key = self.peer_key.resolve().await?;
        let secret = self.keypair.decrypt(&stored)?;
        let link = self.links.create_link(&secret).await?;
        debug!(key, "issued one-time link");
        Ok(encrypt(link.as_bytes(), &peer_key, false)?)
    }

    /// Lists the secrets under `prefix`, newline separated and chunk-encrypted for the chat
    /// frontend. An empty listing yields an empty envelope.
    pub async fn list_secrets(&self, prefix: &str) -> Result<Vec<u8>, GatewayError> {
        let keys = self.secret_keys(prefix).await?;
        let listing = keys.join("\n");
        let peer_key = self.peer_key.resolve().await?;
        debug!(prefix, count = keys.len(), "listed secrets");
        Ok(encrypt(listing.as_bytes(), &peer_key, true)?)
    }

    pub async fn resolve_insertion_token(&self, token: &str) -> Result<SecretPath, GatewayError> {
        Ok(self.tokens.resolve(token).await?)
    }

    /// Stores a secret submitted through the insertion page.
    ///
    /// Secrets encrypted in the browser arrive base64 armored and are stored as they are,
    /// plaintext secrets are encrypted with the relay's key first. An existing secret is backed
    /// up before it is replaced.
    pub async fn store_secret(
        &self,
        path: &SecretPath,
        body: &str,
        is_encrypted: bool,
    ) -> Result<(), GatewayError> {
        let ciphertext = if is_encrypted {
            BASE64_STANDARD.decode(body.trim())?
        } else {
            self.keypair.seal(body.as_bytes())?
        };

        match self.secrets.put(path, &ciphertext).await {
            Err(SecretStoreError::BackupPrecondition(_)) => {
                self.secrets.create(path, &ciphertext).await?
            }
            result => result?,
        }
        info!(channel = path.channel(), "stored secret");
        Ok(())
    }

    /// Removes a secret, refused when there is nothing to back up.
    pub async fn remove_secret(&self, channel: &str, app: &str) -> Result<(), GatewayError> {
        let path = SecretPath::new(channel, app)
            .map_err(|err| GatewayError::InvalidPath(err.to_string()))?;
        self.secrets.remove(&path).await?;
        info!(channel, "removed secret");
        Ok(())
    }

    /// Counts stored secrets and the channels holding them.
    ///
    /// Channels are the first key segments made of upper-case letters and digits, the cached
    /// peer key is not a secret.
    pub async fn stats(&self) -> Result<SecretStats, GatewayError> {
        let secrets = self.secret_keys("").await?;
        let channels: BTreeSet<&str> = secrets
            .iter()
            .filter_map(|key| key.split_once('/'))
            .map(|(channel, _)| channel)
            .filter(|channel| is_channel_id(channel))
            .collect();

        Ok(SecretStats {
            total_secrets: secrets.len(),
            total_channels: channels.len(),
        })
    }

    /// Keys of user secrets under `prefix`: backups and the cached peer key are left out.
    async fn secret_keys(&self, prefix: &str) -> Result<Vec<ObjectKey>, GatewayError> {
        let mut keys = self.secrets.list(prefix).await?;
        keys.retain(|key| key != PEER_KEY_OBJECT);
        Ok(keys)
    }
}

fn is_channel_id(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use base64::prelude::BASE64_STANDARD;
    use base64::Engine;
    use reqwest::{Client, Url};
    use slashpass_blobs::{BlobStore, MemoryBlobStore, SecretStore, SecretStoreError};
    use slashpass_core::PEER_KEY_OBJECT;

    use super::{Gateway, GatewayError, SecretStats};
    use crate::onetime::{LinkIssuer, OneTimeLinkError};
    use crate::peer_key::{PeerKeyCache, PeerKeyError};
    use crate::tests::utils::{peer_keypair, test_keypair};
    use crate::token::TokenResolver;

    const BUCKET: &str = "test-slashpass-storage";

    #[derive(Debug)]
    struct EchoLinks;

    #[async_trait]
    impl LinkIssuer for EchoLinks {
        async fn create_link(&self, secret: &[u8]) -> Result<String, OneTimeLinkError> {
            let secret = std::str::from_utf8(secret).map_err(|_| OneTimeLinkError::NotText)?;
            Ok(format!("https://onetime.test/secret/{secret}"))
        }
    }

    /// Counts the links it is asked to issue.
    #[derive(Debug, Default)]
    struct CountingLinks {
        issued: AtomicUsize,
    }

    #[async_trait]
    impl LinkIssuer for CountingLinks {
        async fn create_link(&self, _secret: &[u8]) -> Result<String, OneTimeLinkError> {
            let n = self.issued.fetch_add(1, Ordering::SeqCst);
            Ok(format!("https://onetime.test/secret/{n}"))
        }
    }

    fn clock() -> i64 {
        1700000000
    }

    async fn gateway() -> (MemoryBlobStore, Gateway) {
        gateway_with(Arc::new(EchoLinks)).await
    }

    /// A gateway whose peer key is already cached, so no network is involved.
    async fn gateway_with(links: Arc<dyn LinkIssuer>) -> (MemoryBlobStore, Gateway) {
        let blobs = MemoryBlobStore::new();
        blobs.create_bucket(BUCKET).await.unwrap();
        blobs
            .put(
                BUCKET,
                PEER_KEY_OBJECT,
                peer_keypair().public_key_pem().as_bytes(),
            )
            .await
            .unwrap();

        let store: Arc<dyn BlobStore> = Arc::new(blobs.clone());
        let unreachable = Url::parse("http://127.0.0.1:9/").unwrap();
        let gateway = Gateway::new(
            test_keypair(),
            SecretStore::new(store.clone(), BUCKET.to_string()).with_clock(clock),
            PeerKeyCache::new(
                store,
                BUCKET.to_string(),
                Client::new(),
                unreachable.join("public_key").unwrap(),
            ),
            TokenResolver::new(Client::new(), unreachable),
            links,
            "https://testing.slashpass.co".to_string(),
        );
        (blobs, gateway)
    }

    fn path(value: &str) -> slashpass_core::SecretPath {
        value.parse().unwrap()
    }

    #[tokio::test]
    async fn plaintext_is_sealed_with_own_key() {
        let (blobs, gateway) = gateway().await;

        gateway
            .store_secret(&path("ABC123/aws"), "hunter2", false)
            .await
            .unwrap();

        let stored = blobs.get(BUCKET, "ABC123/aws").await.unwrap();
        assert_ne!(stored, b"hunter2");
        assert_eq!(test_keypair().decrypt(&stored).unwrap(), b"hunter2");
    }

    #[tokio::test]
    async fn encrypted_secret_is_stored_as_is() {
        let (blobs, gateway) = gateway().await;
        let ciphertext = test_keypair().seal(b"from the browser").unwrap();
        let armored = BASE64_STANDARD.encode(&ciphertext);

        gateway
            .store_secret(&path("ABC123/aws"), &armored, true)
            .await
            .unwrap();
        assert_eq!(blobs.get(BUCKET, "ABC123/aws").await.unwrap(), ciphertext);

        let result = gateway
            .store_secret(&path("ABC123/aws"), "not base64!", true)
            .await;
        assert!(matches!(result, Err(GatewayError::Armor(_))));
    }

    #[tokio::test]
    async fn overwrite_keeps_backup() {
        let (blobs, gateway) = gateway().await;

        gateway
            .store_secret(&path("ABC123/aws/root"), "first", false)
            .await
            .unwrap();
        let first = blobs.get(BUCKET, "ABC123/aws/root").await.unwrap();
        gateway
            .store_secret(&path("ABC123/aws/root"), "second", false)
            .await
            .unwrap();

        assert_eq!(
            blobs.get(BUCKET, "ABC123/aws/.root.1700000000").await.unwrap(),
            first
        );
        let current = blobs.get(BUCKET, "ABC123/aws/root").await.unwrap();
        assert_eq!(test_keypair().decrypt(&current).unwrap(), b"second");
    }

    #[tokio::test]
    async fn listing_is_encrypted_for_peer() {
        let (blobs, gateway) = gateway().await;
        for key in [
            "ABC123/foo",
            "ABC123/bar",
            "ABC123/.foo.1700000000",
            "XYZ321/baz",
            "loose",
        ] {
            blobs.put(BUCKET, key, b"ciphertext").await.unwrap();
        }

        let envelope = gateway.list_secrets("ABC123").await.unwrap();
        let listing = peer_keypair().decrypt(&envelope).unwrap();
        assert_eq!(listing, b"ABC123/bar\nABC123/foo");

        assert!(gateway.list_secrets("NOPE").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn long_listing_spans_several_blocks() {
        let (blobs, gateway) = gateway().await;
        let keys: Vec<String> = (0..20).map(|i| format!("ABC123/app-{i:02}")).collect();
        for key in &keys {
            blobs.put(BUCKET, key, b"ciphertext").await.unwrap();
        }

        let envelope = gateway.list_secrets("").await.unwrap();
        let block_len = peer_keypair().public_key().block_len();
        assert!(envelope.len() > block_len);
        assert_eq!(envelope.len() % block_len, 0);

        let listing = peer_keypair().decrypt(&envelope).unwrap();
        assert_eq!(String::from_utf8(listing).unwrap(), keys.join("\n"));
    }

    #[tokio::test]
    async fn listing_matches_stats() {
        let (blobs, gateway) = gateway().await;
        for key in [
            "ABC123/foo",
            "ABC123/bar",
            "ABC123/.foo.1700000000",
            "XYZ321/baz",
            "loose",
        ] {
            blobs.put(BUCKET, key, b"ciphertext").await.unwrap();
        }

        let envelope = gateway.list_secrets("").await.unwrap();
        let listing = String::from_utf8(peer_keypair().decrypt(&envelope).unwrap()).unwrap();
        let keys: Vec<&str> = listing.split('\n').collect();
        assert_eq!(keys, ["ABC123/bar", "ABC123/foo", "XYZ321/baz", "loose"]);
        assert_eq!(keys.len(), gateway.stats().await.unwrap().total_secrets);
    }

    #[tokio::test]
    async fn onetime_link_round_trip() {
        let (_, gateway) = gateway().await;
        gateway
            .store_secret(&path("ABC123/aws"), "hunter2", false)
            .await
            .unwrap();

        let envelope = gateway.create_onetime_link(Some("ABC123/aws")).await.unwrap();
        let link = peer_keypair().decrypt(&envelope).unwrap();
        assert_eq!(link, b"https://onetime.test/secret/hunter2");
    }

    #[tokio::test]
    async fn no_link_without_peer_key() {
        let links = Arc::new(CountingLinks::default());
        let (_, gateway) = gateway_with(links.clone()).await;
        gateway
            .store_secret(&path("ABC123/aws"), "hunter2", false)
            .await
            .unwrap();
        gateway.peer_key().evict().await.unwrap();

        assert!(matches!(
            gateway.create_onetime_link(Some("ABC123/aws")).await,
            Err(GatewayError::PeerKey(PeerKeyError::Retrieval { .. }))
        ));
        assert_eq!(links.issued.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn onetime_link_for_missing_secret() {
        let (_, gateway) = gateway().await;

        assert!(matches!(
            gateway.create_onetime_link(Some("ABC123/nope")).await,
            Err(GatewayError::SecretNotFound(_))
        ));
        assert!(matches!(
            gateway.create_onetime_link(None).await,
            Err(GatewayError::SecretNotFound(_))
        ));
    }

    #[tokio::test]
    async fn remove_requires_existing_secret() {
        let (blobs, gateway) = gateway().await;

        assert!(matches!(
            gateway.remove_secret("mock_channel", "mock_app").await,
            Err(GatewayError::Secrets(SecretStoreError::BackupPrecondition(_)))
        ));

        blobs
            .put(BUCKET, "mock_channel/mock_app", b"ciphertext")
            .await
            .unwrap();
        gateway.remove_secret("mock_channel", "mock_app").await.unwrap();
        assert!(blobs.get(BUCKET, "mock_channel/mock_app").await.is_err());
        assert!(blobs
            .get(BUCKET, "mock_channel/.mock_app.1700000000")
            .await
            .is_ok());

        assert!(matches!(
            gateway.remove_secret("", "mock_app").await,
            Err(GatewayError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn stats_skip_backups_and_peer_key() {
        let (blobs, gateway) = gateway().await;
        for key in [
            "ABC123/foo",
            "ABC123/bar",
            "ABC123/.foo.1700000000",
            "XYZ321/baz",
            "XYZ321/.baz.1600000000",
            "loose",
            "lower/case",
        ] {
            blobs.put(BUCKET, key, b"ciphertext").await.unwrap();
        }

        assert_eq!(
            gateway.stats().await.unwrap(),
            SecretStats {
                total_secrets: 5,
                total_channels: 2,
            }
        );
    }
}
