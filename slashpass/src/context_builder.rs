use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use reqwest::Client;
use slashpass_blobs::{BlobStore, MemoryBlobStore, S3BlobStore, SecretStore};
use slashpass_config::configuration::{load_config, Config, StorageBackend};
use slashpass_core::Keypair;
use slashpass_http_api::server::SlashpassHTTPServer;
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::context::Context;
use crate::gateway::Gateway;
use crate::http::api::SlashpassApiImpl;
use crate::onetime::{OneTimeSecretAuth, OneTimeSecretClient};
use crate::peer_key::PeerKeyCache;
use crate::service_url;
use crate::token::TokenResolver;
use crate::tracing::setup_tracing;

#[derive(Debug)]
pub struct ContextBuilder {
    config: Config,
    blob_store: Option<Arc<dyn BlobStore>>,
}

impl ContextBuilder {
    pub fn new(config: Config) -> Self {
        setup_tracing(config.log_level.clone());
        ContextBuilder {
            config,
            blob_store: None,
        }
    }

    /// Load the configuration from the environment and initializes context builder
    pub fn from_cli() -> Result<Self> {
        let config = load_config()?;
        Ok(ContextBuilder::new(config))
    }

    /// Uses the given blob store instead of the one named in the configuration.
    pub fn with_blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    /// Attempts to build and start the `Context`.
    ///
    /// Derives the relay keypair, wires the gateway to its blob store and upstream services
    /// and starts the HTTP server on a dedicated runtime. The server's port accepts
    /// connections once this returns.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// * The keypair cannot be derived from the configured seed.
    /// * The blob store or the HTTP client cannot be configured.
    /// * The HTTP server tokio runtime cannot be built.
    /// * The HTTP port cannot be bound.
    pub fn try_build_and_start(&self) -> Result<Context> {
        let gateway = Arc::new(self.build_gateway()?);

        let http_runtime = Builder::new_multi_thread()
            .enable_all()
            .thread_name("http-server")
            .build()
            .context("http server tokio runtime")?;
        let cancellation_token = CancellationToken::new();
        let (http_handle, http_addr) =
            self.start_http_server(&http_runtime, gateway.clone(), cancellation_token.clone())?;

        Ok(Context::new(
            gateway,
            self.config.clone(),
            http_addr,
            http_handle,
            http_runtime,
            cancellation_token,
        ))
    }

    fn build_gateway(&self) -> Result<Gateway> {
        let config = &self.config;
        let seed = config
            .bip39
            .as_ref()
            .ok_or_else(|| anyhow!("bip39 (keypair seed) is not set"))?;
        let keypair = Keypair::derive(seed.expose(), config.key_bits)
            .context("failed to derive relay keypair")?;
        info!("derived {} bit relay keypair", config.key_bits);

        let store = match &self.blob_store {
            Some(store) => store.clone(),
            None => ContextBuilder::blob_store_from_config(config)?,
        };

        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .context("http client")?;

        let slack_server = config.slack_server_url()?;
        let peer_key_url = service_url(&slack_server, &["public_key"])
            .ok_or_else(|| anyhow!("slack_server {} is not a base url", slack_server))?;

        let auth = match (&config.onetimesecret_user, &config.onetimesecret_key) {
            (Some(user), Some(key)) => Some(OneTimeSecretAuth {
                user: user.clone(),
                key: key.expose().to_string(),
            }),
            _ => None,
        };
        let links = OneTimeSecretClient::new(client.clone(), config.onetimesecret_url()?, auth);

        let bucket = config.password_storage.clone();
        Ok(Gateway::new(
            Arc::new(keypair),
            SecretStore::new(store.clone(), bucket.clone()),
            PeerKeyCache::new(store, bucket, client.clone(), peer_key_url),
            TokenResolver::new(client, slack_server),
            Arc::new(links),
            config.slack_server.clone(),
        ))
    }

    fn blob_store_from_config(config: &Config) -> Result<Arc<dyn BlobStore>> {
        Ok(match config.storage_backend {
            StorageBackend::S3 => Arc::new(S3BlobStore::new(
                config.s3_region()?,
                config.s3_credentials()?,
                config.aws_s3_endpoint.is_some(),
            )),
            StorageBackend::Memory => Arc::new(MemoryBlobStore::new()),
        })
    }

    /// Starts the HTTP server serving the gateway.
    fn start_http_server(
        &self,
        runtime: &Runtime,
        gateway: Arc<Gateway>,
        cancellation_token: CancellationToken,
    ) -> Result<(JoinHandle<Result<()>>, SocketAddr)> {
        let api = Arc::new(SlashpassApiImpl::new(gateway));
        let http_server = runtime
            .block_on(SlashpassHTTPServer::bind(self.config.http_bind_port, api))
            .context("failed to bind slashpass http server")?;
        let http_addr = http_server.local_addr()?;
        let handle = runtime.spawn(async move {
            let result = http_server
                .run()
                .await
                .context("failed to run slashpass http server")
                .inspect_err(|e| error!("http result {}", e));
            cancellation_token.cancel();
            result
        });
        Ok((handle, http_addr))
    }
}
