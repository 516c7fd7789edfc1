use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Result};
use slashpass_config::configuration::Config;
use slashpass_http_api::api::{HTTP_HEALTH_ROUTE, HTTP_STATS_ROUTE};
use tokio::runtime::Runtime;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::gateway::Gateway;

pub struct Context {
    gateway: Arc<Gateway>,
    config: Config,
    http_addr: SocketAddr,
    http_handle: JoinHandle<Result<()>>,
    http_runtime: Runtime,
    cancellation_token: CancellationToken,
}

impl Context {
    pub fn new(
        gateway: Arc<Gateway>,
        config: Config,
        http_addr: SocketAddr,
        http_handle: JoinHandle<Result<()>>,
        http_runtime: Runtime,
        cancellation_token: CancellationToken,
    ) -> Self {
        Context {
            gateway,
            config,
            http_addr,
            http_handle,
            http_runtime,
            cancellation_token,
        }
    }

    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Address the HTTP server is bound to.
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn log_configuration(&self) {
        info!("‣ storage bucket:");
        info!(
            "  - {} ({:?})",
            self.config.password_storage, self.config.storage_backend
        );
        info!("‣ slack server:");
        info!("  - {}", self.config.slack_server);
        info!("‣ public key:");
        for line in self.gateway.get_public_key().lines() {
            info!("  {}", line);
        }
        info!("‣ health endpoint:");
        info!("  - {}{}", self.http_addr, HTTP_HEALTH_ROUTE);
        info!("‣ stats endpoint:");
        info!("  - {}{}", self.http_addr, HTTP_STATS_ROUTE);
    }

    pub fn wait_for_termination(&self) -> Result<()> {
        let cloned_token = self.cancellation_token.clone();
        self.http_runtime.block_on(async move {
            tokio::select! {
                _ = cloned_token.cancelled() => bail!("HTTP server was cancelled"),
                _ = signal::ctrl_c() => {},
            };
            Ok(())
        })
    }

    /// Shuts down the context, stopping the HTTP server and its runtime.
    pub fn shutdown(self) -> Result<()> {
        self.http_handle.abort();
        self.http_runtime.shutdown_background();
        Ok(())
    }
}
