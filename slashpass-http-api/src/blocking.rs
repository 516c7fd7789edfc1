use std::sync::Arc;

use tokio::runtime::Runtime;

use crate::api::{ApiResult, SlashpassApi};
use crate::status::{HealthStatus, InsertionTarget, Stats};

/// Drives a [`SlashpassApi`] from synchronous code, such as tests.
pub struct BlockingClient<A>
where
    A: SlashpassApi,
{
    inner: A,
    runtime: Arc<Runtime>,
}

impl<A> BlockingClient<A>
where
    A: SlashpassApi,
{
    pub fn new(inner: A, runtime: Arc<Runtime>) -> Self {
        Self { inner, runtime }
    }

    pub fn health(&self) -> ApiResult<HealthStatus> {
        self.runtime.block_on(async { self.inner.health().await })
    }

    pub fn stats(&self) -> ApiResult<Stats> {
        self.runtime.block_on(async { self.inner.stats().await })
    }

    pub fn public_key(&self) -> ApiResult<String> {
        self.runtime.block_on(async { self.inner.public_key().await })
    }

    pub fn onetime_link(&self, secret: Option<&str>) -> ApiResult<Vec<u8>> {
        let secret = secret.map(str::to_string);
        self.runtime
            .block_on(async { self.inner.onetime_link(secret).await })
    }

    pub fn list_secrets(&self, prefix: &str) -> ApiResult<Vec<u8>> {
        self.runtime
            .block_on(async { self.inner.list_secrets(prefix.to_string()).await })
    }

    pub fn insertion_target(&self, token: &str) -> ApiResult<InsertionTarget> {
        self.runtime
            .block_on(async { self.inner.insertion_target(token.to_string()).await })
    }

    pub fn insert_secret(&self, token: &str, secret: &str, encrypted: bool) -> ApiResult<()> {
        self.runtime.block_on(async {
            self.inner
                .insert_secret(token.to_string(), secret.to_string(), encrypted)
                .await
        })
    }

    pub fn remove_secret(&self, channel: &str, app: &str) -> ApiResult<()> {
        self.runtime.block_on(async {
            self.inner
                .remove_secret(channel.to_string(), app.to_string())
                .await
        })
    }
}
