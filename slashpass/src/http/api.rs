use std::sync::Arc;

use async_trait::async_trait;
use slashpass_blobs::SecretStoreError;
use slashpass_http_api::api::{ApiError, ApiResult, SlashpassApi};
use slashpass_http_api::status::{HealthStatus, InsertionTarget, ServiceStatus, Stats};

use crate::gateway::{Gateway, GatewayError};
use crate::peer_key::PeerKeyError;

/// Serves the [`Gateway`] through the relay's HTTP API.
pub struct SlashpassApiImpl {
    gateway: Arc<Gateway>,
}

impl SlashpassApiImpl {
    pub fn new(gateway: Arc<Gateway>) -> SlashpassApiImpl {
        SlashpassApiImpl { gateway }
    }
}

/// What a failed token lookup means to the caller.
enum TokenIntent {
    Read,
    Write,
}

fn api_error(error: GatewayError, intent: TokenIntent) -> ApiError {
    let message = error.to_string();
    match error {
        GatewayError::SecretNotFound(_) => ApiError::NotFound(message),
        GatewayError::Token(_) => match intent {
            TokenIntent::Read => ApiError::NotFound(message),
            TokenIntent::Write => ApiError::BadRequest(message),
        },
        GatewayError::InvalidPath(_) | GatewayError::Armor(_) => ApiError::BadRequest(message),
        GatewayError::Secrets(SecretStoreError::BackupPrecondition(_)) => {
            ApiError::Forbidden(message)
        }
        GatewayError::PeerKey(PeerKeyError::Retrieval { .. }) => ApiError::Upstream(message),
        _ => ApiError::Internal(message),
    }
}

impl From<GatewayError> for ApiError {
    fn from(error: GatewayError) -> Self {
        api_error(error, TokenIntent::Read)
    }
}

#[async_trait]
impl SlashpassApi for SlashpassApiImpl {
    async fn health(&self) -> ApiResult<HealthStatus> {
        Ok(HealthStatus {
            status: ServiceStatus::Running,
            msg: None,
        })
    }

    async fn stats(&self) -> ApiResult<Stats> {
        let stats = self.gateway.stats().await?;
        Ok(Stats {
            total_secrets: stats.total_secrets,
            total_channels: stats.total_channels,
        })
    }

    async fn public_key(&self) -> ApiResult<String> {
        Ok(self.gateway.get_public_key().to_string())
    }

    async fn onetime_link(&self, secret: Option<String>) -> ApiResult<Vec<u8>> {
        Ok(self.gateway.create_onetime_link(secret.as_deref()).await?)
    }

    async fn list_secrets(&self, prefix: String) -> ApiResult<Vec<u8>> {
        Ok(self.gateway.list_secrets(&prefix).await?)
    }

    async fn insertion_target(&self, token: String) -> ApiResult<InsertionTarget> {
        let path = self
            .gateway
            .resolve_insertion_token(&token)
            .await
            .map_err(|err| api_error(err, TokenIntent::Read))?;
        Ok(InsertionTarget {
            path: path.to_string(),
            secret: path.app().to_string(),
            home: self.gateway.home().to_string(),
            public_key: self.gateway.get_public_key().to_string(),
        })
    }

    async fn insert_secret(
        &self,
        token: String,
        secret: String,
        encrypted: bool,
    ) -> ApiResult<()> {
        let path = self
            .gateway
            .resolve_insertion_token(&token)
            .await
            .map_err(|err| api_error(err, TokenIntent::Write))?;
        self.gateway
            .store_secret(&path, &secret, encrypted)
            .await
            .map_err(|err| api_error(err, TokenIntent::Write))
    }

    async fn remove_secret(&self, channel: String, app: String) -> ApiResult<()> {
        Ok(self.gateway.remove_secret(&channel, &app).await?)
    }
}
