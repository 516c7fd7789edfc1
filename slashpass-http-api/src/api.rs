use async_trait::async_trait;
use axum::http::StatusCode;
use thiserror::Error;

use crate::status::{HealthStatus, InsertionTarget, Stats};

pub const HTTP_HEALTH_ROUTE: &str = "/health";
pub const HTTP_STATS_ROUTE: &str = "/stats";
pub const HTTP_PUBLIC_KEY_ROUTE: &str = "/public_key";
pub const HTTP_ONETIME_LINK_ROUTE: &str = "/onetime_link";
pub const HTTP_LIST_ROUTE: &str = "/list";
pub const HTTP_INSERT_ROUTE: &str = "/insert";
pub const HTTP_REMOVE_ROUTE: &str = "/remove";

pub type ApiResult<T> = Result<T, ApiError>;

/// Failure of an API call, carrying the HTTP status it is served with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("upstream failure: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Rebuilds an error from a response status on the client side.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            400 => ApiError::BadRequest(message),
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            502 => ApiError::Upstream(message),
            _ => ApiError::Internal(message),
        }
    }
}

/// Operations of the relay as served over HTTP.
///
/// Implemented by the relay itself and by [`crate::client::SlashpassApiClient`], so tests and
/// tooling can talk to a running relay through the same interface.
#[async_trait]
pub trait SlashpassApi: Send + Sync {
    async fn health(&self) -> ApiResult<HealthStatus>;

    async fn stats(&self) -> ApiResult<Stats>;

    /// PEM encoded public key of the relay.
    async fn public_key(&self) -> ApiResult<String>;

    /// One-time link for the secret stored under the given key, encrypted for the peer.
    async fn onetime_link(&self, secret: Option<String>) -> ApiResult<Vec<u8>>;

    /// Newline separated keys under `prefix`, chunk-encrypted for the peer.
    async fn list_secrets(&self, prefix: String) -> ApiResult<Vec<u8>>;

    async fn insertion_target(&self, token: String) -> ApiResult<InsertionTarget>;

    async fn insert_secret(&self, token: String, secret: String, encrypted: bool)
    -> ApiResult<()>;

    async fn remove_secret(&self, channel: String, app: String) -> ApiResult<()>;
}
