use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::service_url;

#[derive(Debug, Error)]
pub enum OneTimeLinkError {
    #[error("secret is not valid utf-8 text")]
    NotText,

    #[error("{0} is not a base url")]
    InvalidEndpoint(Url),

    #[error("request to one-time secret service failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("one-time secret service answered with status {0}")]
    Rejected(u16),
}

/// Issues links which reveal a secret exactly once.
#[async_trait]
pub trait LinkIssuer: std::fmt::Debug + Send + Sync {
    async fn create_link(&self, secret: &[u8]) -> Result<String, OneTimeLinkError>;
}

/// Credentials for the one-time secret service, anonymous shares are used without them.
#[derive(Clone)]
pub struct OneTimeSecretAuth {
    pub user: String,
    pub key: String,
}

impl std::fmt::Debug for OneTimeSecretAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneTimeSecretAuth")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ShareResponse {
    secret_key: String,
}

/// [`LinkIssuer`] backed by onetimesecret.com (or a compatible deployment).
#[derive(Debug, Clone)]
pub struct OneTimeSecretClient {
    client: Client,
    endpoint: Url,
    auth: Option<OneTimeSecretAuth>,
}

impl OneTimeSecretClient {
    pub fn new(client: Client, endpoint: Url, auth: Option<OneTimeSecretAuth>) -> Self {
        Self {
            client,
            endpoint,
            auth,
        }
    }

    fn url(&self, segments: &[&str]) -> Result<Url, OneTimeLinkError> {
        service_url(&self.endpoint, segments)
            .ok_or_else(|| OneTimeLinkError::InvalidEndpoint(self.endpoint.clone()))
    }
}

#[async_trait]
impl LinkIssuer for OneTimeSecretClient {
    async fn create_link(&self, secret: &[u8]) -> Result<String, OneTimeLinkError> {
        let secret = std::str::from_utf8(secret).map_err(|_| OneTimeLinkError::NotText)?;

        let mut request = self
            .client
            .post(self.url(&["api", "v1", "share"])?)
            .form(&[("secret", secret)]);
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.user, Some(&auth.key));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OneTimeLinkError::Rejected(status.as_u16()));
        }

        let share: ShareResponse = response.json().await?;
        debug!("created one-time secret link");
        Ok(self.url(&["secret", &share.secret_key])?.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Form;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use reqwest::{Client, Url};
    use serde_json::json;
    use tokio::net::TcpListener;

    use super::{LinkIssuer, OneTimeLinkError, OneTimeSecretAuth, OneTimeSecretClient};

    async fn share_service() -> Url {
        let app = Router::new().route(
            "/api/v1/share",
            post(
                |headers: HeaderMap, Form(form): Form<HashMap<String, String>>| async move {
                    if !headers.contains_key("authorization") {
                        return Err(StatusCode::UNAUTHORIZED);
                    }
                    let secret_key = format!("key-for-{}", form["secret"].len());
                    Ok(Json(json!({ "secret_key": secret_key, "ttl": 604800 })))
                },
            ),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        Url::parse(&format!("http://{addr}")).unwrap()
    }

    #[tokio::test]
    async fn builds_link_from_share_response() {
        let endpoint = share_service().await;
        let auth = OneTimeSecretAuth {
            user: "ops@example.com".to_string(),
            key: "api-key".to_string(),
        };
        let issuer = OneTimeSecretClient::new(Client::new(), endpoint.clone(), Some(auth));

        let link = issuer.create_link(b"hunter2").await.unwrap();
        assert_eq!(link, format!("{endpoint}secret/key-for-7"));
    }

    #[tokio::test]
    async fn rejected_share_is_an_error() {
        let issuer = OneTimeSecretClient::new(Client::new(), share_service().await, None);
        assert!(matches!(
            issuer.create_link(b"hunter2").await,
            Err(OneTimeLinkError::Rejected(401))
        ));
    }

    #[tokio::test]
    async fn binary_secrets_are_refused() {
        let issuer = OneTimeSecretClient::new(Client::new(), share_service().await, None);
        assert!(matches!(
            issuer.create_link(&[0xff, 0xfe]).await,
            Err(OneTimeLinkError::NotText)
        ));
    }
}
