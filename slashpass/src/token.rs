use reqwest::{Client, Url};
use slashpass_core::SecretPath;
use thiserror::Error;
use tracing::debug;

use crate::service_url;

/// Failure to turn an insertion token into a storage path.
///
/// Carries the token service's status when it answered at all. Whether this is a client error
/// or a missing page depends on what the caller intended to do with the token.
#[derive(Debug, Error)]
#[error("unable to resolve insertion token: {reason}")]
pub struct TokenError {
    pub status: Option<u16>,
    pub reason: String,
}

impl TokenError {
    fn new(status: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
        }
    }
}

/// Resolves the short-lived tokens minted by the chat frontend (`<slack_server>/t/{token}`).
#[derive(Debug, Clone)]
pub struct TokenResolver {
    client: Client,
    base: Url,
}

impl TokenResolver {
    /// Requests are bounded by the timeout configured on `client`.
    pub fn new(client: Client, base: Url) -> Self {
        Self { client, base }
    }

    pub async fn resolve(&self, token: &str) -> Result<SecretPath, TokenError> {
        let url = service_url(&self.base, &["t", token])
            .ok_or_else(|| TokenError::new(None, format!("{} is not a base url", self.base)))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| TokenError::new(None, err.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(TokenError::new(
                Some(status.as_u16()),
                format!("token service answered with status {status}"),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|err| TokenError::new(Some(status.as_u16()), err.to_string()))?;
        let path: SecretPath = body
            .trim()
            .parse()
            .map_err(|err| TokenError::new(Some(status.as_u16()), format!("{err}")))?;

        debug!(%path, "resolved insertion token");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use reqwest::{Client, Url};
    use tokio::net::TcpListener;

    use super::TokenResolver;

    async fn token_service() -> Url {
        let app = Router::new().route(
            "/t/{token}",
            get(|Path(token): Path<String>| async move {
                match token.as_str() {
                    "valid" => (StatusCode::OK, "ABC123/aws/prod/root\n".to_string()),
                    "flat" => (StatusCode::OK, "loose".to_string()),
                    _ => (StatusCode::NOT_FOUND, "unknown token".to_string()),
                }
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        Url::parse(&format!("http://{addr}/")).unwrap()
    }

    #[tokio::test]
    async fn resolves_trimmed_path() {
        let resolver = TokenResolver::new(Client::new(), token_service().await);

        let path = resolver.resolve("valid").await.unwrap();
        assert_eq!(path.channel(), "ABC123");
        assert_eq!(path.app(), "aws/prod/root");
    }

    #[tokio::test]
    async fn rejected_token_keeps_status() {
        let resolver = TokenResolver::new(Client::new(), token_service().await);

        let err = resolver.resolve("expired").await.unwrap_err();
        assert_eq!(err.status, Some(404));
    }

    #[tokio::test]
    async fn path_without_channel_is_rejected() {
        let resolver = TokenResolver::new(Client::new(), token_service().await);
        assert!(resolver.resolve("flat").await.is_err());
    }

    #[tokio::test]
    async fn transport_failure_has_no_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let base = Url::parse(&format!("http://{addr}")).unwrap();
        let err = TokenResolver::new(Client::new(), base)
            .resolve("valid")
            .await
            .unwrap_err();
        assert_eq!(err.status, None);
    }
}
