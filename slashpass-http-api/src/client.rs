use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};

use crate::api::{
    ApiError, ApiResult, HTTP_HEALTH_ROUTE, HTTP_INSERT_ROUTE, HTTP_LIST_ROUTE,
    HTTP_ONETIME_LINK_ROUTE, HTTP_PUBLIC_KEY_ROUTE, HTTP_REMOVE_ROUTE, HTTP_STATS_ROUTE,
    SlashpassApi,
};
use crate::status::{HealthStatus, InsertionTarget, Stats};

/// HTTP client for a running relay.
pub struct SlashpassApiClient {
    endpoint: String,
    client: Client,
}

impl SlashpassApiClient {
    pub fn new(endpoint: String) -> SlashpassApiClient {
        SlashpassApiClient {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.endpoint, route)
    }

    /// Appends a single, percent-encoded path segment to a route.
    fn url_with_segment(&self, route: &str, segment: &str) -> ApiResult<Url> {
        let mut url =
            Url::parse(&self.url(route)).map_err(|err| ApiError::Internal(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| ApiError::Internal(format!("{} is not a base url", self.endpoint)))?
            .push(segment);
        Ok(url)
    }

    async fn send(request: RequestBuilder) -> ApiResult<Response> {
        let response = request.send().await.map_err(internal)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status.as_u16(), message))
    }

    async fn bytes(request: RequestBuilder) -> ApiResult<Vec<u8>> {
        let response = SlashpassApiClient::send(request).await?;
        Ok(response.bytes().await.map_err(internal)?.to_vec())
    }

    async fn text(request: RequestBuilder) -> ApiResult<String> {
        let response = SlashpassApiClient::send(request).await?;
        response.text().await.map_err(internal)
    }
}

fn internal(error: reqwest::Error) -> ApiError {
    ApiError::Internal(error.to_string())
}

#[async_trait]
impl SlashpassApi for SlashpassApiClient {
    async fn health(&self) -> ApiResult<HealthStatus> {
        let request = self.client.get(self.url(HTTP_HEALTH_ROUTE));
        let response = request.send().await.map_err(internal)?;
        response.json::<HealthStatus>().await.map_err(internal)
    }

    async fn stats(&self) -> ApiResult<Stats> {
        let request = self.client.get(self.url(HTTP_STATS_ROUTE));
        let response = SlashpassApiClient::send(request).await?;
        response.json::<Stats>().await.map_err(internal)
    }

    async fn public_key(&self) -> ApiResult<String> {
        SlashpassApiClient::text(self.client.get(self.url(HTTP_PUBLIC_KEY_ROUTE))).await
    }

    async fn onetime_link(&self, secret: Option<String>) -> ApiResult<Vec<u8>> {
        let form: Vec<(&str, String)> = secret.into_iter().map(|s| ("secret", s)).collect();
        let request = self
            .client
            .post(self.url(HTTP_ONETIME_LINK_ROUTE))
            .form(&form);
        SlashpassApiClient::bytes(request).await
    }

    async fn list_secrets(&self, prefix: String) -> ApiResult<Vec<u8>> {
        let request = if prefix.is_empty() {
            self.client.post(self.url(HTTP_LIST_ROUTE))
        } else {
            self.client
                .post(self.url_with_segment(HTTP_LIST_ROUTE, &prefix)?)
        };
        SlashpassApiClient::bytes(request).await
    }

    async fn insertion_target(&self, token: String) -> ApiResult<InsertionTarget> {
        let url = self.url_with_segment(HTTP_INSERT_ROUTE, &token)?;
        let response = SlashpassApiClient::send(self.client.get(url)).await?;
        response.json::<InsertionTarget>().await.map_err(internal)
    }

    async fn insert_secret(
        &self,
        token: String,
        secret: String,
        encrypted: bool,
    ) -> ApiResult<()> {
        let mut form = vec![("secret", secret)];
        if encrypted {
            form.push(("encrypted", "true".to_string()));
        }
        let url = self.url_with_segment(HTTP_INSERT_ROUTE, &token)?;
        SlashpassApiClient::text(self.client.post(url).form(&form)).await?;
        Ok(())
    }

    async fn remove_secret(&self, channel: String, app: String) -> ApiResult<()> {
        let form = [("channel", channel), ("app", app)];
        let request = self.client.post(self.url(HTTP_REMOVE_ROUTE)).form(&form);
        SlashpassApiClient::text(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::SlashpassApiClient;
    use crate::api::{ApiError, HTTP_INSERT_ROUTE, HTTP_LIST_ROUTE};

    #[test]
    fn segments_are_percent_encoded() {
        let client = SlashpassApiClient::new("http://127.0.0.1:8090/".to_string());

        let url = client
            .url_with_segment(HTTP_LIST_ROUTE, "ABC123/aws root")
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8090/list/ABC123%2Faws%20root");

        let url = client.url_with_segment(HTTP_INSERT_ROUTE, "token").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8090/insert/token");
    }

    #[test]
    fn unparsable_endpoint_is_internal_error() {
        let client = SlashpassApiClient::new("not a url".to_string());
        assert!(matches!(
            client.url_with_segment(HTTP_LIST_ROUTE, "ABC123"),
            Err(ApiError::Internal(_))
        ));
    }
}
