use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::{Form, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, warn};

use crate::api::{
    ApiError, HTTP_HEALTH_ROUTE, HTTP_INSERT_ROUTE, HTTP_LIST_ROUTE, HTTP_ONETIME_LINK_ROUTE,
    HTTP_PUBLIC_KEY_ROUTE, HTTP_REMOVE_ROUTE, HTTP_STATS_ROUTE, SlashpassApi,
};
use crate::status::HealthStatus;

/// `SlashpassHTTPServer` serves a [`SlashpassApi`] implementation over HTTP.
///
/// The listener is bound in [`SlashpassHTTPServer::bind`], so the port accepts connections as
/// soon as that returns, while [`SlashpassHTTPServer::run`] drives the server until it fails.
pub struct SlashpassHTTPServer {
    listener: TcpListener,
    api: Arc<dyn SlashpassApi>,
}

impl SlashpassHTTPServer {
    pub async fn bind(port: u16, api: Arc<dyn SlashpassApi>) -> std::io::Result<Self> {
        let listener =
            TcpListener::bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)).await?;
        debug!("HTTP endpoint listening on {}", listener.local_addr()?);
        Ok(SlashpassHTTPServer { listener, api })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> std::io::Result<()> {
        let state = ServerState { api: self.api };
        axum::serve(self.listener, router(state)).await
    }
}

fn router(state: ServerState) -> Router {
    Router::new()
        .route(HTTP_HEALTH_ROUTE, get(health))
        .route(HTTP_STATS_ROUTE, get(stats))
        .route(HTTP_PUBLIC_KEY_ROUTE, get(public_key))
        .route(HTTP_ONETIME_LINK_ROUTE, post(onetime_link))
        .route(HTTP_LIST_ROUTE, post(list_all))
        .route(&format!("{HTTP_LIST_ROUTE}/{{prefix}}"), post(list_prefix))
        .route(
            &format!("{HTTP_INSERT_ROUTE}/{{token}}"),
            get(insertion_target).post(insert_secret),
        )
        .route(HTTP_REMOVE_ROUTE, post(remove_secret))
        .with_state(state)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            warn!("request failed: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

#[derive(Clone)]
pub struct ServerState {
    pub api: Arc<dyn SlashpassApi>,
}

#[derive(Debug, Deserialize)]
pub struct OnetimeLinkForm {
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InsertForm {
    pub secret: String,
    /// Set by the insertion page when the secret was encrypted in the browser, the value
    /// itself is irrelevant.
    pub encrypted: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RemoveForm {
    pub channel: String,
    pub app: String,
}

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    state
        .api
        .health()
        .await
        .map(|result| (StatusCode::OK, Json(result)))
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(Into::<HealthStatus>::into(e)),
            )
        })
}

async fn stats(State(state): State<ServerState>) -> impl IntoResponse {
    state.api.stats().await.map(Json)
}

async fn public_key(State(state): State<ServerState>) -> impl IntoResponse {
    state.api.public_key().await
}

async fn onetime_link(
    State(state): State<ServerState>,
    Form(form): Form<OnetimeLinkForm>,
) -> impl IntoResponse {
    state.api.onetime_link(form.secret).await
}

async fn list_all(State(state): State<ServerState>) -> impl IntoResponse {
    state.api.list_secrets(String::new()).await
}

async fn list_prefix(
    State(state): State<ServerState>,
    Path(prefix): Path<String>,
) -> impl IntoResponse {
    state.api.list_secrets(prefix).await
}

async fn insertion_target(
    State(state): State<ServerState>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    state.api.insertion_target(token).await.map(Json)
}

async fn insert_secret(
    State(state): State<ServerState>,
    Path(token): Path<String>,
    Form(form): Form<InsertForm>,
) -> impl IntoResponse {
    state
        .api
        .insert_secret(token, form.secret, form.encrypted.is_some())
        .await
        .map(|()| "ok")
}

async fn remove_secret(
    State(state): State<ServerState>,
    Form(form): Form<RemoveForm>,
) -> impl IntoResponse {
    state
        .api
        .remove_secret(form.channel, form.app)
        .await
        .map(|()| "ok")
}
