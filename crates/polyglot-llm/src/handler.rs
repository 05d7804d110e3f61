//! Axum routes for the translation gateway

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;

use crate::gateway::{Gateway, GatewayReply, error_reply};
use crate::routes::ConfigResolver;

/// Shared state for gateway handlers
#[derive(Clone)]
pub struct GatewayState {
    gateway: Arc<Gateway>,
    resolver: Arc<dyn ConfigResolver>,
}

impl GatewayState {
    pub fn new(gateway: Gateway, resolver: Arc<dyn ConfigResolver>) -> Self {
        Self {
            gateway: Arc::new(gateway),
            resolver,
        }
    }
}

/// Build the gateway router
///
/// `POST {prefix}/{token}/{*path}` translates a call; `GET /api/protocols`
/// lists the supported protocols.
pub fn gateway_router(state: GatewayState, path_prefix: &str) -> Router {
    let prefix = path_prefix.trim_end_matches('/');

    Router::new()
        .route(&format!("{prefix}/{{token}}"), routing::post(proxy_root))
        .route(&format!("{prefix}/{{token}}/{{*path}}"), routing::post(proxy))
        .route("/api/protocols", routing::get(list_protocols))
        .with_state(state)
}

/// Handle `POST {prefix}/{token}`
async fn proxy_root(
    State(state): State<GatewayState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    serve(&state, &token, "/", &headers, &body).await
}

/// Handle `POST {prefix}/{token}/{*path}`
async fn proxy(
    State(state): State<GatewayState>,
    Path((token, path)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    serve(&state, &token, &format!("/{path}"), &headers, &body).await
}

async fn serve(state: &GatewayState, token: &str, path: &str, headers: &HeaderMap, body: &[u8]) -> Response {
    let config = match state.resolver.resolve(token).await {
        Ok(config) => config,
        Err(e) => {
            // No route yet, so answer in whatever protocol the request looks like
            let source = state.gateway.registry().detect(headers, path);
            return error_reply(&e, source.as_deref()).into_response();
        }
    };

    state.gateway.handle(&config, headers, path, body).await.into_response()
}

impl IntoResponse for GatewayReply {
    fn into_response(self) -> Response {
        match self {
            Self::Json { status, body } => (status, Json(body)).into_response(),
            Self::Passthrough { status, body } => {
                (status, [(CONTENT_TYPE, HeaderValue::from_static("application/json"))], body).into_response()
            }
            Self::Stream { content_type, body } => (
                [
                    ("content-type", content_type),
                    ("cache-control", "no-cache"),
                    ("x-accel-buffering", "no"),
                ],
                Body::from_stream(body),
            )
                .into_response(),
        }
    }
}

/// Catalogue entry for `GET /api/protocols`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProtocolInfo {
    id: String,
    name: &'static str,
    auth_type: &'static str,
    default_url: &'static str,
}

/// Handle `GET /api/protocols`
async fn list_protocols(State(state): State<GatewayState>) -> Json<Vec<ProtocolInfo>> {
    let protocols = state
        .gateway
        .registry()
        .protocols()
        .into_iter()
        .map(|id| ProtocolInfo {
            id: id.to_string(),
            name: id.display_name(),
            auth_type: id.default_auth_type(),
            default_url: id.default_base_url(),
        })
        .collect();

    Json(protocols)
}
