//! HTTP front — authenticated outbound notify endpoint and liveness probe.
//!
//! Stateless besides the shared read-only [`AppState`]; completely
//! independent of the inbound poll loop.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::transport::Transport;

/// Shared state for the HTTP front. Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub transport: Arc<dyn Transport>,
    pub gateway_token: SecretString,
}

/// Request body for `POST /notify`. Fields are optional so validation can
/// answer 400 instead of a deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    to: Option<String>,
    message: Option<String>,
    attachments: Option<Vec<String>>,
}

/// Build the relay's routes.
pub fn relay_routes(state: AppState) -> Router {
    Router::new()
        .route("/notify", post(notify))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /healthz — liveness only, no dependency checks.
async fn healthz() -> &'static str {
    "ok"
}

/// POST /notify — bearer-authenticated passthrough to the backend send API.
///
/// The backend's status, body, and content type are relayed verbatim.
async fn notify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<NotifyRequest>,
) -> Response {
    if !is_authorized(&headers, &state.gateway_token) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({"error": "unauthorized"})),
        )
            .into_response();
    }

    let to = req.to.as_deref().unwrap_or_default();
    let message = req.message.as_deref().unwrap_or_default();
    if to.is_empty() || message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "missing to/message"})),
        )
            .into_response();
    }

    match state
        .transport
        .send(to, message, req.attachments.as_deref())
        .await
    {
        Ok(outcome) => {
            let status =
                StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let content_type = outcome
                .content_type
                .unwrap_or_else(|| "application/json".to_string());
            (status, [(header::CONTENT_TYPE, content_type)], outcome.body).into_response()
        }
        Err(e) => {
            tracing::error!("Backend send failed: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": "backend unreachable"})),
            )
                .into_response()
        }
    }
}

fn is_authorized(headers: &HeaderMap, token: &SecretString) -> bool {
    let expected = format!("Bearer {}", token.expose_secret());
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|presented| presented == expected)
}
