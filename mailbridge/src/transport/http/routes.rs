//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::health::Health;
use crate::service::{BridgeService, HealthSnapshot, SubmitError};
use crate::version::VersionInfo;

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: Health,
    pub version: VersionInfo,
    pub in_flight: usize,
}

impl From<HealthSnapshot> for HealthCheckResponse {
    fn from(snapshot: HealthSnapshot) -> Self {
        Self {
            status: snapshot.state,
            version: snapshot.version,
            in_flight: snapshot.in_flight,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

async fn health_check(State(service): State<Arc<BridgeService>>) -> Json<HealthCheckResponse> {
    Json(service.health().await.into())
}

fn error_response(e: SubmitError) -> (StatusCode, Json<serde_json::Value>) {
    let status = match e {
        SubmitError::EmptyMessage => StatusCode::BAD_REQUEST,
        SubmitError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        SubmitError::Failed => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() })))
}

async fn chat(
    State(service): State<Arc<BridgeService>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> impl IntoResponse {
    let message = match body {
        Ok(Json(request)) => request.message.unwrap_or_default(),
        // Unparseable JSON is a server-side failure to read the request.
        Err(JsonRejection::JsonSyntaxError(e)) => {
            tracing::debug!(error = %e, "Unparseable chat body");
            return error_response(SubmitError::Failed);
        }
        // No body, wrong content type, or a non-string message.
        Err(e) => {
            tracing::debug!(error = %e, "Rejected chat body");
            return error_response(SubmitError::EmptyMessage);
        }
    };

    match service.submit(message).await {
        Ok(reply) => (StatusCode::OK, Json(serde_json::json!(reply))),
        Err(e) => error_response(e),
    }
}

async fn shutdown(State(service): State<Arc<BridgeService>>) -> impl IntoResponse {
    tracing::info!("Shutdown requested via HTTP");
    service.trigger_shutdown();
    (StatusCode::OK, Json(serde_json::json!({})))
}

pub fn routes(service: Arc<BridgeService>) -> Router {
    Router::new()
        .route("/health-check", get(health_check))
        .route("/api/chat", post(chat))
        .route("/shutdown", post(shutdown))
        .with_state(service)
}
