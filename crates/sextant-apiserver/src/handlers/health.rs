use crate::response::ApiResponse;
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

/// Body of the health endpoints
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub backend: String,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// GET /ping and /healthz
///
/// 503 when the metrics backend does not answer its ping or has failed for
/// several consecutive prioritize requests.
pub async fn healthz(State(state): State<Arc<AppState>>) -> Response {
    let source = state.source();
    let degraded = state.prioritizer.health().is_degraded();

    let (status, message) = match source.ping().await {
        Ok(()) if degraded => (
            StatusCode::SERVICE_UNAVAILABLE,
            Some("sustained backend errors while scoring".to_string()),
        ),
        Ok(()) => (StatusCode::OK, None),
        Err(e) => {
            error!("ping error: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Some(e.to_string()))
        }
    };

    let body = HealthStatus {
        status: if status == StatusCode::OK { "ok" } else { "unavailable" },
        backend: source.name().to_string(),
        degraded,
        message,
    };

    ApiResponse::with_status(status, body).into_response()
}
