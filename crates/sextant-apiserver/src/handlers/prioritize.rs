use crate::response::ApiResponse;
use crate::{AppState, Result};
use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use sextant_core::ExtenderArgs;
use std::sync::Arc;
use tracing::trace;

/// POST /v1/prioritizeVerb
///
/// The body is parsed by hand rather than through the `Json` extractor so a
/// malformed or oversized payload comes back as a `Status` object like every
/// other error.
pub async fn prioritize(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Bytes, BytesRejection>,
) -> Result<Response> {
    let body = body?;
    trace!("Prioritize args: {}", String::from_utf8_lossy(&body));

    let args: ExtenderArgs = serde_json::from_slice(&body)?;

    let result = state.prioritizer.prioritize(&args).await?;

    Ok(ApiResponse::ok(result.priorities).into_response())
}
