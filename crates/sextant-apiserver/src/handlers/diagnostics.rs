use crate::response::ApiResponse;
use crate::{ApiError, AppState, Result};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use sextant_core::BandwidthDirection;
use sextant_scheduler::{inspect_fleet, inspect_node};
use std::sync::Arc;
use tracing::info;

/// Upper bound on the nodes one fleet diagnostics request may list
pub const MAX_DIAGNOSTIC_NODES: usize = 256;

/// Query string of `GET /v1/diagnostics`
#[derive(Debug, Default, Deserialize)]
pub struct DiagnosticsQuery {
    /// Comma-separated node names
    pub nodes: Option<String>,
    /// Bandwidth direction to report for each node
    #[serde(alias = "bw_type")]
    pub direction: Option<String>,
}

impl DiagnosticsQuery {
    fn node_names(&self) -> Vec<String> {
        self.nodes
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn direction(&self) -> Result<Option<BandwidthDirection>> {
        self.direction
            .as_deref()
            .map(|d| d.parse::<BandwidthDirection>())
            .transpose()
            .map_err(|e| ApiError::BadRequest(e.to_string()))
    }
}

/// GET /v1/diagnostics
///
/// Fleet maxima of every resource kind, plus the readings of the listed nodes.
pub async fn get_fleet_diagnostics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DiagnosticsQuery>,
) -> Result<Response> {
    let nodes = query.node_names();
    if nodes.len() > MAX_DIAGNOSTIC_NODES {
        return Err(ApiError::BadRequest(format!(
            "{} nodes requested, at most {} can be inspected at once",
            nodes.len(),
            MAX_DIAGNOSTIC_NODES
        )));
    }
    let direction = query.direction()?;

    info!(
        "Collecting fleet diagnostics for {} node(s), bandwidth direction: {:?}",
        nodes.len(),
        direction
    );

    let diagnostics = inspect_fleet(state.prioritizer.scorer(), &nodes, direction).await;

    Ok(ApiResponse::ok(diagnostics).into_response())
}

/// GET /v1/diagnostics/{node}
pub async fn get_diagnostics(
    State(state): State<Arc<AppState>>,
    Path(node): Path<String>,
) -> Result<Response> {
    info!("Collecting diagnostics for node: {}", node);

    let diagnostics = inspect_node(state.prioritizer.scorer(), &node).await;

    Ok(ApiResponse::ok(diagnostics).into_response())
}
