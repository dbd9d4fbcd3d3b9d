use crate::handlers::*;
use crate::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Largest prioritize body accepted by default. Requests that carry full
/// `Nodes.items` descriptors of a large cluster run to tens of megabytes.
pub const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// API server configuration
#[derive(Clone)]
pub struct Config {
    /// Address to listen on
    pub listen_addr: SocketAddr,
    /// Body size limit of the prioritize endpoint
    pub max_body_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8888)),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Scheduler extender HTTP server
pub struct ApiServer {
    config: Config,
    state: Arc<AppState>,
}

impl ApiServer {
    /// Create a new API server
    pub fn new(config: Config, state: Arc<AppState>) -> Self {
        Self { config, state }
    }

    /// Build the router
    pub fn build_router(&self) -> Router {
        router_with_body_limit(self.state.clone(), self.config.max_body_bytes)
    }

    /// Bind the listen address. Errors surface here, before anything is spawned.
    pub async fn bind(&self) -> Result<TcpListener, std::io::Error> {
        TcpListener::bind(self.config.listen_addr).await
    }

    /// Serve on a bound listener until the token is cancelled
    pub async fn serve(
        self,
        listener: TcpListener,
        token: CancellationToken,
    ) -> Result<(), std::io::Error> {
        let app = self.build_router();

        info!("Starting extender server on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(token.cancelled_owned())
            .await
    }
}

/// Routes of the extender with the default body limit
pub fn router(state: Arc<AppState>) -> Router {
    router_with_body_limit(state, DEFAULT_MAX_BODY_BYTES)
}

/// Routes of the extender
pub fn router_with_body_limit(state: Arc<AppState>, max_body_bytes: usize) -> Router {
    Router::new()
        // Health checks
        .route("/ping", get(healthz))
        .route("/healthz", get(healthz))
        // Scheduler extender
        .route(
            "/v1/prioritizeVerb",
            post(prioritize).layer(DefaultBodyLimit::max(max_body_bytes)),
        )
        // Operational inspection
        .route("/v1/diagnostics", get(get_fleet_diagnostics))
        .route("/v1/diagnostics/{node}", get(get_diagnostics))
        // Add tracing and state
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
