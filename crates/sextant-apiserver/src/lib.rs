//! Sextant API Server - kube-scheduler extender HTTP endpoints
//!
//! This crate provides:
//! - Axum-based HTTP server
//! - The prioritize verb of the scheduler extender protocol
//! - Health and diagnostics endpoints

pub mod error;
pub mod handlers;
pub mod response;
pub mod server;
pub mod state;

// Re-export commonly used types
pub use error::{ApiError, Result};
pub use server::{router, router_with_body_limit, ApiServer, Config, DEFAULT_MAX_BODY_BYTES};
pub use state::AppState;
