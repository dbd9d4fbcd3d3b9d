//! Sextant Core - Shared types for the Sextant scheduler extender
//!
//! This crate provides:
//! - Resource kinds and validated resource weights
//! - Readings, pressure ratios and node scores
//! - kube-scheduler extender wire types
//! - Error types with miette diagnostics

pub mod error;
pub mod extender;
pub mod resources;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, Result};
pub use extender::{ExtenderArgs, HostPriority, HostPriorityList, NodeList};
pub use resources::{BandwidthDirection, ResourceKind, ResourceWeights};
pub use types::{
    NodeScore, PressureRatio, ResourceReading, MAX_NODE_SCORE, MIN_NODE_SCORE, NEUTRAL_SCORE,
};

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::{Node, Pod};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
