// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

//! Sextant Metrics - Utilization readings from a metrics backend
//!
//! This crate provides:
//! - The `MetricSource` trait consumed by the node scorer
//! - A Prometheus HTTP API implementation
//! - An in-memory mock for tests

pub mod error;
pub mod mock;
pub mod prometheus;
pub mod traits;

// Re-export primary types
pub use error::{MetricsError, Result};
pub use mock::MockMetricSource;
pub use prometheus::{
    BandwidthQueries, PrometheusConfig, PrometheusSource, QueryTemplate, QueryTemplates,
};
pub use traits::{MetricSource, Sample};
