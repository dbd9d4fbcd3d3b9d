use miette::Diagnostic;
use sextant_core::ResourceKind;
use thiserror::Error;

/// Errors raised while reading utilization from a metrics backend
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum MetricsError {
    /// Backend answered but has no usable data for this node and kind
    #[error("Metric {kind} unavailable for node {node}: {reason}")]
    #[diagnostic(
        code(sextant::metrics::metric_unavailable),
        help("Check that the node exporter on '{node}' is scraped and that the query for '{kind}' matches its labels")
    )]
    MetricUnavailable {
        #[allow(unused)]
        kind: ResourceKind,
        #[allow(unused)]
        node: String,
        #[allow(unused)]
        reason: String,
    },

    /// Backend unreachable or returned a malformed/error response
    #[error("Metrics backend error: {message}")]
    #[diagnostic(
        code(sextant::metrics::backend_error),
        help("Verify the metrics backend URL and that the backend is up")
    )]
    BackendError {
        #[allow(unused)]
        message: String,
    },

    /// Invalid source configuration
    #[error("Invalid metrics source configuration: {message}")]
    #[diagnostic(code(sextant::metrics::invalid_config), help("{suggestion}"))]
    InvalidConfig {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },
}

/// Result type alias for metric source operations
pub type Result<T> = std::result::Result<T, MetricsError>;

impl MetricsError {
    pub fn metric_unavailable(
        kind: ResourceKind,
        node: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MetricUnavailable {
            kind,
            node: node.into(),
            reason: reason.into(),
        }
    }

    pub fn backend_error(message: impl Into<String>) -> Self {
        Self::BackendError {
            message: message.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Whether the error means the backend itself is failing
    pub fn is_backend_error(&self) -> bool {
        matches!(self, MetricsError::BackendError { .. })
    }
}
