// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use sextant_metrics::MetricsError;
use thiserror::Error;

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// Malformed prioritize request
    #[error("Invalid prioritize request: {message}")]
    #[diagnostic(
        code(scheduler::invalid_request),
        help("The request must carry NodeNames or Nodes.items with named nodes")
    )]
    InvalidRequest {
        message: String,
    },

    /// Reading outside the normalizer's domain
    #[error("Invalid reading: current={current}, fleet_max={fleet_max}")]
    #[diagnostic(
        code(scheduler::invalid_reading),
        help("Readings must be finite and non-negative. Check the metric query")
    )]
    InvalidReading {
        current: f64,
        fleet_max: f64,
    },

    /// Metric source error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Metrics(#[from] MetricsError),

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(scheduler::internal_error),
        help("This is likely a bug. Please report it")
    )]
    InternalError {
        message: String,
    },
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create an InvalidRequest error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create an InvalidReading error
    pub fn invalid_reading(current: f64, fleet_max: f64) -> Self {
        Self::InvalidReading { current, fleet_max }
    }

    /// Create an InternalError
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Whether the error came from an unreachable or failing backend
    pub fn is_backend_error(&self) -> bool {
        matches!(self, SchedulerError::Metrics(e) if e.is_backend_error())
    }
}
