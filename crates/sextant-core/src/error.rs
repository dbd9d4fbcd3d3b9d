// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for Sextant types and configuration
#[derive(Error, Debug, Diagnostic)]
pub enum CoreError {
    /// Unknown resource kind name
    #[error("Unknown resource kind: {value}")]
    #[diagnostic(
        code(sextant::unknown_resource_kind),
        help("Valid resource kinds are: network, disk, cpu, memory")
    )]
    UnknownResourceKind {
        #[allow(unused)]
        value: String,
    },

    /// Unknown bandwidth direction name
    #[error("Unknown bandwidth direction: {value}")]
    #[diagnostic(
        code(sextant::unknown_bandwidth_direction),
        help("Valid directions are: receive, transmit, both")
    )]
    UnknownBandwidthDirection {
        #[allow(unused)]
        value: String,
    },

    /// Resource weights do not form a valid distribution
    #[error("Invalid resource weights: {reason}")]
    #[diagnostic(
        code(sextant::invalid_weights),
        help("Every weight must be within [0, 1] and all weights must sum to 1.0")
    )]
    InvalidWeights {
        #[allow(unused)]
        reason: String,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(sextant::invalid_config), help("{suggestion}"))]
    InvalidConfig {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create an UnknownResourceKind error
    pub fn unknown_resource_kind(value: impl Into<String>) -> Self {
        Self::UnknownResourceKind {
            value: value.into(),
        }
    }

    /// Create an UnknownBandwidthDirection error
    pub fn unknown_bandwidth_direction(value: impl Into<String>) -> Self {
        Self::UnknownBandwidthDirection {
            value: value.into(),
        }
    }

    /// Create an InvalidWeights error
    pub fn invalid_weights(reason: impl Into<String>) -> Self {
        Self::InvalidWeights {
            reason: reason.into(),
        }
    }

    /// Create an InvalidConfig error
    pub fn invalid_config(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::unknown_resource_kind("gpu");
        assert_eq!(err.to_string(), "Unknown resource kind: gpu");

        let err = CoreError::invalid_weights("sum is 0.9");
        assert!(err.to_string().contains("sum is 0.9"));

        let err = CoreError::invalid_config("neutral score out of range", "Use 0-100");
        assert!(matches!(err, CoreError::InvalidConfig { .. }));
    }
}
