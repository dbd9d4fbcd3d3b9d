use crate::resources::ResourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lowest score a node can receive
pub const MIN_NODE_SCORE: i64 = 0;

/// Highest score a node can receive (Kubernetes extender convention)
pub const MAX_NODE_SCORE: i64 = 100;

/// Score assigned when a node cannot be measured.
///
/// The midpoint of the score range: an unmeasured node is neither preferred
/// nor avoided relative to a node at half pressure.
pub const NEUTRAL_SCORE: i64 = 50;

/// A point-in-time utilization reading for one node and resource kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceReading {
    /// Resource kind
    pub kind: ResourceKind,
    /// Node the reading belongs to
    pub node: String,
    /// Current value on the node
    pub current: f64,
    /// Highest value of this kind across the fleet (0 means no data)
    pub fleet_max: f64,
    /// When the reading was sampled
    pub timestamp: DateTime<Utc>,
}

impl ResourceReading {
    /// Create a reading sampled now
    pub fn new(kind: ResourceKind, node: impl Into<String>, current: f64, fleet_max: f64) -> Self {
        Self {
            kind,
            node: node.into(),
            current,
            fleet_max,
            timestamp: Utc::now(),
        }
    }

    /// Override the sample timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Normalized utilization of a resource on a node.
///
/// `Unknown` is distinct from `Idle`: a resource nobody measured must never
/// look like a resource with no load.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureRatio {
    /// Measured, no load
    Idle,
    /// Measured load ratio in (0, 1]
    Loaded(f64),
    /// Not measurable (no fleet maximum or invalid reading)
    Unknown,
}

impl PressureRatio {
    /// Numeric ratio, or None when unknown
    pub fn value(&self) -> Option<f64> {
        match self {
            PressureRatio::Idle => Some(0.0),
            PressureRatio::Loaded(r) => Some(*r),
            PressureRatio::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, PressureRatio::Unknown)
    }
}

impl fmt::Display for PressureRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PressureRatio::Idle => write!(f, "0.000"),
            PressureRatio::Loaded(r) => write!(f, "{:.3}", r),
            PressureRatio::Unknown => write!(f, "unknown"),
        }
    }
}

/// Score of a single candidate node for one prioritize request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeScore {
    /// Node name
    pub node_name: String,
    /// Score in [MIN_NODE_SCORE, MAX_NODE_SCORE], higher is better
    pub score: i64,
    /// Pressure ratios that went into the score
    pub ratios: BTreeMap<ResourceKind, PressureRatio>,
    /// Number of resource kinds whose fetch hit a backend error
    pub backend_errors: usize,
    /// Whether the score is the neutral fallback rather than a measurement
    pub fallback: bool,
}

impl NodeScore {
    /// Create a measured score
    pub fn new(
        node_name: impl Into<String>,
        score: i64,
        ratios: BTreeMap<ResourceKind, PressureRatio>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            score: score.clamp(MIN_NODE_SCORE, MAX_NODE_SCORE),
            ratios,
            backend_errors: 0,
            fallback: false,
        }
    }

    /// Create a fallback score carrying no measurements
    pub fn neutral(node_name: impl Into<String>, neutral_score: i64) -> Self {
        Self {
            node_name: node_name.into(),
            score: neutral_score.clamp(MIN_NODE_SCORE, MAX_NODE_SCORE),
            ratios: BTreeMap::new(),
            backend_errors: 0,
            fallback: true,
        }
    }

    /// Record how many backend errors were seen while scoring
    pub fn with_backend_errors(mut self, backend_errors: usize) -> Self {
        self.backend_errors = backend_errors;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pressure_ratio_value() {
        assert_eq!(PressureRatio::Idle.value(), Some(0.0));
        assert_eq!(PressureRatio::Loaded(0.5).value(), Some(0.5));
        assert_eq!(PressureRatio::Unknown.value(), None);
        assert!(PressureRatio::Unknown.is_unknown());
        assert!(!PressureRatio::Idle.is_unknown());
    }

    #[test]
    fn test_node_score_clamped() {
        let score = NodeScore::new("node1", 140, BTreeMap::new());
        assert_eq!(score.score, MAX_NODE_SCORE);
        assert!(!score.fallback);

        let neutral = NodeScore::neutral("node2", NEUTRAL_SCORE);
        assert_eq!(neutral.score, NEUTRAL_SCORE);
        assert!(neutral.fallback);
        assert!(neutral.ratios.is_empty());
    }
}
