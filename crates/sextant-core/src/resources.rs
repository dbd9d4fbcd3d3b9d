use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Tolerance when checking that weights sum to 1.0
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// A class of node resource whose pressure is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Network bandwidth (bytes/s received + transmitted)
    Network,
    /// Disk I/O throughput (bytes/s read + written)
    Disk,
    /// CPU utilization
    Cpu,
    /// Memory utilization
    Memory,
}

impl ResourceKind {
    /// Every resource kind, in scoring order
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Network,
        ResourceKind::Disk,
        ResourceKind::Cpu,
        ResourceKind::Memory,
    ];

    /// Wire name of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Network => "network",
            ResourceKind::Disk => "disk",
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "network" | "net" | "netbw" => Ok(ResourceKind::Network),
            "disk" | "diskio" => Ok(ResourceKind::Disk),
            "cpu" => Ok(ResourceKind::Cpu),
            "memory" | "mem" => Ok(ResourceKind::Memory),
            _ => Err(CoreError::unknown_resource_kind(s)),
        }
    }
}

/// Direction of network traffic for bandwidth inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandwidthDirection {
    /// Bytes received
    Receive,
    /// Bytes transmitted
    Transmit,
    /// Received plus transmitted, as used for scoring
    Both,
}

impl BandwidthDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            BandwidthDirection::Receive => "receive",
            BandwidthDirection::Transmit => "transmit",
            BandwidthDirection::Both => "both",
        }
    }
}

impl fmt::Display for BandwidthDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BandwidthDirection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "receive" | "rx" | "in" => Ok(BandwidthDirection::Receive),
            "transmit" | "tx" | "out" => Ok(BandwidthDirection::Transmit),
            "both" | "total" => Ok(BandwidthDirection::Both),
            _ => Err(CoreError::unknown_bandwidth_direction(s)),
        }
    }
}

/// Relative importance of each resource kind when aggregating pressure.
///
/// Weights are validated on construction: each lies within `[0, 1]` and the
/// total is 1.0 (within [`WEIGHT_SUM_TOLERANCE`]). Kinds absent from the map
/// carry weight zero and are not scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<ResourceKind, f64>", into = "BTreeMap<ResourceKind, f64>")]
pub struct ResourceWeights {
    weights: BTreeMap<ResourceKind, f64>,
}

impl ResourceWeights {
    /// Build validated weights from a mapping
    pub fn new(weights: BTreeMap<ResourceKind, f64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(CoreError::invalid_weights("no resource kinds configured"));
        }

        for (kind, weight) in &weights {
            if !weight.is_finite() || *weight < 0.0 || *weight > 1.0 {
                return Err(CoreError::invalid_weights(format!(
                    "weight for {} is {}, expected a value within [0, 1]",
                    kind, weight
                )));
            }
        }

        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(CoreError::invalid_weights(format!(
                "weights sum to {}, expected 1.0",
                sum
            )));
        }

        Ok(Self { weights })
    }

    /// Equal weights over the given kinds
    pub fn equal(kinds: &[ResourceKind]) -> Result<Self> {
        if kinds.is_empty() {
            return Err(CoreError::invalid_weights("no resource kinds configured"));
        }
        let share = 1.0 / kinds.len() as f64;
        Self::new(kinds.iter().map(|k| (*k, share)).collect())
    }

    /// Weight of a single kind (zero if not configured)
    pub fn weight(&self, kind: ResourceKind) -> f64 {
        self.weights.get(&kind).copied().unwrap_or(0.0)
    }

    /// Kinds that contribute to the score (non-zero weight)
    pub fn kinds(&self) -> Vec<ResourceKind> {
        self.weights
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|(k, _)| *k)
            .collect()
    }

    /// Iterate over all configured (kind, weight) pairs
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, f64)> + '_ {
        self.weights.iter().map(|(k, w)| (*k, *w))
    }
}

impl Default for ResourceWeights {
    fn default() -> Self {
        Self {
            weights: ResourceKind::ALL.iter().map(|k| (*k, 0.25)).collect(),
        }
    }
}

impl TryFrom<BTreeMap<ResourceKind, f64>> for ResourceWeights {
    type Error = CoreError;

    fn try_from(weights: BTreeMap<ResourceKind, f64>) -> Result<Self> {
        Self::new(weights)
    }
}

impl From<ResourceWeights> for BTreeMap<ResourceKind, f64> {
    fn from(weights: ResourceWeights) -> Self {
        weights.weights
    }
}
