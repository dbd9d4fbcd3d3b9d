use crate::error::{MetricsError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sextant_core::{BandwidthDirection, ResourceKind, ResourceReading};

/// A single value returned by the backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(value: f64, timestamp: DateTime<Utc>) -> Self {
        Self { value, timestamp }
    }

    /// Sample taken now
    pub fn now(value: f64) -> Self {
        Self::new(value, Utc::now())
    }
}

/// Trait for metrics backends that supply node utilization readings
///
/// Implementations must be safe to share across concurrent requests and must
/// bound every call with a timeout: `current` sits on the critical path of a
/// scheduling decision. The fleet maximum of a kind does not depend on the
/// node, so callers query it once per request. `MockMetricSource` backs the
/// tests.
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Current value of `kind` on `node`
    async fn current(&self, kind: ResourceKind, node: &str) -> Result<Sample>;

    /// Highest value of `kind` across the fleet
    async fn fleet_max(&self, kind: ResourceKind) -> Result<Sample>;

    /// Network bandwidth of `node` in one direction.
    ///
    /// Sources without per-direction data only answer `Both`.
    async fn bandwidth(&self, node: &str, direction: BandwidthDirection) -> Result<Sample> {
        match direction {
            BandwidthDirection::Both => self.current(ResourceKind::Network, node).await,
            _ => Err(MetricsError::metric_unavailable(
                ResourceKind::Network,
                node,
                format!("{} bandwidth is not supported by {}", direction, self.name()),
            )),
        }
    }

    /// Current value and fleet maximum of `kind` in one reading
    async fn fetch(&self, kind: ResourceKind, node: &str) -> Result<ResourceReading> {
        let (current, fleet_max) = tokio::try_join!(self.current(kind, node), self.fleet_max(kind))?;
        Ok(
            ResourceReading::new(kind, node, current.value, fleet_max.value)
                .with_timestamp(current.timestamp),
        )
    }

    /// Lightweight reachability check of the backend
    async fn ping(&self) -> Result<()>;

    /// Name of the source, for logs and health output
    fn name(&self) -> &str;
}
