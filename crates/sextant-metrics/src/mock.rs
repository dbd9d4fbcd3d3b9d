use crate::error::{MetricsError, Result};
use crate::traits::{MetricSource, Sample};
use async_trait::async_trait;
use sextant_core::{BandwidthDirection, ResourceKind};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// In-memory metric source for tests and local development
///
/// Readings are set per (kind, node). The fleet maximum of a kind is the
/// largest maximum recorded for it. Nodes can be marked unreachable (every
/// per-node query fails with a backend error) or given an artificial latency.
/// Lookups with no entry fail with `MetricUnavailable`.
pub struct MockMetricSource {
    readings: Arc<RwLock<HashMap<(ResourceKind, String), (f64, f64)>>>,
    bandwidth: Arc<RwLock<HashMap<String, (f64, f64)>>>,
    unreachable: Arc<RwLock<HashSet<String>>>,
    latency: Arc<RwLock<HashMap<String, Duration>>>,
    healthy: AtomicBool,
    fetches: AtomicUsize,
    fleet_queries: AtomicUsize,
}

impl MockMetricSource {
    pub fn new() -> Self {
        Self {
            readings: Arc::new(RwLock::new(HashMap::new())),
            bandwidth: Arc::new(RwLock::new(HashMap::new())),
            unreachable: Arc::new(RwLock::new(HashSet::new())),
            latency: Arc::new(RwLock::new(HashMap::new())),
            healthy: AtomicBool::new(true),
            fetches: AtomicUsize::new(0),
            fleet_queries: AtomicUsize::new(0),
        }
    }

    /// Set the current value and fleet maximum of `kind` on `node`
    pub async fn set_reading(&self, kind: ResourceKind, node: &str, current: f64, fleet_max: f64) {
        self.readings
            .write()
            .await
            .insert((kind, node.to_string()), (current, fleet_max));
    }

    /// Set the same reading for every resource kind of `node`
    pub async fn set_all(&self, node: &str, current: f64, fleet_max: f64) {
        for kind in ResourceKind::ALL {
            self.set_reading(kind, node, current, fleet_max).await;
        }
    }

    /// Set received and transmitted bandwidth of `node`
    pub async fn set_bandwidth(&self, node: &str, receive: f64, transmit: f64) {
        self.bandwidth
            .write()
            .await
            .insert(node.to_string(), (receive, transmit));
    }

    /// Make every fetch for `node` fail with a backend error
    pub async fn set_unreachable(&self, node: &str) {
        self.unreachable.write().await.insert(node.to_string());
    }

    /// Delay every fetch for `node`
    pub async fn set_latency(&self, node: &str, latency: Duration) {
        self.latency.write().await.insert(node.to_string(), latency);
    }

    /// Control the outcome of `ping`
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Number of per-node queries served so far
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of fleet maximum queries served so far
    pub fn fleet_query_count(&self) -> usize {
        self.fleet_queries.load(Ordering::SeqCst)
    }

    /// Count the query, apply latency and fail for unreachable nodes
    async fn enter(&self, node: &str) -> Result<()> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        // Copy out before sleeping: no lock is held across the wait
        let latency = self.latency.read().await.get(node).copied();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.unreachable.read().await.contains(node) {
            debug!("Mock: backend unreachable for node {}", node);
            return Err(MetricsError::backend_error(format!(
                "connection refused while querying {}",
                node
            )));
        }
        Ok(())
    }
}

impl Default for MockMetricSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricSource for MockMetricSource {
    async fn current(&self, kind: ResourceKind, node: &str) -> Result<Sample> {
        self.enter(node).await?;

        let reading = self
            .readings
            .read()
            .await
            .get(&(kind, node.to_string()))
            .copied();

        match reading {
            Some((current, _)) => {
                debug!("Mock: {} on {} = {}", kind, node, current);
                Ok(Sample::now(current))
            }
            None => Err(MetricsError::metric_unavailable(
                kind,
                node,
                "no sample recorded",
            )),
        }
    }

    async fn fleet_max(&self, kind: ResourceKind) -> Result<Sample> {
        self.fleet_queries.fetch_add(1, Ordering::SeqCst);

        self.readings
            .read()
            .await
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, (_, fleet_max))| *fleet_max)
            .reduce(f64::max)
            .map(Sample::now)
            .ok_or_else(|| MetricsError::metric_unavailable(kind, "fleet", "no sample recorded"))
    }

    async fn bandwidth(&self, node: &str, direction: BandwidthDirection) -> Result<Sample> {
        self.enter(node).await?;

        let (receive, transmit) = self
            .bandwidth
            .read()
            .await
            .get(node)
            .copied()
            .ok_or_else(|| {
                MetricsError::metric_unavailable(
                    ResourceKind::Network,
                    node,
                    "no bandwidth recorded",
                )
            })?;

        Ok(Sample::now(match direction {
            BandwidthDirection::Receive => receive,
            BandwidthDirection::Transmit => transmit,
            BandwidthDirection::Both => receive + transmit,
        }))
    }

    async fn ping(&self) -> Result<()> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MetricsError::backend_error("mock backend marked unhealthy"))
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}
