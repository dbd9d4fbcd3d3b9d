use crate::normalize::normalize;
use crate::types::FleetMaxima;
use crate::{Result, SchedulerError};
use futures_util::future::join_all;
use sextant_core::{
    BandwidthDirection, NodeScore, PressureRatio, ResourceKind, ResourceWeights, MAX_NODE_SCORE,
    MIN_NODE_SCORE, NEUTRAL_SCORE,
};
use sextant_metrics::{MetricSource, MetricsError, Sample};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Configuration for the node scorer
#[derive(Debug, Clone)]
pub struct ScorerConfig {
    /// Weight of each resource kind in the aggregate pressure
    pub weights: ResourceWeights,
    /// Score given to nodes with no usable measurement
    pub neutral_score: i64,
    /// Propagate metric errors instead of degrading to unknown
    pub strict: bool,
    /// Upper bound on a single metric fetch
    pub metric_timeout: Duration,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            weights: ResourceWeights::default(),
            neutral_score: NEUTRAL_SCORE,
            strict: false,
            metric_timeout: Duration::from_secs(2),
        }
    }
}

/// Weighted mean pressure over the known ratios.
///
/// Weights are renormalized over the kinds that were measured. Returns None
/// when nothing known carries weight.
pub fn weighted_pressure(
    ratios: &BTreeMap<ResourceKind, PressureRatio>,
    weights: &ResourceWeights,
) -> Option<f64> {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;

    for (kind, ratio) in ratios {
        if let Some(value) = ratio.value() {
            let weight = weights.weight(*kind);
            weighted_sum += weight * value;
            weight_total += weight;
        }
    }

    if weight_total <= 0.0 {
        return None;
    }

    Some((weighted_sum / weight_total).clamp(0.0, 1.0))
}

/// Map pressure in [0, 1] onto the scheduler score range; lower pressure
/// scores higher.
pub fn pressure_to_score(pressure: f64) -> i64 {
    let score = (MAX_NODE_SCORE as f64 * (1.0 - pressure.clamp(0.0, 1.0))).round() as i64;
    score.clamp(MIN_NODE_SCORE, MAX_NODE_SCORE)
}

/// Scores one node from live pressure readings
pub struct NodeScorer {
    source: Arc<dyn MetricSource>,
    config: ScorerConfig,
}

impl NodeScorer {
    /// Create a new scorer
    pub fn new(source: Arc<dyn MetricSource>, config: ScorerConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn MetricSource> {
        &self.source
    }

    /// Bound a metrics call by the metric timeout
    async fn bounded<T>(
        &self,
        kind: ResourceKind,
        target: &str,
        call: impl Future<Output = sextant_metrics::Result<T>>,
    ) -> sextant_metrics::Result<T> {
        match tokio::time::timeout(self.config.metric_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(MetricsError::metric_unavailable(
                kind,
                target,
                format!("no answer within {:?}", self.config.metric_timeout),
            )),
        }
    }

    /// Current value of `kind` on `node`
    pub async fn current(&self, kind: ResourceKind, node: &str) -> sextant_metrics::Result<Sample> {
        self.bounded(kind, node, self.source.current(kind, node)).await
    }

    /// Network bandwidth of `node` in one direction
    pub async fn bandwidth(
        &self,
        node: &str,
        direction: BandwidthDirection,
    ) -> sextant_metrics::Result<Sample> {
        self.bounded(
            ResourceKind::Network,
            node,
            self.source.bandwidth(node, direction),
        )
        .await
    }

    /// Query the fleet maximum of every kind once, concurrently
    pub async fn fleet_maxima(&self, kinds: &[ResourceKind]) -> FleetMaxima {
        let results = join_all(
            kinds
                .iter()
                .map(|kind| self.bounded(*kind, "fleet", self.source.fleet_max(*kind))),
        )
        .await;

        let mut maxima = FleetMaxima::default();
        for (kind, result) in kinds.iter().zip(results) {
            if let Err(e) = &result {
                warn!("Fleet maximum of {} unavailable: {}", kind, e);
            }
            maxima.insert(*kind, result.map(|sample| sample.value));
        }
        maxima
    }

    /// Pressure ratio of `kind` on `node` against the fleet maximum.
    ///
    /// Fetch failures (of the node or of the fleet maximum) are returned as
    /// errors; readings the normalizer rejects come back as `Unknown`.
    pub async fn pressure(
        &self,
        kind: ResourceKind,
        node: &str,
        maxima: &FleetMaxima,
    ) -> Result<PressureRatio> {
        let current = self.current(kind, node).await?;
        let fleet_max = maxima.get(kind)?;

        match normalize(current.value, fleet_max) {
            Ok(ratio) => Ok(ratio),
            Err(e) => {
                warn!("Node {} {}: {}, treating as unknown", node, kind, e);
                Ok(PressureRatio::Unknown)
            }
        }
    }

    /// Score `node` over the requested resource kinds, querying fleet maxima
    /// for this node alone
    pub async fn score(&self, node: &str, kinds: &[ResourceKind]) -> Result<NodeScore> {
        let maxima = self.fleet_maxima(kinds).await;
        self.score_with(node, &maxima).await
    }

    /// Score `node` over the kinds of `maxima` (0-100, higher is better)
    pub async fn score_with(&self, node: &str, maxima: &FleetMaxima) -> Result<NodeScore> {
        let kinds = maxima.kinds();
        let results = join_all(kinds.iter().map(|kind| self.pressure(*kind, node, maxima))).await;

        let mut ratios = BTreeMap::new();
        let mut backend_errors = 0;

        for (kind, result) in kinds.iter().zip(results) {
            let ratio = match result {
                Ok(ratio) => ratio,
                Err(e) if self.config.strict => return Err(e),
                Err(SchedulerError::Metrics(e)) => {
                    if e.is_backend_error() {
                        backend_errors += 1;
                        error!("Node {} {}: {}", node, kind, e);
                    } else {
                        warn!("Node {} {}: {}", node, kind, e);
                    }
                    PressureRatio::Unknown
                }
                Err(e) => {
                    warn!("Node {} {}: {}", node, kind, e);
                    PressureRatio::Unknown
                }
            };
            ratios.insert(*kind, ratio);
        }

        let score = match weighted_pressure(&ratios, &self.config.weights) {
            Some(pressure) => {
                let score = pressure_to_score(pressure);
                debug!(
                    "Node {} score: {} (weighted pressure {:.3}, ratios {:?})",
                    node, score, pressure, ratios
                );
                NodeScore::new(node, score, ratios)
            }
            None => {
                debug!(
                    "Node {} has no known pressure, using neutral score {}",
                    node, self.config.neutral_score
                );
                let mut neutral = NodeScore::neutral(node, self.config.neutral_score);
                neutral.ratios = ratios;
                neutral
            }
        };

        Ok(score.with_backend_errors(backend_errors))
    }
}
