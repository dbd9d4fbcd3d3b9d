use serde::{Deserialize, Serialize};
use sextant_apiserver::DEFAULT_MAX_BODY_BYTES;
use sextant_core::{CoreError, ResourceWeights, MAX_NODE_SCORE, MIN_NODE_SCORE, NEUTRAL_SCORE};
use sextant_metrics::{PrometheusConfig, QueryTemplates};
use sextant_scheduler::{PrioritizerConfig, ScorerConfig};
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Extender configuration, loaded from an optional YAML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtenderConfig {
    /// Weight of each resource kind (must sum to 1.0)
    pub weights: ResourceWeights,
    /// Score for nodes without usable measurements
    pub neutral_score: i64,
    /// Propagate metric errors to the prioritizer (retried, then neutral)
    pub strict: bool,
    /// Timeout of a single metrics query
    pub metric_timeout_ms: u64,
    /// Deadline for scoring all nodes of one request
    pub request_deadline_ms: u64,
    /// Nodes scored concurrently per request
    pub max_concurrency: usize,
    /// Scoring attempts per node
    pub score_attempts: u32,
    /// Consecutive degraded requests before health reports 503
    pub degraded_after: u32,
    /// Largest prioritize request body accepted
    pub max_body_bytes: usize,
    /// PromQL templates per resource kind
    pub queries: QueryTemplates,
}

impl Default for ExtenderConfig {
    fn default() -> Self {
        let scorer = ScorerConfig::default();
        let prioritizer = PrioritizerConfig::default();
        Self {
            weights: scorer.weights,
            neutral_score: NEUTRAL_SCORE,
            strict: scorer.strict,
            metric_timeout_ms: scorer.metric_timeout.as_millis() as u64,
            request_deadline_ms: prioritizer.request_deadline.as_millis() as u64,
            max_concurrency: prioritizer.max_concurrency,
            score_attempts: prioritizer.score_attempts,
            degraded_after: prioritizer.degraded_after,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            queries: QueryTemplates::default(),
        }
    }
}

impl ExtenderConfig {
    /// Load from a YAML file, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let config = match path {
            Some(path) => {
                let data = std::fs::read_to_string(path).map_err(|e| {
                    CoreError::invalid_config(
                        format!("failed to read {}: {}", path.display(), e),
                        "Check the --config path",
                    )
                })?;
                let config: ExtenderConfig = serde_yaml::from_str(&data).map_err(|e| {
                    CoreError::invalid_config(
                        format!("failed to parse {}: {}", path.display(), e),
                        "The file must be YAML; weights must sum to 1.0",
                    )
                })?;
                info!("Loaded configuration from {}", path.display());
                config
            }
            None => ExtenderConfig::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check ranges that serde cannot express
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(MIN_NODE_SCORE..=MAX_NODE_SCORE).contains(&self.neutral_score) {
            return Err(CoreError::invalid_config(
                format!("neutral_score {} is out of range", self.neutral_score),
                format!("Use a value between {} and {}", MIN_NODE_SCORE, MAX_NODE_SCORE),
            ));
        }
        if self.metric_timeout_ms == 0 || self.request_deadline_ms == 0 {
            return Err(CoreError::invalid_config(
                "timeouts must be non-zero",
                "Set metric_timeout_ms and request_deadline_ms to positive values",
            ));
        }
        if self.max_concurrency == 0 || self.score_attempts == 0 {
            return Err(CoreError::invalid_config(
                "max_concurrency and score_attempts must be at least 1",
                "Remove them from the file to use the defaults",
            ));
        }
        if self.max_body_bytes == 0 {
            return Err(CoreError::invalid_config(
                "max_body_bytes must be positive",
                "Remove it from the file to use the 64 MiB default",
            ));
        }
        if self.weights.kinds().is_empty() {
            return Err(CoreError::invalid_config(
                "no resource kind has a positive weight",
                "Give at least one kind a non-zero weight",
            ));
        }
        self.queries
            .validate()
            .map_err(|e| CoreError::invalid_config(e.to_string(), "Fix the queries section"))?;

        if self.metric_timeout_ms >= self.request_deadline_ms {
            warn!(
                "metric_timeout_ms ({}) >= request_deadline_ms ({}): slow nodes will hit the request deadline",
                self.metric_timeout_ms, self.request_deadline_ms
            );
        }
        Ok(())
    }

    pub fn scorer_config(&self) -> ScorerConfig {
        ScorerConfig {
            weights: self.weights.clone(),
            neutral_score: self.neutral_score,
            strict: self.strict,
            metric_timeout: Duration::from_millis(self.metric_timeout_ms),
        }
    }

    pub fn prioritizer_config(&self) -> PrioritizerConfig {
        PrioritizerConfig {
            request_deadline: Duration::from_millis(self.request_deadline_ms),
            max_concurrency: self.max_concurrency,
            score_attempts: self.score_attempts,
            degraded_after: self.degraded_after,
        }
    }

    pub fn prometheus_config(&self, base_url: &str) -> PrometheusConfig {
        PrometheusConfig {
            base_url: base_url.to_string(),
            timeout: Duration::from_millis(self.metric_timeout_ms),
            queries: self.queries.clone(),
        }
    }
}
