use sextant_core::{HostPriorityList, NodeScore, ResourceKind};
use sextant_metrics::MetricsError;
use std::collections::BTreeMap;
use std::fmt;

/// Stage of a prioritize request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Received,
    Resolving,
    Scoring,
    Assembling,
    Completed,
    /// Only reached for malformed input
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Received => "received",
            Phase::Resolving => "resolving",
            Phase::Scoring => "scoring",
            Phase::Assembling => "assembling",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Counters describing how one request was scored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrioritizeStats {
    /// Number of resolved candidate nodes
    pub candidates: usize,
    /// Nodes scored from at least one measurement
    pub measured: usize,
    /// Nodes given the neutral fallback score
    pub fallbacks: usize,
    /// Nodes whose scoring did not finish before the deadline
    pub timed_out: usize,
    /// Nodes whose scoring hit at least one backend error
    pub backend_errors: usize,
}

/// Result of a prioritize request
#[derive(Debug, Clone)]
pub struct Prioritization {
    /// One entry per candidate, in resolved order
    pub priorities: HostPriorityList,
    /// Detailed per-node scores, same order
    pub scores: Vec<NodeScore>,
    pub stats: PrioritizeStats,
}

/// Fleet maximum of each scored resource kind, queried once per request
#[derive(Debug, Clone, Default)]
pub struct FleetMaxima {
    maxima: BTreeMap<ResourceKind, std::result::Result<f64, MetricsError>>,
}

impl FleetMaxima {
    pub fn insert(&mut self, kind: ResourceKind, max: std::result::Result<f64, MetricsError>) {
        self.maxima.insert(kind, max);
    }

    /// Fleet maximum of `kind`, or the error its query failed with
    pub fn get(&self, kind: ResourceKind) -> std::result::Result<f64, MetricsError> {
        match self.maxima.get(&kind) {
            Some(max) => max.clone(),
            None => Err(MetricsError::metric_unavailable(
                kind,
                "fleet",
                "fleet maximum was not queried",
            )),
        }
    }

    /// Kinds that were queried, in scoring order
    pub fn kinds(&self) -> Vec<ResourceKind> {
        self.maxima.keys().copied().collect()
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (ResourceKind, &std::result::Result<f64, MetricsError>)> + '_ {
        self.maxima.iter().map(|(k, v)| (*k, v))
    }
}
