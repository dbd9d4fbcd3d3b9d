use sextant_metrics::MetricSource;
use sextant_scheduler::Prioritizer;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Prioritization engine, constructed by the caller
    pub prioritizer: Arc<Prioritizer>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(prioritizer: Arc<Prioritizer>) -> Self {
        Self { prioritizer }
    }

    /// Metric source behind the prioritizer
    pub fn source(&self) -> &Arc<dyn MetricSource> {
        self.prioritizer.scorer().source()
    }
}
