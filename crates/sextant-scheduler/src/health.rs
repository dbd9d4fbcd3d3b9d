use std::sync::atomic::{AtomicU32, Ordering};
use tracing::warn;

/// Tracks sustained metrics backend failures across prioritize requests.
///
/// A request counts as degraded when at least half of its candidate nodes hit
/// a backend error. After `threshold` consecutive degraded requests the
/// backend is reported degraded; one healthy request resets the count.
#[derive(Debug)]
pub struct BackendHealth {
    consecutive: AtomicU32,
    threshold: u32,
}

impl BackendHealth {
    pub fn new(threshold: u32) -> Self {
        Self {
            consecutive: AtomicU32::new(0),
            threshold: threshold.max(1),
        }
    }

    /// Record the outcome of one request
    pub fn record(&self, nodes: usize, nodes_with_backend_errors: usize) {
        if nodes > 0 && nodes_with_backend_errors * 2 >= nodes {
            let count = self.consecutive.fetch_add(1, Ordering::SeqCst) + 1;
            if count == self.threshold {
                warn!(
                    "Metrics backend degraded: {} consecutive requests with widespread backend errors",
                    count
                );
            }
        } else {
            self.consecutive.store(0, Ordering::SeqCst);
        }
    }

    pub fn consecutive_degraded(&self) -> u32 {
        self.consecutive.load(Ordering::SeqCst)
    }

    pub fn is_degraded(&self) -> bool {
        self.consecutive_degraded() >= self.threshold
    }
}

impl Default for BackendHealth {
    fn default() -> Self {
        Self::new(3)
    }
}
