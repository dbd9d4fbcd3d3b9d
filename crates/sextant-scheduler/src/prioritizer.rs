use crate::health::BackendHealth;
use crate::score::NodeScorer;
use crate::types::{FleetMaxima, Phase, PrioritizeStats, Prioritization};
use crate::{Result, SchedulerError};
use sextant_core::{ExtenderArgs, HostPriority, NodeScore, ResourceKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Configuration for the prioritizer
#[derive(Debug, Clone)]
pub struct PrioritizerConfig {
    /// Deadline for scoring all candidates of one request
    pub request_deadline: Duration,
    /// Maximum number of nodes scored at the same time
    pub max_concurrency: usize,
    /// Attempts per node before falling back to the neutral score
    pub score_attempts: u32,
    /// Consecutive degraded requests before the backend is reported degraded
    pub degraded_after: u32,
}

impl Default for PrioritizerConfig {
    fn default() -> Self {
        Self {
            request_deadline: Duration::from_secs(5),
            max_concurrency: 32,
            score_attempts: 2,
            degraded_after: 3,
        }
    }
}

/// Turns a prioritize request into a complete, ordered priority list
///
/// Every candidate node gets exactly one entry. Nodes that cannot be scored
/// (metric failures, scorer errors, deadline expiry) get the neutral score.
pub struct Prioritizer {
    scorer: Arc<NodeScorer>,
    config: PrioritizerConfig,
    health: BackendHealth,
}

impl Prioritizer {
    /// Create a new prioritizer
    pub fn new(scorer: Arc<NodeScorer>, config: PrioritizerConfig) -> Self {
        let health = BackendHealth::new(config.degraded_after);
        Self {
            scorer,
            config,
            health,
        }
    }

    pub fn scorer(&self) -> &Arc<NodeScorer> {
        &self.scorer
    }

    pub fn health(&self) -> &BackendHealth {
        &self.health
    }

    pub fn config(&self) -> &PrioritizerConfig {
        &self.config
    }

    /// Candidate node names of a request.
    ///
    /// `NodeNames` wins when present and non-empty; otherwise the names are
    /// taken from `Nodes.items` in order.
    pub fn resolve_candidates(args: &ExtenderArgs) -> Result<Vec<String>> {
        if let Some(names) = args.node_names.as_ref().filter(|n| !n.is_empty()) {
            return Ok(names.clone());
        }

        let items = args.nodes.as_ref().map(|l| l.items.as_slice()).unwrap_or(&[]);
        if items.is_empty() {
            return Err(SchedulerError::invalid_request(
                "request has neither NodeNames nor Nodes.items",
            ));
        }

        items
            .iter()
            .enumerate()
            .map(|(i, node)| {
                node.metadata
                    .name
                    .clone()
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| {
                        SchedulerError::invalid_request(format!(
                            "node at Nodes.items[{}] has no name",
                            i
                        ))
                    })
            })
            .collect()
    }

    /// Score every candidate node of the request
    pub async fn prioritize(&self, args: &ExtenderArgs) -> Result<Prioritization> {
        let pod_name = args.pod_name();
        transition(&pod_name, Phase::Received);

        transition(&pod_name, Phase::Resolving);
        let candidates = match Self::resolve_candidates(args) {
            Ok(c) => c,
            Err(e) => {
                transition(&pod_name, Phase::Failed);
                warn!("Rejecting prioritize request for pod {}: {}", pod_name, e);
                return Err(e);
            }
        };

        transition(&pod_name, Phase::Scoring);
        let kinds = self.scorer.config().weights.kinds();
        let slots = self.score_all(&candidates, kinds).await;

        transition(&pod_name, Phase::Assembling);
        let neutral = self.scorer.config().neutral_score;
        let mut stats = PrioritizeStats {
            candidates: candidates.len(),
            ..Default::default()
        };

        let scores: Vec<NodeScore> = candidates
            .iter()
            .zip(slots)
            .map(|(name, slot)| {
                let score = match slot {
                    Some(Ok(score)) => score,
                    Some(Err(e)) => {
                        if e.is_backend_error() {
                            stats.backend_errors += 1;
                        }
                        warn!("Node {} could not be scored ({}), using neutral score", name, e);
                        NodeScore::neutral(name, neutral)
                    }
                    None => {
                        stats.timed_out += 1;
                        NodeScore::neutral(name, neutral)
                    }
                };
                if score.backend_errors > 0 {
                    stats.backend_errors += 1;
                }
                if score.fallback {
                    stats.fallbacks += 1;
                } else {
                    stats.measured += 1;
                }
                score
            })
            .collect();

        let priorities = scores
            .iter()
            .map(|s| HostPriority::new(&s.node_name, s.score))
            .collect();

        self.health.record(stats.candidates, stats.backend_errors);

        info!(
            "Prioritized {} nodes for pod {} ({} measured, {} fallback, {} timed out)",
            stats.candidates, pod_name, stats.measured, stats.fallbacks, stats.timed_out
        );
        transition(&pod_name, Phase::Completed);

        Ok(Prioritization {
            priorities,
            scores,
            stats,
        })
    }

    /// Fan out scoring over bounded parallel tasks.
    ///
    /// Fleet maxima are queried once and shared by every node. Results land
    /// in slots indexed by candidate position, so completion order never
    /// affects output order. Slots still empty at the deadline stay `None`.
    async fn score_all(&self, candidates: &[String], kinds: Vec<ResourceKind>) -> Vec<Slot> {
        let deadline = Instant::now() + self.config.request_deadline;
        let mut slots: Vec<Slot> = candidates.iter().map(|_| None).collect();

        let maxima = match tokio::time::timeout_at(deadline, self.scorer.fleet_maxima(&kinds)).await
        {
            Ok(maxima) => Arc::new(maxima),
            Err(_) => {
                warn!(
                    "Scoring deadline of {:?} expired while querying fleet maxima",
                    self.config.request_deadline
                );
                return slots;
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let attempts = self.config.score_attempts.max(1);
        let mut tasks = JoinSet::new();

        for (index, node) in candidates.iter().enumerate() {
            let scorer = self.scorer.clone();
            let semaphore = semaphore.clone();
            let maxima = maxima.clone();
            let node = node.clone();

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            index,
                            Err(SchedulerError::internal_error("scoring semaphore closed")),
                        )
                    }
                };
                (index, score_with_retry(&scorer, &node, &maxima, attempts).await)
            });
        }

        let collected = tokio::time::timeout_at(deadline, async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, result)) => slots[index] = Some(result),
                    Err(e) => error!("Scoring task failed: {}", e),
                }
            }
        })
        .await;

        if collected.is_err() {
            let finished = drain_finished(&mut tasks, &mut slots);
            warn!(
                "Scoring deadline of {:?} expired with {} nodes pending, cancelling ({} finished at the deadline)",
                self.config.request_deadline,
                tasks.len(),
                finished
            );
            tasks.abort_all();
        }

        slots
    }
}

type Slot = Option<Result<NodeScore>>;

/// Move results of tasks that finished but were not yet joined into their
/// slots. Returns how many were collected.
fn drain_finished(tasks: &mut JoinSet<(usize, Result<NodeScore>)>, slots: &mut [Slot]) -> usize {
    let mut finished = 0;
    while let Some(joined) = tasks.try_join_next() {
        match joined {
            Ok((index, result)) => {
                slots[index] = Some(result);
                finished += 1;
            }
            Err(e) => error!("Scoring task failed: {}", e),
        }
    }
    finished
}

async fn score_with_retry(
    scorer: &NodeScorer,
    node: &str,
    maxima: &FleetMaxima,
    attempts: u32,
) -> Result<NodeScore> {
    let mut attempt = 1;
    loop {
        match scorer.score_with(node, maxima).await {
            Ok(score) => return Ok(score),
            Err(e) if attempt < attempts => {
                debug!("Scoring node {} failed (attempt {}/{}): {}", node, attempt, attempts, e);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn transition(pod_name: &str, phase: Phase) {
    debug!("Prioritize pod {}: {}", pod_name, phase);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::ScorerConfig;
    use sextant_core::{Node, NodeList, ObjectMeta, PressureRatio, ResourceWeights, NEUTRAL_SCORE};
    use sextant_metrics::MockMetricSource;
    use std::collections::HashSet;

    fn named_node(name: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn args_with_names(names: &[&str]) -> ExtenderArgs {
        ExtenderArgs {
            node_names: Some(names.iter().map(|n| n.to_string()).collect()),
            ..Default::default()
        }
    }

    fn prioritizer(source: Arc<MockMetricSource>, config: PrioritizerConfig) -> Prioritizer {
        prioritizer_with(source, ScorerConfig::default(), config)
    }

    fn prioritizer_with(
        source: Arc<MockMetricSource>,
        scorer_config: ScorerConfig,
        config: PrioritizerConfig,
    ) -> Prioritizer {
        let scorer = Arc::new(NodeScorer::new(source, scorer_config));
        Prioritizer::new(scorer, config)
    }

    fn hosts(result: &Prioritization) -> Vec<String> {
        result.priorities.iter().map(|p| p.host.clone()).collect()
    }

    #[test]
    fn test_resolve_prefers_node_names() {
        let mut args = args_with_names(&["x", "y"]);
        args.nodes = Some(NodeList::new(vec![named_node("a")]));
        assert_eq!(Prioritizer::resolve_candidates(&args).unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn test_resolve_from_node_items() {
        let args = ExtenderArgs {
            nodes: Some(NodeList::new(vec![named_node("b"), named_node("a")])),
            ..Default::default()
        };
        assert_eq!(Prioritizer::resolve_candidates(&args).unwrap(), vec!["b", "a"]);

        // An empty NodeNames list falls back to the descriptors as well
        let args = ExtenderArgs {
            node_names: Some(vec![]),
            nodes: Some(NodeList::new(vec![named_node("c")])),
            ..Default::default()
        };
        assert_eq!(Prioritizer::resolve_candidates(&args).unwrap(), vec!["c"]);
    }

    #[test]
    fn test_resolve_rejects_empty_request() {
        let err = Prioritizer::resolve_candidates(&ExtenderArgs::default()).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidRequest { .. }));

        let args = ExtenderArgs {
            nodes: Some(NodeList::default()),
            ..Default::default()
        };
        assert!(Prioritizer::resolve_candidates(&args).is_err());
    }

    #[test]
    fn test_resolve_rejects_unnamed_node() {
        let args = ExtenderArgs {
            nodes: Some(NodeList::new(vec![named_node("a"), Node::default()])),
            ..Default::default()
        };
        let err = Prioritizer::resolve_candidates(&args).unwrap_err();
        assert!(err.to_string().contains("Nodes.items[1]"));
    }

    #[tokio::test]
    async fn test_response_covers_exactly_the_candidates() {
        let source = Arc::new(MockMetricSource::new());
        source.set_all("n1", 1.0, 4.0).await;
        source.set_all("n3", 3.0, 4.0).await;
        source.set_unreachable("n4").await;
        let p = prioritizer(source, PrioritizerConfig::default());

        let names = ["n1", "n2", "n3", "n4", "n5"];
        let result = p.prioritize(&args_with_names(&names)).await.unwrap();

        assert_eq!(result.priorities.len(), names.len());
        let got: HashSet<String> = hosts(&result).into_iter().collect();
        let want: HashSet<String> = names.iter().map(|n| n.to_string()).collect();
        assert_eq!(got, want);
        assert_eq!(result.stats.measured, 2);
        assert_eq!(result.stats.fallbacks, 3);
        assert_eq!(result.stats.backend_errors, 1);
    }

    #[tokio::test]
    async fn test_all_scorers_failing_gives_neutral_list() {
        let source = Arc::new(MockMetricSource::new());
        let names = ["a", "b", "c"];
        for name in names {
            source.set_unreachable(name).await;
        }
        let scorer_config = ScorerConfig {
            strict: true,
            ..Default::default()
        };
        let p = prioritizer_with(source, scorer_config, PrioritizerConfig::default());

        let result = p.prioritize(&args_with_names(&names)).await.unwrap();
        assert_eq!(hosts(&result), vec!["a", "b", "c"]);
        assert!(result.priorities.iter().all(|h| h.score == NEUTRAL_SCORE));
        assert_eq!(result.stats.fallbacks, 3);
        assert_eq!(result.stats.backend_errors, 3);
    }

    #[tokio::test]
    async fn test_strict_failures_are_retried() {
        let source = Arc::new(MockMetricSource::new());
        source.set_unreachable("a").await;
        let scorer_config = ScorerConfig {
            strict: true,
            weights: ResourceWeights::equal(&[ResourceKind::Cpu]).unwrap(),
            ..Default::default()
        };
        let config = PrioritizerConfig {
            score_attempts: 3,
            ..Default::default()
        };
        let p = prioritizer_with(source.clone(), scorer_config, config);

        p.prioritize(&args_with_names(&["a"])).await.unwrap();
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_preserved_when_completion_reversed() {
        let source = Arc::new(MockMetricSource::new());
        source.set_all("first", 1.0, 10.0).await;
        source.set_all("second", 5.0, 10.0).await;
        source.set_all("third", 9.0, 10.0).await;
        source.set_latency("first", Duration::from_millis(900)).await;
        source.set_latency("second", Duration::from_millis(500)).await;

        let p = prioritizer(source, PrioritizerConfig::default());
        let result = p
            .prioritize(&args_with_names(&["first", "second", "third"]))
            .await
            .unwrap();

        assert_eq!(hosts(&result), vec!["first", "second", "third"]);
        let scores: Vec<i64> = result.priorities.iter().map(|p| p.score).collect();
        assert_eq!(scores, vec![90, 50, 10]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expiry_falls_back() {
        let source = Arc::new(MockMetricSource::new());
        source.set_all("fast", 2.0, 10.0).await;
        source.set_all("stuck", 2.0, 10.0).await;
        source.set_latency("stuck", Duration::from_secs(60)).await;

        let scorer_config = ScorerConfig {
            metric_timeout: Duration::from_secs(120),
            neutral_score: 33,
            ..Default::default()
        };
        let config = PrioritizerConfig {
            request_deadline: Duration::from_secs(1),
            ..Default::default()
        };
        let p = prioritizer_with(source, scorer_config, config);

        let start = Instant::now();
        let result = p
            .prioritize(&args_with_names(&["stuck", "fast"]))
            .await
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));

        assert_eq!(hosts(&result), vec!["stuck", "fast"]);
        assert_eq!(result.priorities[0].score, 33);
        assert_eq!(result.priorities[1].score, 80);
        assert_eq!(result.stats.timed_out, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let source = Arc::new(MockMetricSource::new());
        let names: Vec<String> = (0..4).map(|i| format!("n{}", i)).collect();
        for name in &names {
            source.set_all(name, 1.0, 2.0).await;
            source.set_latency(name, Duration::from_secs(1)).await;
        }
        let config = PrioritizerConfig {
            max_concurrency: 1,
            request_deadline: Duration::from_secs(30),
            ..Default::default()
        };
        let p = prioritizer(source, config);

        let start = Instant::now();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let result = p.prioritize(&args_with_names(&refs)).await.unwrap();

        // One node at a time, each ~1s
        assert!(start.elapsed() >= Duration::from_secs(4));
        assert_eq!(result.stats.measured, 4);
    }

    #[tokio::test]
    async fn test_fleet_maxima_queried_once_per_request() {
        let source = Arc::new(MockMetricSource::new());
        let names: Vec<String> = (0..10).map(|i| format!("n{}", i)).collect();
        for (i, name) in names.iter().enumerate() {
            source.set_all(name, i as f64, 10.0).await;
        }
        let p = prioritizer(source.clone(), PrioritizerConfig::default());

        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let result = p.prioritize(&args_with_names(&refs)).await.unwrap();

        assert_eq!(result.stats.measured, 10);
        assert_eq!(source.fleet_query_count(), ResourceKind::ALL.len());
        assert_eq!(source.fetch_count(), 10 * ResourceKind::ALL.len());
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_tasks_collected_before_abort() {
        let mut tasks = JoinSet::new();
        tasks.spawn(async { (1, Ok(NodeScore::new("b", 70, Default::default()))) });
        tasks.spawn(async { (0, Ok(NodeScore::new("a", 30, Default::default()))) });
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            (2, Ok(NodeScore::new("c", 10, Default::default())))
        });

        // Let the two immediate tasks run to completion without joining them
        tokio::time::sleep(Duration::from_millis(1)).await;

        let mut slots: Vec<Slot> = vec![None, None, None];
        assert_eq!(drain_finished(&mut tasks, &mut slots), 2);
        assert_eq!(slots[0].as_ref().unwrap().as_ref().unwrap().score, 30);
        assert_eq!(slots[1].as_ref().unwrap().as_ref().unwrap().score, 70);
        assert!(slots[2].is_none());
        assert_eq!(tasks.len(), 1);
        tasks.abort_all();
    }

    #[tokio::test]
    async fn test_derived_candidates_end_to_end() {
        let source = Arc::new(MockMetricSource::new());
        let p = prioritizer(source, PrioritizerConfig::default());
        let args = ExtenderArgs {
            nodes: Some(NodeList::new(vec![named_node("a"), named_node("b")])),
            ..Default::default()
        };

        let result = p.prioritize(&args).await.unwrap();
        assert_eq!(hosts(&result), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_half_measured_half_unreachable() {
        let source = Arc::new(MockMetricSource::new());
        source.set_reading(ResourceKind::Network, "a", 50.0, 100.0).await;
        source.set_unreachable("b").await;
        let p = prioritizer(source, PrioritizerConfig::default());

        let result = p.prioritize(&args_with_names(&["a", "b"])).await.unwrap();

        assert_eq!(hosts(&result), vec!["a", "b"]);
        let a = &result.scores[0];
        assert!(!a.fallback);
        assert_eq!(a.ratios[&ResourceKind::Network], PressureRatio::Loaded(0.5));
        assert_eq!(a.score, 50);

        let b = &result.scores[1];
        assert!(b.fallback);
        assert_eq!(b.score, NEUTRAL_SCORE);
    }

    #[tokio::test]
    async fn test_invalid_request_is_error() {
        let p = prioritizer(Arc::new(MockMetricSource::new()), PrioritizerConfig::default());
        let err = p.prioritize(&ExtenderArgs::default()).await.unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_sustained_backend_errors_degrade_health() {
        let source = Arc::new(MockMetricSource::new());
        source.set_unreachable("a").await;
        source.set_unreachable("b").await;
        let config = PrioritizerConfig {
            degraded_after: 2,
            ..Default::default()
        };
        let p = prioritizer(source.clone(), config);
        let args = args_with_names(&["a", "b"]);

        p.prioritize(&args).await.unwrap();
        assert!(!p.health().is_degraded());
        p.prioritize(&args).await.unwrap();
        assert!(p.health().is_degraded());

        source.set_all("c", 1.0, 2.0).await;
        p.prioritize(&args_with_names(&["c"])).await.unwrap();
        assert!(!p.health().is_degraded());
    }
}
