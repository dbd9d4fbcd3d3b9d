//! Raw readings of nodes for operational inspection. Not used for scoring.

use crate::normalize::normalize;
use crate::score::NodeScorer;
use crate::types::FleetMaxima;
use futures_util::future::join_all;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use sextant_core::{BandwidthDirection, PressureRatio, ResourceKind, ResourceReading};
use sextant_metrics::{MetricsError, Sample};
use std::collections::BTreeMap;

/// Nodes inspected at the same time by `inspect_fleet`
const INSPECT_CONCURRENCY: usize = 8;

/// What the backend reports for one resource kind
#[derive(Debug, Clone, Serialize)]
pub struct KindDiagnostics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<ResourceReading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ratio: Option<PressureRatio>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A single value or the error that prevented reading it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueDiagnostics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValueDiagnostics {
    fn from_result(result: Result<f64, &MetricsError>) -> Self {
        match result {
            Ok(value) => Self {
                value: Some(value),
                error: None,
            },
            Err(e) => Self {
                value: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Readings of every resource kind for one node
#[derive(Debug, Clone, Serialize)]
pub struct NodeDiagnostics {
    pub node: String,
    pub source: String,
    pub kinds: BTreeMap<ResourceKind, KindDiagnostics>,
    /// Network bandwidth in the requested direction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<ValueDiagnostics>,
}

/// Fleet maxima plus the readings of the requested nodes
#[derive(Debug, Clone, Serialize)]
pub struct FleetDiagnostics {
    pub source: String,
    pub fleet_max: BTreeMap<ResourceKind, ValueDiagnostics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<BandwidthDirection>,
    pub nodes: Vec<NodeDiagnostics>,
}

/// Query all resource kinds of `node`, keeping per-kind errors
pub async fn inspect_node(scorer: &NodeScorer, node: &str) -> NodeDiagnostics {
    let maxima = scorer.fleet_maxima(&ResourceKind::ALL).await;
    inspect_with(scorer, node, &maxima, None).await
}

/// Query the fleet maxima once, then every listed node in order
pub async fn inspect_fleet(
    scorer: &NodeScorer,
    nodes: &[String],
    direction: Option<BandwidthDirection>,
) -> FleetDiagnostics {
    let maxima = scorer.fleet_maxima(&ResourceKind::ALL).await;

    let inspections: Vec<_> = nodes
        .iter()
        .map(|node| inspect_with(scorer, node, &maxima, direction))
        .collect();
    let node_diagnostics = stream::iter(inspections)
        .buffered(INSPECT_CONCURRENCY)
        .collect::<Vec<_>>()
        .await;

    FleetDiagnostics {
        source: scorer.source().name().to_string(),
        fleet_max: maxima
            .iter()
            .map(|(kind, max)| (kind, ValueDiagnostics::from_result(max.as_ref().copied())))
            .collect(),
        direction,
        nodes: node_diagnostics,
    }
}

async fn inspect_with(
    scorer: &NodeScorer,
    node: &str,
    maxima: &FleetMaxima,
    direction: Option<BandwidthDirection>,
) -> NodeDiagnostics {
    let currents = join_all(ResourceKind::ALL.iter().map(|kind| scorer.current(*kind, node))).await;

    let kinds = ResourceKind::ALL
        .iter()
        .zip(currents)
        .map(|(kind, current)| (*kind, kind_diagnostics(*kind, node, current, maxima)))
        .collect();

    let bandwidth = match direction {
        Some(direction) => {
            let result = scorer.bandwidth(node, direction).await;
            Some(ValueDiagnostics::from_result(
                result.as_ref().map(|sample| sample.value),
            ))
        }
        None => None,
    };

    NodeDiagnostics {
        node: node.to_string(),
        source: scorer.source().name().to_string(),
        kinds,
        bandwidth,
    }
}

fn kind_diagnostics(
    kind: ResourceKind,
    node: &str,
    current: sextant_metrics::Result<Sample>,
    maxima: &FleetMaxima,
) -> KindDiagnostics {
    let (current, fleet_max) = match (current, maxima.get(kind)) {
        (Ok(current), Ok(fleet_max)) => (current, fleet_max),
        (Err(e), _) | (Ok(_), Err(e)) => {
            return KindDiagnostics {
                reading: None,
                ratio: None,
                error: Some(e.to_string()),
            }
        }
    };

    let (ratio, error) = match normalize(current.value, fleet_max) {
        Ok(ratio) => (Some(ratio), None),
        Err(e) => (None, Some(e.to_string())),
    };

    KindDiagnostics {
        reading: Some(
            ResourceReading::new(kind, node, current.value, fleet_max)
                .with_timestamp(current.timestamp),
        ),
        ratio,
        error,
    }
}
