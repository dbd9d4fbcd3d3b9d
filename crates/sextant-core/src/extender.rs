//! Wire types of the kube-scheduler extender protocol (`k8s.io/kube-scheduler/extender/v1`).
//!
//! The Go types carry no JSON tags, so the scheduler emits capitalized field
//! names (`Pod`, `NodeNames`, `Host`). Go decoding is case-insensitive; we
//! accept the common spellings on input and emit the capitalized form.

use k8s_openapi::api::core::v1::{Node, Pod};
use serde::{Deserialize, Serialize};

/// Arguments of a filter/prioritize call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtenderArgs {
    /// Pod being scheduled
    #[serde(rename = "Pod", alias = "pod", default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<Pod>,

    /// Full node descriptors, sent when the extender is not node-cache capable
    #[serde(rename = "Nodes", alias = "nodes", default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<NodeList>,

    /// Candidate node names, sent when the extender is node-cache capable
    #[serde(
        rename = "NodeNames",
        alias = "nodeNames",
        alias = "nodenames",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub node_names: Option<Vec<String>>,
}

impl ExtenderArgs {
    /// Name of the pod, or "unknown"
    pub fn pod_name(&self) -> String {
        self.pod
            .as_ref()
            .and_then(|p| p.metadata.name.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Minimal NodeList: only `items` matters to the extender
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeList {
    #[serde(default)]
    pub items: Vec<Node>,
}

impl NodeList {
    pub fn new(items: Vec<Node>) -> Self {
        Self { items }
    }
}

/// Score of one host in a prioritize response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPriority {
    #[serde(rename = "Host", alias = "host")]
    pub host: String,
    #[serde(rename = "Score", alias = "score")]
    pub score: i64,
}

impl HostPriority {
    pub fn new(host: impl Into<String>, score: i64) -> Self {
        Self {
            host: host.into(),
            score,
        }
    }
}

/// Prioritize response body
pub type HostPriorityList = Vec<HostPriority>;
