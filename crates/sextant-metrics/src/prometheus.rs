use crate::error::{MetricsError, Result};
use crate::traits::{MetricSource, Sample};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sextant_core::{BandwidthDirection, ResourceKind};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Placeholder substituted with the (escaped) node name in per-node queries
pub const NODE_PLACEHOLDER: &str = "{node}";

/// Stands in for the node name in errors of fleet-wide queries
const FLEET_TARGET: &str = "fleet";

/// PromQL pair for one resource kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTemplate {
    /// Instant query for one node; must contain `{node}`
    pub node: String,
    /// Instant query for the highest value across the fleet
    pub fleet_max: String,
}

impl QueryTemplate {
    pub fn new(node: impl Into<String>, fleet_max: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            fleet_max: fleet_max.into(),
        }
    }

    /// Per-node query with the node name substituted
    pub fn render(&self, node: &str) -> String {
        render_node_query(&self.node, node)
    }
}

/// Per-node network queries split by traffic direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandwidthQueries {
    pub receive: String,
    pub transmit: String,
}

impl Default for BandwidthQueries {
    fn default() -> Self {
        Self {
            receive: r#"sum(rate(node_network_receive_bytes_total{node="{node}",device!~"lo|veth.*|docker.*"}[1m]))"#.to_string(),
            transmit: r#"sum(rate(node_network_transmit_bytes_total{node="{node}",device!~"lo|veth.*|docker.*"}[1m]))"#.to_string(),
        }
    }
}

/// Query templates for every resource kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryTemplates {
    pub network: QueryTemplate,
    pub disk: QueryTemplate,
    pub cpu: QueryTemplate,
    pub memory: QueryTemplate,
    /// Used by diagnostics only, never for scoring
    pub bandwidth: BandwidthQueries,
}

impl QueryTemplates {
    pub fn get(&self, kind: ResourceKind) -> &QueryTemplate {
        match kind {
            ResourceKind::Network => &self.network,
            ResourceKind::Disk => &self.disk,
            ResourceKind::Cpu => &self.cpu,
            ResourceKind::Memory => &self.memory,
        }
    }

    /// Check that every per-node template references the node
    pub fn validate(&self) -> Result<()> {
        for kind in ResourceKind::ALL {
            let template = self.get(kind);
            if !template.node.contains(NODE_PLACEHOLDER) {
                return Err(MetricsError::invalid_config(
                    format!("query for {} does not reference {}", kind, NODE_PLACEHOLDER),
                    format!("Add a label matcher such as node=\"{}\"", NODE_PLACEHOLDER),
                ));
            }
            if template.fleet_max.trim().is_empty() {
                return Err(MetricsError::invalid_config(
                    format!("fleet maximum query for {} is empty", kind),
                    "Provide a query aggregating with max() across nodes",
                ));
            }
        }
        for (direction, query) in [
            (BandwidthDirection::Receive, &self.bandwidth.receive),
            (BandwidthDirection::Transmit, &self.bandwidth.transmit),
        ] {
            if !query.contains(NODE_PLACEHOLDER) {
                return Err(MetricsError::invalid_config(
                    format!("{} bandwidth query does not reference {}", direction, NODE_PLACEHOLDER),
                    format!("Add a label matcher such as node=\"{}\"", NODE_PLACEHOLDER),
                ));
            }
        }
        Ok(())
    }
}

impl Default for QueryTemplates {
    fn default() -> Self {
        Self {
            network: QueryTemplate::new(
                r#"sum(rate(node_network_receive_bytes_total{node="{node}",device!~"lo|veth.*|docker.*"}[1m])) + sum(rate(node_network_transmit_bytes_total{node="{node}",device!~"lo|veth.*|docker.*"}[1m]))"#,
                r#"max(sum by (node) (rate(node_network_receive_bytes_total{device!~"lo|veth.*|docker.*"}[1m])) + sum by (node) (rate(node_network_transmit_bytes_total{device!~"lo|veth.*|docker.*"}[1m])))"#,
            ),
            disk: QueryTemplate::new(
                r#"sum(rate(node_disk_read_bytes_total{node="{node}"}[1m])) + sum(rate(node_disk_written_bytes_total{node="{node}"}[1m]))"#,
                r#"max(sum by (node) (rate(node_disk_read_bytes_total[1m])) + sum by (node) (rate(node_disk_written_bytes_total[1m])))"#,
            ),
            cpu: QueryTemplate::new(
                r#"1 - avg(rate(node_cpu_seconds_total{node="{node}",mode="idle"}[1m]))"#,
                r#"max(1 - avg by (node) (rate(node_cpu_seconds_total{mode="idle"}[1m])))"#,
            ),
            memory: QueryTemplate::new(
                r#"1 - sum(node_memory_MemAvailable_bytes{node="{node}"}) / sum(node_memory_MemTotal_bytes{node="{node}"})"#,
                r#"max(1 - node_memory_MemAvailable_bytes / node_memory_MemTotal_bytes)"#,
            ),
            bandwidth: BandwidthQueries::default(),
        }
    }
}

/// Configuration for the Prometheus source
#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    /// Base URL of the Prometheus HTTP API (e.g. "http://prometheus:9090")
    pub base_url: String,
    /// Timeout applied to every HTTP request
    pub timeout: Duration,
    /// Query templates per resource kind
    pub queries: QueryTemplates,
}

impl PrometheusConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9090".to_string(),
            timeout: Duration::from_secs(2),
            queries: QueryTemplates::default(),
        }
    }
}

/// Body of `/api/v1/query`
#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum QueryData {
    Vector(Vec<VectorSample>),
    Scalar((f64, String)),
    Matrix(serde_json::Value),
    String(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: BTreeMap<String, String>,
    value: (f64, String),
}

/// Metric source backed by the Prometheus HTTP API
///
/// Holds one `reqwest::Client`; its connection pool is shared by every
/// concurrent scoring task.
pub struct PrometheusSource {
    base_url: String,
    client: Client,
    queries: QueryTemplates,
}

impl PrometheusSource {
    pub fn new(config: PrometheusConfig) -> Result<Self> {
        config.queries.validate()?;

        if config.timeout.is_zero() {
            return Err(MetricsError::invalid_config(
                "request timeout is zero",
                "Use a timeout below the scheduler's extender HTTP timeout, e.g. 2s",
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                MetricsError::invalid_config(
                    format!("failed to build HTTP client: {}", e),
                    "Check the TLS configuration of the host",
                )
            })?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            queries: config.queries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run an instant query and return its single value.
    ///
    /// `target` names the node (or the fleet) in errors.
    async fn query_value(&self, kind: ResourceKind, target: &str, query: &str) -> Result<Sample> {
        let url = format!("{}/api/v1/query", self.base_url);
        debug!("GET {} query={}", url, query);

        let resp = self
            .client
            .get(&url)
            .query(&[("query", query)])
            .send()
            .await
            .map_err(|e| request_error(kind, target, e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| request_error(kind, target, e))?;

        // Prometheus reports bad queries as 400/422 with an error body
        let parsed: QueryResponse = serde_json::from_str(&body).map_err(|e| {
            MetricsError::backend_error(format!(
                "unparsable response (HTTP {}): {}",
                status, e
            ))
        })?;

        if !status.is_success() || parsed.status != "success" {
            return Err(MetricsError::backend_error(format!(
                "query failed with HTTP {} ({}): {}",
                status,
                parsed.error_type.unwrap_or_else(|| "unknown".to_string()),
                parsed.error.unwrap_or_default()
            )));
        }

        extract_value(kind, target, parsed.data)
    }
}

#[async_trait]
impl MetricSource for PrometheusSource {
    async fn current(&self, kind: ResourceKind, node: &str) -> Result<Sample> {
        let sample = self
            .query_value(kind, node, &self.queries.get(kind).render(node))
            .await?;
        debug!("Prometheus {} on {}: {}", kind, node, sample.value);
        Ok(sample)
    }

    async fn fleet_max(&self, kind: ResourceKind) -> Result<Sample> {
        let sample = self
            .query_value(kind, FLEET_TARGET, &self.queries.get(kind).fleet_max)
            .await?;
        debug!("Prometheus fleet maximum of {}: {}", kind, sample.value);
        Ok(sample)
    }

    async fn bandwidth(&self, node: &str, direction: BandwidthDirection) -> Result<Sample> {
        let template = match direction {
            BandwidthDirection::Both => return self.current(ResourceKind::Network, node).await,
            BandwidthDirection::Receive => &self.queries.bandwidth.receive,
            BandwidthDirection::Transmit => &self.queries.bandwidth.transmit,
        };
        self.query_value(ResourceKind::Network, node, &render_node_query(template, node))
            .await
    }

    async fn ping(&self) -> Result<()> {
        let url = format!("{}/-/healthy", self.base_url);
        debug!("GET {}", url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MetricsError::backend_error(format!("HTTP request failed: {}", e)))?;

        if !resp.status().is_success() {
            return Err(MetricsError::backend_error(format!(
                "health check failed with status {}",
                resp.status()
            )));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "prometheus"
    }
}

/// Timeouts mean the backend could not answer in time; everything else is a
/// transport failure.
fn request_error(kind: ResourceKind, node: &str, err: reqwest::Error) -> MetricsError {
    if err.is_timeout() {
        MetricsError::metric_unavailable(kind, node, format!("request timed out: {}", err))
    } else {
        MetricsError::backend_error(format!("HTTP request failed: {}", err))
    }
}

fn extract_value(kind: ResourceKind, node: &str, data: Option<QueryData>) -> Result<Sample> {
    let (ts, raw) = match data {
        Some(QueryData::Vector(samples)) => {
            if samples.len() > 1 {
                warn!(
                    "Query for {} on {} returned {} series, using the first ({:?})",
                    kind,
                    node,
                    samples.len(),
                    samples[0].metric
                );
            }
            match samples.into_iter().next() {
                Some(sample) => sample.value,
                None => {
                    return Err(MetricsError::metric_unavailable(
                        kind,
                        node,
                        "query returned no series",
                    ))
                }
            }
        }
        Some(QueryData::Scalar(value)) => value,
        Some(QueryData::Matrix(_)) | Some(QueryData::String(_)) => {
            return Err(MetricsError::backend_error(
                "expected an instant vector or scalar result",
            ))
        }
        None => return Err(MetricsError::backend_error("response has no data")),
    };

    let value: f64 = raw
        .parse()
        .map_err(|_| MetricsError::backend_error(format!("malformed sample value '{}'", raw)))?;

    // NaN/Inf come out of PromQL divisions by zero: no usable data
    if !value.is_finite() {
        return Err(MetricsError::metric_unavailable(
            kind,
            node,
            format!("sample value is {}", raw),
        ));
    }

    let timestamp = DateTime::from_timestamp_millis((ts * 1000.0) as i64).unwrap_or_else(Utc::now);

    Ok(Sample::new(value, timestamp))
}

fn render_node_query(template: &str, node: &str) -> String {
    template.replace(NODE_PLACEHOLDER, &escape_label_value(node))
}

/// Escape a string for use inside a double-quoted PromQL label matcher
fn escape_label_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    /// Serve a fake Prometheus API on a random port and return its base URL
    async fn spawn_fake_prometheus(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn vector(value: &str) -> Value {
        json!({
            "status": "success",
            "data": {
                "resultType": "vector",
                "result": [{"metric": {}, "value": [1700000000.5, value]}]
            }
        })
    }

    fn network_only_router() -> Router {
        Router::new()
            .route(
                "/api/v1/query",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    let query = params.get("query").cloned().unwrap_or_default();
                    if query.starts_with("max(") {
                        Json(vector("100"))
                    } else if query.contains(r#"node="node-a""#) {
                        Json(vector("50"))
                    } else {
                        Json(json!({
                            "status": "success",
                            "data": {"resultType": "vector", "result": []}
                        }))
                    }
                }),
            )
            .route("/-/healthy", get(|| async { "Prometheus Server is Healthy." }))
    }

    fn source_for(base_url: &str) -> PrometheusSource {
        let mut config = PrometheusConfig::new(base_url);
        config.timeout = Duration::from_millis(500);
        PrometheusSource::new(config).unwrap()
    }

    #[test]
    fn test_render_escapes_node_name() {
        let template = QueryTemplate::new(r#"up{node="{node}"}"#, "max(up)");
        assert_eq!(template.render("node-a"), r#"up{node="node-a"}"#);
        assert_eq!(template.render(r#"we"ird"#), r#"up{node="we\"ird"}"#);
    }

    #[test]
    fn test_default_templates_are_valid() {
        assert!(QueryTemplates::default().validate().is_ok());
    }

    #[test]
    fn test_template_without_placeholder_rejected() {
        let mut queries = QueryTemplates::default();
        queries.cpu = QueryTemplate::new("avg(node_load1)", "max(node_load1)");
        let err = queries.validate().unwrap_err();
        assert!(matches!(err, MetricsError::InvalidConfig { .. }));
    }

    #[test]
    fn test_partial_templates_deserialize_with_defaults() {
        let queries: QueryTemplates = serde_json::from_str(
            r#"{"cpu": {"node": "cpu{node=\"{node}\"}", "fleet_max": "max(cpu)"}}"#,
        )
        .unwrap();
        assert_eq!(queries.cpu.fleet_max, "max(cpu)");
        assert_eq!(queries.network, QueryTemplates::default().network);
    }

    #[test]
    fn test_extract_value_variants() {
        let data: QueryResponse = serde_json::from_value(vector("0.25")).unwrap();
        let sample = extract_value(ResourceKind::Cpu, "n", data.data).unwrap();
        assert_eq!(sample.value, 0.25);
        assert_eq!(sample.timestamp.timestamp_millis(), 1_700_000_000_500);

        let scalar: QueryResponse = serde_json::from_value(json!({
            "status": "success",
            "data": {"resultType": "scalar", "result": [1700000000, "7"]}
        }))
        .unwrap();
        assert_eq!(extract_value(ResourceKind::Cpu, "n", scalar.data).unwrap().value, 7.0);

        let nan: QueryResponse = serde_json::from_value(vector("NaN")).unwrap();
        assert!(matches!(
            extract_value(ResourceKind::Cpu, "n", nan.data),
            Err(MetricsError::MetricUnavailable { .. })
        ));

        let garbage: QueryResponse = serde_json::from_value(vector("abc")).unwrap();
        assert!(matches!(
            extract_value(ResourceKind::Cpu, "n", garbage.data),
            Err(MetricsError::BackendError { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_reading_from_backend() {
        let base_url = spawn_fake_prometheus(network_only_router()).await;
        let source = source_for(&base_url);

        let reading = source.fetch(ResourceKind::Network, "node-a").await.unwrap();
        assert_eq!(reading.kind, ResourceKind::Network);
        assert_eq!(reading.node, "node-a");
        assert_eq!(reading.current, 50.0);
        assert_eq!(reading.fleet_max, 100.0);
    }

    #[tokio::test]
    async fn test_fleet_max_is_node_independent() {
        let base_url = spawn_fake_prometheus(network_only_router()).await;
        let source = source_for(&base_url);

        let max = source.fleet_max(ResourceKind::Network).await.unwrap();
        assert_eq!(max.value, 100.0);

        let current = source.current(ResourceKind::Network, "node-a").await.unwrap();
        assert_eq!(current.value, 50.0);
    }

    #[tokio::test]
    async fn test_bandwidth_by_direction() {
        let router = Router::new().route(
            "/api/v1/query",
            get(|Query(params): Query<HashMap<String, String>>| async move {
                let query = params.get("query").cloned().unwrap_or_default();
                let receive = query.contains("node_network_receive");
                let transmit = query.contains("node_network_transmit");
                match (receive, transmit) {
                    (true, false) => Json(vector("10")),
                    (false, true) => Json(vector("20")),
                    _ => Json(vector("30")),
                }
            }),
        );
        let base_url = spawn_fake_prometheus(router).await;
        let source = source_for(&base_url);

        let rx = source.bandwidth("node-a", BandwidthDirection::Receive).await.unwrap();
        let tx = source.bandwidth("node-a", BandwidthDirection::Transmit).await.unwrap();
        let both = source.bandwidth("node-a", BandwidthDirection::Both).await.unwrap();
        assert_eq!((rx.value, tx.value, both.value), (10.0, 20.0, 30.0));
    }

    #[test]
    fn test_bandwidth_template_without_placeholder_rejected() {
        let mut queries = QueryTemplates::default();
        queries.bandwidth.transmit = "sum(rate(node_network_transmit_bytes_total[1m]))".to_string();
        assert!(queries.validate().is_err());
    }

    #[tokio::test]
    async fn test_fetch_empty_result_is_unavailable() {
        let base_url = spawn_fake_prometheus(network_only_router()).await;
        let source = source_for(&base_url);

        let err = source.fetch(ResourceKind::Network, "node-b").await.unwrap_err();
        assert!(matches!(err, MetricsError::MetricUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_fetch_error_status_is_backend_error() {
        let router = Router::new().route(
            "/api/v1/query",
            get(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "status": "error",
                        "errorType": "bad_data",
                        "error": "parse error"
                    })),
                )
            }),
        );
        let base_url = spawn_fake_prometheus(router).await;
        let source = source_for(&base_url);

        let err = source.fetch(ResourceKind::Cpu, "node-a").await.unwrap_err();
        assert!(err.is_backend_error());
        assert!(err.to_string().contains("bad_data"));
    }

    #[tokio::test]
    async fn test_slow_backend_is_unavailable() {
        let router = Router::new().route(
            "/api/v1/query",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Json(vector("1"))
            }),
        );
        let base_url = spawn_fake_prometheus(router).await;
        let mut config = PrometheusConfig::new(base_url);
        config.timeout = Duration::from_millis(100);
        let source = PrometheusSource::new(config).unwrap();

        let err = source.fetch(ResourceKind::Disk, "node-a").await.unwrap_err();
        assert!(matches!(err, MetricsError::MetricUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        // Nothing listens on port 1
        let source = source_for("http://127.0.0.1:1");

        let err = source.fetch(ResourceKind::Memory, "node-a").await.unwrap_err();
        assert!(err.is_backend_error());
        assert!(source.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_ping() {
        let base_url = spawn_fake_prometheus(network_only_router()).await;
        let source = source_for(&format!("{}/", base_url));
        assert_eq!(source.base_url(), base_url);
        assert!(source.ping().await.is_ok());
        assert_eq!(source.name(), "prometheus");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = PrometheusConfig::default();
        config.timeout = Duration::ZERO;
        assert!(PrometheusSource::new(config).is_err());
    }
}
