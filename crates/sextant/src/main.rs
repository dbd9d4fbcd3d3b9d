mod config;

use clap::{Parser, Subcommand};
use config::ExtenderConfig;
use sextant_apiserver::{ApiServer, AppState, Config as ApiConfig};
use sextant_core::BandwidthDirection;
use sextant_metrics::{MetricSource, PrometheusSource};
use sextant_scheduler::{inspect_fleet, NodeScorer, Prioritizer};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "sextant", about = "Resource-pressure scheduler extender for Kubernetes")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "SEXTANT_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the prioritize endpoint
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8888", env = "SEXTANT_BIND")]
        bind: String,
        /// Prometheus base URL
        #[arg(
            long,
            default_value = "http://prometheus:9090",
            env = "SEXTANT_PROMETHEUS_URL"
        )]
        prometheus_url: String,
        /// YAML configuration file
        #[arg(long, env = "SEXTANT_CONFIG")]
        config: Option<PathBuf>,
        /// Fail node scoring on any metric error instead of skipping the resource
        #[arg(long)]
        strict: bool,
    },
    /// Print the fleet maxima and the readings and ratios of the given nodes
    Inspect {
        /// Node to inspect (repeatable)
        #[arg(long = "node")]
        nodes: Vec<String>,
        /// Also report network bandwidth in this direction (receive, transmit, both)
        #[arg(long, alias = "bw-type")]
        direction: Option<BandwidthDirection>,
        /// Prometheus base URL
        #[arg(
            long,
            default_value = "http://prometheus:9090",
            env = "SEXTANT_PROMETHEUS_URL"
        )]
        prometheus_url: String,
        /// YAML configuration file
        #[arg(long, env = "SEXTANT_CONFIG")]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_json);

    match cli.command {
        Commands::Serve {
            bind,
            prometheus_url,
            config,
            strict,
        } => run_serve(&bind, &prometheus_url, config.as_deref(), strict).await,
        Commands::Inspect {
            nodes,
            direction,
            prometheus_url,
            config,
        } => run_inspect(&nodes, direction, &prometheus_url, config.as_deref()).await,
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Build the scorer shared by both commands
fn create_scorer(
    prometheus_url: &str,
    config: &ExtenderConfig,
) -> miette::Result<Arc<NodeScorer>> {
    let source = PrometheusSource::new(config.prometheus_config(prometheus_url))?;
    let source: Arc<dyn MetricSource> = Arc::new(source);
    Ok(Arc::new(NodeScorer::new(source, config.scorer_config())))
}

/// Run the extender HTTP server until ctrl-c
async fn run_serve(
    bind: &str,
    prometheus_url: &str,
    config_path: Option<&Path>,
    strict: bool,
) -> miette::Result<()> {
    info!("Starting sextant scheduler extender");

    let mut config = ExtenderConfig::load(config_path)?;
    if strict {
        config.strict = true;
    }

    let listen_addr = bind
        .parse()
        .map_err(|e| miette::miette!("Invalid bind address '{}': {}", bind, e))?;

    let scorer = create_scorer(prometheus_url, &config)?;
    if let Err(e) = scorer.source().ping().await {
        warn!(
            "Prometheus at {} is not reachable yet, nodes will score neutral until it is: {}",
            prometheus_url, e
        );
    }

    let prioritizer = Arc::new(Prioritizer::new(scorer, config.prioritizer_config()));
    let state = Arc::new(AppState::new(prioritizer));

    let token = CancellationToken::new();

    let server = ApiServer::new(
        ApiConfig {
            listen_addr,
            max_body_bytes: config.max_body_bytes,
        },
        state,
    );
    let listener = server
        .bind()
        .await
        .map_err(|e| miette::miette!("Failed to bind {}: {}", listen_addr, e))?;
    let server_handle = tokio::spawn(server.serve(listener, token.clone()));

    info!(
        "Extender listening on {}, metrics from {} (strict: {})",
        bind, prometheus_url, config.strict
    );

    supervise(server_handle, tokio::signal::ctrl_c(), token).await?;

    info!("Shutdown complete");

    Ok(())
}

/// Wait for either the shutdown signal or the server to exit.
///
/// A server that stops on its own is an error; the signal cancels the token
/// and gives the server a few seconds to drain.
async fn supervise(
    mut server_handle: JoinHandle<std::io::Result<()>>,
    shutdown: impl Future<Output = std::io::Result<()>>,
    token: CancellationToken,
) -> miette::Result<()> {
    tokio::select! {
        signal = shutdown => {
            signal.map_err(|e| miette::miette!("Failed to listen for ctrl-c: {}", e))?;
        }
        result = &mut server_handle => {
            token.cancel();
            return match result {
                Ok(Ok(())) => Err(miette::miette!("Extender server exited unexpectedly")),
                Ok(Err(e)) => Err(miette::miette!("Extender server error: {}", e)),
                Err(e) => Err(miette::miette!("Extender server task failed: {}", e)),
            };
        }
    }

    info!("Shutting down gracefully...");
    token.cancel();

    let shutdown_timeout = Duration::from_secs(5);
    match tokio::time::timeout(shutdown_timeout, server_handle).await {
        Ok(Ok(Err(e))) => error!("Extender server error during shutdown: {}", e),
        Ok(_) => {}
        Err(_) => warn!("Server did not stop within {:?}", shutdown_timeout),
    }

    Ok(())
}

/// Query the fleet maxima and the given nodes, print what the scorer sees
async fn run_inspect(
    nodes: &[String],
    direction: Option<BandwidthDirection>,
    prometheus_url: &str,
    config_path: Option<&Path>,
) -> miette::Result<()> {
    let config = ExtenderConfig::load(config_path)?;
    let scorer = create_scorer(prometheus_url, &config)?;

    let diagnostics = inspect_fleet(&scorer, nodes, direction).await;
    let output = serde_json::to_string_pretty(&diagnostics)
        .map_err(|e| miette::miette!("Failed to encode diagnostics: {}", e))?;
    println!("{}", output);

    Ok(())
}
