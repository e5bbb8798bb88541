//! loadwatch binary entry point.
//!
//! Samples the query catalog against a Prometheus backend for `--duration`
//! ticks and prints each result block to stdout. Logs go to stderr.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use loadwatch::{
    AppConfig, PrometheusClient, Scheduler, TextSink,
    config::parse_duration,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// loadwatch - sample Prometheus queries during a load test
#[derive(Parser, Debug)]
#[command(name = "loadwatch", version, about, long_about = None)]
struct Cli {
    /// Optional YAML configuration file
    #[arg(short, long, env = "LOADWATCH_CONFIG")]
    config: Option<String>,

    /// Prometheus URL [default: http://localhost:9090]
    #[arg(long, env = "LOADWATCH_PROMETHEUS_URL")]
    prometheus_url: Option<String>,

    /// Number of ticks to sample [default: 15]
    #[arg(long, env = "LOADWATCH_DURATION")]
    duration: Option<u64>,

    /// The type of test being observed, e.g. idle, stress-test [default: idle]
    #[arg(long, env = "LOADWATCH_TEST_TYPE")]
    test_type: Option<String>,

    /// Project name
    #[arg(long, env = "LOADWATCH_PROJECT")]
    project: Option<String>,

    /// Namespace where the observed project resides
    #[arg(long, env = "LOADWATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Node where the observed project is running
    #[arg(long, env = "LOADWATCH_NODE")]
    node: Option<String>,

    /// Pause between ticks, e.g. 1m [default: 1m]
    #[arg(long, value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Width of the queried window, e.g. 1m [default: 1m]
    #[arg(long, value_parser = parse_duration)]
    window: Option<Duration>,

    /// Range-query resolution, e.g. 15s [default: 15s]
    #[arg(long, value_parser = parse_duration)]
    step: Option<Duration>,

    /// Per-query timeout, e.g. 30s [default: 30s]
    #[arg(long, value_parser = parse_duration)]
    query_timeout: Option<Duration>,
}

impl Cli {
    /// Apply CLI/env overrides (CLI > ENV > config file > defaults).
    fn apply(self, config: &mut AppConfig) {
        if let Some(url) = self.prometheus_url {
            config.backend.url = url;
        }
        if let Some(ticks) = self.duration {
            config.sampling.ticks = ticks;
        }
        if let Some(test_type) = self.test_type {
            config.annotations.test_type = test_type;
        }
        if let Some(project) = self.project {
            config.annotations.project = project;
        }
        if let Some(namespace) = self.namespace {
            config.annotations.namespace = namespace;
        }
        if let Some(node) = self.node {
            config.annotations.node = node;
        }
        if let Some(interval) = self.interval {
            config.sampling.interval = interval;
        }
        if let Some(window) = self.window {
            config.sampling.window = window;
        }
        if let Some(step) = self.step {
            config.sampling.step = step;
        }
        if let Some(timeout) = self.query_timeout {
            config.backend.timeout = timeout;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing on stderr; stdout carries the results.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,loadwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config.as_deref() {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path);
            AppConfig::load(path)?
        }
        None => AppConfig::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    tracing::info!(
        "Backend: {}, ticks: {}, interval: {:?}, window: {:?}, step: {:?}",
        config.backend.url,
        config.sampling.ticks,
        config.sampling.interval,
        config.sampling.window,
        config.sampling.step,
    );

    let backend = PrometheusClient::new(&config.backend).inspect_err(|e| {
        tracing::error!(error = %e, "Cannot create backend client");
    })?;

    let catalog = config.catalog();
    for query in catalog.queries() {
        tracing::debug!(query = %query.id(), expression = %query.expression(), "Catalog query");
    }

    let sink = Arc::new(TextSink::stdout());
    sink.write_preamble(&config.annotations).await?;

    let scheduler = Scheduler::new(
        Arc::new(backend),
        catalog,
        sink,
        config.scheduler_config(),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let summary = scheduler.run(shutdown).await;
    if summary.cancelled {
        tracing::warn!(
            "Interrupted after {} of {} ticks",
            summary.ticks,
            config.sampling.ticks
        );
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Cancel `token` on Ctrl+C or SIGTERM.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }

    token.cancel();
}
