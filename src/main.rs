//! Pulsewatch
//!
//! Runs the observability pipeline as a standalone process and exposes it
//! over HTTP.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Pulsewatch                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  background:   sampling ──▶ MetricStore ◀── performance check    │
//! │  host cadence: alert evaluation │ health runs │ dashboard export │
//! │  HTTP:         /healthz /dashboard (health addr), /metrics       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pulsewatch::adapters::{
    LoggingChannel, LoggingEventPublisher, Notifier, PrometheusExporter, SysinfoSampler,
    WebhookChannel, DEFAULT_NOTIFIER_CAPACITY,
};
use pulsewatch::task::{PeriodicTask, DEFAULT_STOP_TIMEOUT};
use pulsewatch::{
    AlertEngine, HealthCheckRegistry, HealthStatus, MetricStore, ObservabilityConfig,
    ObservabilityDashboard, PerformanceAnalyzer,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Pulsewatch - embedded metrics, health checks, alerting and SLO tracking
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file
    #[arg(long, env = "PULSEWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Dashboard export path (overrides the configuration file)
    #[arg(long, env = "PULSEWATCH_EXPORT_PATH")]
    export_path: Option<PathBuf>,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9090")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

struct AppState {
    health: Arc<HealthCheckRegistry>,
    dashboard: Arc<ObservabilityDashboard>,
    exporter: PrometheusExporter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let mut config = match &args.config {
        Some(path) => ObservabilityConfig::from_yaml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ObservabilityConfig::default(),
    };
    if let Some(path) = &args.export_path {
        config.dashboard.export_path = path.clone();
    }

    info!("Starting Pulsewatch");
    info!("  Rules file: {}", config.alerting.rules_path.display());
    info!("  Export path: {}", config.dashboard.export_path.display());
    info!(
        "  Sampling every {:?}, performance check every {:?}",
        config.metrics.sampling_interval(),
        config.performance.check_interval()
    );

    // Notification transport
    let (notifier, _forwarder) = Notifier::spawn(
        Arc::new(LoggingEventPublisher::new()),
        DEFAULT_NOTIFIER_CAPACITY,
    );

    // Components
    let store = Arc::new(MetricStore::new(
        config.metrics.series_capacity,
        notifier.clone(),
    ));
    let health = Arc::new(HealthCheckRegistry::with_builtin_checks(
        &config.health,
        notifier.clone(),
    ));

    let alerts = AlertEngine::load(Arc::clone(&store), &config.alerting, notifier.clone())
        .with_channel(Arc::new(LoggingChannel));
    for url in &config.alerting.webhook_urls {
        match WebhookChannel::new(url, config.alerting.webhook_timeout()) {
            Ok(channel) => alerts.add_channel(Arc::new(channel)),
            Err(e) => warn!(url = %url, "Skipping webhook channel: {}", e),
        }
    }
    let alerts = Arc::new(alerts);

    let analyzer = Arc::new(PerformanceAnalyzer::from_config(
        Arc::clone(&store),
        &config.performance,
        notifier.clone(),
    ));
    let dashboard = Arc::new(
        ObservabilityDashboard::new(
            Arc::clone(&store),
            Arc::clone(&health),
            Arc::clone(&alerts),
            Arc::clone(&analyzer),
        )
        .with_config(&config),
    );

    // Background tasks
    store.start_sampling(
        Arc::new(SysinfoSampler::new(config.health.disk_path.clone())),
        config.metrics.sampling_interval(),
    );
    analyzer.start_monitoring(config.performance.check_interval());

    // HTTP servers
    let state = Arc::new(AppState {
        health: Arc::clone(&health),
        dashboard: Arc::clone(&dashboard),
        exporter: PrometheusExporter::new().context("creating Prometheus exporter")?,
    });

    let health_addr: SocketAddr = args.health_addr.parse().context("invalid health address")?;
    let metrics_addr: SocketAddr = args.metrics_addr.parse().context("invalid metrics address")?;

    let health_state = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(e) = run_server(Listener::Health, health_addr, health_state).await {
            error!("Health server error: {:#}", e);
        }
    });
    let metrics_state = Arc::clone(&state);
    tokio::spawn(async move {
        if let Err(e) = run_server(Listener::Metrics, metrics_addr, metrics_state).await {
            error!("Metrics server error: {:#}", e);
        }
    });

    // Host cadence
    let evaluation = PeriodicTask::new("alert-evaluation");
    let engine = Arc::clone(&alerts);
    evaluation.start(config.alerting.evaluation_interval(), move || {
        let engine = Arc::clone(&engine);
        async move {
            engine.evaluate().await;
        }
    });

    let health_runs = PeriodicTask::new("health-checks");
    let registry = Arc::clone(&health);
    health_runs.start(config.health.check_interval(), move || {
        let registry = Arc::clone(&registry);
        async move {
            registry.run_all().await;
        }
    });

    let exports = PeriodicTask::new("dashboard-export");
    let exporter = Arc::clone(&dashboard);
    let export_path = config.dashboard.export_path.clone();
    exports.start(config.dashboard.export_interval(), move || {
        let exporter = Arc::clone(&exporter);
        let path = export_path.clone();
        async move {
            // Failures are logged by export itself.
            let _ = exporter.export(&path).await;
        }
    });

    info!("Pulsewatch running");
    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Shutdown requested");

    for task in [&evaluation, &health_runs, &exports] {
        if !task.stop(DEFAULT_STOP_TIMEOUT).await {
            warn!(task = task.name(), "Task did not stop cleanly");
        }
    }

    if !store.stop_sampling().await {
        warn!("Sampling task did not stop cleanly");
    }
    if !analyzer.stop_monitoring().await {
        warn!("Performance monitor did not stop cleanly");
    }

    if dashboard.export(&config.dashboard.export_path).await.is_ok() {
        info!("Final dashboard exported");
    }

    info!("Pulsewatch shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

// =============================================================================
// HTTP Server
// =============================================================================

fn respond(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_str(content_type).unwrap_or(HeaderValue::from_static("text/plain")),
    );
    response
}

/// The two listeners the process binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Listener {
    Health,
    Metrics,
}

impl Listener {
    fn name(self) -> &'static str {
        match self {
            Listener::Health => "health",
            Listener::Metrics => "metrics",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Health,
    Live,
    Dashboard,
    Metrics,
}

/// Each listener serves only its own paths.
fn route(listener: Listener, path: &str) -> Option<Endpoint> {
    match (listener, path) {
        (Listener::Health, "/healthz" | "/readyz") => Some(Endpoint::Health),
        (Listener::Health, "/livez") => Some(Endpoint::Live),
        (Listener::Health, "/dashboard") => Some(Endpoint::Dashboard),
        (Listener::Metrics, "/metrics") => Some(Endpoint::Metrics),
        _ => None,
    }
}

async fn handle(
    listener: Listener,
    state: Arc<AppState>,
    req: Request<hyper::body::Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, std::convert::Infallible> {
    let response = match route(listener, req.uri().path()) {
        Some(Endpoint::Health) => {
            let status = state.health.overall_status();
            let code = if status == HealthStatus::Unhealthy {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::OK
            };
            let body = serde_json::json!({
                "status": status,
                "checks": state.health.results(),
            });
            respond(code, "application/json", body.to_string())
        }
        Some(Endpoint::Live) => respond(StatusCode::OK, "text/plain", "ok"),
        Some(Endpoint::Dashboard) => match serde_json::to_vec_pretty(&state.dashboard.snapshot()) {
            Ok(body) => respond(StatusCode::OK, "application/json", body),
            Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", e.to_string()),
        },
        Some(Endpoint::Metrics) => match state.exporter.render(&state.dashboard.snapshot()) {
            Ok(text) => respond(StatusCode::OK, &state.exporter.content_type(), text),
            Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", e.to_string()),
        },
        None => respond(StatusCode::NOT_FOUND, "text/plain", "not found"),
    };
    Ok(response)
}

async fn run_server(listener: Listener, addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let name = listener.name();
    let socket = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {} server on {}", name, addr))?;

    info!("{} server listening on {}", name, addr);

    loop {
        let (stream, _) = socket
            .accept()
            .await
            .with_context(|| format!("{} server accept error", name))?;

        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |req| handle(listener, Arc::clone(&state), req));
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("{} server connection error: {}", name, e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_listener_routes() {
        assert_eq!(route(Listener::Health, "/healthz"), Some(Endpoint::Health));
        assert_eq!(route(Listener::Health, "/readyz"), Some(Endpoint::Health));
        assert_eq!(route(Listener::Health, "/livez"), Some(Endpoint::Live));
        assert_eq!(route(Listener::Health, "/dashboard"), Some(Endpoint::Dashboard));
        assert_eq!(route(Listener::Health, "/metrics"), None);
    }

    #[test]
    fn test_metrics_listener_routes() {
        assert_eq!(route(Listener::Metrics, "/metrics"), Some(Endpoint::Metrics));
        for path in ["/healthz", "/readyz", "/livez", "/dashboard", "/"] {
            assert_eq!(route(Listener::Metrics, path), None, "{path}");
        }
    }
}
