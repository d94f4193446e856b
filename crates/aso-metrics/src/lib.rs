//! ---
//! aso_section: "04-observability"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Prometheus registry sharing and the /metrics exporter."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{GaugeVec, Histogram, HistogramOpts, IntCounter, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Registry shared between the telemetry core and the exporter.
pub type SharedRegistry = Arc<Registry>;

pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Serve `registry` at `GET /metrics` on `addr`. Port 0 picks a free port;
/// [`MetricsServer::addr`] reports the one actually bound.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get(move || render_metrics(Arc::clone(&registry))),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {}", addr))?;
    std_listener
        .set_nonblocking(true)
        .context("failed to configure metrics listener as non-blocking")?;
    let bound = std_listener
        .local_addr()
        .context("failed to read metrics listener address")?;
    let listener = TcpListener::from_std(std_listener)
        .context("failed to convert std listener into tokio listener")?;

    info!(address = %bound, "metrics exporter listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics exporter stopped with an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr: bound,
        shutdown: Some(shutdown_tx),
        task,
    })
}

async fn render_metrics(registry: SharedRegistry) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&registry.gather()) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(prometheus::TEXT_FORMAT),
            )],
            body,
        ),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"))],
                String::from("metrics encoding error"),
            )
        }
    }
}

/// Running exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting scrapes and wait for in-flight requests to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics about the daemon process itself.
#[derive(Clone)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
    config_load_seconds: Histogram,
    build_info: GaugeVec,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "asod_starts_total",
            "Number of times the observatory daemon initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.0005, 2.0, 12)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "asod_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        let build_info = GaugeVec::new(
            Opts::new("asod_build_info", "Build metadata of the running daemon"),
            &["version", "profile"],
        )?;
        registry.register(Box::new(build_info.clone()))?;

        Ok(Self {
            registry,
            starts_total,
            config_load_seconds,
            build_info,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }

    pub fn set_build_info(&self, version: &str, profile: &str) {
        self.build_info
            .with_label_values(&[version, profile])
            .set(1.0);
    }
}

impl std::fmt::Debug for DaemonMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonMetrics").finish_non_exhaustive()
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_metrics_register_once() {
        let registry = new_registry();
        let metrics = DaemonMetrics::new(Arc::clone(&registry)).expect("register");
        metrics.inc_start();
        metrics.observe_config_load(0.002);
        metrics.set_build_info("0.1.0", "debug");
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_owned())
            .collect();
        assert!(names.contains(&"asod_starts_total".to_owned()));
        assert!(names.contains(&"asod_build_info".to_owned()));
        assert!(DaemonMetrics::new(registry).is_err());
    }
}
