//! Syncer metrics and the HTTP server exposing them

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Reconciliation passes by kind and by the side that triggered them
    pub static ref RECONCILIATIONS: CounterVec = register_counter_vec!(
        "vcluster_syncer_reconciliations_total",
        "Total number of reconciliation passes",
        &["kind", "side"]
    ).unwrap();

    /// Failed passes by kind and error reason
    pub static ref RECONCILIATION_ERRORS: CounterVec = register_counter_vec!(
        "vcluster_syncer_reconciliation_errors_total",
        "Total number of failed reconciliation passes",
        &["kind", "reason"]
    ).unwrap();

    /// Reconciliation duration histogram
    pub static ref RECONCILE_DURATION: HistogramVec = register_histogram_vec!(
        "vcluster_syncer_reconcile_duration_seconds",
        "Duration of reconciliation passes in seconds",
        &["kind"],
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    ).unwrap();

    /// Outcome of every sync operation
    pub static ref SYNC_ACTIONS: CounterVec = register_counter_vec!(
        "vcluster_syncer_sync_actions_total",
        "Sync operations by outcome",
        &["kind", "action"]
    ).unwrap();

    /// Host objects owned by this virtual cluster, as of the last sweep
    pub static ref MANAGED_OBJECTS: GaugeVec = register_gauge_vec!(
        "vcluster_syncer_managed_objects",
        "Number of managed host objects by kind",
        &["kind"]
    ).unwrap();

    /// Syncer health (1 = healthy, 0 = unhealthy)
    pub static ref SYNCER_HEALTH: prometheus::Gauge = prometheus::register_gauge!(
        "vcluster_syncer_health",
        "Syncer health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

static READY: AtomicBool = AtomicBool::new(false);

/// Mark the syncer ready once the startup sweeps have run
pub fn set_ready(ready: bool) {
    READY.store(ready, Ordering::Relaxed);
}

pub fn is_ready() -> bool {
    READY.load(Ordering::Relaxed)
}

/// Serve `/metrics`, `/healthz` and `/readyz` until `shutdown` is cancelled
pub async fn serve(port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    SYNCER_HEALTH.set(1.0);

    loop {
        let (stream, _) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = shutdown.cancelled() => {
                SYNCER_HEALTH.set(0.0);
                info!("Metrics server stopped");
                return Ok(());
            }
        };
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match req.uri().path() {
        "/metrics" => metrics_response(),
        "/healthz" => probe_response(SYNCER_HEALTH.get() > 0.0),
        "/readyz" => probe_response(is_ready()),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", encoder.format_type())
        .body(Full::new(Bytes::from(buffer)))
        .unwrap()
}

fn probe_response(ok: bool) -> Response<Full<Bytes>> {
    if ok {
        text_response(StatusCode::OK, "ok")
    } else {
        text_response(StatusCode::SERVICE_UNAVAILABLE, "not ready")
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_status_codes() {
        assert_eq!(probe_response(true).status(), StatusCode::OK);
        assert_eq!(probe_response(false).status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_metrics_are_exposed() {
        SYNC_ACTIONS.with_label_values(&["secrets", "created"]).inc();
        let response = metrics_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
