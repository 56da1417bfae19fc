//! Metric registration and the monitoring HTTP endpoint.

use axum::extract::State as AxumState;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{ProcessorError, ProcessorResult};

/// Total segments closed since process start.
pub const COMPLETED_SEGMENTS: &str = "trip_processor_completed_segments_total";

/// Segments currently open.
pub const ONGOING_SEGMENTS: &str = "trip_processor_ongoing_segments_total";

/// Input records that failed to decode and were skipped.
pub const MALFORMED_EVENTS: &str = "trip_processor_malformed_events_total";

/// Install the Prometheus recorder and describe the processor metrics.
/// Must be called once, before any metric is touched.
pub fn install_recorder() -> ProcessorResult<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| ProcessorError::monitoring(format!("recorder install failed: {e}")))?;

    describe_counter!(COMPLETED_SEGMENTS, "Total number of completed trip segments.");
    describe_gauge!(ONGOING_SEGMENTS, "Number of currently ongoing trip segments.");
    describe_counter!(MALFORMED_EVENTS, "Device-status records skipped because they failed to decode.");

    Ok(handle)
}

#[derive(Clone)]
struct MonitoringState {
    handle: PrometheusHandle,
}

/// HTTP server exposing `/metrics` and `/health` on the monitoring
/// port.
pub struct MonitoringServer {
    handle: PrometheusHandle,
    port: u16,
    shutdown: CancellationToken,
}

impl MonitoringServer {
    pub fn new(handle: PrometheusHandle, port: u16) -> Self {
        Self {
            handle,
            port,
            shutdown: CancellationToken::new(),
        }
    }

    /// Bind the monitoring port and serve in the background until
    /// [`stop`](Self::stop).
    pub async fn start(&self) -> ProcessorResult<()> {
        let bind_address = format!("0.0.0.0:{}", self.port);
        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .with_state(MonitoringState {
                handle: self.handle.clone(),
            });

        let listener = TcpListener::bind(&bind_address).await.map_err(|e| {
            ProcessorError::monitoring(format!("failed to bind {bind_address}: {e}"))
        })?;
        info!("monitoring server listening on {bind_address}");

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                shutdown.cancelled().await;
            });
            if let Err(err) = serve.await {
                warn!("monitoring server error: {err}");
            }
        });

        Ok(())
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

async fn metrics_handler(AxumState(state): AxumState<MonitoringState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.handle.render(),
    )
}

async fn health_handler() -> impl IntoResponse {
    StatusCode::OK
}
