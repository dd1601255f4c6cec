use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, warn};

use crate::router::AppState;

pub async fn hello(State(state): State<Arc<AppState>>) -> &'static str {
    let delay = state.config.simulated_delay();
    debug!(delay_ms = delay.as_millis() as u64, "simulating hello latency");
    tokio::time::sleep(delay).await;

    "Hello from the metrics server!"
}

pub async fn simulated_error(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Err(err) = state.http_metrics.record_error("/error") {
        warn!(error = %err, kind = err.kind(), "failed to count simulated error");
    }

    (StatusCode::INTERNAL_SERVER_ERROR, "Simulated error occurred")
}
