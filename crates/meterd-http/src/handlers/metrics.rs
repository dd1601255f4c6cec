use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use meterd_metrics::CONTENT_TYPE;
use tracing::{error, warn};

use crate::router::AppState;

/// Scrape endpoint. Process samples are refreshed lazily on every scrape.
pub async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> Response {
    if let Err(err) = state.process_metrics.refresh() {
        warn!(error = %err, kind = err.kind(), "failed to refresh process metrics");
    }

    let payload = match state.registry.render_prometheus() {
        Ok(payload) => payload,
        Err(err) => {
            error!(error = %err, kind = err.kind(), "failed to render metrics");
            return (StatusCode::INTERNAL_SERVER_ERROR, "failed to render metrics").into_response();
        }
    };

    let mut response = Response::new(Body::from(payload));
    *response.status_mut() = StatusCode::OK;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));

    response
}
