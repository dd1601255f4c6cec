use std::sync::Arc;

use axum::{
    extract::{MatchedPath, Request, State},
    http::{HeaderMap, header::CONTENT_LENGTH},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::router::AppState;

/// Wraps one request in the shared HTTP instruments.
///
/// The duration covers exactly the span between entering this middleware and
/// the inner handler returning its response. Instrument failures are logged
/// and never change the response.
pub async fn track_http_metrics(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().as_str().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let size_bytes = content_length(request.headers());

    let tracker = match state.http_metrics.begin(&method, &route) {
        Ok(tracker) => Some(tracker),
        Err(err) => {
            warn!(error = %err, kind = err.kind(), %method, %route, "failed to start request metrics");
            None
        }
    };

    let response = next.run(request).await;

    if let Some(tracker) = tracker {
        let status = response.status().as_u16();
        if let Err(err) = tracker.finish(status, size_bytes) {
            warn!(error = %err, kind = err.kind(), %method, %route, status, "failed to record request metrics");
        }
    }

    response
}

/// Request size as declared by `Content-Length`; 0 when the header is absent
/// or unparsable. The body itself is never buffered, so a bodiless GET counts
/// as 0 bytes rather than the size of an empty serialized payload.
fn content_length(headers: &HeaderMap) -> u64 {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn content_length_defaults_to_zero() {
        let mut headers = HeaderMap::new();
        assert_eq!(content_length(&headers), 0);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static(" 42 "));
        assert_eq!(content_length(&headers), 42);

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("not-a-number"));
        assert_eq!(content_length(&headers), 0);
    }
}
