use std::sync::Arc;

use meterd_common::error::Result;
use tracing::warn;

use crate::{
    counter::Counter,
    gauge::Gauge,
    histogram::Histogram,
    labels,
    labels::LabelVector,
    registry::MetricsRegistry,
    summary::Summary,
    timer::Timer,
};

pub const REQUEST_DURATION_BUCKETS: [f64; 5] = [0.1, 0.3, 0.5, 1.0, 1.5];

/// Request instruments shared by every protocol adapter.
pub struct HttpMetrics {
    requests_total: Arc<Counter>,
    request_duration_seconds: Arc<Histogram>,
    request_size_bytes: Arc<Summary>,
    in_flight_requests: Arc<Gauge>,
    errors_total: Arc<Counter>,
}

impl HttpMetrics {
    pub fn register(registry: &MetricsRegistry) -> Result<Self> {
        let requests_total = registry.register_counter(
            "http_requests_total",
            "Total number of HTTP requests received",
            &["method", "route", "code"],
        )?;

        let request_duration_seconds = registry.register_histogram(
            "http_request_duration_seconds",
            "Duration of HTTP requests in seconds",
            &["method", "route", "code"],
            &REQUEST_DURATION_BUCKETS,
        )?;

        let request_size_bytes = registry.register_summary(
            "http_request_size_bytes",
            "Size of HTTP request in bytes",
            &["method", "route"],
        )?;

        let in_flight_requests = registry.register_gauge(
            "http_in_flight_requests",
            "Number of HTTP requests currently in flight",
            &[],
        )?;

        let errors_total = registry.register_counter(
            "http_errors_total",
            "Total number of simulated errors",
            &["route"],
        )?;

        Ok(Self {
            requests_total,
            request_duration_seconds,
            request_size_bytes,
            in_flight_requests,
            errors_total,
        })
    }

    /// Marks a request as started: raises the in-flight gauge and starts the
    /// duration timer. Finishing the tracker records the request; dropping it
    /// unfinished only lowers the in-flight gauge again.
    pub fn begin(&self, method: &str, route: &str) -> Result<RequestTracker> {
        self.in_flight_requests.inc(&LabelVector::new())?;
        let in_flight = InFlightGuard {
            gauge: Some(Arc::clone(&self.in_flight_requests)),
        };
        let timer = self
            .request_duration_seconds
            .start_timer(labels! { "method" => method, "route" => route });

        Ok(RequestTracker {
            requests_total: Arc::clone(&self.requests_total),
            request_size_bytes: Arc::clone(&self.request_size_bytes),
            in_flight,
            method: method.to_string(),
            route: route.to_string(),
            timer,
        })
    }

    pub fn record_error(&self, route: &str) -> Result<()> {
        self.errors_total.inc(&labels! { "route" => route })
    }

    pub fn requests_total(&self) -> &Arc<Counter> {
        &self.requests_total
    }

    pub fn request_duration_seconds(&self) -> &Arc<Histogram> {
        &self.request_duration_seconds
    }

    pub fn request_size_bytes(&self) -> &Arc<Summary> {
        &self.request_size_bytes
    }

    pub fn in_flight_requests(&self) -> &Arc<Gauge> {
        &self.in_flight_requests
    }

    pub fn errors_total(&self) -> &Arc<Counter> {
        &self.errors_total
    }
}

/// Holds one unit of the in-flight gauge until released or dropped.
struct InFlightGuard {
    gauge: Option<Arc<Gauge>>,
}

impl InFlightGuard {
    fn release(mut self) -> Result<()> {
        match self.gauge.take() {
            Some(gauge) => gauge.dec(&LabelVector::new()),
            None => Ok(()),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(gauge) = self.gauge.take()
            && let Err(err) = gauge.dec(&LabelVector::new())
        {
            warn!(error = %err, kind = err.kind(), "failed to release in-flight request");
        }
    }
}

/// One in-flight request. Finishing consumes it; a tracker dropped before
/// finishing (client gone, timeout, panic) records no duration, count or size.
#[must_use = "an unfinished tracker records nothing but the in-flight change"]
pub struct RequestTracker {
    requests_total: Arc<Counter>,
    request_size_bytes: Arc<Summary>,
    in_flight: InFlightGuard,
    method: String,
    route: String,
    timer: Timer<Histogram>,
}

impl RequestTracker {
    /// Records completion with status `code` and payload size `size_bytes`.
    /// Returns the observed duration in seconds.
    ///
    /// Every instrument is updated even when an earlier one fails; the first
    /// failure is returned.
    pub fn finish(self, code: u16, size_bytes: u64) -> Result<f64> {
        let in_flight = self.in_flight.release();
        let duration = self.timer.stop_with(&labels! { "code" => code });
        let counted = self.requests_total.inc(&labels! {
            "method" => &self.method,
            "route" => &self.route,
            "code" => code,
        });
        let sized = self.request_size_bytes.observe(
            &labels! { "method" => &self.method, "route" => &self.route },
            size_bytes as f64,
        );

        in_flight?;
        counted?;
        sized?;
        duration
    }
}
