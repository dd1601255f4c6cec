//! In-process metric instruments and their Prometheus text exposition.
//!
//! Instruments are registered on an explicit [`MetricsRegistry`] and shared
//! as `Arc` handles. Every instrument keeps one accumulator per label vector;
//! [`MetricsRegistry::render_prometheus`] snapshots each series and renders
//! the registry in registration order.

pub mod collectors;
pub mod counter;
pub mod exposition;
pub mod gauge;
pub mod histogram;
pub mod labels;
pub mod registry;
mod series;
pub mod summary;
pub mod timer;
pub mod types;

pub use collectors::{
    http::{HttpMetrics, RequestTracker},
    process::ProcessMetrics,
};
pub use counter::Counter;
pub use exposition::CONTENT_TYPE;
pub use gauge::Gauge;
pub use histogram::{Histogram, HistogramSnapshot};
pub use labels::LabelVector;
pub use registry::{Metric, MetricsRegistry};
pub use summary::{Summary, SummarySnapshot};
pub use timer::{Observe, Timer};
pub use types::{
    CollectedMetric, DEFAULT_BUCKETS, MetricDescriptor, MetricSample, MetricType, MetricValue,
    exponential_buckets, linear_buckets,
};
