use meterd_common::error::{MeterdError, Result};

use crate::labels::validate_label_names;

/// Default histogram boundaries, in seconds.
pub const DEFAULT_BUCKETS: [f64; 11] = [
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricType {
    pub fn as_prometheus_type(&self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
            Self::Summary => "summary",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricDescriptor {
    pub name: String,
    pub help: String,
    pub metric_type: MetricType,
    pub variable_labels: Vec<String>,
    /// Histogram boundaries; empty for every other kind.
    pub buckets: Vec<f64>,
}

impl MetricDescriptor {
    pub fn new(name: &str, help: &str, metric_type: MetricType, variable_labels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            help: help.to_string(),
            metric_type,
            variable_labels: variable_labels.iter().map(|label| (*label).to_string()).collect(),
            buckets: Vec::new(),
        }
    }

    pub fn counter(name: &str, help: &str, variable_labels: &[&str]) -> Self {
        Self::new(name, help, MetricType::Counter, variable_labels)
    }

    pub fn gauge(name: &str, help: &str, variable_labels: &[&str]) -> Self {
        Self::new(name, help, MetricType::Gauge, variable_labels)
    }

    pub fn histogram(name: &str, help: &str, variable_labels: &[&str], buckets: &[f64]) -> Self {
        Self {
            buckets: buckets.to_vec(),
            ..Self::new(name, help, MetricType::Histogram, variable_labels)
        }
    }

    pub fn summary(name: &str, help: &str, variable_labels: &[&str]) -> Self {
        Self::new(name, help, MetricType::Summary, variable_labels)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_metric_name(&self.name) {
            return Err(MeterdError::InvalidDescriptor(format!(
                "invalid metric name: {:?}",
                self.name
            )));
        }

        validate_label_names(self.metric_type, &self.variable_labels)?;

        match self.metric_type {
            MetricType::Histogram => validate_buckets(&self.buckets),
            _ if !self.buckets.is_empty() => Err(MeterdError::InvalidDescriptor(format!(
                "buckets are only valid for histograms: {}",
                self.name
            ))),
            _ => Ok(()),
        }
    }
}

/// Histogram boundaries must be non-empty, finite and strictly ascending.
pub fn validate_buckets(buckets: &[f64]) -> Result<()> {
    if buckets.is_empty() {
        return Err(MeterdError::InvalidDescriptor(
            "histogram needs at least one bucket".to_string(),
        ));
    }

    if let Some(bound) = buckets.iter().find(|bound| !bound.is_finite()) {
        return Err(MeterdError::InvalidArgument(format!(
            "bucket boundary must be finite: {bound}"
        )));
    }

    if let Some(pair) = buckets.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(MeterdError::InvalidArgument(format!(
            "bucket boundaries must be strictly ascending: {} then {}",
            pair[0], pair[1]
        )));
    }

    Ok(())
}

/// `count` boundaries starting at `start`, each `width` apart.
pub fn linear_buckets(start: f64, width: f64, count: usize) -> Result<Vec<f64>> {
    if count == 0 {
        return Err(MeterdError::InvalidArgument(
            "linear buckets need a positive count".to_string(),
        ));
    }
    if width.is_nan() || width <= 0.0 {
        return Err(MeterdError::InvalidArgument(format!(
            "linear bucket width must be positive: {width}"
        )));
    }

    Ok((0..count).map(|index| start + width * index as f64).collect())
}

/// `count` boundaries starting at `start`, each `factor` times the previous.
pub fn exponential_buckets(start: f64, factor: f64, count: usize) -> Result<Vec<f64>> {
    if count == 0 {
        return Err(MeterdError::InvalidArgument(
            "exponential buckets need a positive count".to_string(),
        ));
    }
    if start.is_nan() || start <= 0.0 {
        return Err(MeterdError::InvalidArgument(format!(
            "exponential bucket start must be positive: {start}"
        )));
    }
    if factor.is_nan() || factor <= 1.0 {
        return Err(MeterdError::InvalidArgument(format!(
            "exponential bucket factor must be greater than 1: {factor}"
        )));
    }

    let mut buckets = Vec::with_capacity(count);
    let mut bound = start;
    for _ in 0..count {
        buckets.push(bound);
        bound *= factor;
    }
    Ok(buckets)
}

fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_' || first == ':')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(f64),
    Gauge(f64),
    /// Cumulative `(boundary, count)` pairs, finite boundaries only.
    Histogram {
        buckets: Vec<(f64, u64)>,
        count: u64,
        sum: f64,
    },
    Summary {
        count: u64,
        sum: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub labels: Vec<(String, String)>,
    pub value: MetricValue,
}

#[derive(Debug, Clone)]
pub struct CollectedMetric {
    pub descriptor: MetricDescriptor,
    pub samples: Vec<MetricSample>,
}
