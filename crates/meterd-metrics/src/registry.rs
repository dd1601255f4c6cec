use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use meterd_common::error::{MeterdError, Result};
use tracing::debug;

use crate::{
    counter::Counter,
    exposition,
    gauge::Gauge,
    histogram::Histogram,
    summary::Summary,
    types::{CollectedMetric, MetricDescriptor, MetricSample, MetricType},
};

/// Implemented by every instrument the registry can render.
pub(crate) trait RegisteredMetric: Send + Sync {
    fn descriptor(&self) -> &MetricDescriptor;
    fn collect(&self) -> Result<Vec<MetricSample>>;
}

/// Handle to a registered instrument of any kind.
#[derive(Clone)]
pub enum Metric {
    Counter(Arc<Counter>),
    Gauge(Arc<Gauge>),
    Histogram(Arc<Histogram>),
    Summary(Arc<Summary>),
}

impl Metric {
    fn from_descriptor(descriptor: MetricDescriptor) -> Self {
        match descriptor.metric_type {
            MetricType::Counter => Self::Counter(Arc::new(Counter::new(descriptor))),
            MetricType::Gauge => Self::Gauge(Arc::new(Gauge::new(descriptor))),
            MetricType::Histogram => Self::Histogram(Arc::new(Histogram::new(descriptor))),
            MetricType::Summary => Self::Summary(Arc::new(Summary::new(descriptor))),
        }
    }

    pub fn descriptor(&self) -> &MetricDescriptor {
        self.as_registered().descriptor()
    }

    pub fn as_counter(&self) -> Option<&Arc<Counter>> {
        match self {
            Self::Counter(counter) => Some(counter),
            _ => None,
        }
    }

    pub fn as_gauge(&self) -> Option<&Arc<Gauge>> {
        match self {
            Self::Gauge(gauge) => Some(gauge),
            _ => None,
        }
    }

    pub fn as_histogram(&self) -> Option<&Arc<Histogram>> {
        match self {
            Self::Histogram(histogram) => Some(histogram),
            _ => None,
        }
    }

    pub fn as_summary(&self) -> Option<&Arc<Summary>> {
        match self {
            Self::Summary(summary) => Some(summary),
            _ => None,
        }
    }

    fn as_registered(&self) -> &dyn RegisteredMetric {
        match self {
            Self::Counter(counter) => counter.as_ref(),
            Self::Gauge(gauge) => gauge.as_ref(),
            Self::Histogram(histogram) => histogram.as_ref(),
            Self::Summary(summary) => summary.as_ref(),
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    metrics: Vec<Metric>,
    by_name: HashMap<String, usize>,
}

/// Owns every registered instrument. Create one per process (or per test) and
/// share it behind an `Arc`.
pub struct MetricsRegistry {
    inner: RwLock<RegistryInner>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
        }
    }

    /// Validates `descriptor` and registers a fresh instrument for it.
    pub fn register(&self, descriptor: MetricDescriptor) -> Result<Metric> {
        descriptor.validate()?;
        let metric = Metric::from_descriptor(descriptor);
        self.insert(metric.clone())?;
        Ok(metric)
    }

    pub fn register_counter(
        &self,
        name: &str,
        help: &str,
        variable_labels: &[&str],
    ) -> Result<Arc<Counter>> {
        let metric = self.register(MetricDescriptor::counter(name, help, variable_labels))?;
        expect_kind(metric.as_counter(), name)
    }

    pub fn register_gauge(
        &self,
        name: &str,
        help: &str,
        variable_labels: &[&str],
    ) -> Result<Arc<Gauge>> {
        let metric = self.register(MetricDescriptor::gauge(name, help, variable_labels))?;
        expect_kind(metric.as_gauge(), name)
    }

    pub fn register_histogram(
        &self,
        name: &str,
        help: &str,
        variable_labels: &[&str],
        buckets: &[f64],
    ) -> Result<Arc<Histogram>> {
        let metric = self.register(MetricDescriptor::histogram(
            name,
            help,
            variable_labels,
            buckets,
        ))?;
        expect_kind(metric.as_histogram(), name)
    }

    pub fn register_summary(
        &self,
        name: &str,
        help: &str,
        variable_labels: &[&str],
    ) -> Result<Arc<Summary>> {
        let metric = self.register(MetricDescriptor::summary(name, help, variable_labels))?;
        expect_kind(metric.as_summary(), name)
    }

    pub fn find(&self, name: &str) -> Result<Option<MetricDescriptor>> {
        Ok(self.get(name)?.map(|metric| metric.descriptor().clone()))
    }

    pub fn get(&self, name: &str) -> Result<Option<Metric>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| MeterdError::poisoned("metrics registry"))?;
        Ok(inner
            .by_name
            .get(name)
            .map(|index| inner.metrics[*index].clone()))
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> Result<Vec<MetricDescriptor>> {
        Ok(self
            .snapshot_metrics()?
            .iter()
            .map(|metric| metric.descriptor().clone())
            .collect())
    }

    /// Reads every instrument in registration order. Each series is copied
    /// under its own lock; the registry lock is released before any series is
    /// read.
    pub fn collect_all(&self) -> Result<Vec<CollectedMetric>> {
        self.snapshot_metrics()?
            .iter()
            .map(|metric| {
                let registered = metric.as_registered();
                Ok(CollectedMetric {
                    descriptor: registered.descriptor().clone(),
                    samples: registered.collect()?,
                })
            })
            .collect()
    }

    pub fn render_prometheus(&self) -> Result<String> {
        exposition::render(&self.collect_all()?)
    }

    fn snapshot_metrics(&self) -> Result<Vec<Metric>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| MeterdError::poisoned("metrics registry"))?;
        Ok(inner.metrics.clone())
    }

    fn insert(&self, metric: Metric) -> Result<()> {
        let descriptor = metric.descriptor();
        let name = descriptor.name.clone();
        let mut inner = self
            .inner
            .write()
            .map_err(|_| MeterdError::poisoned("metrics registry"))?;

        if inner.by_name.contains_key(&name) {
            return Err(MeterdError::DuplicateName(name));
        }

        debug!(
            metric = %name,
            kind = descriptor.metric_type.as_prometheus_type(),
            labels = ?descriptor.variable_labels,
            "registered metric"
        );
        let index = inner.metrics.len();
        inner.metrics.push(metric);
        inner.by_name.insert(name, index);
        Ok(())
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn expect_kind<T>(metric: Option<&Arc<T>>, name: &str) -> Result<Arc<T>> {
    metric
        .cloned()
        .ok_or_else(|| MeterdError::Internal(format!("registered metric {name} has unexpected kind")))
}
