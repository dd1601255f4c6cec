use std::time::{SystemTime, UNIX_EPOCH};

use meterd_common::error::{MeterdError, Result};

use crate::{
    labels::{LabelVector, materialize_labels},
    registry::RegisteredMetric,
    series::{AtomicF64, SeriesMap},
    types::{MetricDescriptor, MetricSample, MetricValue},
};

pub struct Gauge {
    descriptor: MetricDescriptor,
    series: SeriesMap<AtomicF64>,
}

impl Gauge {
    pub(crate) fn new(descriptor: MetricDescriptor) -> Self {
        let series = SeriesMap::for_descriptor(&descriptor, AtomicF64::default);
        Self { descriptor, series }
    }

    pub fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    pub fn increment(&self, labels: &LabelVector, amount: f64) -> Result<()> {
        self.series_for(labels)?.add(amount);
        Ok(())
    }

    pub fn inc(&self, labels: &LabelVector) -> Result<()> {
        self.increment(labels, 1.0)
    }

    pub fn decrement(&self, labels: &LabelVector, amount: f64) -> Result<()> {
        self.increment(labels, -amount)
    }

    pub fn dec(&self, labels: &LabelVector) -> Result<()> {
        self.decrement(labels, 1.0)
    }

    pub fn set(&self, labels: &LabelVector, value: f64) -> Result<()> {
        self.series_for(labels)?.set(value);
        Ok(())
    }

    /// Sets the gauge to the current unix time in seconds.
    pub fn set_to_current_time(&self, labels: &LabelVector) -> Result<()> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|err| MeterdError::Internal(format!("system clock before unix epoch: {err}")))?;
        self.set(labels, now.as_secs_f64())
    }

    pub fn value(&self, labels: &LabelVector) -> Result<f64> {
        let label_values = labels.resolve(&self.descriptor.name, &self.descriptor.variable_labels)?;
        Ok(self
            .series
            .get(&label_values)?
            .map_or(0.0, |series| series.get()))
    }

    pub fn series_count(&self) -> Result<usize> {
        self.series.len()
    }

    fn series_for(&self, labels: &LabelVector) -> Result<std::sync::Arc<AtomicF64>> {
        let label_values = labels.resolve(&self.descriptor.name, &self.descriptor.variable_labels)?;
        self.series.get_or_create(label_values, AtomicF64::default)
    }
}

impl RegisteredMetric for Gauge {
    fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    fn collect(&self) -> Result<Vec<MetricSample>> {
        Ok(self
            .series
            .entries()?
            .into_iter()
            .map(|(label_values, value)| MetricSample {
                labels: materialize_labels(&self.descriptor.variable_labels, &label_values),
                value: MetricValue::Gauge(value.get()),
            })
            .collect())
    }
}
