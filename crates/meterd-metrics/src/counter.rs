use meterd_common::error::{MeterdError, Result};

use crate::{
    labels::{LabelVector, materialize_labels},
    registry::RegisteredMetric,
    series::{AtomicF64, SeriesMap},
    types::{MetricDescriptor, MetricSample, MetricValue},
};

/// Monotonic counter, one accumulator per label vector.
pub struct Counter {
    descriptor: MetricDescriptor,
    series: SeriesMap<AtomicF64>,
}

impl Counter {
    pub(crate) fn new(descriptor: MetricDescriptor) -> Self {
        let series = SeriesMap::for_descriptor(&descriptor, AtomicF64::default);
        Self { descriptor, series }
    }

    pub fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    /// Adds `amount` to the series identified by `labels`.
    ///
    /// Negative or NaN amounts are rejected and leave every series untouched.
    pub fn increment(&self, labels: &LabelVector, amount: f64) -> Result<()> {
        if amount.is_nan() || amount < 0.0 {
            return Err(MeterdError::InvalidArgument(format!(
                "counter {} cannot be incremented by {amount}",
                self.descriptor.name
            )));
        }

        let label_values = labels.resolve(&self.descriptor.name, &self.descriptor.variable_labels)?;
        let series = self.series.get_or_create(label_values, AtomicF64::default)?;
        series.add(amount);
        Ok(())
    }

    pub fn inc(&self, labels: &LabelVector) -> Result<()> {
        self.increment(labels, 1.0)
    }

    /// Current value; 0 for a valid label vector that was never observed.
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
}

impl RegisteredMetric for Counter {
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
                value: MetricValue::Counter(value.get()),
            })
            .collect())
    }
}
