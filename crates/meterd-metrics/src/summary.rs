use std::sync::{Arc, Mutex};

use meterd_common::error::{MeterdError, Result};

use crate::{
    labels::{LabelVector, materialize_labels},
    registry::RegisteredMetric,
    series::SeriesMap,
    timer::{Observe, Timer},
    types::{MetricDescriptor, MetricSample, MetricValue},
};

/// Running sum and count per label vector. No quantiles are tracked.
pub struct Summary {
    descriptor: MetricDescriptor,
    series: SeriesMap<Mutex<SummarySnapshot>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SummarySnapshot {
    pub count: u64,
    pub sum: f64,
}

impl Summary {
    pub(crate) fn new(descriptor: MetricDescriptor) -> Self {
        let series = SeriesMap::for_descriptor(&descriptor, Mutex::default);
        Self { descriptor, series }
    }

    pub fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    pub fn observe(&self, labels: &LabelVector, value: f64) -> Result<()> {
        if value.is_nan() {
            return Err(MeterdError::InvalidArgument(format!(
                "summary {} cannot observe NaN",
                self.descriptor.name
            )));
        }

        let label_values = labels.resolve(&self.descriptor.name, &self.descriptor.variable_labels)?;
        let series = self.series.get_or_create(label_values, Mutex::default)?;
        let mut state = series
            .lock()
            .map_err(|_| MeterdError::poisoned("summary series"))?;
        state.count += 1;
        state.sum += value;
        Ok(())
    }

    pub fn start_timer(self: &Arc<Self>, labels: LabelVector) -> Timer<Summary> {
        Timer::start(Arc::clone(self), labels)
    }

    pub fn snapshot(&self, labels: &LabelVector) -> Result<Option<SummarySnapshot>> {
        let label_values = labels.resolve(&self.descriptor.name, &self.descriptor.variable_labels)?;
        match self.series.get(&label_values)? {
            Some(series) => Ok(Some(read_series(&series)?)),
            None => Ok(None),
        }
    }

    pub fn series_count(&self) -> Result<usize> {
        self.series.len()
    }
}

fn read_series(series: &Mutex<SummarySnapshot>) -> Result<SummarySnapshot> {
    series
        .lock()
        .map(|state| *state)
        .map_err(|_| MeterdError::poisoned("summary series"))
}

impl Observe for Summary {
    fn observe(&self, labels: &LabelVector, value: f64) -> Result<()> {
        Summary::observe(self, labels, value)
    }
}

impl RegisteredMetric for Summary {
    fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    fn collect(&self) -> Result<Vec<MetricSample>> {
        self.series
            .entries()?
            .into_iter()
            .map(|(label_values, series)| {
                let snapshot = read_series(&series)?;
                Ok(MetricSample {
                    labels: materialize_labels(&self.descriptor.variable_labels, &label_values),
                    value: MetricValue::Summary {
                        count: snapshot.count,
                        sum: snapshot.sum,
                    },
                })
            })
            .collect()
    }
}
