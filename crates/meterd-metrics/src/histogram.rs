use std::sync::{Arc, Mutex};

use meterd_common::error::{MeterdError, Result};

use crate::{
    labels::{LabelVector, materialize_labels},
    registry::RegisteredMetric,
    series::SeriesMap,
    timer::{Observe, Timer},
    types::{MetricDescriptor, MetricSample, MetricValue},
};

/// Cumulative histogram over the descriptor's bucket boundaries.
pub struct Histogram {
    descriptor: MetricDescriptor,
    series: SeriesMap<Mutex<HistogramState>>,
}

/// Bucket counts, count and sum of one series. All three change together
/// under the series lock.
#[derive(Debug, Clone)]
struct HistogramState {
    bucket_counts: Vec<u64>,
    count: u64,
    sum: f64,
}

impl HistogramState {
    fn new(buckets: usize) -> Self {
        Self {
            bucket_counts: vec![0; buckets],
            count: 0,
            sum: 0.0,
        }
    }
}

/// Point-in-time copy of one histogram series.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
    /// Cumulative `(boundary, count)` pairs; the +Inf bucket is `count`.
    pub buckets: Vec<(f64, u64)>,
    pub count: u64,
    pub sum: f64,
}

impl Histogram {
    pub(crate) fn new(descriptor: MetricDescriptor) -> Self {
        let buckets = descriptor.buckets.len();
        let series = SeriesMap::for_descriptor(&descriptor, || Mutex::new(HistogramState::new(buckets)));
        Self { descriptor, series }
    }

    pub fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    pub fn buckets(&self) -> &[f64] {
        &self.descriptor.buckets
    }

    /// Records `value`: every boundary `>= value` gains one, as do the count
    /// and, by `value`, the sum. Values above the last boundary only reach the
    /// implicit +Inf bucket.
    pub fn observe(&self, labels: &LabelVector, value: f64) -> Result<()> {
        if value.is_nan() {
            return Err(MeterdError::InvalidArgument(format!(
                "histogram {} cannot observe NaN",
                self.descriptor.name
            )));
        }

        let label_values = labels.resolve(&self.descriptor.name, &self.descriptor.variable_labels)?;
        let buckets = self.descriptor.buckets.len();
        let series = self
            .series
            .get_or_create(label_values, || Mutex::new(HistogramState::new(buckets)))?;

        let mut state = series
            .lock()
            .map_err(|_| MeterdError::poisoned("histogram series"))?;
        for (bound, bucket_count) in self
            .descriptor
            .buckets
            .iter()
            .zip(state.bucket_counts.iter_mut())
        {
            if value <= *bound {
                *bucket_count += 1;
            }
        }
        state.count += 1;
        state.sum += value;
        Ok(())
    }

    /// Starts a timer that observes elapsed seconds when stopped.
    pub fn start_timer(self: &Arc<Self>, labels: LabelVector) -> Timer<Histogram> {
        Timer::start(Arc::clone(self), labels)
    }

    /// Copy of the series for `labels`, or `None` if it was never observed.
    pub fn snapshot(&self, labels: &LabelVector) -> Result<Option<HistogramSnapshot>> {
        let label_values = labels.resolve(&self.descriptor.name, &self.descriptor.variable_labels)?;
        match self.series.get(&label_values)? {
            Some(series) => Ok(Some(self.snapshot_series(&series)?)),
            None => Ok(None),
        }
    }

    pub fn series_count(&self) -> Result<usize> {
        self.series.len()
    }

    fn snapshot_series(&self, series: &Mutex<HistogramState>) -> Result<HistogramSnapshot> {
        let state = series
            .lock()
            .map_err(|_| MeterdError::poisoned("histogram series"))?
            .clone();

        Ok(HistogramSnapshot {
            buckets: self
                .descriptor
                .buckets
                .iter()
                .copied()
                .zip(state.bucket_counts)
                .collect(),
            count: state.count,
            sum: state.sum,
        })
    }
}

impl Observe for Histogram {
    fn observe(&self, labels: &LabelVector, value: f64) -> Result<()> {
        Histogram::observe(self, labels, value)
    }
}

impl RegisteredMetric for Histogram {
    fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    fn collect(&self) -> Result<Vec<MetricSample>> {
        self.series
            .entries()?
            .into_iter()
            .map(|(label_values, series)| {
                let snapshot = self.snapshot_series(&series)?;
                Ok(MetricSample {
                    labels: materialize_labels(&self.descriptor.variable_labels, &label_values),
                    value: MetricValue::Histogram {
                        buckets: snapshot.buckets,
                        count: snapshot.count,
                        sum: snapshot.sum,
                    },
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels;

    const BUCKETS: [f64; 5] = [0.1, 0.3, 0.5, 1.0, 1.5];

    fn duration_histogram() -> Histogram {
        Histogram::new(MetricDescriptor::histogram(
            "http_request_duration_seconds",
            "Duration of HTTP requests in seconds",
            &["route"],
            &BUCKETS,
        ))
    }

    fn counts(snapshot: &HistogramSnapshot) -> Vec<u64> {
        snapshot.buckets.iter().map(|(_, count)| *count).collect()
    }

    #[test]
    fn observe_increments_every_bucket_at_or_above_value() {
        let histogram = duration_histogram();
        let labels = labels! { "route" => "/hello" };

        histogram.observe(&labels, 0.3).expect("observe");
        let snapshot = histogram.snapshot(&labels).expect("snapshot").expect("series");
        assert_eq!(counts(&snapshot), vec![0, 1, 1, 1, 1]);
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.sum, 0.3);

        histogram.observe(&labels, 0.05).expect("observe");
        let snapshot = histogram.snapshot(&labels).expect("snapshot").expect("series");
        assert_eq!(counts(&snapshot), vec![1, 2, 2, 2, 2]);
        assert_eq!(snapshot.count, 2);
        assert!((snapshot.sum - 0.35).abs() < 1e-12);
    }

    #[test]
    fn value_above_all_bounds_only_reaches_inf() {
        let histogram = duration_histogram();
        let labels = labels! { "route" => "/slow" };

        histogram.observe(&labels, 7.0).expect("observe");
        let snapshot = histogram.snapshot(&labels).expect("snapshot").expect("series");
        assert_eq!(counts(&snapshot), vec![0, 0, 0, 0, 0]);
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.sum, 7.0);
    }

    #[test]
    fn cumulative_counts_never_decrease() {
        let histogram = duration_histogram();
        let labels = labels! { "route" => "/mixed" };
        let values = [0.0, 0.1, 0.2, 0.45, 0.9, 1.2, 1.5, 2.0, 0.31, 0.08];
        for value in values {
            histogram.observe(&labels, value).expect("observe");
        }

        let snapshot = histogram.snapshot(&labels).expect("snapshot").expect("series");
        let counts = counts(&snapshot);
        assert!(counts.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(counts, vec![3, 4, 6, 7, 9]);
        assert_eq!(snapshot.count, values.len() as u64);
    }

    #[test]
    fn rejects_nan_and_wrong_labels() {
        let histogram = duration_histogram();
        assert!(matches!(
            histogram.observe(&labels! { "route" => "/x" }, f64::NAN),
            Err(MeterdError::InvalidArgument(_))
        ));
        assert!(matches!(
            histogram.observe(&labels! { "path" => "/x" }, 0.2),
            Err(MeterdError::LabelMismatch { .. })
        ));
        assert_eq!(histogram.series_count().expect("count"), 0);
    }

    #[test]
    fn mismatched_labels_leave_existing_series_alone() {
        let histogram = duration_histogram();
        let hello = labels! { "route" => "/hello" };
        histogram.observe(&hello, 0.2).expect("observe");
        let before = histogram.snapshot(&hello).expect("snapshot").expect("series");

        assert!(matches!(
            histogram.observe(&labels! { "route" => "/hello", "code" => 200 }, 0.05),
            Err(MeterdError::LabelMismatch { .. })
        ));
        assert!(matches!(
            histogram.observe(&LabelVector::new(), 0.05),
            Err(MeterdError::LabelMismatch { .. })
        ));

        assert_eq!(histogram.series_count().expect("count"), 1);
        let after = histogram.snapshot(&hello).expect("snapshot").expect("series");
        assert_eq!(counts(&after), counts(&before));
        assert_eq!(after.count, 1);
        assert_eq!(after.sum, 0.2);
    }

    #[test]
    fn timer_observes_once_with_merged_labels() {
        let histogram = Arc::new(Histogram::new(MetricDescriptor::histogram(
            "op_seconds",
            "Op duration",
            &["method", "code"],
            &BUCKETS,
        )));

        let timer = histogram.start_timer(labels! { "method" => "GET" });
        let seconds = timer.stop_with(&labels! { "code" => 200 }).expect("stop");

        let snapshot = histogram
            .snapshot(&labels! { "method" => "GET", "code" => 200 })
            .expect("snapshot")
            .expect("series");
        assert_eq!(snapshot.count, 1);
        assert_eq!(snapshot.sum, seconds);
    }

    #[test]
    fn timer_stop_with_missing_labels_fails() {
        let histogram = Arc::new(Histogram::new(MetricDescriptor::histogram(
            "op_seconds",
            "Op duration",
            &["method", "code"],
            &BUCKETS,
        )));

        let timer = histogram.start_timer(labels! { "method" => "GET" });
        assert!(matches!(timer.stop(), Err(MeterdError::LabelMismatch { .. })));
        assert_eq!(histogram.series_count().expect("count"), 0);
    }
}
