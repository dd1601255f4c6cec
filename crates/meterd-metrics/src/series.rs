//! Per-metric series storage shared by every instrument kind.

use std::{
    collections::BTreeMap,
    sync::{
        Arc, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use meterd_common::error::{MeterdError, Result};
use tracing::debug;

use crate::{labels::LabelValues, types::MetricDescriptor};

/// Lazily populated map from label values to one accumulator per series.
///
/// Lookups take the read lock; the write lock is only taken to insert a series
/// that the read path did not find, and the insert re-checks under it so two
/// racing first observations share one accumulator.
pub(crate) struct SeriesMap<T> {
    metric: String,
    series: RwLock<BTreeMap<LabelValues, Arc<T>>>,
}

impl<T> SeriesMap<T> {
    #[cfg(test)]
    pub(crate) fn new(metric: &str) -> Self {
        Self {
            metric: metric.to_string(),
            series: RwLock::new(BTreeMap::new()),
        }
    }

    /// Metrics without label names expose their single series from the start.
    pub(crate) fn for_descriptor(descriptor: &MetricDescriptor, init: impl FnOnce() -> T) -> Self {
        let mut series = BTreeMap::new();
        if descriptor.variable_labels.is_empty() {
            series.insert(LabelValues::new(), Arc::new(init()));
        }

        Self {
            metric: descriptor.name.clone(),
            series: RwLock::new(series),
        }
    }

    pub(crate) fn get(&self, label_values: &LabelValues) -> Result<Option<Arc<T>>> {
        let guard = self
            .series
            .read()
            .map_err(|_| MeterdError::poisoned("series map"))?;
        Ok(guard.get(label_values).cloned())
    }

    pub(crate) fn get_or_create(
        &self,
        label_values: LabelValues,
        init: impl FnOnce() -> T,
    ) -> Result<Arc<T>> {
        if let Some(existing) = self.get(&label_values)? {
            return Ok(existing);
        }

        let mut guard = self
            .series
            .write()
            .map_err(|_| MeterdError::poisoned("series map"))?;
        let series = guard.entry(label_values).or_insert_with_key(|key| {
            debug!(metric = %self.metric, labels = ?key, "created series");
            Arc::new(init())
        });
        Ok(Arc::clone(series))
    }

    /// Clones the series handles so callers can read each one without holding
    /// the map lock.
    pub(crate) fn entries(&self) -> Result<Vec<(LabelValues, Arc<T>)>> {
        let guard = self
            .series
            .read()
            .map_err(|_| MeterdError::poisoned("series map"))?;
        Ok(guard
            .iter()
            .map(|(labels, series)| (labels.clone(), Arc::clone(series)))
            .collect())
    }

    pub(crate) fn len(&self) -> Result<usize> {
        let guard = self
            .series
            .read()
            .map_err(|_| MeterdError::poisoned("series map"))?;
        Ok(guard.len())
    }
}

/// `f64` stored as bits in an `AtomicU64`, updated with a CAS loop.
#[derive(Debug, Default)]
pub(crate) struct AtomicF64 {
    bits: AtomicU64,
}

impl AtomicF64 {
    pub(crate) fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Release);
    }

    pub(crate) fn add(&self, delta: f64) {
        let mut current = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match self.bits.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }
}
