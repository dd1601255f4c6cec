//! Label vectors and label-name validation.
//!
//! A [`LabelVector`] keeps pairs in insertion order so rendering follows the
//! caller, but two vectors holding the same pairs compare equal regardless of
//! order. Instruments resolve a vector against their declared label names and
//! key series by the values in declared order.

use std::fmt::Display;

use meterd_common::error::{MeterdError, Result};

use crate::types::MetricType;

/// Label values of one series, in the order the descriptor declares the names.
pub type LabelValues = Vec<String>;

#[derive(Debug, Clone, Default)]
pub struct LabelVector {
    pairs: Vec<(String, String)>,
}

impl LabelVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`LabelVector::insert`].
    pub fn with(mut self, name: impl Into<String>, value: impl Display) -> Self {
        self.insert(name, value);
        self
    }

    /// Sets `name` to `value`. An existing name keeps its position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Display) {
        let name = name.into();
        let value = value.to_string();
        match self.pairs.iter_mut().find(|(key, _)| *key == name) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Returns a copy of `self` with every pair of `other` applied on top.
    pub fn merge(&self, other: &LabelVector) -> LabelVector {
        let mut merged = self.clone();
        for (name, value) in other.iter() {
            merged.insert(name, value);
        }
        merged
    }

    /// Checks that the vector carries exactly the `declared` names and returns
    /// the values in declared order.
    pub fn resolve(&self, metric: &str, declared: &[String]) -> Result<LabelValues> {
        let mismatch = || MeterdError::LabelMismatch {
            metric: metric.to_string(),
            expected: declared.to_vec(),
            actual: self.pairs.iter().map(|(key, _)| key.clone()).collect(),
        };

        if self.pairs.len() != declared.len() {
            return Err(mismatch());
        }

        declared
            .iter()
            .map(|name| self.get(name).map(str::to_string).ok_or_else(mismatch))
            .collect()
    }
}

impl PartialEq for LabelVector {
    fn eq(&self, other: &Self) -> bool {
        self.pairs.len() == other.pairs.len()
            && self
                .pairs
                .iter()
                .all(|(key, value)| other.get(key) == Some(value.as_str()))
    }
}

impl Eq for LabelVector {}

impl<K: Into<String> + Copy, V: Display> From<&[(K, V)]> for LabelVector {
    fn from(pairs: &[(K, V)]) -> Self {
        pairs
            .iter()
            .fold(LabelVector::new(), |labels, (key, value)| labels.with(*key, value))
    }
}

impl<K: Into<String> + Copy, V: Display, const N: usize> From<[(K, V); N]> for LabelVector {
    fn from(pairs: [(K, V); N]) -> Self {
        LabelVector::from(&pairs[..])
    }
}

/// Builds a [`LabelVector`]: `labels! { "method" => "GET", "code" => 200 }`.
#[macro_export]
macro_rules! labels {
    () => {
        $crate::labels::LabelVector::new()
    };
    ($($name:expr => $value:expr),+ $(,)?) => {
        $crate::labels::LabelVector::new()$(.with($name, $value))+
    };
}

pub(crate) fn materialize_labels(names: &[String], values: &[String]) -> Vec<(String, String)> {
    names
        .iter()
        .zip(values.iter())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Validates the declared label names of a metric of kind `metric_type`.
pub fn validate_label_names(metric_type: MetricType, names: &[String]) -> Result<()> {
    for (index, name) in names.iter().enumerate() {
        if name.is_empty() {
            return Err(MeterdError::InvalidDescriptor(
                "label name must not be empty".to_string(),
            ));
        }
        if !is_valid_label_name(name) {
            return Err(MeterdError::InvalidDescriptor(format!(
                "invalid label name: {name}"
            )));
        }
        if name.starts_with("__") {
            return Err(MeterdError::InvalidDescriptor(format!(
                "label names starting with __ are reserved: {name}"
            )));
        }
        if names[..index].contains(name) {
            return Err(MeterdError::InvalidDescriptor(format!(
                "duplicate label name: {name}"
            )));
        }

        let reserved = match metric_type {
            MetricType::Histogram => Some("le"),
            MetricType::Summary => Some("quantile"),
            MetricType::Counter | MetricType::Gauge => None,
        };
        if reserved == Some(name.as_str()) {
            return Err(MeterdError::InvalidDescriptor(format!(
                "label name {name} is reserved for {}",
                metric_type.as_prometheus_type()
            )));
        }
    }

    Ok(())
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
