//! Metric definitions submitted at creation time

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::RegistryError;
use crate::identity::MetricIdentity;

/// Label name → label value, supplied with every update
pub type LabelValues = HashMap<String, String>;

/// Kind of measurement a metric records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Counter,
        MetricKind::Gauge,
        MetricKind::Histogram,
        MetricKind::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to create a metric
///
/// Fields are private; a definition is built through the per-kind
/// constructors and checked by [`MetricDefinition::validate`] before the
/// registry accepts it.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    name: String,
    label_names: Vec<String>,
    help: String,
    kind: MetricKind,
    /// Upper bounds for histogram buckets; empty means backend defaults
    buckets: Vec<f64>,
}

impl MetricDefinition {
    fn new(
        kind: MetricKind,
        name: impl Into<String>,
        label_names: Vec<String>,
        help: impl Into<String>,
        buckets: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            label_names,
            help: help.into(),
            kind,
            buckets,
        }
    }

    pub fn counter(name: impl Into<String>, label_names: Vec<String>, help: impl Into<String>) -> Self {
        Self::new(MetricKind::Counter, name, label_names, help, Vec::new())
    }

    pub fn gauge(name: impl Into<String>, label_names: Vec<String>, help: impl Into<String>) -> Self {
        Self::new(MetricKind::Gauge, name, label_names, help, Vec::new())
    }

    pub fn histogram(
        name: impl Into<String>,
        label_names: Vec<String>,
        help: impl Into<String>,
        buckets: Vec<f64>,
    ) -> Self {
        Self::new(MetricKind::Histogram, name, label_names, help, buckets)
    }

    pub fn summary(name: impl Into<String>, label_names: Vec<String>, help: impl Into<String>) -> Self {
        Self::new(MetricKind::Summary, name, label_names, help, Vec::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn buckets(&self) -> &[f64] {
        &self.buckets
    }

    pub fn identity(&self) -> MetricIdentity {
        MetricIdentity::derive(&self.name, &self.label_names)
    }

    /// Check the definition before any state is touched
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Validation` if:
    /// - the name is empty
    /// - a label name is empty or appears twice
    /// - histogram buckets are not finite or not strictly ascending
    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.name.is_empty() {
            return Err(RegistryError::Validation(format!(
                "{} name must not be empty",
                self.kind
            )));
        }

        let mut seen = HashSet::with_capacity(self.label_names.len());
        for label in &self.label_names {
            if label.is_empty() {
                return Err(RegistryError::Validation(format!(
                    "{} '{}' declares an empty label name",
                    self.kind, self.name
                )));
            }
            if !seen.insert(label.as_str()) {
                return Err(RegistryError::Validation(format!(
                    "{} '{}' declares label '{}' more than once",
                    self.kind, self.name, label
                )));
            }
        }

        if self.kind == MetricKind::Histogram {
            if let Some(bound) = self.buckets.iter().find(|b| !b.is_finite()) {
                return Err(RegistryError::Validation(format!(
                    "histogram '{}' buckets must be finite, found {}",
                    self.name, bound
                )));
            }
            if let Some(pair) = self.buckets.windows(2).find(|w| w[0] >= w[1]) {
                return Err(RegistryError::Validation(format!(
                    "histogram '{}' buckets must be strictly ascending, found {} followed by {}",
                    self.name, pair[0], pair[1]
                )));
            }
        }

        Ok(())
    }

    /// Order an update's label values as the definition declares them
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::LabelMismatch` if `name` differs from the
    /// declared name or the key set differs from the declared label names.
    pub fn ordered_label_values<'a>(
        &self,
        name: &str,
        label_values: &'a LabelValues,
    ) -> Result<Vec<&'a str>, RegistryError> {
        let mismatch = || {
            let mut supplied: Vec<String> = label_values.keys().cloned().collect();
            supplied.sort_unstable();
            RegistryError::LabelMismatch {
                name: name.to_string(),
                declared: self.label_names.clone(),
                supplied,
            }
        };

        if name != self.name || label_values.len() != self.label_names.len() {
            return Err(mismatch());
        }

        self.label_names
            .iter()
            .map(|label| label_values.get(label).map(String::as_str))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(mismatch)
    }
}
