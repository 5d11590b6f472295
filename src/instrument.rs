//! Measurement primitives and exposition, as seen by the registry
//!
//! The registry never does counter/gauge/histogram arithmetic itself. It
//! asks an [`Instrumentation`] to construct an [`Instrument`] for each new
//! metric, hands that instrument to an [`ExpositionSink`] exactly once, and
//! forwards updates to it afterwards.
//!
//! Label values are passed as a slice ordered the way the metric declared
//! its label names; the registry has already checked the key set.

use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

use crate::definition::{MetricDefinition, MetricKind};

/// Failure inside an instrumentation backend
#[derive(Error, Debug)]
pub enum InstrumentError {
    #[error("failed to construct instrument: {0}")]
    Construct(String),

    #[error("failed to register instrument with exposition sink: {0}")]
    Register(String),

    #[error("failed to update instrument: {0}")]
    Update(String),

    #[error("{kind} instruments do not support {operation}")]
    UnsupportedOperation {
        kind: MetricKind,
        operation: &'static str,
    },

    #[error("{0} metrics are not supported by this backend")]
    UnsupportedKind(MetricKind),

    #[error("failed to render exposition: {0}")]
    Render(String),
}

/// A live, thread-safe metric primitive
///
/// Implementations must tolerate unsynchronized concurrent calls: the
/// registry only holds its read lock while looking the instrument up.
pub trait Instrument: Send + Sync + 'static {
    fn kind(&self) -> MetricKind;

    /// Add one to the series selected by `label_values`
    fn increment(&self, label_values: &[&str]) -> Result<(), InstrumentError> {
        let _ = label_values;
        Err(InstrumentError::UnsupportedOperation {
            kind: self.kind(),
            operation: "increment",
        })
    }

    /// Overwrite the series selected by `label_values`
    fn set(&self, label_values: &[&str], value: f64) -> Result<(), InstrumentError> {
        let _ = (label_values, value);
        Err(InstrumentError::UnsupportedOperation {
            kind: self.kind(),
            operation: "set",
        })
    }

    /// Record one observation in the series selected by `label_values`
    fn observe(&self, label_values: &[&str], value: f64) -> Result<(), InstrumentError> {
        let _ = (label_values, value);
        Err(InstrumentError::UnsupportedOperation {
            kind: self.kind(),
            operation: "observe",
        })
    }

    /// Lets a sink recover the backend's concrete instrument type
    fn as_any(&self) -> &dyn Any;
}

/// Builds instruments from definitions
pub trait Instrumentation: Send + Sync + 'static {
    fn construct(&self, definition: &MetricDefinition) -> Result<Arc<dyn Instrument>, InstrumentError>;
}

/// Pull-side collaborator that renders every registered instrument
///
/// `register` is called once per metric identity, while the registry holds
/// its write lock. If it fails the metric is not created.
pub trait ExpositionSink: Send + Sync + 'static {
    fn register(
        &self,
        definition: &MetricDefinition,
        instrument: &Arc<dyn Instrument>,
    ) -> Result<(), InstrumentError>;

    /// Render the current value of everything registered so far
    fn render(&self) -> Result<String, InstrumentError>;

    /// HTTP content type of [`ExpositionSink::render`] output
    fn content_type(&self) -> &'static str {
        "text/plain; version=0.0.4"
    }
}
