//! Prometheus-backed instruments and exposition
//!
//! [`PrometheusBackend`] plays both collaborator roles: it builds
//! `CounterVec` / `GaugeVec` / `HistogramVec` instruments and registers them
//! with its own `prometheus::Registry`, which it then encodes in the
//! Prometheus text format on every scrape.
//!
//! The `prometheus` crate has no summary type, so summaries are rejected at
//! construction time.

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::any::Any;
use std::sync::Arc;

use crate::definition::{MetricDefinition, MetricKind};
use crate::instrument::{ExpositionSink, Instrument, InstrumentError, Instrumentation};

/// A Prometheus metric vector created for one registry identity
#[derive(Clone)]
pub enum PrometheusInstrument {
    Counter(CounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
}

impl PrometheusInstrument {
    fn collector(&self) -> Box<dyn prometheus::core::Collector> {
        match self {
            Self::Counter(vec) => Box::new(vec.clone()),
            Self::Gauge(vec) => Box::new(vec.clone()),
            Self::Histogram(vec) => Box::new(vec.clone()),
        }
    }

    /// Materialize the single series of a label-less metric so it is
    /// scraped as zero before its first update
    fn touch_unlabeled(&self) -> Result<(), prometheus::Error> {
        let empty: [&str; 0] = [];
        match self {
            Self::Counter(vec) => vec.get_metric_with_label_values(&empty).map(|_| ()),
            Self::Gauge(vec) => vec.get_metric_with_label_values(&empty).map(|_| ()),
            Self::Histogram(vec) => vec.get_metric_with_label_values(&empty).map(|_| ()),
        }
    }
}

impl Instrument for PrometheusInstrument {
    fn kind(&self) -> MetricKind {
        match self {
            Self::Counter(_) => MetricKind::Counter,
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Histogram(_) => MetricKind::Histogram,
        }
    }

    fn increment(&self, label_values: &[&str]) -> Result<(), InstrumentError> {
        match self {
            Self::Counter(vec) => {
                vec.get_metric_with_label_values(label_values)
                    .map_err(update_error)?
                    .inc();
                Ok(())
            }
            _ => Err(InstrumentError::UnsupportedOperation {
                kind: self.kind(),
                operation: "increment",
            }),
        }
    }

    fn set(&self, label_values: &[&str], value: f64) -> Result<(), InstrumentError> {
        match self {
            Self::Gauge(vec) => {
                vec.get_metric_with_label_values(label_values)
                    .map_err(update_error)?
                    .set(value);
                Ok(())
            }
            _ => Err(InstrumentError::UnsupportedOperation {
                kind: self.kind(),
                operation: "set",
            }),
        }
    }

    fn observe(&self, label_values: &[&str], value: f64) -> Result<(), InstrumentError> {
        match self {
            Self::Histogram(vec) => {
                vec.get_metric_with_label_values(label_values)
                    .map_err(update_error)?
                    .observe(value);
                Ok(())
            }
            _ => Err(InstrumentError::UnsupportedOperation {
                kind: self.kind(),
                operation: "observe",
            }),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn update_error(e: prometheus::Error) -> InstrumentError {
    InstrumentError::Update(e.to_string())
}

/// Instrumentation and exposition on top of one `prometheus::Registry`
///
/// Cloning is cheap; clones share the underlying registry.
#[derive(Clone, Default)]
pub struct PrometheusBackend {
    registry: Registry,
}

impl PrometheusBackend {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
        }
    }

    /// The underlying Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Gather all metrics and encode them in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or produces invalid UTF-8.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();

        encoder.encode(&metric_families, &mut buffer).map_err(|e| {
            let metric_names: Vec<_> = metric_families.iter().map(|mf| mf.name()).collect();

            tracing::error!(
                error = %e,
                metric_family_count = metric_count,
                metric_names = ?metric_names,
                "Prometheus text encoder failed"
            );

            prometheus::Error::Msg(format!(
                "Failed to encode {} metric families: {}",
                metric_count, e
            ))
        })?;

        String::from_utf8(buffer).map_err(|e| {
            let valid_up_to = e.utf8_error().valid_up_to();
            let buffer_len = e.as_bytes().len();

            tracing::error!(
                invalid_byte_index = valid_up_to,
                buffer_length = buffer_len,
                "Prometheus encoder produced invalid UTF-8"
            );

            prometheus::Error::Msg(format!(
                "Failed to convert metrics to UTF-8 at byte {}/{}",
                valid_up_to, buffer_len
            ))
        })
    }
}

impl Instrumentation for PrometheusBackend {
    fn construct(&self, definition: &MetricDefinition) -> Result<Arc<dyn Instrument>, InstrumentError> {
        let labels: Vec<&str> = definition.label_names().iter().map(String::as_str).collect();
        // Prometheus rejects an empty help string
        let help = if definition.help().is_empty() {
            definition.name()
        } else {
            definition.help()
        };
        let construct_error = |e: prometheus::Error| InstrumentError::Construct(e.to_string());

        let instrument = match definition.kind() {
            MetricKind::Counter => PrometheusInstrument::Counter(
                CounterVec::new(Opts::new(definition.name(), help), &labels)
                    .map_err(construct_error)?,
            ),
            MetricKind::Gauge => PrometheusInstrument::Gauge(
                GaugeVec::new(Opts::new(definition.name(), help), &labels)
                    .map_err(construct_error)?,
            ),
            MetricKind::Histogram => {
                let mut opts = HistogramOpts::new(definition.name(), help);
                if !definition.buckets().is_empty() {
                    opts = opts.buckets(definition.buckets().to_vec());
                }
                PrometheusInstrument::Histogram(
                    HistogramVec::new(opts, &labels).map_err(construct_error)?,
                )
            }
            MetricKind::Summary => {
                return Err(InstrumentError::UnsupportedKind(MetricKind::Summary));
            }
        };

        if labels.is_empty() {
            instrument.touch_unlabeled().map_err(construct_error)?;
        }

        Ok(Arc::new(instrument))
    }
}

impl ExpositionSink for PrometheusBackend {
    fn register(
        &self,
        definition: &MetricDefinition,
        instrument: &Arc<dyn Instrument>,
    ) -> Result<(), InstrumentError> {
        let prom = instrument
            .as_any()
            .downcast_ref::<PrometheusInstrument>()
            .ok_or_else(|| {
                InstrumentError::Register(format!(
                    "{} '{}' was not constructed by the Prometheus backend",
                    definition.kind(),
                    definition.name()
                ))
            })?;

        self.registry.register(prom.collector()).map_err(|e| {
            tracing::warn!(
                metric = %definition.name(),
                kind = %definition.kind(),
                error = %e,
                "Prometheus registry rejected collector"
            );
            InstrumentError::Register(e.to_string())
        })
    }

    fn render(&self) -> Result<String, InstrumentError> {
        self.gather()
            .map_err(|e| InstrumentError::Render(e.to_string()))
    }

    fn content_type(&self) -> &'static str {
        prometheus::TEXT_FORMAT
    }
}
