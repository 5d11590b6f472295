//! Metric registry
//!
//! Owns one live instrument per metric identity. Creation is check-then-insert
//! inside a single write-locked critical section, so exactly one of several
//! concurrent creators of the same identity wins. Updates only take the read
//! lock long enough to find the instrument; the instrument itself is
//! thread-safe.
//!
//! All four kinds share one identity namespace: a gauge cannot be created
//! under an identity already held by a counter.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::definition::{LabelValues, MetricDefinition, MetricKind};
use crate::error::RegistryError;
use crate::identity::MetricIdentity;
use crate::instrument::{ExpositionSink, Instrument, InstrumentError, Instrumentation};

/// A live instrument plus the definition it was created from
pub struct MetricHandle {
    definition: MetricDefinition,
    instrument: Arc<dyn Instrument>,
}

impl MetricHandle {
    pub fn definition(&self) -> &MetricDefinition {
        &self.definition
    }
}

type HandleMap = HashMap<MetricIdentity, MetricHandle>;

#[derive(Default)]
struct Collectors {
    counters: HandleMap,
    gauges: HandleMap,
    histograms: HandleMap,
    summaries: HandleMap,
}

impl Collectors {
    fn map(&self, kind: MetricKind) -> &HandleMap {
        match kind {
            MetricKind::Counter => &self.counters,
            MetricKind::Gauge => &self.gauges,
            MetricKind::Histogram => &self.histograms,
            MetricKind::Summary => &self.summaries,
        }
    }

    fn map_mut(&mut self, kind: MetricKind) -> &mut HandleMap {
        match kind {
            MetricKind::Counter => &mut self.counters,
            MetricKind::Gauge => &mut self.gauges,
            MetricKind::Histogram => &mut self.histograms,
            MetricKind::Summary => &mut self.summaries,
        }
    }

    /// Kind already holding `identity`, if any
    fn holder_of(&self, identity: &MetricIdentity) -> Option<MetricKind> {
        MetricKind::ALL
            .into_iter()
            .find(|kind| self.map(*kind).contains_key(identity))
    }

    fn len(&self) -> usize {
        MetricKind::ALL.iter().map(|kind| self.map(*kind).len()).sum()
    }
}

/// Registry of every metric created through the sidecar
///
/// Constructed once at startup and shared behind an `Arc`; there is no
/// process-wide instance.
pub struct MetricRegistry {
    collectors: RwLock<Collectors>,
    instrumentation: Arc<dyn Instrumentation>,
    sink: Arc<dyn ExpositionSink>,
}

impl MetricRegistry {
    pub fn new(instrumentation: Arc<dyn Instrumentation>, sink: Arc<dyn ExpositionSink>) -> Self {
        Self {
            collectors: RwLock::new(Collectors::default()),
            instrumentation,
            sink,
        }
    }

    /// The sink every created metric is registered with
    pub fn sink(&self) -> &Arc<dyn ExpositionSink> {
        &self.sink
    }

    // The maps are only mutated by the final insert of `create`, so a panic
    // in an injected backend while the lock is held leaves them consistent.
    fn read(&self) -> RwLockReadGuard<'_, Collectors> {
        self.collectors.read().unwrap_or_else(|poisoned| {
            tracing::warn!("Metric registry lock was poisoned, recovering (read)");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, Collectors> {
        self.collectors.write().unwrap_or_else(|poisoned| {
            tracing::warn!("Metric registry lock was poisoned, recovering (write)");
            self.collectors.clear_poison();
            poisoned.into_inner()
        })
    }

    /// Create a metric from a full definition
    ///
    /// Returns the identity the metric was stored under.
    ///
    /// # Errors
    ///
    /// - `Validation` if the definition is malformed
    /// - `AlreadyExists` if any kind already holds the identity
    /// - `Internal` if the instrument cannot be constructed or the sink
    ///   refuses it; nothing is stored in that case
    pub fn create(&self, definition: MetricDefinition) -> Result<MetricIdentity, RegistryError> {
        definition.validate()?;
        let identity = definition.identity();
        let kind = definition.kind();

        let mut collectors = self.write();

        if let Some(existing) = collectors.holder_of(&identity) {
            tracing::debug!(
                identity = %identity,
                metric = %definition.name(),
                kind = %kind,
                existing = %existing,
                "Rejected duplicate metric creation"
            );
            return Err(RegistryError::AlreadyExists {
                identity,
                name: definition.name().to_string(),
                kind,
                existing,
            });
        }

        let instrument = self
            .instrumentation
            .construct(&definition)
            .map_err(|e| internal_failure(&identity, &definition, e))?;

        self.sink
            .register(&definition, &instrument)
            .map_err(|e| internal_failure(&identity, &definition, e))?;

        tracing::info!(
            identity = %identity,
            metric = %definition.name(),
            kind = %kind,
            labels = ?definition.label_names(),
            "Metric created"
        );

        collectors.map_mut(kind).insert(
            identity.clone(),
            MetricHandle {
                definition,
                instrument,
            },
        );

        Ok(identity)
    }

    pub fn create_counter(
        &self,
        name: impl Into<String>,
        label_names: Vec<String>,
        help: impl Into<String>,
    ) -> Result<(), RegistryError> {
        self.create(MetricDefinition::counter(name, label_names, help))
            .map(|_| ())
    }

    pub fn create_gauge(
        &self,
        name: impl Into<String>,
        label_names: Vec<String>,
        help: impl Into<String>,
    ) -> Result<(), RegistryError> {
        self.create(MetricDefinition::gauge(name, label_names, help))
            .map(|_| ())
    }

    pub fn create_histogram(
        &self,
        name: impl Into<String>,
        label_names: Vec<String>,
        help: impl Into<String>,
        buckets: Vec<f64>,
    ) -> Result<(), RegistryError> {
        self.create(MetricDefinition::histogram(name, label_names, help, buckets))
            .map(|_| ())
    }

    pub fn create_summary(
        &self,
        name: impl Into<String>,
        label_names: Vec<String>,
        help: impl Into<String>,
    ) -> Result<(), RegistryError> {
        self.create(MetricDefinition::summary(name, label_names, help))
            .map(|_| ())
    }

    /// Increment the counter series selected by `label_values`
    pub fn counter_inc(&self, name: &str, label_values: &LabelValues) -> Result<(), RegistryError> {
        self.update(MetricKind::Counter, name, label_values, |instrument, values| {
            instrument.increment(values)
        })
    }

    /// Set the gauge series selected by `label_values` to `value`
    pub fn gauge_set(
        &self,
        name: &str,
        label_values: &LabelValues,
        value: f64,
    ) -> Result<(), RegistryError> {
        self.update(MetricKind::Gauge, name, label_values, |instrument, values| {
            instrument.set(values, value)
        })
    }

    /// Record `value` in the histogram series selected by `label_values`
    pub fn histogram_observe(
        &self,
        name: &str,
        label_values: &LabelValues,
        value: f64,
    ) -> Result<(), RegistryError> {
        self.update(MetricKind::Histogram, name, label_values, |instrument, values| {
            instrument.observe(values, value)
        })
    }

    /// Record `value` in the summary series selected by `label_values`
    pub fn summary_observe(
        &self,
        name: &str,
        label_values: &LabelValues,
        value: f64,
    ) -> Result<(), RegistryError> {
        self.update(MetricKind::Summary, name, label_values, |instrument, values| {
            instrument.observe(values, value)
        })
    }

    fn update<F>(
        &self,
        kind: MetricKind,
        name: &str,
        label_values: &LabelValues,
        apply: F,
    ) -> Result<(), RegistryError>
    where
        F: FnOnce(&dyn Instrument, &[&str]) -> Result<(), InstrumentError>,
    {
        if name.is_empty() {
            return Err(RegistryError::Validation(format!(
                "{} name must not be empty",
                kind
            )));
        }

        let identity = MetricIdentity::from_label_values(name, label_values);

        let (instrument, ordered) = {
            let collectors = self.read();
            let handle = collectors.map(kind).get(&identity).ok_or_else(|| {
                let mut labels: Vec<String> = label_values.keys().cloned().collect();
                labels.sort_unstable();
                RegistryError::UnknownCollector {
                    identity: identity.clone(),
                    name: name.to_string(),
                    kind,
                    labels,
                }
            })?;
            let ordered = handle.definition.ordered_label_values(name, label_values)?;
            (Arc::clone(&handle.instrument), ordered)
        };

        apply(&*instrument, &ordered).map_err(|e| {
            tracing::error!(
                identity = %identity,
                metric = %name,
                kind = %kind,
                error = %e,
                "Instrument update failed"
            );
            RegistryError::from(e)
        })
    }

    /// Number of metrics across all kinds
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `kind` holds a metric under `identity`
    pub fn contains(&self, kind: MetricKind, identity: &MetricIdentity) -> bool {
        self.read().map(kind).contains_key(identity)
    }

    /// Definition stored under `identity` for `kind`
    pub fn definition(&self, kind: MetricKind, identity: &MetricIdentity) -> Option<MetricDefinition> {
        self.read()
            .map(kind)
            .get(identity)
            .map(|handle| handle.definition.clone())
    }
}

fn internal_failure(
    identity: &MetricIdentity,
    definition: &MetricDefinition,
    err: InstrumentError,
) -> RegistryError {
    tracing::error!(
        identity = %identity,
        metric = %definition.name(),
        kind = %definition.kind(),
        error = %err,
        "Metric creation failed"
    );
    RegistryError::from(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::any::Any;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Records every series value in memory
    #[derive(Default)]
    struct FakeInstrument {
        kind: Option<MetricKind>,
        series: Mutex<HashMap<Vec<String>, Vec<f64>>>,
    }

    impl FakeInstrument {
        fn record(&self, label_values: &[&str], f: impl FnOnce(&mut Vec<f64>)) {
            let key = label_values.iter().map(|s| s.to_string()).collect();
            let mut series = self.series.lock().expect("fake lock");
            f(series.entry(key).or_default());
        }

        fn value(&self, label_values: &[&str]) -> Option<Vec<f64>> {
            let key: Vec<String> = label_values.iter().map(|s| s.to_string()).collect();
            self.series.lock().expect("fake lock").get(&key).cloned()
        }
    }

    impl Instrument for FakeInstrument {
        fn kind(&self) -> MetricKind {
            self.kind.unwrap_or(MetricKind::Counter)
        }

        fn increment(&self, label_values: &[&str]) -> Result<(), InstrumentError> {
            self.record(label_values, |v| match v.first_mut() {
                Some(total) => *total += 1.0,
                None => v.push(1.0),
            });
            Ok(())
        }

        fn set(&self, label_values: &[&str], value: f64) -> Result<(), InstrumentError> {
            self.record(label_values, |v| *v = vec![value]);
            Ok(())
        }

        fn observe(&self, label_values: &[&str], value: f64) -> Result<(), InstrumentError> {
            self.record(label_values, |v| v.push(value));
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// Fake facade and sink in one; keeps every instrument it built
    #[derive(Default)]
    struct FakeBackend {
        constructed: Mutex<Vec<(String, Arc<FakeInstrument>)>>,
        registered: AtomicUsize,
        fail_construct: AtomicBool,
        fail_register: AtomicBool,
        panic_construct: AtomicBool,
    }

    impl FakeBackend {
        fn instrument(&self, name: &str) -> Arc<FakeInstrument> {
            self.constructed
                .lock()
                .expect("fake lock")
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, i)| Arc::clone(i))
                .expect("instrument should have been constructed")
        }
    }

    impl Instrumentation for FakeBackend {
        fn construct(
            &self,
            definition: &MetricDefinition,
        ) -> Result<Arc<dyn Instrument>, InstrumentError> {
            if self.panic_construct.load(Ordering::SeqCst) {
                panic!("injected construct panic");
            }
            if self.fail_construct.load(Ordering::SeqCst) {
                return Err(InstrumentError::Construct("injected".to_string()));
            }
            let instrument = Arc::new(FakeInstrument {
                kind: Some(definition.kind()),
                ..Default::default()
            });
            self.constructed
                .lock()
                .expect("fake lock")
                .push((definition.name().to_string(), Arc::clone(&instrument)));
            Ok(instrument)
        }
    }

    impl ExpositionSink for FakeBackend {
        fn register(
            &self,
            _definition: &MetricDefinition,
            _instrument: &Arc<dyn Instrument>,
        ) -> Result<(), InstrumentError> {
            if self.fail_register.load(Ordering::SeqCst) {
                return Err(InstrumentError::Register("injected".to_string()));
            }
            self.registered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn render(&self) -> Result<String, InstrumentError> {
            Ok(String::new())
        }
    }

    fn fake_registry() -> (MetricRegistry, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::default());
        let registry = MetricRegistry::new(backend.clone(), backend.clone());
        (registry, backend)
    }

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn values(pairs: &[(&str, &str)]) -> LabelValues {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_create_counter_registers_with_sink() {
        let (registry, backend) = fake_registry();
        registry
            .create_counter("hits", labels(&["env"]), "Hits")
            .expect("create should succeed");

        assert_eq!(registry.len(), 1);
        assert_eq!(backend.registered.load(Ordering::SeqCst), 1);
        let identity = MetricIdentity::derive("hits", &["env"]);
        assert!(registry.contains(MetricKind::Counter, &identity));
        assert!(!registry.contains(MetricKind::Gauge, &identity));
    }

    #[test]
    fn test_duplicate_create_is_already_exists() {
        let (registry, backend) = fake_registry();
        registry
            .create_counter("hits", labels(&["env", "zone"]), "Hits")
            .expect("first create");

        let err = registry
            .create_counter("hits", labels(&["zone", "env"]), "Different help")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(registry.len(), 1);
        assert_eq!(backend.registered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cross_kind_collision_is_already_exists() {
        let (registry, _) = fake_registry();
        registry
            .create_counter("load", labels(&["host"]), "Load")
            .expect("counter create");

        let err = registry
            .create_gauge("load", labels(&["host"]), "Load")
            .unwrap_err();
        match err {
            RegistryError::AlreadyExists { kind, existing, .. } => {
                assert_eq!(kind, MetricKind::Gauge);
                assert_eq!(existing, MetricKind::Counter);
            }
            other => panic!("expected AlreadyExists, got {:?}", other),
        }
        let identity = MetricIdentity::derive("load", &["host"]);
        assert!(!registry.contains(MetricKind::Gauge, &identity));
    }

    #[test]
    fn test_same_labels_different_names_are_independent() {
        let (registry, backend) = fake_registry();
        registry
            .create_counter("requests", labels(&["region"]), "Requests")
            .expect("requests");
        registry
            .create_counter("errors", labels(&["region"]), "Errors")
            .expect("errors");
        assert_eq!(registry.len(), 2);

        let eu = values(&[("region", "eu")]);
        registry.counter_inc("requests", &eu).expect("inc requests");
        registry.counter_inc("requests", &eu).expect("inc requests");
        registry.counter_inc("errors", &eu).expect("inc errors");

        assert_eq!(backend.instrument("requests").value(&["eu"]), Some(vec![2.0]));
        assert_eq!(backend.instrument("errors").value(&["eu"]), Some(vec![1.0]));
    }

    #[test]
    fn test_update_before_create_is_unknown_collector() {
        let (registry, backend) = fake_registry();
        let err = registry
            .counter_inc("unregistered", &LabelValues::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownCollector);
        assert!(registry.is_empty());
        assert_eq!(backend.registered.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_update_wrong_kind_is_unknown_collector() {
        let (registry, _) = fake_registry();
        registry
            .create_gauge("active", vec![], "Active")
            .expect("gauge");
        let err = registry
            .counter_inc("active", &LabelValues::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownCollector);
    }

    #[test]
    fn test_update_with_different_label_names_is_unknown_collector() {
        let (registry, _) = fake_registry();
        registry
            .create_counter("hits", labels(&["env"]), "Hits")
            .expect("create");
        let err = registry
            .counter_inc("hits", &values(&[("region", "eu")]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownCollector);
    }

    #[test]
    fn test_update_with_empty_name_is_validation() {
        let (registry, _) = fake_registry();
        let err = registry.gauge_set("", &LabelValues::new(), 1.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_counter_series_share_one_handle() {
        let (registry, backend) = fake_registry();
        registry
            .create_counter("hits", labels(&["env"]), "help")
            .expect("create");

        let prod = values(&[("env", "prod")]);
        for _ in 0..5 {
            registry.counter_inc("hits", &prod).expect("inc");
        }

        let instrument = backend.instrument("hits");
        assert_eq!(instrument.value(&["prod"]), Some(vec![5.0]));
        assert_eq!(instrument.value(&["dev"]), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_gauge_set_last_write_wins() {
        let (registry, backend) = fake_registry();
        registry
            .create_gauge("active_requests", labels(&["container"]), "help")
            .expect("create");
        let c1 = values(&[("container", "c1")]);
        registry.gauge_set("active_requests", &c1, 7.0).expect("set");
        registry.gauge_set("active_requests", &c1, 3.0).expect("set");
        assert_eq!(
            backend.instrument("active_requests").value(&["c1"]),
            Some(vec![3.0])
        );
    }

    #[test]
    fn test_histogram_rejects_unsorted_buckets_without_state() {
        let (registry, backend) = fake_registry();
        let err = registry
            .create_histogram("latency", vec![], "help", vec![1.0, 5.0, 2.0])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(registry.is_empty());
        assert!(backend.constructed.lock().expect("fake lock").is_empty());
    }

    #[test]
    fn test_histogram_observe_forwards_in_declared_order() {
        let (registry, backend) = fake_registry();
        registry
            .create_histogram("latency", labels(&["route", "method"]), "help", vec![0.1, 1.0])
            .expect("create");
        registry
            .histogram_observe(
                "latency",
                &values(&[("method", "GET"), ("route", "/v1")]),
                0.5,
            )
            .expect("observe");
        assert_eq!(
            backend.instrument("latency").value(&["/v1", "GET"]),
            Some(vec![0.5])
        );
    }

    #[test]
    fn test_summary_create_and_observe() {
        let (registry, backend) = fake_registry();
        registry
            .create_summary("rpc_seconds", vec![], "help")
            .expect("create");
        registry
            .summary_observe("rpc_seconds", &LabelValues::new(), 0.25)
            .expect("observe");
        assert_eq!(backend.instrument("rpc_seconds").value(&[]), Some(vec![0.25]));
    }

    #[test]
    fn test_construct_failure_leaves_no_state() {
        let (registry, backend) = fake_registry();
        backend.fail_construct.store(true, Ordering::SeqCst);

        let err = registry
            .create_counter("hits", vec![], "help")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(registry.is_empty());
        assert_eq!(backend.registered.load(Ordering::SeqCst), 0);

        // A later attempt is not blocked by the failed one
        backend.fail_construct.store(false, Ordering::SeqCst);
        registry
            .create_counter("hits", vec![], "help")
            .expect("retry should succeed");
    }

    #[test]
    fn test_sink_failure_leaves_no_state() {
        let (registry, backend) = fake_registry();
        backend.fail_register.store(true, Ordering::SeqCst);

        let err = registry
            .create_gauge("g", vec![], "help")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(registry.is_empty());

        let err = registry
            .gauge_set("g", &LabelValues::new(), 1.0)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownCollector);
    }

    #[test]
    fn test_backend_panic_does_not_wedge_registry() {
        use std::panic::{AssertUnwindSafe, catch_unwind};

        let (registry, backend) = fake_registry();
        registry
            .create_counter("before", vec![], "help")
            .expect("create before panic");

        backend.panic_construct.store(true, Ordering::SeqCst);
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            registry.create_counter("explodes", vec![], "help")
        }));
        assert!(outcome.is_err(), "construct should have panicked");
        backend.panic_construct.store(false, Ordering::SeqCst);

        // Nothing half-created, and both locks still usable
        assert_eq!(registry.len(), 1);
        registry
            .counter_inc("before", &LabelValues::new())
            .expect("update after panic");
        registry
            .create_counter("explodes", vec![], "help")
            .expect("create after panic");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_definition_lookup() {
        let (registry, _) = fake_registry();
        registry
            .create_histogram("latency", labels(&["route"]), "Latency", vec![1.0, 2.0])
            .expect("create");
        let identity = MetricIdentity::derive("latency", &["route"]);
        let def = registry
            .definition(MetricKind::Histogram, &identity)
            .expect("definition stored");
        assert_eq!(def.help(), "Latency");
        assert_eq!(def.buckets(), &[1.0, 2.0]);
        assert!(registry.definition(MetricKind::Counter, &identity).is_none());
    }

    #[test]
    fn test_concurrent_creates_exactly_one_wins() {
        use std::thread;

        let (registry, backend) = fake_registry();
        let registry = Arc::new(registry);
        let mut handles = vec![];

        for _ in 0..32 {
            let r = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                r.create_counter("contended", labels(&["a", "b"]), "help")
            }));
        }

        let results: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .collect();

        let successes = results.iter().filter(|r| r.is_ok()).count();
        let conflicts = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::AlreadyExists))
            .count();
        assert_eq!(successes, 1);
        assert_eq!(conflicts, 31);
        assert_eq!(registry.len(), 1);
        assert_eq!(backend.registered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        use std::thread;

        let (registry, backend) = fake_registry();
        registry
            .create_counter("hits", labels(&["env"]), "help")
            .expect("create");
        let registry = Arc::new(registry);

        let mut handles = vec![];
        for _ in 0..8 {
            let r = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                let prod = values(&[("env", "prod")]);
                for _ in 0..100 {
                    r.counter_inc("hits", &prod).expect("inc");
                }
            }));
        }
        for h in handles {
            h.join().expect("thread should not panic");
        }

        assert_eq!(backend.instrument("hits").value(&["prod"]), Some(vec![800.0]));
    }
}
