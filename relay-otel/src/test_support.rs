//! In-memory [`Logger`]/[`MetricsProvider`] doubles that retain every record for
//! assertions, for use in other crates' tests (spec.md's ambient test-tooling section).

use parking_lot::Mutex;
use relay_core::error::RelayError;
use relay_core::observability::{AttributeSet, Counter, Gauge, Histogram, InstrumentDescriptor, LogRecord, LogSeverity, Logger, MetricsProvider};
use std::sync::Arc;

/// An owned copy of a [`LogRecord`], since the borrowed original can't outlive the call
/// that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedLog {
    pub severity: LogSeverity,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

/// A [`Logger`] that appends every record to a shared, lock-protected buffer.
#[derive(Default)]
pub struct RecordingLogger {
    records: Mutex<Vec<RecordedLog>>,
}

impl RecordingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RecordedLog> {
        self.records.lock().clone()
    }

    pub fn last(&self) -> Option<RecordedLog> {
        self.records.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl Logger for RecordingLogger {
    fn log(&self, record: LogRecord<'_>) {
        let fields = record.fields.iter().map(|kv| (kv.key.to_string(), kv.value.as_tag().to_string())).collect();
        self.records.lock().push(RecordedLog { severity: record.severity, message: record.message.to_string(), fields });
    }
}

/// Which instrument kind produced a [`RecordedMetric`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstrumentKind {
    Counter,
    Gauge,
    Histogram,
}

/// One observation recorded against an instrument obtained from [`RecordingMetrics`].
#[derive(Clone, Debug, PartialEq)]
pub struct RecordedMetric {
    pub kind: InstrumentKind,
    pub name: String,
    pub value: f64,
    pub fields: Vec<(String, String)>,
}

fn render_fields(attributes: AttributeSet<'_>) -> Vec<(String, String)> {
    attributes.iter().map(|kv| (kv.key.to_string(), kv.value.as_tag().to_string())).collect()
}

struct RecordingInstrument {
    kind: InstrumentKind,
    name: String,
    sink: Arc<Mutex<Vec<RecordedMetric>>>,
}

impl Counter for RecordingInstrument {
    fn add(&self, value: u64, attributes: AttributeSet<'_>) {
        self.sink.lock().push(RecordedMetric { kind: self.kind, name: self.name.clone(), value: value as f64, fields: render_fields(attributes) });
    }
}

impl Gauge for RecordingInstrument {
    fn record(&self, value: i64, attributes: AttributeSet<'_>) {
        self.sink.lock().push(RecordedMetric { kind: self.kind, name: self.name.clone(), value: value as f64, fields: render_fields(attributes) });
    }
}

impl Histogram for RecordingInstrument {
    fn record(&self, value: f64, attributes: AttributeSet<'_>) {
        self.sink.lock().push(RecordedMetric { kind: self.kind, name: self.name.clone(), value, fields: render_fields(attributes) });
    }
}

/// A [`MetricsProvider`] whose instruments append every observation to a shared buffer,
/// for tests that assert on exact counter/gauge/histogram values.
#[derive(Clone, Default)]
pub struct RecordingMetrics {
    observations: Arc<Mutex<Vec<RecordedMetric>>>,
}

impl RecordingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observations(&self) -> Vec<RecordedMetric> {
        self.observations.lock().clone()
    }

    pub fn sum(&self, name: &str) -> f64 {
        self.observations.lock().iter().filter(|obs| obs.name == name).map(|obs| obs.value).sum()
    }
}

impl MetricsProvider for RecordingMetrics {
    fn counter(&self, descriptor: InstrumentDescriptor<'_>) -> Result<Box<dyn Counter>, RelayError> {
        Ok(Box::new(RecordingInstrument { kind: InstrumentKind::Counter, name: descriptor.name.to_string(), sink: self.observations.clone() }))
    }

    fn gauge(&self, descriptor: InstrumentDescriptor<'_>) -> Result<Box<dyn Gauge>, RelayError> {
        Ok(Box::new(RecordingInstrument { kind: InstrumentKind::Gauge, name: descriptor.name.to_string(), sink: self.observations.clone() }))
    }

    fn histogram(&self, descriptor: InstrumentDescriptor<'_>) -> Result<Box<dyn Histogram>, RelayError> {
        Ok(Box::new(RecordingInstrument { kind: InstrumentKind::Histogram, name: descriptor.name.to_string(), sink: self.observations.clone() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::observability::KeyValue;

    #[test]
    fn recording_logger_retains_fields_in_order() {
        let logger = RecordingLogger::new();
        logger.log(LogRecord::new(LogSeverity::Info, "hi").with_fields(AttributeSet(&[KeyValue::new("a", 1i64), KeyValue::new("b", "x")])));
        let last = logger.last().unwrap();
        assert_eq!(last.message, "hi");
        assert_eq!(last.fields, vec![("a".to_string(), "1".to_string()), ("b".to_string(), "x".to_string())]);
    }

    #[test]
    fn recording_metrics_sums_observations_by_name() {
        let metrics = RecordingMetrics::new();
        let descriptor = InstrumentDescriptor::new("calls.started", "calls started", "1");
        metrics.record_counter(descriptor, 3, AttributeSet::EMPTY);
        metrics.record_counter(descriptor, 4, AttributeSet::EMPTY);
        assert_eq!(metrics.sum("calls.started"), 7.0);
    }

    #[test]
    fn distinct_instrument_kinds_are_tagged() {
        let metrics = RecordingMetrics::new();
        let descriptor = InstrumentDescriptor::new("streams.active", "active streams", "1");
        metrics.record_gauge(descriptor, 1, AttributeSet::EMPTY);
        let observations = metrics.observations();
        assert_eq!(observations[0].kind, InstrumentKind::Gauge);
    }
}
