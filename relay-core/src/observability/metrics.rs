//! The metrics trait seam (spec component C8's metrics half): [`MetricsProvider`] plus
//! the [`Counter`]/[`Gauge`]/[`Histogram`] instrument traits.
//!
//! `relay-core` never depends on a concrete metrics backend; `relay-otel` supplies the
//! default `tracing`-backed implementation and `relay-otel::test_support` an in-memory
//! one for assertions.

use super::attributes::AttributeSet;
use crate::error::RelayError;

/// Static metadata describing one instrument: its name, a human description, and the
/// unit of the values it records. Built once per instrument at call-site definition,
/// usually as a `const`.
#[derive(Clone, Copy, Debug)]
pub struct InstrumentDescriptor<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub unit: &'a str,
}

impl<'a> InstrumentDescriptor<'a> {
    pub const fn new(name: &'a str, description: &'a str, unit: &'a str) -> Self {
        Self { name, description, unit }
    }
}

/// A monotonically increasing counter keyed by an edge's attribute set (e.g. requests
/// started, bytes written).
pub trait Counter: Send + Sync {
    fn add(&self, value: u64, attributes: AttributeSet<'_>);
}

/// A point-in-time value that can move up or down (e.g. in-flight calls, peer pending
/// count).
pub trait Gauge: Send + Sync {
    fn record(&self, value: i64, attributes: AttributeSet<'_>);
}

/// A distribution of observed values (e.g. call latency, response payload size).
pub trait Histogram: Send + Sync {
    fn record(&self, value: f64, attributes: AttributeSet<'_>);
}

/// Factory for the three instrument kinds, implemented once per metrics backend and
/// injected via `Arc<dyn MetricsProvider>` everywhere an instrument is needed.
///
/// Registration is fallible: a backend that refuses a registration (duplicate name,
/// cardinality limit) returns `Err` rather than panicking or fabricating an instrument.
/// Per spec.md §4.3, callers substitute a [`NoopInstrument`] for that one metric and log
/// the failure once rather than letting it fail the call path. The three registration
/// methods are the minimal required surface; `record_*` are convenience wrappers that
/// look an instrument up and record in one call, mirroring the teacher's
/// `MetricsProvider` default-method shape — a registration failure there is swallowed
/// silently since there's no logger in scope to report it through.
pub trait MetricsProvider: Send + Sync {
    fn counter(&self, descriptor: InstrumentDescriptor<'_>) -> Result<Box<dyn Counter>, RelayError>;
    fn gauge(&self, descriptor: InstrumentDescriptor<'_>) -> Result<Box<dyn Gauge>, RelayError>;
    fn histogram(&self, descriptor: InstrumentDescriptor<'_>) -> Result<Box<dyn Histogram>, RelayError>;

    fn record_counter(&self, descriptor: InstrumentDescriptor<'_>, value: u64, attributes: AttributeSet<'_>) {
        if let Ok(counter) = self.counter(descriptor) {
            counter.add(value, attributes);
        }
    }

    fn record_gauge(&self, descriptor: InstrumentDescriptor<'_>, value: i64, attributes: AttributeSet<'_>) {
        if let Ok(gauge) = self.gauge(descriptor) {
            gauge.record(value, attributes);
        }
    }

    fn record_histogram(&self, descriptor: InstrumentDescriptor<'_>, value: f64, attributes: AttributeSet<'_>) {
        if let Ok(histogram) = self.histogram(descriptor) {
            histogram.record(value, attributes);
        }
    }
}

/// A [`MetricsProvider`] that drops every instrument and observation, used as the
/// default when application code doesn't wire a real backend.
#[derive(Default, Clone, Copy)]
pub struct NoopMetrics;

/// The instrument substituted for any metric a backend refuses to register
/// (spec.md §4.3). Implements all three instrument traits since the fallback is the
/// same no-op regardless of which kind failed.
pub struct NoopInstrument;

impl Counter for NoopInstrument {
    fn add(&self, _value: u64, _attributes: AttributeSet<'_>) {}
}

impl Gauge for NoopInstrument {
    fn record(&self, _value: i64, _attributes: AttributeSet<'_>) {}
}

impl Histogram for NoopInstrument {
    fn record(&self, _value: f64, _attributes: AttributeSet<'_>) {}
}

impl MetricsProvider for NoopMetrics {
    fn counter(&self, _descriptor: InstrumentDescriptor<'_>) -> Result<Box<dyn Counter>, RelayError> {
        Ok(Box::new(NoopInstrument))
    }

    fn gauge(&self, _descriptor: InstrumentDescriptor<'_>) -> Result<Box<dyn Gauge>, RelayError> {
        Ok(Box::new(NoopInstrument))
    }

    fn histogram(&self, _descriptor: InstrumentDescriptor<'_>) -> Result<Box<dyn Histogram>, RelayError> {
        Ok(Box::new(NoopInstrument))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_metrics_never_panics_on_any_call() {
        let metrics = NoopMetrics;
        let descriptor = InstrumentDescriptor::new("calls.started", "calls started", "1");
        metrics.record_counter(descriptor, 1, AttributeSet::EMPTY);
        metrics.record_gauge(descriptor, -1, AttributeSet::EMPTY);
        metrics.record_histogram(descriptor, 0.5, AttributeSet::EMPTY);
    }
}
