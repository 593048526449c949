//! [`TracingMetrics`]: a [`MetricsProvider`] that renders every instrument observation
//! as a structured `tracing` event rather than exporting to a metrics backend directly.
//! Downstream collection (Prometheus, OTLP, ...) is expected to scrape these events
//! through a `tracing-subscriber` layer, which is outside this crate's scope.

use crate::fields::render;
use relay_core::error::RelayError;
use relay_core::observability::{AttributeSet, Counter, Gauge, Histogram, InstrumentDescriptor, MetricsProvider};

struct TracingInstrument {
    name: String,
    unit: String,
}

impl Counter for TracingInstrument {
    fn add(&self, value: u64, attributes: AttributeSet<'_>) {
        tracing::debug!(
            target: "relay::metrics",
            instrument = %self.name,
            unit = %self.unit,
            kind = "counter",
            value,
            fields = %render(attributes),
        );
    }
}

impl Gauge for TracingInstrument {
    fn record(&self, value: i64, attributes: AttributeSet<'_>) {
        tracing::debug!(
            target: "relay::metrics",
            instrument = %self.name,
            unit = %self.unit,
            kind = "gauge",
            value,
            fields = %render(attributes),
        );
    }
}

impl Histogram for TracingInstrument {
    fn record(&self, value: f64, attributes: AttributeSet<'_>) {
        tracing::debug!(
            target: "relay::metrics",
            instrument = %self.name,
            unit = %self.unit,
            kind = "histogram",
            value,
            fields = %render(attributes),
        );
    }
}

/// The default [`MetricsProvider`]: every instrument it hands out is a thin wrapper that
/// logs its observations through `tracing` rather than holding any aggregated state
/// itself.
#[derive(Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsProvider for TracingMetrics {
    fn counter(&self, descriptor: InstrumentDescriptor<'_>) -> Result<Box<dyn Counter>, RelayError> {
        Ok(Box::new(TracingInstrument { name: descriptor.name.to_string(), unit: descriptor.unit.to_string() }))
    }

    fn gauge(&self, descriptor: InstrumentDescriptor<'_>) -> Result<Box<dyn Gauge>, RelayError> {
        Ok(Box::new(TracingInstrument { name: descriptor.name.to_string(), unit: descriptor.unit.to_string() }))
    }

    fn histogram(&self, descriptor: InstrumentDescriptor<'_>) -> Result<Box<dyn Histogram>, RelayError> {
        Ok(Box::new(TracingInstrument { name: descriptor.name.to_string(), unit: descriptor.unit.to_string() }))
    }
}
