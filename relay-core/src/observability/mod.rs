//! Backend-agnostic observability trait seams: structured attributes, the metrics
//! provider contract, and the logger contract. Concrete implementations live in the
//! `relay-otel` crate; `relay-core` only depends on the traits.

pub mod attributes;
pub mod logging;
pub mod metrics;

pub use attributes::{AttributeSet, KeyValue, MetricAttributeValue};
pub use logging::{LogRecord, LogSeverity, Logger, NoopLogger};
pub use metrics::{Counter, Gauge, Histogram, InstrumentDescriptor, MetricsProvider, NoopInstrument, NoopMetrics};
