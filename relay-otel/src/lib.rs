//! The default `tracing`-backed [`relay_core::observability::Logger`] and
//! [`relay_core::observability::MetricsProvider`] implementations, plus in-memory
//! recording doubles under [`test_support`] for assertions in other crates' tests.
//!
//! `relay-core` has no opinion on which observability backend is wired in; this crate
//! is the one concrete answer the workspace ships, forwarding every log record and
//! metric observation into `tracing`'s dispatcher rather than a dedicated OpenTelemetry
//! SDK — see DESIGN.md for why.

mod fields;
pub mod logging;
pub mod metrics;
pub mod test_support;

pub use logging::TracingLogger;
pub use metrics::TracingMetrics;
