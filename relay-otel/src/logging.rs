//! [`TracingLogger`]: forwards [`LogRecord`]s to `tracing`'s dispatcher at the matching
//! level, since `tracing`'s level macros require a literal level per call site.

use crate::fields::render;
use relay_core::observability::{LogRecord, LogSeverity, Logger};

/// Forwards every log record to the globally-installed `tracing` subscriber. `Fatal`
/// has no `tracing::Level` counterpart, so it's emitted at `ERROR` with a `fatal=true`
/// field rather than dropped or panicking.
#[derive(Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, record: LogRecord<'_>) {
        let fields = render(record.fields);
        match record.severity {
            LogSeverity::Trace => tracing::trace!(target: "relay", fields = %fields, "{}", record.message),
            LogSeverity::Debug => tracing::debug!(target: "relay", fields = %fields, "{}", record.message),
            LogSeverity::Info => tracing::info!(target: "relay", fields = %fields, "{}", record.message),
            LogSeverity::Warn => tracing::warn!(target: "relay", fields = %fields, "{}", record.message),
            LogSeverity::Error => tracing::error!(target: "relay", fields = %fields, "{}", record.message),
            LogSeverity::Fatal => tracing::error!(target: "relay", fatal = true, fields = %fields, "{}", record.message),
        }
    }
}
