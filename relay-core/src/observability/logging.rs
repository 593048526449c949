//! The logging trait seam: [`LogSeverity`], [`LogRecord`], and the [`Logger`] trait.

use super::attributes::{AttributeSet, KeyValue};
use std::borrow::Cow;

/// Standard severity levels, ordered from least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// One emitted log line: a severity, a message, and a borrowed attribute set.
#[derive(Clone, Debug)]
pub struct LogRecord<'a> {
    pub severity: LogSeverity,
    pub message: Cow<'a, str>,
    pub fields: AttributeSet<'a>,
}

impl<'a> LogRecord<'a> {
    pub fn new(severity: LogSeverity, message: impl Into<Cow<'a, str>>) -> Self {
        Self {
            severity,
            message: message.into(),
            fields: AttributeSet::EMPTY,
        }
    }

    pub fn with_fields(mut self, fields: AttributeSet<'a>) -> Self {
        self.fields = fields;
        self
    }
}

/// The logging trait seam every call path writes through.
///
/// Only [`Logger::log`] is required; the rest are convenience methods mirroring it at a
/// fixed severity, matching the teacher's `Logger` trait shape in
/// `spark-core/src/observability/logging.rs`.
pub trait Logger: Send + Sync {
    fn log(&self, record: LogRecord<'_>);

    fn trace(&self, message: &str) {
        self.log(LogRecord::new(LogSeverity::Trace, message.to_string()));
    }

    fn trace_with_fields(&self, message: &str, fields: &[KeyValue<'_>]) {
        self.log(LogRecord::new(LogSeverity::Trace, message.to_string()).with_fields(AttributeSet(fields)));
    }

    fn debug(&self, message: &str) {
        self.log(LogRecord::new(LogSeverity::Debug, message.to_string()));
    }

    fn debug_with_fields(&self, message: &str, fields: &[KeyValue<'_>]) {
        self.log(LogRecord::new(LogSeverity::Debug, message.to_string()).with_fields(AttributeSet(fields)));
    }

    fn info(&self, message: &str) {
        self.log(LogRecord::new(LogSeverity::Info, message.to_string()));
    }

    fn info_with_fields(&self, message: &str, fields: &[KeyValue<'_>]) {
        self.log(LogRecord::new(LogSeverity::Info, message.to_string()).with_fields(AttributeSet(fields)));
    }

    fn warn(&self, message: &str) {
        self.log(LogRecord::new(LogSeverity::Warn, message.to_string()));
    }

    fn warn_with_fields(&self, message: &str, fields: &[KeyValue<'_>]) {
        self.log(LogRecord::new(LogSeverity::Warn, message.to_string()).with_fields(AttributeSet(fields)));
    }

    fn error(&self, message: &str) {
        self.log(LogRecord::new(LogSeverity::Error, message.to_string()));
    }

    fn error_with_fields(&self, message: &str, fields: &[KeyValue<'_>]) {
        self.log(LogRecord::new(LogSeverity::Error, message.to_string()).with_fields(AttributeSet(fields)));
    }

    fn fatal(&self, message: &str) {
        self.log(LogRecord::new(LogSeverity::Fatal, message.to_string()));
    }

    fn fatal_with_fields(&self, message: &str, fields: &[KeyValue<'_>]) {
        self.log(LogRecord::new(LogSeverity::Fatal, message.to_string()).with_fields(AttributeSet(fields)));
    }
}

/// A [`Logger`] that discards every record, used when application code doesn't wire a
/// real backend.
#[derive(Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _record: LogRecord<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_is_least_to_most_severe() {
        assert!(LogSeverity::Trace < LogSeverity::Debug);
        assert!(LogSeverity::Error < LogSeverity::Fatal);
    }

    #[test]
    fn noop_logger_accepts_every_convenience_method() {
        let logger = NoopLogger;
        logger.info("hello");
        logger.error_with_fields("boom", &[KeyValue::new("attempt", 1i64)]);
    }
}
