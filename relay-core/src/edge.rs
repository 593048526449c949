//! One point in the caller×callee×procedure×encoding×rk×rd×direction×rpc-type space,
//! owning its counters and histograms (spec component C3).

use crate::observability::{
    AttributeSet, Counter, Gauge, Histogram, InstrumentDescriptor, KeyValue, LogRecord, LogSeverity, Logger,
    MetricsProvider, NoopInstrument,
};
use crate::request::{sanitize_identity_component, Direction, RpcType};
use crate::services::TagBlocklist;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// The nine sanitized strings that together uniquely identify an edge, per spec.md §3.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EdgeIdentity {
    pub caller: String,
    pub callee: String,
    pub transport: String,
    pub encoding: String,
    pub procedure: String,
    pub routing_key: String,
    pub routing_delegate: String,
    pub direction: Direction,
    pub rpc_type: RpcType,
}

impl EdgeIdentity {
    pub fn new(
        caller: &str,
        callee: &str,
        transport: &str,
        encoding: &str,
        procedure: &str,
        routing_key: &str,
        routing_delegate: &str,
        direction: Direction,
        rpc_type: RpcType,
    ) -> Self {
        Self {
            caller: sanitize_identity_component(caller, false).into_owned(),
            callee: sanitize_identity_component(callee, false).into_owned(),
            transport: sanitize_identity_component(transport, true).into_owned(),
            encoding: sanitize_identity_component(encoding, false).into_owned(),
            procedure: sanitize_identity_component(procedure, false).into_owned(),
            routing_key: sanitize_identity_component(routing_key, false).into_owned(),
            routing_delegate: sanitize_identity_component(routing_delegate, false).into_owned(),
            direction,
            rpc_type,
        }
    }

    /// The fixed tag set attached to `calls`/`successes`/`panics`, per spec.md §6.
    pub fn base_tags(&self, blocklist: &TagBlocklist) -> Vec<KeyValue<'_>> {
        vec![
            KeyValue::new("source", blocklist.apply("source", &self.caller)),
            KeyValue::new("dest", blocklist.apply("dest", &self.callee)),
            KeyValue::new("transport", blocklist.apply("transport", &self.transport)),
            KeyValue::new("encoding", blocklist.apply("encoding", &self.encoding)),
            KeyValue::new("procedure", blocklist.apply("procedure", &self.procedure)),
            KeyValue::new("routing_key", blocklist.apply("routing_key", &self.routing_key)),
            KeyValue::new("routing_delegate", blocklist.apply("routing_delegate", &self.routing_delegate)),
            KeyValue::new("rpc_type", self.rpc_type.tag()),
            KeyValue::new("direction", self.direction.tag()),
        ]
    }
}

const LATENCY_BUCKETS_MS: &[f64] = &[
    1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0, 25.0, 30.0, 35.0, 40.0, 45.0,
    50.0, 60.0, 70.0, 80.0, 90.0, 100.0, 120.0, 140.0, 160.0, 180.0, 200.0, 250.0, 300.0, 350.0, 400.0, 450.0, 500.0,
    600.0, 700.0, 800.0, 900.0, 1000.0, 1500.0, 2000.0, 2500.0, 3000.0, 3500.0, 4000.0, 4500.0, 5000.0, 7500.0,
    10000.0,
];

/// Histogram bucket boundaries shared by every latency-shaped instrument, per spec.md
/// §6. Exposed so `relay-otel` backends can configure matching buckets.
pub fn latency_bucket_boundaries_ms() -> &'static [f64] {
    LATENCY_BUCKETS_MS
}

/// Streaming-only instruments, present exclusively on edges with `rpc_type == Streaming`
/// (spec.md §3).
pub struct StreamingInstruments {
    pub stream_sends: Box<dyn Counter>,
    pub stream_send_successes: Box<dyn Counter>,
    pub stream_send_failures: Box<dyn Counter>,
    pub stream_receives: Box<dyn Counter>,
    pub stream_receive_successes: Box<dyn Counter>,
    pub stream_receive_failures: Box<dyn Counter>,
    pub streams_active: Box<dyn Gauge>,
    pub stream_duration_ms: Box<dyn Histogram>,
    pub request_payload_size: Box<dyn Histogram>,
    pub response_payload_size: Box<dyn Histogram>,
    pub send_latency_ms: Box<dyn Histogram>,
    pub receive_latency_ms: Box<dyn Histogram>,
}

/// Registers a counter against `metrics`, substituting a [`NoopInstrument`] and logging
/// once through `logger` if the backend refuses the registration, per spec.md §4.3.
fn counter_or_noop(metrics: &dyn MetricsProvider, logger: &Arc<dyn Logger>, descriptor: InstrumentDescriptor<'_>) -> Box<dyn Counter> {
    metrics.counter(descriptor).unwrap_or_else(|err| {
        logger.log(LogRecord::new(
            LogSeverity::Error,
            format!("failed to register counter \"{}\": {err}; substituting a no-op instrument", descriptor.name),
        ));
        Box::new(NoopInstrument)
    })
}

/// Gauge counterpart of [`counter_or_noop`].
fn gauge_or_noop(metrics: &dyn MetricsProvider, logger: &Arc<dyn Logger>, descriptor: InstrumentDescriptor<'_>) -> Box<dyn Gauge> {
    metrics.gauge(descriptor).unwrap_or_else(|err| {
        logger.log(LogRecord::new(
            LogSeverity::Error,
            format!("failed to register gauge \"{}\": {err}; substituting a no-op instrument", descriptor.name),
        ));
        Box::new(NoopInstrument)
    })
}

/// Histogram counterpart of [`counter_or_noop`].
fn histogram_or_noop(metrics: &dyn MetricsProvider, logger: &Arc<dyn Logger>, descriptor: InstrumentDescriptor<'_>) -> Box<dyn Histogram> {
    metrics.histogram(descriptor).unwrap_or_else(|err| {
        logger.log(LogRecord::new(
            LogSeverity::Error,
            format!("failed to register histogram \"{}\": {err}; substituting a no-op instrument", descriptor.name),
        ));
        Box::new(NoopInstrument)
    })
}

/// One edge: owns its counters, histograms, and the logger and tag blocklist `log()`
/// enriches every record with its identity fields through. Never destroyed for the life
/// of the [`crate::graph::Graph`] that created it.
pub struct Edge {
    identity: EdgeIdentity,
    logger: Arc<dyn Logger>,
    blocklist: TagBlocklist,
    calls: Box<dyn Counter>,
    successes: Box<dyn Counter>,
    panics: Box<dyn Counter>,
    caller_failures: Box<dyn Counter>,
    server_failures: Box<dyn Counter>,
    success_latency_ms: Box<dyn Histogram>,
    caller_failure_latency_ms: Box<dyn Histogram>,
    server_failure_latency_ms: Box<dyn Histogram>,
    ttl_ms: Box<dyn Histogram>,
    timeout_ttl_ms: Box<dyn Histogram>,
    streaming: Option<StreamingInstruments>,
    calls_total: AtomicU64,
    successes_total: AtomicU64,
    panics_total: AtomicU64,
}

impl Edge {
    pub fn new(identity: EdgeIdentity, metrics: &dyn MetricsProvider, logger: Arc<dyn Logger>, blocklist: TagBlocklist) -> Self {
        let streaming = identity.rpc_type.is_streaming().then(|| StreamingInstruments {
            stream_sends: counter_or_noop(metrics, &logger, InstrumentDescriptor::new("stream_sends", "stream send attempts", "1")),
            stream_send_successes: counter_or_noop(
                metrics,
                &logger,
                InstrumentDescriptor::new("stream_send_successes", "stream send successes", "1"),
            ),
            stream_send_failures: counter_or_noop(
                metrics,
                &logger,
                InstrumentDescriptor::new("stream_send_failures", "stream send failures", "1"),
            ),
            stream_receives: counter_or_noop(
                metrics,
                &logger,
                InstrumentDescriptor::new("stream_receives", "stream receive attempts", "1"),
            ),
            stream_receive_successes: counter_or_noop(
                metrics,
                &logger,
                InstrumentDescriptor::new("stream_receive_successes", "stream receive successes", "1"),
            ),
            stream_receive_failures: counter_or_noop(
                metrics,
                &logger,
                InstrumentDescriptor::new("stream_receive_failures", "stream receive failures", "1"),
            ),
            streams_active: gauge_or_noop(metrics, &logger, InstrumentDescriptor::new("streams_active", "currently open streams", "1")),
            stream_duration_ms: histogram_or_noop(metrics, &logger, InstrumentDescriptor::new("stream_duration_ms", "stream lifetime", "ms")),
            request_payload_size: histogram_or_noop(
                metrics,
                &logger,
                InstrumentDescriptor::new("request_payload_size", "request message size", "By"),
            ),
            response_payload_size: histogram_or_noop(
                metrics,
                &logger,
                InstrumentDescriptor::new("response_payload_size", "response message size", "By"),
            ),
            send_latency_ms: histogram_or_noop(metrics, &logger, InstrumentDescriptor::new("send_latency_ms", "per-send latency", "ms")),
            receive_latency_ms: histogram_or_noop(
                metrics,
                &logger,
                InstrumentDescriptor::new("receive_latency_ms", "per-receive latency", "ms"),
            ),
        });

        Self {
            identity,
            blocklist,
            calls: counter_or_noop(metrics, &logger, InstrumentDescriptor::new("calls", "calls started", "1")),
            successes: counter_or_noop(metrics, &logger, InstrumentDescriptor::new("successes", "calls that succeeded", "1")),
            panics: counter_or_noop(metrics, &logger, InstrumentDescriptor::new("panics", "handler panics", "1")),
            caller_failures: counter_or_noop(metrics, &logger, InstrumentDescriptor::new("caller_failures", "caller-fault failures", "1")),
            server_failures: counter_or_noop(metrics, &logger, InstrumentDescriptor::new("server_failures", "server-fault failures", "1")),
            success_latency_ms: histogram_or_noop(
                metrics,
                &logger,
                InstrumentDescriptor::new("success_latency_ms", "latency of successful calls", "ms"),
            ),
            caller_failure_latency_ms: histogram_or_noop(
                metrics,
                &logger,
                InstrumentDescriptor::new("caller_failure_latency_ms", "latency of caller faults", "ms"),
            ),
            server_failure_latency_ms: histogram_or_noop(
                metrics,
                &logger,
                InstrumentDescriptor::new("server_failure_latency_ms", "latency of server faults", "ms"),
            ),
            ttl_ms: histogram_or_noop(metrics, &logger, InstrumentDescriptor::new("ttl_ms", "context deadline at call start", "ms")),
            timeout_ttl_ms: histogram_or_noop(
                metrics,
                &logger,
                InstrumentDescriptor::new("timeout_ttl_ms", "ttl of calls that timed out", "ms"),
            ),
            streaming,
            calls_total: AtomicU64::new(0),
            successes_total: AtomicU64::new(0),
            panics_total: AtomicU64::new(0),
            logger,
        }
    }

    pub fn identity(&self) -> &EdgeIdentity {
        &self.identity
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    pub fn streaming(&self) -> Option<&StreamingInstruments> {
        self.streaming.as_ref()
    }

    /// The fixed {source, dest, transport, encoding, procedure, routing_key,
    /// routing_delegate, rpc_type, direction} tag set, blocklist-applied, attached to
    /// every `calls`/`successes`/`panics`/`caller_failures`/`server_failures` increment
    /// per spec.md §6.
    fn base_tags(&self) -> Vec<KeyValue<'_>> {
        self.identity.base_tags(&self.blocklist)
    }

    pub fn record_call_started(&self) {
        self.calls.add(1, AttributeSet(&self.base_tags()));
        self.calls_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self, latency_ms: f64) {
        self.successes.add(1, AttributeSet(&self.base_tags()));
        self.success_latency_ms.record(latency_ms, AttributeSet::EMPTY);
        self.successes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_caller_failure(&self, latency_ms: f64, error_tag: &str, error_name: &str) {
        let mut tags = self.base_tags();
        tags.push(KeyValue::new("error", error_tag.to_string()));
        tags.push(KeyValue::new("error_name", error_name.to_string()));
        self.caller_failures.add(1, AttributeSet(&tags));
        self.caller_failure_latency_ms.record(latency_ms, AttributeSet::EMPTY);
    }

    pub fn record_server_failure(&self, latency_ms: f64, error_tag: &str, error_name: &str) {
        let mut tags = self.base_tags();
        tags.push(KeyValue::new("error", error_tag.to_string()));
        tags.push(KeyValue::new("error_name", error_name.to_string()));
        self.server_failures.add(1, AttributeSet(&tags));
        self.server_failure_latency_ms.record(latency_ms, AttributeSet::EMPTY);
    }

    pub fn record_panic(&self, server_fault_latency_ms: f64) {
        self.panics.add(1, AttributeSet(&self.base_tags()));
        self.panics_total.fetch_add(1, Ordering::Relaxed);
        let tags = [KeyValue::new("error", "panic")];
        self.server_failure_latency_ms.record(server_fault_latency_ms, AttributeSet(&tags));
    }

    pub fn record_ttl(&self, ttl_ms: f64) {
        self.ttl_ms.record(ttl_ms, AttributeSet::EMPTY);
    }

    pub fn record_timeout_ttl(&self, ttl_ms: f64) {
        self.timeout_ttl_ms.record(ttl_ms, AttributeSet::EMPTY);
    }

    /// The edge-identity fields (caller/callee/transport/encoding/procedure/routing_key/
    /// routing_delegate) every log record carries as base fields, per spec.md §4.4.
    fn identity_fields(&self) -> Vec<KeyValue<'_>> {
        vec![
            KeyValue::new("caller", self.identity.caller.as_str()),
            KeyValue::new("callee", self.identity.callee.as_str()),
            KeyValue::new("transport", self.identity.transport.as_str()),
            KeyValue::new("encoding", self.identity.encoding.as_str()),
            KeyValue::new("procedure", self.identity.procedure.as_str()),
            KeyValue::new("routing_key", self.identity.routing_key.as_str()),
            KeyValue::new("routing_delegate", self.identity.routing_delegate.as_str()),
        ]
    }

    /// Emits `message` at `severity` with `fields` appended after the edge identity,
    /// which every record carries as its base fields (spec.md §4.4).
    pub fn log(&self, severity: LogSeverity, message: &str, fields: &[KeyValue<'_>]) {
        let mut all_fields = self.identity_fields();
        all_fields.extend_from_slice(fields);
        self.logger.log(LogRecord::new(severity, message.to_string()).with_fields(AttributeSet(&all_fields)));
    }

    /// Snapshot of the cumulative counters, exposed for the invariant check in spec.md
    /// §8 (`calls == successes + failures + panics`) that tests assert against.
    pub fn counters_snapshot(&self) -> (u64, u64, u64) {
        (
            self.calls_total.load(Ordering::Relaxed),
            self.successes_total.load(Ordering::Relaxed),
            self.panics_total.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::NoopMetrics;
    use crate::services::TagBlocklist;

    #[test]
    fn edge_identity_sanitizes_empty_transport() {
        let identity = EdgeIdentity::new("c", "s", "", "raw", "p", "rk", "rd", Direction::Inbound, RpcType::Unary);
        assert_eq!(identity.transport, "unknown");
    }

    #[test]
    fn base_tags_apply_blocklist_but_not_the_fingerprint() {
        let identity = EdgeIdentity::new("caller", "callee", "tcp", "raw", "proc", "rk", "rd", Direction::Outbound, RpcType::Unary);
        let mut blocklist = TagBlocklist::new();
        blocklist.block("source");
        let tags = identity.base_tags(&blocklist);
        assert_eq!(tags[0].value.as_tag(), "__dropped__");
        assert_eq!(identity.caller, "caller");
    }

    #[test]
    fn streaming_instruments_only_present_for_streaming_rpc_type() {
        let metrics = NoopMetrics;
        let logger: Arc<dyn Logger> = Arc::new(crate::observability::NoopLogger);
        let unary_identity = EdgeIdentity::new("c", "s", "tcp", "raw", "p", "rk", "rd", Direction::Inbound, RpcType::Unary);
        let unary_edge = Edge::new(unary_identity, &metrics, logger.clone(), TagBlocklist::new());
        assert!(unary_edge.streaming().is_none());

        let stream_identity = EdgeIdentity::new("c", "s", "tcp", "raw", "p", "rk", "rd", Direction::Inbound, RpcType::Streaming);
        let stream_edge = Edge::new(stream_identity, &metrics, logger, TagBlocklist::new());
        assert!(stream_edge.streaming().is_some());
    }

    #[test]
    fn counters_snapshot_tracks_calls_successes_panics() {
        let metrics = NoopMetrics;
        let logger: Arc<dyn Logger> = Arc::new(crate::observability::NoopLogger);
        let identity = EdgeIdentity::new("c", "s", "tcp", "raw", "p", "rk", "rd", Direction::Inbound, RpcType::Unary);
        let edge = Edge::new(identity, &metrics, logger, TagBlocklist::new());
        edge.record_call_started();
        edge.record_success(1.0);
        let (calls, successes, panics) = edge.counters_snapshot();
        assert_eq!((calls, successes, panics), (1, 1, 0));
    }
}
