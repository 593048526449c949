//! Per-request record carrying a borrowed edge, context, and the resolved log-level
//! matrix for this direction; exposes the End/EndStream family (spec component C5).

use crate::context::{CallSequence, Cancellation, Deadline, MonotonicTimePoint};
use crate::edge::Edge;
use crate::error::{ApplicationErrorMeta, Code, CustomCode, ErrorCode, FaultKind, RelayError};
use crate::observability::{KeyValue, LogSeverity};
use crate::request::{Direction, RequestMetadata, RpcType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The log level to use for each of the five outcome classes enumerated in spec.md
/// §4.4/§4.7. Resolved once by the middleware (from its level-matrix configuration) and
/// carried on the [`Call`] rather than looked up per-field at `End` time.
#[derive(Clone, Copy, Debug)]
pub struct ResolvedLevels {
    pub success: LogSeverity,
    pub application_error: LogSeverity,
    pub client_fault: LogSeverity,
    pub server_fault: LogSeverity,
    pub unknown: LogSeverity,
}

impl ResolvedLevels {
    /// Spec.md §4.7 defaults: success=DEBUG, everything else=ERROR.
    pub fn defaults() -> Self {
        Self {
            success: LogSeverity::Debug,
            application_error: LogSeverity::Error,
            client_fault: LogSeverity::Error,
            server_fault: LogSeverity::Error,
            unknown: LogSeverity::Error,
        }
    }

    fn level_for(&self, outcome: OutcomeClass) -> LogSeverity {
        match outcome {
            OutcomeClass::Success => self.success,
            OutcomeClass::ApplicationError => self.application_error,
            OutcomeClass::ClientFault => self.client_fault,
            OutcomeClass::ServerFault => self.server_fault,
            OutcomeClass::Unknown => self.unknown,
        }
    }
}

/// The five outcome classes a finished call is sorted into, per spec.md §4.4.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutcomeClass {
    Success,
    ApplicationError,
    ClientFault,
    ServerFault,
    Unknown,
}

/// Which counter-vector a finished call's failure lands on, independent of which
/// `OutcomeClass` drove the log level. An application error with no carried code is a
/// caller failure (spec.md §4.4); one with a code follows the code's fault kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MetricBucket {
    Success,
    CallerFailure,
    ServerFailure,
}

/// The fully-resolved classification of a finished call, ready for the middleware to
/// emit a log record and metric observations from.
pub struct EndReport {
    pub outcome: OutcomeClass,
    pub level: LogSeverity,
    pub elapsed_ms: f64,
    pub error_message: Option<String>,
    pub error_tag: Option<String>,
    pub error_name: Option<String>,
    pub error_details: Option<String>,
    pub timed_out: bool,
    pub ttl_ms: Option<f64>,
    /// `true` if a prior `End` on this call already ran and this report is a harmless
    /// no-op repeat (spec.md §8: End must not double-increment).
    pub already_ended: bool,
    /// The error the caller should receive in place of whatever the handler returned —
    /// `None` on success, otherwise the context-override-applied, application-error-
    /// merged final error, per spec.md §7's propagation policy.
    pub final_error: Option<RelayError>,
}

/// Per-request record created by [`crate::graph::Graph::begin`], destroyed when the
/// middleware returns.
pub struct Call {
    edge: Arc<Edge>,
    request: RequestMetadata,
    direction: Direction,
    rpc_type: RpcType,
    start: MonotonicTimePoint,
    cancellation: Cancellation,
    deadline: Deadline,
    sequence: CallSequence,
    levels: ResolvedLevels,
    ended: AtomicBool,
}

impl Call {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        edge: Arc<Edge>,
        request: RequestMetadata,
        direction: Direction,
        rpc_type: RpcType,
        cancellation: Cancellation,
        deadline: Deadline,
        sequence: CallSequence,
    ) -> Self {
        edge.record_call_started();
        if let Some(remaining) = deadline.remaining() {
            edge.record_ttl(remaining.as_secs_f64() * 1000.0);
        }
        Self {
            edge,
            request,
            direction,
            rpc_type,
            start: MonotonicTimePoint::now(),
            cancellation,
            deadline,
            sequence,
            levels: ResolvedLevels::defaults(),
            ended: AtomicBool::new(false),
        }
    }

    pub fn with_levels(mut self, levels: ResolvedLevels) -> Self {
        self.levels = levels;
        self
    }

    pub fn edge(&self) -> &Arc<Edge> {
        &self.edge
    }

    pub fn request(&self) -> &RequestMetadata {
        &self.request
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn rpc_type(&self) -> RpcType {
        self.rpc_type
    }

    pub fn sequence(&self) -> CallSequence {
        self.sequence
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    fn elapsed_ms(&self) -> f64 {
        MonotonicTimePoint::now()
            .checked_duration_since(self.start)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }

    /// Finalizes the call: applies the context-derived error override, classifies the
    /// outcome, records edge counters/histograms, and emits the log entry. Safe to call
    /// more than once — only the first invocation records anything.
    pub fn end(&self, handler_error: Option<RelayError>, application: Option<ApplicationErrorMeta>) -> EndReport {
        if self.ended.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return EndReport {
                outcome: OutcomeClass::Success,
                level: self.levels.success,
                elapsed_ms: self.elapsed_ms(),
                error_message: None,
                error_tag: None,
                error_name: None,
                error_details: None,
                timed_out: false,
                ttl_ms: None,
                already_ended: true,
                final_error: None,
            };
        }

        let elapsed_ms = self.elapsed_ms();
        let merged = Self::merge_application_error(handler_error, application);
        let final_error = self.apply_context_override(merged);
        let timed_out = final_error
            .as_ref()
            .is_some_and(|e| matches!(e.code(), Some(Code::Stable(ErrorCode::DeadlineExceeded))));

        let (outcome, bucket) = Self::classify(final_error.as_ref());
        let level = self.levels.level_for(outcome);

        match bucket {
            MetricBucket::Success => self.edge.record_success(elapsed_ms),
            MetricBucket::CallerFailure => {
                let error = final_error.as_ref().expect("caller failure bucket implies an error");
                self.edge.record_caller_failure(elapsed_ms, &error.tag(), &error.error_name_tag());
            }
            MetricBucket::ServerFailure => {
                let error = final_error.as_ref().expect("server failure bucket implies an error");
                self.edge.record_server_failure(elapsed_ms, &error.tag(), &error.error_name_tag());
            }
        }

        if timed_out {
            if let Some(remaining) = self.deadline.remaining() {
                self.edge.record_timeout_ttl(remaining.as_secs_f64() * 1000.0);
            } else {
                self.edge.record_timeout_ttl(0.0);
            }
        }

        self.emit_log(outcome, level, elapsed_ms, final_error.as_ref(), timed_out);

        EndReport {
            outcome,
            level,
            elapsed_ms,
            error_message: final_error.as_ref().map(|e| e.message().to_string()),
            error_tag: final_error.as_ref().map(|e| e.tag().into_owned()),
            error_name: final_error.as_ref().map(|e| e.error_name_tag().into_owned()),
            error_details: final_error.as_ref().and_then(|e| e.application()).and_then(|a| a.details.clone()),
            timed_out,
            ttl_ms: self.deadline.remaining().map(|d| d.as_secs_f64() * 1000.0),
            already_ended: false,
            final_error,
        }
    }

    /// Records a recovered panic against this call: increments the edge's `panics`
    /// counter, observes a server-fault latency sample tagged "panic", and emits a
    /// fatal-level log entry — per spec.md §4.4's "recover, record, re-raise". Marks the
    /// call ended so a subsequent `end()` (there shouldn't be one) is a harmless no-op.
    /// Does not re-panic itself; the caller re-raises the original payload.
    pub fn record_panic(&self, payload: &str) {
        if self.ended.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return;
        }
        let elapsed_ms = self.elapsed_ms();
        self.edge.record_panic(elapsed_ms);
        let fields = [
            KeyValue::new("rpc_type", self.rpc_type.tag()),
            KeyValue::new("direction", self.direction.tag()),
            KeyValue::new("latency", elapsed_ms),
            KeyValue::new("successful", false),
            KeyValue::new("panic", payload.to_string()),
        ];
        self.edge.log(LogSeverity::Fatal, "Handler panicked.", &fields);
    }

    fn merge_application_error(error: Option<RelayError>, application: Option<ApplicationErrorMeta>) -> Option<RelayError> {
        match (error, application) {
            (None, None) => None,
            (Some(err), None) => Some(err),
            (Some(err), Some(meta)) => Some(err.with_application(meta)),
            (None, Some(meta)) => {
                let message = meta.name.clone().unwrap_or_else(|| "application error".to_string());
                let built = match meta.code {
                    Some(Code::Stable(code)) => RelayError::new(code, message),
                    Some(Code::Custom(CustomCode(value))) => RelayError::custom(value, message),
                    None => RelayError::opaque(message),
                };
                Some(built.with_application(meta))
            }
        }
    }

    /// Synthesizes a CANCELLED or DEADLINE_EXCEEDED error if the context was done by
    /// the time the handler returned, discarding whatever the handler produced — per
    /// spec.md §4.4's context-derived override and §9's "inspect AFTER the handler
    /// returns" ordering rule.
    fn apply_context_override(&self, handler_result: Option<RelayError>) -> Option<RelayError> {
        if self.cancellation.is_cancelled() {
            return Some(RelayError::cancelled(format!(
                "call to procedure {:?} on service {:?} from caller {:?} was cancelled",
                self.request.procedure, self.request.callee, self.request.caller,
            )));
        }
        if self.deadline.is_expired() {
            return Some(RelayError::deadline_exceeded(format!(
                "call to procedure {:?} on service {:?} from caller {:?} exceeded its deadline",
                self.request.procedure, self.request.callee, self.request.caller,
            )));
        }
        handler_result
    }

    fn classify(error: Option<&RelayError>) -> (OutcomeClass, MetricBucket) {
        let Some(error) = error else {
            return (OutcomeClass::Success, MetricBucket::Success);
        };

        let is_application_error = error.application().is_some();
        let fault_kind = error.fault_kind();

        let bucket = match fault_kind {
            FaultKind::Client => MetricBucket::CallerFailure,
            FaultKind::Server | FaultKind::Indeterminate => MetricBucket::ServerFailure,
        };

        let outcome = if is_application_error {
            OutcomeClass::ApplicationError
        } else if error.code().is_none() {
            OutcomeClass::Unknown
        } else {
            match fault_kind {
                FaultKind::Client => OutcomeClass::ClientFault,
                FaultKind::Server | FaultKind::Indeterminate => OutcomeClass::ServerFault,
            }
        };

        (outcome, bucket)
    }

    /// The success-path message, direction/rpc-type specific — spec.md §8 pins the exact
    /// literal "Handled inbound request." for the inbound-unary scenario; the other five
    /// entry points get their own wording in the same register.
    fn success_message(&self) -> &'static str {
        match (self.direction, self.rpc_type) {
            (Direction::Inbound, RpcType::Unary) => "Handled inbound request.",
            (Direction::Inbound, RpcType::Oneway) => "Handled inbound one-way request.",
            (Direction::Inbound, RpcType::Streaming) => "Finished inbound stream.",
            (Direction::Outbound, RpcType::Unary) => "Completed outbound call.",
            (Direction::Outbound, RpcType::Oneway) => "Completed outbound one-way call.",
            (Direction::Outbound, RpcType::Streaming) => "Completed outbound stream handshake.",
        }
    }

    fn emit_log(&self, outcome: OutcomeClass, level: LogSeverity, elapsed_ms: f64, error: Option<&RelayError>, timed_out: bool) {
        let successful = matches!(outcome, OutcomeClass::Success);
        let mut fields = vec![
            KeyValue::new("rpc_type", self.rpc_type.tag()),
            KeyValue::new("direction", self.direction.tag()),
            KeyValue::new("latency", elapsed_ms),
            KeyValue::new("successful", successful),
        ];
        if let Some(remaining) = self.deadline.remaining() {
            fields.push(KeyValue::new("timeout", remaining.as_secs_f64() * 1000.0));
        }
        if timed_out {
            fields.push(KeyValue::new("timed_out", true));
        }
        if let Some(error) = error {
            fields.push(KeyValue::new("error", error.to_string()));
            fields.push(KeyValue::new("errorCode", error.tag().into_owned()));
            fields.push(KeyValue::new("errorName", error.error_name_tag().into_owned()));
            if let Some(details) = error.application().and_then(|a| a.details.as_ref()) {
                fields.push(KeyValue::new("errorDetails", details.clone()));
            }
        }
        let message = if successful { self.success_message() } else { "Call finished with an error." };
        self.edge.log(level, message, &fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CallSequencer;
    use crate::edge::EdgeIdentity;
    use crate::observability::{NoopLogger, NoopMetrics};
    use crate::request::Headers;
    use crate::services::TagBlocklist;

    fn test_call() -> Call {
        let identity = EdgeIdentity::new("caller", "service", "tcp", "raw", "procedure", "rk", "rd", Direction::Inbound, RpcType::Unary);
        let edge = Arc::new(Edge::new(identity, &NoopMetrics, Arc::new(NoopLogger), TagBlocklist::new()));
        let request = RequestMetadata {
            caller: "caller".into(),
            callee: "service".into(),
            transport: "tcp".into(),
            procedure: "procedure".into(),
            encoding: "raw".into(),
            routing_key: "rk".into(),
            routing_delegate: "rd".into(),
            shard_key: "sk".into(),
            headers: Headers::new(),
        };
        let sequence = CallSequencer::new().next();
        Call::new(edge, request, Direction::Inbound, RpcType::Unary, Cancellation::new(), Deadline::none(), sequence)
    }

    #[test]
    fn success_path_increments_successes_not_failures() {
        let call = test_call();
        let report = call.end(None, None);
        assert_eq!(report.outcome, OutcomeClass::Success);
        let (calls, successes, panics) = call.edge().counters_snapshot();
        assert_eq!((calls, successes, panics), (1, 1, 0));
    }

    #[test]
    fn client_fault_is_classified_and_tagged() {
        let call = test_call();
        let report = call.end(Some(RelayError::invalid_argument("bad input")), None);
        assert_eq!(report.outcome, OutcomeClass::ClientFault);
        assert_eq!(report.error_tag.as_deref(), Some("invalid-argument"));
    }

    #[test]
    fn application_error_without_code_is_caller_failure_tagged_application_error() {
        let call = test_call();
        let meta = ApplicationErrorMeta { name: Some("Funky".into()), details: None, code: None };
        let report = call.end(None, Some(meta));
        assert_eq!(report.outcome, OutcomeClass::ApplicationError);
        assert_eq!(report.error_tag.as_deref(), Some("application_error"));
        assert_eq!(report.error_name.as_deref(), Some("Funky"));
    }

    #[test]
    fn application_error_with_code_uses_code_for_tag() {
        let call = test_call();
        let meta = ApplicationErrorMeta {
            name: Some("Funky".into()),
            details: None,
            code: Some(Code::Stable(ErrorCode::ResourceExhausted)),
        };
        let report = call.end(None, Some(meta));
        assert_eq!(report.outcome, OutcomeClass::ApplicationError);
        assert_eq!(report.error_tag.as_deref(), Some("resource-exhausted"));
    }

    #[test]
    fn cancelled_context_overrides_handler_result_after_return() {
        let call = test_call();
        call.cancellation().cancel();
        let report = call.end(None, None);
        assert_eq!(report.outcome, OutcomeClass::ClientFault);
        assert_eq!(report.error_tag.as_deref(), Some("cancelled"));
    }

    #[test]
    fn record_panic_increments_calls_and_panics() {
        let call = test_call();
        call.record_panic("boom");
        let (calls, successes, panics) = call.edge().counters_snapshot();
        assert_eq!((calls, successes, panics), (1, 0, 1));
    }

    #[test]
    fn double_end_does_not_double_increment() {
        let call = test_call();
        call.end(None, None);
        let second = call.end(Some(RelayError::invalid_argument("ignored")), None);
        assert!(second.already_ended);
        let (calls, successes, _) = call.edge().counters_snapshot();
        assert_eq!((calls, successes), (1, 1));
    }
}
