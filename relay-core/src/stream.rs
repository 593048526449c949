//! Instruments a [`Stream`] so each Send/Receive/Close is timed, counted, and logged,
//! treating end-of-stream on Receive as success (spec component C7).

use crate::call::ResolvedLevels;
use crate::context::MonotonicTimePoint;
use crate::edge::Edge;
use crate::error::{FaultKind, RelayError};
use crate::observability::{AttributeSet, KeyValue, LogSeverity};
use crate::transport::{Stream, StreamMessage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Whether the wrapped stream's `close` forwards to the underlying stream (client side)
/// or is a no-op (server side, which terminates by handler return instead), per spec.md
/// §4.6.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseMode {
    ForwardToInner,
    NoOp,
}

/// Wraps a [`Stream`], instrumenting every operation against the owning edge's
/// streaming sub-edge.
pub struct StreamWrapper<S> {
    inner: S,
    edge: Arc<Edge>,
    levels: ResolvedLevels,
    opened_at: MonotonicTimePoint,
    close_mode: CloseMode,
    closed: AtomicBool,
}

impl<S: Stream> StreamWrapper<S> {
    pub fn client(inner: S, edge: Arc<Edge>, levels: ResolvedLevels) -> Self {
        Self::new(inner, edge, levels, CloseMode::ForwardToInner)
    }

    pub fn server(inner: S, edge: Arc<Edge>, levels: ResolvedLevels) -> Self {
        Self::new(inner, edge, levels, CloseMode::NoOp)
    }

    fn new(inner: S, edge: Arc<Edge>, levels: ResolvedLevels, close_mode: CloseMode) -> Self {
        if let Some(streaming) = edge.streaming() {
            streaming.streams_active.record(1, AttributeSet::EMPTY);
        }
        Self {
            inner,
            edge,
            levels,
            opened_at: MonotonicTimePoint::now(),
            close_mode,
            closed: AtomicBool::new(false),
        }
    }

    fn elapsed_ms(&self, since: MonotonicTimePoint) -> f64 {
        MonotonicTimePoint::now().checked_duration_since(since).map(|d| d.as_secs_f64() * 1000.0).unwrap_or(0.0)
    }

    /// The configured level for a stream operation's outcome: `levels.success` on `Ok`,
    /// otherwise the client/server-fault level selected by the error's fault kind — the
    /// "stream open/close subset tracks the success/failure split" of spec.md §4.7's
    /// level matrix.
    fn level_for<T>(&self, result: &Result<T, RelayError>) -> LogSeverity {
        match result {
            Ok(_) => self.levels.success,
            Err(err) => match err.fault_kind() {
                FaultKind::Client => self.levels.client_fault,
                FaultKind::Server | FaultKind::Indeterminate => self.levels.server_fault,
            },
        }
    }

    pub async fn send(&mut self, payload: &[u8]) -> Result<(), RelayError> {
        let start = MonotonicTimePoint::now();
        let result = self.inner.send(payload).await;
        let elapsed = self.elapsed_ms(start);

        if let Some(streaming) = self.edge.streaming() {
            streaming.stream_sends.add(1, AttributeSet::EMPTY);
            streaming.send_latency_ms.record(elapsed, AttributeSet::EMPTY);
            streaming.request_payload_size.record(payload.len() as f64, AttributeSet::EMPTY);
            match &result {
                Ok(()) => streaming.stream_send_successes.add(1, AttributeSet::EMPTY),
                Err(err) => {
                    let tags = [KeyValue::new("error", err.tag().into_owned())];
                    streaming.stream_send_failures.add(1, AttributeSet(&tags));
                }
            }
        }

        let level = self.level_for(&result);
        let message = match &result {
            Ok(()) => "Sent stream message.",
            Err(_) => "Failed to send stream message.",
        };
        self.log_operation(level, message, elapsed, result.as_ref().err());
        result
    }

    pub async fn receive(&mut self) -> Result<StreamMessage, RelayError> {
        let start = MonotonicTimePoint::now();
        let result = self.inner.receive().await;
        let elapsed = self.elapsed_ms(start);

        // Eof is the normal termination signal, not a failure — spec.md §4.6.
        let is_success = matches!(result, Ok(_));

        if let Some(streaming) = self.edge.streaming() {
            streaming.stream_receives.add(1, AttributeSet::EMPTY);
            streaming.receive_latency_ms.record(elapsed, AttributeSet::EMPTY);
            if let Ok(StreamMessage::Payload(payload)) = &result {
                streaming.response_payload_size.record(payload.len() as f64, AttributeSet::EMPTY);
            }
            if is_success {
                streaming.stream_receive_successes.add(1, AttributeSet::EMPTY);
            } else if let Err(err) = &result {
                let tags = [KeyValue::new("error", err.tag().into_owned())];
                streaming.stream_receive_failures.add(1, AttributeSet(&tags));
            }
        }

        let level = self.level_for(&result);
        let message = if is_success { "Received stream message." } else { "Failed to receive stream message." };
        self.log_operation(level, message, elapsed, result.as_ref().err());
        result
    }

    pub async fn close(&mut self) -> Result<(), RelayError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let result = match self.close_mode {
            CloseMode::ForwardToInner => self.inner.close().await,
            CloseMode::NoOp => Ok(()),
        };

        let duration_ms = self.elapsed_ms(self.opened_at);
        if let Some(streaming) = self.edge.streaming() {
            streaming.stream_duration_ms.record(duration_ms, AttributeSet::EMPTY);
            streaming.streams_active.record(-1, AttributeSet::EMPTY);
        }

        let level = self.level_for(&result);
        let message = match &result {
            Ok(()) => "Closed stream.",
            Err(_) => "Failed to close stream.",
        };
        self.log_operation(level, message, duration_ms, result.as_ref().err());
        result
    }

    fn log_operation(&self, level: LogSeverity, message: &str, elapsed_ms: f64, error: Option<&RelayError>) {
        let mut fields = vec![KeyValue::new("latency", elapsed_ms)];
        if let Some(error) = error {
            fields.push(KeyValue::new("error", error.to_string()));
            fields.push(KeyValue::new("errorCode", error.tag().into_owned()));
        }
        self.edge.log(level, message, &fields);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::EdgeIdentity;
    use crate::observability::{NoopLogger, NoopMetrics};
    use crate::request::{Direction, RpcType};
    use crate::services::TagBlocklist;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct FakeStream {
        inbound: Mutex<VecDeque<Result<StreamMessage, RelayError>>>,
    }

    #[async_trait]
    impl Stream for FakeStream {
        async fn send(&mut self, _payload: &[u8]) -> Result<(), RelayError> {
            Ok(())
        }

        async fn receive(&mut self) -> Result<StreamMessage, RelayError> {
            self.inbound.lock().unwrap().pop_front().unwrap_or(Ok(StreamMessage::Eof))
        }

        async fn close(&mut self) -> Result<(), RelayError> {
            Ok(())
        }
    }

    fn streaming_edge() -> Arc<Edge> {
        let identity = EdgeIdentity::new("c", "s", "tcp", "raw", "p", "rk", "rd", Direction::Inbound, RpcType::Streaming);
        Arc::new(Edge::new(identity, &NoopMetrics, Arc::new(NoopLogger), TagBlocklist::new()))
    }

    #[tokio::test]
    async fn eof_on_receive_counts_as_success() {
        let edge = streaming_edge();
        let mut wrapper =
            StreamWrapper::server(FakeStream { inbound: Mutex::new(VecDeque::new()) }, edge.clone(), ResolvedLevels::defaults());
        let result = wrapper.receive().await;
        assert!(matches!(result, Ok(StreamMessage::Eof)));
    }

    #[tokio::test]
    async fn close_records_duration_and_decrements_active_gauge() {
        let edge = streaming_edge();
        let mut wrapper =
            StreamWrapper::client(FakeStream { inbound: Mutex::new(VecDeque::new()) }, edge, ResolvedLevels::defaults());
        wrapper.close().await.unwrap();
    }

    #[tokio::test]
    async fn double_close_is_a_harmless_no_op() {
        let edge = streaming_edge();
        let mut wrapper =
            StreamWrapper::client(FakeStream { inbound: Mutex::new(VecDeque::new()) }, edge, ResolvedLevels::defaults());
        wrapper.close().await.unwrap();
        wrapper.close().await.unwrap();
    }

    #[tokio::test]
    async fn server_close_mode_never_calls_the_inner_stream() {
        struct PanicsOnClose;
        #[async_trait]
        impl Stream for PanicsOnClose {
            async fn send(&mut self, _payload: &[u8]) -> Result<(), RelayError> {
                Ok(())
            }
            async fn receive(&mut self) -> Result<StreamMessage, RelayError> {
                Ok(StreamMessage::Eof)
            }
            async fn close(&mut self) -> Result<(), RelayError> {
                panic!("server-side close must not forward")
            }
        }
        let edge = streaming_edge();
        let mut wrapper = StreamWrapper::server(PanicsOnClose, edge, ResolvedLevels::defaults());
        wrapper.close().await.unwrap();
    }
}
