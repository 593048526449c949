//! The six call-shaped entry points (unary/oneway/streaming × inbound/outbound) that
//! every transport adapter drives, per spec.md §4.7's entry-point table.

use crate::config::MiddlewareConfig;
use futures::FutureExt;
use relay_core::observability::{KeyValue, Logger};
use relay_core::{
    ApplicationErrorMeta, Cancellation, Deadline, Direction, Graph, RelayError, RequestMetadata, ResolvedLevels,
    ResponseWriterPool, ResponseWriterWrapper, RpcType, StreamWrapper,
};
use relay_core::transport::{ResponseWriter, Stream};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

/// Bundles the two pieces of ambient per-call state a transport threads through every
/// entry point, mirroring spec.md §4.7's `ctx` parameter.
#[derive(Clone, Debug)]
pub struct CallContext {
    pub cancellation: Cancellation,
    pub deadline: Deadline,
}

impl CallContext {
    pub fn new(cancellation: Cancellation, deadline: Deadline) -> Self {
        Self { cancellation, deadline }
    }

    pub fn no_deadline() -> Self {
        Self { cancellation: Cancellation::new(), deadline: Deadline::none() }
    }
}

/// Implemented by outbound unary response types that can carry an application-level
/// failure marker independent of the transport error channel (spec.md §4.5's
/// "application errors are a separate axis" rule, applied to the calling side).
pub trait ApplicationOutcome {
    fn application_error(&self) -> Option<ApplicationErrorMeta>;
}

/// The future type [`RelayMiddleware::handle_unary`]'s handler must return: boxed so the
/// `for<'w> FnOnce(&'w mut ResponseWriterWrapper<W>) -> UnaryHandlerFut<'w>` bound it needs
/// (the returned future borrows the writer it was handed, for a lifetime chosen per call)
/// has a single, lifetime-independent shape for the compiler to unify against.
pub type UnaryHandlerFut<'w> = Pin<Box<dyn Future<Output = Option<RelayError>> + 'w>>;

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Wires `relay-core`'s edge graph, pooled response-writer, and stream wrapper into the
/// six entry points a transport adapter calls on inbound dispatch and outbound send.
pub struct RelayMiddleware {
    graph: Arc<Graph>,
    inbound_levels: ResolvedLevels,
    outbound_levels: ResolvedLevels,
    response_writer_pool: ResponseWriterPool,
}

impl RelayMiddleware {
    pub fn new(config: MiddlewareConfig) -> Self {
        let inbound_levels = config.levels.resolve_inbound();
        let outbound_levels = config.levels.resolve_outbound();
        Self {
            graph: Arc::new(Graph::new(config.core_services())),
            inbound_levels,
            outbound_levels,
            response_writer_pool: ResponseWriterPool::new(),
        }
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn logger(&self) -> Arc<dyn Logger> {
        self.graph.services().logger.clone()
    }

    fn begin_call(&self, request: RequestMetadata, direction: Direction, rpc_type: RpcType, ctx: &CallContext, levels: ResolvedLevels) -> relay_core::Call {
        self.graph
            .begin(&request, direction, rpc_type, ctx.cancellation.clone(), ctx.deadline)
            .with_levels(levels)
    }

    /// Inbound unary dispatch (spec.md §4.7 row 1): pools a response-writer wrapper,
    /// invokes `handler` with a mutable reference to it, and finalizes the call against
    /// whatever the handler returned plus the wrapper's application-error bit. A panic
    /// inside `handler` is recorded against the edge, then re-raised.
    pub async fn handle_unary<W>(
        &self,
        request: RequestMetadata,
        ctx: CallContext,
        writer: W,
        handler: impl for<'w> FnOnce(&'w mut ResponseWriterWrapper<W>) -> UnaryHandlerFut<'w>,
    ) -> (ResponseWriterWrapper<W>, Option<RelayError>)
    where
        W: ResponseWriter,
    {
        let call = self.begin_call(request, Direction::Inbound, RpcType::Unary, &ctx, self.inbound_levels);
        let mut wrapper = self.response_writer_pool.wrap(writer);

        let outcome = AssertUnwindSafe(handler(&mut wrapper)).catch_unwind().await;
        let handler_error = match outcome {
            Ok(error) => error,
            Err(panic) => {
                call.record_panic(&panic_message(panic.as_ref()));
                std::panic::resume_unwind(panic);
            }
        };

        let application =
            if wrapper.is_application_error() { Some(wrapper.application_error_meta().cloned().unwrap_or_default()) } else { None };

        let report = call.end(handler_error, application);
        (wrapper, report.final_error)
    }

    /// Outbound unary call (spec.md §4.7 row 2): invokes `outbound`, inspects the
    /// returned response's application-error marker via [`ApplicationOutcome`], and
    /// finalizes the call.
    pub async fn call_unary<R, Fut>(
        &self,
        request: RequestMetadata,
        ctx: CallContext,
        outbound: impl FnOnce() -> Fut,
    ) -> (Option<R>, Option<RelayError>)
    where
        R: ApplicationOutcome,
        Fut: Future<Output = Result<R, RelayError>>,
    {
        let call = self.begin_call(request, Direction::Outbound, RpcType::Unary, &ctx, self.outbound_levels);
        let outcome = AssertUnwindSafe(outbound()).catch_unwind().await;
        let result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                call.record_panic(&panic_message(panic.as_ref()));
                std::panic::resume_unwind(panic);
            }
        };

        match result {
            Ok(response) => {
                let application = response.application_error();
                let report = call.end(None, application);
                (Some(response), report.final_error)
            }
            Err(err) => {
                let report = call.end(Some(err), None);
                (None, report.final_error)
            }
        }
    }

    /// Inbound one-way dispatch (spec.md §4.7 row 3): no response writer and no
    /// application-error axis — the handler's returned error is the whole story.
    pub async fn handle_oneway<Fut>(&self, request: RequestMetadata, ctx: CallContext, handler: impl FnOnce() -> Fut) -> Option<RelayError>
    where
        Fut: Future<Output = Option<RelayError>>,
    {
        let call = self.begin_call(request, Direction::Inbound, RpcType::Oneway, &ctx, self.inbound_levels);
        let outcome = AssertUnwindSafe(handler()).catch_unwind().await;
        let handler_error = match outcome {
            Ok(error) => error,
            Err(panic) => {
                call.record_panic(&panic_message(panic.as_ref()));
                std::panic::resume_unwind(panic);
            }
        };
        call.end(handler_error, None).final_error
    }

    /// Outbound one-way call (spec.md §4.7 row 4): symmetric to [`Self::handle_oneway`].
    pub async fn call_oneway<A, Fut>(
        &self,
        request: RequestMetadata,
        ctx: CallContext,
        outbound: impl FnOnce() -> Fut,
    ) -> (Option<A>, Option<RelayError>)
    where
        Fut: Future<Output = Result<A, RelayError>>,
    {
        let call = self.begin_call(request, Direction::Outbound, RpcType::Oneway, &ctx, self.outbound_levels);
        let outcome = AssertUnwindSafe(outbound()).catch_unwind().await;
        let result = match outcome {
            Ok(result) => result,
            Err(panic) => {
                call.record_panic(&panic_message(panic.as_ref()));
                std::panic::resume_unwind(panic);
            }
        };

        match result {
            Ok(ack) => {
                let report = call.end(None, None);
                (Some(ack), report.final_error)
            }
            Err(err) => {
                let report = call.end(Some(err), None);
                (None, report.final_error)
            }
        }
    }

    /// Inbound streaming dispatch (spec.md §4.7 row 5): wraps `inner` with
    /// [`StreamWrapper::server`] and hands it to `handler`, which owns the stream for
    /// its lifetime and terminates it by returning rather than by calling `close`.
    pub async fn handle_stream<S, Fut>(
        &self,
        request: RequestMetadata,
        ctx: CallContext,
        inner: S,
        handler: impl FnOnce(StreamWrapper<S>) -> Fut,
    ) -> Option<RelayError>
    where
        S: Stream,
        Fut: Future<Output = Option<RelayError>>,
    {
        let call = self.begin_call(request, Direction::Inbound, RpcType::Streaming, &ctx, self.inbound_levels);
        let wrapper = StreamWrapper::server(inner, call.edge().clone(), self.inbound_levels);
        call.edge().log(
            self.inbound_levels.success,
            "Opened inbound stream.",
            &[KeyValue::new("rpc_type", RpcType::Streaming.tag()), KeyValue::new("direction", Direction::Inbound.tag())],
        );

        let outcome = AssertUnwindSafe(handler(wrapper)).catch_unwind().await;
        let handler_error = match outcome {
            Ok(error) => error,
            Err(panic) => {
                call.record_panic(&panic_message(panic.as_ref()));
                std::panic::resume_unwind(panic);
            }
        };
        call.end(handler_error, None).final_error
    }

    /// Outbound streaming call (spec.md §4.7 row 6): invokes `outbound` to establish the
    /// stream, records the handshake outcome against the edge immediately, and returns a
    /// client-mode [`StreamWrapper`] the caller drives for the life of the stream.
    pub async fn call_stream<S, Fut>(
        &self,
        request: RequestMetadata,
        ctx: CallContext,
        outbound: impl FnOnce() -> Fut,
    ) -> (Option<StreamWrapper<S>>, Option<RelayError>)
    where
        S: Stream,
        Fut: Future<Output = Result<S, RelayError>>,
    {
        let call = self.begin_call(request, Direction::Outbound, RpcType::Streaming, &ctx, self.outbound_levels);
        let outcome = AssertUnwindSafe(outbound()).catch_unwind().await;

        match outcome {
            Ok(Ok(stream)) => {
                let report = call.end(None, None);
                (Some(StreamWrapper::client(stream, call.edge().clone(), self.outbound_levels)), report.final_error)
            }
            Ok(Err(err)) => {
                let report = call.end(Some(err), None);
                (None, report.final_error)
            }
            Err(panic) => {
                call.record_panic(&panic_message(panic.as_ref()));
                std::panic::resume_unwind(panic);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::error::ErrorCode;
    use relay_core::observability::{NoopLogger, NoopMetrics};
    use relay_core::transport::StreamMessage;
    use relay_core::Headers;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    fn sample_request() -> RequestMetadata {
        RequestMetadata {
            caller: "caller".into(),
            callee: "callee".into(),
            transport: "tcp".into(),
            procedure: "proc".into(),
            encoding: "raw".into(),
            routing_key: "rk".into(),
            routing_delegate: "rd".into(),
            shard_key: "sk".into(),
            headers: Headers::new(),
        }
    }

    fn middleware() -> RelayMiddleware {
        RelayMiddleware::new(MiddlewareConfig::new(Arc::new(NoopLogger), Arc::new(NoopMetrics)))
    }

    #[derive(Default)]
    struct RecordingWriter {
        written: Vec<u8>,
    }

    impl ResponseWriter for RecordingWriter {
        fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
            self.written.extend_from_slice(bytes);
            Ok(())
        }
        fn set_application_error(&mut self) {}
        fn add_header(&mut self, _name: &str, _value: &str) {}
    }

    #[tokio::test]
    async fn handle_unary_success_has_no_final_error() {
        let mw = middleware();
        let (wrapper, err) = mw
            .handle_unary(sample_request(), CallContext::no_deadline(), RecordingWriter::default(), |writer| {
                Box::pin(async move {
                    writer.write(b"ok").unwrap();
                    None
                })
            })
            .await;
        assert!(err.is_none());
        assert_eq!(wrapper.response_size(), 2);
    }

    #[tokio::test]
    async fn handle_unary_typed_error_is_returned_as_final_error() {
        let mw = middleware();
        let (_wrapper, err) = mw
            .handle_unary(sample_request(), CallContext::no_deadline(), RecordingWriter::default(), |_writer| {
                Box::pin(async move { Some(RelayError::invalid_argument("bad request")) })
            })
            .await;
        assert_eq!(err.unwrap().tag(), ErrorCode::InvalidArgument.tag());
    }

    #[tokio::test]
    async fn handle_unary_application_error_meta_is_merged_into_final_error() {
        let mw = middleware();
        let (_wrapper, err) = mw
            .handle_unary(sample_request(), CallContext::no_deadline(), RecordingWriter::default(), |writer| {
                Box::pin(async move {
                    writer.set_application_error();
                    writer.set_application_error_meta(Some("FunkyError".into()), Some("details".into()), None);
                    None
                })
            })
            .await;
        let err = err.unwrap();
        assert_eq!(err.application().unwrap().name.as_deref(), Some("FunkyError"));
    }

    #[tokio::test]
    async fn handle_unary_panic_is_recorded_then_reraised() {
        let mw = middleware();
        let result = std::panic::AssertUnwindSafe(mw.handle_unary(
            sample_request(),
            CallContext::no_deadline(),
            RecordingWriter::default(),
            |_writer| {
                Box::pin(async move {
                    panic!("boom");
                    #[allow(unreachable_code)]
                    None
                })
            },
        ))
        .catch_unwind()
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn handle_oneway_success_has_no_final_error() {
        let mw = middleware();
        let err = mw.handle_oneway(sample_request(), CallContext::no_deadline(), || async move { None }).await;
        assert!(err.is_none());
    }

    struct FakeStream {
        inbound: StdMutex<VecDeque<Result<StreamMessage, RelayError>>>,
    }

    #[async_trait::async_trait]
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

    #[tokio::test]
    async fn handle_stream_drains_messages_until_eof() {
        let mw = middleware();
        let stream = FakeStream {
            inbound: StdMutex::new(VecDeque::from([Ok(StreamMessage::Payload(b"hi".to_vec()))])),
        };
        let err = mw
            .handle_stream(sample_request(), CallContext::no_deadline(), stream, |mut wrapper| async move {
                loop {
                    match wrapper.receive().await {
                        Ok(StreamMessage::Payload(_)) => continue,
                        Ok(StreamMessage::Eof) => return None,
                        Err(err) => return Some(err),
                    }
                }
            })
            .await;
        assert!(err.is_none());
    }
}
