//! The external-collaborator contracts a transport must implement for the core to
//! drive it: response writers, streams, peers, and the transport itself (spec §6).

use crate::error::{ApplicationErrorMeta, RelayError};
use async_trait::async_trait;

/// What a handler or outbound caller writes a response through. Implemented by the
/// transport; wrapped by [`crate::response_writer::ResponseWriterWrapper`] for
/// per-call bookkeeping.
pub trait ResponseWriter: Send {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()>;
    fn set_application_error(&mut self);
    /// No-op by default; transports whose wire format can carry structured
    /// application-error metadata override this.
    fn set_application_error_meta(&mut self, _meta: &ApplicationErrorMeta) {}
    fn add_header(&mut self, name: &str, value: &str);
}

/// One message exchanged over a stream: either application payload bytes or the
/// end-of-stream signal. Receivers must distinguish `Eof` from an error — spec.md §4.6
/// requires `Eof` on receive to be counted as success.
pub enum StreamMessage {
    Payload(Vec<u8>),
    Eof,
}

/// A bidirectional stream of messages, wrapped by
/// [`crate::stream::StreamWrapper`] for per-operation instrumentation.
#[async_trait]
pub trait Stream: Send {
    async fn send(&mut self, payload: &[u8]) -> Result<(), RelayError>;
    async fn receive(&mut self) -> Result<StreamMessage, RelayError>;
    async fn close(&mut self) -> Result<(), RelayError>;
}

/// The connection status the transport reports for a peer, driving the circus's
/// ring membership (spec §4.8).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerStatus {
    Available,
    Unavailable,
}

/// A dialable endpoint retained from the transport.
pub trait Peer: Send + Sync {
    fn identifier(&self) -> &str;
    fn status(&self) -> PeerStatus;
}

/// A subscriber the arena hands to the transport when retaining a peer, so the
/// transport can push status-change notifications back without a map lookup (spec.md
/// §4.8 "pre-bound subscribers").
pub trait PeerStatusSubscriber: Send + Sync {
    fn on_status_changed(&self, status: PeerStatus);
}

/// The transport's membership surface: retaining a peer for tracking and releasing one
/// that's been dropped from membership.
#[async_trait]
pub trait Transport: Send + Sync {
    type PeerHandle: Peer;

    async fn retain_peer(
        &self,
        identifier: &str,
        subscriber: std::sync::Arc<dyn PeerStatusSubscriber>,
    ) -> Result<Self::PeerHandle, RelayError>;

    async fn release_peer(&self, peer: &Self::PeerHandle) -> Result<(), RelayError>;
}
