//! Inbound-call metadata attached to a context as an opaque value (spec component C11).

use crate::request::Headers;

/// Per-call metadata read by handlers that need more than the RPC framework surfaces
/// directly: caller identity, routing hints, and a place to stage response headers.
///
/// Bound to one call; there is no process-wide state. Call sites attach one via
/// [`crate::context::Deadline`]'s sibling carrier type in the owning crate (the
/// middleware constructs and attaches this when a call begins) and retrieve it with
/// [`InboundMetadata::from_call`] giving back the metadata plus a presence boolean,
/// matching spec.md §4.10's "retrieval returns the metadata and a presence boolean".
#[derive(Clone, Debug)]
pub struct InboundMetadata {
    caller: String,
    service: String,
    transport: String,
    procedure: String,
    encoding: String,
    headers: Headers,
    shard_key: String,
    routing_key: String,
    routing_delegate: String,
    caller_procedure: String,
    response_headers: Headers,
}

impl InboundMetadata {
    pub fn new(
        caller: impl Into<String>,
        service: impl Into<String>,
        transport: impl Into<String>,
        procedure: impl Into<String>,
        encoding: impl Into<String>,
        headers: Headers,
        shard_key: impl Into<String>,
        routing_key: impl Into<String>,
        routing_delegate: impl Into<String>,
    ) -> Self {
        Self {
            caller: caller.into(),
            service: service.into(),
            transport: transport.into(),
            procedure: procedure.into(),
            encoding: encoding.into(),
            headers,
            shard_key: shard_key.into(),
            routing_key: routing_key.into(),
            routing_delegate: routing_delegate.into(),
            caller_procedure: String::new(),
            response_headers: Headers::new(),
        }
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn transport(&self) -> &str {
        &self.transport
    }

    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn shard_key(&self) -> &str {
        &self.shard_key
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn routing_delegate(&self) -> &str {
        &self.routing_delegate
    }

    /// The fully-qualified "service::procedure" the caller invoked, recorded
    /// separately from `procedure` so a handler can distinguish its own name from the
    /// name the caller dialed through an alias.
    pub fn caller_procedure(&self) -> &str {
        &self.caller_procedure
    }

    pub fn set_caller_procedure(&mut self, value: impl Into<String>) {
        self.caller_procedure = value.into();
    }

    /// Stages a header to be written on the response.
    pub fn write_response_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.response_headers.push(name, value);
    }

    pub fn response_headers(&self) -> &Headers {
        &self.response_headers
    }
}

/// A per-call cell holding an optional [`InboundMetadata`], attached to a call context.
/// Mirrors the "opaque context key" described in spec.md §4.10 without requiring a real
/// context-propagation type from `relay-core`'s callers.
#[derive(Clone, Debug, Default)]
pub struct InboundMetadataCell(Option<InboundMetadata>);

impl InboundMetadataCell {
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn attach(metadata: InboundMetadata) -> Self {
        Self(Some(metadata))
    }

    /// Returns the metadata and whether it was present, matching spec.md §4.10's
    /// two-value retrieval contract.
    pub fn get(&self) -> (Option<&InboundMetadata>, bool) {
        (self.0.as_ref(), self.0.is_some())
    }

    pub fn get_mut(&mut self) -> Option<&mut InboundMetadata> {
        self.0.as_mut()
    }
}
