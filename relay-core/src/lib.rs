//! Core contracts for a call-scoped observability middleware and peer chooser.
//!
//! This crate owns the domain types every call path touches — edges, the edge graph,
//! calls, the pooled response-writer and stream wrappers, the error taxonomy, and the
//! trait seams (`Logger`, `MetricsProvider`) and external-collaborator contracts
//! (`Request`, `ResponseWriter`, `Stream`, `Peer`, `Transport`) the rest of the
//! workspace is built against. It has no opinion on wire protocols, configuration
//! loading, or which metrics/logging backend is wired in.

pub mod call;
pub mod context;
pub mod digest;
pub mod edge;
pub mod error;
pub mod graph;
pub mod metadata;
pub mod observability;
pub mod request;
pub mod response_writer;
pub mod services;
pub mod stream;
pub mod transport;

pub use call::{Call, EndReport, OutcomeClass, ResolvedLevels};
pub use context::{Cancellation, Deadline, MonotonicTimePoint};
pub use digest::{Digester, DigesterPool};
pub use edge::{Edge, EdgeIdentity};
pub use error::{ApplicationErrorMeta, Code, ErrorCode, FaultKind, RelayError, Result};
pub use graph::Graph;
pub use metadata::{InboundMetadata, InboundMetadataCell};
pub use request::{Direction, Headers, RequestMetadata, RpcType};
pub use response_writer::{ResponseWriterPool, ResponseWriterWrapper};
pub use services::{CoreServices, TagBlocklist};
pub use stream::StreamWrapper;
