//! Concurrent mapping from edge fingerprint to [`Edge`], with lazy creation under
//! double-checked locking (spec component C4).

use crate::call::Call;
use crate::context::{CallSequencer, Cancellation, Deadline};
use crate::digest::{fingerprint, DigesterPool};
use crate::edge::{Edge, EdgeIdentity};
use crate::request::{Direction, RequestMetadata, RpcType};
use crate::services::CoreServices;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Owns every [`Edge`] ever created for the lifetime of the middleware instance built
/// on top of it. Edges are never removed; `begin` either finds an existing edge under a
/// read lock or creates one under the write lock with a double-checked recheck, per
/// spec.md §4.3's concurrency note.
pub struct Graph {
    edges: RwLock<HashMap<Vec<u8>, Arc<Edge>>>,
    digesters: DigesterPool,
    sequencer: CallSequencer,
    services: CoreServices,
}

impl Graph {
    pub fn new(services: CoreServices) -> Self {
        Self {
            edges: RwLock::new(HashMap::new()),
            digesters: DigesterPool::new(),
            sequencer: CallSequencer::new(),
            services,
        }
    }

    /// Finds or creates the edge for `request`'s identity, then returns a new [`Call`]
    /// carrying a clone of the shared `Arc<Edge>`, the start time, cancellation handle,
    /// and deadline — the C5 record described in spec.md §4.4.
    pub fn begin(
        &self,
        request: &RequestMetadata,
        direction: Direction,
        rpc_type: RpcType,
        cancellation: Cancellation,
        deadline: Deadline,
    ) -> Call {
        let key = fingerprint(
            &self.digesters,
            [
                &request.caller,
                &request.callee,
                &request.transport,
                &request.encoding,
                &request.procedure,
                &request.routing_key,
                &request.routing_delegate,
                direction.tag(),
                rpc_type.tag(),
            ],
        );

        let edge = self.find_or_create(key, request, direction, rpc_type);
        Call::new(edge, request.clone(), direction, rpc_type, cancellation, deadline, self.sequencer.next())
    }

    fn find_or_create(
        &self,
        key: Vec<u8>,
        request: &RequestMetadata,
        direction: Direction,
        rpc_type: RpcType,
    ) -> Arc<Edge> {
        if let Some(edge) = self.edges.read().get(&key) {
            return edge.clone();
        }

        let mut edges = self.edges.write();
        if let Some(edge) = edges.get(&key) {
            return edge.clone();
        }

        let identity = EdgeIdentity::new(
            &request.caller,
            &request.callee,
            &request.transport,
            &request.encoding,
            &request.procedure,
            &request.routing_key,
            &request.routing_delegate,
            direction,
            rpc_type,
        );
        let edge = Arc::new(Edge::new(
            identity,
            self.services.metrics.as_ref(),
            self.services.logger.clone(),
            self.services.tag_blocklist.clone(),
        ));
        edges.insert(key, edge.clone());
        edge
    }

    /// The number of distinct edges created so far, exposed for tests.
    pub fn edge_count(&self) -> usize {
        self.edges.read().len()
    }

    pub fn services(&self) -> &CoreServices {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Headers;

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

    #[test]
    fn repeated_begin_with_same_identity_reuses_one_edge() {
        let graph = Graph::new(CoreServices::default());
        let request = sample_request();
        let call_a = graph.begin(&request, Direction::Inbound, RpcType::Unary, Cancellation::new(), Deadline::none());
        let call_b = graph.begin(&request, Direction::Inbound, RpcType::Unary, Cancellation::new(), Deadline::none());
        assert_eq!(graph.edge_count(), 1);
        assert!(Arc::ptr_eq(call_a.edge(), call_b.edge()));
    }

    #[test]
    fn differing_direction_creates_a_distinct_edge() {
        let graph = Graph::new(CoreServices::default());
        let request = sample_request();
        graph.begin(&request, Direction::Inbound, RpcType::Unary, Cancellation::new(), Deadline::none());
        graph.begin(&request, Direction::Outbound, RpcType::Unary, Cancellation::new(), Deadline::none());
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn calls_carry_increasing_sequence_numbers() {
        let graph = Graph::new(CoreServices::default());
        let request = sample_request();
        let call_a = graph.begin(&request, Direction::Inbound, RpcType::Unary, Cancellation::new(), Deadline::none());
        let call_b = graph.begin(&request, Direction::Inbound, RpcType::Unary, Cancellation::new(), Deadline::none());
        assert!(call_b.sequence().as_u64() > call_a.sequence().as_u64());
    }
}
