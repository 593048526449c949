//! The direct chooser (spec component C10): a degenerate chooser that treats the
//! request's shard key as a peer identifier, illustrating the chooser contract without
//! any of the circus's ring bookkeeping.

use relay_core::error::RelayError;
use relay_core::observability::Logger;
use relay_core::transport::{Peer, PeerStatus, PeerStatusSubscriber, Transport};
use std::sync::Arc;

/// Retains and releases a peer for a single call; holds no state of its own.
pub struct DirectChooser<T: Transport> {
    transport: Arc<T>,
    logger: Arc<dyn Logger>,
}

/// An ephemeral subscriber for a direct-chooser peer. The direct chooser does not
/// track ring membership, so status changes are simply ignored.
struct EphemeralSubscriber;

impl PeerStatusSubscriber for EphemeralSubscriber {
    fn on_status_changed(&self, _status: PeerStatus) {}
}

/// The peer handed back by [`DirectChooser::choose`], paired with the release closure.
pub struct DirectPeer<T: Transport> {
    peer: Arc<T::PeerHandle>,
    transport: Arc<T>,
    logger: Arc<dyn Logger>,
}

impl<T: Transport> std::fmt::Debug for DirectPeer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectPeer").finish_non_exhaustive()
    }
}

impl<T: Transport> DirectPeer<T> {
    pub fn peer(&self) -> &Arc<T::PeerHandle> {
        &self.peer
    }

    /// Releases the retained peer. Any release failure is logged, not propagated, per
    /// spec.md §4.9.
    pub async fn finish(self) {
        if let Err(err) = self.transport.release_peer(&self.peer).await {
            self.logger.warn(&format!("direct chooser failed to release peer: {err}"));
        }
    }
}

impl<T: Transport + 'static> DirectChooser<T> {
    pub fn new(transport: Arc<T>, logger: Arc<dyn Logger>) -> Self {
        Self { transport, logger }
    }

    /// Treats `shard_key` as a peer identifier. Returns `INVALID_ARGUMENT` if it's
    /// empty, per spec.md §4.9.
    pub async fn choose(&self, shard_key: &str) -> Result<DirectPeer<T>, RelayError> {
        if shard_key.is_empty() {
            return Err(RelayError::invalid_argument("direct chooser requires a non-empty shard key"));
        }

        let subscriber: Arc<dyn PeerStatusSubscriber> = Arc::new(EphemeralSubscriber);
        let peer = self.transport.retain_peer(shard_key, subscriber).await?;
        Ok(DirectPeer { peer: Arc::new(peer), transport: self.transport.clone(), logger: self.logger.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use relay_core::observability::NoopLogger;

    struct FakePeer {
        id: String,
    }

    impl Peer for FakePeer {
        fn identifier(&self) -> &str {
            &self.id
        }

        fn status(&self) -> PeerStatus {
            PeerStatus::Available
        }
    }

    struct FakeTransport;

    #[async_trait]
    impl Transport for FakeTransport {
        type PeerHandle = FakePeer;

        async fn retain_peer(
            &self,
            identifier: &str,
            _subscriber: Arc<dyn PeerStatusSubscriber>,
        ) -> Result<Self::PeerHandle, RelayError> {
            Ok(FakePeer { id: identifier.to_string() })
        }

        async fn release_peer(&self, _peer: &Self::PeerHandle) -> Result<(), RelayError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn empty_shard_key_is_invalid_argument() {
        let chooser = DirectChooser::new(Arc::new(FakeTransport), Arc::new(NoopLogger));
        let err = chooser.choose("").await.unwrap_err();
        assert_eq!(err.tag(), "invalid-argument");
    }

    #[tokio::test]
    async fn shard_key_becomes_the_peer_identifier() {
        let chooser = DirectChooser::new(Arc::new(FakeTransport), Arc::new(NoopLogger));
        let chosen = chooser.choose("shard-7").await.unwrap();
        assert_eq!(chosen.peer().identifier(), "shard-7");
        chosen.finish().await;
    }
}
