//! The "circus": a fixed-arena peer chooser approximating fewest-pending-request
//! selection by swapping two rings, coordinating with a transport that reports peer
//! connection status asynchronously (spec component C9).

use crate::arena::{Arena, CAPACITY};
use crate::subscriber::{Shared, SlotSubscriber};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use relay_core::context::{Cancellation, Deadline};
use relay_core::error::RelayError;
use relay_core::transport::{Peer, PeerStatus, PeerStatusSubscriber, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

/// Configuration for one [`RingChooser`] instance.
#[derive(Clone, Debug)]
pub struct ChooserConfig {
    /// If set, `choose` returns `UNAVAILABLE` immediately instead of waiting for a
    /// peer to become available.
    pub fail_fast: bool,
    /// Seeds a deterministic shuffle of additions within one `update` call, for
    /// reproducible tests (spec.md §4.8's "optionally shuffled, seeded for
    /// determinism under test").
    pub shuffle_seed: Option<u64>,
}

impl Default for ChooserConfig {
    fn default() -> Self {
        Self { fail_fast: false, shuffle_seed: None }
    }
}

/// A peer returned by [`RingChooser::choose`], paired with the bookkeeping needed to
/// return its slot to the low ring once the call concludes.
pub struct ChosenPeer<P: Peer> {
    peer: Arc<P>,
    slot: u8,
    identifier: String,
    shared: Arc<Shared<P>>,
}

impl<P: Peer> std::fmt::Debug for ChosenPeer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChosenPeer").field("slot", &self.slot).field("identifier", &self.identifier).finish_non_exhaustive()
    }
}

impl<P: Peer> ChosenPeer<P> {
    pub fn peer(&self) -> &Arc<P> {
        &self.peer
    }

    /// The closure the caller invokes after the RPC concludes, regardless of outcome
    /// (spec glossary: "Onfinish").
    pub fn finish(self) {
        self.shared.arena.lock().on_finish(self.slot, &self.identifier);
    }
}

/// Errors accumulated while releasing peers during one `update` call (spec.md §4.8:
/// "collected via multi-error accumulation").
#[derive(Debug)]
pub struct UpdateErrors(pub Vec<RelayError>);

impl std::fmt::Display for UpdateErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error(s) during membership update", self.0.len())
    }
}

impl std::error::Error for UpdateErrors {}

/// The fixed-arena peer chooser. Cheap to clone (an `Arc` around shared state); create
/// one per logical peer group (e.g. one per callee service).
pub struct RingChooser<T: Transport>
where
    T::PeerHandle: 'static,
{
    shared: Arc<Shared<T::PeerHandle>>,
    subscribers: Vec<Arc<SlotSubscriber<T::PeerHandle>>>,
    transport: Arc<T>,
    config: ChooserConfig,
    /// Serializes `update` calls so the peek-then-admit sequence around the async
    /// `retain_peer` call can assume no other update is racing it for the free ring.
    update_lock: AsyncMutex<()>,
}

impl<T: Transport + 'static> RingChooser<T>
where
    T::PeerHandle: 'static,
{
    pub fn new(transport: Arc<T>, config: ChooserConfig) -> Self {
        let shared = Arc::new(Shared {
            arena: parking_lot::Mutex::new(Arena::new()),
            peer_available: tokio::sync::Notify::new(),
        });
        let subscribers = (0..CAPACITY as u8)
            .map(|slot| Arc::new(SlotSubscriber::new(slot, Arc::downgrade(&shared))))
            .collect();
        Self { shared, subscribers, transport, config, update_lock: AsyncMutex::new(()) }
    }

    /// Returns a peer to dial, approximating fewest-pending selection. Blocks the
    /// caller when no peer is currently available unless [`ChooserConfig::fail_fast`]
    /// is set, per spec.md §4.8.
    pub async fn choose(&self, cancellation: &Cancellation, deadline: Deadline) -> Result<ChosenPeer<T::PeerHandle>, RelayError> {
        loop {
            if let Some((slot, peer)) = self.shared.arena.lock().choose() {
                let identifier = peer.identifier().to_string();
                return Ok(ChosenPeer { peer, slot, identifier, shared: self.shared.clone() });
            }

            if self.config.fail_fast {
                return Err(RelayError::unavailable("no peer currently available"));
            }
            if deadline.instant().is_none() {
                // Blocking indefinitely would never surface a misconfiguration; callers
                // that want to wait must bound the wait with a deadline.
                return Err(RelayError::invalid_argument("choose requires a deadline when no peer is immediately available"));
            }
            if cancellation.is_cancelled() {
                return Err(RelayError::cancelled("choose was cancelled while waiting for a peer"));
            }
            if deadline.is_expired() {
                return Err(RelayError::unavailable("deadline exceeded while waiting for a peer"));
            }

            let wait = deadline.remaining().unwrap_or_default().max(Duration::from_millis(1));
            let notified = self.shared.peer_available.notified();
            tokio::pin!(notified);
            // A single wakeup may release multiple racing callers; one that still finds
            // the low ring empty just loops back around, per spec.md §4.8.
            let _ = tokio::time::timeout(wait, &mut notified).await;
        }
    }

    /// Applies additions and removals to arena membership. Removal errors from
    /// `transport.release_peer` are accumulated and returned; the slot is freed either
    /// way (release is best-effort). Addition errors from `transport.retain_peer` are
    /// returned immediately for that addition, leaving its slot free.
    pub async fn update(&self, mut added: Vec<String>, removed: Vec<String>) -> Result<(), UpdateErrors> {
        let _guard = self.update_lock.lock().await;
        let mut errors = Vec::new();

        for identifier in &removed {
            let peer = self.shared.arena.lock().remove(identifier);
            if let Some(peer) = peer {
                if let Err(err) = self.transport.release_peer(&peer).await {
                    errors.push(err);
                }
            }
        }

        if let Some(seed) = self.config.shuffle_seed {
            let mut rng = StdRng::seed_from_u64(seed);
            added.shuffle(&mut rng);
        }

        for identifier in added {
            let Some(slot) = self.shared.arena.lock().peek_free_slot() else {
                self.shared.arena.lock().mark_known_but_not_admitted(&identifier);
                continue;
            };

            let subscriber = self.subscribers[slot as usize].clone();
            subscriber.bind(Some(identifier.clone()));

            let dyn_subscriber: Arc<dyn PeerStatusSubscriber> = subscriber.clone();
            match self.transport.retain_peer(&identifier, dyn_subscriber).await {
                Ok(peer_handle) => {
                    let peer = Arc::new(peer_handle);
                    let initial_status = peer.status();
                    let mut arena = self.shared.arena.lock();
                    match arena.admit(&identifier, peer) {
                        Some(admitted_slot) => {
                            debug_assert_eq!(admitted_slot, slot, "no concurrent update may race the free ring");
                            let became_available = arena.apply_status(admitted_slot, &identifier, initial_status);
                            drop(arena);
                            if became_available {
                                self.shared.peer_available.notify_waiters();
                            }
                        }
                        None => {
                            subscriber.bind(None);
                            arena.mark_known_but_not_admitted(&identifier);
                        }
                    }
                }
                Err(err) => {
                    subscriber.bind(None);
                    errors.push(err);
                }
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(UpdateErrors(errors)) }
    }

    pub fn occupied_count(&self) -> usize {
        self.shared.arena.lock().occupied_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use tokio::sync::Mutex as TokioMutex;

    struct FakePeer {
        id: String,
        status: PeerStatus,
    }

    impl Peer for FakePeer {
        fn identifier(&self) -> &str {
            &self.id
        }

        fn status(&self) -> PeerStatus {
            self.status
        }
    }

    #[derive(Default)]
    struct FakeTransport {
        initial_status: TokioMutex<HashMap<String, PeerStatus>>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        type PeerHandle = FakePeer;

        async fn retain_peer(
            &self,
            identifier: &str,
            _subscriber: Arc<dyn PeerStatusSubscriber>,
        ) -> Result<Self::PeerHandle, RelayError> {
            let status = self.initial_status.lock().await.get(identifier).copied().unwrap_or(PeerStatus::Unavailable);
            Ok(FakePeer { id: identifier.to_string(), status })
        }

        async fn release_peer(&self, _peer: &Self::PeerHandle) -> Result<(), RelayError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn choose_with_one_available_peer_round_trips_through_the_rings() {
        let transport = Arc::new(FakeTransport::default());
        transport.initial_status.lock().await.insert("A".into(), PeerStatus::Available);
        let chooser = RingChooser::new(transport, ChooserConfig::default());
        chooser.update(vec!["A".into()], vec![]).await.unwrap();

        let chosen = chooser.choose(&Cancellation::new(), Deadline::with_timeout(Duration::from_secs(1))).await.unwrap();
        assert_eq!(chosen.peer().identifier(), "A");
        chosen.finish();
    }

    #[tokio::test]
    async fn choose_waits_for_membership_update_across_tasks() {
        let transport = Arc::new(FakeTransport::default());
        let chooser = Arc::new(RingChooser::new(transport.clone(), ChooserConfig::default()));

        let waiter = {
            let chooser = chooser.clone();
            tokio::spawn(async move {
                chooser.choose(&Cancellation::new(), Deadline::with_timeout(Duration::from_secs(1))).await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        transport.initial_status.lock().await.insert("B".into(), PeerStatus::Available);
        chooser.update(vec!["B".into()], vec![]).await.unwrap();

        let chosen = waiter.await.unwrap().unwrap();
        assert_eq!(chosen.peer().identifier(), "B");
    }

    #[tokio::test]
    async fn fail_fast_returns_unavailable_immediately() {
        let transport = Arc::new(FakeTransport::default());
        let chooser = RingChooser::new(transport, ChooserConfig { fail_fast: true, shuffle_seed: None });
        let result = chooser.choose(&Cancellation::new(), Deadline::none()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn no_peer_and_no_deadline_is_invalid_argument() {
        let transport = Arc::new(FakeTransport::default());
        let chooser = RingChooser::new(transport, ChooserConfig::default());
        let err = chooser.choose(&Cancellation::new(), Deadline::none()).await.unwrap_err();
        assert_eq!(err.tag(), "invalid-argument");
    }

    #[tokio::test]
    async fn removal_releases_the_slot_back_to_free() {
        let transport = Arc::new(FakeTransport::default());
        transport.initial_status.lock().await.insert("A".into(), PeerStatus::Available);
        let chooser = RingChooser::new(transport, ChooserConfig::default());
        chooser.update(vec!["A".into()], vec![]).await.unwrap();
        assert_eq!(chooser.occupied_count(), 1);
        chooser.update(vec![], vec!["A".into()]).await.unwrap();
        assert_eq!(chooser.occupied_count(), 0);
    }
}
