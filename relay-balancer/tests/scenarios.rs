//! The two circus (ring chooser) end-to-end scenarios from spec.md §8.

use async_trait::async_trait;
use relay_balancer::{ChooserConfig, RingChooser};
use relay_core::context::{Cancellation, Deadline};
use relay_core::error::RelayError;
use relay_core::transport::{Peer, PeerStatus, PeerStatusSubscriber, Transport};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
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

    async fn retain_peer(&self, identifier: &str, _subscriber: Arc<dyn PeerStatusSubscriber>) -> Result<Self::PeerHandle, RelayError> {
        let status = self.initial_status.lock().await.get(identifier).copied().unwrap_or(PeerStatus::Unavailable);
        Ok(FakePeer { id: identifier.to_string(), status })
    }

    async fn release_peer(&self, _peer: &Self::PeerHandle) -> Result<(), RelayError> {
        Ok(())
    }
}

#[tokio::test]
async fn scenario_5_circus_choose_with_one_available_peer() {
    let transport = Arc::new(FakeTransport::default());
    transport.initial_status.lock().await.insert("A".into(), PeerStatus::Available);
    let chooser = RingChooser::new(transport, ChooserConfig::default());
    chooser.update(vec!["A".into()], vec![]).await.unwrap();
    assert_eq!(chooser.occupied_count(), 1);

    let chosen = chooser.choose(&Cancellation::new(), Deadline::with_timeout(Duration::from_secs(1))).await.unwrap();
    assert_eq!(chosen.peer().identifier(), "A");

    // While the call is outstanding the peer has been rotated out of the low ring:
    // a second choose must not also return it.
    let second = chooser.choose(&Cancellation::new(), Deadline::with_timeout(Duration::from_millis(50))).await;
    assert!(second.is_err(), "the only peer is on loan to the first caller");

    chosen.finish();

    // After onFinish moves it back to the low ring, it's choosable again.
    let third = chooser.choose(&Cancellation::new(), Deadline::with_timeout(Duration::from_secs(1))).await.unwrap();
    assert_eq!(third.peer().identifier(), "A");
    third.finish();
}

#[tokio::test]
async fn scenario_6_circus_choose_with_no_peers_then_membership_add() {
    let transport = Arc::new(FakeTransport::default());
    let chooser = Arc::new(RingChooser::new(transport.clone(), ChooserConfig::default()));
    assert_eq!(chooser.occupied_count(), 0);

    let waiter = {
        let chooser = chooser.clone();
        tokio::spawn(async move { chooser.choose(&Cancellation::new(), Deadline::with_timeout(Duration::from_secs(1))).await })
    };

    tokio::time::sleep(Duration::from_millis(500)).await;
    transport.initial_status.lock().await.insert("B".into(), PeerStatus::Available);
    chooser.update(vec!["B".into()], vec![]).await.unwrap();

    let chosen = waiter.await.unwrap().expect("peerAvailable signaling must wake the waiting task");
    assert_eq!(chosen.peer().identifier(), "B");
    chosen.finish();
}
