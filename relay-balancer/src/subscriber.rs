//! Pre-bound per-slot subscribers (spec.md §4.8/§9): each of the 256 slots owns a
//! subscriber object whose slot index is fixed at construction, eliminating
//! per-choose allocation on the status-change hot path.

use crate::arena::Arena;
use parking_lot::Mutex;
use relay_core::transport::{Peer, PeerStatus, PeerStatusSubscriber};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;

/// State shared between a [`crate::chooser::RingChooser`] and every one of its 256
/// subscribers.
pub(crate) struct Shared<P: Peer> {
    pub(crate) arena: Mutex<Arena<P>>,
    pub(crate) peer_available: Notify,
}

/// A permanent, slot-bound subscriber. The transport calls [`PeerStatusSubscriber::on_status_changed`]
/// whenever the peer occupying this subscriber's slot changes connection status.
pub struct SlotSubscriber<P: Peer> {
    slot: u8,
    /// The peer identifier currently bound to this slot, so a status callback can be
    /// matched against the arena's current occupant (spec.md §4.8: "if the slot still
    /// holds the same peer identifier").
    identifier: Mutex<Option<String>>,
    shared: Weak<Shared<P>>,
}

impl<P: Peer + 'static> SlotSubscriber<P> {
    pub(crate) fn new(slot: u8, shared: Weak<Shared<P>>) -> Self {
        Self { slot, identifier: Mutex::new(None), shared }
    }

    pub(crate) fn bind(&self, identifier: Option<String>) {
        *self.identifier.lock() = identifier;
    }

    pub fn slot(&self) -> u8 {
        self.slot
    }
}

impl<P: Peer + 'static> PeerStatusSubscriber for SlotSubscriber<P> {
    fn on_status_changed(&self, status: PeerStatus) {
        let Some(shared) = self.shared.upgrade() else { return };
        let Some(identifier) = self.identifier.lock().clone() else { return };

        let became_available = shared.arena.lock().apply_status(self.slot, &identifier, status);
        if became_available {
            shared.peer_available.notify_waiters();
        }
    }
}
