//! The fixed 256-slot arena: four coexisting circular doubly-linked rings stored as
//! `prev`/`next` index pairs in a single array (spec component C9).
//!
//! Slot 0x00 is the head of the "unavailable" ring, 0x01 and 0x02 alternate between the
//! "low" and "high" concurrency roles (tracked by the `hi`/`lo` head indices so a ring
//! swap is just swapping two `u8`s), 0x03 is the head of the "free" ring. Slots
//! 0x04–0xFF are data nodes. There are no heap allocations and no pointers into the
//! arena — every reference is an 8-bit index, per spec.md §9's "do not replace this
//! with a heap-allocated node-per-peer implementation".

use relay_core::transport::{Peer, PeerStatus};
use std::collections::HashMap;
use std::sync::Arc;

pub const CAPACITY: usize = 256;
pub const UNAVAILABLE_HEAD: u8 = 0x00;
pub const LOW_HEAD_A: u8 = 0x01;
pub const HIGH_HEAD_A: u8 = 0x02;
pub const FREE_HEAD: u8 = 0x03;
pub const FIRST_DATA_SLOT: u8 = 0x04;
/// Exactly 252 data slots (0x04..=0xFF), matching spec.md §8's "252 occupied-slot
/// limit" boundary test.
pub const DATA_SLOT_COUNT: usize = CAPACITY - FIRST_DATA_SLOT as usize;

#[derive(Clone, Copy, Debug)]
struct Node {
    prev: u8,
    next: u8,
}

const fn build_initial_nodes() -> [Node; CAPACITY] {
    let mut nodes = [Node { prev: 0, next: 0 }; CAPACITY];

    // The three non-free head rings start empty: self-linked.
    let mut head = 0u8;
    while head < FIRST_DATA_SLOT - 1 {
        nodes[head as usize] = Node { prev: head, next: head };
        head += 1;
    }

    // The free ring's head is slot 0x03; slots 0x04..=0xFF are pre-linked into it as a
    // single chain, head -> first data slot -> ... -> last data slot -> head.
    let free_head = FREE_HEAD;
    let mut prev = free_head;
    let mut slot = FIRST_DATA_SLOT as usize;
    while slot < CAPACITY {
        nodes[slot] = Node { prev, next: 0 };
        nodes[prev as usize].next = slot as u8;
        prev = slot as u8;
        slot += 1;
    }
    nodes[prev as usize].next = free_head;
    nodes[free_head as usize].prev = prev;

    nodes
}

const INITIAL_NODES: [Node; CAPACITY] = build_initial_nodes();

/// Which of the four rings a slot currently belongs to, derived rather than stored —
/// useful for tests asserting the "every slot is in exactly one ring" invariant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RingKind {
    Unavailable,
    Low,
    High,
    Free,
}

/// The fixed-arena peer-selection structure. Generic over the peer handle type so it
/// carries whatever a `Transport` implementation retains.
pub struct Arena<P: Peer> {
    nodes: [Node; CAPACITY],
    peers: Vec<Option<Arc<P>>>,
    statuses: Vec<PeerStatus>,
    /// Peer identifier -> slot index. A value of `0` means "known but not admitted"
    /// (capacity exhausted), per spec.md §4.8's Update algorithm.
    index: HashMap<String, u8>,
    hi: u8,
    lo: u8,
}

impl<P: Peer> Arena<P> {
    pub fn new() -> Self {
        Self {
            nodes: INITIAL_NODES,
            peers: vec![None; CAPACITY],
            statuses: vec![PeerStatus::Unavailable; CAPACITY],
            index: HashMap::new(),
            hi: HIGH_HEAD_A,
            lo: LOW_HEAD_A,
        }
    }

    fn unlink(&mut self, slot: u8) {
        let (prev, next) = (self.nodes[slot as usize].prev, self.nodes[slot as usize].next);
        self.nodes[prev as usize].next = next;
        self.nodes[next as usize].prev = prev;
        self.nodes[slot as usize] = Node { prev: slot, next: slot };
    }

    fn append_to_tail(&mut self, head: u8, slot: u8) {
        let tail = self.nodes[head as usize].prev;
        self.nodes[tail as usize].next = slot;
        self.nodes[slot as usize].prev = tail;
        self.nodes[slot as usize].next = head;
        self.nodes[head as usize].prev = slot;
    }

    fn move_to_tail(&mut self, head: u8, slot: u8) {
        self.unlink(slot);
        self.append_to_tail(head, slot);
    }

    fn ring_is_empty(&self, head: u8) -> bool {
        self.nodes[head as usize].next == head
    }

    fn first_non_head(&self, head: u8) -> Option<u8> {
        let candidate = self.nodes[head as usize].next;
        (candidate != head).then_some(candidate)
    }

    pub fn kind_of(&self, slot: u8) -> RingKind {
        if slot == UNAVAILABLE_HEAD {
            return RingKind::Unavailable;
        }
        if slot == FREE_HEAD {
            return RingKind::Free;
        }
        // Walk from each head; 256 slots makes this cheap and it's test/debug-only.
        for (head, kind) in [
            (UNAVAILABLE_HEAD, RingKind::Unavailable),
            (self.lo, RingKind::Low),
            (self.hi, RingKind::High),
            (FREE_HEAD, RingKind::Free),
        ] {
            let mut cursor = self.nodes[head as usize].next;
            while cursor != head {
                if cursor == slot {
                    return kind;
                }
                cursor = self.nodes[cursor as usize].next;
            }
        }
        RingKind::Free
    }

    // ---- Choose ----

    /// Takes the first non-head node of the low ring and moves it to the tail of the
    /// high ring, swapping `hi`/`lo` if this drains the low ring. Returns the slot and
    /// its retained peer, or `None` if the low ring has no non-head member.
    pub fn choose(&mut self) -> Option<(u8, Arc<P>)> {
        let slot = self.first_non_head(self.lo)?;
        self.move_to_tail(self.hi, slot);
        if self.ring_is_empty(self.lo) {
            std::mem::swap(&mut self.hi, &mut self.lo);
        }
        let peer = self.peers[slot as usize].clone()?;
        Some((slot, peer))
    }

    /// Moves `slot` back to the tail of the low ring, but only if it still holds
    /// `expected_identifier` and is still `Available` — tolerating races with Release
    /// and status changes, per spec.md §4.8.
    pub fn on_finish(&mut self, slot: u8, expected_identifier: &str) {
        let still_current = self.peers[slot as usize].as_deref().map(Peer::identifier) == Some(expected_identifier);
        if still_current && self.statuses[slot as usize] == PeerStatus::Available {
            self.move_to_tail(self.lo, slot);
        }
    }

    // ---- Membership ----

    pub fn lookup_slot(&self, identifier: &str) -> Option<u8> {
        self.index.get(identifier).copied().filter(|&slot| slot != 0)
    }

    /// Clears a removed peer's slot and returns it to the free ring.
    pub fn remove(&mut self, identifier: &str) -> Option<Arc<P>> {
        let slot = self.index.remove(identifier)?;
        if slot == 0 {
            return None;
        }
        let peer = self.peers[slot as usize].take();
        self.statuses[slot as usize] = PeerStatus::Unavailable;
        self.move_to_tail(FREE_HEAD, slot);
        peer
    }

    /// Takes the head of the free ring for a new peer, or returns `None` if capacity is
    /// exhausted (caller then records the peer as "known but not admitted" at slot 0).
    pub fn admit(&mut self, identifier: &str, peer: Arc<P>) -> Option<u8> {
        let slot = self.first_non_head(FREE_HEAD)?;
        self.peers[slot as usize] = Some(peer);
        self.statuses[slot as usize] = PeerStatus::Unavailable;
        self.move_to_tail(UNAVAILABLE_HEAD, slot);
        self.index.insert(identifier.to_string(), slot);
        Some(slot)
    }

    pub fn mark_known_but_not_admitted(&mut self, identifier: &str) {
        self.index.insert(identifier.to_string(), 0);
    }

    /// Applies a status transition for the slot's current peer, returning `true` if the
    /// transition landed on `Available` (the caller should then signal waiters).
    pub fn apply_status(&mut self, slot: u8, expected_identifier: &str, status: PeerStatus) -> bool {
        let Some(peer) = self.peers[slot as usize].as_deref() else { return false };
        if peer.identifier() != expected_identifier {
            return false;
        }
        self.statuses[slot as usize] = status;
        match status {
            PeerStatus::Available => {
                if matches!(self.kind_of(slot), RingKind::Unavailable) {
                    self.move_to_tail(self.lo, slot);
                }
                true
            }
            PeerStatus::Unavailable => {
                if !matches!(self.kind_of(slot), RingKind::Unavailable | RingKind::Free) {
                    self.move_to_tail(UNAVAILABLE_HEAD, slot);
                }
                false
            }
        }
    }

    /// Looks at, without consuming, the slot that would be handed out by the next
    /// [`Arena::admit`]. Used by the chooser to pre-bind a slot's subscriber before
    /// the async `retain_peer` call that must receive it.
    pub fn peek_free_slot(&self) -> Option<u8> {
        self.first_non_head(FREE_HEAD)
    }

    pub fn peer_at(&self, slot: u8) -> Option<&Arc<P>> {
        self.peers[slot as usize].as_ref()
    }

    pub fn occupied_count(&self) -> usize {
        self.peers.iter().filter(|p| p.is_some()).count()
    }
}

impl<P: Peer> Default for Arena<P> {
    fn default() -> Self {
        Self::new()
    }
}
