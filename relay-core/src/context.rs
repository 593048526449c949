//! Cancellation and deadline primitives threaded through every call (spec §4: context
//! derived cancellation/deadline synthesis).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A monotonic instant, wrapped so the rest of the crate never touches
/// `std::time::Instant` directly and call sites read as domain vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonotonicTimePoint(Instant);

impl MonotonicTimePoint {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub fn checked_duration_since(self, earlier: MonotonicTimePoint) -> Option<Duration> {
        self.0.checked_duration_since(earlier.0)
    }
}

/// A cooperative cancellation signal shared between a call and everything it spawns.
///
/// Cloning shares the same underlying flag; [`Cancellation::child`] also shares it today
/// (there is no hierarchical un-cancel), matching the teacher's `Cancellation` in
/// `spark-core/src/contract.rs`: children observe their parent's cancellation but never
/// affect it.
#[derive(Clone, Debug)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancels the signal. Returns `true` if this call transitioned it from
    /// not-cancelled to cancelled, `false` if it was already cancelled.
    pub fn cancel(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// A handle sharing this same cancellation signal.
    pub fn child(&self) -> Self {
        self.clone()
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

/// An absolute point in time beyond which a call is considered to have timed out, or
/// the absence of one.
#[derive(Clone, Copy, Debug)]
pub struct Deadline(Option<MonotonicTimePoint>);

impl Deadline {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn at(point: MonotonicTimePoint) -> Self {
        Self(Some(point))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self(Some(MonotonicTimePoint(Instant::now() + timeout)))
    }

    pub fn instant(self) -> Option<MonotonicTimePoint> {
        self.0
    }

    /// Whichever deadline is sooner; a missing deadline never wins over a present one.
    pub fn earliest(self, other: Deadline) -> Deadline {
        match (self.0, other.0) {
            (Some(a), Some(b)) => Deadline(Some(if a <= b { a } else { b })),
            (Some(a), None) => Deadline(Some(a)),
            (None, Some(b)) => Deadline(Some(b)),
            (None, None) => Deadline(None),
        }
    }

    pub fn is_expired(self) -> bool {
        match self.0 {
            Some(point) => MonotonicTimePoint::now() >= point,
            None => false,
        }
    }

    pub fn remaining(self) -> Option<Duration> {
        self.0
            .map(|point| point.checked_duration_since(MonotonicTimePoint::now()).unwrap_or_default())
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::none()
    }
}

/// A monotonically increasing identifier handed to each call for correlation in logs and
/// metrics, distinct from any transport-level request ID.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallSequence(u64);

impl CallSequence {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Issues monotonically increasing [`CallSequence`] values, one per process.
#[derive(Default)]
pub struct CallSequencer {
    next: AtomicU64,
}

impl CallSequencer {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(1) }
    }

    pub fn next(&self) -> CallSequence {
        CallSequence(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_idempotent_and_observable() {
        let cancellation = Cancellation::new();
        assert!(!cancellation.is_cancelled());
        assert!(cancellation.cancel());
        assert!(cancellation.is_cancelled());
        assert!(!cancellation.cancel());
    }

    #[test]
    fn child_observes_parent_cancellation() {
        let parent = Cancellation::new();
        let child = parent.child();
        parent.cancel();
        assert!(child.is_cancelled());
    }

    #[test]
    fn deadline_none_never_expires() {
        assert!(!Deadline::none().is_expired());
    }

    #[test]
    fn deadline_in_the_past_is_expired() {
        let deadline = Deadline::with_timeout(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(deadline.is_expired());
    }

    #[test]
    fn earliest_prefers_the_sooner_present_deadline() {
        let now = MonotonicTimePoint::now();
        let soon = Deadline::at(now);
        let later = Deadline::with_timeout(Duration::from_secs(60));
        let merged = soon.earliest(later);
        assert_eq!(merged.instant(), soon.instant());
        assert_eq!(Deadline::none().earliest(soon).instant(), soon.instant());
    }

    #[test]
    fn call_sequencer_hands_out_increasing_values() {
        let sequencer = CallSequencer::new();
        let a = sequencer.next();
        let b = sequencer.next();
        assert!(b.as_u64() > a.as_u64());
    }
}
