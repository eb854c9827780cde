use std::sync::atomic::{AtomicBool, Ordering};

/// Progress flags shared between a follower's background tasks.
///
/// Each flag has a single writer: `caught_up` is set by the chain walker,
/// `first_event_seen` by the live receiver. Both only ever go from `false`
/// to `true`.
#[derive(Debug, Default)]
pub struct FollowerStatus {
    caught_up: AtomicBool,
    first_event_seen: AtomicBool,
}

impl FollowerStatus {
    pub fn is_caught_up(&self) -> bool {
        self.caught_up.load(Ordering::Acquire)
    }

    pub fn first_event_seen(&self) -> bool {
        self.first_event_seen.load(Ordering::Acquire)
    }

    pub(crate) fn mark_caught_up(&self) {
        self.caught_up.store(true, Ordering::Release);
    }

    /// Returns `true` for the call that flipped the flag.
    pub(crate) fn mark_first_event(&self) -> bool {
        !self.first_event_seen.swap(true, Ordering::AcqRel)
    }
}

/// Point-in-time view of a running follower.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    /// History reconstruction reached genesis (or was not needed).
    pub caught_up: bool,
    /// The live subscription has delivered at least one event.
    pub first_event_seen: bool,
    pub cancelled: bool,
}
