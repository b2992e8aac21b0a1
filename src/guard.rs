//! At-most-one-in-flight refresh bookkeeping.
//!
//! [`RefreshGuard`] is a plain state machine with no I/O. The dashboard
//! owns one per identity epoch and consults it under its state lock, so
//! checking and setting `in_flight` is a single atomic step with respect to
//! other triggers.

/// What to do with refresh triggers that arrive while a fetch is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoalescePolicy {
    /// Drop them. The running fetch is the only one; updates that land on
    /// the server after it was sent stay invisible until the next trigger.
    Drop,
    /// Remember that at least one trigger arrived ("dirty") and run exactly
    /// one follow-up fetch after the current one completes, no matter how
    /// many triggers arrived.
    #[default]
    FollowUp,
}

/// Result of asking the guard to start a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No fetch was running; the caller now owns the in-flight slot.
    Started,
    /// A fetch is running; this trigger was folded into it.
    Coalesced,
}

/// Tracks whether a fetch is in flight and whether a follow-up is owed.
#[derive(Debug, Clone, Default)]
pub struct RefreshGuard {
    policy: CoalescePolicy,
    in_flight: bool,
    dirty: bool,
}

impl RefreshGuard {
    /// Idle guard applying `policy` to coalesced triggers.
    pub fn new(policy: CoalescePolicy) -> Self {
        Self {
            policy,
            in_flight: false,
            dirty: false,
        }
    }

    /// Try to claim the in-flight slot.
    ///
    /// When a fetch is already running the trigger is coalesced: under
    /// [`CoalescePolicy::FollowUp`] the guard is marked dirty, under
    /// [`CoalescePolicy::Drop`] nothing is recorded.
    pub fn try_begin(&mut self) -> Admission {
        if self.in_flight {
            if self.policy == CoalescePolicy::FollowUp {
                self.dirty = true;
            }
            return Admission::Coalesced;
        }
        self.in_flight = true;
        Admission::Started
    }

    /// Release the in-flight slot after a fetch completes (success or
    /// failure).
    ///
    /// Returns `true` when a follow-up fetch is owed. In that case the slot
    /// stays claimed and the dirty flag is cleared, so the caller runs
    /// exactly one more fetch and calls `finish` again.
    pub fn finish(&mut self) -> bool {
        if self.dirty {
            self.dirty = false;
            return true;
        }
        self.in_flight = false;
        false
    }

    /// Require a follow-up after the fetch in flight, regardless of the
    /// policy. Does nothing when no fetch is running.
    pub fn owe_follow_up(&mut self) {
        if self.in_flight {
            self.dirty = true;
        }
    }

    /// Whether a fetch currently holds the slot.
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    /// Whether a follow-up fetch is owed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The policy this guard was built with.
    pub fn policy(&self) -> CoalescePolicy {
        self.policy
    }
}
