//! Per-sweep action budget.

use std::sync::atomic::{AtomicU32, Ordering};

/// Remaining mutating actions for one sweep invocation.
///
/// Created at the start of a sweep and dropped when it returns. Items are
/// dispatched concurrently, so consumption is a single atomic
/// decrement-and-test: the counter never underflows and the number of granted
/// actions never exceeds the initial value.
#[derive(Debug)]
pub struct RunBudget {
    remaining: AtomicU32,
}

impl RunBudget {
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            remaining: AtomicU32::new(limit),
        }
    }

    /// Claim one action. Returns `false` once the budget is spent, in which
    /// case the caller must skip the action entirely.
    pub fn try_consume(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }

    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}
