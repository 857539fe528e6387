//! Fail-once connection latch.
//!
//! # Invariants
//! - `failed` starts `false` and never returns to `false`.
//! - All reads and writes go through one mutex.
//! - The unreachable notice is handed out at most once.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct LatchState {
    failed: bool,
    notice_taken: bool,
}

/// Shared "store is unusable" state for one guard and its repositories.
#[derive(Debug, Default)]
pub struct ConnectionState {
    inner: Mutex<LatchState>,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the latch.
    pub fn is_tripped(&self) -> bool {
        self.lock().failed
    }

    /// Trips the latch. Returns `true` only for the call that tripped it.
    pub fn trip(&self) -> bool {
        let mut state = self.lock();
        let first = !state.failed;
        state.failed = true;
        first
    }

    /// Returns `true` once after the latch has tripped, then `false` forever.
    pub fn take_unreachable_notice(&self) -> bool {
        let mut state = self.lock();
        if state.failed && !state.notice_taken {
            state.notice_taken = true;
            return true;
        }
        false
    }

    // A panic while holding the lock cannot leave `LatchState` torn: every
    // write is a single bool store.
    fn lock(&self) -> MutexGuard<'_, LatchState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
