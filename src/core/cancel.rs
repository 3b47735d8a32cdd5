//! Interruptible waiting for the long polling and backoff pauses.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct CancelState {
    cancelled: Mutex<bool>,
    condvar: Condvar,
}

/// Shared cancellation flag that can wake a sleeping thread.
///
/// Clones share the same state, so one clone can be handed to a signal
/// handler while the worker sleeps on another.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the token cancelled and wake every sleeper.
    pub fn cancel(&self) {
        let mut cancelled = self.lock();
        *cancelled = true;
        self.state.condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.lock()
    }

    /// Sleep for `duration` unless cancelled first.
    ///
    /// Returns `true` if the full duration elapsed, `false` if the token was
    /// (or already had been) cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        // No deadline means the wait only ends on cancellation
        let deadline = Instant::now().checked_add(duration);
        let mut cancelled = self.lock();

        loop {
            if *cancelled {
                return false;
            }
            cancelled = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return true;
                    }
                    match self.state.condvar.wait_timeout(cancelled, deadline - now) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => self
                    .state
                    .condvar
                    .wait(cancelled)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
            };
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        // A poisoned flag is still a valid bool
        self.state
            .cancelled
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
