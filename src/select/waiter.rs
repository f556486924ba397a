// src/select/waiter.rs

//! The parking record used by `select_wait`.

use parking_lot::{Condvar, Mutex};
use std::time::Instant;

/// Per-call parking record owned by the thread inside `select_wait`.
///
/// Channels hold `Weak` references to this record in their
/// `select_waiters` lists; the waiter removes them itself on every exit
/// path, and a reference that outlives the call degrades to a dead `Weak`
/// pruned on the next notification sweep. The record's own mutex is only
/// ever taken for a bounded flag update, so notifying from under a channel
/// mutex cannot stall.
#[derive(Debug)]
pub(crate) struct SelectWaiter {
  signaled: Mutex<bool>,
  cv: Condvar,
}

impl SelectWaiter {
  pub(crate) fn new() -> Self {
    SelectWaiter {
      signaled: Mutex::new(false),
      cv: Condvar::new(),
    }
  }

  /// Wakes the waiter. Called by send/recv/close while holding the channel
  /// mutex; the waiter never parks holding that mutex, so this is bounded.
  pub(crate) fn notify(&self) {
    let mut signaled = self.signaled.lock();
    *signaled = true;
    self.cv.notify_one();
  }

  /// Clears a stale signal. Must run while the caller still holds every
  /// participant channel mutex: any state change after the reset is then
  /// guaranteed to re-signal, so no wakeup can be lost between the
  /// readiness check and the park.
  pub(crate) fn reset(&self) {
    *self.signaled.lock() = false;
  }

  /// Parks until signaled or until `deadline` elapses (`None` = forever).
  /// Returns `false` only when the deadline passed without a signal.
  pub(crate) fn park(&self, deadline: Option<Instant>) -> bool {
    let mut signaled = self.signaled.lock();
    while !*signaled {
      match deadline {
        Some(at) => {
          if self.cv.wait_until(&mut signaled, at).timed_out() {
            return *signaled;
          }
        }
        None => self.cv.wait(&mut signaled),
      }
    }
    true
  }
}
