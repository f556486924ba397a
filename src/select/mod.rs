// src/select/mod.rs

//! Multi-channel arbitration: wait for the first of several pending
//! communications to become ready.
//!
//! A [`SelectCase`] names one pending communication — receiving on a channel
//! or sending into it. [`select_poll`] reports the first ready case without
//! parking; [`select_wait`] parks until some case becomes ready, every case
//! is permanently dead, or a deadline elapses.
//!
//! Select **does not perform the communication**. A returned index tells the
//! caller which case became ready at the instant of observation; the caller
//! then performs the operation itself and must treat that operation's result
//! as authoritative, because another consumer may race the readiness away
//! between the wakeup and the follow-up call.
//!
//! ```
//! use conduit::{select_poll, Channel, SelectCase};
//!
//! let numbers = Channel::buffered(4);
//! let words: Channel<String> = Channel::buffered(4);
//!
//! numbers.try_send(7).unwrap();
//! let cases = [SelectCase::recv(&numbers), SelectCase::recv(&words)];
//! assert_eq!(select_poll(&cases), Some(0));
//! // Select only reports readiness; the caller performs the operation.
//! assert_eq!(numbers.try_recv(), Ok(7));
//! ```
//!
//! ### Deadlock freedom
//!
//! `select_wait` is the only operation in the crate that holds more than one
//! channel mutex at a time. It acquires every participant mutex in ascending
//! address order — a total order over channels — so concurrent selects
//! sharing channels cannot deadlock. The order is asserted in debug builds.

pub(crate) mod waiter;

#[cfg(test)]
mod tests;

use crate::channel::core::Meta;
use crate::channel::Channel;
use crate::telemetry;

use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use self::waiter::SelectWaiter;

// --- Telemetry Constants ---

const LOC_WAIT: &str = "select_wait";

const EVT_REGISTER: &str = "W:Register";
const EVT_WINNER: &str = "W:Winner";
const EVT_TIMEOUT: &str = "W:DeadlineExpired";

const CTR_PARKS: &str = "SelectParks";

/// Type-erased view of a channel's coordination state.
///
/// Arbitration never touches the element type: readiness is a function of
/// [`Meta`] and the capacity alone, so a case over any `Channel<T>` erases to
/// this trait and the typed payload stays with the caller.
pub(crate) trait SelectTarget: Send + Sync {
  /// The mutex guarding the channel's coordination state. Its address also
  /// serves as the channel's position in the global lock order.
  fn meta(&self) -> &Mutex<Meta>;

  /// The channel's immutable capacity.
  fn capacity(&self) -> usize;
}

fn meta_addr(target: &(dyn SelectTarget + '_)) -> usize {
  target.meta() as *const Mutex<Meta> as usize
}

/// Whether a case is a receive or a send. A closed sum; arbitration matches
/// on the tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaseKind {
  Recv,
  Send,
}

/// One pending communication submitted to [`select_poll`] or
/// [`select_wait`].
///
/// Constructed by [`SelectCase::recv`] or [`SelectCase::send`] over a
/// borrowed channel; the case holds the borrow for its lifetime, so the
/// channel is guaranteed to outlive the arbitration that watches it.
pub struct SelectCase<'a> {
  kind: CaseKind,
  target: &'a (dyn SelectTarget + 'a),
}

impl<'a> SelectCase<'a> {
  /// A case that is ready when `channel` has a value to take, or is closed
  /// (a receive completes immediately with residue or `None`).
  pub fn recv<T: Send>(channel: &'a Channel<T>) -> Self {
    SelectCase {
      kind: CaseKind::Recv,
      target: channel.core(),
    }
  }

  /// A case that is ready when a deposit into `channel` would succeed
  /// without parking.
  pub fn send<T: Send>(channel: &'a Channel<T>) -> Self {
    SelectCase {
      kind: CaseKind::Send,
      target: channel.core(),
    }
  }

  fn ready(&self, meta: &Meta) -> bool {
    match self.kind {
      CaseKind::Recv => meta.recv_ready(self.target.capacity()),
      CaseKind::Send => meta.send_ready(self.target.capacity()),
    }
  }

  /// A case that can never make progress again: a drained closed channel
  /// for receives, any closed channel for sends.
  fn dead(&self, meta: &Meta) -> bool {
    match self.kind {
      CaseKind::Recv => {
        meta.closed && meta.count == 0 && !(meta.pending_ready && !meta.pending_taken)
      }
      CaseKind::Send => meta.closed,
    }
  }
}

impl fmt::Debug for SelectCase<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SelectCase")
      .field("kind", &self.kind)
      .field("channel", &format_args!("{:#x}", meta_addr(self.target)))
      .finish()
  }
}

/// Examines the cases in order and returns the index of the first whose
/// readiness predicate holds, or `None` if none is ready.
///
/// Each channel's mutex is held only for the duration of its own check; no
/// I/O is performed and nothing parks.
pub fn select_poll(cases: &[SelectCase<'_>]) -> Option<usize> {
  for (index, case) in cases.iter().enumerate() {
    let meta = case.target.meta().lock();
    if case.ready(&meta) {
      return Some(index);
    }
  }
  None
}

/// Blocks until some case is ready and returns its index.
///
/// Returns `None` when every case is permanently dead (all receive-case
/// channels closed and drained, all send-case channels closed), when the
/// timeout elapses, or when `cases` is empty. A timeout of `None` waits
/// forever.
///
/// Readiness observed here may be raced away by another consumer before the
/// caller acts on it; follow up with `try_recv`/`try_send` (or accept a
/// possible second short block) and treat that result as authoritative.
pub fn select_wait(cases: &[SelectCase<'_>], timeout: Option<Duration>) -> Option<usize> {
  if cases.is_empty() {
    return None;
  }
  let deadline = timeout.map(|t| Instant::now() + t);

  // Participant channels in ascending mutex-address order, deduplicated.
  let mut order: Vec<&(dyn SelectTarget + '_)> = cases.iter().map(|c| c.target).collect();
  order.sort_by_key(|t| meta_addr(*t));
  order.dedup_by_key(|t| meta_addr(*t));

  let waiter = Arc::new(SelectWaiter::new());
  let handle = Arc::downgrade(&waiter);
  let mut registered = false;

  loop {
    // Phase 1: acquire every participant mutex, ascending.
    let mut guards: Vec<MutexGuard<'_, Meta>> = Vec::with_capacity(order.len());
    for (slot, target) in order.iter().enumerate() {
      debug_assert!(
        slot == 0 || meta_addr(order[slot - 1]) < meta_addr(*target),
        "select lock order violated"
      );
      guards.push(target.meta().lock());
    }

    // Phase 2: one atomic readiness pass, in case order.
    let winner = cases
      .iter()
      .position(|case| case.ready(&guards[guard_slot(&order, case.target)]));
    if let Some(index) = winner {
      if registered {
        unregister(&mut guards, &handle);
      }
      telemetry::log_event(Some(index), LOC_WAIT, EVT_WINNER, None);
      return Some(index);
    }

    // Phase 3: nothing can ever become ready again.
    let all_dead = cases
      .iter()
      .all(|case| case.dead(&guards[guard_slot(&order, case.target)]));
    if all_dead {
      if registered {
        unregister(&mut guards, &handle);
      }
      return None;
    }

    // Phase 4: deadline already elapsed; give up without parking.
    if deadline.map_or(false, |at| Instant::now() >= at) {
      if registered {
        unregister(&mut guards, &handle);
      }
      telemetry::log_event(None, LOC_WAIT, EVT_TIMEOUT, None);
      return None;
    }

    // Phase 5: register on every participant, then park. The signal flag is
    // cleared while the channels are still locked, so a state change after
    // this point is guaranteed to re-signal the waiter.
    if !registered {
      for guard in guards.iter_mut() {
        guard.select_waiters.push(handle.clone());
      }
      registered = true;
      telemetry::log_event(None, LOC_WAIT, EVT_REGISTER, None);
    }
    waiter.reset();
    drop(guards);

    telemetry::increment_counter(LOC_WAIT, CTR_PARKS);
    if !waiter.park(deadline) {
      // Deadline expired while parked: deregister, then report failure.
      let mut guards: Vec<MutexGuard<'_, Meta>> =
        order.iter().map(|target| target.meta().lock()).collect();
      unregister(&mut guards, &handle);
      telemetry::log_event(None, LOC_WAIT, EVT_TIMEOUT, None);
      return None;
    }
  }
}

/// Index into the lock-order vector (and the guard vector that mirrors it)
/// for the channel backing `target`.
fn guard_slot(order: &[&(dyn SelectTarget + '_)], target: &(dyn SelectTarget + '_)) -> usize {
  let addr = meta_addr(target);
  order
    .iter()
    .position(|t| meta_addr(*t) == addr)
    .expect("select case channel missing from lock order")
}

/// Removes this call's waiter record from every participant channel.
fn unregister(guards: &mut [MutexGuard<'_, Meta>], handle: &Weak<SelectWaiter>) {
  for guard in guards.iter_mut() {
    guard.select_waiters.retain(|entry| !entry.ptr_eq(handle));
  }
}
