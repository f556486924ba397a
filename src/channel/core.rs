// src/channel/core.rs

//! The shared state and core logic of a channel.
//!
//! A channel is a single `ChannelCore` behind an `Arc`, shared by every
//! handle. One `parking_lot::Mutex` guards all coordination state; two
//! condition variables (`not_empty`, `not_full`) park blocking operations and
//! are broadcast on every state change so that woken threads re-validate
//! their condition.
//!
//! ### Design Principles:
//!
//! 1.  **Central Mutex**: a `parking_lot::Mutex` guards all state changes.
//!     No operation holds it across an unbounded wait except through the
//!     channel's own condition variables.
//! 2.  **Non-generic coordination state**: the mutex protects `Meta`, which
//!     carries no `T`. Select arbitration must lock several channels of
//!     different element types in one atomic pass, so everything it reads
//!     (cursors, flags, waiter list) lives in `Meta` and the typed values
//!     live beside the mutex in `UnsafeCell` storage whose access is
//!     licensed by holding the `Meta` guard.
//! 3.  **Rendezvous handoff slot**: an unbuffered channel transfers values
//!     through a single pending slot. `pending_ready` marks a published
//!     value, `pending_taken` signals the parked sender that a receiver took
//!     it, and `pending_detached` marks a `try_send` publish with no parked
//!     sender left behind to free the slot.

use crate::error::{
  RecvTimeoutError, SendError, SendTimeoutError, TryRecvError, TrySendError,
};
use crate::select::waiter::SelectWaiter;
use crate::select::SelectTarget;
use crate::telemetry;

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::ptr;
use std::sync::Weak;
use std::time::{Duration, Instant};

// --- Telemetry Constants ---

const LOC_SEND: &str = "ChannelCore::send";
const LOC_RECV: &str = "ChannelCore::recv";
const LOC_CLOSE: &str = "ChannelCore::close";

const EVT_PARK_FULL: &str = "S:ParkNotFull";
const EVT_PARK_EMPTY: &str = "R:ParkNotEmpty";
const EVT_PUBLISH: &str = "S:PublishRendezvous";
const EVT_HANDOFF_TAKEN: &str = "R:HandoffTaken";
const EVT_CLOSED: &str = "CloseTransition";

const CTR_SENDER_PARKS: &str = "SenderParks";
const CTR_RECEIVER_PARKS: &str = "ReceiverParks";

// --- Coordination State ---

/// Mutex-protected coordination state. Deliberately free of `T` so select
/// arbitration can operate on any channel through `&Mutex<Meta>` alone.
#[derive(Debug)]
pub(crate) struct Meta {
  /// Ring read cursor. Invariant: `head < capacity` for buffered channels.
  pub(crate) head: usize,
  /// Ring write cursor. Invariant: `tail < capacity` for buffered channels.
  pub(crate) tail: usize,
  /// Live values in the ring. Invariant: `count <= capacity`; the live slots
  /// are exactly `[head, head + count) mod capacity`.
  pub(crate) count: usize,
  /// Parked blocking receivers on an unbuffered channel. Read by `try_send`
  /// and by select send-readiness.
  pub(crate) waiting_receivers: usize,
  /// A rendezvous value is published and not yet consumed.
  pub(crate) pending_ready: bool,
  /// A receiver consumed the published value; the parked sender clears this
  /// and frees the slot.
  pub(crate) pending_taken: bool,
  /// The published value came from `try_send`: no sender is parked, so the
  /// receiver frees the slot itself on take.
  pub(crate) pending_detached: bool,
  /// Monotonic: transitions `false -> true` exactly once.
  pub(crate) closed: bool,
  /// Select waiters parked on this channel. Non-owning; each waiter
  /// deregisters itself on exit, and dead entries are pruned on the next
  /// notification sweep.
  pub(crate) select_waiters: Vec<Weak<SelectWaiter>>,
}

impl Meta {
  fn new() -> Self {
    Meta {
      head: 0,
      tail: 0,
      count: 0,
      waiting_receivers: 0,
      pending_ready: false,
      pending_taken: false,
      pending_detached: false,
      closed: false,
      select_waiters: Vec::new(),
    }
  }

  /// A recv-case is ready when a value can be taken now, or the channel is
  /// closed (recv completes immediately with residue or `None`).
  pub(crate) fn recv_ready(&self, capacity: usize) -> bool {
    self.count > 0
      || (capacity == 0 && self.pending_ready && !self.pending_taken)
      || self.closed
  }

  /// A send-case is ready when a deposit would succeed without parking:
  /// buffered space, or a parked receiver with a free handoff slot.
  pub(crate) fn send_ready(&self, capacity: usize) -> bool {
    !self.closed
      && ((capacity > 0 && self.count < capacity)
        || (capacity == 0
          && self.waiting_receivers > 0
          && !self.pending_ready
          && !self.pending_taken))
  }

  /// Wakes every registered select waiter. Runs under the channel mutex;
  /// waiters never park holding it, so each wake is a bounded operation.
  pub(crate) fn notify_select_waiters(&mut self) {
    self.select_waiters.retain(|entry| match entry.upgrade() {
      Some(waiter) => {
        waiter.notify();
        true
      }
      None => false,
    });
  }
}

// --- Channel Core ---

/// The shared owner of a channel's state, wrapped in an `Arc` by the public
/// handle type.
pub(crate) struct ChannelCore<T: Send> {
  /// Coordination state. The hot field: padded to keep the mutex word off
  /// the condvars' cache lines.
  meta: CachePadded<Mutex<Meta>>,
  /// Signaled when data arrives or the channel closes.
  not_empty: Condvar,
  /// Signaled when space frees up, a handoff completes, or the channel
  /// closes.
  not_full: Condvar,
  /// Immutable after creation. `0` means unbuffered rendezvous.
  capacity: usize,
  /// Ring storage for buffered channels; empty for rendezvous channels.
  /// Slots in `[head, head + count)` are initialized.
  slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
  /// Rendezvous handoff storage. `Some` exactly while a publish is in
  /// flight.
  pending: UnsafeCell<Option<T>>,
}

// Safety: every access to `slots` and `pending` happens while holding the
// `meta` guard, which serializes all mutation. The values themselves only
// require `T: Send` because they cross threads but are never aliased.
unsafe impl<T: Send> Send for ChannelCore<T> {}
unsafe impl<T: Send> Sync for ChannelCore<T> {}

impl<T: Send> ChannelCore<T> {
  pub(crate) fn new(capacity: usize) -> Self {
    let slots: Vec<UnsafeCell<MaybeUninit<T>>> =
      (0..capacity).map(|_| UnsafeCell::new(MaybeUninit::uninit())).collect();
    ChannelCore {
      meta: CachePadded::new(Mutex::new(Meta::new())),
      not_empty: Condvar::new(),
      not_full: Condvar::new(),
      capacity,
      slots: slots.into_boxed_slice(),
      pending: UnsafeCell::new(None),
    }
  }

  // --- Slot Access ---
  //
  // All of these require the caller to hold the `meta` guard; the guard is
  // taken by `&mut Meta` to make that requirement structural.

  /// Writes `value` at `tail` and advances the cursors.
  ///
  /// # Safety
  /// Caller holds the guard for `meta` and has verified `count < capacity`.
  unsafe fn push_slot(&self, meta: &mut Meta, value: T) {
    debug_assert!(meta.count < self.capacity);
    (*self.slots[meta.tail].get()).write(value);
    meta.tail = (meta.tail + 1) % self.capacity;
    meta.count += 1;
  }

  /// Moves the value at `head` out and advances the cursors.
  ///
  /// # Safety
  /// Caller holds the guard for `meta` and has verified `count > 0`.
  unsafe fn pop_slot(&self, meta: &mut Meta) -> T {
    debug_assert!(meta.count > 0);
    let value = (*self.slots[meta.head].get()).assume_init_read();
    meta.head = (meta.head + 1) % self.capacity;
    meta.count -= 1;
    value
  }

  /// Publishes `value` into the rendezvous slot.
  ///
  /// # Safety
  /// Caller holds the guard for `meta` and has verified the slot is free
  /// (`!pending_ready && !pending_taken`).
  unsafe fn put_pending(&self, value: T) {
    debug_assert!((*self.pending.get()).is_none());
    *self.pending.get() = Some(value);
  }

  /// Withdraws whatever the rendezvous slot holds.
  ///
  /// # Safety
  /// Caller holds the guard for `meta`.
  unsafe fn take_pending(&self) -> Option<T> {
    (*self.pending.get()).take()
  }

  /// Takes the published rendezvous value and settles the handoff flags.
  /// Caller holds the guard and has verified `pending_ready && !pending_taken`.
  fn take_rendezvous(&self, meta: &mut Meta) -> T {
    meta.pending_ready = false;
    if meta.pending_detached {
      // No parked sender will come back to free the slot.
      meta.pending_detached = false;
      meta.pending_taken = false;
    } else {
      meta.pending_taken = true;
    }
    // Safety: guard held; the flags guaranteed a published value.
    let value = unsafe { self.take_pending() };
    self.not_full.notify_all();
    meta.notify_select_waiters();
    telemetry::log_event(None, LOC_RECV, EVT_HANDOFF_TAKEN, None);
    match value {
      Some(v) => v,
      None => unreachable!("rendezvous slot empty while flagged ready"),
    }
  }

  // --- Blocking Operations ---

  /// Deposits `value`, parking until space or a receiver is available.
  /// Fails only when the channel is closed, returning the value.
  pub(crate) fn send(&self, value: T) -> Result<(), SendError<T>> {
    let mut meta = self.meta.lock();
    if meta.closed {
      return Err(SendError(value));
    }

    if self.capacity > 0 {
      while meta.count == self.capacity && !meta.closed {
        telemetry::increment_counter(LOC_SEND, CTR_SENDER_PARKS);
        telemetry::log_event(None, LOC_SEND, EVT_PARK_FULL, None);
        self.not_full.wait(&mut meta);
      }
      if meta.closed {
        return Err(SendError(value));
      }
      // Safety: guard held; the loop exits with count < capacity.
      unsafe { self.push_slot(&mut meta, value) };
      self.not_empty.notify_all();
      meta.notify_select_waiters();
      Ok(())
    } else {
      // Claim the handoff slot. A second sender must not clobber a handoff
      // whose original sender has not yet observed the take.
      while (meta.pending_ready || meta.pending_taken) && !meta.closed {
        telemetry::increment_counter(LOC_SEND, CTR_SENDER_PARKS);
        self.not_full.wait(&mut meta);
      }
      if meta.closed {
        return Err(SendError(value));
      }
      // Safety: guard held; the loop exits with the slot free.
      unsafe { self.put_pending(value) };
      meta.pending_ready = true;
      meta.pending_taken = false;
      meta.pending_detached = false;
      self.not_empty.notify_all();
      meta.notify_select_waiters();
      telemetry::log_event(None, LOC_SEND, EVT_PUBLISH, None);

      while !meta.pending_taken && !meta.closed {
        telemetry::increment_counter(LOC_SEND, CTR_SENDER_PARKS);
        self.not_full.wait(&mut meta);
      }
      if meta.pending_taken {
        // The receiver cleared `pending_ready` when it took the value.
        debug_assert!(!meta.pending_ready);
        meta.pending_taken = false;
        self.not_full.notify_all();
        Ok(())
      } else {
        // Closed while parked and nobody took the value; reclaim it.
        meta.pending_ready = false;
        let residue = unsafe { self.take_pending() };
        self.not_full.notify_all();
        match residue {
          Some(v) => Err(SendError(v)),
          None => unreachable!("rendezvous slot drained without the take flag set"),
        }
      }
    }
  }

  /// Takes the next value, parking until one arrives. Returns `None` once
  /// the channel is closed and drained.
  pub(crate) fn recv(&self) -> Option<T> {
    let mut meta = self.meta.lock();

    if self.capacity > 0 {
      while meta.count == 0 && !meta.closed {
        telemetry::increment_counter(LOC_RECV, CTR_RECEIVER_PARKS);
        telemetry::log_event(None, LOC_RECV, EVT_PARK_EMPTY, None);
        self.not_empty.wait(&mut meta);
      }
      if meta.count == 0 {
        return None;
      }
      // Safety: guard held; count > 0.
      let value = unsafe { self.pop_slot(&mut meta) };
      self.not_full.notify_all();
      meta.notify_select_waiters();
      Some(value)
    } else {
      meta.waiting_receivers += 1;
      // Senders polling readiness may now see a receiver present.
      meta.notify_select_waiters();
      while !meta.pending_ready && !meta.closed {
        telemetry::increment_counter(LOC_RECV, CTR_RECEIVER_PARKS);
        self.not_empty.wait(&mut meta);
      }
      meta.waiting_receivers -= 1;
      if meta.pending_ready && !meta.pending_taken {
        Some(self.take_rendezvous(&mut meta))
      } else {
        None
      }
    }
  }

  // --- Non-blocking Operations ---

  /// Deposits `value` only if that can complete without parking.
  pub(crate) fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
    let mut meta = self.meta.lock();
    if meta.closed {
      return Err(TrySendError::Closed(value));
    }

    if self.capacity > 0 {
      if meta.count == self.capacity {
        return Err(TrySendError::Full(value));
      }
      // Safety: guard held; count < capacity.
      unsafe { self.push_slot(&mut meta, value) };
      self.not_empty.notify_all();
      meta.notify_select_waiters();
      Ok(())
    } else if meta.waiting_receivers > 0 && !meta.pending_ready && !meta.pending_taken {
      // A parked receiver will take this; nobody stays behind to free the
      // slot, so mark the publish detached.
      // Safety: guard held; slot verified free.
      unsafe { self.put_pending(value) };
      meta.pending_ready = true;
      meta.pending_taken = false;
      meta.pending_detached = true;
      self.not_empty.notify_all();
      meta.notify_select_waiters();
      telemetry::log_event(None, LOC_SEND, EVT_PUBLISH, None);
      Ok(())
    } else {
      Err(TrySendError::Full(value))
    }
  }

  /// Takes a value only if one is available right now.
  pub(crate) fn try_recv(&self) -> Result<T, TryRecvError> {
    let mut meta = self.meta.lock();

    if self.capacity > 0 && meta.count > 0 {
      // Safety: guard held; count > 0.
      let value = unsafe { self.pop_slot(&mut meta) };
      self.not_full.notify_all();
      meta.notify_select_waiters();
      return Ok(value);
    }
    if self.capacity == 0 && meta.pending_ready && !meta.pending_taken {
      return Ok(self.take_rendezvous(&mut meta));
    }
    if meta.closed {
      Err(TryRecvError::Closed)
    } else {
      Err(TryRecvError::Empty)
    }
  }

  // --- Timed Operations ---

  /// As `send`, but parks with an absolute deadline. A timed-out or closed
  /// send returns the value.
  pub(crate) fn send_timeout(
    &self,
    value: T,
    timeout: Duration,
  ) -> Result<(), SendTimeoutError<T>> {
    let deadline = Instant::now() + timeout;
    let mut meta = self.meta.lock();

    if self.capacity > 0 {
      loop {
        if meta.closed {
          return Err(SendTimeoutError::Closed(value));
        }
        if meta.count < self.capacity {
          break;
        }
        if self.not_full.wait_until(&mut meta, deadline).timed_out()
          && meta.count == self.capacity
          && !meta.closed
        {
          return Err(SendTimeoutError::Timeout(value));
        }
      }
      // Safety: guard held; count < capacity.
      unsafe { self.push_slot(&mut meta, value) };
      self.not_empty.notify_all();
      meta.notify_select_waiters();
      Ok(())
    } else {
      // Claim the handoff slot within the deadline.
      loop {
        if meta.closed {
          return Err(SendTimeoutError::Closed(value));
        }
        if !meta.pending_ready && !meta.pending_taken {
          break;
        }
        if self.not_full.wait_until(&mut meta, deadline).timed_out()
          && (meta.pending_ready || meta.pending_taken)
          && !meta.closed
        {
          return Err(SendTimeoutError::Timeout(value));
        }
      }
      // Safety: guard held; slot verified free.
      unsafe { self.put_pending(value) };
      meta.pending_ready = true;
      meta.pending_taken = false;
      meta.pending_detached = false;
      self.not_empty.notify_all();
      meta.notify_select_waiters();
      telemetry::log_event(None, LOC_SEND, EVT_PUBLISH, None);

      loop {
        if meta.pending_taken {
          debug_assert!(!meta.pending_ready);
          meta.pending_taken = false;
          self.not_full.notify_all();
          return Ok(());
        }
        if meta.closed {
          meta.pending_ready = false;
          let residue = unsafe { self.take_pending() };
          self.not_full.notify_all();
          return match residue {
            Some(v) => Err(SendTimeoutError::Closed(v)),
            None => unreachable!("rendezvous slot drained without the take flag set"),
          };
        }
        if self.not_full.wait_until(&mut meta, deadline).timed_out() && !meta.pending_taken {
          if meta.closed {
            // Settled at the loop top as the closed outcome.
            continue;
          }
          // Withdraw the published value and hand it back.
          meta.pending_ready = false;
          let residue = unsafe { self.take_pending() };
          self.not_full.notify_all();
          return match residue {
            Some(v) => Err(SendTimeoutError::Timeout(v)),
            None => unreachable!("rendezvous slot drained without the take flag set"),
          };
        }
      }
    }
  }

  /// As `recv`, but parks with an absolute deadline.
  pub(crate) fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
    let deadline = Instant::now() + timeout;
    let mut meta = self.meta.lock();

    if self.capacity > 0 {
      loop {
        if meta.count > 0 {
          break;
        }
        if meta.closed {
          return Err(RecvTimeoutError::Closed);
        }
        if self.not_empty.wait_until(&mut meta, deadline).timed_out() && meta.count == 0 {
          return if meta.closed {
            Err(RecvTimeoutError::Closed)
          } else {
            Err(RecvTimeoutError::Timeout)
          };
        }
      }
      // Safety: guard held; count > 0.
      let value = unsafe { self.pop_slot(&mut meta) };
      self.not_full.notify_all();
      meta.notify_select_waiters();
      Ok(value)
    } else {
      meta.waiting_receivers += 1;
      meta.notify_select_waiters();
      loop {
        if meta.pending_ready && !meta.pending_taken {
          meta.waiting_receivers -= 1;
          return Ok(self.take_rendezvous(&mut meta));
        }
        if meta.closed {
          meta.waiting_receivers -= 1;
          return Err(RecvTimeoutError::Closed);
        }
        if self.not_empty.wait_until(&mut meta, deadline).timed_out() {
          if meta.pending_ready && !meta.pending_taken {
            meta.waiting_receivers -= 1;
            return Ok(self.take_rendezvous(&mut meta));
          }
          meta.waiting_receivers -= 1;
          return if meta.closed {
            Err(RecvTimeoutError::Closed)
          } else {
            Err(RecvTimeoutError::Timeout)
          };
        }
      }
    }
  }

  // --- Close & Observers ---

  /// Marks the channel closed and wakes everything parked on it. Idempotent;
  /// returns whether this call performed the transition.
  pub(crate) fn close(&self) -> bool {
    let mut meta = self.meta.lock();
    if meta.closed {
      return false;
    }
    meta.closed = true;
    self.not_empty.notify_all();
    self.not_full.notify_all();
    meta.notify_select_waiters();
    telemetry::log_event(None, LOC_CLOSE, EVT_CLOSED, None);
    true
  }

  pub(crate) fn is_closed(&self) -> bool {
    self.meta.lock().closed
  }

  /// Number of buffered values. Always `0` for a rendezvous channel; an
  /// in-flight handoff is not counted.
  pub(crate) fn len(&self) -> usize {
    self.meta.lock().count
  }

  pub(crate) fn capacity(&self) -> usize {
    self.capacity
  }

  #[cfg(test)]
  pub(crate) fn select_waiter_count(&self) -> usize {
    self.meta.lock().select_waiters.len()
  }
}

impl<T: Send> SelectTarget for ChannelCore<T> {
  fn meta(&self) -> &Mutex<Meta> {
    &self.meta
  }

  fn capacity(&self) -> usize {
    self.capacity
  }
}

impl<T: Send> Drop for ChannelCore<T> {
  fn drop(&mut self) {
    // The last handle is gone; drop residual values exactly once.
    let meta = self.meta.get_mut();
    if self.capacity > 0 {
      for offset in 0..meta.count {
        let index = (meta.head + offset) % self.capacity;
        // Safety: slots in [head, head + count) hold initialized values and
        // this is the only remaining owner.
        unsafe { ptr::drop_in_place((*self.slots[index].get()).as_mut_ptr()) };
      }
      meta.count = 0;
    }
    // A published handoff that was never taken is dropped here.
    drop(self.pending.get_mut().take());
  }
}
