// src/channel/mod.rs

//! Typed channels carrying values between threads.
//!
//! A [`Channel`] is a cloneable handle to shared channel state. Any number
//! of handles may coexist; producers and consumers call operations on any of
//! them from any thread, and the state is destroyed when the last handle is
//! dropped. Values deposited into a channel are *moved*: the channel owns a
//! value while it is buffered, receipt transfers ownership to the receiver,
//! and anything still buffered when the last handle drops is dropped exactly
//! once.
//!
//! An **unbuffered** channel (capacity `0`) is a rendezvous point: a send
//! and a receive complete only in pairs. A **buffered** channel enqueues up
//! to `capacity` values in FIFO order.
//!
//! # Examples
//!
//! Rendezvous between two threads:
//!
//! ```
//! use conduit::Channel;
//! use std::thread;
//!
//! let ch = Channel::new();
//! let sender = ch.clone();
//! let handle = thread::spawn(move || sender.send(42));
//!
//! assert_eq!(ch.recv(), Some(42));
//! handle.join().unwrap().unwrap();
//! ```
//!
//! Buffered FIFO with close-and-drain:
//!
//! ```
//! use conduit::Channel;
//!
//! let ch = Channel::buffered(3);
//! for i in 0..3 {
//!   ch.send(i).unwrap();
//! }
//! ch.close();
//!
//! // Residue drains after close, then the channel reports exhaustion.
//! assert_eq!(ch.recv(), Some(0));
//! assert_eq!(ch.recv(), Some(1));
//! assert_eq!(ch.recv(), Some(2));
//! assert_eq!(ch.recv(), None);
//! ```
//!
//! A failed send hands the value back instead of dropping it:
//!
//! ```
//! use conduit::Channel;
//!
//! let ch = Channel::buffered(1);
//! ch.close();
//! let err = ch.send("payload").unwrap_err();
//! assert_eq!(err.into_inner(), "payload");
//! ```

// Re-export the channel's error vocabulary alongside the handle.
pub use crate::error::{
  RecvTimeoutError, SendError, SendTimeoutError, TryRecvError, TrySendError,
};

pub(crate) mod core;


use self::core::ChannelCore;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A cloneable handle to a typed channel.
///
/// All clones share one underlying channel; the channel is destroyed when
/// the last clone is dropped. `Channel<T>` is `Send + Sync` for any
/// `T: Send`, so handles move freely across threads.
pub struct Channel<T: Send> {
  core: Arc<ChannelCore<T>>,
}

impl<T: Send> Channel<T> {
  /// Creates an unbuffered rendezvous channel: every send completes only
  /// when paired with a receive.
  pub fn new() -> Self {
    Channel {
      core: Arc::new(ChannelCore::new(0)),
    }
  }

  /// Creates a buffered channel holding up to `capacity` values.
  ///
  /// A capacity of `0` is equivalent to [`Channel::new`].
  pub fn buffered(capacity: usize) -> Self {
    Channel {
      core: Arc::new(ChannelCore::new(capacity)),
    }
  }

  /// Deposits `value`, blocking the current thread until the channel has
  /// space (buffered) or a receiver takes the value (rendezvous).
  ///
  /// Fails only when the channel is closed; the undelivered value is
  /// returned inside the error.
  pub fn send(&self, value: T) -> Result<(), SendError<T>> {
    self.core.send(value)
  }

  /// Takes the next value, blocking the current thread until one is
  /// available. Returns `None` once the channel is closed and drained.
  pub fn recv(&self) -> Option<T> {
    self.core.recv()
  }

  /// Deposits `value` without blocking.
  ///
  /// On a rendezvous channel this succeeds only when a blocking receiver is
  /// already parked; the parked receiver will take the value.
  pub fn try_send(&self, value: T) -> Result<(), TrySendError<T>> {
    self.core.try_send(value)
  }

  /// Takes a value without blocking.
  pub fn try_recv(&self) -> Result<T, TryRecvError> {
    self.core.try_recv()
  }

  /// As [`Channel::send`], but gives up once `timeout` has elapsed. The
  /// value is returned inside the error on both timeout and close.
  pub fn send_timeout(&self, value: T, timeout: Duration) -> Result<(), SendTimeoutError<T>> {
    self.core.send_timeout(value, timeout)
  }

  /// As [`Channel::recv`], but gives up once `timeout` has elapsed.
  pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
    self.core.recv_timeout(timeout)
  }

  /// Closes the channel: all subsequent and parked sends fail, receives
  /// drain the residue and then report exhaustion, and every parked thread
  /// and select waiter is woken.
  ///
  /// Idempotent and callable from any handle; returns `true` only for the
  /// call that performed the transition.
  pub fn close(&self) -> bool {
    self.core.close()
  }

  /// Whether the channel has been closed. Monotonic: once this returns
  /// `true` it never returns `false` again.
  pub fn is_closed(&self) -> bool {
    self.core.is_closed()
  }

  /// Number of values currently buffered. Always `0` for a rendezvous
  /// channel.
  pub fn len(&self) -> usize {
    self.core.len()
  }

  /// Whether the buffer currently holds no values.
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Whether the buffer is at capacity. A rendezvous channel is always
  /// "full" in this sense; use [`Channel::try_send`] to probe for a waiting
  /// receiver.
  pub fn is_full(&self) -> bool {
    self.len() == self.capacity()
  }

  /// The channel's capacity. `0` means unbuffered.
  pub fn capacity(&self) -> usize {
    self.core.capacity()
  }

  pub(crate) fn core(&self) -> &ChannelCore<T> {
    &self.core
  }

  #[cfg(test)]
  pub(crate) fn select_waiter_count(&self) -> usize {
    self.core.select_waiter_count()
  }
}

impl<T: Send> Default for Channel<T> {
  /// Equivalent to [`Channel::new`].
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Send> Clone for Channel<T> {
  /// Returns another handle to the same channel.
  fn clone(&self) -> Self {
    Channel {
      core: Arc::clone(&self.core),
    }
  }
}

impl<T: Send> fmt::Debug for Channel<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Channel")
      .field("capacity", &self.capacity())
      .field("len", &self.len())
      .field("closed", &self.is_closed())
      .finish()
  }
}
