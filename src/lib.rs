#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

//! Typed, first-class communication channels for cooperating threads.
//!
//! Conduit provides Go-style channels: unbuffered rendezvous and bounded
//! buffered channels with blocking, non-blocking, and timeout-bounded
//! operations, plus a [`select`] primitive that arbitrates among several
//! pending communications across channels of different element types.
//!
//! The runtime is thread-based: blocking operations park the calling OS
//! thread on the channel's condition variables, and `close` wakes every
//! parked sender, receiver, and select waiter.
//!
//! ```
//! use conduit::Channel;
//! use std::thread;
//!
//! let jobs = Channel::buffered(8);
//! let worker = {
//!   let jobs = jobs.clone();
//!   thread::spawn(move || {
//!     let mut sum = 0u64;
//!     while let Some(n) = jobs.recv() {
//!       sum += n;
//!     }
//!     sum
//!   })
//! };
//!
//! for n in 1..=10u64 {
//!   jobs.send(n).unwrap();
//! }
//! jobs.close();
//! assert_eq!(worker.join().unwrap(), 55);
//! ```

pub mod channel;
pub mod error;
pub mod select;
pub mod telemetry;

// Public re-exports for convenience.
pub use channel::Channel;
pub use error::{RecvTimeoutError, SendError, SendTimeoutError, TryRecvError, TrySendError};
pub use select::{select_poll, select_wait, SelectCase};
