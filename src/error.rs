// src/error.rs

use core::fmt;

// Implements `into_inner`, `Display` and `Error` for the value-carrying error
// enums so each variant hands the undelivered value back to the caller.
macro_rules! impl_error_for_enum_with_inner {
    (
        $enum_name:ident < $generic_param:ident >,
        $($variant:ident ( $message:expr ) ),+
        $(,)?
    ) => {
        impl<$generic_param> $enum_name<$generic_param> {
            /// Consumes the error, returning the value that was not delivered.
            #[inline]
            pub fn into_inner(self) -> $generic_param {
                match self {
                    $( $enum_name::$variant(v) => v, )+
                }
            }
        }

        impl<$generic_param> fmt::Display for $enum_name<$generic_param> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $( $enum_name::$variant(_) => f.write_str($message), )+
                }
            }
        }

        impl<$generic_param: fmt::Debug> std::error::Error for $enum_name<$generic_param> {}
    };
}

/// Error returned by a blocking `send` against a closed channel.
///
/// The undelivered value is handed back to the caller rather than dropped.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct SendError<T>(pub T);

impl<T> SendError<T> {
  /// Consumes the error, returning the value that was not delivered.
  #[inline]
  pub fn into_inner(self) -> T {
    self.0
  }
}

impl<T> fmt::Debug for SendError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "SendError(..)")
  }
}

impl<T> fmt::Display for SendError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("channel closed")
  }
}

impl<T: fmt::Debug> std::error::Error for SendError<T> {}

/// Error returned by `try_send` when the value could not be deposited
/// immediately. The value being sent is returned in either variant.
#[derive(PartialEq, Eq, Clone, Copy)]
pub enum TrySendError<T> {
  /// The channel has no space (buffered) or no waiting receiver (rendezvous).
  Full(T),
  /// The channel is closed.
  Closed(T),
}

impl<T> fmt::Debug for TrySendError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TrySendError::Full(_) => write!(f, "TrySendError::Full(..)"),
      TrySendError::Closed(_) => write!(f, "TrySendError::Closed(..)"),
    }
  }
}

impl_error_for_enum_with_inner!(
  TrySendError<T>,
  Full("channel full"),
  Closed("channel closed"),
);

/// Error returned by `try_recv` when no value could be taken immediately.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TryRecvError {
  /// No value is available right now, but the channel is still open.
  Empty,
  /// The channel is closed and fully drained.
  Closed,
}

impl std::error::Error for TryRecvError {}
impl fmt::Display for TryRecvError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      TryRecvError::Empty => write!(f, "channel empty"),
      TryRecvError::Closed => write!(f, "channel closed and drained"),
    }
  }
}

/// Error returned by `send_timeout`. The value being sent is returned in
/// either variant.
#[derive(PartialEq, Eq, Clone, Copy)]
pub enum SendTimeoutError<T> {
  /// The deadline elapsed before the value could be deposited.
  Timeout(T),
  /// The channel is closed.
  Closed(T),
}

impl<T> fmt::Debug for SendTimeoutError<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SendTimeoutError::Timeout(_) => write!(f, "SendTimeoutError::Timeout(..)"),
      SendTimeoutError::Closed(_) => write!(f, "SendTimeoutError::Closed(..)"),
    }
  }
}

impl_error_for_enum_with_inner!(
  SendTimeoutError<T>,
  Timeout("send operation timed out"),
  Closed("channel closed"),
);

/// Error returned by `recv_timeout`.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum RecvTimeoutError {
  /// The deadline elapsed before a value arrived.
  Timeout,
  /// The channel is closed and fully drained.
  Closed,
}

impl std::error::Error for RecvTimeoutError {}
impl fmt::Display for RecvTimeoutError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RecvTimeoutError::Timeout => write!(f, "receive operation timed out"),
      RecvTimeoutError::Closed => write!(f, "channel closed and drained"),
    }
  }
}
