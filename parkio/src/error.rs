use std::{fmt, io};

/// Result alias used by every public socket operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure taxonomy for socket operations.
///
/// The set is deliberately open-ended: anything the OS reports that has no
/// dedicated variant arrives as [`Error::Sys`] carrying the raw errno, so
/// callers can match on the known variants and still observe new
/// system-level failures.
///
/// Every variant is terminal for the call that returned it. Readiness-driven
/// retries are absorbed inside the operation and never surface here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
  /// The handle was torn down, or the peer shut the connection down
  /// (observed as a zero-length read).
  Closed,
  /// The operation's deadline expired before the descriptor became ready.
  Timeout,
  /// The OS refused the operation due to resource exhaustion
  /// (`EMFILE`, `ENFILE`, `ENOBUFS`, `ENOMEM`).
  SystemLimit,
  /// Any other OS-level failure, as a raw errno value.
  Sys(i32),
}

impl Error {
  /// Folds a raw errno into the taxonomy.
  pub(crate) fn from_errno(errno: i32) -> Self {
    match errno {
      libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM => {
        Self::SystemLimit
      }
      errno => Self::Sys(errno),
    }
  }

  /// Raw errno for [`Error::Sys`], `None` for the named variants.
  pub fn raw_os_error(&self) -> Option<i32> {
    match self {
      Self::Sys(errno) => Some(*errno),
      _ => None,
    }
  }
}

impl fmt::Display for Error {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Closed => f.write_str("socket closed"),
      Self::Timeout => f.write_str("operation timed out"),
      Self::SystemLimit => f.write_str("system resource limit reached"),
      Self::Sys(errno) => {
        write!(f, "os error: {}", io::Error::from_raw_os_error(*errno))
      }
    }
  }
}

impl std::error::Error for Error {}

impl From<Error> for io::Error {
  fn from(err: Error) -> Self {
    match err {
      Error::Closed => io::ErrorKind::ConnectionAborted.into(),
      Error::Timeout => io::ErrorKind::TimedOut.into(),
      Error::SystemLimit => io::Error::from_raw_os_error(libc::EMFILE),
      Error::Sys(errno) => io::Error::from_raw_os_error(errno),
    }
  }
}
