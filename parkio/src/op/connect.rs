use std::{
  future::Future,
  net::SocketAddr,
  os::fd::RawFd,
  pin::Pin,
  task::{Context, Poll},
};

use crate::{
  error::{Error, Result},
  outcome::{Direction, Outcome},
  table::IoTable,
};

/// Connection-establishment state machine.
///
/// Unlike the readiness loop, `Retry` here means "reissue the call", not
/// "the descriptor is unready": the attempt is restarted from scratch after
/// a cooperative yield, giving other tasks a turn without waiting on an I/O
/// event. `InProgress` parks the task on write-readiness; once that fires,
/// the socket is connected by definition and no secondary verification is
/// performed at this layer.
///
/// The parked state resolves on the next poll, which assumes the future is
/// driven directly by its registered wake. Polled through a multiplexing
/// combinator it could observe a spurious poll and report established
/// before readiness actually fired.
pub(crate) struct Connect<'a, T: ?Sized> {
  table: &'a T,
  addr: SocketAddr,
  state: State,
}

enum State {
  Attempt,
  Parked(RawFd),
}

impl<'a, T> Connect<'a, T>
where
  T: IoTable + ?Sized,
{
  pub(crate) fn new(table: &'a T, addr: SocketAddr) -> Self {
    Self { table, addr, state: State::Attempt }
  }
}

impl<'a, T> Future for Connect<'a, T>
where
  T: IoTable + ?Sized,
{
  type Output = Result<RawFd>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();

    match this.state {
      State::Parked(fd) => {
        #[cfg(feature = "tracing")]
        tracing::trace!(fd, "write-readiness fired, connection established");
        Poll::Ready(Ok(fd))
      }
      State::Attempt => match this.table.connect(this.addr) {
        Outcome::Completed(fd) => Poll::Ready(Ok(fd)),
        Outcome::Abort(errno) => Poll::Ready(Err(Error::from_errno(errno))),
        Outcome::InProgress(fd) => {
          #[cfg(feature = "tracing")]
          tracing::trace!(fd, "connect in progress, parking on write-readiness");
          this.state = State::Parked(fd);
          this.table.register(fd, Direction::Write, cx.waker());
          Poll::Pending
        }
        Outcome::Retry => {
          // Fairness yield: hand the carrier back to the scheduler and run
          // the whole attempt again on the next poll.
          cx.waker().wake_by_ref();
          Poll::Pending
        }
      },
    }
  }
}
