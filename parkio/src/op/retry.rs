use std::{
  future::Future,
  pin::Pin,
  task::{Context, Poll},
  time::Instant,
};

use crate::{
  error::{Error, Result},
  handle::Handle,
  outcome::{Direction, Outcome},
  table::IoTable,
};

/// Builds the readiness-driven retry future shared by accept, recv and send.
///
/// `attempt` is reissued against the same handle every time the task is
/// woken, until it stops answering `Retry`. Suspension is mandatory between
/// attempts: the only way out of a `Retry` is to arm a registration and
/// return `Pending`, never to spin in place.
pub(crate) fn retry_on_ready<'a, T, F, R>(
  table: &'a T,
  handle: &'a Handle,
  direction: Direction,
  deadline: Option<Instant>,
  attempt: F,
) -> RetryOnReady<'a, T, F>
where
  T: IoTable + ?Sized,
  F: FnMut(&T) -> Outcome<R> + Unpin,
{
  RetryOnReady { table, handle, direction, deadline, attempt }
}

pub(crate) struct RetryOnReady<'a, T: ?Sized, F> {
  table: &'a T,
  handle: &'a Handle,
  direction: Direction,
  deadline: Option<Instant>,
  attempt: F,
}

impl<'a, T, F, R> Future for RetryOnReady<'a, T, F>
where
  T: IoTable + ?Sized,
  F: FnMut(&T) -> Outcome<R> + Unpin,
{
  type Output = Result<R>;

  fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
    let this = self.get_mut();

    // A close racing with a suspended attempt must win: the flag is checked
    // before every attempt, so a resume after teardown surfaces `Closed`
    // instead of a stale result.
    if this.handle.is_closed() {
      return Poll::Ready(Err(Error::Closed));
    }

    match (this.attempt)(this.table) {
      Outcome::Completed(value) => Poll::Ready(Ok(value)),
      Outcome::Abort(errno) => Poll::Ready(Err(Error::from_errno(errno))),
      Outcome::InProgress(_) => {
        panic!("readiness table bug: InProgress outside of connect")
      }
      Outcome::Retry => {
        if let Some(deadline) = this.deadline {
          if Instant::now() >= deadline {
            return Poll::Ready(Err(Error::Timeout));
          }
          this.table.register_timer(deadline, cx.waker());
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(
          fd = this.handle.fd(),
          direction = ?this.direction,
          "parking on readiness"
        );

        this.table.register(this.handle.fd(), this.direction, cx.waker());
        Poll::Pending
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::op::fake::FakeTable;
  use std::{cell::Cell, task::Waker, time::Duration};

  fn poll_once<F: Future + Unpin>(fut: &mut F) -> Poll<F::Output> {
    let waker = Waker::noop();
    let mut cx = Context::from_waker(waker);
    Pin::new(fut).poll(&mut cx)
  }

  #[test]
  fn completed_resolves_without_registration() {
    let table = FakeTable::default();
    let handle = Handle::new(5);
    let mut fut = retry_on_ready(&table, &handle, Direction::Read, None, |_| {
      Outcome::Completed(11usize)
    });

    assert_eq!(poll_once(&mut fut), Poll::Ready(Ok(11)));
    assert!(table.registered.borrow().is_empty());
  }

  #[test]
  fn retry_parks_exactly_once_per_suspension() {
    let table = FakeTable::default();
    let handle = Handle::new(5);
    let attempts = Cell::new(0);
    let mut fut = retry_on_ready(&table, &handle, Direction::Write, None, |_| {
      attempts.set(attempts.get() + 1);
      if attempts.get() < 3 { Outcome::Retry } else { Outcome::Completed(()) }
    });

    assert_eq!(poll_once(&mut fut), Poll::Pending);
    assert_eq!(attempts.get(), 1);
    assert_eq!(table.registered.borrow().as_slice(), &[(5, Direction::Write)]);

    // Each wake runs one attempt and, when still unready, one registration.
    assert_eq!(poll_once(&mut fut), Poll::Pending);
    assert_eq!(attempts.get(), 2);
    assert_eq!(table.registered.borrow().len(), 2);

    assert_eq!(poll_once(&mut fut), Poll::Ready(Ok(())));
    assert_eq!(attempts.get(), 3);
    assert_eq!(table.registered.borrow().len(), 2);
  }

  #[test]
  fn abort_maps_into_the_error_taxonomy() {
    let table = FakeTable::default();
    let handle = Handle::new(6);
    let mut fut = retry_on_ready(&table, &handle, Direction::Read, None, |_| {
      Outcome::<()>::Abort(libc::EMFILE)
    });
    assert_eq!(poll_once(&mut fut), Poll::Ready(Err(Error::SystemLimit)));

    let mut fut = retry_on_ready(&table, &handle, Direction::Read, None, |_| {
      Outcome::<()>::Abort(libc::EPIPE)
    });
    assert_eq!(poll_once(&mut fut), Poll::Ready(Err(Error::Sys(libc::EPIPE))));
  }

  #[test]
  fn closed_handle_short_circuits_the_attempt() {
    let table = FakeTable::default();
    let handle = Handle::new(7);
    handle.mark_closed();

    let mut fut =
      retry_on_ready(&table, &handle, Direction::Read, None, |_| -> Outcome<()> {
        panic!("closed handles must not reach the table")
      });
    assert_eq!(poll_once(&mut fut), Poll::Ready(Err(Error::Closed)));
  }

  #[test]
  fn close_between_polls_turns_resume_into_closed() {
    let table = FakeTable::default();
    let handle = Handle::new(8);
    let mut fut = retry_on_ready(&table, &handle, Direction::Read, None, |_| {
      Outcome::<usize>::Retry
    });

    assert_eq!(poll_once(&mut fut), Poll::Pending);
    handle.mark_closed();
    assert_eq!(poll_once(&mut fut), Poll::Ready(Err(Error::Closed)));
  }

  #[test]
  fn expired_deadline_times_out_after_one_last_attempt() {
    let table = FakeTable::default();
    let handle = Handle::new(9);
    let past = Instant::now() - Duration::from_millis(1);
    let attempts = Cell::new(0);
    let mut fut =
      retry_on_ready(&table, &handle, Direction::Read, Some(past), |_| {
        attempts.set(attempts.get() + 1);
        Outcome::<usize>::Retry
      });

    assert_eq!(poll_once(&mut fut), Poll::Ready(Err(Error::Timeout)));
    // The deadline is consulted only after the attempt answers Retry, so a
    // late readiness at the deadline still wins over the timer.
    assert_eq!(attempts.get(), 1);
    assert!(table.timers.borrow().is_empty());
  }

  #[test]
  fn pending_deadline_arms_a_timer_alongside_readiness() {
    let table = FakeTable::default();
    let handle = Handle::new(10);
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut fut =
      retry_on_ready(&table, &handle, Direction::Read, Some(deadline), |_| {
        Outcome::<usize>::Retry
      });

    assert_eq!(poll_once(&mut fut), Poll::Pending);
    assert_eq!(table.timers.borrow().as_slice(), &[deadline]);
    assert_eq!(table.registered.borrow().as_slice(), &[(10, Direction::Read)]);
  }
}
