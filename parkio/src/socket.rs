use std::{
  net::SocketAddr,
  time::{Duration, Instant},
};

use crate::{
  error::{Error, Result},
  handle::{Handle, OwnerId},
  op::{retry_on_ready, Connect},
  outcome::Direction,
  table::{IoTable, ListenOpts},
};

/// Creates a listening socket per `opts`.
///
/// The bound address is captured at creation, so binding to port 0 and then
/// asking the listener where it landed works as expected.
///
/// # Examples
///
/// ```rust
/// use parkio::{listen, ListenOpts};
/// use parkio::test_utils::PollTable;
///
/// let table = PollTable::new();
/// let listener = listen(&table, ListenOpts::default()).unwrap();
/// assert_ne!(listener.local_addr().port(), 0);
/// ```
pub fn listen<T>(table: &T, opts: ListenOpts) -> Result<Listener<'_, T>>
where
  T: IoTable + ?Sized,
{
  let (fd, local_addr) =
    table.listen(&opts).map_err(Error::from_errno)?;

  #[cfg(feature = "tracing")]
  tracing::debug!(fd, %local_addr, "listener created");

  Ok(Listener { table, handle: Handle::new(fd), local_addr })
}

/// Connects to `addr`, suspending the calling task until the connection is
/// established or refused.
///
/// Once the table reports the descriptor write-ready, the connection is
/// treated as established; a peer that actually refused or vanished shows up
/// on the first transfer instead.
///
/// # Examples
///
/// ```rust,no_run
/// use parkio::{connect, IoTable, Socket};
///
/// async fn dial<T: IoTable>(table: &T) -> parkio::Result<Socket<'_, T>> {
///   connect(table, "127.0.0.1:9000".parse().unwrap()).await
/// }
/// ```
pub async fn connect<T>(table: &T, addr: SocketAddr) -> Result<Socket<'_, T>>
where
  T: IoTable + ?Sized,
{
  let fd = Connect::new(table, addr).await?;

  #[cfg(feature = "tracing")]
  tracing::debug!(fd, %addr, "connected");

  Ok(Socket { table, handle: Handle::new(fd) })
}

/// A listening socket bound to a local address.
///
/// Accepting suspends the calling task until a connection is pending, so a
/// straightforward `loop { listener.accept(None).await }` reads like a
/// blocking server without ever blocking the carrier thread.
pub struct Listener<'t, T: IoTable + ?Sized> {
  table: &'t T,
  handle: Handle,
  local_addr: SocketAddr,
}

impl<T: IoTable + ?Sized> std::fmt::Debug for Listener<'_, T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Listener")
      .field("handle", &self.handle)
      .field("local_addr", &self.local_addr)
      .finish_non_exhaustive()
  }
}

impl<'t, T> Listener<'t, T>
where
  T: IoTable + ?Sized,
{
  /// The address this listener actually bound.
  pub fn local_addr(&self) -> SocketAddr {
    self.local_addr
  }

  pub fn handle(&self) -> &Handle {
    &self.handle
  }

  /// Accepts one pending connection, waiting for up to `timeout` if none is
  /// queued. `None` waits indefinitely.
  ///
  /// Returns the connected socket together with the peer's address.
  pub async fn accept(
    &self,
    timeout: Option<Duration>,
  ) -> Result<(Socket<'t, T>, SocketAddr)> {
    let fd = self.handle.fd();
    let deadline = timeout.map(|t| Instant::now() + t);
    let (peer_fd, peer_addr) = retry_on_ready(
      self.table,
      &self.handle,
      Direction::Read,
      deadline,
      move |table: &T| table.accept(fd),
    )
    .await?;

    #[cfg(feature = "tracing")]
    tracing::debug!(fd = peer_fd, %peer_addr, "accepted");

    Ok((Socket { table: self.table, handle: Handle::new(peer_fd) }, peer_addr))
  }

  /// Closes the listener. Tasks suspended in [`accept`](Listener::accept)
  /// resume with [`Error::Closed`], and so does every later call.
  pub fn close(&self) {
    // Only the first transition reaches the table: the fd number may have
    // been handed to someone else by the time a second close arrives.
    if self.handle.mark_closed() {
      self.table.close(self.handle.fd());
    }
  }
}

impl<T: IoTable + ?Sized> Drop for Listener<'_, T> {
  fn drop(&mut self) {
    if self.handle.mark_closed() {
      self.table.close(self.handle.fd());
    }
  }
}

/// A connected socket.
///
/// All transfer operations run "as if blocking": the call returns once the
/// transfer made progress, suspending the task in between instead of
/// spinning or blocking the thread.
pub struct Socket<'t, T: IoTable + ?Sized> {
  table: &'t T,
  handle: Handle,
}

impl<'t, T> Socket<'t, T>
where
  T: IoTable + ?Sized,
{
  pub fn handle(&self) -> &Handle {
    &self.handle
  }

  /// Receives into `buf`, suspending until at least one byte arrives or the
  /// optional `timeout` expires.
  ///
  /// A peer that shut its end down is reported as [`Error::Closed`], and the
  /// handle is poisoned so every subsequent operation answers the same.
  pub async fn recv(
    &self,
    buf: &mut [u8],
    timeout: Option<Duration>,
  ) -> Result<usize> {
    let fd = self.handle.fd();
    let deadline = timeout.map(|t| Instant::now() + t);
    let n = retry_on_ready(
      self.table,
      &self.handle,
      Direction::Read,
      deadline,
      move |table: &T| table.read(fd, &mut *buf),
    )
    .await?;

    if n == 0 {
      // Zero-length read is the peer's shutdown. Tear our side down too, so
      // the caller cannot keep reading a dead connection.
      self.close();
      return Err(Error::Closed);
    }

    #[cfg(feature = "tracing")]
    tracing::trace!(fd, n, "received");

    Ok(n)
  }

  /// Sends as much of `buf` as the socket accepts in one transfer,
  /// suspending until at least one byte is taken. Returns the number of
  /// bytes written, which may be less than `buf.len()`; callers that need
  /// the whole payload delivered reissue with the remainder.
  pub async fn send(&self, buf: &[u8]) -> Result<usize> {
    let fd = self.handle.fd();
    let n = retry_on_ready(
      self.table,
      &self.handle,
      Direction::Write,
      None,
      move |table: &T| table.write(fd, buf),
    )
    .await?;

    #[cfg(feature = "tracing")]
    tracing::trace!(fd, n, "sent");

    Ok(n)
  }

  /// Closes the socket. Idempotent; tasks suspended on this handle resume
  /// with [`Error::Closed`].
  pub fn close(&self) {
    // Only the first transition reaches the table: the fd number may have
    // been handed to someone else by the time a second close arrives.
    if self.handle.mark_closed() {
      self.table.close(self.handle.fd());
    }
  }

  /// The task currently recorded as owning this socket.
  pub fn owner(&self) -> OwnerId {
    self.handle.owner()
  }

  /// Records `new_owner` as the owning task.
  ///
  /// This is bookkeeping only for now: the recorded owner is not consulted
  /// by any operation, and a handoff while an operation is suspended leaves
  /// that operation attached to the old task's waker.
  // TODO: fence in-flight operations once the scheduler exposes a way to
  // cancel a task's pending registrations on handoff.
  pub fn transfer_ownership(&self, new_owner: OwnerId) -> Result<()> {
    self.handle.set_owner(new_owner);
    Ok(())
  }
}

impl<T: IoTable + ?Sized> Drop for Socket<'_, T> {
  fn drop(&mut self) {
    if self.handle.mark_closed() {
      self.table.close(self.handle.fd());
    }
  }
}
