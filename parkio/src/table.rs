use std::{
  net::{Ipv4Addr, SocketAddr},
  os::fd::RawFd,
  task::Waker,
  time::Instant,
};

use crate::outcome::{Direction, Outcome};

/// Configuration for [`listen`](crate::listen).
///
/// The defaults match a loopback development server: address and port reuse
/// enabled, a backlog of 128, bound to `127.0.0.1` on an OS-assigned port.
///
/// # Examples
///
/// ```rust
/// use parkio::ListenOpts;
///
/// let opts = ListenOpts::default().port(9000).backlog(64);
/// assert_eq!(opts.backlog, 64);
/// assert_eq!(opts.bind_addr.port(), 9000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenOpts {
  pub reuse_address: bool,
  pub reuse_port: bool,
  pub backlog: i32,
  pub bind_addr: SocketAddr,
}

impl Default for ListenOpts {
  fn default() -> Self {
    Self {
      reuse_address: true,
      reuse_port: true,
      backlog: 128,
      bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
    }
  }
}

impl ListenOpts {
  /// Keeps the configured bind address but replaces its port.
  pub fn port(mut self, port: u16) -> Self {
    self.bind_addr.set_port(port);
    self
  }

  pub fn backlog(mut self, backlog: i32) -> Self {
    self.backlog = backlog;
    self
  }

  pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
    self.bind_addr = addr;
    self
  }

  pub fn reuse_address(mut self, on: bool) -> Self {
    self.reuse_address = on;
    self
  }

  pub fn reuse_port(mut self, on: bool) -> Self {
    self.reuse_port = on;
    self
  }
}

/// The external readiness table every operation in this crate is driven by.
///
/// Implementations own the event demultiplexer (epoll, kqueue, poll, a
/// simulated table in tests) and the non-blocking syscalls themselves. This
/// crate only maps the returned [`Outcome`]s onto suspension and retry; it
/// never touches a descriptor directly.
///
/// # Contract
///
/// - Each attempt method performs exactly one non-blocking attempt and
///   reports it as an [`Outcome`]. `Retry` means "not ready, reissue after
///   readiness"; it must not be returned for hard failures.
/// - [`register`](IoTable::register) arms one readiness notification: the
///   waker is invoked at most once, when `fd` becomes ready in `direction`
///   or when the descriptor is torn down. Suspended operations re-register
///   on every retry.
/// - [`register_timer`](IoTable::register_timer) arms a one-shot wakeup at
///   or shortly after `deadline`.
/// - [`close`](IoTable::close) tears the descriptor down and wakes every
///   registration still pending on it, so suspended operations resume and
///   observe the closed handle. This crate issues at most one close per
///   handle, so implementations need not defend against a second teardown
///   of a descriptor number the OS may already have reused.
pub trait IoTable {
  /// Creates a listening descriptor per `opts` and returns it together with
  /// the address it actually bound (relevant for port 0). Errors are raw
  /// errno values.
  fn listen(&self, opts: &ListenOpts) -> Result<(RawFd, SocketAddr), i32>;

  /// Starts one non-blocking connection attempt towards `addr`.
  ///
  /// `Completed(fd)` means the connection finished synchronously (common on
  /// loopback). `InProgress(fd)` means the descriptor exists but the caller
  /// must wait for write-readiness. `Retry` means the attempt should be
  /// reissued from scratch after a cooperative yield; any descriptor created
  /// for it has already been discarded.
  fn connect(&self, addr: SocketAddr) -> Outcome<RawFd>;

  /// One non-blocking accept attempt against a listening descriptor.
  fn accept(&self, fd: RawFd) -> Outcome<(RawFd, SocketAddr)>;

  /// One non-blocking read attempt into `buf`. `Completed(0)` reports peer
  /// shutdown.
  fn read(&self, fd: RawFd, buf: &mut [u8]) -> Outcome<usize>;

  /// One non-blocking write attempt of `buf`. Partial writes are reported
  /// as-is.
  fn write(&self, fd: RawFd, buf: &[u8]) -> Outcome<usize>;

  /// Tears down `fd` and wakes its pending registrations.
  fn close(&self, fd: RawFd);

  /// Arms a one-shot readiness notification for `fd` in `direction`.
  fn register(&self, fd: RawFd, direction: Direction, waker: &Waker);

  /// Arms a one-shot wakeup at `deadline`.
  fn register_timer(&self, deadline: Instant, waker: &Waker);
}
