//! A `poll(2)`-backed readiness table and a single-future executor, for
//! exercising the socket layer against real loopback traffic.
//!
//! This is test support, not a production driver: registrations live in a
//! mutex-guarded vec and every waiter re-polls the whole set. It is the
//! smallest honest implementation of the [`IoTable`] contract.

use std::{
  future::Future,
  mem,
  net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6},
  os::fd::RawFd,
  pin::pin,
  sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
  },
  task::{Context, Poll, Wake, Waker},
  time::{Duration, Instant},
};

use crate::{
  outcome::{Direction, Outcome},
  table::{IoTable, ListenOpts},
};

struct Registration {
  fd: RawFd,
  direction: Direction,
  waker: Waker,
}

struct Timer {
  deadline: Instant,
  waker: Waker,
}

/// Readiness table over `poll(2)`.
///
/// Progress is made by calling [`pump`](PollTable::pump), which [`block_on`]
/// does whenever its future is suspended. Multiple threads may share one
/// table; each runs its own `block_on` loop.
pub struct PollTable {
  regs: Mutex<Vec<Registration>>,
  timers: Mutex<Vec<Timer>>,
}

impl PollTable {
  pub fn new() -> Self {
    Self { regs: Mutex::new(Vec::new()), timers: Mutex::new(Vec::new()) }
  }

  /// Waits up to `max_wait` for any registered readiness or timer, then
  /// wakes whatever fired. Returns immediately if something is already due.
  pub fn pump(&self, max_wait: Duration) {
    let mut wait = max_wait;
    {
      let timers = self.timers.lock().unwrap();
      if let Some(nearest) = timers.iter().map(|t| t.deadline).min() {
        wait = wait.min(nearest.saturating_duration_since(Instant::now()));
      }
    }

    // One pollfd per descriptor, directions merged.
    let mut fds: Vec<libc::pollfd> = Vec::new();
    {
      let regs = self.regs.lock().unwrap();
      for reg in regs.iter() {
        let events = interest(reg.direction);
        match fds.iter_mut().find(|p| p.fd == reg.fd) {
          Some(p) => p.events |= events,
          None => fds.push(libc::pollfd { fd: reg.fd, events, revents: 0 }),
        }
      }
    }

    if fds.is_empty() {
      std::thread::sleep(wait.min(Duration::from_millis(10)));
    } else {
      let timeout_ms = wait.as_millis().min(i32::MAX as u128) as i32;
      let _ = syscall!(poll(
        fds.as_mut_ptr(),
        fds.len() as libc::nfds_t,
        timeout_ms,
      ));
    }

    // Collect first, wake after the locks are dropped.
    let mut ready = Vec::new();
    {
      let mut regs = self.regs.lock().unwrap();
      let mut i = 0;
      while i < regs.len() {
        let fired = fds
          .iter()
          .find(|p| p.fd == regs[i].fd)
          .is_some_and(|p| {
            let hangup = libc::POLLERR | libc::POLLHUP | libc::POLLNVAL;
            p.revents & (interest(regs[i].direction) | hangup) != 0
          });
        if fired {
          ready.push(regs.swap_remove(i).waker);
        } else {
          i += 1;
        }
      }
    }
    {
      let now = Instant::now();
      let mut timers = self.timers.lock().unwrap();
      let mut i = 0;
      while i < timers.len() {
        if timers[i].deadline <= now {
          ready.push(timers.swap_remove(i).waker);
        } else {
          i += 1;
        }
      }
    }
    for waker in ready {
      waker.wake();
    }
  }
}

impl Default for PollTable {
  fn default() -> Self {
    Self::new()
  }
}

fn interest(direction: Direction) -> libc::c_short {
  match direction {
    Direction::Read => libc::POLLIN,
    Direction::Write => libc::POLLOUT,
  }
}

impl IoTable for PollTable {
  fn listen(&self, opts: &ListenOpts) -> Result<(RawFd, SocketAddr), i32> {
    let fd = new_socket(opts.bind_addr)?;

    let bound = (|| {
      if opts.reuse_address {
        set_sockopt(fd, libc::SO_REUSEADDR)?;
      }
      if opts.reuse_port {
        set_sockopt(fd, libc::SO_REUSEPORT)?;
      }
      let (raw, len) = addr_to_raw(opts.bind_addr);
      syscall!(bind(fd, &raw as *const _ as *const libc::sockaddr, len))?;
      syscall!(listen(fd, opts.backlog))?;
      local_addr(fd)
    })();

    match bound {
      Ok(addr) => Ok((fd, addr)),
      Err(errno) => {
        let _ = syscall!(close(fd));
        Err(errno)
      }
    }
  }

  fn connect(&self, addr: SocketAddr) -> Outcome<RawFd> {
    let fd = match new_socket(addr) {
      Ok(fd) => fd,
      Err(errno) => return Outcome::Abort(errno),
    };

    let (raw, len) = addr_to_raw(addr);
    match syscall!(connect(fd, &raw as *const _ as *const libc::sockaddr, len))
    {
      Ok(_) => Outcome::Completed(fd),
      Err(errno) if errno == libc::EINPROGRESS => Outcome::InProgress(fd),
      Err(errno) => {
        // The attempt owns the descriptor until it reports InProgress or
        // Completed; anything else discards it.
        let _ = syscall!(close(fd));
        if errno == libc::EINTR || errno == libc::ECONNABORTED {
          Outcome::Retry
        } else {
          Outcome::Abort(errno)
        }
      }
    }
  }

  fn accept(&self, fd: RawFd) -> Outcome<(RawFd, SocketAddr)> {
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    match syscall!(accept4(
      fd,
      &mut storage as *mut _ as *mut libc::sockaddr,
      &mut len,
      libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
    )) {
      Ok(peer) => Outcome::Completed((peer, raw_to_addr(&storage))),
      Err(errno)
        if errno == libc::EAGAIN
          || errno == libc::EINTR
          || errno == libc::ECONNABORTED =>
      {
        Outcome::Retry
      }
      Err(errno) => Outcome::Abort(errno),
    }
  }

  fn read(&self, fd: RawFd, buf: &mut [u8]) -> Outcome<usize> {
    match syscall!(recv(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0))
    {
      Ok(n) => Outcome::Completed(n as usize),
      Err(errno) if errno == libc::EAGAIN || errno == libc::EINTR => {
        Outcome::Retry
      }
      Err(errno) => Outcome::Abort(errno),
    }
  }

  fn write(&self, fd: RawFd, buf: &[u8]) -> Outcome<usize> {
    match syscall!(send(
      fd,
      buf.as_ptr() as *const libc::c_void,
      buf.len(),
      libc::MSG_NOSIGNAL,
    )) {
      Ok(n) => Outcome::Completed(n as usize),
      Err(errno) if errno == libc::EAGAIN || errno == libc::EINTR => {
        Outcome::Retry
      }
      Err(errno) => Outcome::Abort(errno),
    }
  }

  fn close(&self, fd: RawFd) {
    let _ = syscall!(close(fd));

    // Anyone suspended on this descriptor must resume now and observe the
    // closed handle.
    let orphaned: Vec<Waker> = {
      let mut regs = self.regs.lock().unwrap();
      let mut out = Vec::new();
      let mut i = 0;
      while i < regs.len() {
        if regs[i].fd == fd {
          out.push(regs.swap_remove(i).waker);
        } else {
          i += 1;
        }
      }
      out
    };
    for waker in orphaned {
      waker.wake();
    }
  }

  fn register(&self, fd: RawFd, direction: Direction, waker: &Waker) {
    self
      .regs
      .lock()
      .unwrap()
      .push(Registration { fd, direction, waker: waker.clone() });
  }

  fn register_timer(&self, deadline: Instant, waker: &Waker) {
    self.timers.lock().unwrap().push(Timer { deadline, waker: waker.clone() });
  }
}

fn new_socket(addr: SocketAddr) -> Result<RawFd, i32> {
  let domain = if addr.is_ipv4() { libc::AF_INET } else { libc::AF_INET6 };
  syscall!(socket(
    domain,
    libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
    0,
  ))
}

fn set_sockopt(fd: RawFd, opt: libc::c_int) -> Result<(), i32> {
  let on: libc::c_int = 1;
  syscall!(setsockopt(
    fd,
    libc::SOL_SOCKET,
    opt,
    &on as *const _ as *const libc::c_void,
    mem::size_of::<libc::c_int>() as libc::socklen_t,
  ))?;
  Ok(())
}

fn local_addr(fd: RawFd) -> Result<SocketAddr, i32> {
  let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
  let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
  syscall!(getsockname(
    fd,
    &mut storage as *mut _ as *mut libc::sockaddr,
    &mut len,
  ))?;
  Ok(raw_to_addr(&storage))
}

fn addr_to_raw(addr: SocketAddr) -> (libc::sockaddr_storage, libc::socklen_t) {
  let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
  match addr {
    SocketAddr::V4(v4) => {
      // SAFETY: sockaddr_in fits inside sockaddr_storage.
      let sin = unsafe {
        &mut *(&mut storage as *mut libc::sockaddr_storage
          as *mut libc::sockaddr_in)
      };
      sin.sin_family = libc::AF_INET as libc::sa_family_t;
      sin.sin_port = v4.port().to_be();
      sin.sin_addr =
        libc::in_addr { s_addr: u32::from_ne_bytes(v4.ip().octets()) };
      (storage, mem::size_of::<libc::sockaddr_in>() as libc::socklen_t)
    }
    SocketAddr::V6(v6) => {
      // SAFETY: sockaddr_in6 fits inside sockaddr_storage.
      let sin6 = unsafe {
        &mut *(&mut storage as *mut libc::sockaddr_storage
          as *mut libc::sockaddr_in6)
      };
      sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
      sin6.sin6_port = v6.port().to_be();
      sin6.sin6_addr = libc::in6_addr { s6_addr: v6.ip().octets() };
      sin6.sin6_flowinfo = v6.flowinfo();
      sin6.sin6_scope_id = v6.scope_id();
      (storage, mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t)
    }
  }
}

fn raw_to_addr(storage: &libc::sockaddr_storage) -> SocketAddr {
  match storage.ss_family as libc::c_int {
    libc::AF_INET => {
      // SAFETY: family says this storage holds a sockaddr_in.
      let sin = unsafe {
        &*(storage as *const libc::sockaddr_storage
          as *const libc::sockaddr_in)
      };
      SocketAddr::from((
        Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes()),
        u16::from_be(sin.sin_port),
      ))
    }
    libc::AF_INET6 => {
      // SAFETY: family says this storage holds a sockaddr_in6.
      let sin6 = unsafe {
        &*(storage as *const libc::sockaddr_storage
          as *const libc::sockaddr_in6)
      };
      SocketAddr::V6(SocketAddrV6::new(
        Ipv6Addr::from(sin6.sin6_addr.s6_addr),
        u16::from_be(sin6.sin6_port),
        sin6.sin6_flowinfo,
        sin6.sin6_scope_id,
      ))
    }
    family => panic!("internal test table error: address family {family}"),
  }
}

struct PumpWaker {
  notified: AtomicBool,
}

impl Wake for PumpWaker {
  fn wake(self: Arc<Self>) {
    self.notified.store(true, Ordering::Release);
  }

  fn wake_by_ref(self: &Arc<Self>) {
    self.notified.store(true, Ordering::Release);
  }
}

/// Drives `fut` to completion, pumping `table` whenever the future is
/// suspended. Several threads may each run their own `block_on` against a
/// shared table.
pub fn block_on<F: Future>(table: &PollTable, fut: F) -> F::Output {
  let mut fut = pin!(fut);
  let pump_waker = Arc::new(PumpWaker { notified: AtomicBool::new(true) });
  let waker = Waker::from(Arc::clone(&pump_waker));
  let mut cx = Context::from_waker(&waker);

  loop {
    if pump_waker.notified.swap(false, Ordering::AcqRel) {
      if let Poll::Ready(out) = fut.as_mut().poll(&mut cx) {
        return out;
      }
    } else {
      table.pump(Duration::from_millis(10));
    }
  }
}
