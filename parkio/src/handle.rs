use std::{
  os::fd::RawFd,
  sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

/// Opaque identity of the task that owns a socket.
///
/// The layer does not mint these itself; the surrounding scheduler decides
/// what a task identity is and hands it in. [`OwnerId::NONE`] stands for
/// "the creating task" until a handoff happens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
  pub const NONE: Self = Self(0);

  pub const fn new(id: u64) -> Self {
    Self(id)
  }

  pub const fn get(self) -> u64 {
    self.0
  }
}

/// A socket handle: the raw descriptor plus the bookkeeping this layer
/// maintains on top of it.
///
/// The closed flag is the authority for the "once closed, always closed"
/// rule: every operation checks it before attempting a table call, and a
/// close from another task flips it so suspended operations resume into
/// `Closed` instead of a stale result. Closing invalidates the handle but
/// does not reclaim it; the descriptor's lifetime is the table's business.
#[derive(Debug)]
pub struct Handle {
  fd: RawFd,
  closed: AtomicBool,
  owner: AtomicU64,
}

impl Handle {
  pub(crate) fn new(fd: RawFd) -> Self {
    Self {
      fd,
      closed: AtomicBool::new(false),
      owner: AtomicU64::new(OwnerId::NONE.get()),
    }
  }

  pub fn fd(&self) -> RawFd {
    self.fd
  }

  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  /// Flips the closed flag. Returns whether this call did the flipping.
  pub(crate) fn mark_closed(&self) -> bool {
    !self.closed.swap(true, Ordering::AcqRel)
  }

  pub fn owner(&self) -> OwnerId {
    OwnerId::new(self.owner.load(Ordering::Acquire))
  }

  pub(crate) fn set_owner(&self, owner: OwnerId) {
    self.owner.store(owner.get(), Ordering::Release);
  }
}
