//! Cooperative "as if blocking" TCP sockets over an external readiness
//! table.
//!
//! parkio gives lightweight tasks a blocking-style socket API without ever
//! blocking the thread that carries them. Each operation makes one
//! non-blocking attempt against an [`IoTable`]; if the descriptor is not
//! ready, the task parks itself on a readiness registration and the attempt
//! is reissued when the table wakes it. Callers only ever see final results:
//! the suspend/retry traffic stays inside the crate.
//!
//! The crate deliberately does not own an event loop. The [`IoTable`] trait
//! is the seam: production embeds this layer over whatever demultiplexer the
//! host runtime runs (epoll, kqueue, io_uring completions mapped to
//! readiness), and tests drive it with the bundled `poll(2)` table.
//!
//! # Example
//!
//! An echo exchange over loopback, with the server side on its own carrier
//! thread:
//!
//! ```rust
//! use parkio::{connect, listen, ListenOpts};
//! use parkio::test_utils::{block_on, PollTable};
//!
//! let table = PollTable::new();
//! let listener = listen(&table, ListenOpts::default()).unwrap();
//! let addr = listener.local_addr();
//!
//! std::thread::scope(|s| {
//!   s.spawn(|| {
//!     block_on(&table, async {
//!       let (peer, _) = listener.accept(None).await.unwrap();
//!       let mut buf = [0u8; 4];
//!       let n = peer.recv(&mut buf, None).await.unwrap();
//!       peer.send(&buf[..n]).await.unwrap();
//!     });
//!   });
//!
//!   block_on(&table, async {
//!     let socket = connect(&table, addr).await.unwrap();
//!     socket.send(b"ping").await.unwrap();
//!     let mut buf = [0u8; 4];
//!     let n = socket.recv(&mut buf, None).await.unwrap();
//!     assert_eq!(&buf[..n], b"ping");
//!   });
//! });
//! ```
//!
//! # Semantics worth knowing
//!
//! - `connect` treats write-readiness as established and performs no
//!   further verification; a refused peer surfaces on the first transfer.
//! - A zero-length read means the peer shut down: the socket reports
//!   [`Error::Closed`] and stays closed.
//! - `close` is idempotent and races safely with suspended operations,
//!   which resume with [`Error::Closed`].
//! - Timeouts on `accept` and `recv` are enforced: the deadline is checked
//!   whenever an attempt comes back unready, so readiness at the deadline
//!   still wins.
//!
//! # Platform support
//!
//! Unix only. The bundled test table additionally assumes Linux
//! (`accept4`, `SOCK_NONBLOCK`).

#[macro_use]
mod macros;

mod error;
mod handle;
mod op;
mod outcome;
mod socket;
mod table;

#[doc(hidden)]
pub mod test_utils;

pub use error::{Error, Result};
pub use handle::{Handle, OwnerId};
pub use outcome::{Direction, Outcome};
pub use socket::{connect, listen, Listener, Socket};
pub use table::{IoTable, ListenOpts};
