use std::time::{Duration, Instant};

use parkio::test_utils::{block_on, PollTable};
use parkio::{connect, listen, Error, ListenOpts};

#[test]
fn accept_reports_the_connectors_ephemeral_address() {
  let table = PollTable::new();
  let listener = listen(&table, ListenOpts::default()).unwrap();
  let addr = listener.local_addr();

  // The handshake completes into the backlog before any accept runs.
  let client = block_on(&table, connect(&table, addr)).unwrap();
  let (_, peer_addr) = block_on(&table, listener.accept(None)).unwrap();

  assert!(peer_addr.ip().is_loopback());
  assert_eq!(peer_addr, client_local_addr(client.handle().fd()));
}

fn client_local_addr(fd: i32) -> std::net::SocketAddr {
  let mut sin: libc::sockaddr_in = unsafe { std::mem::zeroed() };
  let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
  let rc = unsafe {
    libc::getsockname(fd, &mut sin as *mut _ as *mut libc::sockaddr, &mut len)
  };
  assert_eq!(rc, 0);
  std::net::SocketAddr::from((
    std::net::Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes()),
    u16::from_be(sin.sin_port),
  ))
}

#[test]
fn sequential_accepts_serve_multiple_clients() {
  let table = PollTable::new();
  let listener = listen(&table, ListenOpts::default()).unwrap();
  let addr = listener.local_addr();
  let table = &table;

  std::thread::scope(|s| {
    for greeting in [b"one", b"two"] {
      s.spawn(move || {
        block_on(table, async {
          let socket = connect(table, addr).await.unwrap();
          socket.send(greeting).await.unwrap();
          // Hold the connection open until the server has read us.
          let mut buf = [0u8; 1];
          let _ = socket.recv(&mut buf, None).await;
        });
      });
    }

    block_on(table, async {
      let mut seen = Vec::new();
      for _ in 0..2 {
        let (peer, _) = listener.accept(None).await.unwrap();
        let mut buf = [0u8; 3];
        let n = peer.recv(&mut buf, None).await.unwrap();
        seen.push(buf[..n].to_vec());
      }
      seen.sort();
      assert_eq!(seen, vec![b"one".to_vec(), b"two".to_vec()]);
    });
  });
}

#[test]
fn accept_times_out_when_nothing_arrives() {
  let table = PollTable::new();
  let listener = listen(&table, ListenOpts::default()).unwrap();

  let start = Instant::now();
  let res = block_on(&table, listener.accept(Some(Duration::from_millis(50))));
  assert_eq!(res.err(), Some(Error::Timeout));
  assert!(start.elapsed() >= Duration::from_millis(50));
}

#[test]
fn listener_stays_usable_after_a_timeout() {
  let table = PollTable::new();
  let listener = listen(&table, ListenOpts::default()).unwrap();
  let addr = listener.local_addr();

  let res = block_on(&table, listener.accept(Some(Duration::from_millis(20))));
  assert_eq!(res.err(), Some(Error::Timeout));

  std::thread::scope(|s| {
    s.spawn(|| {
      block_on(&table, async {
        connect(&table, addr).await.unwrap();
      });
    });

    block_on(&table, async {
      listener.accept(None).await.unwrap();
    });
  });
}
