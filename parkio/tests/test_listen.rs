use parkio::test_utils::{block_on, PollTable};
use parkio::{listen, Error, ListenOpts};

#[test]
fn default_opts_bind_an_ephemeral_loopback_port() {
  let table = PollTable::new();
  let listener = listen(&table, ListenOpts::default()).unwrap();

  let addr = listener.local_addr();
  assert!(addr.ip().is_loopback());
  assert_ne!(addr.port(), 0);
}

#[test]
fn explicit_port_is_the_bound_port() {
  let table = PollTable::new();

  // Learn a free port, release it, then ask for it by name.
  let port = {
    let probe = listen(&table, ListenOpts::default()).unwrap();
    probe.local_addr().port()
  };

  let listener = listen(&table, ListenOpts::default().port(port)).unwrap();
  assert_eq!(listener.local_addr().port(), port);
}

#[test]
fn bind_conflict_surfaces_the_errno() {
  let table = PollTable::new();
  let first = listen(&table, ListenOpts::default()).unwrap();
  let port = first.local_addr().port();

  let err = listen(
    &table,
    ListenOpts::default()
      .port(port)
      .reuse_address(false)
      .reuse_port(false),
  )
  .unwrap_err();
  assert_eq!(err, Error::Sys(libc::EADDRINUSE));
}

#[test]
fn accept_on_a_closed_listener_is_closed() {
  let table = PollTable::new();
  let listener = listen(&table, ListenOpts::default()).unwrap();
  listener.close();

  let res = block_on(&table, listener.accept(None));
  assert_eq!(res.err(), Some(Error::Closed));
}
