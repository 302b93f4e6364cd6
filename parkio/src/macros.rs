/// Wraps a raw libc call, mapping the `-1` convention to the errno that
/// caused it.
macro_rules! syscall {
  ($fn:ident ( $($arg:expr),* $(,)? )) => {{
    #[allow(unused_unsafe)]
    let res = unsafe { libc::$fn($($arg,)*) };
    if res == -1 {
      Err(
        std::io::Error::last_os_error()
          .raw_os_error()
          .unwrap_or(libc::EIO),
      )
    } else {
      Ok(res)
    }
  }};
}
