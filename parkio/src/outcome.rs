/// Four-way result of a single non-blocking attempt made by the readiness
/// table.
///
/// Every socket operation in this crate is driven by mapping this outcome
/// onto its own control flow. `Retry` and `InProgress` are absorbed by the
/// suspend/retry machinery and are never visible to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
  /// The attempt finished with a value.
  Completed(T),
  /// The attempt was initiated and will finish asynchronously. Only
  /// `connect` produces this: the descriptor exists but is not usable until
  /// write-readiness fires.
  InProgress(T),
  /// The descriptor was not ready. The caller must suspend on readiness and
  /// reissue the attempt.
  Retry,
  /// Hard failure, as a raw errno value. No retry.
  Abort(i32),
}

/// Readiness direction a suspended operation waits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Read,
  Write,
}
