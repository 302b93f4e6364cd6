//! Per-operation futures and the suspend/retry machinery driving them.
//!
//! Every public operation bottoms out in one of two shapes:
//!
//! - [`retry_on_ready`]: attempt, and on `Retry` park the task on readiness
//!   of the descriptor, reissuing the same attempt when the table wakes it.
//!   Used by accept, recv and send.
//! - [`Connect`]: the connection-establishment state machine, which differs
//!   from the readiness loop in its `Retry` handling (a fairness yield, not
//!   an I/O wait) and in its `InProgress` leg.

mod connect;
mod retry;

pub(crate) use connect::Connect;
pub(crate) use retry::retry_on_ready;
