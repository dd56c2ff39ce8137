#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Shared plumbing for the tvrec crates: lock recovery and tracing setup.

mod sync;
pub mod telemetry;

pub use sync::condvar_wait_or_recover;
pub use sync::condvar_wait_timeout_or_recover;
pub use sync::mutex_lock_or_recover;
pub use sync::poison_recovery_count;
