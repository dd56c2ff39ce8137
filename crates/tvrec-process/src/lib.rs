#![deny(clippy::all)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

//! Launching and supervising helper processes.
//!
//! A [`ProcessSupervisor`] owns a background reaper that collects exit
//! statuses, drains buffered stdio and escalates timed-out children from
//! `SIGTERM` to `SIGKILL`. [`ProcessHandle`] is the caller's view of one
//! invocation.

mod error;
mod flags;
mod handle;
mod hooks;
mod state;
mod status;
mod supervisor;
mod system;

pub use error::{ProcessError, StdStream};
pub use flags::ProcessFlags;
pub use handle::ProcessHandle;
pub use hooks::{HeadlessUi, UiContext, UiHandle};
pub use state::ProcessId;
pub use status::ProcessStatus;
pub use supervisor::{ProcessSupervisor, ReapScope, SupervisorConfig};
pub use system::run_command;
