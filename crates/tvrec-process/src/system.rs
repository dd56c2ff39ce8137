use std::time::Duration;

use crate::flags::ProcessFlags;
use crate::handle::ProcessHandle;
use crate::status::ProcessStatus;
use crate::supervisor::ProcessSupervisor;

/// Runs a shell command line and waits for it.
///
/// Background commands (flag or trailing `&`) return `Running` as soon as
/// they are launched.
pub fn run_command(
    supervisor: &ProcessSupervisor,
    command: &str,
    flags: ProcessFlags,
    timeout: Option<Duration>,
) -> ProcessStatus {
    let handle = ProcessHandle::shell(supervisor, command, flags);
    let status = handle.run(timeout);
    if status != ProcessStatus::Running {
        return status;
    }
    handle.wait(None)
}
