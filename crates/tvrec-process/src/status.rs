use std::fmt;

/// Lifecycle of one process invocation.
///
/// `Start` until launched, `Running` while alive. `TimedOut` marks a child
/// that got `SIGTERM` from the timeout escalation and is still alive. Every
/// other status is final and never changes once recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProcessStatus {
    Start,
    Running,
    Exited(i32),
    /// Killed with `SIGKILL`.
    Aborted,
    /// Died from `SIGSEGV`.
    Terminated,
    Signalled(i32),
    TimedOut,
    NotFound,
    GeneralFailure,
}

impl ProcessStatus {
    /// True while a child process exists for this invocation.
    pub fn is_alive(self) -> bool {
        matches!(self, Self::Running | Self::TimedOut)
    }

    pub fn is_final(self) -> bool {
        !matches!(self, Self::Start | Self::Running | Self::TimedOut)
    }

    pub fn success(self) -> bool {
        self == Self::Exited(0)
    }

    /// Shell-style exit code for reporting.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Exited(code) => code,
            Self::Aborted => 128 + libc::SIGKILL,
            Self::Terminated => 128 + libc::SIGSEGV,
            Self::Signalled(sig) => 128 + sig,
            Self::TimedOut => 124,
            Self::NotFound => 127,
            Self::GeneralFailure => 1,
            Self::Start | Self::Running => -1,
        }
    }

    /// Maps a raw `waitpid` status.
    pub(crate) fn from_wait_status(raw: libc::c_int) -> Self {
        if libc::WIFEXITED(raw) {
            Self::Exited(libc::WEXITSTATUS(raw))
        } else if libc::WIFSIGNALED(raw) {
            match libc::WTERMSIG(raw) {
                libc::SIGKILL => Self::Aborted,
                libc::SIGSEGV => Self::Terminated,
                sig => Self::Signalled(sig),
            }
        } else {
            Self::GeneralFailure
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("not started"),
            Self::Running => f.write_str("running"),
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Aborted => f.write_str("aborted"),
            Self::Terminated => f.write_str("terminated"),
            Self::Signalled(sig) => write!(f, "killed by signal {sig}"),
            Self::TimedOut => f.write_str("timed out"),
            Self::NotFound => f.write_str("command not found"),
            Self::GeneralFailure => f.write_str("failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_status_classification() {
        assert_eq!(ProcessStatus::from_wait_status(0), ProcessStatus::Exited(0));
        assert_eq!(ProcessStatus::from_wait_status(3 << 8), ProcessStatus::Exited(3));
        assert_eq!(
            ProcessStatus::from_wait_status(libc::SIGKILL),
            ProcessStatus::Aborted
        );
        assert_eq!(
            ProcessStatus::from_wait_status(libc::SIGSEGV),
            ProcessStatus::Terminated
        );
        assert_eq!(
            ProcessStatus::from_wait_status(libc::SIGTERM),
            ProcessStatus::Signalled(libc::SIGTERM)
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ProcessStatus::Exited(7).exit_code(), 7);
        assert_eq!(ProcessStatus::Aborted.exit_code(), 137);
        assert_eq!(ProcessStatus::Signalled(libc::SIGTERM).exit_code(), 143);
        assert_eq!(ProcessStatus::NotFound.exit_code(), 127);
        assert_eq!(ProcessStatus::TimedOut.exit_code(), 124);
    }

    #[test]
    fn test_liveness() {
        assert!(ProcessStatus::Running.is_alive());
        assert!(ProcessStatus::TimedOut.is_alive());
        assert!(!ProcessStatus::Exited(0).is_alive());
        assert!(!ProcessStatus::Start.is_final());
        assert!(ProcessStatus::NotFound.is_final());
        assert!(ProcessStatus::Exited(0).success());
        assert!(!ProcessStatus::Exited(1).success());
    }
}
