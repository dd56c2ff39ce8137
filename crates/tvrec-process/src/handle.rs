use std::fmt;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use tvrec_common::{condvar_wait_or_recover, condvar_wait_timeout_or_recover};

use crate::error::{ProcessError, StdStream};
use crate::flags::{LaunchOptions, ProcessFlags, split_background_marker};
use crate::hooks::UiLocks;
use crate::state::{ProcessId, ProcessShared};
use crate::status::ProcessStatus;
use crate::supervisor::{LaunchSpec, ProcessSupervisor, send_signal};

const PUMP_INTERVAL: Duration = Duration::from_millis(100);

/// One external command invocation.
///
/// Created in [`ProcessStatus::Start`]; [`run`](Self::run) forks the child
/// and hands it to the supervisor, which records the final status.
pub struct ProcessHandle {
    shared: Arc<ProcessShared>,
    supervisor: ProcessSupervisor,
    spec: LaunchSpec,
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.shared.id)
            .field("command", &self.shared.label)
            .field("status", &self.status())
            .finish()
    }
}

impl ProcessHandle {
    /// A command line run through `/bin/sh -c`. A trailing `&` is stripped
    /// and makes the process a background one.
    pub fn shell(
        supervisor: &ProcessSupervisor,
        command: impl Into<String>,
        flags: ProcessFlags,
    ) -> Self {
        let (command, flags) = split_background_marker(&command.into(), flags);
        let flags = flags | ProcessFlags::RUN_SHELL;
        Self::build(supervisor, command.clone(), LaunchSpec::Shell(command), flags)
    }

    /// An executable and its argument vector. With
    /// [`ProcessFlags::RUN_SHELL`] the words are quoted into a shell line.
    pub fn program<I, S>(
        supervisor: &ProcessSupervisor,
        path: impl Into<PathBuf>,
        args: I,
        flags: ProcessFlags,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = path.into();
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let mut words = Vec::with_capacity(args.len() + 1);
        words.push(path.to_string_lossy().into_owned());
        words.extend(args.iter().cloned());
        let label = shell_words::join(&words);

        let spec = if flags.contains(ProcessFlags::RUN_SHELL) {
            LaunchSpec::Shell(label.clone())
        } else {
            LaunchSpec::Program { path, args }
        };
        Self::build(supervisor, label, spec, flags)
    }

    fn build(
        supervisor: &ProcessSupervisor,
        label: String,
        spec: LaunchSpec,
        flags: ProcessFlags,
    ) -> Self {
        let ui = supervisor.ui();
        let in_ui = ui.has_gui() && ui.is_ui_thread();
        let options = LaunchOptions::resolve(flags, in_ui);
        let shared = Arc::new(ProcessShared::new(supervisor.next_id(), label, options, ui));
        Self {
            shared,
            supervisor: supervisor.clone(),
            spec,
        }
    }

    pub fn id(&self) -> ProcessId {
        self.shared.id
    }

    pub fn command(&self) -> &str {
        &self.shared.label
    }

    /// OS pid while the child is alive.
    pub fn pid(&self) -> Option<u32> {
        self.shared.lock().pid.map(|pid| pid as u32)
    }

    pub fn status(&self) -> ProcessStatus {
        self.shared.status()
    }

    /// True if the timeout escalation fired, even if the child later exited
    /// on its own.
    pub fn timed_out(&self) -> bool {
        self.shared.lock().timed_out
    }

    pub fn is_background(&self) -> bool {
        self.shared.options.background
    }

    /// Launches the child and returns without waiting. A zero or absent
    /// timeout means no timeout.
    pub fn run(&self, timeout: Option<Duration>) -> ProcessStatus {
        let deadline = timeout
            .filter(|timeout| !timeout.is_zero())
            .map(|timeout| Instant::now() + timeout);
        self.run_until(deadline)
    }

    /// Like [`run`](Self::run) with an absolute deadline.
    pub fn run_until(&self, deadline: Option<Instant>) -> ProcessStatus {
        {
            let mut state = self.shared.lock();
            if state.status != ProcessStatus::Start {
                warn!(process = %self.shared.id, status = %state.status, "Process already launched");
                return state.status;
            }
            state.ui_locks = UiLocks::acquire(
                self.shared.ui.as_ref(),
                self.shared.options.block_input_devs,
                self.shared.options.disable_drawing,
            );
        }
        self.supervisor.launch(&self.shared, &self.spec, deadline)
    }

    /// Blocks until the child has been reaped or `timeout` elapses, then
    /// returns the latest status. Background processes and handles that
    /// were never launched return immediately.
    pub fn wait(&self, timeout: Option<Duration>) -> ProcessStatus {
        if self.shared.options.background {
            return self.status();
        }
        let deadline = timeout
            .filter(|timeout| !timeout.is_zero())
            .map(|timeout| Instant::now() + timeout);
        self.block_until_finished(deadline, self.shared.options.pump_events)
    }

    fn block_until_finished(&self, deadline: Option<Instant>, pump: bool) -> ProcessStatus {
        let cond = &self.shared.finished_cond;
        let mut state = self.shared.lock();
        loop {
            if state.finished || state.status == ProcessStatus::Start {
                break;
            }
            let remaining = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    Some(deadline - now)
                }
                None => None,
            };
            if pump {
                let slice = remaining.map_or(PUMP_INTERVAL, |left| left.min(PUMP_INTERVAL));
                let (guard, _) = condvar_wait_timeout_or_recover(cond, state, slice);
                drop(guard);
                self.shared.ui.pump_events();
                state = self.shared.lock();
            } else {
                state = match remaining {
                    Some(left) => condvar_wait_timeout_or_recover(cond, state, left).0,
                    None => condvar_wait_or_recover(cond, state),
                };
            }
        }
        state.status
    }

    fn signal(&self, signal: libc::c_int, name: &'static str) -> bool {
        let state = self.shared.lock();
        if state.status != ProcessStatus::Running {
            return false;
        }
        let Some(pid) = state.pid else {
            return false;
        };
        info!(process = %self.shared.id, pid, signal = name, "Signalling child process");
        send_signal(pid, signal)
    }

    /// Sends `SIGTERM`. With `force`, follows up with `SIGKILL` if the child
    /// is still running after the supervisor's grace period.
    pub fn term(&self, force: bool) {
        if !self.signal(libc::SIGTERM, "TERM") || !force {
            return;
        }
        let deadline = Instant::now() + self.supervisor.config().term_grace();
        if self.block_until_finished(Some(deadline), false) == ProcessStatus::Running {
            self.kill();
        }
    }

    pub fn kill(&self) {
        self.signal(libc::SIGKILL, "KILL");
    }

    pub fn stop(&self) {
        self.signal(libc::SIGSTOP, "STOP");
    }

    pub fn cont(&self) {
        self.signal(libc::SIGCONT, "CONT");
    }

    pub fn hang_up(&self) {
        self.signal(libc::SIGHUP, "HUP");
    }

    pub fn usr1(&self) {
        self.signal(libc::SIGUSR1, "USR1");
    }

    pub fn usr2(&self) {
        self.signal(libc::SIGUSR2, "USR2");
    }

    fn requested(&self, stream: StdStream) -> bool {
        let options = &self.shared.options;
        match stream {
            StdStream::Stdin => options.stdin,
            StdStream::Stdout => options.stdout,
            StdStream::Stderr => options.stderr,
        }
    }

    /// Duplicates a pipe so it can be used without holding the state lock.
    fn clone_pipe(&self, stream: StdStream) -> Result<File, ProcessError> {
        let state = self.shared.lock();
        let pipe = match stream {
            StdStream::Stdin => state.pipes.stdin.as_ref(),
            StdStream::Stdout => state.pipes.stdout.as_ref(),
            StdStream::Stderr => state.pipes.stderr.as_ref(),
        };
        pipe.ok_or(ProcessError::Closed { stream })?
            .try_clone()
            .map_err(|err| ProcessError::io("duplicate", stream, err))
    }

    /// Writes all of `data` to the child's stdin.
    pub fn write(&self, data: &[u8]) -> Result<usize, ProcessError> {
        if !self.requested(StdStream::Stdin) {
            return Err(ProcessError::NotPiped {
                stream: StdStream::Stdin,
            });
        }
        let mut pipe = self.clone_pipe(StdStream::Stdin)?;
        pipe.write_all(data)
            .map_err(|err| ProcessError::io("write", StdStream::Stdin, err))?;
        Ok(data.len())
    }

    /// Closes our end of stdin so the child sees end of input.
    pub fn close_stdin(&self) {
        self.shared.lock().pipes.stdin = None;
    }

    /// Up to `max` bytes of stdout. Buffered processes consume from the
    /// capture buffer; otherwise this is a blocking read on the pipe.
    pub fn read(&self, max: usize) -> Result<Vec<u8>, ProcessError> {
        self.read_stream(StdStream::Stdout, max)
    }

    pub fn read_err(&self, max: usize) -> Result<Vec<u8>, ProcessError> {
        self.read_stream(StdStream::Stderr, max)
    }

    /// Everything captured on stdout so far, or the pipe read to EOF when
    /// not buffered.
    pub fn read_all(&self) -> Result<Vec<u8>, ProcessError> {
        self.read_stream_all(StdStream::Stdout)
    }

    pub fn read_all_err(&self) -> Result<Vec<u8>, ProcessError> {
        self.read_stream_all(StdStream::Stderr)
    }

    fn read_stream(&self, stream: StdStream, max: usize) -> Result<Vec<u8>, ProcessError> {
        if !self.requested(stream) {
            return Err(ProcessError::NotPiped { stream });
        }
        if self.shared.options.buffered {
            let mut state = self.shared.lock();
            let buffer = match stream {
                StdStream::Stderr => &mut state.stderr_buf,
                _ => &mut state.stdout_buf,
            };
            return Ok(buffer.read(max));
        }

        let mut pipe = self.clone_pipe(stream)?;
        let mut buf = vec![0u8; max];
        let read = loop {
            match pipe.read(&mut buf) {
                Ok(read) => break read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(ProcessError::io("read", stream, err)),
            }
        };
        buf.truncate(read);
        Ok(buf)
    }

    fn read_stream_all(&self, stream: StdStream) -> Result<Vec<u8>, ProcessError> {
        if !self.requested(stream) {
            return Err(ProcessError::NotPiped { stream });
        }
        if self.shared.options.buffered {
            let state = self.shared.lock();
            return Ok(match stream {
                StdStream::Stderr => state.stderr_buf.all(),
                _ => state.stdout_buf.all(),
            });
        }

        let mut pipe = self.clone_pipe(stream)?;
        let mut out = Vec::new();
        pipe.read_to_end(&mut out)
            .map_err(|err| ProcessError::io("read", stream, err))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::tests::CountingUi;
    use crate::supervisor::{ReapScope, SupervisorConfig};
    use std::sync::atomic::Ordering;

    fn supervisor() -> ProcessSupervisor {
        ProcessSupervisor::new(
            SupervisorConfig::default()
                .with_poll_interval(Duration::from_millis(10))
                .with_reap_scope(ReapScope::Tracked),
        )
    }

    #[test]
    fn test_new_handle_is_not_started() {
        let sup = supervisor();
        let handle = ProcessHandle::shell(&sup, "true", ProcessFlags::NONE);
        assert_eq!(handle.status(), ProcessStatus::Start);
        assert_eq!(handle.wait(Some(Duration::from_millis(10))), ProcessStatus::Start);
        assert!(handle.pid().is_none());
    }

    #[test]
    fn test_program_label_is_shell_quoted() {
        let sup = supervisor();
        let handle = ProcessHandle::program(&sup, "/bin/echo", ["a b", "c"], ProcessFlags::NONE);
        assert_eq!(handle.command(), "/bin/echo 'a b' c");
    }

    #[test]
    fn test_write_requires_stdin_flag() {
        let sup = supervisor();
        let handle = ProcessHandle::shell(&sup, "cat", ProcessFlags::BUFFERED);
        let err = handle.write(b"data").unwrap_err();
        assert!(matches!(
            err,
            ProcessError::NotPiped {
                stream: StdStream::Stdin
            }
        ));
    }

    #[test]
    fn test_read_requires_output_flag() {
        let sup = supervisor();
        let handle = ProcessHandle::shell(&sup, "true", ProcessFlags::NONE);
        assert!(handle.read(10).is_err());
        assert!(handle.read_all_err().is_err());
    }

    #[test]
    fn test_run_twice_returns_current_status() {
        let sup = supervisor();
        let handle = ProcessHandle::shell(&sup, "true", ProcessFlags::NONE);
        assert_eq!(handle.run(None), ProcessStatus::Running);
        handle.wait(Some(Duration::from_secs(5)));
        assert_eq!(handle.run(None), ProcessStatus::Exited(0));
    }

    #[test]
    fn test_ui_locks_released_after_exit() {
        let ui = Arc::new(CountingUi::default());
        let sup = ProcessSupervisor::with_ui(
            SupervisorConfig::default()
                .with_poll_interval(Duration::from_millis(10))
                .with_reap_scope(ReapScope::Tracked),
            ui.clone(),
        );
        let handle = ProcessHandle::shell(&sup, "sleep 0.2", ProcessFlags::PROCESS_EVENTS);
        handle.run(None);
        assert_eq!(ui.input_locks.load(Ordering::SeqCst), 1);
        assert_eq!(ui.drawing_depth.load(Ordering::SeqCst), 1);

        let status = handle.wait(Some(Duration::from_secs(5)));
        assert_eq!(status, ProcessStatus::Exited(0));
        assert_eq!(ui.input_locks.load(Ordering::SeqCst), 0);
        assert_eq!(ui.drawing_depth.load(Ordering::SeqCst), 0);
        assert!(ui.pumped.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_launch_failure_releases_ui_locks() {
        let ui = Arc::new(CountingUi::default());
        let sup = ProcessSupervisor::with_ui(
            SupervisorConfig::default().with_reap_scope(ReapScope::Tracked),
            ui.clone(),
        );
        let handle = ProcessHandle::program(
            &sup,
            "/nonexistent/tvrec-helper",
            Vec::<String>::new(),
            ProcessFlags::NONE,
        );
        assert_eq!(handle.run(None), ProcessStatus::NotFound);
        assert_eq!(ui.input_locks.load(Ordering::SeqCst), 0);
        assert_eq!(ui.drawing_depth.load(Ordering::SeqCst), 0);
        sup.shutdown();
    }
}
