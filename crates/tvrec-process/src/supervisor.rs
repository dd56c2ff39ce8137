//! The reaper: one background thread per supervisor that collects exit
//! statuses, drains buffered pipes and applies timeout escalation.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, info, info_span, warn};
use tvrec_common::mutex_lock_or_recover;

use crate::error::StdStream;
use crate::flags::LaunchOptions;
use crate::hooks::{HeadlessUi, UiHandle};
use crate::state::{Drain, Pipes, ProcessId, ProcessShared, ProcessState, drain_pipe};
use crate::status::ProcessStatus;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_TERM_GRACE: Duration = Duration::from_secs(1);
pub const DEFAULT_READ_CHUNK: usize = 64 * 1024;

const FOREIGN_EXIT_LIMIT: usize = 4096;

/// Set while one supervisor's reaper runs `waitpid(-1)`.
static ANY_CHILD_CLAIM: AtomicBool = AtomicBool::new(false);
/// Exits of pids the any-child reaper collected without owning them. A
/// tracked reaper that gets `ECHILD` for one of its pids looks here.
static FOREIGN_EXITS: Mutex<Vec<(libc::pid_t, libc::c_int)>> = Mutex::new(Vec::new());

/// Which children the reaper waits on.
///
/// At most one supervisor per process reaps with [`AnyChild`](Self::AnyChild).
/// The first reaper to start claims it; any other supervisor configured for
/// it logs a warning and waits on its own pids instead. Children the
/// any-child reaper collects on behalf of tracked supervisors are handed
/// back to them, so mixing scopes never leaves a handle running forever.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReapScope {
    /// `waitpid(-1)`: every child of this process. Children that were not
    /// launched through the supervisor are reaped and logged as unmanaged.
    AnyChild,
    /// Only pids registered with this supervisor. Safe with any number of
    /// supervisors and with code that waits on its own children.
    #[default]
    Tracked,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    poll_interval: Duration,
    term_grace: Duration,
    read_chunk: usize,
    reap_scope: ReapScope,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            term_grace: DEFAULT_TERM_GRACE,
            read_chunk: DEFAULT_READ_CHUNK,
            reap_scope: ReapScope::default(),
        }
    }
}

impl SupervisorConfig {
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn term_grace(&self) -> Duration {
        self.term_grace
    }

    pub fn read_chunk(&self) -> usize {
        self.read_chunk
    }

    pub fn reap_scope(&self) -> ReapScope {
        self.reap_scope
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_term_grace(mut self, grace: Duration) -> Self {
        self.term_grace = grace;
        self
    }

    pub fn with_read_chunk(mut self, chunk: usize) -> Self {
        self.read_chunk = chunk.max(1);
        self
    }

    pub fn with_reap_scope(mut self, scope: ReapScope) -> Self {
        self.reap_scope = scope;
        self
    }
}

pub(crate) enum LaunchSpec {
    Shell(String),
    Program { path: PathBuf, args: Vec<String> },
}

#[derive(Default)]
struct ProcessTable {
    entries: HashMap<ProcessId, Arc<ProcessShared>>,
    by_pid: HashMap<libc::pid_t, ProcessId>,
}

impl ProcessTable {
    /// Moves a reaped pid out of the table and records its status.
    fn record_exit(&mut self, pid: libc::pid_t, raw: libc::c_int) -> Option<Arc<ProcessShared>> {
        self.record_status(pid, ProcessStatus::from_wait_status(raw))
    }

    fn record_status(
        &mut self,
        pid: libc::pid_t,
        status: ProcessStatus,
    ) -> Option<Arc<ProcessShared>> {
        let id = self.by_pid.remove(&pid)?;
        let process = self.entries.remove(&id)?;
        {
            let mut state = process.lock();
            state.status = status;
            state.pid = None;
        }
        debug!(process = %id, pid, %status, "Child process exited");
        Some(process)
    }
}

struct Reaper {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

struct SupervisorInner {
    config: SupervisorConfig,
    ui: UiHandle,
    next_id: AtomicU64,
    table: Mutex<ProcessTable>,
    reaper: Mutex<Option<Reaper>>,
    reaps_any_child: AtomicBool,
}

/// Owns every running [`ProcessHandle`](crate::ProcessHandle) launched
/// through it. Cheap to clone; clones share one table and one reaper.
///
/// The reaper thread starts on the first launch and runs until
/// [`shutdown`](Self::shutdown) or until the last clone is dropped.
#[derive(Clone)]
pub struct ProcessSupervisor {
    inner: Arc<SupervisorInner>,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("config", &self.inner.config)
            .field("tracked", &self.tracked_count())
            .finish()
    }
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self::with_ui(config, Arc::new(HeadlessUi))
    }

    pub fn with_ui(config: SupervisorConfig, ui: UiHandle) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                config,
                ui,
                next_id: AtomicU64::new(1),
                table: Mutex::new(ProcessTable::default()),
                reaper: Mutex::new(None),
                reaps_any_child: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// Number of launched processes not yet reaped.
    pub fn tracked_count(&self) -> usize {
        mutex_lock_or_recover(&self.inner.table).entries.len()
    }

    pub fn is_reaper_running(&self) -> bool {
        mutex_lock_or_recover(&self.inner.reaper)
            .as_ref()
            .is_some_and(|reaper| !reaper.handle.is_finished())
    }

    /// True while this supervisor holds the process-wide any-child claim.
    pub fn reaps_any_child(&self) -> bool {
        self.inner.reaps_any_child.load(Ordering::Acquire)
    }

    /// Stops the reaper thread and gives up the any-child claim. Processes
    /// still running keep their entries and are picked up again if a later
    /// launch restarts the reaper.
    pub fn shutdown(&self) {
        let reaper = mutex_lock_or_recover(&self.inner.reaper).take();
        let Some(reaper) = reaper else {
            return;
        };
        let _ = reaper.shutdown.send(());
        if reaper.handle.thread().id() != thread::current().id()
            && reaper.handle.join().is_err()
        {
            error!("Process reaper thread panicked");
        }
        self.inner.release_any_child();
    }

    pub(crate) fn ui(&self) -> UiHandle {
        Arc::clone(&self.inner.ui)
    }

    pub(crate) fn next_id(&self) -> ProcessId {
        ProcessId(self.inner.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn ensure_reaper(&self) -> io::Result<()> {
        let mut slot = mutex_lock_or_recover(&self.inner.reaper);
        if slot
            .as_ref()
            .is_some_and(|reaper| !reaper.handle.is_finished())
        {
            return Ok(());
        }

        self.inner.claim_any_child();
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.config.poll_interval;
        let handle = match thread::Builder::new()
            .name("process-reaper".to_string())
            .spawn(move || reaper_loop(weak, shutdown_rx, interval))
        {
            Ok(handle) => handle,
            Err(err) => {
                self.inner.release_any_child();
                return Err(err);
            }
        };
        *slot = Some(Reaper {
            shutdown: shutdown_tx,
            handle,
        });
        Ok(())
    }

    /// Forks the child and registers it. Launch failures are recorded on
    /// the handle's status.
    pub(crate) fn launch(
        &self,
        shared: &Arc<ProcessShared>,
        spec: &LaunchSpec,
        deadline: Option<Instant>,
    ) -> ProcessStatus {
        if let Err(err) = self.ensure_reaper() {
            error!(process = %shared.id, error = %err, "Failed to start process reaper");
            shared.fail_launch(ProcessStatus::GeneralFailure);
            return ProcessStatus::GeneralFailure;
        }

        let mut command = build_command(spec, &shared.options);

        // Held across fork so the reaper cannot collect the pid before it is
        // registered.
        let mut table = mutex_lock_or_recover(&self.inner.table);
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                drop(table);
                let status = match err.kind() {
                    io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                        ProcessStatus::NotFound
                    }
                    _ => ProcessStatus::GeneralFailure,
                };
                warn!(
                    process = %shared.id,
                    command = %shared.label,
                    error = %err,
                    %status,
                    "Failed to launch child process"
                );
                shared.fail_launch(status);
                return status;
            }
        };

        let pid = child.id() as libc::pid_t;
        let pipes = Pipes {
            stdin: child.stdin.take().map(|pipe| File::from(OwnedFd::from(pipe))),
            stdout: child.stdout.take().map(|pipe| File::from(OwnedFd::from(pipe))),
            stderr: child.stderr.take().map(|pipe| File::from(OwnedFd::from(pipe))),
        };
        if shared.options.buffered {
            for pipe in [&pipes.stdout, &pipes.stderr].into_iter().flatten() {
                if let Err(err) = set_nonblocking(pipe) {
                    warn!(process = %shared.id, error = %err, "Failed to make pipe non-blocking");
                }
            }
        }

        {
            let mut state = shared.lock();
            state.status = ProcessStatus::Running;
            state.pid = Some(pid);
            state.deadline = deadline;
            state.pipes = pipes;
        }
        table.by_pid.insert(pid, shared.id);
        table.entries.insert(shared.id, Arc::clone(shared));
        drop(table);

        info!(
            process = %shared.id,
            pid,
            command = %shared.label,
            background = shared.options.background,
            "Launched child process"
        );
        ProcessStatus::Running
    }
}

fn reaper_loop(inner: Weak<SupervisorInner>, shutdown: Receiver<()>, interval: Duration) {
    let span = info_span!("process_reaper");
    let _enter = span.enter();
    debug!("Process reaper started");
    loop {
        match shutdown.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.tick();
    }
    debug!("Process reaper stopped");
}

impl Drop for SupervisorInner {
    fn drop(&mut self) {
        self.release_any_child();
    }
}

impl SupervisorInner {
    fn claim_any_child(&self) {
        if self.config.reap_scope != ReapScope::AnyChild
            || self.reaps_any_child.load(Ordering::Acquire)
        {
            return;
        }
        if ANY_CHILD_CLAIM
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.reaps_any_child.store(true, Ordering::Release);
        } else {
            warn!("Another supervisor already reaps every child; waiting on own pids only");
        }
    }

    fn release_any_child(&self) {
        if self.reaps_any_child.swap(false, Ordering::AcqRel) {
            ANY_CHILD_CLAIM.store(false, Ordering::Release);
        }
    }

    fn tick(&self) {
        let finished = self.reap_children();

        let now = Instant::now();
        let live: Vec<Arc<ProcessShared>> = mutex_lock_or_recover(&self.table)
            .entries
            .values()
            .cloned()
            .collect();

        let mut watched: Vec<(Arc<ProcessShared>, StdStream, RawFd)> = Vec::new();
        for process in &live {
            let mut state = process.lock();
            if process.options.buffered {
                if let Some(pipe) = state.pipes.stdout.as_ref() {
                    watched.push((Arc::clone(process), StdStream::Stdout, pipe.as_raw_fd()));
                }
                if let Some(pipe) = state.pipes.stderr.as_ref() {
                    watched.push((Arc::clone(process), StdStream::Stderr, pipe.as_raw_fd()));
                }
            }
            if state.deadline.is_some_and(|deadline| now >= deadline) {
                self.escalate(process, &mut state, now);
            }
        }

        self.read_ready(&watched);

        for process in finished {
            if process.options.buffered {
                self.read_stream(&process, StdStream::Stdout, true);
                self.read_stream(&process, StdStream::Stderr, true);
            }
            process.finish();
            debug!(process = %process.id, status = %process.status(), "Child process released");
        }
    }

    fn reap_children(&self) -> Vec<Arc<ProcessShared>> {
        let mut table = mutex_lock_or_recover(&self.table);
        // Held across every wait: a pid missing from the OS is then either
        // still in the foreign list or genuinely lost.
        let mut foreign = mutex_lock_or_recover(&FOREIGN_EXITS);
        let mut finished = Vec::new();
        if self.reaps_any_child.load(Ordering::Acquire) {
            loop {
                let mut raw: libc::c_int = 0;
                // SAFETY: non-blocking wait with a valid status pointer.
                let pid = unsafe { libc::waitpid(-1, &mut raw, libc::WNOHANG) };
                if pid <= 0 {
                    break;
                }
                match table.record_exit(pid, raw) {
                    Some(process) => finished.push(process),
                    None => {
                        info!(pid, "Reaped unmanaged child process");
                        remember_foreign_exit(&mut foreign, pid, raw);
                    }
                }
            }
        } else {
            let pids: Vec<libc::pid_t> = table.by_pid.keys().copied().collect();
            for pid in pids {
                let mut raw: libc::c_int = 0;
                // SAFETY: non-blocking wait on a pid we launched.
                let reaped = unsafe { libc::waitpid(pid, &mut raw, libc::WNOHANG) };
                if reaped == pid {
                    finished.extend(table.record_exit(pid, raw));
                    continue;
                }
                if reaped == 0 || io::Error::last_os_error().raw_os_error() != Some(libc::ECHILD)
                {
                    continue;
                }
                match foreign.iter().position(|(other, _)| *other == pid) {
                    Some(index) => {
                        let (_, raw) = foreign.swap_remove(index);
                        debug!(pid, "Exit status handed over by the any-child reaper");
                        finished.extend(table.record_exit(pid, raw));
                    }
                    None => {
                        warn!(pid, "Child process was reaped elsewhere; exit status lost");
                        finished.extend(table.record_status(pid, ProcessStatus::GeneralFailure));
                    }
                }
            }
        }
        finished
    }

    fn escalate(&self, process: &ProcessShared, state: &mut ProcessState, now: Instant) {
        let Some(pid) = state.pid else {
            return;
        };
        if state.status == ProcessStatus::TimedOut {
            warn!(process = %process.id, pid, "Child ignored SIGTERM, sending SIGKILL");
            send_signal(pid, libc::SIGKILL);
            state.deadline = None;
        } else {
            info!(process = %process.id, pid, command = %process.label, "Child timed out, sending SIGTERM");
            send_signal(pid, libc::SIGTERM);
            state.status = ProcessStatus::TimedOut;
            state.timed_out = true;
            state.deadline = Some(now + self.config.term_grace);
        }
    }

    fn read_ready(&self, watched: &[(Arc<ProcessShared>, StdStream, RawFd)]) {
        if watched.is_empty() {
            return;
        }
        let mut fds: Vec<libc::pollfd> = watched
            .iter()
            .map(|(_, _, fd)| libc::pollfd {
                fd: *fd,
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();
        // SAFETY: `fds` is a valid, initialised array of `fds.len()` entries and
        // every descriptor in it stays open until this thread closes it.
        let ready = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, 0) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                warn!(error = %err, "poll on child pipes failed");
            }
            return;
        }
        if ready == 0 {
            return;
        }
        for (pollfd, (process, stream, _)) in fds.iter().zip(watched) {
            if pollfd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
                self.read_stream(process, *stream, false);
            }
        }
    }

    fn read_stream(&self, process: &ProcessShared, stream: StdStream, until_empty: bool) {
        let mut guard = process.lock();
        let ProcessState {
            pipes,
            stdout_buf,
            stderr_buf,
            ..
        } = &mut *guard;
        let (pipe, buffer) = match stream {
            StdStream::Stdout => (&mut pipes.stdout, stdout_buf),
            StdStream::Stderr => (&mut pipes.stderr, stderr_buf),
            StdStream::Stdin => return,
        };
        let Some(file) = pipe.as_mut() else {
            return;
        };
        match drain_pipe(file, buffer, self.config.read_chunk, until_empty) {
            Ok(Drain::Pending) => {}
            Ok(Drain::Eof) => *pipe = None,
            Err(err) => {
                warn!(process = %process.id, %stream, error = %err, "Failed to read child pipe");
                *pipe = None;
            }
        }
    }
}

fn build_command(spec: &LaunchSpec, options: &LaunchOptions) -> Command {
    let mut command = match spec {
        LaunchSpec::Shell(line) => {
            let mut command = Command::new("/bin/sh");
            command.arg("-c").arg(line);
            command
        }
        LaunchSpec::Program { path, args } => {
            let mut command = Command::new(path);
            command.args(args);
            command
        }
    };
    command.stdin(if options.stdin {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    command.stdout(if options.stdout {
        Stdio::piped()
    } else {
        Stdio::inherit()
    });
    command.stderr(if options.stderr {
        Stdio::piped()
    } else {
        Stdio::inherit()
    });
    command
}

fn set_nonblocking(file: &File) -> io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: `fd` is owned by `file`, which outlives both calls.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn remember_foreign_exit(
    foreign: &mut Vec<(libc::pid_t, libc::c_int)>,
    pid: libc::pid_t,
    raw: libc::c_int,
) {
    // A reused pid replaces the stale entry.
    foreign.retain(|(other, _)| *other != pid);
    if foreign.len() >= FOREIGN_EXIT_LIMIT {
        foreign.remove(0);
    }
    foreign.push((pid, raw));
}

pub(crate) fn send_signal(pid: libc::pid_t, signal: libc::c_int) -> bool {
    // SAFETY: plain kill(2); the caller only passes pids it has not reaped.
    unsafe { libc::kill(pid, signal) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.term_grace(), Duration::from_secs(1));
        assert_eq!(config.read_chunk(), 64 * 1024);
        assert_eq!(config.reap_scope(), ReapScope::Tracked);
    }

    #[test]
    fn test_read_chunk_never_zero() {
        let config = SupervisorConfig::default().with_read_chunk(0);
        assert_eq!(config.read_chunk(), 1);
    }

    #[test]
    fn test_reaper_starts_lazily_and_stops() {
        let supervisor = ProcessSupervisor::new(
            SupervisorConfig::default().with_reap_scope(ReapScope::Tracked),
        );
        assert!(!supervisor.is_reaper_running());
        supervisor.ensure_reaper().unwrap();
        assert!(supervisor.is_reaper_running());
        supervisor.shutdown();
        assert!(!supervisor.is_reaper_running());
    }

    #[test]
    fn test_unknown_pid_is_not_recorded() {
        let mut table = ProcessTable::default();
        assert!(table.record_exit(999_999, 0).is_none());
        assert!(table.entries.is_empty());
    }

    #[test]
    fn test_foreign_exits_replace_reused_pids_and_stay_bounded() {
        let mut foreign = Vec::new();
        remember_foreign_exit(&mut foreign, 42, 1);
        remember_foreign_exit(&mut foreign, 42, 2);
        assert_eq!(foreign, vec![(42, 2)]);

        for pid in 0..FOREIGN_EXIT_LIMIT as libc::pid_t {
            remember_foreign_exit(&mut foreign, 1000 + pid, 0);
        }
        assert_eq!(foreign.len(), FOREIGN_EXIT_LIMIT);
        assert!(!foreign.iter().any(|(pid, _)| *pid == 42));
    }

    #[test]
    fn test_tracked_supervisor_never_claims_any_child() {
        let supervisor = ProcessSupervisor::default();
        supervisor.ensure_reaper().unwrap();
        assert!(!supervisor.reaps_any_child());
        supervisor.shutdown();
    }
}
