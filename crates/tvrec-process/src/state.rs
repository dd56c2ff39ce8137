use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Instant;

use tvrec_common::mutex_lock_or_recover;

use crate::flags::LaunchOptions;
use crate::hooks::{UiHandle, UiLocks};
use crate::status::ProcessStatus;

/// Supervisor-issued identifier, stable for the life of the supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(pub(crate) u64);

impl ProcessId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proc-{}", self.0)
    }
}

/// Captured output. Appended by the reaper; `read` consumes from `pos`.
#[derive(Debug, Default)]
pub(crate) struct StdioBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl StdioBuffer {
    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn read(&mut self, max: usize) -> Vec<u8> {
        let end = self.data.len().min(self.pos.saturating_add(max));
        let chunk = self.data[self.pos..end].to_vec();
        self.pos = end;
        chunk
    }

    pub fn all(&self) -> Vec<u8> {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Pipes {
    pub stdin: Option<File>,
    pub stdout: Option<File>,
    pub stderr: Option<File>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Drain {
    /// Pipe still open, nothing more right now.
    Pending,
    /// Writer side closed.
    Eof,
}

/// Reads whatever is available from a non-blocking pipe into `buffer`.
/// Reads at most `chunk` bytes per `read` call, and stops after one call
/// unless `until_empty` is set.
pub(crate) fn drain_pipe(
    pipe: &mut File,
    buffer: &mut StdioBuffer,
    chunk: usize,
    until_empty: bool,
) -> io::Result<Drain> {
    let mut scratch = vec![0u8; chunk.max(1)];
    loop {
        match pipe.read(&mut scratch) {
            Ok(0) => return Ok(Drain::Eof),
            Ok(n) => {
                buffer.append(&scratch[..n]);
                if !until_empty {
                    return Ok(Drain::Pending);
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(Drain::Pending),
            Err(err) => return Err(err),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ProcessState {
    pub status: ProcessStatus,
    pub pid: Option<libc::pid_t>,
    pub deadline: Option<Instant>,
    pub timed_out: bool,
    /// Set once the exit status is recorded and pipes are released.
    pub finished: bool,
    pub pipes: Pipes,
    pub stdout_buf: StdioBuffer,
    pub stderr_buf: StdioBuffer,
    pub ui_locks: UiLocks,
}

impl ProcessState {
    fn new() -> Self {
        Self {
            status: ProcessStatus::Start,
            pid: None,
            deadline: None,
            timed_out: false,
            finished: false,
            pipes: Pipes::default(),
            stdout_buf: StdioBuffer::default(),
            stderr_buf: StdioBuffer::default(),
            ui_locks: UiLocks::default(),
        }
    }
}

/// State shared between a handle and the supervisor's table.
pub(crate) struct ProcessShared {
    pub id: ProcessId,
    pub label: String,
    pub options: LaunchOptions,
    pub ui: UiHandle,
    state: Mutex<ProcessState>,
    pub finished_cond: Condvar,
}

impl ProcessShared {
    pub fn new(id: ProcessId, label: String, options: LaunchOptions, ui: UiHandle) -> Self {
        Self {
            id,
            label,
            options,
            ui,
            state: Mutex::new(ProcessState::new()),
            finished_cond: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, ProcessState> {
        mutex_lock_or_recover(&self.state)
    }

    pub fn status(&self) -> ProcessStatus {
        self.lock().status
    }

    /// Records a launch failure: final status, nothing to reap.
    pub fn fail_launch(&self, status: ProcessStatus) {
        let mut locks = {
            let mut state = self.lock();
            state.status = status;
            state.finished = true;
            std::mem::take(&mut state.ui_locks)
        };
        locks.release(self.ui.as_ref());
        self.finished_cond.notify_all();
    }

    /// Post-exit cleanup: release UI locks, close pipes, wake waiters.
    pub fn finish(&self) {
        let mut locks = {
            let mut state = self.lock();
            state.pipes = Pipes::default();
            state.pid = None;
            state.deadline = None;
            state.finished = true;
            std::mem::take(&mut state.ui_locks)
        };
        locks.release(self.ui.as_ref());
        self.finished_cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_read_consumes_but_all_keeps_everything() {
        let mut buf = StdioBuffer::default();
        buf.append(b"hello ");
        buf.append(b"world");

        assert_eq!(buf.read(5), b"hello");
        assert_eq!(buf.read(100), b" world");
        assert!(buf.read(10).is_empty());
        assert_eq!(buf.all(), b"hello world");
        assert_eq!(buf.len(), 11);
    }

    #[test]
    fn test_drain_pipe_reads_until_eof() {
        let mut file = tempfile::tempfile().unwrap();
        std::io::Write::write_all(&mut file, b"abcdefghij").unwrap();
        std::io::Seek::rewind(&mut file).unwrap();

        let mut buf = StdioBuffer::default();
        let result = drain_pipe(&mut file, &mut buf, 4, true).unwrap();
        assert_eq!(result, Drain::Eof);
        assert_eq!(buf.all(), b"abcdefghij");
    }

    #[test]
    fn test_drain_pipe_single_chunk() {
        let mut file = tempfile::tempfile().unwrap();
        std::io::Write::write_all(&mut file, b"abcdefghij").unwrap();
        std::io::Seek::rewind(&mut file).unwrap();

        let mut buf = StdioBuffer::default();
        let result = drain_pipe(&mut file, &mut buf, 4, false).unwrap();
        assert_eq!(result, Drain::Pending);
        assert_eq!(buf.all(), b"abcd");
    }
}
