//! In-memory sink and factory.

use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tvrec_common::mutex_lock_or_recover;

use crate::domain::Whence;
use crate::usecases::ports::RecordingSink;
use crate::usecases::ports::RecordingSinkHandle;
use crate::usecases::ports::SinkFactory;

#[derive(Default)]
struct SinkData {
    bytes: Vec<u8>,
    read_pos: i64,
    resets: usize,
    write_buffer: Option<usize>,
    min_write: Option<usize>,
}

pub struct MockSink {
    path: PathBuf,
    capacity: i64,
    data: Mutex<SinkData>,
    reads_stopped: AtomicBool,
}

impl MockSink {
    pub fn new(path: impl Into<PathBuf>, capacity: i64) -> Self {
        Self {
            path: path.into(),
            capacity,
            data: Mutex::new(SinkData::default()),
            reads_stopped: AtomicBool::new(false),
        }
    }

    pub fn resets(&self) -> usize {
        mutex_lock_or_recover(&self.data).resets
    }

    pub fn write_buffer_size(&self) -> Option<usize> {
        mutex_lock_or_recover(&self.data).write_buffer
    }

    pub fn min_write_size(&self) -> Option<usize> {
        mutex_lock_or_recover(&self.data).min_write
    }
}

impl RecordingSink for MockSink {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, data: &[u8]) -> io::Result<usize> {
        mutex_lock_or_recover(&self.data).bytes.extend_from_slice(data);
        Ok(data.len())
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let mut data = mutex_lock_or_recover(&self.data);
        let start = usize::try_from(data.read_pos).unwrap_or(0).min(data.bytes.len());
        let n = buf.len().min(data.bytes.len() - start);
        buf[..n].copy_from_slice(&data.bytes[start..start + n]);
        data.read_pos += n as i64;
        Ok(n)
    }

    fn seek(&self, pos: i64, whence: Whence) -> io::Result<i64> {
        let mut data = mutex_lock_or_recover(&self.data);
        let len = data.bytes.len() as i64;
        let target = match whence {
            Whence::Set => pos,
            Whence::Cur => data.read_pos + pos,
            Whence::End => len + pos,
        };
        if target < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "negative seek"));
        }
        data.read_pos = target.min(len);
        Ok(data.read_pos)
    }

    fn read_position(&self) -> i64 {
        mutex_lock_or_recover(&self.data).read_pos
    }

    fn write_position(&self) -> i64 {
        mutex_lock_or_recover(&self.data).bytes.len() as i64
    }

    fn file_size(&self) -> i64 {
        self.capacity
    }

    fn smudge_size(&self) -> i64 {
        1024
    }

    fn stop_reads(&self) {
        self.reads_stopped.store(true, Ordering::SeqCst);
    }

    fn start_reads(&self) {
        self.reads_stopped.store(false, Ordering::SeqCst);
    }

    fn reads_stopped(&self) -> bool {
        self.reads_stopped.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        mutex_lock_or_recover(&self.data).resets += 1;
    }

    fn set_write_buffer_size(&self, bytes: usize) {
        mutex_lock_or_recover(&self.data).write_buffer = Some(bytes);
    }

    fn set_write_buffer_min_write_size(&self, bytes: usize) {
        mutex_lock_or_recover(&self.data).min_write = Some(bytes);
    }
}

#[derive(Default)]
struct FactoryState {
    fail_recordings: bool,
    fail_rings: bool,
    opened: Vec<Arc<MockSink>>,
    removed: BTreeSet<PathBuf>,
}

#[derive(Default)]
pub struct MockSinkFactory {
    state: Mutex<FactoryState>,
}

impl MockSinkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_recordings(&self, fail: bool) {
        mutex_lock_or_recover(&self.state).fail_recordings = fail;
    }

    pub fn fail_rings(&self, fail: bool) {
        mutex_lock_or_recover(&self.state).fail_rings = fail;
    }

    pub fn opened(&self) -> Vec<Arc<MockSink>> {
        mutex_lock_or_recover(&self.state).opened.clone()
    }

    pub fn last_opened(&self) -> Option<Arc<MockSink>> {
        mutex_lock_or_recover(&self.state).opened.last().cloned()
    }

    pub fn removed(&self) -> BTreeSet<PathBuf> {
        mutex_lock_or_recover(&self.state).removed.clone()
    }
}

impl SinkFactory for MockSinkFactory {
    fn open_recording(&self, path: &Path) -> io::Result<RecordingSinkHandle> {
        let mut state = mutex_lock_or_recover(&self.state);
        if state.fail_recordings {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        let sink = Arc::new(MockSink::new(path, 0));
        state.opened.push(Arc::clone(&sink));
        Ok(sink)
    }

    fn open_ring(
        &self,
        path: &Path,
        size: u64,
        _fill_threshold: u64,
    ) -> io::Result<RecordingSinkHandle> {
        let mut state = mutex_lock_or_recover(&self.state);
        if state.fail_rings {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        let sink = Arc::new(MockSink::new(path, i64::try_from(size).unwrap_or(i64::MAX)));
        state.opened.push(Arc::clone(&sink));
        Ok(sink)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        mutex_lock_or_recover(&self.state)
            .removed
            .insert(path.to_path_buf());
        Ok(())
    }
}
