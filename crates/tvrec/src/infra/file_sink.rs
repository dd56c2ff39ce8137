//! File-backed recording sinks.
//!
//! Positions are logical byte offsets that only grow. A plain recording
//! file maps them 1:1 onto the file; a ring buffer maps them modulo its
//! capacity and drops the oldest unread bytes when the writer laps the
//! reader.

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tracing::debug;
use tracing::warn;
use tvrec_common::mutex_lock_or_recover;

use crate::domain::Whence;
use crate::usecases::ports::RecordingSink;
use crate::usecases::ports::RecordingSinkHandle;
use crate::usecases::ports::SinkFactory;

/// Gap kept between a ring writer and its reader.
const RING_SMUDGE: i64 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Plain,
    Ring { capacity: u64 },
}

struct Positions {
    write_pos: i64,
    read_pos: i64,
    pending: Vec<u8>,
    min_write: usize,
}

pub struct FileSink {
    path: PathBuf,
    file: File,
    layout: Layout,
    fill_threshold: u64,
    positions: Mutex<Positions>,
    reads_stopped: AtomicBool,
}

impl FileSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        Self::open(path, Layout::Plain, 0)
    }

    pub fn create_ring(path: &Path, capacity: u64, fill_threshold: u64) -> io::Result<Self> {
        if capacity == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "ring buffer capacity must be positive",
            ));
        }
        Self::open(path, Layout::Ring { capacity }, fill_threshold)
    }

    fn open(path: &Path, layout: Layout, fill_threshold: u64) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        debug!(path = %path.display(), ?layout, "Opened sink");
        Ok(Self {
            path: path.to_path_buf(),
            file,
            layout,
            fill_threshold,
            positions: Mutex::new(Positions {
                write_pos: 0,
                read_pos: 0,
                pending: Vec::new(),
                min_write: 1,
            }),
            reads_stopped: AtomicBool::new(false),
        })
    }

    pub fn fill_threshold(&self) -> u64 {
        self.fill_threshold
    }

    pub fn is_ring(&self) -> bool {
        matches!(self.layout, Layout::Ring { .. })
    }

    /// Writes out bytes held back by the minimum write size.
    pub fn flush(&self) -> io::Result<()> {
        let mut positions = mutex_lock_or_recover(&self.positions);
        self.flush_pending(&mut positions)
    }

    fn flush_pending(&self, positions: &mut Positions) -> io::Result<()> {
        if positions.pending.is_empty() {
            return Ok(());
        }
        let data = std::mem::take(&mut positions.pending);
        self.write_at_logical(positions.write_pos, &data)?;
        positions.write_pos += data.len() as i64;
        if let Layout::Ring { capacity } = self.layout {
            let oldest = positions.write_pos - capacity as i64;
            if positions.read_pos < oldest {
                warn!(
                    path = %self.path.display(),
                    dropped = oldest - positions.read_pos,
                    "Ring buffer overran its reader"
                );
                positions.read_pos = oldest;
            }
        }
        Ok(())
    }

    fn write_at_logical(&self, pos: i64, data: &[u8]) -> io::Result<()> {
        match self.layout {
            Layout::Plain => self.file.write_all_at(data, pos as u64),
            Layout::Ring { capacity } => {
                let mut offset = pos as u64 % capacity;
                // A single write longer than the ring only keeps its tail.
                let skip = data.len().saturating_sub(capacity as usize);
                if skip > 0 {
                    offset = (offset + skip as u64) % capacity;
                }
                let mut rest = &data[skip..];
                while !rest.is_empty() {
                    let room = (capacity - offset) as usize;
                    let n = rest.len().min(room);
                    self.file.write_all_at(&rest[..n], offset)?;
                    rest = &rest[n..];
                    offset = (offset + n as u64) % capacity;
                }
                Ok(())
            }
        }
    }

    fn read_at_logical(&self, pos: i64, buf: &mut [u8]) -> io::Result<usize> {
        match self.layout {
            Layout::Plain => read_fully_at(&self.file, buf, pos as u64),
            Layout::Ring { capacity } => {
                let mut offset = pos as u64 % capacity;
                let mut filled = 0;
                while filled < buf.len() {
                    let room = (capacity - offset) as usize;
                    let n = (buf.len() - filled).min(room);
                    let got = read_fully_at(&self.file, &mut buf[filled..filled + n], offset)?;
                    filled += got;
                    if got < n {
                        break;
                    }
                    offset = (offset + n as u64) % capacity;
                }
                Ok(filled)
            }
        }
    }

    fn oldest_position(&self, write_pos: i64) -> i64 {
        match self.layout {
            Layout::Plain => 0,
            Layout::Ring { capacity } => (write_pos - capacity as i64).max(0),
        }
    }
}

fn read_fully_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

impl RecordingSink for FileSink {
    fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, data: &[u8]) -> io::Result<usize> {
        let mut positions = mutex_lock_or_recover(&self.positions);
        positions.pending.extend_from_slice(data);
        if positions.pending.len() >= positions.min_write {
            self.flush_pending(&mut positions)?;
        }
        Ok(data.len())
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if self.reads_stopped() {
            return Ok(0);
        }
        let mut positions = mutex_lock_or_recover(&self.positions);
        let available = (positions.write_pos - positions.read_pos).max(0) as usize;
        let want = buf.len().min(available);
        if want == 0 {
            return Ok(0);
        }
        let n = self.read_at_logical(positions.read_pos, &mut buf[..want])?;
        positions.read_pos += n as i64;
        Ok(n)
    }

    fn seek(&self, pos: i64, whence: Whence) -> io::Result<i64> {
        let mut positions = mutex_lock_or_recover(&self.positions);
        let target = match whence {
            Whence::Set => pos,
            Whence::Cur => positions.read_pos + pos,
            Whence::End => positions.write_pos + pos,
        };
        if target < 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "negative seek"));
        }
        let oldest = self.oldest_position(positions.write_pos);
        positions.read_pos = target.clamp(oldest, positions.write_pos);
        Ok(positions.read_pos)
    }

    fn read_position(&self) -> i64 {
        mutex_lock_or_recover(&self.positions).read_pos
    }

    fn write_position(&self) -> i64 {
        mutex_lock_or_recover(&self.positions).write_pos
    }

    fn file_size(&self) -> i64 {
        match self.layout {
            Layout::Plain => self.write_position(),
            Layout::Ring { capacity } => capacity as i64,
        }
    }

    fn smudge_size(&self) -> i64 {
        match self.layout {
            Layout::Plain => 0,
            Layout::Ring { .. } => RING_SMUDGE,
        }
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
        let mut positions = mutex_lock_or_recover(&self.positions);
        positions.pending.clear();
        positions.write_pos = 0;
        positions.read_pos = 0;
        if self.layout == Layout::Plain {
            if let Err(e) = self.file.set_len(0) {
                warn!(path = %self.path.display(), error = %e, "Failed to truncate sink");
            }
        }
    }

    fn set_write_buffer_size(&self, bytes: usize) {
        let mut positions = mutex_lock_or_recover(&self.positions);
        let additional = bytes.saturating_sub(positions.pending.len());
        positions.pending.reserve(additional);
    }

    fn set_write_buffer_min_write_size(&self, bytes: usize) {
        mutex_lock_or_recover(&self.positions).min_write = bytes.max(1);
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let mut positions = mutex_lock_or_recover(&self.positions);
        if let Err(e) = self.flush_pending(&mut positions) {
            warn!(path = %self.path.display(), error = %e, "Failed to flush sink on close");
        }
    }
}

/// Creates sinks on the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileSinkFactory;

impl FileSinkFactory {
    pub fn new() -> Self {
        Self
    }
}

fn ensure_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

impl SinkFactory for FileSinkFactory {
    fn open_recording(&self, path: &Path) -> io::Result<RecordingSinkHandle> {
        ensure_parent(path)?;
        Ok(Arc::new(FileSink::create(path)?))
    }

    fn open_ring(
        &self,
        path: &Path,
        size: u64,
        fill_threshold: u64,
    ) -> io::Result<RecordingSinkHandle> {
        ensure_parent(path)?;
        Ok(Arc::new(FileSink::create_ring(path, size, fill_threshold)?))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "Removed sink file");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_sink_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::create(&dir.path().join("rec.nuv")).unwrap();
        sink.write(b"hello world").unwrap();
        assert_eq!(sink.write_position(), 11);
        assert_eq!(sink.file_size(), 11);

        let mut buf = [0u8; 5];
        assert_eq!(sink.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(sink.read_position(), 5);
    }

    #[test]
    fn test_ring_wraps_and_keeps_newest_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::create_ring(&dir.path().join("ring.nuv"), 8, 4).unwrap();
        sink.write(b"abcdef").unwrap();
        sink.write(b"ghij").unwrap();
        assert_eq!(sink.write_position(), 10);
        // Reader was lapped: the oldest two bytes are gone.
        assert_eq!(sink.read_position(), 2);

        let mut buf = [0u8; 8];
        assert_eq!(sink.read(&mut buf).unwrap(), 8);
        assert_eq!(&buf, b"cdefghij");
        assert_eq!(sink.file_size(), 8);
    }

    #[test]
    fn test_min_write_size_holds_back_small_writes() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::create(&dir.path().join("rec.nuv")).unwrap();
        sink.set_write_buffer_min_write_size(4);
        sink.write(b"ab").unwrap();
        assert_eq!(sink.write_position(), 0);
        sink.write(b"cd").unwrap();
        assert_eq!(sink.write_position(), 4);
        sink.write(b"e").unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.write_position(), 5);
    }

    #[test]
    fn test_stopped_reads_return_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::create(&dir.path().join("rec.nuv")).unwrap();
        sink.write(b"data").unwrap();
        sink.stop_reads();
        let mut buf = [0u8; 4];
        assert_eq!(sink.read(&mut buf).unwrap(), 0);
        sink.start_reads();
        assert_eq!(sink.read(&mut buf).unwrap(), 4);
    }

    #[test]
    fn test_seek_clamps_to_written_range() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::create_ring(&dir.path().join("ring.nuv"), 4, 0).unwrap();
        sink.write(b"123456").unwrap();
        assert_eq!(sink.seek(0, Whence::Set).unwrap(), 2);
        assert_eq!(sink.seek(100, Whence::Set).unwrap(), 6);
        assert_eq!(sink.seek(-1, Whence::End).unwrap(), 5);
        assert_eq!(sink.seek(-1, Whence::Cur).unwrap(), 4);
        assert!(sink.seek(-10, Whence::Set).is_err());
    }

    #[test]
    fn test_reset_discards_data() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileSink::create(&dir.path().join("rec.nuv")).unwrap();
        sink.write(b"data").unwrap();
        sink.reset();
        assert_eq!(sink.write_position(), 0);
        assert_eq!(sink.read_position(), 0);
    }

    #[test]
    fn test_factory_creates_parent_and_ignores_missing_on_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("rec.nuv");
        let factory = FileSinkFactory::new();
        let sink = factory.open_recording(&path).unwrap();
        sink.write(b"x").unwrap();
        assert!(path.exists());
        drop(sink);

        factory.remove(&path).unwrap();
        assert!(!path.exists());
        factory.remove(&path).unwrap();
    }

    #[test]
    fn test_zero_capacity_ring_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileSink::create_ring(&dir.path().join("ring.nuv"), 0, 0).is_err());
    }
}
