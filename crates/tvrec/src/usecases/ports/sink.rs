use std::io;
use std::path::Path;
use std::sync::Arc;

use crate::domain::Whence;

/// Byte store behind a recording file or a live ring buffer. Written by the
/// recorder thread and read by the data streaming path.
pub trait RecordingSink: Send + Sync {
    fn path(&self) -> &Path;

    fn write(&self, data: &[u8]) -> io::Result<usize>;
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn seek(&self, pos: i64, whence: Whence) -> io::Result<i64>;

    fn read_position(&self) -> i64;
    fn write_position(&self) -> i64;
    /// Capacity of a ring buffer, current length of a plain file.
    fn file_size(&self) -> i64;
    /// Gap kept between writer and reader.
    fn smudge_size(&self) -> i64;

    fn stop_reads(&self);
    fn start_reads(&self);
    fn reads_stopped(&self) -> bool;

    /// Discards buffered data.
    fn reset(&self);

    fn set_write_buffer_size(&self, _bytes: usize) {}
    fn set_write_buffer_min_write_size(&self, _bytes: usize) {}
}

pub type RecordingSinkHandle = Arc<dyn RecordingSink>;

pub trait SinkFactory: Send + Sync {
    fn open_recording(&self, path: &Path) -> io::Result<RecordingSinkHandle>;
    fn open_ring(&self, path: &Path, size: u64, fill_threshold: u64)
    -> io::Result<RecordingSinkHandle>;
    fn remove(&self, path: &Path) -> io::Result<()>;
}

pub type SinkFactoryHandle = Arc<dyn SinkFactory>;
