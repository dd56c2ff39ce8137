//! Live ring buffer and the viewer data path.

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::CoordinatorInner;
use super::CoordinatorState;
use super::RecordingCoordinator;
use crate::domain::RingBufferInfo;
use crate::domain::Whence;
use crate::usecases::ports::DataEndpointHandle;

/// Largest chunk moved to the viewer per read.
pub const REQUEST_BLOCK_SIZE: usize = 256_000;

impl CoordinatorInner {
    pub(crate) fn create_ring_buffer(
        &self,
        state: &mut CoordinatorState,
        pip: bool,
    ) -> Option<RingBufferInfo> {
        if state.sink.is_some() {
            warn!(cardid = self.cardid, "Ring buffer already set up");
            return None;
        }
        let path = self
            .settings
            .live_buffer_dir()
            .join(format!("ringbuf{}.nuv", self.cardid));
        let size = self.settings.live_buffer_bytes();
        let fill = self.settings.live_buffer_fill_bytes();

        let sink = match self.sinks.open_ring(&path, size, fill) {
            Ok(sink) => sink,
            Err(err) => {
                error!(cardid = self.cardid, path = %path.display(), error = %err, "Failed to open ring buffer");
                return None;
            }
        };
        sink.set_write_buffer_min_write_size(1);
        self.lock_data().sink = Some(sink.clone());
        state.sink = Some(sink);
        state.output_path = Some(path.clone());
        state.pip = pip;
        info!(cardid = self.cardid, path = %path.display(), size, fill, pip, "Ring buffer ready");
        Some(RingBufferInfo { path, size, fill })
    }
}

impl RecordingCoordinator {
    /// Creates the live ring buffer. A second buffer is refused.
    pub fn setup_ring_buffer(&self, pip: bool) -> Option<RingBufferInfo> {
        let mut state = self.inner.lock();
        self.inner.create_ring_buffer(&mut state, pip)
    }

    /// Attaches or detaches the viewer data channel. Detaching waits for a
    /// block transfer in flight.
    pub fn set_data_endpoint(&self, endpoint: Option<DataEndpointHandle>) {
        match endpoint {
            Some(endpoint) => {
                let mut data = self.inner.lock_data();
                data.endpoint = Some(endpoint);
                data.live = true;
                debug!(cardid = self.inner.cardid, "Data endpoint attached");
            }
            None => {
                let sink = self.inner.lock_data().sink.clone();
                if let Some(sink) = sink.as_ref() {
                    sink.stop_reads();
                }
                let mut data = self.inner.lock_data();
                data.endpoint = None;
                data.live = false;
                debug!(cardid = self.inner.cardid, "Data endpoint detached");
            }
        }
    }

    /// Sends up to `size` bytes of the sink to the viewer. Returns the
    /// bytes sent, -1 without a sink or endpoint or when sending fails.
    pub fn request_data_block(&self, size: usize) -> i64 {
        let data = self.inner.lock_data();
        let (Some(sink), Some(endpoint)) = (data.sink.as_ref(), data.endpoint.as_ref()) else {
            return -1;
        };
        if !data.live {
            return -1;
        }

        let mut buf = vec![0u8; size.min(REQUEST_BLOCK_SIZE)];
        let mut sent = 0usize;
        while sent < size {
            if sink.reads_stopped() {
                break;
            }
            let want = (size - sent).min(REQUEST_BLOCK_SIZE);
            let Some(chunk) = buf.get_mut(..want) else {
                break;
            };
            let read = match sink.read(chunk) {
                Ok(read) => read,
                Err(err) => {
                    warn!(cardid = self.inner.cardid, error = %err, "Ring buffer read failed");
                    break;
                }
            };
            if read == 0 {
                break;
            }
            if let Err(err) = endpoint.write_block(&chunk[..read]) {
                warn!(cardid = self.inner.cardid, error = %err, "Failed to send data block");
                return -1;
            }
            sent += read;
            if read < want {
                break;
            }
        }
        i64::try_from(sent).unwrap_or(i64::MAX)
    }

    /// Moves the viewer's read position. `Whence::Cur` is relative to the
    /// viewer's position `cur`, not the sink's.
    pub fn seek_ring_buffer(&self, cur: i64, pos: i64, whence: Whence) -> i64 {
        let sink = {
            let data = self.inner.lock_data();
            match (data.sink.as_ref(), data.endpoint.is_some() && data.live) {
                (Some(sink), true) => sink.clone(),
                _ => return -1,
            }
        };
        sink.stop_reads();
        let _data = self.inner.lock_data();
        sink.start_reads();

        let target = if whence == Whence::Cur {
            match pos
                .checked_add(cur)
                .and_then(|offset| offset.checked_sub(sink.read_position()))
            {
                Some(target) => target,
                None => {
                    warn!(cardid = self.inner.cardid, cur, pos, "Ring buffer seek out of range");
                    return -1;
                }
            }
        } else {
            pos
        };
        match sink.seek(target, whence) {
            Ok(position) => position,
            Err(err) => {
                warn!(cardid = self.inner.cardid, error = %err, "Ring buffer seek failed");
                -1
            }
        }
    }

    pub fn frames_written(&self) -> i64 {
        self.inner
            .lock()
            .recorder
            .as_ref()
            .map_or(-1, |active| active.recorder.frames_written())
    }

    pub fn frame_rate(&self) -> f64 {
        self.inner.lock().frame_rate
    }

    /// Bytes written to the sink, -1 without one.
    pub fn file_position(&self) -> i64 {
        self.inner
            .lock()
            .sink
            .as_ref()
            .map_or(-1, |sink| sink.write_position())
    }

    pub fn keyframe_position(&self, desired: i64) -> i64 {
        self.inner
            .lock()
            .recorder
            .as_ref()
            .and_then(|active| active.recorder.keyframe_position(desired))
            .unwrap_or(-1)
    }

    /// Room left before the writer catches up with a reader at `readpos`.
    pub fn free_space(&self, readpos: i64) -> i64 {
        self.inner.lock().sink.as_ref().map_or(-1, |sink| {
            readpos
                .checked_add(sink.file_size())
                .and_then(|room| room.checked_sub(sink.write_position()))
                .and_then(|room| room.checked_sub(sink.smudge_size()))
                .unwrap_or(-1)
        })
    }

    pub fn max_bitrate(&self) -> i64 {
        self.inner.card_type.max_bitrate()
    }
}
