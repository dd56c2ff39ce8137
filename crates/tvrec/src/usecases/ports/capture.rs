use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use crate::domain::CardType;
use crate::domain::DeviceConfig;
use crate::domain::PictureAttribute;
use crate::domain::PidCacheEntry;
use crate::domain::RecorderOptions;
use crate::domain::RecordingInfo;
use crate::usecases::ports::errors::CaptureError;
use crate::usecases::ports::signal_monitor::SignalMonitor;
use crate::usecases::ports::sink::RecordingSink;

const STATUS_POLL: Duration = Duration::from_millis(5);

/// Tuning side of a capture card.
///
/// Only the owning coordinator drives a channel, always under its lock.
pub trait CaptureChannel: Send {
    fn open(&mut self) -> Result<(), CaptureError>;
    fn close(&mut self);
    fn is_open(&self) -> bool;

    fn set_channel_by_name(&mut self, channum: &str) -> Result<(), CaptureError>;
    fn switch_to_input(&mut self, input: &str, channum: &str) -> Result<(), CaptureError>;
    fn toggle_inputs(&mut self) -> Result<(), CaptureError>;

    fn current_channel(&self) -> String;
    fn current_input(&self) -> String;

    /// Last channel tuned per input name.
    fn input_channels(&self) -> BTreeMap<String, String>;
    fn set_input_channels(&mut self, channels: BTreeMap<String, String>);

    fn set_channel_ordering(&mut self, _ordering: &str) {}

    /// Re-applies the stored brightness, contrast, colour and hue.
    fn apply_picture_settings(&mut self) {}

    /// Steps a picture attribute; returns the new value.
    fn change_picture_attribute(&mut self, _attr: PictureAttribute, _up: bool) -> Option<i32> {
        None
    }

    fn cached_pids(&self) -> Vec<PidCacheEntry> {
        Vec::new()
    }

    fn set_cached_pids(&mut self, _pids: Vec<PidCacheEntry>) {}
}

pub type CaptureChannelBox = Box<dyn CaptureChannel>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderStart {
    Recording,
    Errored,
    TimedOut,
}

/// Encoder writing frames to a sink. `run` blocks on the recorder worker
/// thread; every other method is called from the coordinator.
pub trait CaptureRecorder: Send + Sync {
    fn run(&self);
    fn stop_recording(&self);

    fn is_recording(&self) -> bool;
    fn is_errored(&self) -> bool;

    fn frames_written(&self) -> i64;
    fn frame_rate(&self) -> f64;
    fn keyframe_position(&self, desired: i64) -> Option<i64>;

    fn pause(&self, clear: bool);
    fn unpause(&self);
    fn is_paused(&self) -> bool;
    fn reset(&self);

    fn set_channel_name(&self, name: &str);
    fn set_video_filters(&self, _filters: &str) {}

    /// Blocks until the recorder records or fails, at most `timeout`.
    fn wait_until_started(&self, timeout: Duration) -> RecorderStart {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_errored() {
                return RecorderStart::Errored;
            }
            if self.is_recording() {
                return RecorderStart::Recording;
            }
            if Instant::now() >= deadline {
                return RecorderStart::TimedOut;
            }
            thread::sleep(STATUS_POLL);
        }
    }

    /// Blocks until a requested pause took effect, at most `timeout`.
    fn wait_for_pause(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_paused() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(STATUS_POLL);
        }
        true
    }
}

pub type CaptureRecorderHandle = Arc<dyn CaptureRecorder>;

/// Everything a backend needs to build a recorder.
pub struct RecorderSetup<'a> {
    pub device: &'a DeviceConfig,
    pub card_type: CardType,
    pub options: &'a RecorderOptions,
    pub sink: Arc<dyn RecordingSink>,
    /// `None` for live view.
    pub recording: Option<&'a RecordingInfo>,
}

/// Factory for the channel, recorder and signal monitor of one card type.
pub trait CaptureBackend: Send + Sync {
    fn open_channel(&self, device: &DeviceConfig) -> Result<CaptureChannelBox, CaptureError>;

    fn create_recorder(
        &self,
        setup: RecorderSetup<'_>,
    ) -> Result<Box<dyn CaptureRecorder>, CaptureError>;

    fn create_signal_monitor(
        &self,
        _device: &DeviceConfig,
        _channel: &dyn CaptureChannel,
    ) -> Option<Box<dyn SignalMonitor>> {
        None
    }
}

pub type CaptureBackendHandle = Arc<dyn CaptureBackend>;

/// Backends available in this build, keyed by card type.
#[derive(Clone, Default)]
pub struct CaptureBackends {
    backends: HashMap<CardType, CaptureBackendHandle>,
}

impl CaptureBackends {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, card_type: CardType, backend: CaptureBackendHandle) -> Self {
        self.backends.insert(card_type, backend);
        self
    }

    pub fn resolve(&self, card_type: CardType) -> Option<CaptureBackendHandle> {
        self.backends.get(&card_type).cloned()
    }

    pub fn card_types(&self) -> Vec<CardType> {
        let mut types: Vec<CardType> = self.backends.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}
