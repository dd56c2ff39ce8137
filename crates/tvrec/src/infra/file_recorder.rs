//! Software capture backend fed from a transport stream file.
//!
//! The recorder replays the source file in a loop at a fixed frame rate,
//! so it can stand in for any card type. The channel keeps per-input
//! tuning state without touching hardware.

use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use tvrec_common::condvar_wait_timeout_or_recover;
use tvrec_common::mutex_lock_or_recover;

use crate::domain::DeviceConfig;
use crate::domain::PictureAttribute;
use crate::domain::PidCacheEntry;
use crate::usecases::ports::CaptureBackend;
use crate::usecases::ports::CaptureChannel;
use crate::usecases::ports::CaptureChannelBox;
use crate::usecases::ports::CaptureError;
use crate::usecases::ports::CaptureRecorder;
use crate::usecases::ports::ChannelDatabaseHandle;
use crate::usecases::ports::RecorderSetup;
use crate::usecases::ports::RecordingSinkHandle;

/// 64 transport stream packets.
pub const FRAME_BYTES: usize = 188 * 64;
pub const DEFAULT_FRAME_RATE: f64 = 25.0;
const KEYFRAME_INTERVAL: i64 = 12;
const DEFAULT_INPUT: &str = "Television";
const PICTURE_DEFAULT: i32 = 32_768;
const PICTURE_STEP: i32 = 655;
const PICTURE_MAX: i32 = 65_535;

pub struct FileInputBackend {
    db: ChannelDatabaseHandle,
    frame_rate: f64,
}

impl FileInputBackend {
    pub fn new(db: ChannelDatabaseHandle) -> Self {
        Self {
            db,
            frame_rate: DEFAULT_FRAME_RATE,
        }
    }

    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = frame_rate;
        self
    }
}

impl CaptureBackend for FileInputBackend {
    fn open_channel(&self, device: &DeviceConfig) -> Result<CaptureChannelBox, CaptureError> {
        let inputs = self.db.inputs().map_err(|e| CaptureError::Open {
            device: device.video_device.clone(),
            reason: e.to_string(),
        })?;
        let mut names: Vec<String> = inputs
            .into_iter()
            .filter(|input| input.cardid == device.cardid)
            .map(|input| input.name)
            .collect();
        if names.is_empty() {
            names.push(if device.default_input.is_empty() {
                DEFAULT_INPUT.to_string()
            } else {
                device.default_input.clone()
            });
        }
        Ok(Box::new(SoftwareChannel::new(
            device.video_device.clone(),
            names,
        )))
    }

    fn create_recorder(
        &self,
        setup: RecorderSetup<'_>,
    ) -> Result<Box<dyn CaptureRecorder>, CaptureError> {
        let source = setup
            .device
            .file_input_path()
            .unwrap_or(&setup.device.video_device);
        if source.is_empty() {
            return Err(CaptureError::RecorderSetup(format!(
                "card {} has no source file",
                setup.device.cardid
            )));
        }
        debug!(
            cardid = setup.device.cardid,
            card_type = %setup.card_type,
            source,
            options = setup.options.len(),
            live = setup.recording.is_none(),
            "Creating file input recorder"
        );
        Ok(Box::new(FileInputRecorder::new(
            PathBuf::from(source),
            setup.sink,
            self.frame_rate,
        )))
    }
}

/// Tuner without hardware: remembers the channel tuned on each input.
pub struct SoftwareChannel {
    device: String,
    open: bool,
    inputs: Vec<String>,
    current: usize,
    channel: String,
    input_channels: BTreeMap<String, String>,
    ordering: String,
    picture: [i32; 4],
    pids: Vec<PidCacheEntry>,
}

impl SoftwareChannel {
    pub fn new(device: impl Into<String>, inputs: Vec<String>) -> Self {
        let inputs = if inputs.is_empty() {
            vec![DEFAULT_INPUT.to_string()]
        } else {
            inputs
        };
        Self {
            device: device.into(),
            open: false,
            inputs,
            current: 0,
            channel: String::new(),
            input_channels: BTreeMap::new(),
            ordering: String::new(),
            picture: [PICTURE_DEFAULT; 4],
            pids: Vec::new(),
        }
    }

    pub fn ordering(&self) -> &str {
        &self.ordering
    }

    fn require_open(&self) -> Result<(), CaptureError> {
        if self.open {
            return Ok(());
        }
        Err(CaptureError::Open {
            device: self.device.clone(),
            reason: "channel is closed".to_string(),
        })
    }

    fn input_name(&self) -> &str {
        self.inputs
            .get(self.current)
            .map(String::as_str)
            .unwrap_or(DEFAULT_INPUT)
    }
}

fn picture_slot(attr: PictureAttribute) -> usize {
    match attr {
        PictureAttribute::Contrast => 0,
        PictureAttribute::Brightness => 1,
        PictureAttribute::Colour => 2,
        PictureAttribute::Hue => 3,
    }
}

impl CaptureChannel for SoftwareChannel {
    fn open(&mut self) -> Result<(), CaptureError> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn set_channel_by_name(&mut self, channum: &str) -> Result<(), CaptureError> {
        self.require_open()?;
        let channum = channum.trim();
        if channum.is_empty() {
            return Err(CaptureError::Tune {
                channel: String::new(),
                reason: "empty channel number".to_string(),
            });
        }
        self.channel = channum.to_string();
        let input = self.input_name().to_string();
        self.input_channels.insert(input, self.channel.clone());
        debug!(device = %self.device, channum, "Tuned");
        Ok(())
    }

    fn switch_to_input(&mut self, input: &str, channum: &str) -> Result<(), CaptureError> {
        self.require_open()?;
        let Some(index) = self.inputs.iter().position(|name| name == input) else {
            return Err(CaptureError::UnknownInput(input.to_string()));
        };
        self.current = index;
        if channum.is_empty() {
            self.channel = self
                .input_channels
                .get(input)
                .cloned()
                .unwrap_or_default();
            return Ok(());
        }
        self.set_channel_by_name(channum)
    }

    fn toggle_inputs(&mut self) -> Result<(), CaptureError> {
        self.require_open()?;
        let next = (self.current + 1) % self.inputs.len();
        let input = self.inputs[next].clone();
        self.switch_to_input(&input, "")
    }

    fn current_channel(&self) -> String {
        self.channel.clone()
    }

    fn current_input(&self) -> String {
        self.input_name().to_string()
    }

    fn input_channels(&self) -> BTreeMap<String, String> {
        self.input_channels.clone()
    }

    fn set_input_channels(&mut self, channels: BTreeMap<String, String>) {
        self.input_channels = channels;
    }

    fn set_channel_ordering(&mut self, ordering: &str) {
        self.ordering = ordering.to_string();
    }

    fn change_picture_attribute(&mut self, attr: PictureAttribute, up: bool) -> Option<i32> {
        let slot = &mut self.picture[picture_slot(attr)];
        let step = if up { PICTURE_STEP } else { -PICTURE_STEP };
        *slot = (*slot + step).clamp(0, PICTURE_MAX);
        Some(*slot)
    }

    fn cached_pids(&self) -> Vec<PidCacheEntry> {
        self.pids.clone()
    }

    fn set_cached_pids(&mut self, pids: Vec<PidCacheEntry>) {
        self.pids = pids;
    }
}

#[derive(Default)]
struct RecorderState {
    recording: bool,
    errored: bool,
    stop: bool,
    pause_requested: bool,
    paused: bool,
    frames: i64,
    channel_name: String,
    video_filters: String,
}

pub struct FileInputRecorder {
    source: PathBuf,
    sink: RecordingSinkHandle,
    frame_rate: f64,
    state: Mutex<RecorderState>,
    cond: Condvar,
}

impl FileInputRecorder {
    pub fn new(source: PathBuf, sink: RecordingSinkHandle, frame_rate: f64) -> Self {
        Self {
            source,
            sink,
            frame_rate,
            state: Mutex::new(RecorderState::default()),
            cond: Condvar::new(),
        }
    }

    fn frame_interval(&self) -> Duration {
        if self.frame_rate > 0.0 {
            Duration::from_secs_f64(1.0 / self.frame_rate)
        } else {
            Duration::from_millis(40)
        }
    }

    fn open_source(&self) -> io::Result<File> {
        let file = File::open(&self.source)?;
        if file.metadata()?.len() == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "source is empty"));
        }
        Ok(file)
    }

    fn fail(&self, reason: &dyn std::fmt::Display) {
        error!(source = %self.source.display(), error = %reason, "File input recorder failed");
        let mut state = mutex_lock_or_recover(&self.state);
        state.errored = true;
        state.recording = false;
        self.cond.notify_all();
    }

    /// Reads the next frame, rewinding at the end of the source.
    fn next_frame(file: &mut File, buf: &mut [u8]) -> io::Result<usize> {
        let n = file.read(buf)?;
        if n > 0 {
            return Ok(n);
        }
        file.seek(SeekFrom::Start(0))?;
        file.read(buf)
    }
}

impl CaptureRecorder for FileInputRecorder {
    fn run(&self) {
        let mut file = match self.open_source() {
            Ok(file) => file,
            Err(e) => {
                self.fail(&e);
                return;
            }
        };
        {
            let mut state = mutex_lock_or_recover(&self.state);
            if state.stop {
                return;
            }
            state.recording = true;
            self.cond.notify_all();
        }
        info!(source = %self.source.display(), sink = %self.sink.path().display(), "Recording from file input");

        let interval = self.frame_interval();
        let mut buf = vec![0u8; FRAME_BYTES];
        loop {
            {
                let mut state = mutex_lock_or_recover(&self.state);
                if state.stop {
                    break;
                }
                if state.pause_requested {
                    state.paused = true;
                    self.cond.notify_all();
                    let (_state, _) = condvar_wait_timeout_or_recover(&self.cond, state, interval);
                    continue;
                }
            }

            let n = match Self::next_frame(&mut file, &mut buf) {
                Ok(n) => n,
                Err(e) => {
                    self.fail(&e);
                    return;
                }
            };
            if let Err(e) = self.sink.write(&buf[..n]) {
                self.fail(&e);
                return;
            }

            let mut state = mutex_lock_or_recover(&self.state);
            state.frames += 1;
            if !state.stop {
                let (_state, _) = condvar_wait_timeout_or_recover(&self.cond, state, interval);
            }
        }

        let mut state = mutex_lock_or_recover(&self.state);
        state.recording = false;
        self.cond.notify_all();
        debug!(frames = state.frames, "File input recorder stopped");
    }

    fn stop_recording(&self) {
        let mut state = mutex_lock_or_recover(&self.state);
        state.stop = true;
        self.cond.notify_all();
    }

    fn is_recording(&self) -> bool {
        mutex_lock_or_recover(&self.state).recording
    }

    fn is_errored(&self) -> bool {
        mutex_lock_or_recover(&self.state).errored
    }

    fn frames_written(&self) -> i64 {
        mutex_lock_or_recover(&self.state).frames
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn keyframe_position(&self, desired: i64) -> Option<i64> {
        let frames = self.frames_written();
        if desired < 0 || desired >= frames {
            return None;
        }
        let keyframe = desired / KEYFRAME_INTERVAL * KEYFRAME_INTERVAL;
        Some(keyframe * FRAME_BYTES as i64)
    }

    fn pause(&self, clear: bool) {
        let mut state = mutex_lock_or_recover(&self.state);
        state.pause_requested = true;
        if clear {
            state.frames = 0;
        }
        self.cond.notify_all();
    }

    fn unpause(&self) {
        let mut state = mutex_lock_or_recover(&self.state);
        state.pause_requested = false;
        state.paused = false;
        self.cond.notify_all();
    }

    fn is_paused(&self) -> bool {
        mutex_lock_or_recover(&self.state).paused
    }

    fn reset(&self) {
        mutex_lock_or_recover(&self.state).frames = 0;
    }

    fn set_channel_name(&self, name: &str) {
        mutex_lock_or_recover(&self.state).channel_name = name.to_string();
    }

    fn set_video_filters(&self, filters: &str) {
        if !filters.is_empty() {
            warn!(filters, "File input recorder ignores video filters");
        }
        mutex_lock_or_recover(&self.state).video_filters = filters.to_string();
    }
}

impl FileInputRecorder {
    pub fn channel_name(&self) -> String {
        mutex_lock_or_recover(&self.state).channel_name.clone()
    }
}
