//! Mock channel, recorder, signal monitor and backend.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::time::Duration;

use tvrec_common::condvar_wait_timeout_or_recover;
use tvrec_common::mutex_lock_or_recover;

use crate::domain::DeviceConfig;
use crate::domain::PictureAttribute;
use crate::domain::PidCacheEntry;
use crate::domain::RecorderOptions;
use crate::usecases::ports::CaptureBackend;
use crate::usecases::ports::CaptureChannel;
use crate::usecases::ports::CaptureChannelBox;
use crate::usecases::ports::CaptureError;
use crate::usecases::ports::CaptureRecorder;
use crate::usecases::ports::RecorderSetup;
use crate::usecases::ports::SignalMonitor;

#[derive(Default)]
struct ChannelState {
    open: bool,
    opens: usize,
    closes: usize,
    fail_open: bool,
    fail_channels: BTreeSet<String>,
    inputs: Vec<String>,
    input: String,
    channel: String,
    tuned: Vec<String>,
    input_channels: BTreeMap<String, String>,
    picture: BTreeMap<String, i32>,
    picture_applied: usize,
    ordering: String,
    pids: Vec<PidCacheEntry>,
}

pub struct MockChannel {
    state: Arc<Mutex<ChannelState>>,
}

/// Inspects a [`MockChannel`] after it was moved into a coordinator.
#[derive(Clone)]
pub struct MockChannelObserver {
    state: Arc<Mutex<ChannelState>>,
}

impl MockChannel {
    pub fn new(input: &str, channel: &str) -> Self {
        let state = ChannelState {
            inputs: vec![input.to_string()],
            input: input.to_string(),
            channel: channel.to_string(),
            ..ChannelState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn with_inputs(self, inputs: &[&str]) -> Self {
        {
            let mut state = mutex_lock_or_recover(&self.state);
            state.inputs = inputs.iter().map(|i| i.to_string()).collect();
            if let Some(first) = state.inputs.first().cloned() {
                state.input = first;
            }
        }
        self
    }

    pub fn observer(&self) -> MockChannelObserver {
        MockChannelObserver {
            state: Arc::clone(&self.state),
        }
    }
}

impl MockChannelObserver {
    pub fn is_open(&self) -> bool {
        mutex_lock_or_recover(&self.state).open
    }

    pub fn opens(&self) -> usize {
        mutex_lock_or_recover(&self.state).opens
    }

    pub fn closes(&self) -> usize {
        mutex_lock_or_recover(&self.state).closes
    }

    pub fn tuned(&self) -> Vec<String> {
        mutex_lock_or_recover(&self.state).tuned.clone()
    }

    pub fn current(&self) -> (String, String) {
        let state = mutex_lock_or_recover(&self.state);
        (state.input.clone(), state.channel.clone())
    }

    pub fn ordering(&self) -> String {
        mutex_lock_or_recover(&self.state).ordering.clone()
    }

    pub fn picture_applied(&self) -> usize {
        mutex_lock_or_recover(&self.state).picture_applied
    }

    pub fn pids(&self) -> Vec<PidCacheEntry> {
        mutex_lock_or_recover(&self.state).pids.clone()
    }

    pub fn input_channels(&self) -> BTreeMap<String, String> {
        mutex_lock_or_recover(&self.state).input_channels.clone()
    }

    pub fn fail_open(&self, fail: bool) {
        mutex_lock_or_recover(&self.state).fail_open = fail;
    }

    pub fn fail_channel(&self, channum: &str) {
        mutex_lock_or_recover(&self.state)
            .fail_channels
            .insert(channum.to_string());
    }
}

impl ChannelState {
    fn tune(&mut self, channum: &str) -> Result<(), CaptureError> {
        if self.fail_channels.contains(channum) {
            return Err(CaptureError::Tune {
                channel: channum.to_string(),
                reason: "no signal".to_string(),
            });
        }
        self.channel = channum.to_string();
        self.tuned.push(channum.to_string());
        let input = self.input.clone();
        self.input_channels.insert(input, channum.to_string());
        Ok(())
    }
}

impl CaptureChannel for MockChannel {
    fn open(&mut self) -> Result<(), CaptureError> {
        let mut state = mutex_lock_or_recover(&self.state);
        if state.fail_open {
            return Err(CaptureError::Open {
                device: "mock".to_string(),
                reason: "busy".to_string(),
            });
        }
        state.open = true;
        state.opens += 1;
        Ok(())
    }

    fn close(&mut self) {
        let mut state = mutex_lock_or_recover(&self.state);
        state.open = false;
        state.closes += 1;
    }

    fn is_open(&self) -> bool {
        mutex_lock_or_recover(&self.state).open
    }

    fn set_channel_by_name(&mut self, channum: &str) -> Result<(), CaptureError> {
        mutex_lock_or_recover(&self.state).tune(channum)
    }

    fn switch_to_input(&mut self, input: &str, channum: &str) -> Result<(), CaptureError> {
        let mut state = mutex_lock_or_recover(&self.state);
        if !state.inputs.iter().any(|i| i == input) {
            return Err(CaptureError::UnknownInput(input.to_string()));
        }
        state.input = input.to_string();
        if channum.is_empty() {
            return Ok(());
        }
        state.tune(channum)
    }

    fn toggle_inputs(&mut self) -> Result<(), CaptureError> {
        let mut state = mutex_lock_or_recover(&self.state);
        let position = state.inputs.iter().position(|i| *i == state.input).unwrap_or(0);
        let next = state.inputs[(position + 1) % state.inputs.len().max(1)].clone();
        state.input = next.clone();
        if let Some(channel) = state.input_channels.get(&next).cloned() {
            state.channel = channel;
        }
        Ok(())
    }

    fn current_channel(&self) -> String {
        mutex_lock_or_recover(&self.state).channel.clone()
    }

    fn current_input(&self) -> String {
        mutex_lock_or_recover(&self.state).input.clone()
    }

    fn input_channels(&self) -> BTreeMap<String, String> {
        mutex_lock_or_recover(&self.state).input_channels.clone()
    }

    fn set_input_channels(&mut self, channels: BTreeMap<String, String>) {
        mutex_lock_or_recover(&self.state).input_channels = channels;
    }

    fn set_channel_ordering(&mut self, ordering: &str) {
        mutex_lock_or_recover(&self.state).ordering = ordering.to_string();
    }

    fn apply_picture_settings(&mut self) {
        mutex_lock_or_recover(&self.state).picture_applied += 1;
    }

    fn change_picture_attribute(&mut self, attr: PictureAttribute, up: bool) -> Option<i32> {
        let mut state = mutex_lock_or_recover(&self.state);
        let value = state.picture.entry(format!("{attr:?}")).or_insert(50);
        *value = if up { (*value + 1).min(100) } else { (*value - 1).max(0) };
        Some(*value)
    }

    fn cached_pids(&self) -> Vec<PidCacheEntry> {
        mutex_lock_or_recover(&self.state).pids.clone()
    }

    fn set_cached_pids(&mut self, pids: Vec<PidCacheEntry>) {
        mutex_lock_or_recover(&self.state).pids = pids;
    }
}

/// How a [`MockRecorder`] reacts to being started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecorderBehavior {
    #[default]
    Record,
    Error,
    Hang,
}

#[derive(Default)]
struct RecorderState {
    running: bool,
    recording: bool,
    errored: bool,
    stop: bool,
    paused: bool,
    frames: i64,
    resets: usize,
    unpauses: usize,
    channel_names: Vec<String>,
    finished: bool,
}

struct RecorderShared {
    state: Mutex<RecorderState>,
    cond: Condvar,
}

pub struct MockRecorder {
    behavior: RecorderBehavior,
    frame_rate: f64,
    shared: Arc<RecorderShared>,
}

#[derive(Clone)]
pub struct MockRecorderObserver {
    shared: Arc<RecorderShared>,
}

impl MockRecorder {
    pub fn new(behavior: RecorderBehavior, frame_rate: f64) -> Self {
        Self {
            behavior,
            frame_rate,
            shared: Arc::new(RecorderShared {
                state: Mutex::new(RecorderState::default()),
                cond: Condvar::new(),
            }),
        }
    }

    pub fn observer(&self) -> MockRecorderObserver {
        MockRecorderObserver {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl MockRecorderObserver {
    pub fn set_frames(&self, frames: i64) {
        mutex_lock_or_recover(&self.shared.state).frames = frames;
    }

    pub fn is_running(&self) -> bool {
        mutex_lock_or_recover(&self.shared.state).running
    }

    pub fn finished(&self) -> bool {
        mutex_lock_or_recover(&self.shared.state).finished
    }

    pub fn stop_requested(&self) -> bool {
        mutex_lock_or_recover(&self.shared.state).stop
    }

    pub fn resets(&self) -> usize {
        mutex_lock_or_recover(&self.shared.state).resets
    }

    pub fn unpauses(&self) -> usize {
        mutex_lock_or_recover(&self.shared.state).unpauses
    }

    pub fn is_paused(&self) -> bool {
        mutex_lock_or_recover(&self.shared.state).paused
    }

    pub fn channel_names(&self) -> Vec<String> {
        mutex_lock_or_recover(&self.shared.state).channel_names.clone()
    }
}

impl CaptureRecorder for MockRecorder {
    fn run(&self) {
        let mut state = mutex_lock_or_recover(&self.shared.state);
        state.running = true;
        match self.behavior {
            RecorderBehavior::Record => state.recording = true,
            RecorderBehavior::Error => state.errored = true,
            RecorderBehavior::Hang => {}
        }
        self.shared.cond.notify_all();
        while !state.stop && self.behavior != RecorderBehavior::Error {
            state =
                condvar_wait_timeout_or_recover(&self.shared.cond, state, Duration::from_millis(50))
                    .0;
        }
        state.recording = false;
        state.running = false;
        state.finished = true;
        self.shared.cond.notify_all();
    }

    fn stop_recording(&self) {
        let mut state = mutex_lock_or_recover(&self.shared.state);
        state.stop = true;
        self.shared.cond.notify_all();
    }

    fn is_recording(&self) -> bool {
        mutex_lock_or_recover(&self.shared.state).recording
    }

    fn is_errored(&self) -> bool {
        mutex_lock_or_recover(&self.shared.state).errored
    }

    fn frames_written(&self) -> i64 {
        mutex_lock_or_recover(&self.shared.state).frames
    }

    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn keyframe_position(&self, desired: i64) -> Option<i64> {
        let frames = mutex_lock_or_recover(&self.shared.state).frames;
        (desired <= frames).then_some(desired * 1000)
    }

    fn pause(&self, _clear: bool) {
        mutex_lock_or_recover(&self.shared.state).paused = true;
    }

    fn unpause(&self) {
        let mut state = mutex_lock_or_recover(&self.shared.state);
        state.paused = false;
        state.unpauses += 1;
    }

    fn is_paused(&self) -> bool {
        mutex_lock_or_recover(&self.shared.state).paused
    }

    fn reset(&self) {
        mutex_lock_or_recover(&self.shared.state).resets += 1;
    }

    fn set_channel_name(&self, name: &str) {
        mutex_lock_or_recover(&self.shared.state)
            .channel_names
            .push(name.to_string());
    }
}

#[derive(Default)]
struct MonitorState {
    created: usize,
    started: usize,
    stopped: usize,
    rate: i32,
    notify: bool,
    loaded_pids: Vec<PidCacheEntry>,
    learned_pids: Vec<PidCacheEntry>,
}

pub struct MockSignalMonitor {
    state: Arc<Mutex<MonitorState>>,
}

#[derive(Clone, Default)]
pub struct MonitorObserver {
    state: Arc<Mutex<MonitorState>>,
}

impl MonitorObserver {
    pub fn created(&self) -> usize {
        mutex_lock_or_recover(&self.state).created
    }

    pub fn started(&self) -> usize {
        mutex_lock_or_recover(&self.state).started
    }

    pub fn stopped(&self) -> usize {
        mutex_lock_or_recover(&self.state).stopped
    }

    pub fn rate(&self) -> i32 {
        mutex_lock_or_recover(&self.state).rate
    }

    pub fn notify(&self) -> bool {
        mutex_lock_or_recover(&self.state).notify
    }

    pub fn loaded_pids(&self) -> Vec<PidCacheEntry> {
        mutex_lock_or_recover(&self.state).loaded_pids.clone()
    }

    /// Pids the next monitor reports as learned.
    pub fn learn_pids(&self, pids: Vec<PidCacheEntry>) {
        mutex_lock_or_recover(&self.state).learned_pids = pids;
    }
}

impl SignalMonitor for MockSignalMonitor {
    fn start(&mut self) {
        mutex_lock_or_recover(&self.state).started += 1;
    }

    fn stop(&mut self) {
        mutex_lock_or_recover(&self.state).stopped += 1;
    }

    fn update_rate(&self) -> i32 {
        mutex_lock_or_recover(&self.state).rate
    }

    fn set_update_rate(&mut self, rate_ms: i32) {
        mutex_lock_or_recover(&self.state).rate = rate_ms;
    }

    fn notify_frontend(&self) -> bool {
        mutex_lock_or_recover(&self.state).notify
    }

    fn set_notify_frontend(&mut self, notify: bool) {
        mutex_lock_or_recover(&self.state).notify = notify;
    }

    fn cached_pids(&self) -> Vec<PidCacheEntry> {
        mutex_lock_or_recover(&self.state).learned_pids.clone()
    }

    fn load_cached_pids(&mut self, pids: Vec<PidCacheEntry>) {
        mutex_lock_or_recover(&self.state).loaded_pids = pids;
    }
}

#[derive(Default)]
struct BackendState {
    channel: Option<MockChannel>,
    behavior: RecorderBehavior,
    frame_rate: f64,
    fail_setup: bool,
    options: Vec<RecorderOptions>,
    recorders: Vec<MockRecorderObserver>,
    monitors: bool,
}

/// Hands out one preconfigured channel and fresh recorders.
pub struct MockBackend {
    state: Arc<Mutex<BackendState>>,
    monitor: MonitorObserver,
}

#[derive(Clone)]
pub struct MockBackendObserver {
    state: Arc<Mutex<BackendState>>,
    monitor: MonitorObserver,
}

impl MockBackend {
    pub fn new(channel: MockChannel) -> Self {
        Self {
            state: Arc::new(Mutex::new(BackendState {
                channel: Some(channel),
                frame_rate: 25.0,
                ..BackendState::default()
            })),
            monitor: MonitorObserver::default(),
        }
    }

    pub fn with_signal_monitors(self) -> Self {
        mutex_lock_or_recover(&self.state).monitors = true;
        self
    }

    pub fn observer(&self) -> MockBackendObserver {
        MockBackendObserver {
            state: Arc::clone(&self.state),
            monitor: self.monitor.clone(),
        }
    }
}

impl MockBackendObserver {
    pub fn set_behavior(&self, behavior: RecorderBehavior) {
        mutex_lock_or_recover(&self.state).behavior = behavior;
    }

    pub fn set_frame_rate(&self, rate: f64) {
        mutex_lock_or_recover(&self.state).frame_rate = rate;
    }

    pub fn fail_setup(&self, fail: bool) {
        mutex_lock_or_recover(&self.state).fail_setup = fail;
    }

    pub fn recorders_created(&self) -> usize {
        mutex_lock_or_recover(&self.state).recorders.len()
    }

    pub fn last_recorder(&self) -> Option<MockRecorderObserver> {
        mutex_lock_or_recover(&self.state).recorders.last().cloned()
    }

    pub fn last_options(&self) -> Option<RecorderOptions> {
        mutex_lock_or_recover(&self.state).options.last().cloned()
    }

    pub fn monitor(&self) -> MonitorObserver {
        self.monitor.clone()
    }
}

impl CaptureBackend for MockBackend {
    fn open_channel(&self, _device: &DeviceConfig) -> Result<CaptureChannelBox, CaptureError> {
        let mut state = mutex_lock_or_recover(&self.state);
        match state.channel.take() {
            Some(channel) => Ok(Box::new(channel)),
            None => Ok(Box::new(MockChannel::new("Tuner 1", ""))),
        }
    }

    fn create_recorder(
        &self,
        setup: RecorderSetup<'_>,
    ) -> Result<Box<dyn CaptureRecorder>, CaptureError> {
        let mut state = mutex_lock_or_recover(&self.state);
        state.options.push(setup.options.clone());
        if state.fail_setup {
            return Err(CaptureError::RecorderSetup("mock setup failure".to_string()));
        }
        let recorder = MockRecorder::new(state.behavior, state.frame_rate);
        state.recorders.push(recorder.observer());
        Ok(Box::new(recorder))
    }

    fn create_signal_monitor(
        &self,
        _device: &DeviceConfig,
        _channel: &dyn CaptureChannel,
    ) -> Option<Box<dyn SignalMonitor>> {
        if !mutex_lock_or_recover(&self.state).monitors {
            return None;
        }
        mutex_lock_or_recover(&self.monitor.state).created += 1;
        Some(Box::new(MockSignalMonitor {
            state: Arc::clone(&self.monitor.state),
        }))
    }
}
