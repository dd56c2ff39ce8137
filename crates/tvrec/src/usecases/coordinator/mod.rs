//! Per-device recording coordinator.
//!
//! A [`RecordingCoordinator`] owns one capture card. Callers post state
//! requests into a single-slot mailbox; a dedicated event-loop thread
//! performs each transition and publishes the new state as its last step.
//! All coordinator state lives behind one lock. The data streaming path has
//! its own lock, always taken after the state lock.

mod channel;
mod error;
mod event_loop;
mod recorder;
mod signal;
mod stream;
mod transition;

pub use error::CoordinatorError;

use chrono::DateTime;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use tvrec_common::condvar_wait_timeout_or_recover;
use tvrec_common::mutex_lock_or_recover;
use tvrec_process::ProcessSupervisor;

use crate::config::RecorderSettings;
use crate::domain::CardType;
use crate::domain::ChannelOrdering;
use crate::domain::DeviceConfig;
use crate::domain::JobMask;
use crate::domain::RecorderEvent;
use crate::domain::RecordingInfo;
use crate::domain::RecordingKind;
use crate::domain::StartRecordingResult;
use crate::domain::TvState;
use crate::usecases::channel_changer::ExternalChannelChanger;
use crate::usecases::ports::CaptureBackendHandle;
use crate::usecases::ports::CaptureBackends;
use crate::usecases::ports::CaptureChannelBox;
use crate::usecases::ports::CaptureRecorderHandle;
use crate::usecases::ports::ChannelDatabaseHandle;
use crate::usecases::ports::ClockHandle;
use crate::usecases::ports::DataEndpointHandle;
use crate::usecases::ports::EventDispatcherHandle;
use crate::usecases::ports::JobQueueHandle;

use crate::usecases::ports::RecordingSinkHandle;
use crate::usecases::ports::SignalMonitor;
use crate::usecases::ports::SinkFactoryHandle;

const EVENT_LOOP_START_TIMEOUT: Duration = Duration::from_secs(5);
/// A pending recording this close to its start keeps the device busy.
const PENDING_BUSY_SECS: i64 = 5;

/// Collaborators a coordinator is wired with.
pub struct CoordinatorDeps {
    pub backends: CaptureBackends,
    pub db: ChannelDatabaseHandle,
    pub sinks: SinkFactoryHandle,
    pub events: EventDispatcherHandle,
    pub jobs: JobQueueHandle,
    pub clock: ClockHandle,
    pub supervisor: ProcessSupervisor,
}

pub(crate) struct ActiveRecording {
    pub(crate) info: RecordingInfo,
    pub(crate) kind: RecordingKind,
}

pub(crate) struct PendingRecording {
    pub(crate) info: RecordingInfo,
    pub(crate) start: DateTime<Utc>,
}

pub(crate) struct ActiveRecorder {
    pub(crate) recorder: CaptureRecorderHandle,
    pub(crate) worker: JoinHandle<()>,
}

pub(crate) struct CoordinatorState {
    pub(crate) internal: TvState,
    pub(crate) desired: TvState,
    pub(crate) change_state: bool,
    pub(crate) errored: bool,
    pub(crate) run_loop: bool,
    pub(crate) loop_running: bool,
    pub(crate) exit_player: bool,
    pub(crate) finish_recording: bool,
    pub(crate) frontend_ready: bool,
    pub(crate) ask_allowed: bool,
    pub(crate) cancel_next: bool,
    pub(crate) premature_stop: bool,
    pub(crate) in_overrecord: bool,
    pub(crate) overrecord_secs: i64,
    pub(crate) record_end: Option<DateTime<Utc>>,
    /// Handed over by `start_recording`, consumed by the transition.
    pub(crate) requested: Option<RecordingInfo>,
    pub(crate) current: Option<ActiveRecording>,
    pub(crate) pending: Option<PendingRecording>,
    pub(crate) channel: Option<CaptureChannelBox>,
    pub(crate) recorder: Option<ActiveRecorder>,
    pub(crate) monitor: Option<Box<dyn SignalMonitor>>,
    pub(crate) sink: Option<RecordingSinkHandle>,
    pub(crate) output_path: Option<PathBuf>,
    pub(crate) profile_name: String,
    pub(crate) jobs: JobMask,
    pub(crate) frame_rate: f64,
    pub(crate) pip: bool,
}

impl CoordinatorState {
    fn new(channel: Option<CaptureChannelBox>) -> Self {
        Self {
            internal: TvState::None,
            desired: TvState::None,
            change_state: false,
            errored: false,
            run_loop: false,
            loop_running: false,
            exit_player: false,
            finish_recording: false,
            frontend_ready: false,
            ask_allowed: true,
            cancel_next: false,
            premature_stop: false,
            in_overrecord: false,
            overrecord_secs: 0,
            record_end: None,
            requested: None,
            current: None,
            pending: None,
            channel,
            recorder: None,
            monitor: None,
            sink: None,
            output_path: None,
            profile_name: String::new(),
            jobs: JobMask::NONE,
            frame_rate: -1.0,
            pip: false,
        }
    }

    /// State as observed from outside: `ChangingState` while a request is
    /// waiting to be handled.
    pub(crate) fn observed(&self) -> TvState {
        if self.change_state {
            TvState::ChangingState
        } else {
            self.internal
        }
    }
}

/// Sink and viewer endpoint used by the data streaming path.
#[derive(Default)]
pub(crate) struct DataStream {
    pub(crate) sink: Option<RecordingSinkHandle>,
    pub(crate) endpoint: Option<DataEndpointHandle>,
    pub(crate) live: bool,
}

pub(crate) struct CoordinatorInner {
    pub(crate) cardid: u32,
    pub(crate) card_type: CardType,
    pub(crate) device: DeviceConfig,
    pub(crate) settings: RecorderSettings,
    pub(crate) ordering: ChannelOrdering,
    pub(crate) backend: CaptureBackendHandle,
    pub(crate) db: ChannelDatabaseHandle,
    pub(crate) sinks: SinkFactoryHandle,
    pub(crate) events: EventDispatcherHandle,
    pub(crate) jobs: JobQueueHandle,
    pub(crate) clock: ClockHandle,
    pub(crate) state: Mutex<CoordinatorState>,
    pub(crate) state_cond: Condvar,
    pub(crate) data: Mutex<DataStream>,
}

impl CoordinatorInner {
    pub(crate) fn lock(&self) -> MutexGuard<'_, CoordinatorState> {
        mutex_lock_or_recover(&self.state)
    }

    pub(crate) fn lock_data(&self) -> MutexGuard<'_, DataStream> {
        mutex_lock_or_recover(&self.data)
    }

    pub(crate) fn dispatch(&self, event: RecorderEvent) {
        debug!(cardid = self.cardid, event = %event.message(), "Dispatching event");
        self.events.dispatch(event);
    }

    /// Posts `target` into the mailbox, replacing any unhandled request.
    pub(crate) fn request_state(&self, state: &mut CoordinatorState, target: TvState) {
        debug!(
            cardid = self.cardid,
            from = %state.internal,
            to = %target,
            replaced = state.change_state,
            "State change requested"
        );
        state.desired = target;
        state.change_state = true;
        self.state_cond.notify_all();
    }

    /// Waits while `blocked` holds, at most `timeout`. Returns whether the
    /// condition cleared.
    pub(crate) fn wait_while<'a>(
        &self,
        mut state: MutexGuard<'a, CoordinatorState>,
        timeout: Duration,
        mut blocked: impl FnMut(&CoordinatorState) -> bool,
    ) -> (MutexGuard<'a, CoordinatorState>, bool) {
        let deadline = Instant::now() + timeout;
        while blocked(&*state) {
            let now = Instant::now();
            if now >= deadline {
                return (state, false);
            }
            state = condvar_wait_timeout_or_recover(&self.state_cond, state, deadline - now).0;
        }
        (state, true)
    }

    /// Blocks until the event loop handled the pending request.
    pub(crate) fn wait_for_change<'a>(
        &self,
        state: MutexGuard<'a, CoordinatorState>,
    ) -> MutexGuard<'a, CoordinatorState> {
        let (state, done) = self.wait_while(state, self.settings.state_change_timeout(), |s| {
            s.change_state && s.loop_running
        });
        if !done {
            warn!(cardid = self.cardid, "Timed out waiting for state change");
        }
        state
    }
}

/// Owns one capture card and serializes every change of its mode.
pub struct RecordingCoordinator {
    inner: Arc<CoordinatorInner>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl RecordingCoordinator {
    /// Loads the card, prepares its channel and starts the event loop.
    pub fn new(
        cardid: u32,
        settings: RecorderSettings,
        deps: CoordinatorDeps,
    ) -> Result<Self, CoordinatorError> {
        let device = deps
            .db
            .device(cardid)
            .map_err(|source| CoordinatorError::DeviceLookup { cardid, source })?;
        let card_type: CardType =
            device
                .card_type
                .parse()
                .map_err(|_| CoordinatorError::UnknownCardType {
                    cardid,
                    card_type: device.card_type.clone(),
                })?;
        let backend = deps
            .backends
            .resolve(card_type)
            .ok_or(CoordinatorError::BackendUnavailable { cardid, card_type })?;

        let channel = if device.is_file_input() {
            info!(cardid, device = %device.video_device, "File input, no channel to drive");
            None
        } else {
            let channel = backend
                .open_channel(&device)
                .map_err(|source| CoordinatorError::Channel { cardid, source })?;
            let command = device
                .channel_change_command
                .as_deref()
                .filter(|command| !command.trim().is_empty());
            match command {
                Some(command) => {
                    let changer =
                        ExternalChannelChanger::new(channel, command, deps.supervisor.clone())
                            .map_err(|source| CoordinatorError::Channel { cardid, source })?;
                    Some(Box::new(changer) as CaptureChannelBox)
                }
                None => Some(channel),
            }
        };

        let ordering = ChannelOrdering::parse(settings.channel_ordering());
        let inner = Arc::new(CoordinatorInner {
            cardid,
            card_type,
            device,
            settings,
            ordering,
            backend,
            db: deps.db,
            sinks: deps.sinks,
            events: deps.events,
            jobs: deps.jobs,
            clock: deps.clock,
            state: Mutex::new(CoordinatorState::new(channel)),
            state_cond: Condvar::new(),
            data: Mutex::new(DataStream::default()),
        });

        {
            let mut state = inner.lock();
            inner.init_channel(&mut state);
            state.run_loop = true;
        }

        let loop_inner = Arc::clone(&inner);
        let handle = thread::Builder::new()
            .name(format!("tvrec-event-{cardid}"))
            .spawn(move || event_loop::run(loop_inner))
            .map_err(|source| CoordinatorError::EventLoop { cardid, source })?;

        {
            let state = inner.lock();
            let (_state, started) =
                inner.wait_while(state, EVENT_LOOP_START_TIMEOUT, |s| !s.loop_running);
            if !started {
                warn!(cardid, "Event loop slow to start");
            }
        }

        info!(cardid, card_type = %card_type, "Recording coordinator ready");
        Ok(Self {
            inner,
            event_loop: Mutex::new(Some(handle)),
        })
    }

    pub fn cardid(&self) -> u32 {
        self.inner.cardid
    }

    pub fn card_type(&self) -> CardType {
        self.inner.card_type
    }

    /// Current mode, `ChangingState` while a transition is pending.
    pub fn get_state(&self) -> TvState {
        self.inner.lock().observed()
    }

    /// Posts a transition request. Only the latest unhandled request is kept.
    pub fn change_state(&self, target: TvState) {
        let mut state = self.inner.lock();
        self.inner.request_state(&mut state, target);
    }

    pub fn is_errored(&self) -> bool {
        self.inner.lock().errored
    }

    pub fn is_really_recording(&self) -> bool {
        self.inner
            .lock()
            .recorder
            .as_ref()
            .is_some_and(|active| active.recorder.is_recording())
    }

    /// In use, or about to be taken by a pending recording.
    pub fn is_busy(&self) -> bool {
        let state = self.inner.lock();
        if state.observed() != TvState::None {
            return true;
        }
        let now = self.inner.clock.now();
        state
            .pending
            .as_ref()
            .is_some_and(|pending| (pending.start - now).num_seconds() <= PENDING_BUSY_SECS)
    }

    /// Descriptor of the scheduled recording in progress.
    pub fn get_recording(&self) -> Option<RecordingInfo> {
        let state = self.inner.lock();
        if state.change_state {
            return None;
        }
        state
            .current
            .as_ref()
            .filter(|current| current.kind == RecordingKind::Scheduled)
            .map(|current| current.info.clone())
    }

    /// Announces a recording starting in `seconds_until_start` so the
    /// frontend can be asked about it.
    pub fn record_pending(&self, info: &RecordingInfo, seconds_until_start: i64) {
        let mut state = self.inner.lock();
        let start = self.inner.clock.now() + chrono::Duration::seconds(seconds_until_start);
        info!(
            cardid = self.inner.cardid,
            chanid = %info.chanid,
            title = %info.title,
            seconds_until_start,
            "Recording pending"
        );
        state.pending = Some(PendingRecording {
            info: info.clone(),
            start,
        });
        state.ask_allowed = true;
    }

    /// Takes the device for a scheduled recording, evicting a live viewer
    /// unless the frontend declined the recording.
    pub fn start_recording(&self, info: &RecordingInfo) -> StartRecordingResult {
        let inner = &self.inner;
        let mut state = inner.lock();
        state.pending = None;
        state.ask_allowed = false;

        if state.errored {
            warn!(cardid = inner.cardid, "Device errored, not recording");
            return StartRecordingResult::Busy;
        }

        if state.in_overrecord {
            info!(cardid = inner.cardid, "Ending overrun to start next recording");
            inner.request_state(&mut state, TvState::None);
            state = inner.wait_for_change(state);
        }

        if state.change_state {
            debug!(cardid = inner.cardid, "Waiting for in-flight transition");
            state = inner.wait_for_change(state);
        }

        if state.internal == TvState::WatchingLiveTv && !state.cancel_next {
            state = self.evict_live_viewer(state);
        }

        let result = if state.internal == TvState::None && !state.change_state {
            let settings = &inner.settings;
            state.output_path = Some(info.record_filename(settings.record_file_prefix()));
            state.record_end = Some(info.end);
            state.overrecord_secs = info.overrun_secs(
                settings.overtime_category(),
                settings.category_overtime_mins(),
                settings.record_overtime_secs(),
            );
            state.in_overrecord = false;
            state.premature_stop = false;
            state.requested = Some(info.clone());
            info!(
                cardid = inner.cardid,
                chanid = %info.chanid,
                title = %info.title,
                overrun_secs = state.overrecord_secs,
                "Starting recording"
            );
            inner.request_state(&mut state, TvState::RecordingOnly);
            StartRecordingResult::Started
        } else if !state.cancel_next {
            warn!(
                cardid = inner.cardid,
                wanted_chanid = %info.chanid,
                wanted_title = %info.title,
                state = %state.observed(),
                current = ?state.current.as_ref().map(|c| (&c.info.chanid, &c.info.title)),
                "Device busy, cannot start recording"
            );
            StartRecordingResult::Busy
        } else {
            info!(cardid = inner.cardid, "Recording declined by frontend");
            StartRecordingResult::Refused
        };

        state.cancel_next = false;
        result
    }

    /// Asks the viewer to quit across the eviction windows, then forces it.
    fn evict_live_viewer<'a>(
        &'a self,
        state: MutexGuard<'a, CoordinatorState>,
    ) -> MutexGuard<'a, CoordinatorState> {
        let inner = &self.inner;
        let [first, second, last] = inner.settings.eviction_windows();
        let still_watching = |s: &CoordinatorState| s.internal != TvState::None;

        info!(cardid = inner.cardid, "Asking live viewer to quit");
        inner.dispatch(RecorderEvent::QuitLiveTv {
            cardid: inner.cardid,
        });
        let (state, done) = inner.wait_while(state, first, still_watching);
        if done {
            return state;
        }

        info!(cardid = inner.cardid, "Live viewer still active, asking again");
        inner.dispatch(RecorderEvent::QuitLiveTv {
            cardid: inner.cardid,
        });
        let (mut state, done) = inner.wait_while(state, second, still_watching);
        if done {
            return state;
        }

        warn!(cardid = inner.cardid, "Live viewer ignored quit requests, forcing exit");
        state.exit_player = true;
        inner.state_cond.notify_all();
        let (state, done) = inner.wait_while(state, last, still_watching);
        if !done {
            error!(cardid = inner.cardid, "Live view did not stop");
        }
        state
    }

    /// Ends the scheduled recording in progress and waits for it.
    pub fn stop_recording(&self) {
        let mut state = self.inner.lock();
        if state.observed() != TvState::RecordingOnly {
            debug!(cardid = self.inner.cardid, state = %state.observed(), "Not recording");
            return;
        }
        self.inner.request_state(&mut state, TvState::None);
        state.premature_stop = false;
        let _state = self.inner.wait_for_change(state);
    }

    pub fn spawn_live_tv(&self) {
        let mut state = self.inner.lock();
        if state.errored {
            warn!(cardid = self.inner.cardid, "Device errored, not starting live view");
            return;
        }
        self.inner.request_state(&mut state, TvState::WatchingLiveTv);
        let _state = self.inner.wait_for_change(state);
    }

    pub fn stop_live_tv(&self) {
        let mut state = self.inner.lock();
        if state.observed() != TvState::WatchingLiveTv {
            debug!(cardid = self.inner.cardid, state = %state.observed(), "Live view not active");
            return;
        }
        self.inner.request_state(&mut state, TvState::None);
        let _state = self.inner.wait_for_change(state);
    }

    /// The frontend can now be asked about pending recordings.
    pub fn frontend_ready(&self) {
        self.inner.lock().frontend_ready = true;
    }

    /// The frontend declined (`true`) the next recording's takeover.
    pub fn cancel_next_recording(&self, cancel: bool) {
        self.inner.lock().cancel_next = cancel;
    }

    /// Applies the overrun check on the next tick regardless of the clock.
    pub fn finish_recording(&self) {
        let mut state = self.inner.lock();
        state.finish_recording = true;
        self.inner.state_cond.notify_all();
    }

    /// Ends live view on the next tick.
    pub fn stop_playing(&self) {
        let mut state = self.inner.lock();
        state.exit_player = true;
        self.inner.state_cond.notify_all();
    }

    /// Waits until the device settled in `target`.
    pub fn wait_for_state(&self, target: TvState, timeout: Duration) -> bool {
        let state = self.inner.lock();
        let (state, _) = self.inner.wait_while(state, timeout, |s| {
            (s.change_state || s.internal != target) && s.loop_running
        });
        state.observed() == target
    }

    /// Waits until no transition is pending and returns the state reached.
    pub fn wait_until_settled(&self, timeout: Duration) -> TvState {
        let state = self.inner.lock();
        let (state, _) = self
            .inner
            .wait_while(state, timeout, |s| s.change_state && s.loop_running);
        state.observed()
    }

    /// Stops the event loop. A running recorder is torn down first.
    pub fn shutdown(&self) {
        let Some(handle) = mutex_lock_or_recover(&self.event_loop).take() else {
            return;
        };
        {
            let mut state = self.inner.lock();
            state.run_loop = false;
            self.inner.state_cond.notify_all();
        }
        if handle.join().is_err() {
            error!(cardid = self.inner.cardid, "Event loop thread panicked");
        }
        let mut state = self.inner.lock();
        self.inner.teardown_signal_monitor(&mut state);
        if let Some(channel) = state.channel.as_mut() {
            if channel.is_open() {
                channel.close();
            }
        }
        info!(cardid = self.inner.cardid, "Recording coordinator stopped");
    }
}

impl Drop for RecordingCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}
