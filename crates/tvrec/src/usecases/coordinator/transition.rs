use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::ActiveRecording;
use super::CoordinatorInner;
use super::CoordinatorState;
use crate::domain::RecorderEvent;
use crate::domain::RecordingInfo;
use crate::domain::RecordingKind;
use crate::domain::TvState;

/// Work needed to go from the current state to the requested one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Null,
    Fatal,
    StartLive,
    StopLive,
    StartRecording,
    StopRecording,
    Unknown,
}

pub(crate) fn plan(current: TvState, desired: TvState) -> Transition {
    if current == desired {
        return Transition::Null;
    }
    match (current, desired) {
        (_, TvState::Error) => Transition::Fatal,
        (TvState::None, TvState::WatchingLiveTv) => Transition::StartLive,
        (TvState::WatchingLiveTv, TvState::None) => Transition::StopLive,
        (TvState::None, TvState::RecordingOnly) => Transition::StartRecording,
        (TvState::RecordingOnly, TvState::None) => Transition::StopRecording,
        _ => Transition::Unknown,
    }
}

impl CoordinatorInner {
    /// Runs the pending transition. The new state is published last.
    pub(crate) fn handle_state_change(&self, state: &mut CoordinatorState) {
        let current = state.internal;
        let desired = state.desired;
        state.frontend_ready = false;
        state.ask_allowed = true;
        state.cancel_next = false;

        let transition = plan(current, desired);
        debug!(cardid = self.cardid, from = %current, to = %desired, ?transition, "Handling state change");

        let next = match transition {
            Transition::Null => current,
            Transition::Fatal => {
                error!(cardid = self.cardid, from = %current, "Device entering error state");
                if scheduled(state).is_some() {
                    // Keep what was written; the store learns it ended early.
                    state.premature_stop = true;
                    self.finished_recording(state);
                    self.teardown_recorder(state, false);
                } else {
                    self.teardown_recorder(state, true);
                }
                self.close_channel(state);
                state.errored = true;
                TvState::Error
            }
            Transition::StartLive => {
                if self.start_live(state) {
                    TvState::WatchingLiveTv
                } else {
                    current
                }
            }
            Transition::StopLive => {
                self.store_input_channels(state);
                self.teardown_recorder(state, true);
                TvState::None
            }
            Transition::StartRecording => {
                if self.start_scheduled(state) {
                    TvState::RecordingOnly
                } else {
                    current
                }
            }
            Transition::StopRecording => {
                self.finished_recording(state);
                self.teardown_recorder(state, false);
                state.in_overrecord = false;
                TvState::None
            }
            Transition::Unknown => {
                warn!(
                    cardid = self.cardid,
                    from = %current,
                    to = %desired,
                    "Unsupported state transition ignored"
                );
                current
            }
        };

        self.publish(state, next);
    }

    fn publish(&self, state: &mut CoordinatorState, next: TvState) {
        if next != state.internal {
            info!(cardid = self.cardid, from = %state.internal, to = %next, "State changed");
        }
        state.internal = next;
        state.change_state = false;
        self.state_cond.notify_all();
    }

    fn start_live(&self, state: &mut CoordinatorState) -> bool {
        let pip = state.pip;
        if state.sink.is_none() && self.create_ring_buffer(state, pip).is_none() {
            error!(cardid = self.cardid, "No ring buffer for live view");
            return false;
        }

        let now = self.clock.now();
        let channum = state
            .channel
            .as_ref()
            .map(|channel| channel.current_channel())
            .unwrap_or_default();
        let channel_info = self.channel_info_for(&channum);
        let info = RecordingInfo::live(self.cardid, channel_info.as_ref(), &channum, now);
        info!(cardid = self.cardid, channum = %channum, "Starting live view");
        state.current = Some(ActiveRecording {
            info,
            kind: RecordingKind::Live,
        });
        state.premature_stop = false;

        if !self.start_recorder(state) {
            self.unwind_failed_start(state);
            return false;
        }
        true
    }

    fn start_scheduled(&self, state: &mut CoordinatorState) -> bool {
        let Some(info) = state.requested.take() else {
            warn!(cardid = self.cardid, "Recording requested without a descriptor");
            return false;
        };
        let path = state
            .output_path
            .clone()
            .unwrap_or_else(|| info.record_filename(self.settings.record_file_prefix()));
        state.current = Some(ActiveRecording {
            info,
            kind: RecordingKind::Scheduled,
        });

        if let Err(err) = self.tune_for_recording(state) {
            error!(cardid = self.cardid, error = %err, "Failed to tune for recording");
            self.abandon_recording(state);
            return false;
        }

        match self.sinks.open_recording(&path) {
            Ok(sink) => {
                let mut data = self.lock_data();
                data.sink = Some(sink.clone());
                data.live = false;
                state.sink = Some(sink);
                state.output_path = Some(path);
            }
            Err(err) => {
                error!(
                    cardid = self.cardid,
                    path = %path.display(),
                    error = %err,
                    "Failed to open recording file"
                );
                self.abandon_recording(state);
                return false;
            }
        }

        self.started_recording(state);
        if !self.start_recorder(state) {
            self.unwind_failed_start(state);
            return false;
        }
        true
    }

    /// Drops a scheduled recording that never got a recorder.
    fn abandon_recording(&self, state: &mut CoordinatorState) {
        state.premature_stop = true;
        self.finished_recording(state);
        state.current = None;
        state.output_path = None;
        self.close_channel(state);
    }

    fn unwind_failed_start(&self, state: &mut CoordinatorState) {
        error!(cardid = self.cardid, "Recorder failed to start");
        state.premature_stop = true;
        self.dispatch(RecorderEvent::QuitLiveTv {
            cardid: self.cardid,
        });
        self.finished_recording(state);
        self.teardown_recorder(state, true);
    }

    pub(crate) fn started_recording(&self, state: &CoordinatorState) {
        let Some(current) = scheduled(state) else {
            return;
        };
        if let Err(err) = self.db.recording_started(&current.info) {
            warn!(cardid = self.cardid, error = %err, "Failed to record start of recording");
        }
        if current.info.chan_commfree {
            if let Err(err) = self.db.mark_commflagged(&current.info) {
                warn!(cardid = self.cardid, error = %err, "Failed to mark recording as flagged");
            }
        }
        self.dispatch(RecorderEvent::RecordingListChange);
    }

    pub(crate) fn finished_recording(&self, state: &CoordinatorState) {
        let Some(current) = scheduled(state) else {
            return;
        };
        let finished_at = self.clock.now();
        if let Err(err) =
            self.db
                .recording_finished(&current.info, finished_at, state.premature_stop)
        {
            warn!(cardid = self.cardid, error = %err, "Failed to record end of recording");
        }
        info!(
            cardid = self.cardid,
            chanid = %current.info.chanid,
            title = %current.info.title,
            premature = state.premature_stop,
            "Recording finished"
        );
    }
}

fn scheduled(state: &CoordinatorState) -> Option<&ActiveRecording> {
    state
        .current
        .as_ref()
        .filter(|current| current.kind == RecordingKind::Scheduled)
}
