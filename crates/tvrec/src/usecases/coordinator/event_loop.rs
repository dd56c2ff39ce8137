use chrono::DateTime;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use tracing::error;
use tracing::info;
use tvrec_common::condvar_wait_timeout_or_recover;

use super::CoordinatorInner;
use super::CoordinatorState;
use crate::domain::RecorderEvent;
use crate::domain::TvState;

/// Outcome of the per-tick end-of-recording check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Overrun {
    Continue,
    Extend(DateTime<Utc>),
    Finish,
}

/// Extends the end time once by the overrun budget, then finishes.
pub(crate) fn check_overrun(
    now: DateTime<Utc>,
    end: DateTime<Utc>,
    finish_requested: bool,
    in_overrecord: bool,
    overrecord_secs: i64,
) -> Overrun {
    if now <= end && !finish_requested {
        return Overrun::Continue;
    }
    if !in_overrecord && overrecord_secs > 0 {
        Overrun::Extend(end + chrono::Duration::seconds(overrecord_secs))
    } else {
        Overrun::Finish
    }
}

/// Event-loop thread body.
pub(crate) fn run(inner: Arc<CoordinatorInner>) {
    let cardid = inner.cardid;
    let mut state = inner.lock();
    state.loop_running = true;
    inner.state_cond.notify_all();
    debug!(cardid, "Event loop started");

    while state.run_loop {
        if state.change_state {
            inner.handle_state_change(&mut state);
        }
        if state.errored {
            error!(cardid, "Device errored, event loop exiting");
            break;
        }

        if !state.change_state && state.run_loop {
            state = condvar_wait_timeout_or_recover(
                &inner.state_cond,
                state,
                inner.settings.poll_interval(),
            )
            .0;
        }

        inner.tick(&mut state);
    }

    if !state.errored {
        inner.request_state(&mut state, TvState::None);
        inner.handle_state_change(&mut state);
    }
    state.loop_running = false;
    inner.state_cond.notify_all();
    info!(cardid, "Event loop stopped");
}

impl CoordinatorInner {
    fn tick(&self, state: &mut CoordinatorState) {
        self.ask_pending_recording(state);

        if state.internal == TvState::RecordingOnly {
            self.check_recording_end(state);
        }

        if state.exit_player {
            if state.internal == TvState::WatchingLiveTv {
                info!(cardid = self.cardid, "Ending live view");
                self.request_state(state, TvState::None);
            }
            state.exit_player = false;
        }
    }

    fn ask_pending_recording(&self, state: &mut CoordinatorState) {
        if !state.ask_allowed || !state.frontend_ready {
            return;
        }
        let Some(pending) = state.pending.as_ref() else {
            return;
        };
        let seconds_until_start = (pending.start - self.clock.now()).num_seconds();
        let event = RecorderEvent::AskRecording {
            cardid: self.cardid,
            seconds_until_start,
            title: pending.info.title.clone(),
            chanstr: pending.info.chanstr.clone(),
            chansign: pending.info.chansign.clone(),
            channame: pending.info.channame.clone(),
        };
        state.ask_allowed = false;
        self.dispatch(event);
    }

    fn check_recording_end(&self, state: &mut CoordinatorState) {
        let Some(end) = state.record_end else {
            return;
        };
        let outcome = check_overrun(
            self.clock.now(),
            end,
            state.finish_recording,
            state.in_overrecord,
            state.overrecord_secs,
        );
        match outcome {
            Overrun::Continue => return,
            Overrun::Extend(new_end) => {
                info!(
                    cardid = self.cardid,
                    secs = state.overrecord_secs,
                    end = %new_end,
                    "Recording into overrun"
                );
                state.record_end = Some(new_end);
                state.in_overrecord = true;
            }
            Overrun::Finish => {
                info!(cardid = self.cardid, "Recording reached its end");
                self.request_state(state, TvState::None);
            }
        }
        state.finish_recording = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 21, minute, second).unwrap()
    }

    #[test]
    fn test_before_end_continues() {
        assert_eq!(check_overrun(at(0, 0), at(0, 0), false, false, 60), Overrun::Continue);
        assert_eq!(check_overrun(at(0, 0), at(5, 0), false, true, 0), Overrun::Continue);
    }

    #[test]
    fn test_first_overrun_extends_once() {
        assert_eq!(
            check_overrun(at(0, 1), at(0, 0), false, false, 60),
            Overrun::Extend(at(1, 0))
        );
        assert_eq!(check_overrun(at(1, 1), at(1, 0), false, true, 60), Overrun::Finish);
    }

    #[test]
    fn test_no_budget_finishes_at_end() {
        assert_eq!(check_overrun(at(0, 1), at(0, 0), false, false, 0), Overrun::Finish);
    }

    #[test]
    fn test_finish_request_ignores_clock() {
        assert_eq!(
            check_overrun(at(0, 0), at(30, 0), true, false, 60),
            Overrun::Extend(at(31, 0))
        );
        assert_eq!(check_overrun(at(0, 0), at(30, 0), true, true, 60), Overrun::Finish);
    }
}
