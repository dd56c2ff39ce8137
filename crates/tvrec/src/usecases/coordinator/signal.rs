use tracing::debug;
use tracing::info;
use tracing::warn;

use super::CoordinatorInner;
use super::CoordinatorState;
use super::RecordingCoordinator;
use crate::domain::RecorderEvent;
use crate::domain::SignalStatus;
use crate::domain::TvState;

impl CoordinatorInner {
    /// Creates and starts a monitor unless one runs already.
    fn setup_signal_monitor(&self, state: &mut CoordinatorState) -> bool {
        if state.monitor.is_some() {
            return true;
        }
        if !self.card_type.supports_signal_monitor() {
            return false;
        }
        let Some(channel) = state.channel.as_mut() else {
            return false;
        };
        if !channel.is_open() {
            if let Err(err) = channel.open() {
                warn!(cardid = self.cardid, error = %err, "Cannot open channel for signal monitor");
                return false;
            }
        }
        let channum = channel.current_channel();
        let Some(mut monitor) = self.backend.create_signal_monitor(&self.device, &**channel) else {
            debug!(cardid = self.cardid, "Backend has no signal monitor");
            return false;
        };

        if let Some(info) = self.channel_info_for(&channum) {
            match self.db.cached_pids(&info.chanid) {
                Ok(pids) if !pids.is_empty() => monitor.load_cached_pids(pids),
                Ok(_) => {}
                Err(err) => warn!(cardid = self.cardid, error = %err, "Failed to load cached pids"),
            }
        }
        monitor.start();
        state.monitor = Some(monitor);
        info!(cardid = self.cardid, channum = %channum, "Signal monitor started");
        true
    }

    /// Stops the monitor and keeps the table ids it learned.
    pub(crate) fn teardown_signal_monitor(&self, state: &mut CoordinatorState) {
        let Some(mut monitor) = state.monitor.take() else {
            return;
        };
        monitor.stop();
        let pids = monitor.cached_pids();
        if !pids.is_empty() {
            if let Some(channel) = state.channel.as_mut() {
                channel.set_cached_pids(pids.clone());
                let channum = channel.current_channel();
                if let Some(info) = self.channel_info_for(&channum) {
                    if let Err(err) = self.db.save_cached_pids(&info.chanid, &pids) {
                        warn!(cardid = self.cardid, error = %err, "Failed to save cached pids");
                    }
                }
            }
        }
        drop(monitor);
        info!(cardid = self.cardid, "Signal monitor stopped");

        if state.internal == TvState::None && state.recorder.is_none() {
            self.close_channel(state);
        }
    }
}

impl RecordingCoordinator {
    /// Starts, retunes or stops signal monitoring.
    ///
    /// `rate == 0` stops the monitor, `rate < 0` only changes `notify` of a
    /// running monitor, `rate > 0` starts one if needed and sets its rate.
    /// A negative `notify` keeps the current flag; a fresh monitor starts
    /// silent. Returns the previous rate, 0 when no monitor ran.
    pub fn set_signal_monitoring_rate(&self, rate: i32, notify: i32) -> i32 {
        let inner = &self.inner;
        let mut state = inner.lock();
        let old_rate = state.monitor.as_ref().map_or(0, |m| m.update_rate());
        debug!(cardid = inner.cardid, rate, notify, old_rate, "Signal monitoring rate");

        if rate == 0 {
            inner.teardown_signal_monitor(&mut state);
        } else if rate < 0 {
            if let Some(monitor) = state.monitor.as_mut() {
                if notify >= 0 {
                    monitor.set_notify_frontend(notify != 0);
                }
            }
        } else if inner.setup_signal_monitor(&mut state) {
            if let Some(monitor) = state.monitor.as_mut() {
                monitor.set_update_rate(rate);
                if notify >= 0 {
                    monitor.set_notify_frontend(notify != 0);
                } else if old_rate == 0 {
                    monitor.set_notify_frontend(false);
                }
            }
        } else {
            let status = if inner.card_type.supports_signal_monitor() {
                SignalStatus::NoChannel
            } else {
                SignalStatus::Lock { locked: true }
            };
            inner.dispatch(RecorderEvent::Signal {
                cardid: inner.cardid,
                status,
            });
        }
        old_rate
    }
}
