use std::sync::Arc;
use std::thread;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::ActiveRecorder;
use super::CoordinatorInner;
use super::CoordinatorState;
use crate::config::RecorderSettings;
use crate::domain::CardType;
use crate::domain::DEFAULT_PROFILE;
use crate::domain::DeviceConfig;
use crate::domain::JobMask;
use crate::domain::JobRequest;
use crate::domain::LIVE_TV_PROFILE;
use crate::domain::RecorderEvent;
use crate::domain::RecorderOptions;
use crate::domain::RecordingInfo;
use crate::domain::RecordingKind;
use crate::domain::RecordingProfile;
use crate::usecases::ports::CaptureRecorderHandle;
use crate::usecases::ports::RecorderSetup;
use crate::usecases::ports::RecorderStart;

/// Write buffer HDTV recorders need on their sink.
pub(crate) const HDTV_WRITE_BUFFER: usize = 4 * 1024 * 1024;

/// Jobs to run for a recording once the profile and channel are known.
pub(crate) fn assemble_job_mask(info: &RecordingInfo, profile: &RecordingProfile) -> JobMask {
    let mut jobs = info.auto_run_jobs;
    if !profile.allows_autotranscode() {
        jobs.remove(JobMask::TRANSCODE);
    }
    if info.chan_commfree {
        jobs.remove(JobMask::COMMFLAG);
    }
    jobs
}

/// Flagging starts with the recording unless it has to wait for a
/// transcode.
pub(crate) fn should_flag_early(jobs: JobMask, settings: &RecorderSettings) -> bool {
    jobs.contains(JobMask::COMMFLAG)
        && settings.commflag_while_recording()
        && (!jobs.contains(JobMask::TRANSCODE) || !settings.transcode_before_commflag())
}

/// Profile values plus the device settings of the card type.
pub(crate) fn recorder_options(
    device: &DeviceConfig,
    card_type: CardType,
    profile: &RecordingProfile,
    settings: &RecorderSettings,
) -> RecorderOptions {
    let mut options = RecorderOptions::from_profile(profile);
    options.set_text("videodevice", device.video_device.as_str());
    options.set_text("audiodevice", device.audio_device.as_str());
    options.set_text("vbidevice", device.vbi_device.as_str());

    match card_type {
        CardType::Hdtv => {
            options.write_buffer_size = Some(HDTV_WRITE_BUFFER);
        }
        CardType::Firewire => {
            let firewire = &device.firewire;
            options.set_int("port", firewire.port);
            options.set_int("node", firewire.node);
            options.set_int("speed", firewire.speed);
            options.set_text("model", firewire.model.as_str());
            options.set_int("connection", firewire.connection);
        }
        CardType::Dvb => {
            let dvb = &device.dvb;
            options.set_flag("dvb_on_demand", dvb.dvb_on_demand);
            options.set_flag("hw_decoder", dvb.hw_decoder);
            options.set_flag("recordts", dvb.recordts);
            options.set_flag("wait_for_seqstart", dvb.wait_for_seqstart);
            options.set_int("dmx_buf_size", dvb.dmx_buf_size);
            options.set_int("pkt_buf_size", dvb.pkt_buf_size);
            options.set_int("signal_monitor_interval", settings.dvb_monitor_interval());
            options.set_int("expire_data_days", settings.dvb_monitor_retention_days());
        }
        CardType::V4l | CardType::Mpeg => {
            options.set_flag("skipbtaudio", device.skip_bt_audio);
            let rate = if device.audio_sample_rate > 0 {
                device.audio_sample_rate
            } else {
                settings.audio_sample_rate()
            };
            options.set_int("audiosamplerate", rate);
        }
    }
    options
}

impl CoordinatorInner {
    /// Looks a profile up for this card, falling back to the default one.
    fn load_profile(&self, requested: &str) -> RecordingProfile {
        let mut names = vec![requested];
        if requested != DEFAULT_PROFILE {
            names.push(DEFAULT_PROFILE);
        }
        for name in names {
            match self.db.profile(self.cardid, name) {
                Ok(Some(profile)) => return profile,
                Ok(None) => debug!(cardid = self.cardid, profile = name, "Profile not found"),
                Err(err) => {
                    warn!(cardid = self.cardid, profile = name, error = %err, "Failed to load profile");
                }
            }
        }
        RecordingProfile::named(requested)
    }

    /// Creates the recorder on the current sink and waits for it to record.
    pub(crate) fn start_recorder(&self, state: &mut CoordinatorState) -> bool {
        let Some(sink) = state.sink.clone() else {
            error!(cardid = self.cardid, "No sink to record into");
            return false;
        };
        let Some(current) = state.current.as_ref() else {
            error!(cardid = self.cardid, "Nothing to record");
            return false;
        };

        let scheduled = current.kind == RecordingKind::Scheduled;
        let requested = if !scheduled {
            LIVE_TV_PROFILE
        } else if current.info.profile.is_empty() {
            DEFAULT_PROFILE
        } else {
            current.info.profile.as_str()
        };
        let profile = self.load_profile(requested);
        let jobs = if scheduled {
            assemble_job_mask(&current.info, &profile)
        } else {
            JobMask::NONE
        };
        let mut options = recorder_options(&self.device, self.card_type, &profile, &self.settings);
        options.pip = state.pip;
        if let Some(bytes) = options.write_buffer_size {
            sink.set_write_buffer_size(bytes);
        }

        let created = self.backend.create_recorder(RecorderSetup {
            device: &self.device,
            card_type: self.card_type,
            options: &options,
            sink,
            recording: scheduled.then_some(&current.info),
        });
        let recorder: CaptureRecorderHandle = match created {
            Ok(recorder) => Arc::from(recorder),
            Err(err) => {
                error!(cardid = self.cardid, error = %err, "Failed to create recorder");
                return false;
            }
        };
        state.profile_name = profile.name.clone();
        state.jobs = jobs;

        let channum = state
            .channel
            .as_ref()
            .map(|channel| channel.current_channel())
            .unwrap_or_default();
        recorder.set_channel_name(&channum);
        if let Some(info) = self.channel_info_for(&channum) {
            if !info.video_filters.is_empty() {
                recorder.set_video_filters(&info.video_filters);
            }
        }
        self.prepare_channel_for_recorder(state);

        let worker_recorder = Arc::clone(&recorder);
        let spawned = thread::Builder::new()
            .name(format!("tvrec-recorder-{}", self.cardid))
            .spawn(move || worker_recorder.run());
        let worker = match spawned {
            Ok(worker) => worker,
            Err(err) => {
                error!(cardid = self.cardid, error = %err, "Failed to spawn recorder thread");
                state.profile_name.clear();
                return false;
            }
        };

        let outcome = recorder.wait_until_started(self.settings.recorder_start_timeout());
        if outcome != RecorderStart::Recording {
            error!(cardid = self.cardid, ?outcome, "Recorder did not start");
            recorder.stop_recording();
            if worker.join().is_err() {
                error!(cardid = self.cardid, "Recorder thread panicked");
            }
            state.profile_name.clear();
            return false;
        }

        state.frame_rate = recorder.frame_rate();
        state.recorder = Some(ActiveRecorder { recorder, worker });
        info!(
            cardid = self.cardid,
            profile = %state.profile_name,
            channum = %channum,
            jobs = ?state.jobs,
            "Recorder started"
        );

        if should_flag_early(state.jobs, &self.settings) {
            self.queue_early_commflag(state);
        }
        true
    }

    fn queue_early_commflag(&self, state: &mut CoordinatorState) {
        let Some(current) = state.current.as_ref() else {
            return;
        };
        let request = JobRequest {
            jobs: JobMask::COMMFLAG,
            chanid: current.info.chanid.clone(),
            start: current.info.start,
            host: self.job_host(),
            live_recording: true,
        };
        if self.jobs.queue_jobs(&request) {
            info!(cardid = self.cardid, chanid = %request.chanid, "Flagging while recording");
            state.jobs.remove(JobMask::COMMFLAG);
        } else {
            warn!(cardid = self.cardid, "Failed to queue flagging job");
        }
    }

    fn job_host(&self) -> Option<String> {
        self.settings
            .jobs_run_on_record_host()
            .then(|| self.settings.hostname().to_string())
    }

    /// Stops the recorder and releases the sink. With `kill` the output
    /// file is removed and no jobs are queued.
    pub(crate) fn teardown_recorder(&self, state: &mut CoordinatorState, kill: bool) {
        if let Some(active) = state.recorder.take() {
            active.recorder.stop_recording();
            if active.worker.join().is_err() {
                error!(cardid = self.cardid, "Recorder thread panicked");
            }
            let frames = active.recorder.frames_written();
            let length_secs = if state.frame_rate > 0.0 {
                (frames as f64 / state.frame_rate) as i64
            } else {
                -1
            };
            debug!(cardid = self.cardid, frames, length_secs, "Recorder stopped");
            self.dispatch(RecorderEvent::DoneRecording {
                cardid: self.cardid,
                length_secs,
            });
        }
        state.profile_name.clear();
        state.frame_rate = -1.0;
        state.pip = false;

        if let Some(sink) = state.sink.take() {
            sink.stop_reads();
        }
        {
            let mut data = self.lock_data();
            data.sink = None;
            data.live = false;
        }

        if let Some(path) = state.output_path.take() {
            if kill {
                if let Err(err) = self.sinks.remove(&path) {
                    warn!(cardid = self.cardid, path = %path.display(), error = %err, "Failed to remove output");
                }
            }
        }

        let jobs = std::mem::replace(&mut state.jobs, JobMask::NONE);
        if let Some(current) = state.current.take() {
            let eligible = current.kind == RecordingKind::Scheduled
                && !kill
                && !state.premature_stop
                && !jobs.is_empty();
            if eligible {
                let request = JobRequest {
                    jobs,
                    chanid: current.info.chanid,
                    start: current.info.start,
                    host: self.job_host(),
                    live_recording: false,
                };
                if !self.jobs.queue_jobs(&request) {
                    warn!(cardid = self.cardid, chanid = %request.chanid, "Failed to queue jobs");
                }
            }
            self.dispatch(RecorderEvent::RecordingListChange);
        }

        if state.monitor.is_none() {
            self.close_channel(state);
        }
    }
}
