//! Post-processing jobs run as local helper commands.

use std::collections::BTreeMap;

use tracing::info;
use tracing::warn;
use tvrec_process::ProcessFlags;
use tvrec_process::ProcessHandle;
use tvrec_process::ProcessStatus;
use tvrec_process::ProcessSupervisor;

use crate::domain::JobRequest;
use crate::usecases::ports::JobQueue;

/// Launches one background command per requested job.
///
/// Templates are keyed by job name (`COMMFLAG`, `TRANSCODE`, `USERJOB1`...)
/// and may use `%JOB%`, `%CHANID%`, `%STARTTIME%` (`YYYYmmddHHMMSS`) and
/// `%LIVE%` (`1` while the recording is still being written).
pub struct CommandJobQueue {
    supervisor: ProcessSupervisor,
    commands: BTreeMap<String, String>,
    hostname: String,
}

impl CommandJobQueue {
    pub fn new(
        supervisor: ProcessSupervisor,
        commands: BTreeMap<String, String>,
        hostname: impl Into<String>,
    ) -> Self {
        Self {
            supervisor,
            commands,
            hostname: hostname.into(),
        }
    }
}

pub fn expand_template(template: &str, job: &str, request: &JobRequest) -> String {
    template
        .replace("%JOB%", job)
        .replace("%CHANID%", &request.chanid)
        .replace("%STARTTIME%", &request.start.format("%Y%m%d%H%M%S").to_string())
        .replace("%LIVE%", if request.live_recording { "1" } else { "0" })
}

impl JobQueue for CommandJobQueue {
    fn queue_jobs(&self, request: &JobRequest) -> bool {
        if let Some(host) = request.host.as_deref() {
            if host != self.hostname {
                warn!(host, local = %self.hostname, "Jobs pinned to another host");
                return false;
            }
        }

        let mut queued = true;
        for (_, name) in request.jobs.jobs() {
            let Some(template) = self.commands.get(name) else {
                warn!(job = name, chanid = %request.chanid, "No command configured for job");
                queued = false;
                continue;
            };
            let command = expand_template(template, name, request);
            let handle = ProcessHandle::shell(
                &self.supervisor,
                command,
                ProcessFlags::RUN_BACKGROUND
                    | ProcessFlags::DONT_BLOCK_INPUT_DEVS
                    | ProcessFlags::DONT_DISABLE_DRAWING,
            );
            match handle.run(None) {
                ProcessStatus::Running => {
                    info!(job = name, command = handle.command(), pid = ?handle.pid(), "Job started");
                }
                status => {
                    warn!(job = name, command = handle.command(), %status, "Job failed to start");
                    queued = false;
                }
            }
        }
        queued
    }
}
