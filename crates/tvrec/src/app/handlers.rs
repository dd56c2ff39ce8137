use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;
use chrono::Utc;
use crossbeam_channel::Receiver;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;
use std::time::Instant;
use tracing::info;
use tvrec_process::ProcessFlags;
use tvrec_process::ProcessHandle;
use tvrec_process::ProcessStatus;
use tvrec_process::ProcessSupervisor;
use tvrec_process::SupervisorConfig;

use crate::app::commands::ExecArgs;
use crate::app::commands::LiveArgs;
use crate::app::commands::RecordArgs;
use crate::app::error::AppError;
use crate::config::RecorderSettings;
use crate::domain::CardType;
use crate::domain::RecorderEvent;
use crate::domain::RecordingInfo;
use crate::domain::RingBufferInfo;
use crate::domain::StartRecordingResult;
use crate::domain::TvState;
use crate::infra::CommandJobQueue;
use crate::infra::EventBus;
use crate::infra::FileInputBackend;
use crate::infra::FileSinkFactory;
use crate::infra::JsonChannelStore;
use crate::usecases::CoordinatorDeps;
use crate::usecases::RecordingCoordinator;
use crate::usecases::ports::CaptureBackendHandle;
use crate::usecases::ports::CaptureBackends;
use crate::usecases::ports::ChannelDatabase;
use crate::usecases::ports::SystemClock;

const WAIT_TICK: Duration = Duration::from_millis(100);
const MAX_RECORD_SECS: u64 = 7 * 24 * 3600;
const ALL_CARD_TYPES: [CardType; 5] = [
    CardType::Mpeg,
    CardType::Hdtv,
    CardType::Firewire,
    CardType::Dvb,
    CardType::V4l,
];

/// A coordinator wired to the JSON store and the file-input backend.
struct Backend {
    coordinator: RecordingCoordinator,
    db: Arc<JsonChannelStore>,
    events: Receiver<RecorderEvent>,
    supervisor: ProcessSupervisor,
}

impl Backend {
    fn start(settings: &RecorderSettings, store: &Path, cardid: u32) -> Result<Self> {
        let db = Arc::new(
            JsonChannelStore::open(store)
                .with_context(|| format!("failed to open channel store {}", store.display()))?,
        );
        let supervisor = ProcessSupervisor::new(SupervisorConfig::default());
        let bus = Arc::new(EventBus::new());
        let events = bus.subscribe();

        let capture: CaptureBackendHandle = Arc::new(FileInputBackend::new(db.clone()));
        let backends = ALL_CARD_TYPES
            .into_iter()
            .fold(CaptureBackends::new(), |backends, card_type| {
                backends.with(card_type, Arc::clone(&capture))
            });

        let deps = CoordinatorDeps {
            backends,
            db: db.clone(),
            sinks: Arc::new(FileSinkFactory::new()),
            events: bus,
            jobs: Arc::new(CommandJobQueue::new(
                supervisor.clone(),
                settings.job_commands().clone(),
                settings.hostname(),
            )),
            clock: Arc::new(SystemClock),
            supervisor: supervisor.clone(),
        };
        let coordinator = RecordingCoordinator::new(cardid, settings.clone(), deps)?;
        Ok(Self {
            coordinator,
            db,
            events,
            supervisor,
        })
    }

    fn done_recording_length(&self) -> Option<i64> {
        self.events.try_iter().find_map(|event| match event {
            RecorderEvent::DoneRecording { length_secs, .. } => Some(length_secs),
            _ => None,
        })
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        self.coordinator.shutdown();
        self.supervisor.shutdown();
    }
}

#[derive(Debug, Serialize)]
pub struct RecordReport {
    pub cardid: u32,
    pub chanid: String,
    pub path: PathBuf,
    pub length_secs: Option<i64>,
    pub stopped_early: bool,
}

pub fn record(
    settings: &RecorderSettings,
    args: &RecordArgs,
    shutdown: &AtomicBool,
) -> Result<RecordReport> {
    let cardid = args.target.card;
    let backend = Backend::start(settings, &args.target.store, cardid)?;
    let channel = backend
        .db
        .channels()
        .context("failed to list channels")?
        .into_iter()
        .find(|c| c.chanid == args.chanid)
        .ok_or_else(|| AppError::UnknownChannel(args.chanid.clone()))?;

    let now = Utc::now();
    let secs = i64::try_from(args.duration.min(MAX_RECORD_SECS)).unwrap_or(0);
    let mut info = RecordingInfo::new(
        channel.chanid.clone(),
        args.title.clone(),
        now,
        now + chrono::Duration::seconds(secs),
    );
    info.chanstr = channel.channum.clone();
    info.chansign = channel.callsign.clone();
    info.channame = channel.name.clone();
    info.category = args.category.clone();
    info.sourceid = channel.sourceid;
    info.cardid = cardid;
    info.profile = args.profile.clone();
    info.chan_commfree = channel.commfree;
    let path = info.record_filename(settings.record_file_prefix());

    let result = backend.coordinator.start_recording(&info);
    if result != StartRecordingResult::Started {
        return Err(AppError::RecordingRejected { cardid, result }.into());
    }
    let reached = backend
        .coordinator
        .wait_until_settled(settings.state_change_timeout());
    if reached != TvState::RecordingOnly {
        return Err(AppError::StateNotReached {
            cardid,
            wanted: TvState::RecordingOnly,
            actual: reached,
        }
        .into());
    }
    info!(cardid, path = %path.display(), secs, "Recording started");

    let mut stopped_early = false;
    loop {
        if matches!(
            backend.coordinator.get_state(),
            TvState::None | TvState::Error
        ) {
            break;
        }
        if shutdown.load(Ordering::SeqCst) {
            stopped_early = true;
            backend.coordinator.stop_recording();
            break;
        }
        thread::sleep(WAIT_TICK);
    }
    backend.coordinator.shutdown();

    Ok(RecordReport {
        cardid,
        chanid: info.chanid,
        path,
        length_secs: backend.done_recording_length(),
        stopped_early,
    })
}

#[derive(Debug, Serialize)]
pub struct LiveReport {
    pub cardid: u32,
    pub ring_buffer: RingBufferInfo,
    pub frames_written: i64,
    pub file_position: i64,
}

pub fn live(settings: &RecorderSettings, args: &LiveArgs, shutdown: &AtomicBool) -> Result<LiveReport> {
    let cardid = args.target.card;
    let backend = Backend::start(settings, &args.target.store, cardid)?;
    let ring_buffer = backend
        .coordinator
        .setup_ring_buffer(args.pip)
        .ok_or(AppError::RingBuffer(cardid))?;

    backend.coordinator.spawn_live_tv();
    let state = backend.coordinator.get_state();
    if state != TvState::WatchingLiveTv {
        return Err(AppError::StateNotReached {
            cardid,
            wanted: TvState::WatchingLiveTv,
            actual: state,
        }
        .into());
    }
    info!(cardid, path = %ring_buffer.path.display(), "Live view started");

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    while Instant::now() < deadline
        && !shutdown.load(Ordering::SeqCst)
        && backend.coordinator.get_state() == TvState::WatchingLiveTv
    {
        thread::sleep(WAIT_TICK);
    }
    let frames_written = backend.coordinator.frames_written();
    let file_position = backend.coordinator.file_position();
    backend.coordinator.stop_live_tv();

    Ok(LiveReport {
        cardid,
        ring_buffer,
        frames_written,
        file_position,
    })
}

pub struct ExecOutcome {
    pub status: ProcessStatus,
    pub pid: Option<u32>,
    pub timed_out: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutcome {
    pub fn exit_code(&self) -> i32 {
        if self.timed_out {
            return ProcessStatus::TimedOut.exit_code();
        }
        match self.status {
            ProcessStatus::Running => 0,
            status => status.exit_code(),
        }
    }
}

pub fn exec(args: &ExecArgs) -> Result<ExecOutcome> {
    let supervisor = ProcessSupervisor::new(SupervisorConfig::default());
    let mut flags = ProcessFlags::NONE;
    if !args.no_buffer {
        flags |= ProcessFlags::BUFFERED;
    }
    if args.background {
        flags |= ProcessFlags::RUN_BACKGROUND;
    }

    let handle = if args.shell {
        ProcessHandle::shell(&supervisor, args.command.join(" "), flags)
    } else {
        let (program, rest) = args
            .command
            .split_first()
            .ok_or_else(|| anyhow!("no command given"))?;
        ProcessHandle::program(&supervisor, program, rest.iter().cloned(), flags)
    };

    let mut status = handle.run(args.timeout.map(Duration::from_secs));
    if status == ProcessStatus::Running && !handle.is_background() {
        status = handle.wait(None);
    }

    let buffered = flags.contains(ProcessFlags::BUFFERED) && status.is_final();
    let (stdout, stderr) = if buffered {
        (
            handle.read_all().context("failed to read command output")?,
            handle.read_all_err().context("failed to read command errors")?,
        )
    } else {
        (Vec::new(), Vec::new())
    };
    let outcome = ExecOutcome {
        status,
        pid: handle.pid(),
        timed_out: handle.timed_out(),
        stdout,
        stderr,
    };
    if status.is_final() {
        supervisor.shutdown();
    }
    Ok(outcome)
}

pub fn settings_document(settings: &RecorderSettings) -> Result<String> {
    serde_json::to_string_pretty(&settings.document()).context("failed to serialize settings")
}
