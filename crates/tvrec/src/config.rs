//! Recorder settings.
//!
//! Built-in defaults, then an optional JSON settings file, then `TVREC_*`
//! environment overrides. Invalid environment values are logged and ignored.

use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const DEFAULT_LIVE_BUFFER_GB: u64 = 5;
const DEFAULT_LIVE_BUFFER_FILL_MB: u64 = 50;
const DEFAULT_CHANNEL_ORDERING: &str = "channum + 0";
const DEFAULT_DVB_MONITOR_RETENTION_DAYS: i64 = 3;
const DEFAULT_POLL_INTERVAL_MS: u64 = 20;
const DEFAULT_EVICTION_WINDOWS_MS: [u64; 3] = [10_000, 10_000, 5_000];
const DEFAULT_RECORDER_START_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STATE_CHANGE_TIMEOUT_SECS: u64 = 60;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub fn suggestion(&self) -> String {
        match self {
            ConfigError::Read { path, .. } => {
                format!("Check that {} exists and is readable.", path.display())
            }
            ConfigError::Parse { .. } => {
                "Run 'tvrec settings' to print a valid settings document.".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// On-disk form of [`RecorderSettings`]. Every key is optional; durations
/// are in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SettingsDocument {
    pub transcode_before_commflag: Option<bool>,
    pub commflag_while_recording: Option<bool>,
    pub jobs_run_on_record_host: Option<bool>,
    pub audio_sample_rate: Option<i64>,
    pub record_overtime_secs: Option<i64>,
    pub category_overtime_mins: Option<i64>,
    pub overtime_category: Option<String>,
    pub live_buffer_gb: Option<u64>,
    pub live_buffer_fill_mb: Option<u64>,
    pub live_buffer_dir: Option<PathBuf>,
    pub record_file_prefix: Option<PathBuf>,
    pub channel_ordering: Option<String>,
    pub dvb_monitor_interval: Option<i64>,
    pub dvb_monitor_retention_days: Option<i64>,
    pub hostname: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub eviction_windows_ms: Option<[u64; 3]>,
    pub recorder_start_timeout_ms: Option<u64>,
    pub state_change_timeout_ms: Option<u64>,
    /// Command templates keyed by job name (`COMMFLAG`, `TRANSCODE`, ...).
    pub job_commands: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecorderSettings {
    transcode_before_commflag: bool,
    commflag_while_recording: bool,
    jobs_run_on_record_host: bool,
    audio_sample_rate: i64,
    record_overtime_secs: i64,
    category_overtime_mins: i64,
    overtime_category: String,
    live_buffer_gb: u64,
    live_buffer_fill_mb: u64,
    live_buffer_dir: PathBuf,
    record_file_prefix: PathBuf,
    channel_ordering: String,
    dvb_monitor_interval: i64,
    dvb_monitor_retention_days: i64,
    hostname: String,
    poll_interval: Duration,
    eviction_windows: [Duration; 3],
    recorder_start_timeout: Duration,
    state_change_timeout: Duration,
    job_commands: BTreeMap<String, String>,
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            transcode_before_commflag: false,
            commflag_while_recording: false,
            jobs_run_on_record_host: false,
            audio_sample_rate: 0,
            record_overtime_secs: 0,
            category_overtime_mins: 0,
            overtime_category: String::new(),
            live_buffer_gb: DEFAULT_LIVE_BUFFER_GB,
            live_buffer_fill_mb: DEFAULT_LIVE_BUFFER_FILL_MB,
            live_buffer_dir: env::temp_dir(),
            record_file_prefix: env::temp_dir(),
            channel_ordering: DEFAULT_CHANNEL_ORDERING.to_string(),
            dvb_monitor_interval: 0,
            dvb_monitor_retention_days: DEFAULT_DVB_MONITOR_RETENTION_DAYS,
            hostname: env::var("HOSTNAME")
                .ok()
                .filter(|h| !h.trim().is_empty())
                .unwrap_or_else(|| "localhost".to_string()),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            eviction_windows: DEFAULT_EVICTION_WINDOWS_MS.map(Duration::from_millis),
            recorder_start_timeout: Duration::from_secs(DEFAULT_RECORDER_START_TIMEOUT_SECS),
            state_change_timeout: Duration::from_secs(DEFAULT_STATE_CHANGE_TIMEOUT_SECS),
            job_commands: BTreeMap::new(),
        }
    }
}

impl RecorderSettings {
    pub fn transcode_before_commflag(&self) -> bool {
        self.transcode_before_commflag
    }

    pub fn commflag_while_recording(&self) -> bool {
        self.commflag_while_recording
    }

    pub fn jobs_run_on_record_host(&self) -> bool {
        self.jobs_run_on_record_host
    }

    pub fn audio_sample_rate(&self) -> i64 {
        self.audio_sample_rate
    }

    pub fn record_overtime_secs(&self) -> i64 {
        self.record_overtime_secs
    }

    pub fn category_overtime_mins(&self) -> i64 {
        self.category_overtime_mins
    }

    pub fn overtime_category(&self) -> &str {
        &self.overtime_category
    }

    pub fn live_buffer_gb(&self) -> u64 {
        self.live_buffer_gb
    }

    pub fn live_buffer_fill_mb(&self) -> u64 {
        self.live_buffer_fill_mb
    }

    /// Ring buffer size in bytes.
    pub fn live_buffer_bytes(&self) -> u64 {
        self.live_buffer_gb.saturating_mul(1024 * 1024 * 1024)
    }

    /// Ring buffer fill threshold in bytes.
    pub fn live_buffer_fill_bytes(&self) -> u64 {
        self.live_buffer_fill_mb.saturating_mul(1024 * 1024)
    }

    pub fn live_buffer_dir(&self) -> &Path {
        &self.live_buffer_dir
    }

    pub fn record_file_prefix(&self) -> &Path {
        &self.record_file_prefix
    }

    pub fn channel_ordering(&self) -> &str {
        &self.channel_ordering
    }

    pub fn dvb_monitor_interval(&self) -> i64 {
        self.dvb_monitor_interval
    }

    pub fn dvb_monitor_retention_days(&self) -> i64 {
        self.dvb_monitor_retention_days
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn eviction_windows(&self) -> [Duration; 3] {
        self.eviction_windows
    }

    pub fn recorder_start_timeout(&self) -> Duration {
        self.recorder_start_timeout
    }

    pub fn state_change_timeout(&self) -> Duration {
        self.state_change_timeout
    }

    pub fn job_commands(&self) -> &BTreeMap<String, String> {
        &self.job_commands
    }

    /// Defaults with environment overrides.
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Defaults, then the settings file when given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        if let Some(path) = path {
            let document = read_document(path)?;
            settings.apply_document(document);
        }
        Ok(settings.apply_env())
    }

    pub fn apply_document(&mut self, doc: SettingsDocument) {
        if let Some(v) = doc.transcode_before_commflag {
            self.transcode_before_commflag = v;
        }
        if let Some(v) = doc.commflag_while_recording {
            self.commflag_while_recording = v;
        }
        if let Some(v) = doc.jobs_run_on_record_host {
            self.jobs_run_on_record_host = v;
        }
        if let Some(v) = doc.audio_sample_rate {
            self.audio_sample_rate = v;
        }
        if let Some(v) = doc.record_overtime_secs {
            self.record_overtime_secs = v;
        }
        if let Some(v) = doc.category_overtime_mins {
            self.category_overtime_mins = v;
        }
        if let Some(v) = doc.overtime_category {
            self.overtime_category = v;
        }
        if let Some(v) = doc.live_buffer_gb {
            self.live_buffer_gb = v;
        }
        if let Some(v) = doc.live_buffer_fill_mb {
            self.live_buffer_fill_mb = v;
        }
        if let Some(v) = doc.live_buffer_dir {
            self.live_buffer_dir = v;
        }
        if let Some(v) = doc.record_file_prefix {
            self.record_file_prefix = v;
        }
        if let Some(v) = doc.channel_ordering {
            self.channel_ordering = v;
        }
        if let Some(v) = doc.dvb_monitor_interval {
            self.dvb_monitor_interval = v;
        }
        if let Some(v) = doc.dvb_monitor_retention_days {
            self.dvb_monitor_retention_days = v;
        }
        if let Some(v) = doc.hostname {
            self.hostname = v;
        }
        if let Some(v) = doc.poll_interval_ms {
            self.poll_interval = Duration::from_millis(v.max(1));
        }
        if let Some(v) = doc.eviction_windows_ms {
            self.eviction_windows = v.map(Duration::from_millis);
        }
        if let Some(v) = doc.recorder_start_timeout_ms {
            self.recorder_start_timeout = Duration::from_millis(v);
        }
        if let Some(v) = doc.state_change_timeout_ms {
            self.state_change_timeout = Duration::from_millis(v);
        }
        if let Some(v) = doc.job_commands {
            self.job_commands = v;
        }
    }

    fn apply_env(mut self) -> Self {
        self.transcode_before_commflag = parse_env_bool(
            "TVREC_TRANSCODE_BEFORE_COMMFLAG",
            self.transcode_before_commflag,
        );
        self.commflag_while_recording = parse_env_bool(
            "TVREC_COMMFLAG_WHILE_RECORDING",
            self.commflag_while_recording,
        );
        self.jobs_run_on_record_host =
            parse_env_bool("TVREC_JOBS_RUN_ON_RECORD_HOST", self.jobs_run_on_record_host);
        self.record_overtime_secs =
            parse_env_i64("TVREC_RECORD_OVERTIME", self.record_overtime_secs);
        self.category_overtime_mins =
            parse_env_i64("TVREC_CATEGORY_OVERTIME", self.category_overtime_mins);
        if let Some(category) = env_string("TVREC_OVERTIME_CATEGORY") {
            self.overtime_category = category;
        }
        self.live_buffer_gb = parse_env_u64("TVREC_LIVE_BUFFER_GB", self.live_buffer_gb);
        self.live_buffer_fill_mb =
            parse_env_u64("TVREC_LIVE_BUFFER_FILL_MB", self.live_buffer_fill_mb);
        if let Some(dir) = env_string("TVREC_LIVE_BUFFER_DIR") {
            self.live_buffer_dir = PathBuf::from(dir);
        }
        if let Some(prefix) = env_string("TVREC_RECORD_PREFIX") {
            self.record_file_prefix = PathBuf::from(prefix);
        }
        if let Some(ordering) = env_string("TVREC_CHANNEL_ORDERING") {
            self.channel_ordering = ordering;
        }
        if let Some(hostname) = env_string("TVREC_HOSTNAME") {
            self.hostname = hostname;
        }
        self.poll_interval = Duration::from_millis(
            parse_env_u64(
                "TVREC_POLL_INTERVAL_MS",
                self.poll_interval.as_millis() as u64,
            )
            .max(1),
        );
        self.recorder_start_timeout = Duration::from_secs(parse_env_u64(
            "TVREC_RECORDER_START_TIMEOUT",
            self.recorder_start_timeout.as_secs(),
        ));
        self.state_change_timeout = Duration::from_secs(parse_env_u64(
            "TVREC_STATE_CHANGE_TIMEOUT",
            self.state_change_timeout.as_secs(),
        ));
        self
    }

    pub fn document(&self) -> SettingsDocument {
        SettingsDocument {
            transcode_before_commflag: Some(self.transcode_before_commflag),
            commflag_while_recording: Some(self.commflag_while_recording),
            jobs_run_on_record_host: Some(self.jobs_run_on_record_host),
            audio_sample_rate: Some(self.audio_sample_rate),
            record_overtime_secs: Some(self.record_overtime_secs),
            category_overtime_mins: Some(self.category_overtime_mins),
            overtime_category: Some(self.overtime_category.clone()),
            live_buffer_gb: Some(self.live_buffer_gb),
            live_buffer_fill_mb: Some(self.live_buffer_fill_mb),
            live_buffer_dir: Some(self.live_buffer_dir.clone()),
            record_file_prefix: Some(self.record_file_prefix.clone()),
            channel_ordering: Some(self.channel_ordering.clone()),
            dvb_monitor_interval: Some(self.dvb_monitor_interval),
            dvb_monitor_retention_days: Some(self.dvb_monitor_retention_days),
            hostname: Some(self.hostname.clone()),
            poll_interval_ms: Some(self.poll_interval.as_millis() as u64),
            eviction_windows_ms: Some(self.eviction_windows.map(|w| w.as_millis() as u64)),
            recorder_start_timeout_ms: Some(self.recorder_start_timeout.as_millis() as u64),
            state_change_timeout_ms: Some(self.state_change_timeout.as_millis() as u64),
            job_commands: Some(self.job_commands.clone()),
        }
    }

    pub fn with_transcode_before_commflag(mut self, value: bool) -> Self {
        self.transcode_before_commflag = value;
        self
    }

    pub fn with_commflag_while_recording(mut self, value: bool) -> Self {
        self.commflag_while_recording = value;
        self
    }

    pub fn with_jobs_run_on_record_host(mut self, value: bool) -> Self {
        self.jobs_run_on_record_host = value;
        self
    }

    pub fn with_audio_sample_rate(mut self, rate: i64) -> Self {
        self.audio_sample_rate = rate;
        self
    }

    pub fn with_record_overtime_secs(mut self, secs: i64) -> Self {
        self.record_overtime_secs = secs;
        self
    }

    pub fn with_category_overtime(mut self, category: impl Into<String>, mins: i64) -> Self {
        self.overtime_category = category.into();
        self.category_overtime_mins = mins;
        self
    }

    pub fn with_live_buffer(mut self, dir: impl Into<PathBuf>, gb: u64, fill_mb: u64) -> Self {
        self.live_buffer_dir = dir.into();
        self.live_buffer_gb = gb;
        self.live_buffer_fill_mb = fill_mb;
        self
    }

    pub fn with_record_file_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.record_file_prefix = prefix.into();
        self
    }

    pub fn with_channel_ordering(mut self, ordering: impl Into<String>) -> Self {
        self.channel_ordering = ordering.into();
        self
    }

    pub fn with_dvb_monitoring(mut self, interval: i64, retention_days: i64) -> Self {
        self.dvb_monitor_interval = interval;
        self.dvb_monitor_retention_days = retention_days;
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_eviction_windows(mut self, windows: [Duration; 3]) -> Self {
        self.eviction_windows = windows;
        self
    }

    pub fn with_recorder_start_timeout(mut self, timeout: Duration) -> Self {
        self.recorder_start_timeout = timeout;
        self
    }

    pub fn with_state_change_timeout(mut self, timeout: Duration) -> Self {
        self.state_change_timeout = timeout;
        self
    }

    pub fn with_job_command(mut self, job: impl Into<String>, command: impl Into<String>) -> Self {
        self.job_commands.insert(job.into(), command.into());
        self
    }
}

fn read_document(path: &Path) -> Result<SettingsDocument, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn env_string(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env_u64(key: &str, default: u64) -> u64 {
    let Some(value) = env_string(key) else {
        return default;
    };
    match value.trim().parse::<u64>() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!(value = %value, key, "Invalid numeric setting; using default");
            default
        }
    }
}

fn parse_env_i64(key: &str, default: i64) -> i64 {
    let Some(value) = env_string(key) else {
        return default;
    };
    match value.trim().parse::<i64>() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!(value = %value, key, "Invalid numeric setting; using default");
            default
        }
    }
}

fn parse_env_bool(key: &str, default: bool) -> bool {
    let Some(value) = env_string(key) else {
        return default;
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            warn!(value = %value, key, "Invalid boolean setting; using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = env::var(key).ok();
            // SAFETY: Test-only environment override.
            unsafe {
                env::set_var(key, value);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            if let Some(prev) = self.prev.take() {
                // SAFETY: Test-only environment restoration.
                unsafe {
                    env::set_var(self.key, prev);
                }
            } else {
                // SAFETY: Test-only environment cleanup.
                unsafe {
                    env::remove_var(self.key);
                }
            }
        }
    }

    #[test]
    fn test_default_settings() {
        let settings = RecorderSettings::default();
        assert_eq!(settings.live_buffer_gb(), 5);
        assert_eq!(settings.live_buffer_fill_mb(), 50);
        assert_eq!(settings.live_buffer_bytes(), 5 * 1024 * 1024 * 1024);
        assert_eq!(settings.live_buffer_fill_bytes(), 50 * 1024 * 1024);
        assert_eq!(settings.channel_ordering(), "channum + 0");
        assert_eq!(settings.dvb_monitor_retention_days(), 3);
        assert_eq!(settings.poll_interval(), Duration::from_millis(20));
        assert_eq!(
            settings.eviction_windows(),
            [
                Duration::from_secs(10),
                Duration::from_secs(10),
                Duration::from_secs(5)
            ]
        );
        assert!(!settings.commflag_while_recording());
    }

    #[test]
    fn test_builder_pattern() {
        let settings = RecorderSettings::default()
            .with_record_overtime_secs(60)
            .with_category_overtime("Sports", 30)
            .with_poll_interval(Duration::from_millis(5))
            .with_hostname("backend1")
            .with_job_command("COMMFLAG", "true");

        assert_eq!(settings.record_overtime_secs(), 60);
        assert_eq!(settings.overtime_category(), "Sports");
        assert_eq!(settings.category_overtime_mins(), 30);
        assert_eq!(settings.poll_interval(), Duration::from_millis(5));
        assert_eq!(settings.hostname(), "backend1");
        assert_eq!(settings.job_commands().get("COMMFLAG").unwrap(), "true");
    }

    #[test]
    fn test_load_file_then_env() {
        let _lock = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"record_overtime_secs": 120, "overtime_category": "Sports", "poll_interval_ms": 40}"#,
        )
        .unwrap();
        let _guard = EnvGuard::set("TVREC_RECORD_OVERTIME", "90");

        let settings = RecorderSettings::load(Some(&path)).unwrap();
        assert_eq!(settings.record_overtime_secs(), 90);
        assert_eq!(settings.overtime_category(), "Sports");
        assert_eq!(settings.poll_interval(), Duration::from_millis(40));
    }

    #[test]
    fn test_invalid_env_value_uses_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::set("TVREC_LIVE_BUFFER_GB", "lots");
        let _flag = EnvGuard::set("TVREC_COMMFLAG_WHILE_RECORDING", "perhaps");
        let settings = RecorderSettings::from_env();
        assert_eq!(settings.live_buffer_gb(), DEFAULT_LIVE_BUFFER_GB);
        assert!(!settings.commflag_while_recording());
    }

    #[test]
    fn test_env_bool_override() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::set("TVREC_COMMFLAG_WHILE_RECORDING", "yes");
        assert!(RecorderSettings::from_env().commflag_while_recording());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = RecorderSettings::load(Some(Path::new("/nonexistent/tvrec.json"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.suggestion().contains("/nonexistent/tvrec.json"));
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"record_overtime": 1}"#).unwrap();
        let err = RecorderSettings::load(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_document_round_trips_through_apply() {
        let settings = RecorderSettings::default()
            .with_record_overtime_secs(15)
            .with_eviction_windows([Duration::from_millis(1); 3]);
        let mut restored = RecorderSettings::default();
        restored.apply_document(settings.document());
        assert_eq!(restored, settings);
    }
}
