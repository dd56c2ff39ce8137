#![expect(clippy::print_stderr, reason = "Tracing is not installed yet")]

//! Tracing setup shared by the tvrec binary and its tests.
//!
//! Environment:
//! - `RUST_LOG`: filter directives, overrides the caller's default level
//! - `TVREC_LOG`: append logs to this file instead of a standard stream
//! - `TVREC_LOG_FORMAT`: `text` (default) or `json`
//! - `TVREC_LOG_STREAM`: `stderr` (default) or `stdout`

use std::io::IsTerminal;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

pub const LOG_FILE_ENV: &str = "TVREC_LOG";
pub const LOG_FORMAT_ENV: &str = "TVREC_LOG_FORMAT";
pub const LOG_STREAM_ENV: &str = "TVREC_LOG_STREAM";

/// Keeps the non-blocking file writer flushing until dropped.
#[derive(Debug)]
pub struct TelemetryGuard {
    _guard: Option<WorkerGuard>,
}

impl TelemetryGuard {
    fn disabled() -> Self {
        Self { _guard: None }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogStream {
    Stderr,
    Stdout,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TelemetrySettings {
    pub format: LogFormat,
    pub stream: LogStream,
    pub file: Option<PathBuf>,
}

impl TelemetrySettings {
    pub fn from_env() -> Self {
        let format = match env_lowercase(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };
        let stream = match env_lowercase(LOG_STREAM_ENV).as_deref() {
            Some("stdout") => LogStream::Stdout,
            _ => LogStream::Stderr,
        };
        let file = std::env::var(LOG_FILE_ENV)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);
        Self {
            format,
            stream,
            file,
        }
    }
}

fn env_lowercase(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_lowercase())
}

fn stream_writer(stream: LogStream) -> (BoxMakeWriter, bool) {
    match stream {
        LogStream::Stdout => (
            BoxMakeWriter::new(std::io::stdout),
            std::io::stdout().is_terminal(),
        ),
        LogStream::Stderr => (
            BoxMakeWriter::new(std::io::stderr),
            std::io::stderr().is_terminal(),
        ),
    }
}

/// Installs the global subscriber. A second call leaves the first one in place.
pub fn init_tracing(default_level: &str) -> TelemetryGuard {
    init_tracing_with(default_level, TelemetrySettings::from_env())
}

pub fn init_tracing_with(default_level: &str, settings: TelemetrySettings) -> TelemetryGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (writer, guard, ansi) = match settings.file.as_ref() {
        Some(path) => match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
        {
            Ok(file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file);
                (BoxMakeWriter::new(non_blocking), Some(guard), false)
            }
            Err(err) => {
                eprintln!(
                    "Warning: failed to open log file {}: {}",
                    path.display(),
                    err
                );
                let (writer, ansi) = stream_writer(LogStream::Stderr);
                (writer, None, ansi)
            }
        },
        None => {
            let (writer, ansi) = stream_writer(settings.stream);
            (writer, None, ansi)
        }
    };

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = match settings.format {
        LogFormat::Json => Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_thread_names(true)
                .with_ansi(false)
                .json()
                .with_writer(writer)
                .finish(),
        ),
        LogFormat::Text => Box::new(
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_thread_names(true)
                .with_ansi(ansi)
                .with_writer(writer)
                .finish(),
        ),
    };

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        return TelemetryGuard::disabled();
    }

    TelemetryGuard { _guard: guard }
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
            let prev = std::env::var(key).ok();
            // SAFETY: Test-only environment override, serialized by ENV_LOCK.
            unsafe {
                std::env::set_var(key, value);
            }
            Self { key, prev }
        }

        fn remove(key: &'static str) -> Self {
            let prev = std::env::var(key).ok();
            // SAFETY: Test-only environment override, serialized by ENV_LOCK.
            unsafe {
                std::env::remove_var(key);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match self.prev.take() {
                // SAFETY: Test-only environment restoration.
                Some(prev) => unsafe { std::env::set_var(self.key, prev) },
                // SAFETY: Test-only environment cleanup.
                None => unsafe { std::env::remove_var(self.key) },
            }
        }
    }

    #[test]
    fn test_settings_parse_json_stdout() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _format = EnvGuard::set(LOG_FORMAT_ENV, " JSON ");
        let _stream = EnvGuard::set(LOG_STREAM_ENV, "stdout");
        let _file = EnvGuard::set(LOG_FILE_ENV, "/tmp/tvrec.log");

        let settings = TelemetrySettings::from_env();
        assert_eq!(settings.format, LogFormat::Json);
        assert_eq!(settings.stream, LogStream::Stdout);
        assert_eq!(settings.file, Some(PathBuf::from("/tmp/tvrec.log")));
    }

    #[test]
    fn test_settings_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _format = EnvGuard::remove(LOG_FORMAT_ENV);
        let _stream = EnvGuard::remove(LOG_STREAM_ENV);
        let _file = EnvGuard::set(LOG_FILE_ENV, "  ");

        let settings = TelemetrySettings::from_env();
        assert_eq!(settings.format, LogFormat::Text);
        assert_eq!(settings.stream, LogStream::Stderr);
        assert_eq!(settings.file, None);
    }

    #[test]
    fn test_unknown_values_fall_back() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _format = EnvGuard::set(LOG_FORMAT_ENV, "yaml");
        let _stream = EnvGuard::set(LOG_STREAM_ENV, "syslog");

        let settings = TelemetrySettings::from_env();
        assert_eq!(settings.format, LogFormat::Text);
        assert_eq!(settings.stream, LogStream::Stderr);
    }
}
