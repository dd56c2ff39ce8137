#![expect(clippy::print_stdout, reason = "CLI output is emitted here")]
#![expect(clippy::print_stderr, reason = "CLI output is emitted here")]

//! CLI application layer and composition root wiring.

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use std::io;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::debug;
use tvrec_common::telemetry;

pub mod commands;
pub mod error;
pub mod handlers;
pub mod signal_handler;

use crate::app::commands::Cli;
use crate::app::commands::Commands;
use crate::app::error::AppError;
use crate::app::signal_handler::SignalHandler;
use crate::config::ConfigError;
use crate::config::RecorderSettings;
use crate::usecases::CoordinatorError;
use crate::usecases::ports::DbError;

const PROGRAM_NAME: &str = "tvrec";

/// Exit codes following sysexits.h conventions.
mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const UNAVAILABLE: i32 = 69;
    pub const CANTCREAT: i32 = 73;
    pub const TEMPFAIL: i32 = 75;
    pub const CONFIG: i32 = 78;
}

pub struct Application;

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self) -> Result<i32> {
        let exit_code = match self.execute() {
            Ok(code) => code,
            Err(e) => self.handle_error(e),
        };
        Ok(exit_code)
    }

    fn execute(&self) -> Result<i32> {
        let cli = Cli::parse();
        let _telemetry = telemetry::init_tracing(if cli.verbose { "debug" } else { "warn" });
        debug!(command = ?cli.command, "CLI command parsed");

        let settings = RecorderSettings::load(cli.config.as_deref())?;

        match &cli.command {
            Commands::Exec(args) => {
                let outcome = handlers::exec(args)?;
                let mut stdout = io::stdout().lock();
                stdout.write_all(&outcome.stdout).context("failed to write stdout")?;
                stdout.flush().context("failed to flush stdout")?;
                io::stderr()
                    .lock()
                    .write_all(&outcome.stderr)
                    .context("failed to write stderr")?;
                if args.background {
                    if let Some(pid) = outcome.pid {
                        println!("{pid}");
                    }
                }
                Ok(outcome.exit_code())
            }
            Commands::Record(args) => {
                let shutdown = Arc::new(AtomicBool::new(false));
                let _signals = SignalHandler::setup(Arc::clone(&shutdown))?;
                let report = handlers::record(&settings, args, &shutdown)?;
                print_json(&report)?;
                Ok(exit_codes::SUCCESS)
            }
            Commands::Live(args) => {
                let shutdown = Arc::new(AtomicBool::new(false));
                let _signals = SignalHandler::setup(Arc::clone(&shutdown))?;
                let report = handlers::live(&settings, args, &shutdown)?;
                print_json(&report)?;
                Ok(exit_codes::SUCCESS)
            }
            Commands::Settings => {
                println!("{}", handlers::settings_document(&settings)?);
                Ok(exit_codes::SUCCESS)
            }
        }
    }

    fn handle_error(&self, e: anyhow::Error) -> i32 {
        if let Some(config_error) = find_error::<ConfigError>(&e) {
            print_error(config_error, &config_error.suggestion(), config_error.is_retryable());
            return exit_codes::CONFIG;
        }
        if let Some(coordinator_error) = find_error::<CoordinatorError>(&e) {
            print_error(
                coordinator_error,
                &coordinator_error.suggestion(),
                coordinator_error.is_retryable(),
            );
            return exit_codes::UNAVAILABLE;
        }
        if let Some(app_error) = find_error::<AppError>(&e) {
            print_error(&e, &app_error.suggestion(), app_error.is_retryable());
            return exit_code_for_app_error(app_error);
        }
        if let Some(db_error) = find_error::<DbError>(&e) {
            print_error(&e, &db_error.suggestion(), db_error.is_retryable());
            return exit_codes::UNAVAILABLE;
        }
        eprintln!("{PROGRAM_NAME}: Error: {e:#}");
        exit_codes::GENERAL_ERROR
    }
}

fn exit_code_for_app_error(error: &AppError) -> i32 {
    match error {
        AppError::RecordingRejected { .. } | AppError::StateNotReached { .. } => {
            exit_codes::TEMPFAIL
        }
        AppError::RingBuffer(_) => exit_codes::CANTCREAT,
        AppError::UnknownChannel(_) => exit_codes::UNAVAILABLE,
        AppError::SignalSetup(_) => exit_codes::GENERAL_ERROR,
    }
}

fn find_error<T: std::error::Error + 'static>(error: &anyhow::Error) -> Option<&T> {
    error.chain().find_map(|source| source.downcast_ref::<T>())
}

fn print_error(error: &dyn std::fmt::Display, suggestion: &str, retryable: bool) {
    eprintln!("{PROGRAM_NAME}: Error: {error:#}");
    eprintln!("Suggestion: {suggestion}");
    if retryable {
        eprintln!("(This error may be transient - retry may succeed)");
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize output")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StartRecordingResult;
    use crate::domain::TvState;

    #[test]
    fn test_config_error_exit_code() {
        let app = Application::new();
        let err = RecorderSettings::load(Some(std::path::Path::new("/nonexistent/tvrec.json")))
            .unwrap_err();
        assert_eq!(app.handle_error(err.into()), exit_codes::CONFIG);
    }

    #[test]
    fn test_db_error_behind_context_is_unavailable() {
        let app = Application::new();
        let err = anyhow::Error::new(DbError::Unavailable("gone".into()))
            .context("failed to open channel store");
        assert_eq!(app.handle_error(err), exit_codes::UNAVAILABLE);
    }

    #[test]
    fn test_app_error_exit_codes() {
        assert_eq!(
            exit_code_for_app_error(&AppError::RecordingRejected {
                cardid: 1,
                result: StartRecordingResult::Busy,
            }),
            exit_codes::TEMPFAIL
        );
        assert_eq!(
            exit_code_for_app_error(&AppError::StateNotReached {
                cardid: 1,
                wanted: TvState::WatchingLiveTv,
                actual: TvState::None,
            }),
            exit_codes::TEMPFAIL
        );
        assert_eq!(
            exit_code_for_app_error(&AppError::RingBuffer(1)),
            exit_codes::CANTCREAT
        );
    }

    #[test]
    fn test_unknown_error_is_general() {
        let app = Application::new();
        assert_eq!(
            app.handle_error(anyhow::anyhow!("boom")),
            exit_codes::GENERAL_ERROR
        );
    }
}
