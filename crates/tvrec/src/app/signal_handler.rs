//! Ctrl-C and SIGTERM handling for long-running commands.

use signal_hook::consts::SIGINT;
use signal_hook::consts::SIGTERM;
use signal_hook::iterator::Signals;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::thread;
use std::thread::JoinHandle;
use tracing::info;
use tracing::warn;

use crate::app::error::AppError;

/// Raises `shutdown` on the first signal. A second signal exits right away
/// with `128 + signal`, skipping the coordinator teardown.
pub struct SignalHandler {
    _handle: JoinHandle<()>,
}

impl SignalHandler {
    pub fn setup(shutdown: Arc<AtomicBool>) -> Result<Self, AppError> {
        let mut signals =
            Signals::new([SIGINT, SIGTERM]).map_err(|e| AppError::SignalSetup(e.to_string()))?;

        let handle = thread::Builder::new()
            .name("signal-handler".to_string())
            .spawn(move || {
                let mut shutdown_initiated = false;
                for sig in signals.forever() {
                    if shutdown_initiated {
                        warn!(signal = sig, "Received second signal, exiting without teardown");
                        std::process::exit(128 + sig);
                    }
                    shutdown_initiated = true;
                    info!(signal = sig, "Received signal, stopping");
                    shutdown.store(true, Ordering::SeqCst);
                }
            })
            .map_err(|e| AppError::SignalSetup(format!("failed to spawn signal handler: {e}")))?;

        Ok(Self { _handle: handle })
    }
}
