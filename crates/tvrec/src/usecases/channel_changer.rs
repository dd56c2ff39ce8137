//! Tuning through an external channel change command.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::debug;
use tracing::warn;
use tvrec_process::ProcessFlags;
use tvrec_process::ProcessHandle;
use tvrec_process::ProcessStatus;
use tvrec_process::ProcessSupervisor;

use crate::domain::PictureAttribute;
use crate::domain::PidCacheEntry;
use crate::usecases::ports::CaptureChannel;
use crate::usecases::ports::CaptureChannelBox;
use crate::usecases::ports::CaptureError;

pub const CHANNEL_CHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Wraps a channel so that named tuning runs `<command> <channum>` first.
/// Exit code 0 is success; the wrapped channel then records the new name.
pub struct ExternalChannelChanger {
    inner: CaptureChannelBox,
    program: String,
    args: Vec<String>,
    supervisor: ProcessSupervisor,
    timeout: Duration,
}

impl ExternalChannelChanger {
    pub fn new(
        inner: CaptureChannelBox,
        command: &str,
        supervisor: ProcessSupervisor,
    ) -> Result<Self, CaptureError> {
        let mut words = shell_words::split(command)
            .map_err(|e| CaptureError::ChangeCommand(format!("{command}: {e}")))?;
        if words.is_empty() {
            return Err(CaptureError::ChangeCommand("empty command".to_string()));
        }
        let program = words.remove(0);
        Ok(Self {
            inner,
            program,
            args: words,
            supervisor,
            timeout: CHANNEL_CHANGE_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn run_command(&self, channum: &str) -> Result<(), CaptureError> {
        let mut args = self.args.clone();
        args.push(channum.to_string());
        let handle = ProcessHandle::program(
            &self.supervisor,
            &self.program,
            args,
            ProcessFlags::BUFFERED,
        );
        debug!(command = handle.command(), "Running external channel change");
        handle.run(Some(self.timeout));
        let status = handle.wait(None);
        if status.success() {
            return Ok(());
        }
        let stderr = handle.read_all_err().unwrap_or_default();
        let stderr = String::from_utf8_lossy(&stderr);
        warn!(
            command = handle.command(),
            status = %status,
            stderr = %stderr.trim(),
            "External channel change failed"
        );
        Err(CaptureError::ChangeCommand(match status {
            ProcessStatus::NotFound => format!("{} not found", self.program),
            status => format!("{} ended with {status}", handle.command()),
        }))
    }
}

impl CaptureChannel for ExternalChannelChanger {
    fn open(&mut self) -> Result<(), CaptureError> {
        self.inner.open()
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn set_channel_by_name(&mut self, channum: &str) -> Result<(), CaptureError> {
        self.run_command(channum)?;
        self.inner.set_channel_by_name(channum)
    }

    fn switch_to_input(&mut self, input: &str, channum: &str) -> Result<(), CaptureError> {
        self.inner.switch_to_input(input, channum)?;
        if channum.is_empty() {
            return Ok(());
        }
        self.run_command(channum)
    }

    fn toggle_inputs(&mut self) -> Result<(), CaptureError> {
        self.inner.toggle_inputs()
    }

    fn current_channel(&self) -> String {
        self.inner.current_channel()
    }

    fn current_input(&self) -> String {
        self.inner.current_input()
    }

    fn input_channels(&self) -> BTreeMap<String, String> {
        self.inner.input_channels()
    }

    fn set_input_channels(&mut self, channels: BTreeMap<String, String>) {
        self.inner.set_input_channels(channels);
    }

    fn set_channel_ordering(&mut self, ordering: &str) {
        self.inner.set_channel_ordering(ordering);
    }

    fn apply_picture_settings(&mut self) {
        self.inner.apply_picture_settings();
    }

    fn change_picture_attribute(&mut self, attr: PictureAttribute, up: bool) -> Option<i32> {
        self.inner.change_picture_attribute(attr, up)
    }

    fn cached_pids(&self) -> Vec<PidCacheEntry> {
        self.inner.cached_pids()
    }

    fn set_cached_pids(&mut self, pids: Vec<PidCacheEntry>) {
        self.inner.set_cached_pids(pids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usecases::ports::test_support::MockChannel;
    use tvrec_process::ReapScope;
    use tvrec_process::SupervisorConfig;

    fn supervisor() -> ProcessSupervisor {
        ProcessSupervisor::new(
            SupervisorConfig::default()
                .with_reap_scope(ReapScope::Tracked)
                .with_poll_interval(Duration::from_millis(10)),
        )
    }

    #[test]
    fn test_successful_command_tunes_inner_channel() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("changes.log");
        let script = format!("sh -c 'echo \"$0\" >> {}'", log.display());
        let mock = MockChannel::new("Tuner 1", "2");
        let observer = mock.observer();
        let mut channel = ExternalChannelChanger::new(Box::new(mock), &script, supervisor()).unwrap();

        channel.set_channel_by_name("12").unwrap();

        assert_eq!(channel.current_channel(), "12");
        assert_eq!(observer.tuned(), vec!["12".to_string()]);
        let written = std::fs::read_to_string(&log).unwrap();
        assert_eq!(written.trim(), "12");
    }

    #[test]
    fn test_failing_command_keeps_previous_channel() {
        let mock = MockChannel::new("Tuner 1", "2");
        let mut channel = ExternalChannelChanger::new(Box::new(mock), "false", supervisor()).unwrap();

        let err = channel.set_channel_by_name("12").unwrap_err();

        assert!(matches!(err, CaptureError::ChangeCommand(_)));
        assert_eq!(channel.current_channel(), "2");
    }

    #[test]
    fn test_missing_program_is_change_error() {
        let mock = MockChannel::new("Tuner 1", "2");
        let mut channel = ExternalChannelChanger::new(
            Box::new(mock),
            "/nonexistent/tvrec-changer --fast",
            supervisor(),
        )
        .unwrap();
        let err = channel.set_channel_by_name("5").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_unbalanced_quotes_rejected() {
        let mock = MockChannel::new("Tuner 1", "2");
        let result = ExternalChannelChanger::new(Box::new(mock), "changer 'oops", supervisor());
        assert!(matches!(result, Err(CaptureError::ChangeCommand(_))));
    }
}
