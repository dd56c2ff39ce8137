use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to open {device}: {reason}")]
    Open { device: String, reason: String },
    #[error("Failed to tune channel {channel}: {reason}")]
    Tune { channel: String, reason: String },
    #[error("Unknown input: {0}")]
    UnknownInput(String),
    #[error("Recorder setup failed: {0}")]
    RecorderSetup(String),
    #[error("Channel change command failed: {0}")]
    ChangeCommand(String),
    #[error("Capture I/O error: {0}")]
    Io(#[from] io::Error),
}

impl CaptureError {
    pub fn operation(&self) -> &'static str {
        match self {
            CaptureError::Open { .. } => "open",
            CaptureError::Tune { .. } | CaptureError::ChangeCommand(_) => "tune",
            CaptureError::UnknownInput(_) => "switch_input",
            CaptureError::RecorderSetup(_) => "recorder_setup",
            CaptureError::Io(_) => "io",
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            CaptureError::Open { device, .. } => {
                format!("Check that {device} exists and is not held by another process.")
            }
            CaptureError::Tune { .. } | CaptureError::ChangeCommand(_) => {
                "Check the channel lineup and the external channel change command.".to_string()
            }
            CaptureError::UnknownInput(_) => {
                "Check the inputs configured for this card.".to_string()
            }
            CaptureError::RecorderSetup(_) => {
                "Check the recording profile and device options.".to_string()
            }
            CaptureError::Io(_) => "Check device permissions and free disk space.".to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CaptureError::Tune { .. } | CaptureError::ChangeCommand(_) | CaptureError::Io(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Channel store unavailable: {0}")]
    Unavailable(String),
    #[error("No {kind} with id {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("Malformed {kind} record: {reason}")]
    Malformed { kind: &'static str, reason: String },
    #[error("Failed to persist {operation}: {reason}")]
    Persistence { operation: String, reason: String },
}

impl DbError {
    pub fn suggestion(&self) -> String {
        match self {
            DbError::Unavailable(_) => "Check that the channel store is reachable.".to_string(),
            DbError::NotFound { kind, .. } => format!("Add the missing {kind} to the store."),
            DbError::Malformed { kind, .. } => format!("Fix the {kind} record in the store."),
            DbError::Persistence { .. } => {
                "Check that the store file is writable.".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Unavailable(_) | DbError::Persistence { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_error_retryable() {
        let tune = CaptureError::Tune {
            channel: "5".into(),
            reason: "no lock".into(),
        };
        assert!(tune.is_retryable());
        assert_eq!(tune.operation(), "tune");
        let setup = CaptureError::RecorderSetup("bad profile".into());
        assert!(!setup.is_retryable());
    }

    #[test]
    fn test_capture_error_suggestion_names_device() {
        let err = CaptureError::Open {
            device: "/dev/dvb/adapter0".into(),
            reason: "busy".into(),
        };
        assert!(err.suggestion().contains("/dev/dvb/adapter0"));
        assert_eq!(err.to_string(), "Failed to open /dev/dvb/adapter0: busy");
    }

    #[test]
    fn test_db_error_display() {
        let err = DbError::NotFound {
            kind: "card",
            id: "3".into(),
        };
        assert_eq!(err.to_string(), "No card with id 3");
        assert!(!err.is_retryable());
        assert!(DbError::Unavailable("down".into()).is_retryable());
    }
}
