use thiserror::Error;

use crate::domain::StartRecordingResult;
use crate::domain::TvState;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Signal handler setup failed: {0}")]
    SignalSetup(String),

    #[error("Channel {0} is not in the channel store")]
    UnknownChannel(String),

    #[error("Card {cardid} did not take the recording ({result:?})")]
    RecordingRejected {
        cardid: u32,
        result: StartRecordingResult,
    },

    #[error("Card {cardid} did not reach {wanted} (now {actual})")]
    StateNotReached {
        cardid: u32,
        wanted: TvState,
        actual: TvState,
    },

    #[error("Card {0} could not set up a ring buffer")]
    RingBuffer(u32),
}

impl AppError {
    pub fn suggestion(&self) -> String {
        match self {
            AppError::SignalSetup(_) => "Retry; signal handling is set up once per run.".to_string(),
            AppError::UnknownChannel(_) => {
                "Check the chanid against the channels of the store.".to_string()
            }
            AppError::RecordingRejected { .. } => {
                "Stop live viewing or the running recording on this card first.".to_string()
            }
            AppError::StateNotReached { .. } => {
                "Run with --verbose to see why the transition was unwound.".to_string()
            }
            AppError::RingBuffer(_) => {
                "Check that the live buffer directory is writable.".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::RecordingRejected { .. } | AppError::StateNotReached { .. }
        )
    }
}
