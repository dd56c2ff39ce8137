use serde::Deserialize;
use serde::Serialize;
use std::fmt;

/// Operating mode of a capture device.
///
/// `ChangingState` is never stored; it is reported while a transition is
/// in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TvState {
    None,
    #[serde(rename = "WatchingLiveTV")]
    WatchingLiveTv,
    RecordingOnly,
    ChangingState,
    Error,
}

impl TvState {
    pub fn as_str(self) -> &'static str {
        match self {
            TvState::None => "None",
            TvState::WatchingLiveTv => "WatchingLiveTV",
            TvState::RecordingOnly => "RecordingOnly",
            TvState::ChangingState => "ChangingState",
            TvState::Error => "Error",
        }
    }

    /// States that own a running recorder.
    pub fn has_recorder(self) -> bool {
        matches!(self, TvState::WatchingLiveTv | TvState::RecordingOnly)
    }
}

impl fmt::Display for TvState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of asking a device to take a scheduled recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartRecordingResult {
    /// The transition to `RecordingOnly` was requested.
    Started,
    /// The device is in use and nobody declined the takeover.
    Busy,
    /// The frontend cancelled the upcoming recording.
    Refused,
}

impl StartRecordingResult {
    /// Legacy integer form: 1 started, -1 busy, 0 refused.
    pub fn code(self) -> i32 {
        match self {
            StartRecordingResult::Started => 1,
            StartRecordingResult::Busy => -1,
            StartRecordingResult::Refused => 0,
        }
    }
}
