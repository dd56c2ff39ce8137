use serde::Serialize;

/// Tuner status carried by a `SIGNAL` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalStatus {
    Lock { locked: bool },
    Measured { locked: bool, strength: i32, signal_to_noise: i32 },
    NoChannel,
}

/// Notifications a coordinator sends to the frontends and scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecorderEvent {
    RecordingListChange,
    AskRecording {
        cardid: u32,
        seconds_until_start: i64,
        title: String,
        chanstr: String,
        chansign: String,
        channame: String,
    },
    #[serde(rename = "QUIT_LIVETV")]
    QuitLiveTv { cardid: u32 },
    DoneRecording { cardid: u32, length_secs: i64 },
    Signal { cardid: u32, status: SignalStatus },
}

impl RecorderEvent {
    /// Message line used on the frontend event channel.
    pub fn message(&self) -> String {
        match self {
            RecorderEvent::RecordingListChange => "RECORDING_LIST_CHANGE".to_string(),
            RecorderEvent::AskRecording {
                cardid,
                seconds_until_start,
                ..
            } => format!("ASK_RECORDING {cardid} {seconds_until_start}"),
            RecorderEvent::QuitLiveTv { cardid } => format!("QUIT_LIVETV {cardid}"),
            RecorderEvent::DoneRecording {
                cardid,
                length_secs,
            } => format!("DONE_RECORDING {cardid} {length_secs}"),
            RecorderEvent::Signal { cardid, .. } => format!("SIGNAL {cardid}"),
        }
    }

    pub fn cardid(&self) -> Option<u32> {
        match self {
            RecorderEvent::RecordingListChange => None,
            RecorderEvent::AskRecording { cardid, .. }
            | RecorderEvent::QuitLiveTv { cardid }
            | RecorderEvent::DoneRecording { cardid, .. }
            | RecorderEvent::Signal { cardid, .. } => Some(*cardid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_lines() {
        assert_eq!(
            RecorderEvent::QuitLiveTv { cardid: 3 }.message(),
            "QUIT_LIVETV 3"
        );
        assert_eq!(
            RecorderEvent::DoneRecording {
                cardid: 2,
                length_secs: -1
            }
            .message(),
            "DONE_RECORDING 2 -1"
        );
        assert_eq!(
            RecorderEvent::RecordingListChange.message(),
            "RECORDING_LIST_CHANGE"
        );
    }

    #[test]
    fn test_json_shape() {
        let event = RecorderEvent::Signal {
            cardid: 1,
            status: SignalStatus::NoChannel,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "SIGNAL");
        assert_eq!(json["status"]["kind"], "no_channel");

        let quit = serde_json::to_value(RecorderEvent::QuitLiveTv { cardid: 7 }).unwrap();
        assert_eq!(quit["event"], "QUIT_LIVETV");
        assert_eq!(quit["cardid"], 7);
    }
}
