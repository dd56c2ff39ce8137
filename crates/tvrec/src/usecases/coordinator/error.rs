use std::io;
use thiserror::Error;

use crate::domain::CardType;
use crate::usecases::ports::CaptureError;
use crate::usecases::ports::DbError;

/// Reasons a capture device cannot be brought up.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Card {cardid}: failed to load device configuration: {source}")]
    DeviceLookup {
        cardid: u32,
        #[source]
        source: DbError,
    },
    #[error("Card {cardid}: unknown card type '{card_type}'")]
    UnknownCardType { cardid: u32, card_type: String },
    #[error("Card {cardid}: no {card_type} support in this build")]
    BackendUnavailable { cardid: u32, card_type: CardType },
    #[error("Card {cardid}: failed to set up channel: {source}")]
    Channel {
        cardid: u32,
        #[source]
        source: CaptureError,
    },
    #[error("Card {cardid}: failed to start event loop: {source}")]
    EventLoop {
        cardid: u32,
        #[source]
        source: io::Error,
    },
}

impl CoordinatorError {
    pub fn code(&self) -> &'static str {
        match self {
            CoordinatorError::DeviceLookup { .. } => "device_lookup",
            CoordinatorError::UnknownCardType { .. } => "unknown_card_type",
            CoordinatorError::BackendUnavailable { .. } => "backend_unavailable",
            CoordinatorError::Channel { .. } => "channel",
            CoordinatorError::EventLoop { .. } => "event_loop",
        }
    }

    pub fn cardid(&self) -> u32 {
        match self {
            CoordinatorError::DeviceLookup { cardid, .. }
            | CoordinatorError::UnknownCardType { cardid, .. }
            | CoordinatorError::BackendUnavailable { cardid, .. }
            | CoordinatorError::Channel { cardid, .. }
            | CoordinatorError::EventLoop { cardid, .. } => *cardid,
        }
    }

    pub fn suggestion(&self) -> String {
        match self {
            CoordinatorError::DeviceLookup { source, .. } => source.suggestion(),
            CoordinatorError::UnknownCardType { .. } => {
                "Use one of MPEG, HDTV, FIREWIRE, DVB or V4L as card type.".to_string()
            }
            CoordinatorError::BackendUnavailable { card_type, .. } => {
                format!("Configure the card with a type this build supports instead of {card_type}.")
            }
            CoordinatorError::Channel { source, .. } => source.suggestion(),
            CoordinatorError::EventLoop { .. } => {
                "Check process thread limits (ulimit -u).".to_string()
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            CoordinatorError::DeviceLookup { source, .. } => source.is_retryable(),
            CoordinatorError::Channel { source, .. } => source.is_retryable(),
            CoordinatorError::EventLoop { .. } => true,
            CoordinatorError::UnknownCardType { .. }
            | CoordinatorError::BackendUnavailable { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_retry() {
        let err = CoordinatorError::UnknownCardType {
            cardid: 2,
            card_type: "ANALOG".into(),
        };
        assert_eq!(err.code(), "unknown_card_type");
        assert_eq!(err.cardid(), 2);
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Card 2: unknown card type 'ANALOG'");

        let lookup = CoordinatorError::DeviceLookup {
            cardid: 1,
            source: DbError::Unavailable("down".into()),
        };
        assert!(lookup.is_retryable());
    }

    #[test]
    fn test_backend_suggestion_names_card_type() {
        let err = CoordinatorError::BackendUnavailable {
            cardid: 1,
            card_type: CardType::Firewire,
        };
        assert!(err.suggestion().contains("FIREWIRE"));
    }
}
