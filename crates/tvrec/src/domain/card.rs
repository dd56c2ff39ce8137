use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Capture backend families. Resolved once from the device row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardType {
    Mpeg,
    Hdtv,
    Firewire,
    Dvb,
    V4l,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown card type '{0}'")]
pub struct UnknownCardType(pub String);

impl CardType {
    pub fn as_str(self) -> &'static str {
        match self {
            CardType::Mpeg => "MPEG",
            CardType::Hdtv => "HDTV",
            CardType::Firewire => "FIREWIRE",
            CardType::Dvb => "DVB",
            CardType::V4l => "V4L",
        }
    }

    /// Upper bound of the stream bitrate in bits per second.
    pub fn max_bitrate(self) -> i64 {
        match self {
            CardType::Mpeg | CardType::V4l => 10_080_000,
            CardType::Hdtv | CardType::Firewire | CardType::Dvb => 19_400_000,
        }
    }

    pub fn supports_signal_monitor(self) -> bool {
        matches!(self, CardType::Dvb | CardType::Hdtv)
    }
}

impl FromStr for CardType {
    type Err = UnknownCardType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MPEG" => Ok(CardType::Mpeg),
            "HDTV" => Ok(CardType::Hdtv),
            "FIREWIRE" => Ok(CardType::Firewire),
            "DVB" => Ok(CardType::Dvb),
            "V4L" => Ok(CardType::V4l),
            _ => Err(UnknownCardType(s.to_string())),
        }
    }
}

impl fmt::Display for CardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DvbOptions {
    pub dvb_on_demand: bool,
    pub hw_decoder: bool,
    pub recordts: bool,
    pub wait_for_seqstart: bool,
    pub dmx_buf_size: i64,
    pub pkt_buf_size: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FirewireOptions {
    pub port: i64,
    pub node: i64,
    pub speed: i64,
    pub model: String,
    pub connection: i64,
}

/// One capture card row as stored by the channel database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub cardid: u32,
    /// Raw card type; parsed into [`CardType`] when the coordinator starts.
    pub card_type: String,
    #[serde(default)]
    pub video_device: String,
    #[serde(default)]
    pub audio_device: String,
    #[serde(default)]
    pub vbi_device: String,
    #[serde(default)]
    pub audio_sample_rate: i64,
    #[serde(default)]
    pub skip_bt_audio: bool,
    #[serde(default)]
    pub default_input: String,
    #[serde(default)]
    pub start_channel: String,
    #[serde(default)]
    pub dvb: DvbOptions,
    #[serde(default)]
    pub firewire: FirewireOptions,
    #[serde(default)]
    pub channel_change_command: Option<String>,
}

impl DeviceConfig {
    pub fn new(cardid: u32, card_type: impl Into<String>) -> Self {
        Self {
            cardid,
            card_type: card_type.into(),
            video_device: String::new(),
            audio_device: String::new(),
            vbi_device: String::new(),
            audio_sample_rate: 0,
            skip_bt_audio: false,
            default_input: String::new(),
            start_channel: String::new(),
            dvb: DvbOptions::default(),
            firewire: FirewireOptions::default(),
            channel_change_command: None,
        }
    }

    /// MPEG "cards" that read from a file have no tuner to drive.
    pub fn is_file_input(&self) -> bool {
        self.card_type.eq_ignore_ascii_case("MPEG")
            && self.video_device.to_ascii_lowercase().starts_with("file:")
    }

    /// Path behind a `file:` video device.
    pub fn file_input_path(&self) -> Option<&str> {
        let prefix = self.video_device.get(..5)?;
        if !prefix.eq_ignore_ascii_case("file:") {
            return None;
        }
        self.video_device.get(5..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_type_parses_case_insensitive() {
        assert_eq!("dvb".parse::<CardType>().unwrap(), CardType::Dvb);
        assert_eq!(" HDTV ".parse::<CardType>().unwrap(), CardType::Hdtv);
        assert_eq!("v4l".parse::<CardType>().unwrap(), CardType::V4l);
        assert_eq!(
            "ANALOG".parse::<CardType>(),
            Err(UnknownCardType("ANALOG".to_string()))
        );
    }

    #[test]
    fn test_max_bitrate_by_card_type() {
        assert_eq!(CardType::Mpeg.max_bitrate(), 10_080_000);
        assert_eq!(CardType::V4l.max_bitrate(), 10_080_000);
        assert_eq!(CardType::Hdtv.max_bitrate(), 19_400_000);
        assert_eq!(CardType::Firewire.max_bitrate(), 19_400_000);
        assert_eq!(CardType::Dvb.max_bitrate(), 19_400_000);
    }

    #[test]
    fn test_signal_monitor_support() {
        assert!(CardType::Dvb.supports_signal_monitor());
        assert!(CardType::Hdtv.supports_signal_monitor());
        assert!(!CardType::V4l.supports_signal_monitor());
        assert!(!CardType::Mpeg.supports_signal_monitor());
    }

    #[test]
    fn test_file_input_detection() {
        let mut device = DeviceConfig::new(1, "mpeg");
        device.video_device = "FILE:/tmp/sample.ts".to_string();
        assert!(device.is_file_input());
        assert_eq!(device.file_input_path(), Some("/tmp/sample.ts"));

        device.video_device = "/dev/video0".to_string();
        assert!(!device.is_file_input());
        assert_eq!(device.file_input_path(), None);

        let mut dvb = DeviceConfig::new(2, "DVB");
        dvb.video_device = "file:/tmp/x".to_string();
        assert!(!dvb.is_file_input());
    }

    #[test]
    fn test_device_row_defaults() {
        let device: DeviceConfig =
            serde_json::from_str(r#"{"cardid": 4, "card_type": "DVB"}"#).unwrap();
        assert_eq!(device.cardid, 4);
        assert!(!device.dvb.dvb_on_demand);
        assert!(device.channel_change_command.is_none());
    }
}
