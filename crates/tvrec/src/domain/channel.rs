use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::cmp::Ordering;

/// Relative channel change requested by a viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelDirection {
    Up,
    Down,
    Favorite,
    Same,
}

/// Program guide browsing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowseDirection {
    Same,
    Up,
    Down,
    Left,
    Right,
    Favorite,
}

impl BrowseDirection {
    /// Channel movement implied by a browse step; `None` for time moves.
    pub fn channel_direction(self) -> Option<ChannelDirection> {
        match self {
            BrowseDirection::Same => Some(ChannelDirection::Same),
            BrowseDirection::Up => Some(ChannelDirection::Up),
            BrowseDirection::Down => Some(ChannelDirection::Down),
            BrowseDirection::Favorite => Some(ChannelDirection::Favorite),
            BrowseDirection::Left | BrowseDirection::Right => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PictureAttribute {
    Contrast,
    Brightness,
    Colour,
    Hue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub chanid: String,
    pub channum: String,
    #[serde(default)]
    pub callsign: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub icon: String,
    pub sourceid: u32,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub favorite: bool,
    #[serde(default)]
    pub commfree: bool,
    #[serde(default)]
    pub output_filters: String,
    #[serde(default)]
    pub video_filters: String,
}

fn default_visible() -> bool {
    true
}

impl ChannelInfo {
    pub fn new(chanid: impl Into<String>, channum: impl Into<String>, sourceid: u32) -> Self {
        Self {
            chanid: chanid.into(),
            channum: channum.into(),
            callsign: String::new(),
            name: String::new(),
            icon: String::new(),
            sourceid,
            visible: true,
            favorite: false,
            commfree: false,
            output_filters: String::new(),
            video_filters: String::new(),
        }
    }
}

/// A physical input of a capture card and the video source behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputInfo {
    pub cardid: u32,
    pub name: String,
    pub sourceid: u32,
    /// Last channel tuned on this input.
    #[serde(default)]
    pub start_channel: String,
}

/// Guide entry or, when `title` is empty, bare channel metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgramInfo {
    pub chanid: String,
    pub channum: String,
    pub callsign: String,
    pub channame: String,
    pub icon: String,
    pub title: String,
    pub subtitle: String,
    pub description: String,
    pub category: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub seriesid: String,
    pub programid: String,
    pub output_filters: String,
}

impl ProgramInfo {
    pub fn from_channel(channel: &ChannelInfo) -> Self {
        Self {
            chanid: channel.chanid.clone(),
            channum: channel.channum.clone(),
            callsign: channel.callsign.clone(),
            channame: channel.name.clone(),
            icon: channel.icon.clone(),
            output_filters: channel.output_filters.clone(),
            ..Self::default()
        }
    }

    /// Fills the channel columns of a guide row.
    pub fn with_channel(mut self, channel: &ChannelInfo) -> Self {
        self.chanid = channel.chanid.clone();
        self.channum = channel.channum.clone();
        self.callsign = channel.callsign.clone();
        self.channame = channel.name.clone();
        self.icon = channel.icon.clone();
        self.output_filters = channel.output_filters.clone();
        self
    }

    pub fn airs_at(&self, at: DateTime<Utc>) -> bool {
        match (self.start, self.end) {
            (Some(start), Some(end)) => start <= at && at < end,
            _ => false,
        }
    }
}

/// Digital stream table id cached per channel between tunings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PidCacheEntry {
    pub pid: u16,
    pub table_id: u8,
}

/// Channel browsing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrdering {
    /// `channum + 0`: numeric value of the channel number.
    Numeric,
    /// `channum`: lexical channel number.
    Channum,
    Callsign,
    ChanId,
}

impl ChannelOrdering {
    /// Parses the stored ordering expression. Unknown expressions fall back
    /// to numeric ordering.
    pub fn parse(expr: &str) -> Self {
        let compact: String = expr
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        match compact.as_str() {
            "channum" => ChannelOrdering::Channum,
            "callsign" => ChannelOrdering::Callsign,
            "chanid" => ChannelOrdering::ChanId,
            _ => ChannelOrdering::Numeric,
        }
    }

    pub fn compare(self, a: &ChannelInfo, b: &ChannelInfo) -> Ordering {
        match self {
            ChannelOrdering::Numeric => leading_number(&a.channum)
                .cmp(&leading_number(&b.channum))
                .then_with(|| a.channum.cmp(&b.channum)),
            ChannelOrdering::Channum => a.channum.cmp(&b.channum),
            ChannelOrdering::Callsign => a
                .callsign
                .cmp(&b.callsign)
                .then_with(|| a.channum.cmp(&b.channum)),
            ChannelOrdering::ChanId => leading_number(&a.chanid)
                .cmp(&leading_number(&b.chanid))
                .then_with(|| a.chanid.cmp(&b.chanid)),
        }
    }
}

/// Numeric prefix of a channel number, 0 when there is none.
fn leading_number(value: &str) -> i64 {
    let digits: String = value
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}
