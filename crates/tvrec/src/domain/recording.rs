use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;

use crate::domain::channel::ChannelInfo;
use crate::domain::jobs::JobMask;

/// A scheduled program as handed over by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingInfo {
    pub chanid: String,
    /// Channel number.
    #[serde(default)]
    pub chanstr: String,
    #[serde(default)]
    pub chansign: String,
    #[serde(default)]
    pub channame: String,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub sourceid: u32,
    #[serde(default)]
    pub cardid: u32,
    /// Recording start, also the timestamp in the file name.
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub auto_run_jobs: JobMask,
    #[serde(default)]
    pub chan_commfree: bool,
}

impl RecordingInfo {
    pub fn new(
        chanid: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            chanid: chanid.into(),
            chanstr: String::new(),
            chansign: String::new(),
            channame: String::new(),
            title: title.into(),
            subtitle: String::new(),
            description: String::new(),
            category: String::new(),
            sourceid: 0,
            cardid: 0,
            start,
            end,
            profile: String::new(),
            auto_run_jobs: JobMask::NONE,
            chan_commfree: false,
        }
    }

    /// Descriptor for a live-view buffer on `channel`.
    pub fn live(cardid: u32, channel: Option<&ChannelInfo>, channum: &str, now: DateTime<Utc>) -> Self {
        let mut info = Self::new(
            channel.map(|c| c.chanid.clone()).unwrap_or_default(),
            "",
            now,
            now,
        );
        info.cardid = cardid;
        info.chanstr = channum.to_string();
        if let Some(channel) = channel {
            info.chansign = channel.callsign.clone();
            info.channame = channel.name.clone();
            info.sourceid = channel.sourceid;
            info.chan_commfree = channel.commfree;
        }
        info
    }

    /// `<prefix>/<chanid>_<YYYYmmddHHMMSS>.nuv`
    pub fn record_filename(&self, prefix: &Path) -> PathBuf {
        prefix.join(format!(
            "{}_{}.nuv",
            self.chanid,
            self.start.format("%Y%m%d%H%M%S")
        ))
    }

    /// Overrun budget: category minutes when the category matches, the
    /// normal seconds otherwise.
    pub fn overrun_secs(
        &self,
        overtime_category: &str,
        category_overtime_mins: i64,
        record_overtime_secs: i64,
    ) -> i64 {
        if !overtime_category.is_empty() && self.category == overtime_category {
            category_overtime_mins * 60
        } else {
            record_overtime_secs
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingKind {
    Live,
    Scheduled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> RecordingInfo {
        let start = Utc.with_ymd_and_hms(2024, 3, 9, 21, 5, 7).unwrap();
        RecordingInfo::new("1021", "News", start, start + chrono::Duration::hours(1))
    }

    #[test]
    fn test_record_filename_format() {
        let path = sample().record_filename(Path::new("/srv/recordings"));
        assert_eq!(path, PathBuf::from("/srv/recordings/1021_20240309210507.nuv"));
    }

    #[test]
    fn test_overrun_uses_category_minutes_on_match() {
        let mut info = sample();
        info.category = "Sports".to_string();
        assert_eq!(info.overrun_secs("Sports", 30, 60), 1800);
        assert_eq!(info.overrun_secs("Movies", 30, 60), 60);
    }

    #[test]
    fn test_overrun_empty_category_never_matches() {
        let info = sample();
        assert_eq!(info.overrun_secs("", 30, 45), 45);
    }

    #[test]
    fn test_live_descriptor_copies_channel() {
        let mut channel = ChannelInfo::new("1003", "3", 2);
        channel.callsign = "WXYZ".to_string();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let info = RecordingInfo::live(4, Some(&channel), "3", now);
        assert_eq!(info.chanid, "1003");
        assert_eq!(info.chansign, "WXYZ");
        assert_eq!(info.cardid, 4);
        assert_eq!(info.sourceid, 2);
    }
}
