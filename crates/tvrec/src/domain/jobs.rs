use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::fmt;
use std::ops::BitOr;

/// Post-processing jobs requested for a recording.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobMask(u32);

impl JobMask {
    pub const NONE: Self = Self(0);
    pub const TRANSCODE: Self = Self(0x0001);
    pub const COMMFLAG: Self = Self(0x0002);
    pub const USERJOB1: Self = Self(0x0100);
    pub const USERJOB2: Self = Self(0x0200);
    pub const USERJOB3: Self = Self(0x0400);
    pub const USERJOB4: Self = Self(0x0800);

    const NAMED: [(Self, &'static str); 6] = [
        (Self::TRANSCODE, "TRANSCODE"),
        (Self::COMMFLAG, "COMMFLAG"),
        (Self::USERJOB1, "USERJOB1"),
        (Self::USERJOB2, "USERJOB2"),
        (Self::USERJOB3, "USERJOB3"),
        (Self::USERJOB4, "USERJOB4"),
    ];

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Single-job masks contained in `self`, in queueing order.
    pub fn jobs(self) -> impl Iterator<Item = (Self, &'static str)> {
        Self::NAMED
            .into_iter()
            .filter(move |(job, _)| self.contains(*job))
    }
}

impl BitOr for JobMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for JobMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("JobMask(NONE)");
        }
        let names: Vec<&str> = self.jobs().map(|(_, name)| name).collect();
        write!(f, "JobMask({})", names.join(" | "))
    }
}

/// Work handed to the job queue for one recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub jobs: JobMask,
    pub chanid: String,
    pub start: DateTime<Utc>,
    /// Host the jobs are pinned to, if any.
    pub host: Option<String>,
    /// The recording is still being written.
    pub live_recording: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_remove_contains() {
        let mut mask = JobMask::TRANSCODE | JobMask::COMMFLAG;
        assert!(mask.contains(JobMask::COMMFLAG));
        mask.remove(JobMask::COMMFLAG);
        assert!(!mask.contains(JobMask::COMMFLAG));
        assert!(mask.contains(JobMask::TRANSCODE));
        mask.insert(JobMask::USERJOB2);
        assert_eq!(mask.bits(), 0x0201);
    }

    #[test]
    fn test_none_is_never_contained() {
        assert!(!JobMask::TRANSCODE.contains(JobMask::NONE));
        assert!(JobMask::NONE.is_empty());
    }

    #[test]
    fn test_jobs_iterates_in_order() {
        let mask = JobMask::USERJOB1 | JobMask::COMMFLAG;
        let names: Vec<_> = mask.jobs().map(|(_, name)| name).collect();
        assert_eq!(names, vec!["COMMFLAG", "USERJOB1"]);
        assert_eq!(format!("{mask:?}"), "JobMask(COMMFLAG | USERJOB1)");
    }

    #[test]
    fn test_serializes_as_bits() {
        let mask: JobMask = serde_json::from_str("3").unwrap();
        assert_eq!(mask, JobMask::TRANSCODE | JobMask::COMMFLAG);
    }
}
