//! Channel store kept in a single JSON document.
//!
//! The whole document is loaded at open and rewritten after every
//! mutation (temp file + rename). Stores built with
//! [`JsonChannelStore::in_memory`] never touch the filesystem.

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;

use tracing::debug;
use tracing::info;
use tvrec_common::mutex_lock_or_recover;

use crate::domain::ChannelInfo;
use crate::domain::DeviceConfig;
use crate::domain::InputInfo;
use crate::domain::PidCacheEntry;
use crate::domain::ProgramInfo;
use crate::domain::RecordingInfo;
use crate::domain::RecordingProfile;
use crate::usecases::ports::ChannelDatabase;
use crate::usecases::ports::DbError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordedStatus {
    Recording,
    Recorded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedRow {
    pub chanid: String,
    pub start: DateTime<Utc>,
    pub title: String,
    pub status: RecordedStatus,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub commflagged: bool,
}

/// A recording profile, optionally restricted to one card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRow {
    #[serde(default)]
    pub cardid: Option<u32>,
    #[serde(flatten)]
    pub profile: RecordingProfile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreDocument {
    pub devices: Vec<DeviceConfig>,
    pub profiles: Vec<ProfileRow>,
    pub inputs: Vec<InputInfo>,
    pub channels: Vec<ChannelInfo>,
    pub programs: Vec<ProgramInfo>,
    /// Last channel per input, keyed by card id.
    pub input_channels: BTreeMap<u32, BTreeMap<String, String>>,
    pub pid_cache: BTreeMap<String, Vec<PidCacheEntry>>,
    pub recordings: Vec<RecordedRow>,
}

pub struct JsonChannelStore {
    path: Option<PathBuf>,
    doc: Mutex<StoreDocument>,
}

impl JsonChannelStore {
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| DbError::Unavailable(format!("{}: {e}", path.display())))?;
        let doc: StoreDocument = serde_json::from_str(&raw).map_err(|e| DbError::Malformed {
            kind: "store document",
            reason: format!("{}: {e}", path.display()),
        })?;
        info!(
            path = %path.display(),
            devices = doc.devices.len(),
            channels = doc.channels.len(),
            "Loaded channel store"
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            doc: Mutex::new(doc),
        })
    }

    pub fn in_memory(doc: StoreDocument) -> Self {
        Self {
            path: None,
            doc: Mutex::new(doc),
        }
    }

    pub fn document(&self) -> StoreDocument {
        mutex_lock_or_recover(&self.doc).clone()
    }

    fn read(&self) -> MutexGuard<'_, StoreDocument> {
        mutex_lock_or_recover(&self.doc)
    }

    /// Applies `change` and writes the document back.
    fn update<F>(&self, operation: &str, change: F) -> Result<(), DbError>
    where
        F: FnOnce(&mut StoreDocument),
    {
        let mut doc = mutex_lock_or_recover(&self.doc);
        change(&mut doc);
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        persist(path, &doc).map_err(|reason| DbError::Persistence {
            operation: operation.to_string(),
            reason,
        })?;
        debug!(operation, path = %path.display(), "Persisted channel store");
        Ok(())
    }

    fn recorded_row<'a>(
        doc: &'a mut StoreDocument,
        info: &RecordingInfo,
    ) -> Option<&'a mut RecordedRow> {
        doc.recordings
            .iter_mut()
            .find(|row| row.chanid == info.chanid && row.start == info.start)
    }
}

fn persist(path: &Path, doc: &StoreDocument) -> Result<(), String> {
    let json = serde_json::to_string_pretty(doc).map_err(|e| e.to_string())?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| format!("{}: {e}", tmp.display()))?;
    fs::rename(&tmp, path).map_err(|e| format!("{}: {e}", path.display()))
}

impl ChannelDatabase for JsonChannelStore {
    fn device(&self, cardid: u32) -> Result<DeviceConfig, DbError> {
        self.read()
            .devices
            .iter()
            .find(|d| d.cardid == cardid)
            .cloned()
            .ok_or(DbError::NotFound {
                kind: "card",
                id: cardid.to_string(),
            })
    }

    fn profile(&self, cardid: u32, name: &str) -> Result<Option<RecordingProfile>, DbError> {
        let doc = self.read();
        let named = || doc.profiles.iter().filter(|row| row.profile.name == name);
        let row = named()
            .find(|row| row.cardid == Some(cardid))
            .or_else(|| named().find(|row| row.cardid.is_none()));
        Ok(row.map(|row| row.profile.clone()))
    }

    fn inputs(&self) -> Result<Vec<InputInfo>, DbError> {
        Ok(self.read().inputs.clone())
    }

    fn channels(&self) -> Result<Vec<ChannelInfo>, DbError> {
        Ok(self.read().channels.clone())
    }

    fn programs(&self, chanid: &str) -> Result<Vec<ProgramInfo>, DbError> {
        let mut programs: Vec<ProgramInfo> = self
            .read()
            .programs
            .iter()
            .filter(|p| p.chanid == chanid)
            .cloned()
            .collect();
        programs.sort_by_key(|p| p.start);
        Ok(programs)
    }

    fn set_favorite(&self, chanid: &str, favorite: bool) -> Result<(), DbError> {
        if !self.read().channels.iter().any(|c| c.chanid == chanid) {
            return Err(DbError::NotFound {
                kind: "channel",
                id: chanid.to_string(),
            });
        }
        self.update("set_favorite", |doc| {
            for channel in doc.channels.iter_mut().filter(|c| c.chanid == chanid) {
                channel.favorite = favorite;
            }
        })
    }

    fn input_channels(&self, cardid: u32) -> Result<BTreeMap<String, String>, DbError> {
        Ok(self
            .read()
            .input_channels
            .get(&cardid)
            .cloned()
            .unwrap_or_default())
    }

    fn store_input_channel(
        &self,
        cardid: u32,
        input: &str,
        channum: &str,
    ) -> Result<(), DbError> {
        self.update("store_input_channel", |doc| {
            doc.input_channels
                .entry(cardid)
                .or_default()
                .insert(input.to_string(), channum.to_string());
        })
    }

    fn cached_pids(&self, chanid: &str) -> Result<Vec<PidCacheEntry>, DbError> {
        Ok(self
            .read()
            .pid_cache
            .get(chanid)
            .cloned()
            .unwrap_or_default())
    }

    fn save_cached_pids(&self, chanid: &str, pids: &[PidCacheEntry]) -> Result<(), DbError> {
        self.update("save_cached_pids", |doc| {
            doc.pid_cache.insert(chanid.to_string(), pids.to_vec());
        })
    }

    fn recording_started(&self, info: &RecordingInfo) -> Result<(), DbError> {
        self.update("recording_started", |doc| {
            let row = RecordedRow {
                chanid: info.chanid.clone(),
                start: info.start,
                title: info.title.clone(),
                status: RecordedStatus::Recording,
                finished_at: None,
                commflagged: false,
            };
            match Self::recorded_row(doc, info) {
                Some(existing) => *existing = row,
                None => doc.recordings.push(row),
            }
        })
    }

    fn recording_finished(
        &self,
        info: &RecordingInfo,
        finished_at: DateTime<Utc>,
        premature: bool,
    ) -> Result<(), DbError> {
        let status = if premature {
            RecordedStatus::Failed
        } else {
            RecordedStatus::Recorded
        };
        self.update("recording_finished", |doc| match Self::recorded_row(doc, info) {
            Some(row) => {
                row.status = status;
                row.finished_at = Some(finished_at);
            }
            None => doc.recordings.push(RecordedRow {
                chanid: info.chanid.clone(),
                start: info.start,
                title: info.title.clone(),
                status,
                finished_at: Some(finished_at),
                commflagged: false,
            }),
        })
    }

    fn mark_commflagged(&self, info: &RecordingInfo) -> Result<(), DbError> {
        self.update("mark_commflagged", |doc| {
            if let Some(row) = Self::recorded_row(doc, info) {
                row.commflagged = true;
            }
        })
    }
}
