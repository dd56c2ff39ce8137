//! In-memory channel store.

use chrono::DateTime;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Mutex;

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

#[derive(Default)]
struct Store {
    unavailable: bool,
    devices: Vec<DeviceConfig>,
    inputs: Vec<InputInfo>,
    channels: Vec<ChannelInfo>,
    programs: Vec<ProgramInfo>,
    profiles: Vec<RecordingProfile>,
    input_channels: BTreeMap<(u32, String), String>,
    pids: BTreeMap<String, Vec<PidCacheEntry>>,
    started: Vec<RecordingInfo>,
    finished: Vec<(RecordingInfo, bool)>,
    commflagged: Vec<String>,
}

#[derive(Default)]
pub struct MockDatabase {
    store: Mutex<Store>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, device: DeviceConfig) -> Self {
        mutex_lock_or_recover(&self.store).devices.push(device);
        self
    }

    pub fn with_input(self, cardid: u32, name: &str, sourceid: u32) -> Self {
        mutex_lock_or_recover(&self.store).inputs.push(InputInfo {
            cardid,
            name: name.to_string(),
            sourceid,
            start_channel: String::new(),
        });
        self
    }

    pub fn with_channel(self, channel: ChannelInfo) -> Self {
        mutex_lock_or_recover(&self.store).channels.push(channel);
        self
    }

    pub fn with_program(self, program: ProgramInfo) -> Self {
        mutex_lock_or_recover(&self.store).programs.push(program);
        self
    }

    pub fn with_profile(self, profile: RecordingProfile) -> Self {
        mutex_lock_or_recover(&self.store).profiles.push(profile);
        self
    }

    pub fn with_cached_pids(self, chanid: &str, pids: Vec<PidCacheEntry>) -> Self {
        mutex_lock_or_recover(&self.store)
            .pids
            .insert(chanid.to_string(), pids);
        self
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        mutex_lock_or_recover(&self.store).unavailable = unavailable;
    }

    pub fn started(&self) -> Vec<RecordingInfo> {
        mutex_lock_or_recover(&self.store).started.clone()
    }

    pub fn finished(&self) -> Vec<(RecordingInfo, bool)> {
        mutex_lock_or_recover(&self.store).finished.clone()
    }

    pub fn commflagged(&self) -> Vec<String> {
        mutex_lock_or_recover(&self.store).commflagged.clone()
    }

    pub fn stored_input_channel(&self, cardid: u32, input: &str) -> Option<String> {
        mutex_lock_or_recover(&self.store)
            .input_channels
            .get(&(cardid, input.to_string()))
            .cloned()
    }

    pub fn saved_pids(&self, chanid: &str) -> Vec<PidCacheEntry> {
        mutex_lock_or_recover(&self.store)
            .pids
            .get(chanid)
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_favorite(&self, chanid: &str) -> bool {
        mutex_lock_or_recover(&self.store)
            .channels
            .iter()
            .any(|c| c.chanid == chanid && c.favorite)
    }

    fn available(&self) -> Result<std::sync::MutexGuard<'_, Store>, DbError> {
        let store = mutex_lock_or_recover(&self.store);
        if store.unavailable {
            return Err(DbError::Unavailable("mock store offline".to_string()));
        }
        Ok(store)
    }
}

impl ChannelDatabase for MockDatabase {
    fn device(&self, cardid: u32) -> Result<DeviceConfig, DbError> {
        self.available()?
            .devices
            .iter()
            .find(|d| d.cardid == cardid)
            .cloned()
            .ok_or(DbError::NotFound {
                kind: "card",
                id: cardid.to_string(),
            })
    }

    fn profile(&self, _cardid: u32, name: &str) -> Result<Option<RecordingProfile>, DbError> {
        Ok(self
            .available()?
            .profiles
            .iter()
            .find(|p| p.name == name)
            .cloned())
    }

    fn inputs(&self) -> Result<Vec<InputInfo>, DbError> {
        Ok(self.available()?.inputs.clone())
    }

    fn channels(&self) -> Result<Vec<ChannelInfo>, DbError> {
        Ok(self.available()?.channels.clone())
    }

    fn programs(&self, chanid: &str) -> Result<Vec<ProgramInfo>, DbError> {
        let store = self.available()?;
        let mut programs: Vec<ProgramInfo> = store
            .programs
            .iter()
            .filter(|p| p.chanid == chanid)
            .cloned()
            .collect();
        programs.sort_by_key(|p| p.start);
        Ok(programs)
    }

    fn set_favorite(&self, chanid: &str, favorite: bool) -> Result<(), DbError> {
        let mut store = self.available()?;
        for channel in store.channels.iter_mut().filter(|c| c.chanid == chanid) {
            channel.favorite = favorite;
        }
        Ok(())
    }

    fn input_channels(&self, cardid: u32) -> Result<BTreeMap<String, String>, DbError> {
        Ok(self
            .available()?
            .input_channels
            .iter()
            .filter(|((card, _), _)| *card == cardid)
            .map(|((_, input), channum)| (input.clone(), channum.clone()))
            .collect())
    }

    fn store_input_channel(
        &self,
        cardid: u32,
        input: &str,
        channum: &str,
    ) -> Result<(), DbError> {
        self.available()?
            .input_channels
            .insert((cardid, input.to_string()), channum.to_string());
        Ok(())
    }

    fn cached_pids(&self, chanid: &str) -> Result<Vec<PidCacheEntry>, DbError> {
        Ok(self
            .available()?
            .pids
            .get(chanid)
            .cloned()
            .unwrap_or_default())
    }

    fn save_cached_pids(&self, chanid: &str, pids: &[PidCacheEntry]) -> Result<(), DbError> {
        self.available()?
            .pids
            .insert(chanid.to_string(), pids.to_vec());
        Ok(())
    }

    fn recording_started(&self, info: &RecordingInfo) -> Result<(), DbError> {
        self.available()?.started.push(info.clone());
        Ok(())
    }

    fn recording_finished(
        &self,
        info: &RecordingInfo,
        _finished_at: DateTime<Utc>,
        premature: bool,
    ) -> Result<(), DbError> {
        self.available()?.finished.push((info.clone(), premature));
        Ok(())
    }

    fn mark_commflagged(&self, info: &RecordingInfo) -> Result<(), DbError> {
        self.available()?.commflagged.push(info.chanid.clone());
        Ok(())
    }
}
