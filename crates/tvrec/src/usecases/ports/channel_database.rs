use chrono::DateTime;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::ChannelInfo;
use crate::domain::DeviceConfig;
use crate::domain::InputInfo;
use crate::domain::Lineup;
use crate::domain::PidCacheEntry;
use crate::domain::ProgramInfo;
use crate::domain::RecordingInfo;
use crate::domain::RecordingProfile;
use crate::usecases::ports::errors::DbError;

/// Persistent configuration and bookkeeping store.
pub trait ChannelDatabase: Send + Sync {
    fn device(&self, cardid: u32) -> Result<DeviceConfig, DbError>;
    fn profile(&self, cardid: u32, name: &str) -> Result<Option<RecordingProfile>, DbError>;

    /// Inputs of every card.
    fn inputs(&self) -> Result<Vec<InputInfo>, DbError>;
    fn channels(&self) -> Result<Vec<ChannelInfo>, DbError>;
    /// Guide rows of a channel ordered by start time.
    fn programs(&self, chanid: &str) -> Result<Vec<ProgramInfo>, DbError>;

    fn set_favorite(&self, chanid: &str, favorite: bool) -> Result<(), DbError>;

    fn input_channels(&self, cardid: u32) -> Result<BTreeMap<String, String>, DbError>;
    fn store_input_channel(&self, cardid: u32, input: &str, channum: &str)
    -> Result<(), DbError>;

    fn cached_pids(&self, chanid: &str) -> Result<Vec<PidCacheEntry>, DbError>;
    fn save_cached_pids(&self, chanid: &str, pids: &[PidCacheEntry]) -> Result<(), DbError>;

    fn recording_started(&self, info: &RecordingInfo) -> Result<(), DbError>;
    fn recording_finished(
        &self,
        info: &RecordingInfo,
        finished_at: DateTime<Utc>,
        premature: bool,
    ) -> Result<(), DbError>;
    fn mark_commflagged(&self, info: &RecordingInfo) -> Result<(), DbError>;

    fn lineup(&self) -> Result<Lineup, DbError> {
        Ok(Lineup::new(self.inputs()?, self.channels()?))
    }
}

pub type ChannelDatabaseHandle = Arc<dyn ChannelDatabase>;
