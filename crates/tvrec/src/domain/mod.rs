//! Domain layer: value types and business rules of a capture device.

mod card;
mod channel;
mod events;
mod jobs;
mod lineup;
mod options;
mod recording;
mod sink;
mod state;

pub use card::{CardType, DeviceConfig, DvbOptions, FirewireOptions, UnknownCardType};
pub use channel::{
    BrowseDirection, ChannelDirection, ChannelInfo, ChannelOrdering, InputInfo, PictureAttribute,
    PidCacheEntry, ProgramInfo,
};
pub use events::{RecorderEvent, SignalStatus};
pub use jobs::{JobMask, JobRequest};
pub use lineup::Lineup;
pub use options::{DEFAULT_PROFILE, LIVE_TV_PROFILE, OptionValue, RecorderOptions, RecordingProfile};
pub use recording::{RecordingInfo, RecordingKind};
pub use sink::{RingBufferInfo, Whence};
pub use state::{StartRecordingResult, TvState};
