pub mod capture;
pub mod channel_database;
pub mod clock;
pub mod data_endpoint;
pub mod errors;
pub mod events;
pub mod job_queue;
pub mod signal_monitor;
pub mod sink;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use capture::{
    CaptureBackend, CaptureBackendHandle, CaptureBackends, CaptureChannel, CaptureChannelBox,
    CaptureRecorder, CaptureRecorderHandle, RecorderSetup, RecorderStart,
};
pub use channel_database::{ChannelDatabase, ChannelDatabaseHandle};
pub use clock::{Clock, ClockHandle, SystemClock};
pub use data_endpoint::{DataEndpoint, DataEndpointHandle};
pub use errors::{CaptureError, DbError};
pub use events::{EventDispatcher, EventDispatcherHandle, NoopEventDispatcher};
pub use job_queue::{JobQueue, JobQueueHandle, NoopJobQueue};
pub use signal_monitor::SignalMonitor;
pub use sink::{RecordingSink, RecordingSinkHandle, SinkFactory, SinkFactoryHandle};
