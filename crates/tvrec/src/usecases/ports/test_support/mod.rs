//! Collaborator doubles for coordinator tests.

mod capture;
mod collectors;
mod database;
mod sink;

pub use capture::{
    MockBackend, MockBackendObserver, MockChannel, MockChannelObserver, MockRecorder, MockRecorderObserver,
    MockSignalMonitor, MonitorObserver, RecorderBehavior,
};
pub use collectors::{FakeClock, MockEndpoint, MockJobQueue, RecordingEvents};
pub use database::MockDatabase;
pub use sink::{MockSink, MockSinkFactory};
