pub mod channel_changer;
pub mod coordinator;
pub mod ports;

pub use coordinator::{CoordinatorDeps, CoordinatorError, RecordingCoordinator};
