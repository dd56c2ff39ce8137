//! Infrastructure adapters behind the collaborator ports.

pub mod event_bus;
pub mod file_recorder;
pub mod file_sink;
pub mod job_runner;
pub mod json_store;

pub use event_bus::EventBus;
pub use file_recorder::{FileInputBackend, FileInputRecorder, SoftwareChannel};
pub use file_sink::{FileSink, FileSinkFactory};
pub use job_runner::CommandJobQueue;
pub use json_store::{JsonChannelStore, StoreDocument};
