use std::sync::Arc;

use crate::domain::JobRequest;

pub trait JobQueue: Send + Sync {
    /// Returns false when the jobs could not be queued.
    fn queue_jobs(&self, request: &JobRequest) -> bool;
}

#[derive(Default)]
pub struct NoopJobQueue;

impl JobQueue for NoopJobQueue {
    fn queue_jobs(&self, _request: &JobRequest) -> bool {
        true
    }
}

pub type JobQueueHandle = Arc<dyn JobQueue>;
