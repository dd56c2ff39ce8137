use chrono::DateTime;
use chrono::Utc;
use std::sync::Arc;

/// Wall clock used for schedule arithmetic.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub type ClockHandle = Arc<dyn Clock>;
