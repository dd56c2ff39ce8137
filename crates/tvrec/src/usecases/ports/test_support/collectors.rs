//! Recording doubles for events, jobs, data endpoints and time.

use chrono::DateTime;
use chrono::Utc;
use std::io;
use std::sync::Condvar;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use tvrec_common::condvar_wait_timeout_or_recover;
use tvrec_common::mutex_lock_or_recover;

use crate::domain::JobRequest;
use crate::domain::RecorderEvent;
use crate::usecases::ports::Clock;
use crate::usecases::ports::DataEndpoint;
use crate::usecases::ports::EventDispatcher;
use crate::usecases::ports::JobQueue;

#[derive(Default)]
pub struct RecordingEvents {
    events: Mutex<Vec<RecorderEvent>>,
    cond: Condvar,
}

impl RecordingEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecorderEvent> {
        mutex_lock_or_recover(&self.events).clone()
    }

    pub fn count(&self, matches: impl Fn(&RecorderEvent) -> bool) -> usize {
        mutex_lock_or_recover(&self.events)
            .iter()
            .filter(|e| matches(e))
            .count()
    }

    /// Waits until `matches` holds for at least `count` events.
    pub fn wait_for(
        &self,
        count: usize,
        timeout: Duration,
        matches: impl Fn(&RecorderEvent) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut events = mutex_lock_or_recover(&self.events);
        loop {
            if events.iter().filter(|e| matches(e)).count() >= count {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            events = condvar_wait_timeout_or_recover(&self.cond, events, deadline - now).0;
        }
    }
}

impl EventDispatcher for RecordingEvents {
    fn dispatch(&self, event: RecorderEvent) {
        mutex_lock_or_recover(&self.events).push(event);
        self.cond.notify_all();
    }
}

#[derive(Default)]
pub struct MockJobQueue {
    requests: Mutex<Vec<JobRequest>>,
}

impl MockJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<JobRequest> {
        mutex_lock_or_recover(&self.requests).clone()
    }
}

impl JobQueue for MockJobQueue {
    fn queue_jobs(&self, request: &JobRequest) -> bool {
        mutex_lock_or_recover(&self.requests).push(request.clone());
        true
    }
}

#[derive(Default)]
pub struct MockEndpoint {
    blocks: Mutex<Vec<Vec<u8>>>,
    fail: Mutex<bool>,
}

impl MockEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            blocks: Mutex::new(Vec::new()),
            fail: Mutex::new(true),
        }
    }

    pub fn block_sizes(&self) -> Vec<usize> {
        mutex_lock_or_recover(&self.blocks)
            .iter()
            .map(Vec::len)
            .collect()
    }

    pub fn bytes(&self) -> Vec<u8> {
        mutex_lock_or_recover(&self.blocks).concat()
    }
}

impl DataEndpoint for MockEndpoint {
    fn write_block(&self, data: &[u8]) -> io::Result<()> {
        if *mutex_lock_or_recover(&self.fail) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "viewer gone"));
        }
        mutex_lock_or_recover(&self.blocks).push(data.to_vec());
        Ok(())
    }
}

/// Settable wall clock.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
}

impl FakeClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *mutex_lock_or_recover(&self.now) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = mutex_lock_or_recover(&self.now);
        *now += by;
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *mutex_lock_or_recover(&self.now)
    }
}
