//! Fan-out of coordinator events to in-process subscribers.

use crossbeam_channel as channel;
use std::sync::Mutex;

use tracing::debug;
use tracing::info;
use tvrec_common::mutex_lock_or_recover;

use crate::domain::RecorderEvent;
use crate::usecases::ports::EventDispatcher;

/// Delivers every dispatched event to all live subscribers. Dispatch never
/// blocks; subscribers whose receiver was dropped are pruned on the next
/// event.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<channel::Sender<RecorderEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> channel::Receiver<RecorderEvent> {
        let (tx, rx) = channel::unbounded();
        mutex_lock_or_recover(&self.subscribers).push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        mutex_lock_or_recover(&self.subscribers).len()
    }
}

impl EventDispatcher for EventBus {
    fn dispatch(&self, event: RecorderEvent) {
        match &event {
            RecorderEvent::Signal { .. } => debug!(message = %event.message(), "Event"),
            _ => info!(message = %event.message(), "Event"),
        }
        let mut subscribers = mutex_lock_or_recover(&self.subscribers);
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
    }
}
