use std::sync::Arc;

use crate::domain::RecorderEvent;

/// Outbound notification channel.
///
/// Called with the coordinator lock held; implementations must not call
/// back into the coordinator synchronously.
pub trait EventDispatcher: Send + Sync {
    fn dispatch(&self, event: RecorderEvent);
}

#[derive(Default)]
pub struct NoopEventDispatcher;

impl EventDispatcher for NoopEventDispatcher {
    fn dispatch(&self, _event: RecorderEvent) {}
}

pub type EventDispatcherHandle = Arc<dyn EventDispatcher>;
