use crate::domain::PidCacheEntry;

/// Background watcher reporting tuner lock and strength.
pub trait SignalMonitor: Send {
    fn start(&mut self);
    fn stop(&mut self);

    /// Polling period in milliseconds.
    fn update_rate(&self) -> i32;
    fn set_update_rate(&mut self, rate_ms: i32);

    fn notify_frontend(&self) -> bool;
    fn set_notify_frontend(&mut self, notify: bool);

    /// Table ids learned while monitoring.
    fn cached_pids(&self) -> Vec<PidCacheEntry> {
        Vec::new()
    }

    fn load_cached_pids(&mut self, _pids: Vec<PidCacheEntry>) {}
}
