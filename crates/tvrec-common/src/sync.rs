use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::error;

static POISON_RECOVERY_COUNT: AtomicU64 = AtomicU64::new(0);

/// Number of times a poisoned lock was recovered in this process.
pub fn poison_recovery_count() -> u64 {
    POISON_RECOVERY_COUNT.load(Ordering::Relaxed)
}

fn record_poison_recovery(what: &'static str) {
    POISON_RECOVERY_COUNT.fetch_add(1, Ordering::Relaxed);
    error!(
        lock = what,
        "Lock poisoned - a thread panicked while holding it. \
         State may be inconsistent. Attempting recovery."
    );
}

pub fn mutex_lock_or_recover<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|poisoned| {
        record_poison_recovery("mutex");
        poisoned.into_inner()
    })
}

pub fn condvar_wait_or_recover<'a, T>(
    cond: &Condvar,
    guard: MutexGuard<'a, T>,
) -> MutexGuard<'a, T> {
    cond.wait(guard).unwrap_or_else(|poisoned| {
        record_poison_recovery("condvar");
        poisoned.into_inner()
    })
}

/// Waits on `cond` for at most `timeout`. Returns the guard and whether the
/// wait ended by timing out.
pub fn condvar_wait_timeout_or_recover<'a, T>(
    cond: &Condvar,
    guard: MutexGuard<'a, T>,
    timeout: Duration,
) -> (MutexGuard<'a, T>, bool) {
    match cond.wait_timeout(guard, timeout) {
        Ok((guard, result)) => (guard, result.timed_out()),
        Err(poisoned) => {
            record_poison_recovery("condvar");
            let (guard, result) = poisoned.into_inner();
            (guard, result.timed_out())
        }
    }
}
