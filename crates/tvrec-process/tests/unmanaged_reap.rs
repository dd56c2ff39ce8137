#![expect(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

//! Reaping every child of the process, including ones the supervisor did
//! not launch. Lives in its own test binary: `waitpid(-1)` would otherwise
//! collect children belonging to unrelated tests. Tests here share one
//! process-wide claim, so they take `REAPING` first.

use std::process::Command;
use std::sync::{Mutex, MutexGuard, OnceLock};
use std::time::Duration;

use tvrec_process::{
    ProcessFlags, ProcessHandle, ProcessStatus, ProcessSupervisor, ReapScope, SupervisorConfig,
};

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

fn reaping_lock() -> MutexGuard<'static, ()> {
    static REAPING: OnceLock<Mutex<()>> = OnceLock::new();
    REAPING
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn supervisor(scope: ReapScope, poll: Duration) -> ProcessSupervisor {
    ProcessSupervisor::new(
        SupervisorConfig::default()
            .with_poll_interval(poll)
            .with_reap_scope(scope),
    )
}

#[test]
fn unmanaged_children_are_reaped_without_touching_the_table() {
    let _guard = reaping_lock();
    let sup = supervisor(ReapScope::AnyChild, Duration::from_millis(20));
    let mut stray = Command::new("/bin/sh").arg("-c").arg("exit 0").spawn().unwrap();

    let managed = ProcessHandle::shell(&sup, "sleep 0.4; exit 2", ProcessFlags::NONE);
    managed.run(None);
    assert_eq!(managed.wait(WAIT), ProcessStatus::Exited(2));
    assert!(sup.reaps_any_child());
    assert_eq!(sup.tracked_count(), 0);

    // Already collected by the reaper, so the OS no longer knows the pid.
    assert!(stray.try_wait().is_err());
    sup.shutdown();
    assert!(!sup.reaps_any_child());
}

#[test]
fn only_one_supervisor_reaps_every_child() {
    let _guard = reaping_lock();
    let first = supervisor(ReapScope::AnyChild, Duration::from_millis(5));
    let second = supervisor(ReapScope::AnyChild, Duration::from_millis(200));

    let sleeper = ProcessHandle::shell(&first, "sleep 1", ProcessFlags::NONE);
    sleeper.run(None);
    assert!(first.reaps_any_child());

    // The first reaper polls faster and collects this pid; the exit status
    // still reaches the second supervisor's handle.
    let quick = ProcessHandle::shell(&second, "exit 3", ProcessFlags::NONE);
    quick.run(None);
    assert!(!second.reaps_any_child());
    assert_eq!(quick.wait(WAIT), ProcessStatus::Exited(3));
    assert_eq!(second.tracked_count(), 0);

    assert_eq!(sleeper.wait(WAIT), ProcessStatus::Exited(0));
    first.shutdown();
    second.shutdown();

    let third = supervisor(ReapScope::AnyChild, Duration::from_millis(20));
    let handle = ProcessHandle::shell(&third, "exit 0", ProcessFlags::NONE);
    handle.run(None);
    assert!(third.reaps_any_child());
    assert_eq!(handle.wait(WAIT), ProcessStatus::Exited(0));
    third.shutdown();
}

#[test]
fn tracked_exit_collected_by_any_child_neighbour_is_handed_back() {
    let _guard = reaping_lock();
    let tracked = supervisor(ReapScope::Tracked, Duration::from_millis(500));
    let greedy = supervisor(ReapScope::AnyChild, Duration::from_millis(5));

    let busy = ProcessHandle::shell(&greedy, "sleep 2", ProcessFlags::NONE);
    busy.run(None);
    let quick = ProcessHandle::shell(&tracked, "exit 5", ProcessFlags::NONE);
    quick.run(None);

    assert_eq!(quick.wait(WAIT), ProcessStatus::Exited(5));
    assert_eq!(tracked.tracked_count(), 0);
    assert_eq!(busy.wait(WAIT), ProcessStatus::Exited(0));
    greedy.shutdown();
    tracked.shutdown();
}
