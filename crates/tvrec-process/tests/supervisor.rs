#![expect(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions use unwrap/expect for clarity."
)]

//! Launch, reap and escalation behaviour against real `/bin/sh` children.

use std::thread;
use std::time::{Duration, Instant};

use tvrec_process::{
    ProcessFlags, ProcessHandle, ProcessStatus, ProcessSupervisor, ReapScope, SupervisorConfig,
    run_command,
};

const WAIT: Option<Duration> = Some(Duration::from_secs(10));

fn supervisor() -> ProcessSupervisor {
    ProcessSupervisor::new(
        SupervisorConfig::default()
            .with_poll_interval(Duration::from_millis(20))
            .with_reap_scope(ReapScope::Tracked),
    )
}

#[test]
fn exit_code_and_buffered_output_are_captured() {
    let sup = supervisor();
    let handle = ProcessHandle::shell(
        &sup,
        "echo hello; echo oops >&2; exit 3",
        ProcessFlags::BUFFERED,
    );
    assert_eq!(handle.run(None), ProcessStatus::Running);
    assert_eq!(handle.wait(WAIT), ProcessStatus::Exited(3));
    assert_eq!(handle.read_all().unwrap(), b"hello\n");
    assert_eq!(handle.read_all_err().unwrap(), b"oops\n");
    assert!(!handle.timed_out());
    assert_eq!(sup.tracked_count(), 0);
}

#[test]
fn buffered_read_consumes_incrementally() {
    let sup = supervisor();
    let handle = ProcessHandle::shell(&sup, "printf abcdef", ProcessFlags::BUFFERED);
    handle.run(None);
    handle.wait(WAIT);
    assert_eq!(handle.read(4).unwrap(), b"abcd");
    assert_eq!(handle.read(4).unwrap(), b"ef");
    assert!(handle.read(4).unwrap().is_empty());
    assert_eq!(handle.read_all().unwrap(), b"abcdef");
}

#[test]
fn large_output_is_complete_after_exit() {
    let sup = supervisor();
    let handle = ProcessHandle::shell(
        &sup,
        "i=0; while [ $i -lt 5000 ]; do echo line-$i; i=$((i+1)); done",
        ProcessFlags::BUFFERED,
    );
    handle.run(None);
    assert_eq!(handle.wait(WAIT), ProcessStatus::Exited(0));
    let out = String::from_utf8(handle.read_all().unwrap()).unwrap();
    assert_eq!(out.lines().count(), 5000);
    assert!(out.ends_with("line-4999\n"));
}

#[test]
fn missing_program_is_not_found() {
    let sup = supervisor();
    let handle = ProcessHandle::program(
        &sup,
        "/nonexistent/bin/tvrec-helper",
        ["--flag"],
        ProcessFlags::BUFFERED,
    );
    assert_eq!(handle.run(None), ProcessStatus::NotFound);
    assert_eq!(handle.wait(WAIT), ProcessStatus::NotFound);
    assert_eq!(sup.tracked_count(), 0);
}

#[test]
fn program_runs_with_argument_vector() {
    let sup = supervisor();
    let handle = ProcessHandle::program(&sup, "/bin/echo", ["one two", "three"], ProcessFlags::BUFFERED);
    handle.run(None);
    assert_eq!(handle.wait(WAIT), ProcessStatus::Exited(0));
    assert_eq!(handle.read_all().unwrap(), b"one two three\n");
}

#[test]
fn signal_deaths_are_classified() {
    let sup = supervisor();
    let cases = [
        ("kill -TERM $$", ProcessStatus::Signalled(libc::SIGTERM)),
        ("kill -SEGV $$", ProcessStatus::Terminated),
        ("kill -KILL $$", ProcessStatus::Aborted),
    ];
    for (command, expected) in cases {
        let handle = ProcessHandle::shell(&sup, command, ProcessFlags::NONE);
        handle.run(None);
        assert_eq!(handle.wait(WAIT), expected, "{command}");
    }
}

#[test]
fn timeout_escalates_from_term_to_kill() {
    let sup = supervisor();
    let handle = ProcessHandle::shell(
        &sup,
        "trap 'echo term' TERM; while true; do sleep 0.1; done",
        ProcessFlags::BUFFERED,
    );
    let started = Instant::now();
    handle.run(Some(Duration::from_secs(2)));

    thread::sleep(Duration::from_millis(2500));
    assert_eq!(handle.status(), ProcessStatus::TimedOut);

    let status = handle.wait(WAIT);
    let elapsed = started.elapsed();
    assert_eq!(status, ProcessStatus::Aborted);
    assert!(handle.timed_out());
    assert!(elapsed >= Duration::from_secs(3), "killed too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(8), "killed too late: {elapsed:?}");
    let out = String::from_utf8(handle.read_all().unwrap()).unwrap();
    assert!(out.contains("term"), "trap output missing: {out:?}");
}

#[test]
fn timeout_stops_at_term_when_child_obeys() {
    let sup = supervisor();
    let handle = ProcessHandle::shell(&sup, "sleep 30", ProcessFlags::NONE);
    let started = Instant::now();
    handle.run(Some(Duration::from_secs(1)));
    assert_eq!(handle.wait(WAIT), ProcessStatus::Signalled(libc::SIGTERM));
    assert!(handle.timed_out());
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn wait_timeout_returns_running() {
    let sup = supervisor();
    let handle = ProcessHandle::shell(&sup, "sleep 5", ProcessFlags::NONE);
    handle.run(None);
    assert_eq!(
        handle.wait(Some(Duration::from_millis(200))),
        ProcessStatus::Running
    );
    handle.kill();
    assert_eq!(handle.wait(WAIT), ProcessStatus::Aborted);
}

#[test]
fn background_wait_returns_immediately() {
    let sup = supervisor();
    let handle = ProcessHandle::shell(&sup, "sleep 0.5", ProcessFlags::RUN_BACKGROUND);
    handle.run(None);
    let started = Instant::now();
    assert_eq!(handle.wait(None), ProcessStatus::Running);
    assert!(started.elapsed() < Duration::from_millis(200));

    let deadline = Instant::now() + Duration::from_secs(10);
    while !handle.status().is_final() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(handle.status(), ProcessStatus::Exited(0));
}

#[test]
fn trailing_ampersand_runs_in_background() {
    let sup = supervisor();
    let handle = ProcessHandle::shell(&sup, "sleep 0.2 &", ProcessFlags::NONE);
    assert!(handle.is_background());
    assert_eq!(handle.command(), "sleep 0.2");
    handle.run(None);
    assert_eq!(handle.wait(None), ProcessStatus::Running);
}

#[test]
fn control_signals_are_noops_after_exit() {
    let sup = supervisor();
    let handle = ProcessHandle::shell(&sup, "exit 0", ProcessFlags::NONE);
    handle.run(None);
    assert_eq!(handle.wait(WAIT), ProcessStatus::Exited(0));

    handle.term(true);
    handle.kill();
    handle.hang_up();
    handle.usr1();
    handle.usr2();
    assert_eq!(handle.status(), ProcessStatus::Exited(0));
    assert!(handle.pid().is_none());
}

#[test]
fn forced_term_kills_a_child_ignoring_sigterm() {
    let sup = supervisor();
    let handle = ProcessHandle::shell(&sup, "trap '' TERM; sleep 5", ProcessFlags::NONE);
    handle.run(None);
    thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    handle.term(true);
    assert_eq!(handle.wait(WAIT), ProcessStatus::Aborted);
    assert!(started.elapsed() >= Duration::from_millis(900));
}

#[test]
fn stop_and_cont_suspend_the_child() {
    let sup = supervisor();
    let handle = ProcessHandle::shell(&sup, "sleep 0.3", ProcessFlags::NONE);
    handle.run(None);
    handle.stop();
    thread::sleep(Duration::from_millis(600));
    assert_eq!(handle.status(), ProcessStatus::Running);
    handle.cont();
    assert_eq!(handle.wait(WAIT), ProcessStatus::Exited(0));
}

#[test]
fn stdin_round_trips_through_cat() {
    let sup = supervisor();
    let handle = ProcessHandle::shell(&sup, "cat", ProcessFlags::STDIN | ProcessFlags::BUFFERED);
    handle.run(None);
    assert_eq!(handle.write(b"ping\n").unwrap(), 5);
    handle.close_stdin();
    assert_eq!(handle.wait(WAIT), ProcessStatus::Exited(0));
    assert_eq!(handle.read_all().unwrap(), b"ping\n");
}

#[test]
fn unbuffered_stdout_is_read_from_the_pipe() {
    let sup = supervisor();
    let handle = ProcessHandle::shell(&sup, "echo direct; sleep 0.5", ProcessFlags::STDOUT);
    handle.run(None);
    let line = handle.read(64).unwrap();
    assert_eq!(line, b"direct\n");
    assert_eq!(handle.wait(WAIT), ProcessStatus::Exited(0));
}

#[test]
fn concurrent_children_keep_separate_output() {
    let sup = supervisor();
    let handles: Vec<ProcessHandle> = (0..6)
        .map(|i| {
            let handle =
                ProcessHandle::shell(&sup, format!("sleep 0.1; echo child-{i}"), ProcessFlags::BUFFERED);
            handle.run(None);
            handle
        })
        .collect();

    for (i, handle) in handles.iter().enumerate() {
        assert_eq!(handle.wait(WAIT), ProcessStatus::Exited(0));
        assert_eq!(handle.read_all().unwrap(), format!("child-{i}\n").into_bytes());
    }
    assert_eq!(sup.tracked_count(), 0);
}

#[test]
fn run_command_waits_for_exit_code() {
    let sup = supervisor();
    assert_eq!(
        run_command(&sup, "exit 4", ProcessFlags::NONE, None),
        ProcessStatus::Exited(4)
    );
    assert_eq!(
        run_command(&sup, "sleep 0.1 &", ProcessFlags::NONE, None),
        ProcessStatus::Running
    );
}

#[test]
fn reaped_status_is_recorded_once() {
    let sup = supervisor();
    let handle = ProcessHandle::shell(&sup, "exit 9", ProcessFlags::NONE);
    handle.run(None);
    assert_eq!(handle.wait(WAIT), ProcessStatus::Exited(9));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(handle.status(), ProcessStatus::Exited(9));
    assert_eq!(sup.tracked_count(), 0);
}

#[test]
fn default_supervisors_do_not_steal_each_others_children() {
    let slow = ProcessSupervisor::new(
        SupervisorConfig::default().with_poll_interval(Duration::from_millis(500)),
    );
    let fast = ProcessSupervisor::new(
        SupervisorConfig::default().with_poll_interval(Duration::from_millis(5)),
    );
    let quick = ProcessHandle::shell(&slow, "exit 5", ProcessFlags::NONE);
    quick.run(None);
    let busy = ProcessHandle::shell(&fast, "sleep 2", ProcessFlags::NONE);
    busy.run(None);

    assert_eq!(quick.wait(WAIT), ProcessStatus::Exited(5));
    assert_eq!(slow.tracked_count(), 0);
    assert!(!slow.reaps_any_child());
    assert!(!fast.reaps_any_child());
    assert_eq!(busy.wait(WAIT), ProcessStatus::Exited(0));
}
