use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Launch options for a [`ProcessHandle`](crate::ProcessHandle).
///
/// Every option has its own bit.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ProcessFlags(u32);

impl ProcessFlags {
    pub const NONE: Self = Self(0);
    /// Leave remote-control and joystick input enabled while the child runs.
    pub const DONT_BLOCK_INPUT_DEVS: Self = Self(1 << 0);
    /// Keep the UI drawing while the child runs.
    pub const DONT_DISABLE_DRAWING: Self = Self(1 << 1);
    /// `wait` returns immediately; the reaper still collects the status.
    pub const RUN_BACKGROUND: Self = Self(1 << 2);
    /// Pump the caller's UI events while waiting.
    pub const PROCESS_EVENTS: Self = Self(1 << 3);
    pub const STDIN: Self = Self(1 << 4);
    pub const STDOUT: Self = Self(1 << 5);
    pub const STDERR: Self = Self(1 << 6);
    /// Capture stdout and stderr into in-memory buffers.
    pub const BUFFERED: Self = Self(1 << 7);
    /// Run through `/bin/sh -c`.
    pub const RUN_SHELL: Self = Self(1 << 8);

    const NAMES: [(Self, &'static str); 9] = [
        (Self::DONT_BLOCK_INPUT_DEVS, "DONT_BLOCK_INPUT_DEVS"),
        (Self::DONT_DISABLE_DRAWING, "DONT_DISABLE_DRAWING"),
        (Self::RUN_BACKGROUND, "RUN_BACKGROUND"),
        (Self::PROCESS_EVENTS, "PROCESS_EVENTS"),
        (Self::STDIN, "STDIN"),
        (Self::STDOUT, "STDOUT"),
        (Self::STDERR, "STDERR"),
        (Self::BUFFERED, "BUFFERED"),
        (Self::RUN_SHELL, "RUN_SHELL"),
    ];

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn from_bits_truncate(bits: u32) -> Self {
        Self(bits & 0x1ff)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ProcessFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ProcessFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for ProcessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("ProcessFlags(NONE)");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "ProcessFlags({})", names.join(" | "))
    }
}

/// Flags resolved against the launch context. Frozen once the handle exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct LaunchOptions {
    pub background: bool,
    pub in_ui: bool,
    pub block_input_devs: bool,
    pub disable_drawing: bool,
    pub pump_events: bool,
    pub stdin: bool,
    pub stdout: bool,
    pub stderr: bool,
    pub buffered: bool,
    pub use_shell: bool,
}

impl LaunchOptions {
    /// `in_ui` is true when the handle is created on the UI thread of a GUI
    /// process; UI locks and event pumping only apply there.
    pub fn resolve(flags: ProcessFlags, in_ui: bool) -> Self {
        let buffered = flags.contains(ProcessFlags::BUFFERED);
        Self {
            background: flags.contains(ProcessFlags::RUN_BACKGROUND),
            in_ui,
            block_input_devs: in_ui && !flags.contains(ProcessFlags::DONT_BLOCK_INPUT_DEVS),
            disable_drawing: in_ui && !flags.contains(ProcessFlags::DONT_DISABLE_DRAWING),
            pump_events: in_ui && flags.contains(ProcessFlags::PROCESS_EVENTS),
            stdin: flags.contains(ProcessFlags::STDIN),
            stdout: buffered || flags.contains(ProcessFlags::STDOUT),
            stderr: buffered || flags.contains(ProcessFlags::STDERR),
            buffered,
            use_shell: flags.contains(ProcessFlags::RUN_SHELL),
        }
    }
}

/// Strips a trailing `&` from a shell command line. A stripped command runs
/// in the background through the shell.
pub(crate) fn split_background_marker(command: &str, flags: ProcessFlags) -> (String, ProcessFlags) {
    let trimmed = command.trim_end();
    match trimmed.strip_suffix('&') {
        Some(rest) if !rest.ends_with('&') => (
            rest.trim_end().to_string(),
            flags | ProcessFlags::RUN_BACKGROUND | ProcessFlags::RUN_SHELL,
        ),
        _ => (command.to_string(), flags),
    }
}
