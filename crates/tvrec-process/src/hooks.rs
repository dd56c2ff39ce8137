use std::sync::Arc;

/// The launching application's UI, as far as child processes care.
///
/// Input-device locks and drawing suspension are taken before a UI-thread
/// launch and released by the reaper after the child exits.
pub trait UiContext: Send + Sync {
    fn has_gui(&self) -> bool;

    fn is_ui_thread(&self) -> bool;

    fn lock_input_devices(&self) {}

    fn unlock_input_devices(&self) {}

    fn push_disable_drawing(&self) {}

    fn pop_disable_drawing(&self) {}

    /// Processes pending UI events. Called repeatedly while a UI-thread
    /// caller waits on a child.
    fn pump_events(&self) {}
}

pub type UiHandle = Arc<dyn UiContext>;

/// Daemon context: no GUI, no locks, nothing to pump.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessUi;

impl UiContext for HeadlessUi {
    fn has_gui(&self) -> bool {
        false
    }

    fn is_ui_thread(&self) -> bool {
        false
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct UiLocks {
    pub input_devices: bool,
    pub drawing: bool,
}

impl UiLocks {
    pub fn acquire(ui: &dyn UiContext, block_input_devs: bool, disable_drawing: bool) -> Self {
        if block_input_devs {
            ui.lock_input_devices();
        }
        if disable_drawing {
            ui.push_disable_drawing();
        }
        Self {
            input_devices: block_input_devs,
            drawing: disable_drawing,
        }
    }

    /// Releases whatever `acquire` took. Safe to call more than once.
    pub fn release(&mut self, ui: &dyn UiContext) {
        if std::mem::take(&mut self.input_devices) {
            ui.unlock_input_devices();
        }
        if std::mem::take(&mut self.drawing) {
            ui.pop_disable_drawing();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[derive(Default)]
    pub(crate) struct CountingUi {
        pub input_locks: AtomicI32,
        pub drawing_depth: AtomicI32,
        pub pumped: AtomicI32,
    }

    impl UiContext for CountingUi {
        fn has_gui(&self) -> bool {
            true
        }

        fn is_ui_thread(&self) -> bool {
            true
        }

        fn lock_input_devices(&self) {
            self.input_locks.fetch_add(1, Ordering::SeqCst);
        }

        fn unlock_input_devices(&self) {
            self.input_locks.fetch_sub(1, Ordering::SeqCst);
        }

        fn push_disable_drawing(&self) {
            self.drawing_depth.fetch_add(1, Ordering::SeqCst);
        }

        fn pop_disable_drawing(&self) {
            self.drawing_depth.fetch_sub(1, Ordering::SeqCst);
        }

        fn pump_events(&self) {
            self.pumped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_release_undoes_only_what_was_taken() {
        let ui = CountingUi::default();
        let mut locks = UiLocks::acquire(&ui, true, false);
        assert_eq!(ui.input_locks.load(Ordering::SeqCst), 1);
        assert_eq!(ui.drawing_depth.load(Ordering::SeqCst), 0);

        locks.release(&ui);
        locks.release(&ui);
        assert_eq!(ui.input_locks.load(Ordering::SeqCst), 0);
        assert_eq!(ui.drawing_depth.load(Ordering::SeqCst), 0);
    }
}
