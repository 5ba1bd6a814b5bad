use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

/// A peripheral control that is locked while a round is in flight
/// (grid selector, bet stepper, history button and the like).
pub trait Gateable: Send + Sync {
    fn name(&self) -> &str;
    fn disable(&self);
    fn enable(&self);
}

/// The set of controls disabled and re-enabled together.
#[derive(Default)]
pub struct UiGate {
    controls: Mutex<Vec<Arc<dyn Gateable>>>,
    locked: AtomicBool,
}

impl UiGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a control. A control registered while the gate is locked starts
    /// out disabled.
    pub fn register(&self, control: Arc<dyn Gateable>) {
        if self.is_locked() {
            control.disable();
        }
        self.controls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(control);
    }

    fn controls(&self) -> Vec<Arc<dyn Gateable>> {
        self.controls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn disable_ui_components(&self) {
        self.locked.store(true, Ordering::SeqCst);
        for control in self.controls() {
            debug!("Disabling {}", control.name());
            control.disable();
        }
    }

    pub fn enable_ui_components(&self) {
        self.locked.store(false, Ordering::SeqCst);
        for control in self.controls() {
            debug!("Enabling {}", control.name());
            control.enable();
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }
}

/// Application chrome the boot sequence talks to.
pub trait AppShell: Send + Sync {
    /// Show the Start/Collect control. Called once, at the end of boot.
    fn attach_start_control(&self);

    /// Take down the loading overlay. Called at most once per boot.
    fn remove_loading_overlay(&self);

    /// Tell the player the stake exceeds the balance.
    fn show_low_balance_prompt(&self, stake: f64, balance: f64);
}

/// Shell for headless hosts; every call is a no-op.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullShell;

impl AppShell for NullShell {
    fn attach_start_control(&self) {}

    fn remove_loading_overlay(&self) {}

    fn show_low_balance_prompt(&self, _stake: f64, _balance: f64) {}
}
