//! Runtime flag adapter.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::ports::outbound::Runtime;

/// Runtime whose validator status is set by the host.
#[derive(Debug)]
pub struct StaticRuntime {
    active: AtomicBool,
}

impl StaticRuntime {
    /// Runtime reporting `active`.
    pub fn new(active: bool) -> Self {
        Self {
            active: AtomicBool::new(active),
        }
    }

    /// Change the reported status.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }
}

impl Runtime for StaticRuntime {
    fn is_active_validator(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}
