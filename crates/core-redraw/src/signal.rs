//! Async-signal-safe delivery of resize and resume notifications.
//!
//! Signal handlers only store into atomic flags; all real work happens when
//! the owning loop drains the flags between input steps. Multiple signals
//! arriving between drains collapse into one pending bit, which is exactly
//! the coalescing the redraw path wants.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag set. Clone one handle into each signal handler; the
/// coordinator loop drains through another.
#[derive(Debug, Clone, Default)]
pub struct SignalFlags {
    resized: Arc<AtomicBool>,
    resumed: Arc<AtomicBool>,
}

impl SignalFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler side: store only, no allocation, no locking.
    pub fn set_resized(&self) {
        self.resized.store(true, Ordering::Release);
    }

    pub fn set_resumed(&self) {
        self.resumed.store(true, Ordering::Release);
    }

    /// Drain side: read-and-clear in one step.
    pub fn take_resized(&self) -> bool {
        self.resized.swap(false, Ordering::AcqRel)
    }

    pub fn take_resumed(&self) -> bool {
        self.resumed.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_clears_the_flag() {
        let flags = SignalFlags::new();
        assert!(!flags.take_resized());
        flags.set_resized();
        flags.set_resized(); // burst collapses
        assert!(flags.take_resized());
        assert!(!flags.take_resized());
    }

    #[test]
    fn flags_are_independent() {
        let flags = SignalFlags::new();
        flags.set_resumed();
        assert!(!flags.take_resized());
        assert!(flags.take_resumed());
    }

    #[test]
    fn clones_share_state() {
        let a = SignalFlags::new();
        let b = a.clone();
        b.set_resized();
        assert!(a.take_resized());
    }
}
