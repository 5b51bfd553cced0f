//! Authoritative terminal state: geometry, capabilities, and mode flags.
//!
//! This is the only structure in the workspace ever populated from a
//! terminal read, and only at two points: one-time initialization (size +
//! bounded capability probe) and the resize-signal path
//! (`update_geometry`). Steady-state redraw code consumes the read-only
//! [`TermSnapshot`] and never touches the device.
//!
//! Mode changes are one-way writes with no confirmation read. Shutdown
//! restores the original mode best-effort and must stay reachable from
//! every exit path; both [`TerminalState`]'s `Drop` and the scoped
//! [`TerminalGuard`] provide that.

use anyhow::Result;
use bitflags::bitflags;
use crossterm::{
    cursor::{Hide, Show},
    event::{
        DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode},
    tty::IsTty,
};
use std::io::stdout;
use std::time::Duration;

pub mod capabilities;
pub mod sink;

pub use capabilities::{
    CapabilityProbe, CapabilitySet, ColorDepth, StdinProbe, TerminalFamily, detect_capabilities,
};
pub use sink::{CommandSink, SinkCommand};

/// Display-layer errors that must propagate distinctly rather than being
/// absorbed with defaults.
#[derive(Debug, thiserror::Error)]
pub enum TerminalError {
    #[error("terminal write failed")]
    WriteFailed(#[from] std::io::Error),
}

bitflags! {
    /// Current terminal mode record. Mirrors what we have asked the device
    /// to do; never read back from it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ModeFlags: u8 {
        const RAW             = 0b0000_0001;
        const CURSOR_HIDDEN   = 0b0000_0010;
        const BRACKETED_PASTE = 0b0000_0100;
        const MOUSE_CAPTURE   = 0b0000_1000;
    }
}

/// Initialization tuning. The probe timeout bounds the only blocking read
/// this crate ever performs.
#[derive(Debug, Clone, Copy)]
pub struct InitConfig {
    pub probe_timeout: Duration,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_millis(50),
        }
    }
}

/// Read-only snapshot handed to the composition engine each cycle. Copy,
/// cheap, and guaranteed not to touch the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSnapshot {
    pub cols: u16,
    pub rows: u16,
    pub caps: CapabilitySet,
    pub interactive: bool,
}

pub struct TerminalState {
    cols: u16,
    rows: u16,
    caps: CapabilitySet,
    modes: ModeFlags,
    interactive: bool,
    restored: bool,
}

/// RAII guard ensuring mode restoration even if the caller early-returns or
/// panics mid-session.
pub struct TerminalGuard<'a> {
    term: &'a mut TerminalState,
    active: bool,
}

impl TerminalState {
    /// One-time initialization. Environment hints always apply; the probe
    /// and raw-mode entry happen only when attached to an interactive
    /// terminal. A non-tty yields a degraded but valid state, not an error,
    /// so piped/headless operation works.
    pub fn initialize(probe: Option<&mut dyn CapabilityProbe>, cfg: &InitConfig) -> Result<Self> {
        let interactive = stdout().is_tty();

        let (cols, rows) = if interactive {
            crossterm::terminal::size().unwrap_or((80, 24))
        } else {
            (80, 24)
        };

        Ok(Self::init_session(
            interactive,
            cols,
            rows,
            || enable_raw_mode().map_err(TerminalError::WriteFailed),
            |k| std::env::var(k).ok(),
            probe,
            cfg,
        )?)
    }

    /// Session setup with the device touchpoints injected. Raw mode is
    /// entered before the capability probe runs: in canonical mode the DA1
    /// reply carries no line delimiter, so the pending read would outlive
    /// the probe timeout and the reply bytes would surface in the user's
    /// first input line.
    fn init_session<R, F>(
        interactive: bool,
        cols: u16,
        rows: u16,
        enter_raw: R,
        get_env: F,
        probe: Option<&mut dyn CapabilityProbe>,
        cfg: &InitConfig,
    ) -> Result<Self, TerminalError>
    where
        R: FnOnce() -> Result<(), TerminalError>,
        F: Fn(&str) -> Option<String>,
    {
        let mut modes = ModeFlags::empty();
        if interactive {
            enter_raw()?;
            modes |= ModeFlags::RAW;
        } else {
            tracing::debug!(target: "term.mode", "not_a_tty_degraded_state");
        }

        let caps = detect_capabilities(
            get_env,
            if interactive { probe } else { None },
            cfg.probe_timeout,
        );

        tracing::info!(
            target: "term.mode",
            cols,
            rows,
            interactive,
            "terminal_initialized"
        );

        Ok(Self {
            cols,
            rows,
            caps,
            modes,
            interactive,
            restored: false,
        })
    }

    /// Degraded state for headless operation and tests: never touches the
    /// device, conservative capabilities.
    pub fn headless(cols: u16, rows: u16) -> Self {
        Self::headless_with_caps(cols, rows, CapabilitySet::conservative())
    }

    pub fn headless_with_caps(cols: u16, rows: u16, caps: CapabilitySet) -> Self {
        Self {
            cols,
            rows,
            caps,
            modes: ModeFlags::empty(),
            interactive: false,
            restored: false,
        }
    }

    /// Resize-signal path only; never polled during a redraw cycle.
    pub fn update_geometry(&mut self, cols: u16, rows: u16) {
        tracing::debug!(
            target: "term.geometry",
            old_cols = self.cols,
            old_rows = self.rows,
            cols,
            rows,
            "geometry_updated"
        );
        self.cols = cols;
        self.rows = rows;
    }

    /// Update the mode record and issue the matching one-way sequence.
    /// Write-only and unconfirmed; the record is authoritative.
    pub fn set_mode(&mut self, flag: ModeFlags, enabled: bool) -> Result<(), TerminalError> {
        self.modes.set(flag, enabled);
        tracing::debug!(target: "term.mode", ?flag, enabled, "mode_change");
        if !self.interactive {
            return Ok(());
        }
        self.emit_mode(flag, enabled)
    }

    fn emit_mode(&self, flag: ModeFlags, enabled: bool) -> Result<(), TerminalError> {
        let mut out = stdout();
        if flag == ModeFlags::RAW {
            if enabled {
                enable_raw_mode()?;
            } else {
                disable_raw_mode()?;
            }
        } else if flag == ModeFlags::CURSOR_HIDDEN {
            if enabled {
                execute!(out, Hide)?;
            } else {
                execute!(out, Show)?;
            }
        } else if flag == ModeFlags::BRACKETED_PASTE {
            if enabled {
                execute!(out, EnableBracketedPaste)?;
            } else {
                execute!(out, DisableBracketedPaste)?;
            }
        } else if flag == ModeFlags::MOUSE_CAPTURE {
            if enabled {
                execute!(out, EnableMouseCapture)?;
            } else {
                execute!(out, DisableMouseCapture)?;
            }
        }
        Ok(())
    }

    /// Re-issue every currently-set mode sequence. Used after
    /// suspend/continue, where another process may have altered terminal
    /// settings; deliberately not a re-probe (capabilities are immutable).
    pub fn reassert_modes(&mut self) -> Result<(), TerminalError> {
        tracing::debug!(target: "term.mode", modes = ?self.modes, "modes_reasserted");
        if !self.interactive {
            return Ok(());
        }
        for flag in [
            ModeFlags::RAW,
            ModeFlags::CURSOR_HIDDEN,
            ModeFlags::BRACKETED_PASTE,
            ModeFlags::MOUSE_CAPTURE,
        ] {
            if self.modes.contains(flag) {
                self.emit_mode(flag, true)?;
            }
        }
        Ok(())
    }

    /// Pure snapshot for the composition engine.
    pub fn snapshot(&self) -> TermSnapshot {
        TermSnapshot {
            cols: self.cols,
            rows: self.rows,
            caps: self.caps,
            interactive: self.interactive,
        }
    }

    pub fn modes(&self) -> ModeFlags {
        self.modes
    }

    pub fn is_restored(&self) -> bool {
        self.restored
    }

    /// Restore the original terminal mode. Best-effort: device write
    /// failures are logged and ignored, because this runs on abnormal exit
    /// paths where there is nothing better to do. Idempotent.
    pub fn shutdown(&mut self) {
        if self.restored {
            return;
        }
        self.restored = true;
        if self.interactive {
            for flag in [
                ModeFlags::CURSOR_HIDDEN,
                ModeFlags::BRACKETED_PASTE,
                ModeFlags::MOUSE_CAPTURE,
            ] {
                if self.modes.contains(flag)
                    && let Err(e) = self.emit_mode(flag, false)
                {
                    tracing::warn!(target: "term.mode", ?flag, ?e, "shutdown_mode_restore_failed");
                }
            }
            if let Err(e) = disable_raw_mode() {
                tracing::warn!(target: "term.mode", ?e, "shutdown_raw_restore_failed");
            }
        }
        self.modes = ModeFlags::empty();
        tracing::info!(target: "term.mode", "terminal_restored");
    }

    /// Scoped acquisition: returns a guard that restores on drop.
    pub fn guard(&mut self) -> TerminalGuard<'_> {
        TerminalGuard {
            term: self,
            active: true,
        }
    }
}

impl Drop for TerminalState {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<'a> TerminalGuard<'a> {
    /// Keep the terminal in its current mode past the guard's lifetime.
    pub fn disarm(mut self) {
        self.active = false;
    }
}

impl<'a> Drop for TerminalGuard<'a> {
    fn drop(&mut self) {
        if self.active {
            self.term.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_snapshot_is_degraded_but_valid() {
        let term = TerminalState::headless(80, 24);
        let snap = term.snapshot();
        assert_eq!((snap.cols, snap.rows), (80, 24));
        assert!(!snap.interactive);
        assert_eq!(snap.caps, CapabilitySet::conservative());
    }

    #[test]
    fn set_mode_updates_record_without_device() {
        let mut term = TerminalState::headless(80, 24);
        term.set_mode(ModeFlags::CURSOR_HIDDEN, true).unwrap();
        assert!(term.modes().contains(ModeFlags::CURSOR_HIDDEN));
        term.set_mode(ModeFlags::CURSOR_HIDDEN, false).unwrap();
        assert!(!term.modes().contains(ModeFlags::CURSOR_HIDDEN));
    }

    #[test]
    fn update_geometry_changes_snapshot() {
        let mut term = TerminalState::headless(80, 24);
        term.update_geometry(100, 30);
        let snap = term.snapshot();
        assert_eq!((snap.cols, snap.rows), (100, 30));
    }

    #[test]
    fn shutdown_is_idempotent_and_clears_modes() {
        let mut term = TerminalState::headless(80, 24);
        term.set_mode(ModeFlags::BRACKETED_PASTE, true).unwrap();
        term.shutdown();
        assert!(term.is_restored());
        assert!(term.modes().is_empty());
        term.shutdown(); // second call must be a no-op
        assert!(term.is_restored());
    }

    #[test]
    fn guard_restores_on_drop() {
        let mut term = TerminalState::headless(80, 24);
        {
            let _g = term.guard();
        }
        assert!(term.is_restored());
    }

    #[test]
    fn raw_mode_precedes_capability_probe() {
        use std::cell::RefCell;

        struct OrderProbe<'a>(&'a RefCell<Vec<&'static str>>);
        impl CapabilityProbe for OrderProbe<'_> {
            fn query(&mut self, _timeout: Duration) -> Option<Vec<u8>> {
                self.0.borrow_mut().push("probe");
                None
            }
        }

        let order = RefCell::new(Vec::new());
        let mut probe = OrderProbe(&order);
        let term = TerminalState::init_session(
            true,
            80,
            24,
            || {
                order.borrow_mut().push("raw");
                Ok(())
            },
            |_| None,
            Some(&mut probe),
            &InitConfig::default(),
        )
        .unwrap();
        assert_eq!(*order.borrow(), ["raw", "probe"]);
        assert!(term.modes().contains(ModeFlags::RAW));
    }

    #[test]
    fn reassert_modes_headless_is_noop_ok() {
        let mut term = TerminalState::headless(80, 24);
        term.set_mode(ModeFlags::RAW, true).unwrap();
        term.reassert_modes().unwrap();
        assert!(term.modes().contains(ModeFlags::RAW));
    }
}
