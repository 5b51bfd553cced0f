//! Redraw coordination: one composition per input step, driven by
//! aggregate dirty state.
//!
//! The coordinator owns the terminal state, the layer set, and the
//! composition engine. Collaborators mutate layers through it and call
//! [`RedrawCoordinator::commit`] once per loop iteration; everything
//! between commits coalesces into at most one write burst.
//!
//! Design invariants:
//! * The dirty decision is the logical OR over all layers (plus the
//!   first-commit case). No layer is privileged: an overlay-only change
//!   redraws exactly like a content edit.
//! * `request_redraw` only records intent. Composition happens in `commit`,
//!   never inline, so a burst of mutations costs one frame.
//! * A failed commit leaves pending and dirty state in place; the next
//!   commit retries against the unchanged baseline.
//! * Signals are drained between input steps, not acted on in handlers.

use std::io::{Write, stdout};

use anyhow::{Context, Result};
use core_compose::{ComposeMetricsSnapshot, CompositionEngine, DiffConfig};
use core_layers::{LayerContent, LayerSet, StyledLine};
use core_terminal::{TerminalError, TerminalState};

pub mod signal;

pub use signal::SignalFlags;

/// What a `commit` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing pending or nothing dirty; no bytes written.
    Skipped,
    /// A frame was composed and flushed.
    Composed,
}

pub struct RedrawCoordinator {
    term: TerminalState,
    layers: LayerSet,
    engine: CompositionEngine,
    out: Box<dyn Write + Send>,
    pending: bool,
    composed_once: bool,
    last_versions: [u64; 3],
}

impl RedrawCoordinator {
    pub fn new(term: TerminalState, cfg: DiffConfig) -> Self {
        Self::with_sink(term, cfg, Box::new(stdout()))
    }

    /// Inject the byte sink; tests capture output, production uses stdout.
    pub fn with_sink(term: TerminalState, cfg: DiffConfig, out: Box<dyn Write + Send>) -> Self {
        Self {
            term,
            layers: LayerSet::new(),
            engine: CompositionEngine::new(cfg),
            out,
            pending: false,
            composed_once: false,
            last_versions: [0; 3],
        }
    }

    pub fn layers(&self) -> &LayerSet {
        &self.layers
    }

    pub fn term(&self) -> &TerminalState {
        &self.term
    }

    pub fn metrics(&self) -> ComposeMetricsSnapshot {
        self.engine.metrics_snapshot()
    }

    /// Versions recorded at the last successful composition.
    pub fn last_composed_versions(&self) -> [u64; 3] {
        self.last_versions
    }

    /// Record redraw intent. Cheap and idempotent; any number of calls
    /// before the next `commit` yield one composition.
    pub fn request_redraw(&mut self) {
        self.pending = true;
    }

    pub fn set_prompt(&mut self, line: StyledLine) {
        self.layers
            .prompt_mut()
            .set_content(LayerContent::Prompt { line });
        self.request_redraw();
    }

    /// Replace the command-content text and cursor byte offset.
    pub fn set_content<S: Into<String>>(&mut self, text: S, cursor: usize) {
        self.layers.content_mut().set_content(LayerContent::Content {
            text: text.into(),
            cursor,
        });
        self.request_redraw();
    }

    pub fn set_overlay_rows(&mut self, rows: Vec<StyledLine>) {
        self.layers
            .overlay_mut()
            .set_content(LayerContent::Overlay { rows });
        self.request_redraw();
    }

    /// Toggle overlay visibility. A same-value set leaves the layer clean,
    /// so the following `commit` skips.
    pub fn set_overlay_visible(&mut self, visible: bool) {
        self.layers.overlay_mut().set_visible(visible);
        self.request_redraw();
    }

    /// The once-per-input-step composition point.
    ///
    /// Skips when nothing is pending or nothing is dirty (after the first
    /// commit, which always paints). On success the dirty flags clear and
    /// the composed versions are recorded; on failure everything stays set
    /// so the next commit retries.
    pub fn commit(&mut self) -> Result<CommitOutcome> {
        let first = !self.composed_once;
        if !first && !self.pending {
            return Ok(CommitOutcome::Skipped);
        }
        if !first && !self.layers.any_dirty() {
            self.pending = false;
            tracing::trace!(target: "redraw.coordinator", "commit_skip_clean");
            return Ok(CommitOutcome::Skipped);
        }

        let snap = self.term.snapshot();
        let (frame, cursor) = self.engine.compose(&self.layers, &snap);
        self.engine
            .render(&frame, cursor, &mut self.out)
            .context("display write failed")?;

        self.pending = false;
        self.composed_once = true;
        self.last_versions = self.layers.clear_dirty_and_snapshot_versions();
        tracing::debug!(
            target: "redraw.coordinator",
            rows = frame.rows.len(),
            versions = ?self.last_versions,
            "frame_committed"
        );
        Ok(CommitOutcome::Composed)
    }

    /// Drain signal flags set since the last input step. At most one
    /// geometry refresh and one mode reassertion per drain, regardless of
    /// how many signals arrived.
    pub fn drain_signals(&mut self, flags: &SignalFlags) -> Result<(), TerminalError> {
        if flags.take_resized() {
            let snap = self.term.snapshot();
            let (cols, rows) = if snap.interactive {
                crossterm::terminal::size().unwrap_or((snap.cols, snap.rows))
            } else {
                (snap.cols, snap.rows)
            };
            self.resize(cols, rows);
        }
        if flags.take_resumed() {
            self.resumed()?;
        }
        Ok(())
    }

    /// Geometry change: new dimensions, full invalidation, redraw pending.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        tracing::info!(target: "redraw.coordinator", cols, rows, "resize");
        self.term.update_geometry(cols, rows);
        self.layers.mark_all_dirty();
        self.engine.invalidate();
        self.pending = true;
    }

    /// Resume after suspend: reassert terminal modes (another process may
    /// have changed them) and schedule a full repaint. Capabilities are not
    /// re-probed; the terminal did not change, only its settings.
    pub fn resumed(&mut self) -> Result<(), TerminalError> {
        tracing::info!(target: "redraw.coordinator", "resumed");
        self.term.reassert_modes()?;
        self.layers.mark_all_dirty();
        self.engine.invalidate();
        self.pending = true;
        Ok(())
    }

    /// Restore the terminal. Idempotent; also runs from `TerminalState`'s
    /// drop, so explicit and panic paths converge.
    pub fn shutdown(&mut self) {
        self.term.shutdown();
    }
}
