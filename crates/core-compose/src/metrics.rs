//! Composition and diff instrumentation.
//!
//! Counters are relaxed atomics: they feed logs and tests, never control
//! flow, so cross-counter consistency is not required.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ComposeMetrics {
    frames_composed: AtomicU64,
    rows_diffed: AtomicU64,
    rows_rewritten: AtomicU64,
    rows_patched: AtomicU64,
    rows_cleared: AtomicU64,
    cells_rewritten: AtomicU64,
    cursor_clamps: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComposeMetricsSnapshot {
    pub frames_composed: u64,
    pub rows_diffed: u64,
    pub rows_rewritten: u64,
    pub rows_patched: u64,
    pub rows_cleared: u64,
    pub cells_rewritten: u64,
    pub cursor_clamps: u64,
}

impl ComposeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self) {
        self.frames_composed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_row_diffed(&self) {
        self.rows_diffed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_row_rewritten(&self) {
        self.rows_rewritten.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_row_patched(&self) {
        self.rows_patched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rows_cleared(&self, n: u64) {
        self.rows_cleared.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_cells_rewritten(&self, n: u64) {
        self.cells_rewritten.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_cursor_clamp(&self) {
        self.cursor_clamps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ComposeMetricsSnapshot {
        ComposeMetricsSnapshot {
            frames_composed: self.frames_composed.load(Ordering::Relaxed),
            rows_diffed: self.rows_diffed.load(Ordering::Relaxed),
            rows_rewritten: self.rows_rewritten.load(Ordering::Relaxed),
            rows_patched: self.rows_patched.load(Ordering::Relaxed),
            rows_cleared: self.rows_cleared.load(Ordering::Relaxed),
            cells_rewritten: self.cells_rewritten.load(Ordering::Relaxed),
            cursor_clamps: self.cursor_clamps.load(Ordering::Relaxed),
        }
    }
}
