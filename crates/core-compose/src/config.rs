//! Diff engine tuning knobs.

use serde::Deserialize;

/// Thresholds steering the repaint strategy. Deserializable so a host can
/// load overrides from its config file; every field defaults.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiffConfig {
    /// Percentage of changed cells in a row at or above which the whole row
    /// is cleared and rewritten instead of patched run-by-run.
    pub full_row_rewrite_pct: u8,
    /// Hard cap on overlay rows placed below the primary span.
    pub max_overlay_rows: u16,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            full_row_rewrite_pct: 50,
            max_overlay_rows: 10,
        }
    }
}

impl DiffConfig {
    /// Bound fields to sane ranges; out-of-range input is clamped, not
    /// rejected, so a bad config value degrades rendering quality instead
    /// of aborting the session.
    pub fn clamped(mut self) -> Self {
        if self.full_row_rewrite_pct > 100 {
            self.full_row_rewrite_pct = 100;
        }
        if self.max_overlay_rows == 0 {
            self.max_overlay_rows = 1;
        }
        self
    }
}
