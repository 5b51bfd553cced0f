//! Composition and diff-write engine.
//!
//! `compose` is pure: it stacks the layer set into a [`Frame`] plus a
//! [`CursorTarget`] for the current geometry. `render` diffs that frame
//! against the last successfully written one and queues the smallest
//! command set that transforms the screen, then flushes it as one burst.
//!
//! Design invariants:
//! * Identical frame + cursor in, identical frame + cursor out; no hidden
//!   state feeds composition.
//! * Unchanged rows (hash-equal) produce zero commands.
//! * Repaint runs snap to leader-cell boundaries; a wide cluster is always
//!   rewritten whole.
//! * A repaint without a baseline (first paint, post-invalidate) always
//!   clears below the new frame; the prior screen extent is unknown.
//! * The cursor move is always the last queued command.
//! * `prev` is replaced only after a successful flush, so a failed write
//!   leaves the diff baseline describing what is actually on screen.

use std::io::Write;

use core_layers::{CellStyle, Cluster, LayerContent, LayerSet, StyledSpan, style::line_clusters};
use core_terminal::{CommandSink, TermSnapshot, TerminalError};

use crate::config::DiffConfig;
use crate::metrics::{ComposeMetrics, ComposeMetricsSnapshot};
use crate::{Cell, CursorTarget, Frame, FrameRow};

pub struct CompositionEngine {
    prev: Option<Frame>,
    prev_cursor: Option<CursorTarget>,
    cfg: DiffConfig,
    metrics: ComposeMetrics,
}

impl Default for CompositionEngine {
    fn default() -> Self {
        Self::new(DiffConfig::default())
    }
}

impl CompositionEngine {
    pub fn new(cfg: DiffConfig) -> Self {
        Self {
            prev: None,
            prev_cursor: None,
            cfg: cfg.clamped(),
            metrics: ComposeMetrics::new(),
        }
    }

    pub fn config(&self) -> DiffConfig {
        self.cfg
    }

    pub fn metrics_snapshot(&self) -> ComposeMetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Drop the diff baseline. The next `render` repaints every row. Used
    /// after resize and after suspend/continue, where on-screen content can
    /// no longer be trusted.
    pub fn invalidate(&mut self) {
        tracing::debug!(target: "compose.frame", "baseline_invalidated");
        self.prev = None;
        self.prev_cursor = None;
    }

    /// Stack the layer set into a frame for the snapshot's geometry.
    ///
    /// The prompt and content clusters form one primary span wrapped
    /// greedily across rows; visible overlay rows are appended below it.
    /// The cursor lands at the cell following the cluster the content-layer
    /// byte offset points at, wrapping to the next row when the offset
    /// falls past a full row.
    pub fn compose(&self, layers: &LayerSet, snap: &TermSnapshot) -> (Frame, CursorTarget) {
        let width = snap.cols.max(1);

        let prompt_clusters = match layers.prompt().content() {
            LayerContent::Prompt { line } => line_clusters(line),
            _ => Vec::new(),
        };
        let (content_clusters, cursor_index_in_content) = match layers.content().content() {
            LayerContent::Content { text, cursor } => {
                let clusters = line_clusters(&[StyledSpan::plain(text.clone())]);
                let idx = self.cursor_cluster_index(text, &clusters, *cursor);
                (clusters, idx)
            }
            _ => (Vec::new(), 0),
        };

        let mut primary: Vec<Cluster> = prompt_clusters;
        let cursor_index = primary.len() + cursor_index_in_content;
        primary.extend(content_clusters);
        if !snap.caps.unicode {
            sanitize_ascii(&mut primary);
        }

        // Greedy wrap with cursor tracking: the cursor position is the
        // placement position of cluster `cursor_index`, or the slot after
        // the final cluster when the offset is at end of text.
        let mut cluster_rows: Vec<Vec<Cluster>> = Vec::new();
        let mut current: Vec<Cluster> = Vec::new();
        let mut col: u16 = 0;
        let mut cursor = CursorTarget { row: 0, col: 0 };
        for (i, cl) in primary.iter().enumerate() {
            let w = cl.width.min(width);
            if col + w > width {
                cluster_rows.push(std::mem::take(&mut current));
                col = 0;
            }
            if i == cursor_index {
                cursor = CursorTarget {
                    row: cluster_rows.len() as u16,
                    col,
                };
            }
            current.push(cl.clone());
            col += w;
        }
        if cursor_index >= primary.len() {
            if col >= width {
                // End-of-text cursor past a full row wraps to a fresh row.
                cluster_rows.push(std::mem::take(&mut current));
                col = 0;
            }
            cursor = CursorTarget {
                row: cluster_rows.len() as u16,
                col,
            };
        }
        cluster_rows.push(current);

        let mut rows: Vec<FrameRow> = cluster_rows
            .iter()
            .map(|r| FrameRow::from_clusters(r, width))
            .collect();

        if layers.overlay().is_visible() {
            let mut overlay_rows = layers.overlay().rendered(width);
            overlay_rows.truncate(self.cfg.max_overlay_rows as usize);
            for r in &mut overlay_rows {
                if !snap.caps.unicode {
                    sanitize_ascii(r);
                }
                rows.push(FrameRow::from_clusters(r, width));
            }
        }

        // Clip to the terminal height; scrollback management is out of
        // scope, the frame simply never exceeds the display.
        let max_rows = snap.rows.max(1) as usize;
        if rows.len() > max_rows {
            rows.truncate(max_rows);
        }
        if cursor.row as usize >= rows.len() {
            cursor.row = (rows.len() - 1) as u16;
            self.metrics.record_cursor_clamp();
        }
        if cursor.col >= width {
            cursor.col = width - 1;
            self.metrics.record_cursor_clamp();
        }

        self.metrics.record_frame();
        tracing::debug!(
            target: "compose.frame",
            rows = rows.len(),
            cursor_row = cursor.row,
            cursor_col = cursor.col,
            "frame_composed"
        );

        (Frame { width, rows }, cursor)
    }

    /// Map the content-layer byte offset to a cluster index, clamping
    /// down to the nearest cluster boundary when the offset is out of
    /// range or mid-cluster.
    fn cursor_cluster_index(&self, text: &str, clusters: &[Cluster], cursor: usize) -> usize {
        let clamped = cursor.min(text.len());
        if clamped < cursor {
            self.metrics.record_cursor_clamp();
        }
        let mut idx = 0;
        let mut bytes = 0;
        for cl in clusters {
            if bytes + cl.text.len() > clamped {
                break;
            }
            bytes += cl.text.len();
            idx += 1;
        }
        if bytes != clamped {
            self.metrics.record_cursor_clamp();
        }
        idx
    }

    /// Diff `frame` against the last written frame and flush the minimal
    /// update. On success the frame becomes the new baseline; on failure
    /// the baseline is left untouched so a retry rewrites what failed.
    pub fn render<W: Write>(
        &mut self,
        frame: &Frame,
        cursor: CursorTarget,
        out: &mut W,
    ) -> Result<(), TerminalError> {
        let mut sink = CommandSink::new();
        let baseline = match &self.prev {
            Some(p) if p.width == frame.width => Some(p),
            _ => None,
        };

        for (y, row) in frame.rows.iter().enumerate() {
            let y16 = y as u16;
            match baseline.and_then(|p| p.rows.get(y)) {
                Some(prev_row) if prev_row.hash == row.hash => {}
                Some(prev_row) => {
                    self.metrics.record_row_diffed();
                    self.emit_row_diff(&mut sink, y16, prev_row, row);
                }
                None => {
                    self.metrics.record_row_diffed();
                    self.rewrite_row(&mut sink, y16, row);
                }
            }
        }

        match baseline {
            Some(p) if p.rows.len() > frame.rows.len() => {
                sink.move_to(0, frame.rows.len() as u16);
                sink.clear_below();
                self.metrics
                    .record_rows_cleared((p.rows.len() - frame.rows.len()) as u64);
            }
            None => {
                // No baseline (first paint or post-invalidate): the prior
                // screen extent is unknown, so anything below the new frame
                // must be assumed stale.
                sink.move_to(0, frame.rows.len() as u16);
                sink.clear_below();
            }
            _ => {}
        }

        let writes = !sink.is_empty();
        if writes || self.prev_cursor != Some(cursor) {
            sink.move_to(cursor.col, cursor.row);
        }

        if sink.is_empty() {
            self.prev = Some(frame.clone());
            self.prev_cursor = Some(cursor);
            return Ok(());
        }

        tracing::trace!(
            target: "compose.diff",
            prints = sink.print_commands,
            cells = sink.cells_printed,
            "frame_flush"
        );
        sink.flush_into(out)?;
        self.prev = Some(frame.clone());
        self.prev_cursor = Some(cursor);
        Ok(())
    }

    /// Whole-row repaint: clear then print, trailing blanks elided.
    fn rewrite_row(&self, sink: &mut CommandSink, y: u16, row: &FrameRow) {
        self.metrics.record_row_rewritten();
        sink.move_to(0, y);
        sink.clear_line();
        let trimmed = trim_trailing_blanks(&row.cells);
        let (text, cells) = styled_text(trimmed);
        self.metrics.record_cells_rewritten(cells);
        sink.print(text, cells);
    }

    /// Patch a changed row: either rewrite it whole (when the changed-cell
    /// share crosses the configured threshold) or emit per-run updates
    /// snapped to leader boundaries.
    fn emit_row_diff(&self, sink: &mut CommandSink, y: u16, prev: &FrameRow, row: &FrameRow) {
        let width = row.cells.len();
        let mut changed = vec![false; width];
        let mut changed_count = 0u64;
        for x in 0..width {
            if prev.cells.get(x) != Some(&row.cells[x]) {
                changed[x] = true;
                changed_count += 1;
            }
        }
        if changed_count == 0 {
            // Hash collision between distinct rows would be caught here;
            // treat as unchanged.
            return;
        }

        let pct = changed_count * 100 / width as u64;
        if pct >= self.cfg.full_row_rewrite_pct as u64 {
            self.rewrite_row(sink, y, row);
            return;
        }

        snap_to_leaders(&mut changed, &row.cells);
        self.metrics.record_row_patched();

        let mut x = 0;
        while x < width {
            if !changed[x] {
                x += 1;
                continue;
            }
            let start = x;
            while x < width && changed[x] {
                x += 1;
            }
            sink.move_to(start as u16, y);
            let (text, cells) = styled_text(&row.cells[start..x]);
            self.metrics.record_cells_rewritten(cells);
            sink.print(text, cells);
        }
    }
}

/// ASCII-only terminals get a `?` placeholder per non-ASCII cluster; raw
/// multi-byte output on such a terminal desynchronizes column tracking.
fn sanitize_ascii(clusters: &mut [Cluster]) {
    for cl in clusters.iter_mut() {
        if !cl.text.is_ascii() {
            cl.text = "?".to_string();
            cl.width = 1;
        }
    }
}

/// Expand changed-cell marks so every run covers whole clusters: a marked
/// continuation pulls in its leader, and a marked leader pulls in its
/// continuations.
fn snap_to_leaders(changed: &mut [bool], cells: &[Cell]) {
    for x in 0..cells.len() {
        if !changed[x] {
            continue;
        }
        if cells[x].is_continuation() {
            let mut l = x;
            while l > 0 && cells[l].is_continuation() {
                l -= 1;
            }
            changed[l] = true;
        } else {
            let mut c = x + 1;
            while c < cells.len() && cells[c].is_continuation() {
                changed[c] = true;
                c += 1;
            }
        }
    }
    // Second pass for leaders marked by the continuation backfill above.
    for x in 0..cells.len() {
        if changed[x] && !cells[x].is_continuation() {
            let mut c = x + 1;
            while c < cells.len() && cells[c].is_continuation() {
                changed[c] = true;
                c += 1;
            }
        }
    }
}

fn trim_trailing_blanks(cells: &[Cell]) -> &[Cell] {
    let blank = Cell::blank();
    let mut end = cells.len();
    while end > 0 && cells[end - 1] == blank {
        end -= 1;
    }
    &cells[..end]
}

/// Render leader cells to a printable string with inline SGR changes, and
/// return the visual width covered.
fn styled_text(cells: &[Cell]) -> (String, u64) {
    let mut out = String::new();
    let mut current = CellStyle::empty();
    let mut width = 0u64;
    for c in cells {
        if c.is_continuation() {
            continue;
        }
        if c.style != current {
            out.push_str(&sgr_sequence(c.style));
            current = c.style;
        }
        out.push_str(&c.cluster);
        width += c.width as u64;
    }
    if !current.is_empty() {
        out.push_str("\x1b[0m");
    }
    (out, width)
}

/// SGR attribute sequence for a style, always reset-prefixed so runs are
/// position-independent.
fn sgr_sequence(style: CellStyle) -> String {
    let mut codes = vec!["0"];
    if style.contains(CellStyle::BOLD) {
        codes.push("1");
    }
    if style.contains(CellStyle::DIM) {
        codes.push("2");
    }
    if style.contains(CellStyle::UNDERLINE) {
        codes.push("4");
    }
    if style.contains(CellStyle::REVERSE) {
        codes.push("7");
    }
    format!("\x1b[{}m", codes.join(";"))
}
