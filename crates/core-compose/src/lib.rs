//! Frame model and composition engine.
//!
//! A [`Frame`] is the composed, width-exact cell grid for one redraw cycle.
//! Composition is pure (layers + geometry in, frame + cursor out); all
//! device effects live in [`engine::CompositionEngine::render`], which
//! diffs the new frame against the previously written one and queues the
//! minimal command set into a [`core_terminal::CommandSink`].
//!
//! Cell convention:
//! * A leader cell carries the full grapheme cluster and its visual width.
//! * A continuation cell (width 0, empty cluster) pads the extra columns of
//!   a wide cluster. Continuations are never printed; repaints snap to
//!   leader boundaries so a wide cluster is always rewritten whole.

pub mod config;
pub mod engine;
pub mod metrics;

pub use config::DiffConfig;
pub use engine::CompositionEngine;
pub use metrics::{ComposeMetrics, ComposeMetricsSnapshot};

use core_layers::{CellStyle, Cluster};
use std::hash::{BuildHasher, Hash, Hasher};

/// Fixed-seed hasher state so row hashes are comparable across frames and
/// across engine instances.
fn row_hasher() -> impl Hasher {
    ahash::RandomState::with_seeds(
        0x243f_6a88_85a3_08d3,
        0x1319_8a2e_0370_7344,
        0xa409_3822_299f_31d0,
        0x082e_fa98_ec4e_6c89,
    )
    .build_hasher()
}

/// One display cell. `width == 0` marks a continuation cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cell {
    pub cluster: String,
    pub width: u8,
    pub style: CellStyle,
}

impl Cell {
    pub fn blank() -> Self {
        Self {
            cluster: " ".to_string(),
            width: 1,
            style: CellStyle::empty(),
        }
    }

    fn continuation() -> Self {
        Self {
            cluster: String::new(),
            width: 0,
            style: CellStyle::empty(),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.width == 0
    }
}

/// One composed row, always exactly `width` cells, with a content hash for
/// cheap unchanged-row detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRow {
    pub cells: Vec<Cell>,
    pub hash: u64,
}

impl FrameRow {
    /// Build a row from placement-ready clusters, padding with blanks to
    /// exactly `width` columns. Clusters beyond `width` are clipped whole.
    pub fn from_clusters(clusters: &[Cluster], width: u16) -> Self {
        let width = width as usize;
        let mut cells = Vec::with_capacity(width);
        for cl in clusters {
            let w = cl.width as usize;
            if cells.len() + w > width {
                break;
            }
            cells.push(Cell {
                cluster: cl.text.clone(),
                width: cl.width as u8,
                style: cl.style,
            });
            for _ in 1..w {
                cells.push(Cell::continuation());
            }
        }
        while cells.len() < width {
            cells.push(Cell::blank());
        }
        let mut h = row_hasher();
        cells.hash(&mut h);
        Self {
            cells,
            hash: h.finish(),
        }
    }

    /// Concatenated leader text, for assertions and logging.
    pub fn text(&self) -> String {
        self.cells.iter().map(|c| c.cluster.as_str()).collect()
    }
}

/// Composed output of one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u16,
    pub rows: Vec<FrameRow>,
}

/// Final cursor position within the frame, (0,0) origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorTarget {
    pub row: u16,
    pub col: u16,
}
