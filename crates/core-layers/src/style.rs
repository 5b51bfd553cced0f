//! Styled text primitives shared by the layer model and the composer.
//!
//! A [`Cluster`] is one extended grapheme cluster plus its visual width and
//! style. Width bounding and wrapping operate on clusters, never on chars
//! or bytes, so combining marks, ZWJ sequences, and wide CJK/emoji clusters
//! are never split.
//!
//! Invariants:
//! * A cluster's width is at least 1 (zero-width input is promoted so every
//!   cluster occupies a column; the terminal has no zero-width cell).
//! * `wrap_clusters` never splits a cluster across a row boundary; a wide
//!   cluster that does not fit in the remaining columns starts a new row.

use bitflags::bitflags;
use unicode_segmentation::UnicodeSegmentation;
use unicode_width::UnicodeWidthStr;

bitflags! {
    /// Per-cell display attributes. Attribute-only (no color table) so the
    /// conservative capability fallback still renders every style.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CellStyle: u8 {
        const REVERSE   = 0b0000_0001;
        const BOLD      = 0b0000_0010;
        const DIM       = 0b0000_0100;
        const UNDERLINE = 0b0000_1000;
    }
}

/// A run of text sharing one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    pub text: String,
    pub style: CellStyle,
}

impl StyledSpan {
    pub fn plain<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            style: CellStyle::empty(),
        }
    }

    pub fn styled<S: Into<String>>(text: S, style: CellStyle) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// One logical display line as supplied by a collaborator.
pub type StyledLine = Vec<StyledSpan>;

/// One grapheme cluster ready for cell placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub text: String,
    pub width: u16,
    pub style: CellStyle,
}

/// Visual width of a string in terminal columns.
pub fn display_width(s: &str) -> u16 {
    s.width() as u16
}

/// Split a styled line into placement-ready clusters.
pub fn line_clusters(line: &[StyledSpan]) -> Vec<Cluster> {
    let mut out = Vec::new();
    for span in line {
        for g in span.text.graphemes(true) {
            out.push(Cluster {
                text: g.to_string(),
                width: display_width(g).max(1),
                style: span.style,
            });
        }
    }
    out
}

/// Greedy wrap at `width` columns. Returns at least one (possibly empty)
/// row so callers can rely on a non-empty row list.
pub fn wrap_clusters(clusters: &[Cluster], width: u16) -> Vec<Vec<Cluster>> {
    let width = width.max(1);
    let mut rows: Vec<Vec<Cluster>> = vec![Vec::new()];
    let mut col: u16 = 0;
    for cl in clusters {
        let w = cl.width.min(width);
        if col + w > width {
            rows.push(Vec::new());
            col = 0;
        }
        rows.last_mut().expect("rows never empty").push(cl.clone());
        col += w;
    }
    rows
}

/// Truncate a cluster sequence to `width` columns (menus clip, not wrap).
pub fn truncate_clusters(clusters: &[Cluster], width: u16) -> Vec<Cluster> {
    let mut out = Vec::new();
    let mut col: u16 = 0;
    for cl in clusters {
        if col + cl.width > width {
            break;
        }
        col += cl.width;
        out.push(cl.clone());
    }
    out
}
