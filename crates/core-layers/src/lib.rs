//! Layer model: the closed set of independently-owned display surfaces.
//!
//! Three layers exist per session — prompt, command content, overlay — each
//! holding its own content, a monotonically increasing version, a dirty
//! flag, and a visibility flag. Layers never read each other; every
//! cross-layer decision (stacking order, cursor resolution, dirty
//! aggregation) belongs to the composition and coordination crates above.
//!
//! Invariants:
//! * Any content or visibility mutation sets that layer's own dirty flag
//!   and bumps its version. A layer never decides whether a global redraw
//!   is warranted — that is the coordinator's aggregate-dirty rule.
//! * `rendered` is pure and idempotent: same content + width in, same rows
//!   out, no side effects.
//! * Dirty flags are cleared only by the coordinator after a successful
//!   composition, via `clear_dirty_and_snapshot_versions`.

pub mod style;

pub use style::{CellStyle, Cluster, StyledLine, StyledSpan};

use style::{line_clusters, truncate_clusters, wrap_clusters};

/// The closed set of layer kinds. Extensibility beyond these three is a
/// non-goal; a fixed enum keeps stacking and aggregation total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    Prompt,
    Content,
    Overlay,
}

/// Per-kind content payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerContent {
    Prompt {
        line: StyledLine,
    },
    /// Editable text plus the cursor as a byte offset into `text`. The
    /// offset is expected to lie on a grapheme boundary; the composer
    /// clamps defensively when it does not.
    Content {
        text: String,
        cursor: usize,
    },
    Overlay {
        rows: Vec<StyledLine>,
    },
}

impl LayerContent {
    pub fn kind(&self) -> LayerKind {
        match self {
            LayerContent::Prompt { .. } => LayerKind::Prompt,
            LayerContent::Content { .. } => LayerKind::Content,
            LayerContent::Overlay { .. } => LayerKind::Overlay,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Layer {
    kind: LayerKind,
    content: LayerContent,
    version: u64,
    dirty: bool,
    visible: bool,
}

impl Layer {
    pub fn new(kind: LayerKind) -> Self {
        let content = match kind {
            LayerKind::Prompt => LayerContent::Prompt { line: Vec::new() },
            LayerKind::Content => LayerContent::Content {
                text: String::new(),
                cursor: 0,
            },
            LayerKind::Overlay => LayerContent::Overlay { rows: Vec::new() },
        };
        Self {
            kind,
            content,
            version: 0,
            dirty: false,
            // The overlay starts hidden; prompt and content are always part
            // of the primary span.
            visible: kind != LayerKind::Overlay,
        }
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn content(&self) -> &LayerContent {
        &self.content
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Replace content, bump version, mark dirty. The payload kind must
    /// match the layer kind.
    pub fn set_content(&mut self, content: LayerContent) {
        debug_assert_eq!(content.kind(), self.kind, "layer payload kind mismatch");
        self.content = content;
        self.version += 1;
        self.dirty = true;
        tracing::trace!(target: "redraw.layers", kind = ?self.kind, version = self.version, "layer_content_set");
    }

    /// Visibility change counts as a mutation (version bump + dirty); a
    /// same-value set is a no-op.
    pub fn set_visible(&mut self, visible: bool) {
        if self.visible == visible {
            return;
        }
        self.visible = visible;
        self.version += 1;
        self.dirty = true;
        tracing::trace!(target: "redraw.layers", kind = ?self.kind, visible, "layer_visibility_set");
    }

    /// Externally force a repaint of this layer without touching content
    /// (geometry changes invalidate prior wrapping, not the content).
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Width-bounded rows of styled clusters. Pure: no side effects, same
    /// input always yields the same rows.
    pub fn rendered(&self, width: u16) -> Vec<Vec<Cluster>> {
        match &self.content {
            LayerContent::Prompt { line } => wrap_clusters(&line_clusters(line), width),
            LayerContent::Content { text, .. } => {
                wrap_clusters(&line_clusters(&[StyledSpan::plain(text.clone())]), width)
            }
            LayerContent::Overlay { rows } => rows
                .iter()
                .map(|r| truncate_clusters(&line_clusters(r), width))
                .collect(),
        }
    }
}

/// Collective owner of the full layer set. The composition engine reads
/// through this; the coordinator mutates and book-keeps through it.
#[derive(Debug)]
pub struct LayerSet {
    prompt: Layer,
    content: Layer,
    overlay: Layer,
}

impl Default for LayerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerSet {
    pub fn new() -> Self {
        Self {
            prompt: Layer::new(LayerKind::Prompt),
            content: Layer::new(LayerKind::Content),
            overlay: Layer::new(LayerKind::Overlay),
        }
    }

    pub fn prompt(&self) -> &Layer {
        &self.prompt
    }

    pub fn content(&self) -> &Layer {
        &self.content
    }

    pub fn overlay(&self) -> &Layer {
        &self.overlay
    }

    pub fn prompt_mut(&mut self) -> &mut Layer {
        &mut self.prompt
    }

    pub fn content_mut(&mut self) -> &mut Layer {
        &mut self.content
    }

    pub fn overlay_mut(&mut self) -> &mut Layer {
        &mut self.overlay
    }

    fn all(&self) -> [&Layer; 3] {
        [&self.prompt, &self.content, &self.overlay]
    }

    fn all_mut(&mut self) -> [&mut Layer; 3] {
        [&mut self.prompt, &mut self.content, &mut self.overlay]
    }

    /// The aggregate dirty rule: logical OR across the full set, never a
    /// privileged subset. An overlay-only change must trigger a recompose
    /// exactly like a content edit.
    pub fn any_dirty(&self) -> bool {
        self.all().iter().any(|l| l.is_dirty())
    }

    /// Geometry change path: prior wrapping and positioning are invalid for
    /// every layer.
    pub fn mark_all_dirty(&mut self) {
        for l in self.all_mut() {
            l.mark_dirty();
        }
    }

    /// Post-composition bookkeeping: clear every dirty flag and record the
    /// composed versions in one step. Single-threaded execution guarantees
    /// no mutation is observed mid-clear.
    pub fn clear_dirty_and_snapshot_versions(&mut self) -> [u64; 3] {
        let versions = self.versions();
        for l in self.all_mut() {
            l.clear_dirty();
        }
        versions
    }

    pub fn versions(&self) -> [u64; 3] {
        [
            self.prompt.version(),
            self.content.version(),
            self.overlay.version(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_content_bumps_version_and_dirties() {
        let mut layer = Layer::new(LayerKind::Content);
        assert!(!layer.is_dirty());
        layer.set_content(LayerContent::Content {
            text: "ab".into(),
            cursor: 2,
        });
        assert!(layer.is_dirty());
        assert_eq!(layer.version(), 1);
        layer.set_content(LayerContent::Content {
            text: "abc".into(),
            cursor: 3,
        });
        assert_eq!(layer.version(), 2);
    }

    #[test]
    fn visibility_toggle_dirties_only_on_change() {
        let mut overlay = Layer::new(LayerKind::Overlay);
        assert!(!overlay.is_visible());
        overlay.set_visible(false); // no-op
        assert!(!overlay.is_dirty());
        assert_eq!(overlay.version(), 0);
        overlay.set_visible(true);
        assert!(overlay.is_dirty());
        assert_eq!(overlay.version(), 1);
    }

    #[test]
    fn rendered_is_pure_and_width_bounded() {
        let mut layer = Layer::new(LayerKind::Content);
        layer.set_content(LayerContent::Content {
            text: "abcdef".into(),
            cursor: 0,
        });
        let a = layer.rendered(4);
        let b = layer.rendered(4);
        assert_eq!(a, b, "rendered must be idempotent");
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].len(), 4);
    }

    #[test]
    fn overlay_rows_truncate_not_wrap() {
        let mut overlay = Layer::new(LayerKind::Overlay);
        overlay.set_content(LayerContent::Overlay {
            rows: vec![vec![StyledSpan::plain("abcdef")]],
        });
        let rows = overlay.rendered(4);
        assert_eq!(rows.len(), 1, "overlay rows clip instead of wrapping");
        assert_eq!(rows[0].len(), 4);
    }

    #[test]
    fn aggregate_dirty_covers_every_layer() {
        let mut set = LayerSet::new();
        assert!(!set.any_dirty());
        set.overlay_mut().set_visible(true);
        assert!(
            set.any_dirty(),
            "overlay-only change must set the aggregate"
        );
        let versions = set.clear_dirty_and_snapshot_versions();
        assert!(!set.any_dirty());
        assert_eq!(versions, [0, 0, 1]);
    }

    #[test]
    fn mark_all_dirty_leaves_versions_untouched() {
        let mut set = LayerSet::new();
        set.mark_all_dirty();
        assert!(set.any_dirty());
        assert_eq!(set.versions(), [0, 0, 0]);
    }
}
