//! Multi-cycle compose-and-render scenarios against a captured byte buffer.

use core_compose::CompositionEngine;
use core_layers::{CellStyle, LayerContent, LayerSet, StyledSpan};
use core_terminal::{CapabilitySet, TermSnapshot};

fn snapshot(cols: u16, rows: u16) -> TermSnapshot {
    TermSnapshot {
        cols,
        rows,
        caps: CapabilitySet::conservative(),
        interactive: false,
    }
}

fn layers(text: &str, cursor: usize) -> LayerSet {
    let mut set = LayerSet::new();
    set.prompt_mut().set_content(LayerContent::Prompt {
        line: vec![StyledSpan::plain("> ")],
    });
    set.content_mut().set_content(LayerContent::Content {
        text: text.into(),
        cursor,
    });
    set
}

fn render_string(engine: &mut CompositionEngine, set: &LayerSet, snap: &TermSnapshot) -> String {
    let (frame, cursor) = engine.compose(set, snap);
    let mut out = Vec::new();
    engine.render(&frame, cursor, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

#[test]
fn typing_session_patches_only_appended_cells() {
    let mut engine = CompositionEngine::default();
    let snap = snapshot(80, 24);
    render_string(&mut engine, &layers("h", 1), &snap);

    let text = render_string(&mut engine, &layers("hi", 2), &snap);
    assert!(text.contains('i'));
    assert!(
        !text.contains("> h"),
        "prompt must not repaint per keystroke: {text:?}"
    );

    let text = render_string(&mut engine, &layers("hit", 3), &snap);
    assert!(text.contains('t'));
    let metrics = engine.metrics_snapshot();
    assert_eq!(metrics.rows_patched, 2);
    assert_eq!(metrics.rows_rewritten, 1, "only the initial paint rewrote");
}

#[test]
fn reflow_after_invalidation_clears_rows_vacated_by_prior_width() {
    let mut engine = CompositionEngine::default();
    let long = "x".repeat(90);
    // Two wrapped rows at width 80.
    let first = render_string(&mut engine, &layers(&long, 90), &snapshot(80, 24));
    assert!(!first.contains(&long));

    // Width change path: baseline dropped, content now fits one row, the
    // old second row must be cleared rather than trusted gone.
    engine.invalidate();
    let text = render_string(&mut engine, &layers(&long, 90), &snapshot(100, 30));
    assert!(text.contains(&long), "contiguous at the new width");
    assert!(
        text.contains("\x1b[2;1H\x1b[J"),
        "vacated second row cleared: {text:?}"
    );
}

#[test]
fn overlay_lifecycle_appends_then_clears() {
    let mut engine = CompositionEngine::default();
    let snap = snapshot(80, 24);
    let mut set = layers("ab", 2);
    render_string(&mut engine, &set, &snap);

    set.overlay_mut().set_content(LayerContent::Overlay {
        rows: vec![
            vec![StyledSpan::plain("alpha")],
            vec![StyledSpan::plain("beta")],
        ],
    });
    set.overlay_mut().set_visible(true);
    let text = render_string(&mut engine, &set, &snap);
    assert!(text.contains("alpha"));
    assert!(text.contains("beta"));

    set.overlay_mut().set_visible(false);
    let text = render_string(&mut engine, &set, &snap);
    assert!(text.contains("\x1b[J"), "overlay rows cleared on hide: {text:?}");
    assert!(!text.contains("alpha"), "no repaint of unchanged content");
}

#[test]
fn styled_overlay_row_emits_inline_attributes() {
    let mut engine = CompositionEngine::default();
    let snap = snapshot(80, 24);
    let mut set = layers("ab", 2);
    set.overlay_mut().set_content(LayerContent::Overlay {
        rows: vec![vec![StyledSpan::styled("sel", CellStyle::REVERSE)]],
    });
    set.overlay_mut().set_visible(true);
    let text = render_string(&mut engine, &set, &snap);
    assert!(text.contains("\x1b[0;7msel"), "{text:?}");
    assert!(text.contains("\x1b[0m"), "attributes reset after the run");
}
