use std::time::{Duration, Instant};

use folio_core::{
    Change, ComponentName, Editor, EditorConfig, FormatType, LayoutType, ListTag, SelectionPoint,
};
use folio_dom::{EditorView, NAME_ATTR, ViewError};

fn name(s: &str) -> ComponentName {
    ComponentName::new(s)
}

fn load(components: serde_json::Value) -> anyhow::Result<Editor> {
    let model = serde_json::json!({
        "sections": [{
            "component": "Section",
            "name": "s1",
            "components": [{"component": "Layout", "name": "l1", "components": components}]
        }]
    });
    let mut editor = Editor::with_defaults()?;
    editor.load_json(&model.to_string())?;
    Ok(editor)
}

fn paragraphs(texts: &[(&str, &str)]) -> anyhow::Result<Editor> {
    load(serde_json::Value::Array(
        texts
            .iter()
            .map(|(name, text)| serde_json::json!({"component": "Paragraph", "name": name, "text": text}))
            .collect(),
    ))
}

/// Renders the editor's document from scratch and checks that the view
/// kept in sync through change notifications shows the same tree.
fn sync_and_compare(view: &mut EditorView, editor: &mut Editor) -> anyhow::Result<()> {
    let changes = editor.take_changes();
    view.apply_changes(editor.doc(), &changes)?;
    let fresh = EditorView::new(editor.doc())?;
    assert_eq!(view.to_html(), fresh.to_html());
    for leaf in editor.doc().leaves()? {
        assert!(view.is_rendered(&leaf), "{leaf} missing from view");
    }
    Ok(())
}

#[test]
fn renders_structure_and_formats() -> anyhow::Result<()> {
    let editor = load(serde_json::json!([{
        "component": "Paragraph",
        "name": "p1",
        "text": "Hi there",
        "formats": [
            {"type": "strong", "from": 0, "to": 2},
            {"type": "a", "from": 3, "to": 8, "attrs": {"href": "https://x.test"}}
        ]
    }]))?;

    let view = EditorView::new(editor.doc())?;

    assert_eq!(
        view.to_html(),
        "<article><section name=\"s1\">\
         <div class=\"layout layout-single-column\" name=\"l1\">\
         <p name=\"p1\"><strong>Hi</strong> <a href=\"https://x.test\">there</a></p>\
         </div></section></article>"
    );
    Ok(())
}

#[test]
fn overlapping_formats_nest() -> anyhow::Result<()> {
    let editor = load(serde_json::json!([{
        "component": "Paragraph",
        "name": "p1",
        "text": "abcd",
        "formats": [
            {"type": "em", "from": 0, "to": 3},
            {"type": "strong", "from": 1, "to": 4}
        ]
    }]))?;

    let view = EditorView::new(editor.doc())?;
    let p1 = view.node_of(&name("p1")).unwrap();

    assert_eq!(
        view.dom().to_html(p1),
        "<p name=\"p1\"><em>a</em><em><strong>bc</strong></em><strong>d</strong></p>"
    );
    assert_eq!(view.read_paragraph_text(&name("p1"))?, "abcd");
    Ok(())
}

#[test]
fn edge_and_repeated_spaces_render_as_nbsp() -> anyhow::Result<()> {
    let editor = paragraphs(&[("p1", " a  b ")])?;

    let view = EditorView::new(editor.doc())?;
    let p1 = view.node_of(&name("p1")).unwrap();

    assert_eq!(view.dom().text_content(p1), "\u{a0}a\u{a0}\u{a0}b\u{a0}");
    assert_eq!(view.read_paragraph_text(&name("p1"))?, " a  b ");
    Ok(())
}

#[test]
fn empty_paragraph_keeps_marker_and_placeholder() -> anyhow::Result<()> {
    let config = EditorConfig {
        placeholder_text: Some("Tell your story".into()),
        ..EditorConfig::default()
    };
    let editor = Editor::new(config)?;
    let leaf = editor.doc().first_leaf_in_document()?.unwrap();

    let view = EditorView::new(editor.doc())?;
    let node = view.node_of(&leaf).unwrap();

    assert_eq!(view.dom().tag(node), Some("p"));
    assert_eq!(view.dom().attr(node, "placeholder"), Some("Tell your story"));
    assert_eq!(view.dom().text_content(node), "\u{200B}");
    assert_eq!(view.read_paragraph_text(&leaf)?, "");
    Ok(())
}

#[test]
fn figure_and_caption_render_with_own_markers() -> anyhow::Result<()> {
    let editor = load(serde_json::json!([
        {"component": "Paragraph", "name": "p1", "text": "Look"},
        {
            "component": "Figure",
            "name": "f1",
            "src": "cat.png",
            "width": 640,
            "caption": {"name": "c1", "text": "A cat", "paragraphType": "figcaption"}
        }
    ]))?;

    let view = EditorView::new(editor.doc())?;
    let figure = view.node_of(&name("f1")).unwrap();
    let caption = view.node_of(&name("c1")).unwrap();

    assert_eq!(
        view.dom().to_html(figure),
        "<figure name=\"f1\"><img src=\"cat.png\" width=\"640\">\
         <figcaption name=\"c1\">A cat</figcaption></figure>"
    );
    assert_eq!(view.dom().parent(caption), Some(figure));
    assert_eq!(view.read_paragraph_text(&name("c1"))?, "A cat");
    Ok(())
}

#[test]
fn typing_updates_the_paragraph_in_place() -> anyhow::Result<()> {
    let mut editor = paragraphs(&[("p1", "Hello"), ("p2", "world")])?;
    let mut view = EditorView::new(editor.doc())?;
    editor.take_changes();
    let p2_before = view.node_of(&name("p2"));

    editor.set_cursor(SelectionPoint::new("p1", 5))?;
    editor.type_text(" there")?;
    sync_and_compare(&mut view, &mut editor)?;

    assert_eq!(view.read_paragraph_text(&name("p1"))?, "Hello there");
    assert_eq!(view.node_of(&name("p2")), p2_before);
    Ok(())
}

#[test]
fn structural_edits_stay_in_sync() -> anyhow::Result<()> {
    let mut editor = paragraphs(&[("p1", "Hello world"), ("p2", "second")])?;
    let mut view = EditorView::new(editor.doc())?;
    editor.take_changes();

    editor.set_cursor(SelectionPoint::new("p1", 5))?;
    editor.handle_enter()?;
    sync_and_compare(&mut view, &mut editor)?;
    assert_eq!(editor.doc().leaves()?.len(), 3);

    editor.handle_backspace()?;
    sync_and_compare(&mut view, &mut editor)?;
    assert_eq!(view.read_paragraph_text(&name("p1"))?, "Hello world");

    editor.handle_enter()?;
    sync_and_compare(&mut view, &mut editor)?;

    editor.select(SelectionPoint::new("p1", 0), SelectionPoint::new("p1", 5))?;
    editor.format_selection(FormatType::Strong, None)?;
    sync_and_compare(&mut view, &mut editor)?;

    editor.toggle_list(ListTag::Ol)?;
    sync_and_compare(&mut view, &mut editor)?;

    editor.set_cursor(SelectionPoint::new("p2", 0))?;
    editor.set_layout_type(LayoutType::FullWidth)?;
    sync_and_compare(&mut view, &mut editor)?;
    assert!(view.to_html().contains("layout layout-full-width"));

    while editor.can_undo() {
        editor.undo()?;
        sync_and_compare(&mut view, &mut editor)?;
    }
    while editor.can_redo() {
        editor.redo()?;
        sync_and_compare(&mut view, &mut editor)?;
    }
    Ok(())
}

#[test]
fn figure_insertion_and_removal_stay_in_sync() -> anyhow::Result<()> {
    let mut editor = paragraphs(&[("p1", "Hello"), ("p2", "")])?;
    let mut view = EditorView::new(editor.doc())?;
    editor.take_changes();

    editor.set_cursor(SelectionPoint::new("p2", 0))?;
    let figure = editor.insert_figure("cat.png", None, None)?;
    sync_and_compare(&mut view, &mut editor)?;
    let node = view.node_of(&figure).unwrap();
    assert_eq!(view.dom().tag(node), Some("figure"));

    editor.handle_backspace()?;
    sync_and_compare(&mut view, &mut editor)?;
    assert!(!view.is_rendered(&figure));

    editor.undo()?;
    sync_and_compare(&mut view, &mut editor)?;
    assert!(view.is_rendered(&figure));
    Ok(())
}

#[test]
fn reset_rerenders_everything() -> anyhow::Result<()> {
    let mut editor = paragraphs(&[("p1", "old")])?;
    let mut view = EditorView::new(editor.doc())?;
    editor.take_changes();

    let model = serde_json::json!({
        "sections": [{"component": "Section", "name": "s9", "components": [
            {"component": "Layout", "name": "l9", "components": [
                {"component": "Paragraph", "name": "p9", "text": "new"}
            ]}
        ]}]
    });
    editor.load_json(&model.to_string())?;
    assert_eq!(editor.take_changes(), vec![Change::Reset]);
    view.apply_changes(editor.doc(), &[Change::Reset])?;

    assert!(!view.is_rendered(&name("p1")));
    assert_eq!(view.read_paragraph_text(&name("p9"))?, "new");
    Ok(())
}

#[test]
fn removing_an_unrendered_component_is_tolerated() -> anyhow::Result<()> {
    let editor = paragraphs(&[("p1", "text")])?;
    let mut view = EditorView::new(editor.doc())?;
    let before = view.to_html();

    view.apply_changes(
        editor.doc(),
        &[Change::Removed {
            component: name("gone"),
            container: Some(name("l1")),
            index: 3,
        }],
    )?;

    assert_eq!(view.to_html(), before);
    Ok(())
}

#[test]
fn dom_text_feeds_debounced_input() -> anyhow::Result<()> {
    let mut editor = paragraphs(&[("p1", "Hello")])?;
    let mut view = EditorView::new(editor.doc())?;
    editor.take_changes();
    let start = Instant::now();

    view.replace_dom_text(&name("p1"), "Hello\u{a0}there")?;
    let shown = view.read_paragraph_text(&name("p1"))?;
    assert_eq!(shown, "Hello there");
    editor.on_dom_input(&name("p1"), &shown, 11, start)?;
    assert!(editor.tick(start + Duration::from_secs(1))?);

    assert_eq!(editor.doc().paragraph(&name("p1"))?.text(), "Hello there");
    sync_and_compare(&mut view, &mut editor)?;
    Ok(())
}

#[test]
fn reading_an_unrendered_paragraph_fails() -> anyhow::Result<()> {
    let editor = paragraphs(&[("p1", "text")])?;
    let view = EditorView::new(editor.doc())?;

    let err = view.read_paragraph_text(&name("nope")).unwrap_err();
    assert!(matches!(err, ViewError::NotRendered(n) if n == name("nope")));
    Ok(())
}

#[test]
fn every_component_root_carries_its_name() -> anyhow::Result<()> {
    let editor = paragraphs(&[("p1", "one"), ("p2", "two")])?;
    let view = EditorView::new(editor.doc())?;

    for component in ["s1", "l1", "p1", "p2"] {
        let node = view.node_of(&name(component)).unwrap();
        assert_eq!(view.dom().attr(node, NAME_ATTR), Some(component));
    }
    Ok(())
}
