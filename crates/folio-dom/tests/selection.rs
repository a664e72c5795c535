use folio_core::{ComponentName, Editor, Selection, SelectionPoint};
use folio_dom::{DomPoint, DomRange, EditorView, ViewError};

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

fn formatted() -> anyhow::Result<Editor> {
    load(serde_json::json!([
        {
            "component": "Paragraph",
            "name": "p1",
            "text": "Hi there",
            "formats": [
                {"type": "strong", "from": 0, "to": 2},
                {"type": "a", "from": 3, "to": 8, "attrs": {"href": "https://x.test"}}
            ]
        },
        {"component": "Paragraph", "name": "p2", "text": "next"}
    ]))
}

fn range(start: (&str, usize), end: (&str, usize)) -> Selection {
    Selection {
        start: Some(SelectionPoint::new(start.0, start.1)),
        end: Some(SelectionPoint::new(end.0, end.1)),
    }
}

#[test]
fn model_offsets_resolve_into_format_text_nodes() -> anyhow::Result<()> {
    let editor = formatted()?;
    let mut view = EditorView::new(editor.doc())?;

    view.update_window_selection_from_model(&range(("p1", 1), ("p1", 5)))?;
    let window = *view.window_selection().unwrap();

    assert_eq!(view.dom().text(window.anchor.node), Some("Hi"));
    assert_eq!(window.anchor.offset, 1);
    assert_eq!(view.dom().text(window.focus.node), Some("there"));
    assert_eq!(window.focus.offset, 2);
    Ok(())
}

#[test]
fn boundary_offset_stays_in_the_earlier_node() -> anyhow::Result<()> {
    let editor = formatted()?;
    let view = EditorView::new(editor.doc())?;

    let point = view.dom_point(&SelectionPoint::new("p1", 2))?;
    assert_eq!(view.dom().text(point.node), Some("Hi"));
    assert_eq!(point.offset, 2);

    let end = view.dom_point(&SelectionPoint::new("p1", 8))?;
    assert_eq!(view.dom().text(end.node), Some("there"));
    assert_eq!(end.offset, 5);
    Ok(())
}

#[test]
fn offset_past_the_text_is_rejected() -> anyhow::Result<()> {
    let editor = formatted()?;
    let view = EditorView::new(editor.doc())?;

    let err = view.dom_point(&SelectionPoint::new("p1", 9)).unwrap_err();
    assert!(matches!(err, ViewError::OffsetOutOfRange { offset: 9, .. }));
    Ok(())
}

#[test]
fn backwards_drag_is_normalized() -> anyhow::Result<()> {
    let mut editor = formatted()?;
    let mut view = EditorView::new(editor.doc())?;
    view.update_window_selection_from_model(&range(("p1", 1), ("p2", 3)))?;
    let forward = *view.window_selection().unwrap();

    view.set_window_selection(Some(DomRange {
        anchor: forward.focus,
        focus: forward.anchor,
    }))?;
    assert!(view.update_selection_from_window(&mut editor)?);

    assert_eq!(editor.selection(), &range(("p1", 1), ("p2", 3)));
    Ok(())
}

#[test]
fn element_offsets_count_preceding_text() -> anyhow::Result<()> {
    let editor = formatted()?;
    let view = EditorView::new(editor.doc())?;
    let p1 = view.node_of(&name("p1")).unwrap();

    // Children of p1: <strong>, " ", <a>.
    let point = view.model_point(editor.doc(), DomPoint::new(p1, 1))?;
    assert_eq!(point, SelectionPoint::new("p1", 2));

    let end = view.model_point(editor.doc(), DomPoint::new(p1, 3))?;
    assert_eq!(end, SelectionPoint::new("p1", 8));
    Ok(())
}

#[test]
fn container_points_descend_to_leaf_boundaries() -> anyhow::Result<()> {
    let editor = formatted()?;
    let view = EditorView::new(editor.doc())?;
    let layout = view.node_of(&name("l1")).unwrap();
    let section = view.node_of(&name("s1")).unwrap();

    assert_eq!(
        view.model_point(editor.doc(), DomPoint::new(layout, 1))?,
        SelectionPoint::new("p2", 0)
    );
    assert_eq!(
        view.model_point(editor.doc(), DomPoint::new(layout, 2))?,
        SelectionPoint::new("p2", 4)
    );
    assert_eq!(
        view.model_point(editor.doc(), DomPoint::new(section, 0))?,
        SelectionPoint::new("p1", 0)
    );
    Ok(())
}

#[test]
fn empty_paragraph_maps_through_its_marker() -> anyhow::Result<()> {
    let mut editor = Editor::with_defaults()?;
    let leaf = editor.doc().first_leaf_in_document()?.unwrap();
    let mut view = EditorView::new(editor.doc())?;

    view.update_window_selection_from_model(editor.selection())?;
    let window = *view.window_selection().unwrap();
    assert!(window.is_collapsed());
    assert_eq!(view.dom().text(window.anchor.node), Some("\u{200B}"));
    assert_eq!(window.anchor.offset, 0);

    // A caret after the marker is still offset 0 in the model.
    view.set_window_selection(Some(DomRange::collapsed(DomPoint::new(
        window.anchor.node,
        1,
    ))))?;
    assert!(view.update_selection_from_window(&mut editor)?);
    assert_eq!(
        editor.selection(),
        &Selection::collapsed(SelectionPoint::new(leaf, 0))
    );
    Ok(())
}

#[test]
fn caption_text_maps_to_the_caption() -> anyhow::Result<()> {
    let editor = load(serde_json::json!([
        {"component": "Paragraph", "name": "p1", "text": "Look"},
        {
            "component": "Figure",
            "name": "f1",
            "src": "cat.png",
            "caption": {"name": "c1", "text": "A cat", "paragraphType": "figcaption"}
        }
    ]))?;
    let view = EditorView::new(editor.doc())?;

    let point = view.dom_point(&SelectionPoint::new("c1", 2))?;
    assert_eq!(view.dom().text(point.node), Some("A cat"));
    assert_eq!(
        view.model_point(editor.doc(), point)?,
        SelectionPoint::new("c1", 2)
    );

    let figure = view.node_of(&name("f1")).unwrap();
    assert_eq!(
        view.model_point(editor.doc(), DomPoint::new(figure, 1))?,
        SelectionPoint::new("f1", 1)
    );
    Ok(())
}

#[test]
fn nbsp_rendered_spaces_keep_offsets() -> anyhow::Result<()> {
    let editor = load(serde_json::json!([
        {"component": "Paragraph", "name": "p1", "text": "a  b "}
    ]))?;
    let view = EditorView::new(editor.doc())?;

    let point = view.dom_point(&SelectionPoint::new("p1", 4))?;
    assert_eq!(point.offset, 4);
    assert_eq!(
        view.model_point(editor.doc(), DomPoint::new(point.node, 5))?,
        SelectionPoint::new("p1", 5)
    );
    Ok(())
}

#[test]
fn no_window_selection_leaves_the_model_alone() -> anyhow::Result<()> {
    let mut editor = formatted()?;
    let view = EditorView::new(editor.doc())?;
    let before = editor.selection().clone();

    assert!(!view.update_selection_from_window(&mut editor)?);
    assert_eq!(editor.selection(), &before);
    Ok(())
}

#[test]
fn rerender_drops_a_stale_window_selection() -> anyhow::Result<()> {
    let mut editor = formatted()?;
    let mut view = EditorView::new(editor.doc())?;
    editor.take_changes();
    view.update_window_selection_from_model(&range(("p1", 1), ("p1", 1)))?;
    let stale = view.window_selection().unwrap().anchor;

    editor.set_cursor(SelectionPoint::new("p1", 0))?;
    editor.type_text("Oh ")?;
    let changes = editor.take_changes();
    view.apply_changes(editor.doc(), &changes)?;

    assert!(view.window_selection().is_none());
    assert!(matches!(
        view.set_window_selection(Some(DomRange::collapsed(stale))),
        Err(ViewError::UnknownNode(_))
    ));

    view.update_window_selection_from_model(editor.selection())?;
    let window = *view.window_selection().unwrap();
    assert_eq!(
        view.model_point(editor.doc(), window.anchor)?,
        SelectionPoint::new("p1", 3)
    );
    Ok(())
}
