use folio_core::{
    ComponentKind, ComponentName, Document, Editor, Selection, SelectionPoint, char_len,
    normalize_text,
};
use tracing::trace;

use crate::dom::NodeId;
use crate::error::{Result, ViewError};
use crate::render::{EditorView, NAME_ATTR};

/// A position in the rendered tree. For text nodes `offset` counts
/// characters, for elements it counts children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomPoint {
    pub node: NodeId,
    pub offset: usize,
}

impl DomPoint {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// Browser-style selection: `anchor` is where the drag started and may
/// come after `focus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomRange {
    pub anchor: DomPoint,
    pub focus: DomPoint,
}

impl DomRange {
    pub fn collapsed(point: DomPoint) -> Self {
        Self {
            anchor: point,
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

impl EditorView {
    pub fn window_selection(&self) -> Option<&DomRange> {
        self.window_selection.as_ref()
    }

    /// Sets the tree selection directly, as a user click or drag would.
    pub fn set_window_selection(&mut self, range: Option<DomRange>) -> Result<()> {
        if let Some(range) = &range {
            for point in [range.anchor, range.focus] {
                if !self.dom.contains(point.node) {
                    return Err(ViewError::UnknownNode(point.node));
                }
            }
        }
        self.window_selection = range;
        Ok(())
    }

    /// Pushes the model selection into the tree selection.
    pub fn update_window_selection_from_model(&mut self, selection: &Selection) -> Result<()> {
        let (Some(start), Some(end)) = (&selection.start, &selection.end) else {
            self.window_selection = None;
            return Ok(());
        };
        let anchor = self.dom_point(start)?;
        let focus = if start == end {
            anchor
        } else {
            self.dom_point(end)?
        };
        self.window_selection = Some(DomRange { anchor, focus });
        Ok(())
    }

    /// Resolves a model point to the text node holding that character.
    pub fn dom_point(&self, point: &SelectionPoint) -> Result<DomPoint> {
        let marker = self
            .node_of(&point.component)
            .ok_or_else(|| ViewError::NotRendered(point.component.clone()))?;
        let text_nodes = self.own_text_nodes(marker);
        if text_nodes.is_empty() {
            let children = self.dom.children(marker).len();
            return Ok(DomPoint::new(marker, point.offset.min(children)));
        }

        let mut walked = 0;
        for id in &text_nodes {
            let text = self.dom.text(*id).unwrap_or_default();
            let len = model_len(text);
            if point.offset <= walked + len {
                let offset = dom_offset(text, point.offset - walked);
                return Ok(DomPoint::new(*id, offset));
            }
            walked += len;
        }
        Err(ViewError::OffsetOutOfRange {
            component: point.component.clone(),
            offset: point.offset,
        })
    }

    /// Reads the tree selection back as a model selection, ordered so that
    /// `start` never follows `end`.
    pub fn selection_from_window(&self, doc: &Document) -> Result<Option<Selection>> {
        let Some(range) = self.window_selection else {
            return Ok(None);
        };
        let anchor = self.model_point(doc, range.anchor)?;
        let focus = self.model_point(doc, range.focus)?;
        let mut selection = Selection::default();
        selection.select(doc, anchor, focus)?;
        Ok(Some(selection))
    }

    /// Copies the tree selection into the editor. Returns false when there
    /// is no tree selection.
    pub fn update_selection_from_window(&self, editor: &mut Editor) -> Result<bool> {
        let Some(selection) = self.selection_from_window(editor.doc())? else {
            return Ok(false);
        };
        let (Some(start), Some(end)) = (selection.start, selection.end) else {
            return Ok(false);
        };
        trace!(?start, ?end, "selection from window");
        editor.select(start, end)?;
        Ok(true)
    }

    /// Resolves a tree position to a model point. Positions on a container
    /// move to the boundary of its first or last leaf.
    pub fn model_point(&self, doc: &Document, point: DomPoint) -> Result<SelectionPoint> {
        let marker = self
            .marker_of(point.node)
            .ok_or(ViewError::Detached(point.node))?;
        let name = self
            .dom
            .attr(marker, NAME_ATTR)
            .map(ComponentName::from)
            .ok_or(ViewError::Detached(point.node))?;
        let component = doc.resolve(&name)?;

        match component.kind() {
            ComponentKind::Paragraph(paragraph) => {
                let offset = self.text_offset(marker, point).min(paragraph.len());
                Ok(SelectionPoint::new(name, offset))
            }
            ComponentKind::Figure(_) | ComponentKind::Embed(_) => {
                let offset = usize::from(point.node == marker && point.offset > 0);
                Ok(SelectionPoint::new(name, offset))
            }
            kind => {
                let children = kind.container().map(|c| c.components()).unwrap_or_default();
                let inside = point.node == marker && point.offset < children.len();
                let leaf = if inside {
                    doc.first_leaf(&children[point.offset])?
                } else if point.node == marker {
                    doc.last_leaf(&name)?
                } else {
                    doc.first_leaf(&name)?
                };
                let leaf = leaf.ok_or(ViewError::Detached(point.node))?;
                let offset = if inside || point.node != marker {
                    0
                } else {
                    doc.get_length(&leaf)?
                };
                Ok(SelectionPoint::new(leaf, offset))
            }
        }
    }

    /// Model characters before `point` within the component at `marker`.
    fn text_offset(&self, marker: NodeId, point: DomPoint) -> usize {
        let order = self.dom.descendants(marker);
        let position = |id: NodeId| order.iter().position(|n| *n == id);

        let (boundary, partial) = if self.dom.is_text(point.node) {
            let text = self.dom.text(point.node).unwrap_or_default();
            let prefix: String = text.chars().take(point.offset).collect();
            (position(point.node), model_len(&prefix))
        } else {
            let boundary = match self.dom.children(point.node).get(point.offset) {
                Some(child) => position(*child),
                None => position(point.node).map(|p| p + self.dom.descendants(point.node).len()),
            };
            (boundary, 0)
        };
        let boundary = boundary.unwrap_or(order.len());

        let before: usize = self
            .own_text_nodes(marker)
            .into_iter()
            .filter(|id| position(*id).is_some_and(|p| p < boundary))
            .map(|id| model_len(self.dom.text(id).unwrap_or_default()))
            .sum();
        before + partial
    }
}

fn model_len(text: &str) -> usize {
    char_len(&normalize_text(text))
}

/// Character offset in a rendered text node after `model_offset` model
/// characters, skipping rendering markers.
fn dom_offset(text: &str, model_offset: usize) -> usize {
    let mut seen = 0;
    for (ix, ch) in text.chars().enumerate() {
        if seen == model_offset {
            return ix;
        }
        if ch != folio_core::ZERO_WIDTH_SPACE {
            seen += 1;
        }
    }
    char_len(text)
}
