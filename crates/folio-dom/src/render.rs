use std::collections::HashMap;

use tracing::{debug, trace, warn};

use folio_core::{
    Change, ComponentKind, ComponentName, Document, Format, NON_BREAKING_SPACE, Paragraph,
    ZERO_WIDTH_SPACE, normalize_text,
};

use crate::dom::{DomTree, NodeId};
use crate::error::{Result, ViewError};
use crate::selection::DomRange;

/// Attribute carrying the component name on every rendered component root.
pub const NAME_ATTR: &str = "name";
pub const PLACEHOLDER_ATTR: &str = "placeholder";

/// Projection of a document into a [`DomTree`].
///
/// Every component renders to one element marked with [`NAME_ATTR`];
/// `nodes` maps names back to those elements. The view never mutates the
/// document, it follows it through [`Change`] notifications.
#[derive(Debug, Default)]
pub struct EditorView {
    pub(crate) dom: DomTree,
    pub(crate) nodes: HashMap<ComponentName, NodeId>,
    pub(crate) window_selection: Option<DomRange>,
}

impl EditorView {
    pub fn new(doc: &Document) -> Result<Self> {
        let mut view = Self::default();
        view.render(doc)?;
        Ok(view)
    }

    pub fn dom(&self) -> &DomTree {
        &self.dom
    }

    pub fn node_of(&self, name: &ComponentName) -> Option<NodeId> {
        self.nodes.get(name).copied()
    }

    pub fn is_rendered(&self, name: &ComponentName) -> bool {
        self.nodes.contains_key(name)
    }

    pub fn to_html(&self) -> String {
        self.dom.to_html(self.dom.root())
    }

    /// Throws away the current tree and renders `doc` from scratch.
    pub fn render(&mut self, doc: &Document) -> Result<()> {
        let root = self.dom.root();
        self.dom.clear_children(root)?;
        self.nodes.clear();
        self.window_selection = None;
        for section in doc.sections() {
            let node = self.render_component(doc, section)?;
            self.dom.append_child(root, node)?;
        }
        debug!(components = self.nodes.len(), "rendered document");
        Ok(())
    }

    /// Brings the tree in line with `doc` after the given changes were
    /// applied to it. Changes are replayed in order against the final
    /// document, so a component is always rendered from its latest state.
    pub fn apply_changes(&mut self, doc: &Document, changes: &[Change]) -> Result<()> {
        for change in changes {
            trace!(?change, "sync view");
            match change {
                Change::Reset => self.render(doc)?,
                Change::Inserted {
                    component,
                    container,
                    ..
                } => self.insert(doc, component, container.as_ref())?,
                Change::Removed { component, .. } => match self.nodes.get(component).copied() {
                    Some(node) => self.remove_node(node)?,
                    None => warn!(%component, "removed component was not rendered"),
                },
                Change::Updated { component } => {
                    if doc.contains(component) && self.is_rendered(component) {
                        self.rerender(doc, component)?;
                    }
                }
            }
        }
        let stale = self.window_selection.as_ref().is_some_and(|range| {
            !self.dom.contains(range.anchor.node) || !self.dom.contains(range.focus.node)
        });
        if stale {
            self.window_selection = None;
        }
        Ok(())
    }

    fn insert(
        &mut self,
        doc: &Document,
        name: &ComponentName,
        container: Option<&ComponentName>,
    ) -> Result<()> {
        // Moved or removed later in the batch; a later change covers it.
        let current = doc.get_reference(name).map(|c| c.section());
        if current != Some(container) {
            trace!(%name, "inserted component has moved on");
            return Ok(());
        }
        let parent = match container {
            None => self.dom.root(),
            Some(container) => match self.nodes.get(container) {
                Some(node) => *node,
                // Rendered with its container once that one is inserted.
                None => return Ok(()),
            },
        };
        if let Some(existing) = self.nodes.get(name).copied() {
            self.remove_node(existing)?;
        }

        // Siblings may still be missing while a batch is replayed, so the
        // slot is counted among the rendered ones.
        let mut index = 0;
        for sibling in doc.children_of(container)? {
            if sibling == name {
                break;
            }
            if let Some(node) = self.nodes.get(sibling) {
                if self.dom.parent(*node) == Some(parent) {
                    index += 1;
                }
            }
        }
        let node = self.render_component(doc, name)?;
        self.dom.insert_child(parent, index, node)
    }

    fn rerender(&mut self, doc: &Document, name: &ComponentName) -> Result<()> {
        let old = self
            .nodes
            .get(name)
            .copied()
            .ok_or_else(|| ViewError::NotRendered(name.clone()))?;
        self.forget(old);
        let new = self.render_component(doc, name)?;
        self.dom.replace(old, new)
    }

    fn remove_node(&mut self, node: NodeId) -> Result<()> {
        self.forget(node);
        self.dom.remove(node)
    }

    /// Drops the name mappings of `node` and every component below it.
    fn forget(&mut self, node: NodeId) {
        for id in self.dom.descendants(node) {
            if let Some(name) = self.dom.attr(id, NAME_ATTR) {
                let name = ComponentName::from(name);
                if self.nodes.get(&name) == Some(&id) {
                    self.nodes.remove(&name);
                }
            }
        }
    }

    fn render_component(&mut self, doc: &Document, name: &ComponentName) -> Result<NodeId> {
        let component = doc.resolve(name)?;
        let node = match component.kind() {
            ComponentKind::Section(children) => {
                let node = self.dom.create_element("section");
                self.render_children(doc, node, children.components())?;
                node
            }
            ComponentKind::Layout {
                layout_type,
                children,
            } => {
                let node = self.dom.create_element("div");
                self.dom
                    .set_attr(node, "class", format!("layout {}", layout_type.class_name()))?;
                self.render_children(doc, node, children.components())?;
                node
            }
            ComponentKind::List { tag, children } => {
                let node = self.dom.create_element(tag.tag());
                self.render_children(doc, node, children.components())?;
                node
            }
            ComponentKind::Paragraph(paragraph) => {
                let node = self.dom.create_element(paragraph.paragraph_type().tag());
                self.render_paragraph(node, paragraph)?;
                node
            }
            ComponentKind::Figure(figure) => {
                let node = self.dom.create_element("figure");
                let img = self.dom.create_element("img");
                self.dom.set_attr(img, "src", figure.src.as_str())?;
                if let Some(width) = figure.width {
                    self.dom.set_attr(img, "width", width.to_string())?;
                }
                if let Some(height) = figure.height {
                    self.dom.set_attr(img, "height", height.to_string())?;
                }
                self.dom.append_child(node, img)?;
                let caption = self.render_component(doc, figure.caption.paragraph())?;
                self.dom.append_child(node, caption)?;
                node
            }
            ComponentKind::Embed(embed) => {
                let node = self.dom.create_element("figure");
                self.dom.set_attr(node, "class", "embed")?;
                self.dom.set_attr(node, "data-url", embed.url.as_str())?;
                if let Some(provider) = &embed.provider {
                    self.dom.set_attr(node, "data-provider", provider.as_str())?;
                }
                let caption = self.render_component(doc, embed.caption.paragraph())?;
                self.dom.append_child(node, caption)?;
                node
            }
        };
        self.dom.set_attr(node, NAME_ATTR, name.as_str())?;
        self.nodes.insert(name.clone(), node);
        Ok(node)
    }

    fn render_children(
        &mut self,
        doc: &Document,
        parent: NodeId,
        children: &[ComponentName],
    ) -> Result<()> {
        for child in children {
            let node = self.render_component(doc, child)?;
            self.dom.append_child(parent, node)?;
        }
        Ok(())
    }

    fn render_paragraph(&mut self, node: NodeId, paragraph: &Paragraph) -> Result<()> {
        if paragraph.is_empty() {
            let marker = self.dom.create_text(&ZERO_WIDTH_SPACE.to_string());
            self.dom.append_child(node, marker)?;
            if let Some(placeholder) = paragraph.placeholder_text() {
                self.dom.set_attr(node, PLACEHOLDER_ATTR, placeholder)?;
            }
            return Ok(());
        }

        let chars = display_chars(paragraph.text());
        for (from, to) in segments(chars.len(), paragraph.formats()) {
            let text: String = chars[from..to].iter().collect();
            let mut inner = self.dom.create_text(&text);
            // Innermost first so the first format ends up outermost.
            for format in paragraph
                .formats()
                .iter()
                .rev()
                .filter(|f| f.from <= from && f.to >= to)
            {
                let element = self.dom.create_element(format.kind.tag());
                for (key, value) in format.attrs.iter().flatten() {
                    self.dom.set_attr(element, key, value.as_str())?;
                }
                self.dom.append_child(element, inner)?;
                inner = element;
            }
            self.dom.append_child(node, inner)?;
        }
        Ok(())
    }

    /// Model text of a rendered paragraph as currently shown in the tree.
    pub fn read_paragraph_text(&self, name: &ComponentName) -> Result<String> {
        let node = self
            .node_of(name)
            .ok_or_else(|| ViewError::NotRendered(name.clone()))?;
        let mut text = String::new();
        for id in self.own_text_nodes(node) {
            text.push_str(self.dom.text(id).unwrap_or_default());
        }
        Ok(normalize_text(&text))
    }

    /// Replaces the visible text of a rendered paragraph, the way a user
    /// typing into it would. The model is not touched.
    pub fn replace_dom_text(&mut self, name: &ComponentName, text: &str) -> Result<NodeId> {
        let node = self
            .node_of(name)
            .ok_or_else(|| ViewError::NotRendered(name.clone()))?;
        self.dom.clear_children(node)?;
        let text = self.dom.create_text(text);
        self.dom.append_child(node, text)?;
        Ok(text)
    }

    /// Text nodes belonging to the component rendered at `marker`, skipping
    /// nested components such as captions.
    pub(crate) fn own_text_nodes(&self, marker: NodeId) -> Vec<NodeId> {
        self.dom
            .text_nodes(marker)
            .into_iter()
            .filter(|id| self.marker_of(*id) == Some(marker))
            .collect()
    }

    /// Closest ancestor element carrying a component name.
    pub(crate) fn marker_of(&self, node: NodeId) -> Option<NodeId> {
        self.dom
            .closest(node, |id| self.dom.attr(id, NAME_ATTR).is_some())
    }
}

/// Characters as displayed: a space at either edge or next to another
/// space becomes a non-breaking space so it survives whitespace collapsing.
/// The mapping is one character to one character.
fn display_chars(text: &str) -> Vec<char> {
    let chars: Vec<char> = text.chars().collect();
    let last = chars.len().saturating_sub(1);
    chars
        .iter()
        .enumerate()
        .map(|(ix, ch)| {
            let collapsible = *ch == ' '
                && (ix == 0
                    || ix == last
                    || chars[ix - 1] == ' '
                    || chars.get(ix + 1) == Some(&' '));
            if collapsible { NON_BREAKING_SPACE } else { *ch }
        })
        .collect()
}

/// Splits `[0, len)` at every format boundary.
fn segments(len: usize, formats: &[Format]) -> Vec<(usize, usize)> {
    let mut bounds = vec![0, len];
    for format in formats {
        bounds.push(format.from.min(len));
        bounds.push(format.to.min(len));
    }
    bounds.sort_unstable();
    bounds.dedup();
    bounds
        .windows(2)
        .map(|pair| (pair[0], pair[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::FormatType;

    #[test]
    fn spaces_at_edges_and_runs_become_nbsp() {
        let shown: String = display_chars(" a  b c ").into_iter().collect();
        assert_eq!(shown, "\u{a0}a\u{a0}\u{a0}b c\u{a0}");
        assert_eq!(normalize_text(&shown), " a  b c ");
    }

    #[test]
    fn segments_split_at_format_boundaries() {
        let formats = vec![
            Format::new(FormatType::Strong, 0, 5),
            Format::new(FormatType::Emphasis, 3, 8),
        ];
        assert_eq!(segments(10, &formats), vec![(0, 3), (3, 5), (5, 8), (8, 10)]);
        assert_eq!(segments(4, &[]), vec![(0, 4)]);
    }
}
