use std::collections::BTreeMap;

use crate::error::{Result, ViewError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Element {
        tag: String,
        attrs: BTreeMap<String, String>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Minimal element/text tree standing in for the browser DOM.
///
/// Nodes live in an arena; removing a node frees its whole subtree and
/// its id is never handed out again.
#[derive(Debug, Clone)]
pub struct DomTree {
    nodes: Vec<Option<Node>>,
    root: NodeId,
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new("article")
    }
}

impl DomTree {
    pub fn new(root_tag: &str) -> Self {
        let root = Node {
            data: NodeData::Element {
                tag: root_tag.to_string(),
                attrs: BTreeMap::new(),
            },
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![Some(root)],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.get(id.0).is_some_and(Option::is_some)
    }

    fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(ViewError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(ViewError::UnknownNode(id))
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(Node {
            data,
            parent: None,
            children: Vec::new(),
        }));
        id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element {
            tag: tag.to_string(),
            attrs: BTreeMap::new(),
        })
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push(NodeData::Text(text.to_string()))
    }

    pub fn data(&self, id: NodeId) -> Result<&NodeData> {
        Ok(&self.node(id)?.data)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|node| node.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.node(id) {
            Ok(node) => &node.children,
            Err(_) => &[],
        }
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|c| *c == id)
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).ok()?.data {
            NodeData::Element { tag, .. } => Some(tag),
            NodeData::Text(_) => None,
        }
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        matches!(self.data(id), Ok(NodeData::Text(_)))
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.node(id).ok()?.data {
            NodeData::Text(text) => Some(text),
            NodeData::Element { .. } => None,
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match &self.node(id).ok()?.data {
            NodeData::Element { attrs, .. } => attrs.get(name).map(String::as_str),
            NodeData::Text(_) => None,
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: impl Into<String>) -> Result<()> {
        if let NodeData::Element { attrs, .. } = &mut self.node_mut(id)?.data {
            attrs.insert(name.to_string(), value.into());
        }
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let len = self.children(parent).len();
        self.insert_child(parent, len, child)
    }

    /// Inserts `child` at `index` (clamped) among `parent`'s children,
    /// detaching it from its previous parent first.
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<()> {
        self.node(parent)?;
        self.detach(child)?;
        let node = self.node_mut(parent)?;
        let index = index.min(node.children.len());
        node.children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Puts `new` where `old` is and frees `old`.
    pub fn replace(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        let parent = self.parent(old);
        let index = self.index_in_parent(old);
        self.remove(old)?;
        if let (Some(parent), Some(index)) = (parent, index) {
            self.insert_child(parent, index, new)?;
        }
        Ok(())
    }

    fn detach(&mut self, id: NodeId) -> Result<()> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        self.node_mut(parent)?.children.retain(|c| *c != id);
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    /// Detaches `id` and frees it together with its descendants.
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        self.detach(id)?;
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(next.0).and_then(Option::take) {
                stack.extend(node.children);
            }
        }
        Ok(())
    }

    pub fn clear_children(&mut self, id: NodeId) -> Result<()> {
        for child in self.children(id).to_vec() {
            self.remove(child)?;
        }
        Ok(())
    }

    /// `id` and its descendants in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if !self.contains(next) {
                continue;
            }
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// Text nodes under `id`, in document order.
    pub fn text_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self.descendants(id)
            .into_iter()
            .filter(|n| self.is_text(*n))
            .collect()
    }

    pub fn text_content(&self, id: NodeId) -> String {
        self.text_nodes(id)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }

    /// Nearest node at or above `id` for which `predicate` holds.
    pub fn closest(&self, id: NodeId, predicate: impl Fn(NodeId) -> bool) -> Option<NodeId> {
        let mut current = Some(id);
        while let Some(node) = current {
            if predicate(node) {
                return Some(node);
            }
            current = self.parent(node);
        }
        None
    }

    pub fn to_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let Ok(node) = self.node(id) else {
            return;
        };
        match &node.data {
            NodeData::Text(text) => out.push_str(&escape_html(text)),
            NodeData::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_html(value));
                    out.push('"');
                }
                out.push('>');
                if is_void(tag) {
                    return;
                }
                for child in &node.children {
                    self.write_html(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn is_void(tag: &str) -> bool {
    matches!(tag, "img" | "br" | "hr" | "input" | "embed" | "source")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_moves_existing_child() {
        let mut dom = DomTree::default();
        let a = dom.create_element("p");
        let b = dom.create_element("p");
        dom.append_child(dom.root(), a).unwrap();
        dom.append_child(dom.root(), b).unwrap();

        dom.insert_child(dom.root(), 0, b).unwrap();

        assert_eq!(dom.children(dom.root()), &[b, a]);
        assert_eq!(dom.parent(b), Some(dom.root()));
    }

    #[test]
    fn remove_frees_subtree() {
        let mut dom = DomTree::default();
        let p = dom.create_element("p");
        let t = dom.create_text("hi");
        dom.append_child(p, t).unwrap();
        dom.append_child(dom.root(), p).unwrap();

        dom.remove(p).unwrap();

        assert!(!dom.contains(p));
        assert!(!dom.contains(t));
        assert!(dom.children(dom.root()).is_empty());
    }

    #[test]
    fn html_escapes_text_and_attributes() {
        let mut dom = DomTree::default();
        let p = dom.create_element("p");
        dom.set_attr(p, "title", "a \"b\"").unwrap();
        let t = dom.create_text("1 < 2 & 3");
        dom.append_child(p, t).unwrap();
        let img = dom.create_element("img");
        dom.append_child(dom.root(), p).unwrap();
        dom.append_child(dom.root(), img).unwrap();

        assert_eq!(
            dom.to_html(dom.root()),
            "<article><p title=\"a &quot;b&quot;\">1 &lt; 2 &amp; 3</p><img></article>"
        );
    }
}
