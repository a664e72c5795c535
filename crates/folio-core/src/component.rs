use std::fmt;

use serde::{Deserialize, Serialize};

use crate::format::Format;
use crate::paragraph::{Paragraph, ParagraphType};

/// Stable identity of a component. Operations refer to components by name
/// only, so a log can be replayed against a freshly loaded document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentName(String);

impl ComponentName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentName {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<&ComponentName> for ComponentName {
    fn from(value: &ComponentName) -> Self {
        value.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LayoutType {
    #[default]
    #[serde(rename = "layout-single-column")]
    SingleColumn,
    #[serde(rename = "layout-full-width")]
    FullWidth,
    #[serde(rename = "layout-staggered-left")]
    StaggeredLeft,
    #[serde(rename = "layout-staggered-right")]
    StaggeredRight,
}

impl LayoutType {
    pub fn class_name(self) -> &'static str {
        match self {
            LayoutType::SingleColumn => "layout-single-column",
            LayoutType::FullWidth => "layout-full-width",
            LayoutType::StaggeredLeft => "layout-staggered-left",
            LayoutType::StaggeredRight => "layout-staggered-right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListTag {
    #[default]
    Ul,
    Ol,
}

impl ListTag {
    pub fn tag(self) -> &'static str {
        match self {
            ListTag::Ul => "ul",
            ListTag::Ol => "ol",
        }
    }
}

/// Ordered child sequence of a container component.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Container {
    pub(crate) components: Vec<ComponentName>,
}

impl Container {
    pub fn components(&self) -> &[ComponentName] {
        &self.components
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn index_of(&self, name: &ComponentName) -> Option<usize> {
        self.components.iter().position(|c| c == name)
    }
}

/// Shared by embed-like components: the caption is a nested inline
/// paragraph whose `parent_component` is the owner.
#[derive(Debug, Clone, PartialEq)]
pub struct Caption {
    pub(crate) paragraph: ComponentName,
}

impl Caption {
    pub fn paragraph(&self) -> &ComponentName {
        &self.paragraph
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Figure {
    pub src: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub caption: Caption,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Embed {
    pub url: String,
    pub provider: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub caption: Caption,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ComponentKind {
    Section(Container),
    Layout {
        layout_type: LayoutType,
        children: Container,
    },
    List {
        tag: ListTag,
        children: Container,
    },
    Paragraph(Paragraph),
    Figure(Figure),
    Embed(Embed),
}

impl ComponentKind {
    pub fn class_name(&self) -> &'static str {
        match self {
            ComponentKind::Section(_) => SECTION,
            ComponentKind::Layout { .. } => LAYOUT,
            ComponentKind::List { .. } => LIST,
            ComponentKind::Paragraph(_) => PARAGRAPH,
            ComponentKind::Figure(_) => FIGURE,
            ComponentKind::Embed(_) => EMBEDDED_COMPONENT,
        }
    }

    pub fn container(&self) -> Option<&Container> {
        match self {
            ComponentKind::Section(children)
            | ComponentKind::Layout { children, .. }
            | ComponentKind::List { children, .. } => Some(children),
            _ => None,
        }
    }

    pub(crate) fn container_mut(&mut self) -> Option<&mut Container> {
        match self {
            ComponentKind::Section(children)
            | ComponentKind::Layout { children, .. }
            | ComponentKind::List { children, .. } => Some(children),
            _ => None,
        }
    }

    /// Containers that become invalid once their last child is gone.
    pub fn requires_children(&self) -> bool {
        matches!(self, ComponentKind::Layout { .. } | ComponentKind::List { .. })
    }

    pub fn caption(&self) -> Option<&Caption> {
        match self {
            ComponentKind::Figure(figure) => Some(&figure.caption),
            ComponentKind::Embed(embed) => Some(&embed.caption),
            _ => None,
        }
    }
}

pub const SECTION: &str = "Section";
pub const LAYOUT: &str = "Layout";
pub const LIST: &str = "List";
pub const PARAGRAPH: &str = "Paragraph";
pub const FIGURE: &str = "Figure";
pub const EMBEDDED_COMPONENT: &str = "EmbeddedComponent";

/// A node of the document tree as stored in the document arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub(crate) name: ComponentName,
    pub(crate) section: Option<ComponentName>,
    pub(crate) parent_component: Option<ComponentName>,
    pub(crate) inline: bool,
    pub(crate) kind: ComponentKind,
}

impl Component {
    pub fn name(&self) -> &ComponentName {
        &self.name
    }

    /// Owning container, `None` for top-level sections and nested captions.
    pub fn section(&self) -> Option<&ComponentName> {
        self.section.as_ref()
    }

    pub fn parent_component(&self) -> Option<&ComponentName> {
        self.parent_component.as_ref()
    }

    pub fn is_inline(&self) -> bool {
        self.inline
    }

    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    pub fn class_name(&self) -> &'static str {
        self.kind.class_name()
    }

    pub fn paragraph(&self) -> Option<&Paragraph> {
        match &self.kind {
            ComponentKind::Paragraph(paragraph) => Some(paragraph),
            _ => None,
        }
    }

    pub(crate) fn paragraph_mut(&mut self) -> Option<&mut Paragraph> {
        match &mut self.kind {
            ComponentKind::Paragraph(paragraph) => Some(paragraph),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        self.kind.container().is_some()
    }

    pub fn is_leaf(&self) -> bool {
        !self.is_container()
    }
}

/// Serializable snapshot of a component, tagged by class name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "component")]
pub enum ComponentModel {
    Section(SectionModel),
    Layout(LayoutModel),
    List(ListModel),
    Paragraph(ParagraphModel),
    Figure(FigureModel),
    #[serde(rename = "EmbeddedComponent")]
    Embed(EmbedModel),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SectionModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ComponentName>,
    #[serde(default)]
    pub components: Vec<ComponentModel>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ComponentName>,
    #[serde(rename = "type", default)]
    pub layout_type: LayoutType,
    #[serde(default)]
    pub components: Vec<ComponentModel>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ComponentName>,
    #[serde(default)]
    pub tag_name: ListTag,
    #[serde(default)]
    pub components: Vec<ComponentModel>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ComponentName>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub paragraph_type: ParagraphType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub formats: Vec<Format>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FigureModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ComponentName>,
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default)]
    pub caption: ParagraphModel,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EmbedModel {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<ComponentName>,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default)]
    pub caption: ParagraphModel,
}

impl ComponentModel {
    pub fn class_name(&self) -> &'static str {
        match self {
            ComponentModel::Section(_) => SECTION,
            ComponentModel::Layout(_) => LAYOUT,
            ComponentModel::List(_) => LIST,
            ComponentModel::Paragraph(_) => PARAGRAPH,
            ComponentModel::Figure(_) => FIGURE,
            ComponentModel::Embed(_) => EMBEDDED_COMPONENT,
        }
    }

    pub fn name(&self) -> Option<&ComponentName> {
        match self {
            ComponentModel::Section(m) => m.name.as_ref(),
            ComponentModel::Layout(m) => m.name.as_ref(),
            ComponentModel::List(m) => m.name.as_ref(),
            ComponentModel::Paragraph(m) => m.name.as_ref(),
            ComponentModel::Figure(m) => m.name.as_ref(),
            ComponentModel::Embed(m) => m.name.as_ref(),
        }
    }

    pub fn children(&self) -> &[ComponentModel] {
        match self {
            ComponentModel::Section(m) => &m.components,
            ComponentModel::Layout(m) => &m.components,
            ComponentModel::List(m) => &m.components,
            _ => &[],
        }
    }

    /// Copy of a container model without its children.
    pub(crate) fn without_children(&self) -> ComponentModel {
        let mut model = self.clone();
        match &mut model {
            ComponentModel::Section(m) => m.components.clear(),
            ComponentModel::Layout(m) => m.components.clear(),
            ComponentModel::List(m) => m.components.clear(),
            _ => {}
        }
        model
    }

    /// Every class name used by this model and its descendants.
    pub fn class_names(&self) -> Vec<&'static str> {
        let mut out = vec![self.class_name()];
        for child in self.children() {
            out.extend(child.class_names());
        }
        out
    }
}

impl ParagraphModel {
    pub fn new(name: ComponentName, paragraph_type: ParagraphType) -> Self {
        Self {
            name: Some(name),
            paragraph_type,
            ..Self::default()
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn formats(mut self, formats: Vec<Format>) -> Self {
        self.formats = formats;
        self
    }
}
