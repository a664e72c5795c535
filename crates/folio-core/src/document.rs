use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::{Deserialize, Serialize};

use crate::component::{
    Caption, Component, ComponentKind, ComponentModel, ComponentName, Container, EmbedModel,
    Embed, Figure, FigureModel, LayoutModel, ListModel, ParagraphModel, SectionModel,
};
use crate::error::{EditorError, Result};
use crate::paragraph::{Paragraph, ParagraphType};
use crate::selection::SelectionPoint;

/// Persisted article state: `{ "sections": [ ... ] }`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArticleModel {
    #[serde(default)]
    pub sections: Vec<ComponentModel>,
}

impl ArticleModel {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Generates component names. Shared between a document and its scratch
/// copies so names handed out while planning never collide later.
#[derive(Debug, Clone, Default)]
struct NameGenerator {
    next: Arc<AtomicU64>,
}

impl NameGenerator {
    fn generate(&self) -> ComponentName {
        let n = self.next.fetch_add(1, AtomicOrdering::Relaxed) + 1;
        ComponentName::new(format!("c{n:x}"))
    }

    fn observe(&self, name: &ComponentName) {
        let Some(n) = name
            .as_str()
            .strip_prefix('c')
            .and_then(|hex| u64::from_str_radix(hex, 16).ok())
        else {
            return;
        };
        self.next.fetch_max(n, AtomicOrdering::Relaxed);
    }
}

/// Arena of components keyed by name, plus the top-level section order.
///
/// This is the reference table operations resolve names through. Its
/// lifetime is one document instance.
#[derive(Debug, Clone, Default)]
pub struct Document {
    references: HashMap<ComponentName, Component>,
    sections: Vec<ComponentName>,
    names: NameGenerator,
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.references == other.references && self.sections == other.sections
    }
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_model(model: &ArticleModel) -> Result<Self> {
        let mut doc = Self::new();
        for (index, section) in model.sections.iter().enumerate() {
            if !matches!(section, ComponentModel::Section(_)) {
                return Err(EditorError::invalid(format!(
                    "top-level component {index} is a {}, expected a Section",
                    section.class_name()
                )));
            }
            let name = doc.instantiate(section, None)?;
            doc.sections.push(name);
        }
        Ok(doc)
    }

    pub fn to_model(&self) -> Result<ArticleModel> {
        let sections = self
            .sections
            .iter()
            .map(|name| self.component_model(name))
            .collect::<Result<Vec<_>>>()?;
        Ok(ArticleModel { sections })
    }

    pub fn generate_name(&self) -> ComponentName {
        loop {
            let name = self.names.generate();
            if !self.references.contains_key(&name) {
                return name;
            }
        }
    }

    pub fn sections(&self) -> &[ComponentName] {
        &self.sections
    }

    pub fn get_reference(&self, name: &ComponentName) -> Option<&Component> {
        self.references.get(name)
    }

    pub(crate) fn get_reference_mut(&mut self, name: &ComponentName) -> Result<&mut Component> {
        self.references
            .get_mut(name)
            .ok_or_else(|| EditorError::UnknownComponent(name.clone()))
    }

    pub fn contains(&self, name: &ComponentName) -> bool {
        self.references.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn resolve(&self, name: &ComponentName) -> Result<&Component> {
        self.references
            .get(name)
            .ok_or_else(|| EditorError::UnknownComponent(name.clone()))
    }

    pub fn paragraph(&self, name: &ComponentName) -> Result<&Paragraph> {
        let component = self.resolve(name)?;
        component.paragraph().ok_or(EditorError::NotImplemented {
            class: component.class_name(),
            method: "paragraph text",
        })
    }

    pub fn children_of(&self, container: Option<&ComponentName>) -> Result<&[ComponentName]> {
        match container {
            None => Ok(&self.sections),
            Some(name) => {
                let component = self.resolve(name)?;
                component
                    .kind
                    .container()
                    .map(Container::components)
                    .ok_or_else(|| {
                        EditorError::invalid(format!("`{name}` is not a container"))
                    })
            }
        }
    }

    /// Content length: characters for paragraphs, the sum of children for
    /// containers, 1 for opaque components.
    pub fn get_length(&self, name: &ComponentName) -> Result<usize> {
        let component = self.resolve(name)?;
        match &component.kind {
            ComponentKind::Paragraph(paragraph) => Ok(paragraph.len()),
            ComponentKind::Figure(_) | ComponentKind::Embed(_) => Ok(1),
            kind => {
                let mut total = 0;
                for child in kind.container().map(Container::components).unwrap_or(&[]) {
                    total += self.get_length(child)?;
                }
                Ok(total)
            }
        }
    }

    pub fn get_index_in_section(&self, name: &ComponentName) -> Result<usize> {
        let component = self.resolve(name)?;
        if component.parent_component.is_some() && component.section.is_none() {
            return Ok(0);
        }
        let siblings = self.children_of(component.section.as_ref())?;
        siblings
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| EditorError::invalid(format!("`{name}` is detached from its section")))
    }

    /// Nested inline components (captions) stand in for their parent when
    /// walking the block order.
    pub fn block_anchor<'a>(&'a self, name: &'a ComponentName) -> Result<&'a ComponentName> {
        let mut current = name;
        loop {
            let component = self.resolve(current)?;
            match (&component.parent_component, component.inline) {
                (Some(parent), true) => current = parent,
                _ => return Ok(current),
            }
        }
    }

    pub fn first_leaf(&self, name: &ComponentName) -> Result<Option<ComponentName>> {
        let component = self.resolve(name)?;
        match component.kind.container() {
            None => Ok(Some(name.clone())),
            Some(children) => {
                for child in children.components() {
                    if let Some(leaf) = self.first_leaf(child)? {
                        return Ok(Some(leaf));
                    }
                }
                Ok(None)
            }
        }
    }

    pub fn last_leaf(&self, name: &ComponentName) -> Result<Option<ComponentName>> {
        let component = self.resolve(name)?;
        match component.kind.container() {
            None => Ok(Some(name.clone())),
            Some(children) => {
                for child in children.components().iter().rev() {
                    if let Some(leaf) = self.last_leaf(child)? {
                        return Ok(Some(leaf));
                    }
                }
                Ok(None)
            }
        }
    }

    pub fn first_leaf_in_document(&self) -> Result<Option<ComponentName>> {
        for section in &self.sections {
            if let Some(leaf) = self.first_leaf(section)? {
                return Ok(Some(leaf));
            }
        }
        Ok(None)
    }

    pub fn last_leaf_in_document(&self) -> Result<Option<ComponentName>> {
        for section in self.sections.iter().rev() {
            if let Some(leaf) = self.last_leaf(section)? {
                return Ok(Some(leaf));
            }
        }
        Ok(None)
    }

    /// Next leaf in document order, crossing container boundaries.
    pub fn get_next_component(&self, name: &ComponentName) -> Result<Option<ComponentName>> {
        let mut current = self.block_anchor(name)?.clone();
        loop {
            let owner = self.resolve(&current)?.section.clone();
            let siblings = self.children_of(owner.as_ref())?;
            let index = self.get_index_in_section(&current)?;
            for sibling in &siblings[index + 1..] {
                if let Some(leaf) = self.first_leaf(sibling)? {
                    return Ok(Some(leaf));
                }
            }
            match owner {
                Some(owner) => current = owner,
                None => return Ok(None),
            }
        }
    }

    /// Previous leaf in document order, crossing container boundaries.
    pub fn get_previous_component(&self, name: &ComponentName) -> Result<Option<ComponentName>> {
        let mut current = self.block_anchor(name)?.clone();
        loop {
            let owner = self.resolve(&current)?.section.clone();
            let siblings = self.children_of(owner.as_ref())?;
            let index = self.get_index_in_section(&current)?;
            for sibling in siblings[..index].iter().rev() {
                if let Some(leaf) = self.last_leaf(sibling)? {
                    return Ok(Some(leaf));
                }
            }
            match owner {
                Some(owner) => current = owner,
                None => return Ok(None),
            }
        }
    }

    /// Leaves strictly between `start` and `end` in document order.
    pub fn get_components_between(
        &self,
        start: &ComponentName,
        end: &ComponentName,
    ) -> Result<Vec<ComponentName>> {
        let start = self.block_anchor(start)?.clone();
        let end = self.block_anchor(end)?.clone();
        if start == end || self.compare_components(&start, &end)? == Ordering::Greater {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        let mut current = start;
        while let Some(next) = self.get_next_component(&current)? {
            if next == end {
                break;
            }
            out.push(next.clone());
            current = next;
        }
        Ok(out)
    }

    /// Position from the root as child indices. Captions sort right after
    /// their parent component.
    pub fn path_of(&self, name: &ComponentName) -> Result<Vec<usize>> {
        let component = self.resolve(name)?;
        if let (None, Some(parent)) = (&component.section, &component.parent_component) {
            let mut path = self.path_of(parent)?;
            path.push(0);
            return Ok(path);
        }
        let mut path = vec![self.get_index_in_section(name)?];
        let mut owner = component.section.clone();
        while let Some(container) = owner {
            path.push(self.get_index_in_section(&container)?);
            owner = self.resolve(&container)?.section.clone();
        }
        path.reverse();
        Ok(path)
    }

    pub fn compare_components(&self, a: &ComponentName, b: &ComponentName) -> Result<Ordering> {
        if a == b {
            return Ok(Ordering::Equal);
        }
        Ok(self.path_of(a)?.cmp(&self.path_of(b)?))
    }

    pub fn compare_points(&self, a: &SelectionPoint, b: &SelectionPoint) -> Result<Ordering> {
        Ok(self
            .compare_components(&a.component, &b.component)?
            .then(a.offset.cmp(&b.offset)))
    }

    /// Nearest ancestor (or self) matching `predicate`.
    pub fn find_ancestor(
        &self,
        name: &ComponentName,
        predicate: impl Fn(&Component) -> bool,
    ) -> Result<Option<ComponentName>> {
        let mut current = Some(self.block_anchor(name)?.clone());
        while let Some(name) = current {
            let component = self.resolve(&name)?;
            if predicate(component) {
                return Ok(Some(name));
            }
            current = component.section.clone();
        }
        Ok(None)
    }

    pub fn component_model(&self, name: &ComponentName) -> Result<ComponentModel> {
        let component = self.resolve(name)?;
        let children = |container: &Container| -> Result<Vec<ComponentModel>> {
            container
                .components()
                .iter()
                .map(|child| self.component_model(child))
                .collect()
        };
        Ok(match &component.kind {
            ComponentKind::Section(container) => ComponentModel::Section(SectionModel {
                name: Some(name.clone()),
                components: children(container)?,
            }),
            ComponentKind::Layout {
                layout_type,
                children: container,
            } => ComponentModel::Layout(LayoutModel {
                name: Some(name.clone()),
                layout_type: *layout_type,
                components: children(container)?,
            }),
            ComponentKind::List {
                tag,
                children: container,
            } => ComponentModel::List(ListModel {
                name: Some(name.clone()),
                tag_name: *tag,
                components: children(container)?,
            }),
            ComponentKind::Paragraph(paragraph) => {
                ComponentModel::Paragraph(paragraph_model(name, paragraph))
            }
            ComponentKind::Figure(figure) => ComponentModel::Figure(FigureModel {
                name: Some(name.clone()),
                src: figure.src.clone(),
                width: figure.width,
                height: figure.height,
                caption: self.caption_model(&figure.caption)?,
            }),
            ComponentKind::Embed(embed) => ComponentModel::Embed(EmbedModel {
                name: Some(name.clone()),
                url: embed.url.clone(),
                provider: embed.provider.clone(),
                width: embed.width,
                height: embed.height,
                caption: self.caption_model(&embed.caption)?,
            }),
        })
    }

    fn caption_model(&self, caption: &Caption) -> Result<ParagraphModel> {
        let paragraph = self.paragraph(&caption.paragraph)?;
        Ok(paragraph_model(&caption.paragraph, paragraph))
    }

    /// Builds live components for `model` and its descendants, registering
    /// every name in the reference table. The root is not attached to any
    /// child sequence; see [`Document::insert_component_at`].
    pub(crate) fn instantiate(
        &mut self,
        model: &ComponentModel,
        section: Option<ComponentName>,
    ) -> Result<ComponentName> {
        let name = self.claim_name(model.name())?;
        let kind = match model {
            ComponentModel::Section(m) => {
                ComponentKind::Section(self.instantiate_children(&name, &m.components)?)
            }
            ComponentModel::Layout(m) => ComponentKind::Layout {
                layout_type: m.layout_type,
                children: self.instantiate_children(&name, &m.components)?,
            },
            ComponentModel::List(m) => ComponentKind::List {
                tag: m.tag_name,
                children: self.instantiate_children(&name, &m.components)?,
            },
            ComponentModel::Paragraph(m) => ComponentKind::Paragraph(paragraph_from_model(m)),
            ComponentModel::Figure(m) => ComponentKind::Figure(Figure {
                src: m.src.clone(),
                width: m.width,
                height: m.height,
                caption: self.instantiate_caption(&name, &m.caption)?,
            }),
            ComponentModel::Embed(m) => ComponentKind::Embed(Embed {
                url: m.url.clone(),
                provider: m.provider.clone(),
                width: m.width,
                height: m.height,
                caption: self.instantiate_caption(&name, &m.caption)?,
            }),
        };
        self.references.insert(
            name.clone(),
            Component {
                name: name.clone(),
                section,
                parent_component: None,
                inline: false,
                kind,
            },
        );
        Ok(name)
    }

    fn instantiate_children(
        &mut self,
        parent: &ComponentName,
        models: &[ComponentModel],
    ) -> Result<Container> {
        let mut container = Container::default();
        for model in models {
            if matches!(model, ComponentModel::Section(_)) {
                return Err(EditorError::invalid(format!(
                    "a Section cannot be nested inside `{parent}`"
                )));
            }
            container
                .components
                .push(self.instantiate(model, Some(parent.clone()))?);
        }
        Ok(container)
    }

    fn instantiate_caption(
        &mut self,
        parent: &ComponentName,
        model: &ParagraphModel,
    ) -> Result<Caption> {
        let name = self.claim_name(model.name.as_ref())?;
        let mut paragraph = paragraph_from_model(model);
        paragraph.set_paragraph_type(ParagraphType::Caption);
        self.references.insert(
            name.clone(),
            Component {
                name: name.clone(),
                section: None,
                parent_component: Some(parent.clone()),
                inline: true,
                kind: ComponentKind::Paragraph(paragraph),
            },
        );
        Ok(Caption { paragraph: name })
    }

    fn claim_name(&self, name: Option<&ComponentName>) -> Result<ComponentName> {
        match name {
            Some(name) if self.references.contains_key(name) => Err(EditorError::invalid(
                format!("component name `{name}` is already in use"),
            )),
            Some(name) => {
                self.names.observe(name);
                Ok(name.clone())
            }
            None => Ok(self.generate_name()),
        }
    }

    /// Splices `child` into `container` (or the top-level section list).
    pub(crate) fn insert_component_at(
        &mut self,
        container: Option<&ComponentName>,
        child: &ComponentName,
        index: usize,
    ) -> Result<()> {
        let len = self.children_of(container)?.len();
        if index > len {
            return Err(EditorError::IndexOutOfRange {
                container: container.map_or_else(|| "article".to_string(), |c| c.to_string()),
                index,
                len,
            });
        }
        match container {
            None => self.sections.insert(index, child.clone()),
            Some(name) => {
                let parent = self.get_reference_mut(name)?;
                if let Some(children) = parent.kind.container_mut() {
                    children.components.insert(index, child.clone());
                }
            }
        }
        self.get_reference_mut(child)?.section = container.cloned();
        Ok(())
    }

    /// Detaches `name` from its container and drops it and its descendants
    /// from the reference table. Returns the container and former index.
    pub(crate) fn remove_component(
        &mut self,
        name: &ComponentName,
    ) -> Result<(Option<ComponentName>, usize)> {
        let component = self.resolve(name)?;
        if component.parent_component.is_some() && component.section.is_none() {
            return Err(EditorError::invalid(format!(
                "`{name}` is nested inside another component and cannot be removed on its own"
            )));
        }
        let owner = component.section.clone();
        let index = self.get_index_in_section(name)?;
        match &owner {
            None => {
                self.sections.remove(index);
            }
            Some(owner) => {
                if let Some(children) = self.get_reference_mut(owner)?.kind.container_mut() {
                    children.components.remove(index);
                }
            }
        }
        self.drop_subtree(name);
        Ok((owner, index))
    }

    fn drop_subtree(&mut self, name: &ComponentName) {
        let Some(component) = self.references.remove(name) else {
            return;
        };
        if let Some(children) = component.kind.container() {
            for child in children.components() {
                self.drop_subtree(child);
            }
        }
        if let Some(caption) = component.kind.caption() {
            self.drop_subtree(&caption.paragraph);
        }
    }

    /// Every leaf in document order.
    pub fn leaves(&self) -> Result<Vec<ComponentName>> {
        let mut out = Vec::new();
        let mut current = self.first_leaf_in_document()?;
        while let Some(name) = current {
            current = self.get_next_component(&name)?;
            out.push(name);
        }
        Ok(out)
    }
}

fn paragraph_model(name: &ComponentName, paragraph: &Paragraph) -> ParagraphModel {
    ParagraphModel {
        name: Some(name.clone()),
        text: paragraph.text().to_string(),
        paragraph_type: paragraph.paragraph_type(),
        formats: paragraph.formats().to_vec(),
        placeholder_text: paragraph.placeholder_text().map(str::to_string),
    }
}

fn paragraph_from_model(model: &ParagraphModel) -> Paragraph {
    let mut paragraph = Paragraph::new(model.paragraph_type)
        .with_text(&model.text)
        .with_formats(model.formats.clone());
    if let Some(placeholder) = &model.placeholder_text {
        paragraph = paragraph.with_placeholder(placeholder.clone());
    }
    paragraph
}
