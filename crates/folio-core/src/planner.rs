use tracing::trace;

use crate::component::{Component, ComponentKind, ComponentModel, ComponentName};
use crate::document::Document;
use crate::error::{EditorError, Result};
use crate::format::{Format, normalize_formats};
use crate::interpreter::apply_op;
use crate::ops::{
    ComponentPatch, DeleteComponent, InsertChars, InsertComponent, Op, OpPair, RemoveChars,
    UpdateComponent,
};
use crate::paragraph::{char_len, normalize_text};
use crate::selection::SelectionPoint;

/// Which side of the index a character removal extends to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Removes the characters before `index` (backspace).
    Backward,
    /// Removes the characters from `index` on (delete).
    #[default]
    Forward,
}

/// Accumulates operation pairs for one transaction.
///
/// Each pushed pair's `do` side is applied to a scratch copy of the
/// document right away, so later planning steps see the state their
/// operations will run against and every recorded index is relative to
/// it.
#[derive(Debug, Clone)]
pub struct Planner {
    doc: Document,
    ops: Vec<OpPair>,
}

impl Planner {
    pub fn new(doc: &Document) -> Self {
        Self {
            doc: doc.clone(),
            ops: Vec::new(),
        }
    }

    /// The scratch document with every pushed operation applied.
    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn push(&mut self, pair: OpPair) -> Result<()> {
        apply_op(&mut self.doc, &pair.do_op)?;
        self.ops.push(pair);
        Ok(())
    }

    pub fn extend(&mut self, pairs: impl IntoIterator<Item = OpPair>) -> Result<()> {
        for pair in pairs {
            self.push(pair)?;
        }
        Ok(())
    }

    pub fn ops(&self) -> &[OpPair] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn into_ops(self) -> Vec<OpPair> {
        self.ops
    }
}

/// Operation planners. None of these mutate the document; they read it
/// and describe the edit as reversible pairs.
impl Document {
    /// Pairs inserting `model` into `section` at `index`. Missing names in
    /// the model are generated so the operation replays identically.
    pub fn get_insert_ops(
        &self,
        mut model: ComponentModel,
        section: Option<&ComponentName>,
        index: usize,
        cursor_offset: Option<usize>,
        cursor_before: Option<SelectionPoint>,
    ) -> Result<Vec<OpPair>> {
        let len = self.children_of(section)?.len();
        if index > len {
            return Err(EditorError::IndexOutOfRange {
                container: section.map_or_else(|| "article".to_string(), |c| c.to_string()),
                index,
                len,
            });
        }
        let name = self.assign_names(&mut model);
        let do_op = Op::InsertComponent(InsertComponent {
            component_class: model.class_name().to_string(),
            component: name.clone(),
            section: section.cloned(),
            index,
            attrs: model,
            cursor_offset,
        });
        let undo = Op::DeleteComponent(DeleteComponent {
            component: name,
            cursor: cursor_before,
        });
        Ok(vec![OpPair::new(do_op, undo)])
    }

    /// Pairs deleting `name`. The undo side re-inserts the full model at the
    /// original index adjusted by `index_offset`. When the owner requires
    /// children and `name` is its last child, the owner's own deletion is
    /// appended, planned against the state after the child is gone.
    pub fn get_delete_ops(
        &self,
        name: &ComponentName,
        index_offset: isize,
        cursor_after: Option<SelectionPoint>,
    ) -> Result<Vec<OpPair>> {
        let component = self.resolve(name)?;
        if component.section().is_none() && component.parent_component().is_some() {
            return Err(EditorError::NotImplemented {
                class: component.class_name(),
                method: "getDeleteOps on a nested component",
            });
        }
        let owner = component.section().cloned();
        let index = self.get_index_in_section(name)?;
        let model = self.component_model(name)?;
        let undo_index = index.saturating_add_signed(index_offset);

        let pair = OpPair::new(
            Op::DeleteComponent(DeleteComponent {
                component: name.clone(),
                cursor: cursor_after.clone(),
            }),
            Op::InsertComponent(InsertComponent {
                component_class: model.class_name().to_string(),
                component: name.clone(),
                section: owner.clone(),
                index: undo_index,
                attrs: model,
                cursor_offset: None,
            }),
        );

        let cascade = match &owner {
            Some(owner) => {
                let owner = self.resolve(owner)?;
                owner.kind().requires_children()
                    && owner.kind().container().is_some_and(|c| c.len() == 1)
            }
            None => false,
        };
        let Some(owner) = owner.filter(|_| cascade) else {
            return Ok(vec![pair]);
        };

        trace!(component = %name, container = %owner, "cascade delete");
        let mut planner = Planner::new(self);
        planner.push(pair)?;
        let ops = planner.doc().get_delete_ops(&owner, 0, cursor_after)?;
        planner.extend(ops)?;
        Ok(planner.into_ops())
    }

    /// Pairs applying `patch` to `name`. The undo side carries the current
    /// values of exactly the patched attributes. Returns no pairs when the
    /// patch changes nothing.
    pub fn get_update_ops(
        &self,
        name: &ComponentName,
        mut patch: ComponentPatch,
        cursor_offset: Option<usize>,
        select_range: Option<usize>,
    ) -> Result<Vec<OpPair>> {
        let component = self.resolve(name)?;
        if let Some(paragraph) = component.paragraph() {
            let len = match &patch.value {
                Some(value) => {
                    let value = normalize_text(value);
                    let len = char_len(&value);
                    patch.value = Some(value);
                    // Text replacement clamps formats; record them so undo
                    // restores the ranges a shorter text would cut.
                    if patch.formats.is_none() {
                        patch.formats = Some(paragraph.formats().to_vec());
                    }
                    len
                }
                None => paragraph.len(),
            };
            if let Some(formats) = patch.formats.take() {
                patch.formats = Some(normalize_formats(formats, len));
            }
        }

        let revert = current_attributes(component, &patch)?;
        if revert == patch {
            return Ok(Vec::new());
        }
        Ok(vec![OpPair::new(
            Op::UpdateComponent(UpdateComponent {
                component: name.clone(),
                cursor_offset,
                select_range,
                patch,
            }),
            Op::UpdateComponent(UpdateComponent {
                component: name.clone(),
                cursor_offset,
                select_range,
                patch: revert,
            }),
        )])
    }

    /// Pairs inserting `chars` at `index`; the cursor lands after them.
    pub fn get_insert_chars_ops(
        &self,
        name: &ComponentName,
        chars: &str,
        index: usize,
    ) -> Result<Vec<OpPair>> {
        let component = self.resolve(name)?;
        let paragraph = component.paragraph().ok_or(EditorError::NotImplemented {
            class: component.class_name(),
            method: "getInsertCharsOps",
        })?;
        let value = normalize_text(chars);
        if value.is_empty() {
            return Ok(Vec::new());
        }
        if index > paragraph.len() {
            return Err(EditorError::IndexOutOfRange {
                container: name.to_string(),
                index,
                len: paragraph.len(),
            });
        }
        let count = char_len(&value);
        Ok(vec![OpPair::new(
            Op::InsertChars(InsertChars {
                component: name.clone(),
                index,
                value: value.clone(),
                cursor_offset: Some(index + count),
            }),
            Op::RemoveChars(RemoveChars {
                component: name.clone(),
                index,
                value,
                cursor_offset: Some(index),
            }),
        )])
    }

    /// Pairs removing `count` characters next to `index` in `direction`.
    ///
    /// When the paragraph carries formats, a formats update subtracting
    /// the removed span comes first; its undo side restores the exact
    /// original ranges after the characters are re-inserted.
    pub fn get_remove_chars_ops(
        &self,
        name: &ComponentName,
        count: usize,
        index: usize,
        direction: Direction,
    ) -> Result<Vec<OpPair>> {
        let component = self.resolve(name)?;
        let paragraph = component.paragraph().ok_or(EditorError::NotImplemented {
            class: component.class_name(),
            method: "getRemoveCharsOps",
        })?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let len = paragraph.len();
        let from = match direction {
            Direction::Backward => index.checked_sub(count),
            Direction::Forward => Some(index),
        };
        let Some(from) = from.filter(|from| from + count <= len) else {
            return Err(EditorError::IndexOutOfRange {
                container: name.to_string(),
                index: index + count,
                len,
            });
        };
        let to = from + count;

        let mut ops = Vec::with_capacity(2);
        if !paragraph.formats().is_empty() {
            let remaining: Vec<Format> = paragraph
                .formats()
                .iter()
                .flat_map(|f| f.without_range(from, to))
                .collect();
            ops.push(OpPair::new(
                Op::UpdateComponent(UpdateComponent {
                    component: name.clone(),
                    cursor_offset: None,
                    select_range: None,
                    patch: ComponentPatch::formats(remaining),
                }),
                Op::UpdateComponent(UpdateComponent {
                    component: name.clone(),
                    cursor_offset: None,
                    select_range: None,
                    patch: ComponentPatch::formats(paragraph.formats().to_vec()),
                }),
            ));
        }

        let value = paragraph.slice(from, to).to_string();
        ops.push(OpPair::new(
            Op::RemoveChars(RemoveChars {
                component: name.clone(),
                index: from,
                value: value.clone(),
                cursor_offset: Some(from),
            }),
            Op::InsertChars(InsertChars {
                component: name.clone(),
                index: from,
                value,
                cursor_offset: Some(index),
            }),
        ));
        Ok(ops)
    }

    /// Splits `container` at `at_index`: the children from `at_index` on
    /// move, names intact, into a new sibling container placed right after
    /// it. Returns the pairs and the sibling's name.
    pub fn get_split_ops(
        &self,
        container: &ComponentName,
        at_index: usize,
    ) -> Result<(Vec<OpPair>, ComponentName)> {
        let component = self.resolve(container)?;
        let children = component
            .kind()
            .container()
            .ok_or_else(|| EditorError::invalid(format!("`{container}` is not a container")))?
            .components()
            .to_vec();
        if at_index == 0 || at_index >= children.len() {
            return Err(EditorError::IndexOutOfRange {
                container: container.to_string(),
                index: at_index,
                len: children.len(),
            });
        }
        let owner = component.section().cloned();
        let index = self.get_index_in_section(container)?;
        let moved = children[at_index..]
            .iter()
            .map(|child| self.component_model(child))
            .collect::<Result<Vec<_>>>()?;

        let mut planner = Planner::new(self);
        for child in children[at_index..].iter().rev() {
            let ops = planner.doc().get_delete_ops(child, 0, None)?;
            planner.extend(ops)?;
        }

        let sibling = self.generate_name();
        let mut shell = self.component_model(container)?.without_children();
        rename_model(&mut shell, sibling.clone());
        let ops = planner
            .doc()
            .get_insert_ops(shell, owner.as_ref(), index + 1, None, None)?;
        planner.extend(ops)?;

        for (i, model) in moved.into_iter().enumerate() {
            let ops = planner
                .doc()
                .get_insert_ops(model, Some(&sibling), i, None, None)?;
            planner.extend(ops)?;
        }
        trace!(container = %container, %sibling, at_index, "split container");
        Ok((planner.into_ops(), sibling))
    }

    /// Fills in every missing name in `model`, captions included, and
    /// returns the root's name.
    pub(crate) fn assign_names(&self, model: &mut ComponentModel) -> ComponentName {
        let name = match model.name() {
            Some(name) => name.clone(),
            None => {
                let name = self.generate_name();
                rename_model(model, name.clone());
                name
            }
        };
        match model {
            ComponentModel::Section(m) => self.assign_all(&mut m.components),
            ComponentModel::Layout(m) => self.assign_all(&mut m.components),
            ComponentModel::List(m) => self.assign_all(&mut m.components),
            ComponentModel::Figure(m) => {
                if m.caption.name.is_none() {
                    m.caption.name = Some(self.generate_name());
                }
            }
            ComponentModel::Embed(m) => {
                if m.caption.name.is_none() {
                    m.caption.name = Some(self.generate_name());
                }
            }
            ComponentModel::Paragraph(_) => {}
        }
        name
    }

    fn assign_all(&self, models: &mut [ComponentModel]) {
        for model in models {
            self.assign_names(model);
        }
    }
}

fn rename_model(model: &mut ComponentModel, name: ComponentName) {
    let slot = match model {
        ComponentModel::Section(m) => &mut m.name,
        ComponentModel::Layout(m) => &mut m.name,
        ComponentModel::List(m) => &mut m.name,
        ComponentModel::Paragraph(m) => &mut m.name,
        ComponentModel::Figure(m) => &mut m.name,
        ComponentModel::Embed(m) => &mut m.name,
    };
    *slot = Some(name);
}

/// The component's present values for every attribute `patch` sets.
fn current_attributes(component: &Component, patch: &ComponentPatch) -> Result<ComponentPatch> {
    let missing = |field: &str| {
        EditorError::invalid(format!(
            "{} `{}` has no attribute `{field}`",
            component.class_name(),
            component.name()
        ))
    };
    let mut out = ComponentPatch::default();
    let kind = component.kind();

    if patch.formats.is_some() || patch.value.is_some() || patch.paragraph_type.is_some() || patch.placeholder_text.is_some() {
        let ComponentKind::Paragraph(paragraph) = kind else {
            return Err(missing("text"));
        };
        if patch.formats.is_some() {
            out.formats = Some(paragraph.formats().to_vec());
        }
        if patch.value.is_some() {
            out.value = Some(paragraph.text().to_string());
        }
        if patch.paragraph_type.is_some() {
            out.paragraph_type = Some(paragraph.paragraph_type());
        }
        if patch.placeholder_text.is_some() {
            out.placeholder_text = Some(paragraph.placeholder_text().map(str::to_string));
        }
    }
    if patch.layout_type.is_some() {
        let ComponentKind::Layout { layout_type, .. } = kind else {
            return Err(missing("layoutType"));
        };
        out.layout_type = Some(*layout_type);
    }
    if patch.tag_name.is_some() {
        let ComponentKind::List { tag, .. } = kind else {
            return Err(missing("tagName"));
        };
        out.tag_name = Some(*tag);
    }
    if patch.src.is_some() {
        let ComponentKind::Figure(figure) = kind else {
            return Err(missing("src"));
        };
        out.src = Some(figure.src.clone());
    }
    if patch.url.is_some() || patch.provider.is_some() {
        let ComponentKind::Embed(embed) = kind else {
            return Err(missing("url"));
        };
        if patch.url.is_some() {
            out.url = Some(embed.url.clone());
        }
        if patch.provider.is_some() {
            out.provider = Some(embed.provider.clone());
        }
    }
    if patch.width.is_some() || patch.height.is_some() {
        let (width, height) = match kind {
            ComponentKind::Figure(figure) => (figure.width, figure.height),
            ComponentKind::Embed(embed) => (embed.width, embed.height),
            _ => return Err(missing("width")),
        };
        if patch.width.is_some() {
            out.width = Some(width);
        }
        if patch.height.is_some() {
            out.height = Some(height);
        }
    }
    Ok(out)
}
