use serde::{Deserialize, Deserializer, Serialize};

use crate::component::{ComponentModel, ComponentName, LayoutType, ListTag};
use crate::error::{EditorError, Result};
use crate::format::Format;
use crate::paragraph::{ParagraphType, ZERO_WIDTH_SPACE};
use crate::selection::{Selection, SelectionPoint};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Op {
    InsertComponent(InsertComponent),
    DeleteComponent(DeleteComponent),
    UpdateComponent(UpdateComponent),
    InsertChars(InsertChars),
    RemoveChars(RemoveChars),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertComponent {
    pub component_class: String,
    pub component: ComponentName,
    /// Target container; `None` inserts a top-level section.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<ComponentName>,
    pub index: usize,
    pub attrs: ComponentModel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_offset: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteComponent {
    pub component: ComponentName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<SelectionPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateComponent {
    pub component: ComponentName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select_range: Option<usize>,
    #[serde(flatten)]
    pub patch: ComponentPatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertChars {
    pub component: ComponentName,
    pub index: usize,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_offset: Option<usize>,
}

/// `value` holds the removed characters; the interpreter checks them
/// against the text before removing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveChars {
    pub component: ComponentName,
    pub index: usize,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_offset: Option<usize>,
}

impl RemoveChars {
    pub fn count(&self) -> usize {
        self.value.chars().count()
    }
}

/// Attribute patch carried by `updateComponent`. Only the fields that
/// change are set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formats: Option<Vec<Format>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph_type: Option<ParagraphType>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub placeholder_text: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_type: Option<LayoutType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<ListTag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub provider: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub width: Option<Option<u32>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub height: Option<Option<u32>>,
}

// Tells an explicit `null` (clear the attribute) apart from an absent field.
fn double_option<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl ComponentPatch {
    pub fn formats(formats: Vec<Format>) -> Self {
        Self {
            formats: Some(formats),
            ..Self::default()
        }
    }

    pub fn paragraph_type(paragraph_type: ParagraphType) -> Self {
        Self {
            paragraph_type: Some(paragraph_type),
            ..Self::default()
        }
    }

    pub fn layout_type(layout_type: LayoutType) -> Self {
        Self {
            layout_type: Some(layout_type),
            ..Self::default()
        }
    }

    pub fn tag_name(tag: ListTag) -> Self {
        Self {
            tag_name: Some(tag),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpSide {
    Do,
    Undo,
}

/// A reversible edit: `undo` restores exactly what `do` changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpPair {
    #[serde(rename = "do")]
    pub do_op: Op,
    pub undo: Op,
}

impl OpPair {
    pub fn new(do_op: Op, undo: Op) -> Self {
        Self { do_op, undo }
    }

    pub fn side(&self, side: OpSide) -> &Op {
        match side {
            OpSide::Do => &self.do_op,
            OpSide::Undo => &self.undo,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.do_op.validate()?;
        self.undo.validate()
    }
}

impl Op {
    pub fn component(&self) -> &ComponentName {
        match self {
            Op::InsertComponent(op) => &op.component,
            Op::DeleteComponent(op) => &op.component,
            Op::UpdateComponent(op) => &op.component,
            Op::InsertChars(op) => &op.component,
            Op::RemoveChars(op) => &op.component,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Op::InsertComponent(_) => "insertComponent",
            Op::DeleteComponent(_) => "deleteComponent",
            Op::UpdateComponent(_) => "updateComponent",
            Op::InsertChars(_) => "insertChars",
            Op::RemoveChars(_) => "removeChars",
        }
    }

    /// Structural checks that need no document.
    pub fn validate(&self) -> Result<()> {
        match self {
            Op::InsertComponent(op) => {
                if op.attrs.class_name() != op.component_class {
                    return Err(EditorError::invalid(format!(
                        "insertComponent class `{}` does not match attrs of a {}",
                        op.component_class,
                        op.attrs.class_name()
                    )));
                }
                if op.attrs.name() != Some(&op.component) {
                    return Err(EditorError::invalid(format!(
                        "insertComponent attrs must carry the name `{}`",
                        op.component
                    )));
                }
                if matches!(op.attrs, ComponentModel::Section(_)) != op.section.is_none() {
                    return Err(EditorError::invalid(
                        "only sections are inserted at the article root",
                    ));
                }
                Ok(())
            }
            Op::DeleteComponent(_) => Ok(()),
            Op::UpdateComponent(op) => {
                if op.patch.is_empty() {
                    return Err(EditorError::invalid(format!(
                        "updateComponent on `{}` changes nothing",
                        op.component
                    )));
                }
                if let Some(formats) = &op.patch.formats {
                    if formats.iter().any(Format::is_empty) {
                        return Err(EditorError::invalid("format ranges must not be empty"));
                    }
                }
                Ok(())
            }
            Op::InsertChars(InsertChars { value, .. })
            | Op::RemoveChars(RemoveChars { value, .. }) => {
                if value.is_empty() {
                    return Err(EditorError::invalid(format!(
                        "{} needs at least one character",
                        self.kind()
                    )));
                }
                if value.contains(ZERO_WIDTH_SPACE) {
                    return Err(EditorError::invalid(
                        "character operations must not carry rendering markers",
                    ));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// One history entry: the pairs applied together plus the selection on
/// either side of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub ops: Vec<OpPair>,
    pub selection_before: Selection,
    pub selection_after: Selection,
    #[serde(default)]
    pub meta: TransactionMeta,
}
