use tracing::trace;

use crate::component::{ComponentKind, ComponentName};
use crate::document::Document;
use crate::error::{EditorError, Result};
use crate::ops::{ComponentPatch, Op};
use crate::selection::SelectionPoint;

/// Cursor placement requested by an executed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorHint {
    Collapsed(SelectionPoint),
    Range(SelectionPoint, SelectionPoint),
}

/// Notification emitted for every mutation, consumed by render layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Inserted {
        component: ComponentName,
        container: Option<ComponentName>,
        index: usize,
    },
    Removed {
        component: ComponentName,
        container: Option<ComponentName>,
        index: usize,
    },
    Updated {
        component: ComponentName,
    },
    /// The whole document was replaced.
    Reset,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub change: Change,
    pub cursor: Option<CursorHint>,
}

/// Mutates `doc` as described by `op`. This is the only place the tree
/// changes; planners read the document and emit operations.
pub fn apply_op(doc: &mut Document, op: &Op) -> Result<Applied> {
    op.validate()?;
    trace!(op = op.kind(), component = %op.component(), "apply op");
    match op {
        Op::InsertComponent(op) => {
            // Validate the slot before building anything.
            let len = doc.children_of(op.section.as_ref())?.len();
            if op.index > len {
                return Err(EditorError::IndexOutOfRange {
                    container: op
                        .section
                        .as_ref()
                        .map_or_else(|| "article".to_string(), |c| c.to_string()),
                    index: op.index,
                    len,
                });
            }
            let name = doc.instantiate(&op.attrs, op.section.clone())?;
            doc.insert_component_at(op.section.as_ref(), &name, op.index)?;
            let cursor = op
                .cursor_offset
                .map(|offset| CursorHint::Collapsed(SelectionPoint::new(name.clone(), offset)));
            Ok(Applied {
                change: Change::Inserted {
                    component: name,
                    container: op.section.clone(),
                    index: op.index,
                },
                cursor,
            })
        }
        Op::DeleteComponent(op) => {
            let (container, index) = doc.remove_component(&op.component)?;
            Ok(Applied {
                change: Change::Removed {
                    component: op.component.clone(),
                    container,
                    index,
                },
                cursor: op.cursor.clone().map(CursorHint::Collapsed),
            })
        }
        Op::UpdateComponent(op) => {
            apply_patch(doc, &op.component, &op.patch)?;
            let cursor = op.cursor_offset.map(|offset| {
                let start = SelectionPoint::new(op.component.clone(), offset);
                match op.select_range {
                    Some(range) if range > 0 => CursorHint::Range(
                        start,
                        SelectionPoint::new(op.component.clone(), offset + range),
                    ),
                    _ => CursorHint::Collapsed(start),
                }
            });
            Ok(Applied {
                change: Change::Updated {
                    component: op.component.clone(),
                },
                cursor,
            })
        }
        Op::InsertChars(op) => {
            let component = doc.get_reference_mut(&op.component)?;
            let class = component.class_name();
            let paragraph = component.paragraph_mut().ok_or(EditorError::NotImplemented {
                class,
                method: "insertChars",
            })?;
            paragraph.insert_characters_at(&op.value, op.index)?;
            Ok(Applied {
                change: Change::Updated {
                    component: op.component.clone(),
                },
                cursor: op.cursor_offset.map(|offset| {
                    CursorHint::Collapsed(SelectionPoint::new(op.component.clone(), offset))
                }),
            })
        }
        Op::RemoveChars(op) => {
            let component = doc.get_reference_mut(&op.component)?;
            let class = component.class_name();
            let paragraph = component.paragraph_mut().ok_or(EditorError::NotImplemented {
                class,
                method: "removeChars",
            })?;
            let end = op
                .index
                .checked_add(op.count())
                .filter(|end| *end <= paragraph.len())
                .ok_or_else(|| EditorError::IndexOutOfRange {
                    container: op.component.to_string(),
                    index: op.index,
                    len: paragraph.len(),
                })?;
            let expected = paragraph.slice(op.index, end);
            if expected != op.value {
                return Err(EditorError::invalid(format!(
                    "removeChars on `{}` expected {:?} at {} but found {:?}",
                    op.component, op.value, op.index, expected
                )));
            }
            paragraph.remove_characters_at(op.index, op.count())?;
            Ok(Applied {
                change: Change::Updated {
                    component: op.component.clone(),
                },
                cursor: op.cursor_offset.map(|offset| {
                    CursorHint::Collapsed(SelectionPoint::new(op.component.clone(), offset))
                }),
            })
        }
    }
}

fn apply_patch(doc: &mut Document, name: &ComponentName, patch: &ComponentPatch) -> Result<()> {
    let component = doc.get_reference_mut(name)?;
    let class = component.class_name();
    let unsupported = |field: &str| {
        EditorError::invalid(format!("{class} `{name}` has no attribute `{field}`"))
    };

    match &mut component.kind {
        ComponentKind::Paragraph(paragraph) => {
            if let Some(value) = &patch.value {
                paragraph.set_text(value);
            }
            if let Some(paragraph_type) = patch.paragraph_type {
                paragraph.set_paragraph_type(paragraph_type);
            }
            if let Some(placeholder) = &patch.placeholder_text {
                paragraph.set_placeholder_text(placeholder.clone());
            }
            if let Some(formats) = &patch.formats {
                let len = paragraph.len();
                if let Some(bad) = formats.iter().find(|f| f.to > len) {
                    return Err(EditorError::invalid(format!(
                        "format {}..{} exceeds the {len} characters of `{name}`",
                        bad.from, bad.to
                    )));
                }
                paragraph.set_formats(formats.clone());
            }
            reject_fields(patch, &["layoutType", "tagName", "src", "url", "provider", "width", "height"])
                .map_err(|field| unsupported(field))
        }
        ComponentKind::Layout { layout_type, .. } => {
            if let Some(next) = patch.layout_type {
                *layout_type = next;
            }
            reject_fields(patch, &["formats", "value", "paragraphType", "placeholderText", "tagName", "src", "url", "provider", "width", "height"])
                .map_err(|field| unsupported(field))
        }
        ComponentKind::List { tag, .. } => {
            if let Some(next) = patch.tag_name {
                *tag = next;
            }
            reject_fields(patch, &["formats", "value", "paragraphType", "placeholderText", "layoutType", "src", "url", "provider", "width", "height"])
                .map_err(|field| unsupported(field))
        }
        ComponentKind::Figure(figure) => {
            if let Some(src) = &patch.src {
                figure.src = src.clone();
            }
            if let Some(width) = patch.width {
                figure.width = width;
            }
            if let Some(height) = patch.height {
                figure.height = height;
            }
            reject_fields(patch, &["formats", "value", "paragraphType", "placeholderText", "layoutType", "tagName", "url", "provider"])
                .map_err(|field| unsupported(field))
        }
        ComponentKind::Embed(embed) => {
            if let Some(url) = &patch.url {
                embed.url = url.clone();
            }
            if let Some(provider) = &patch.provider {
                embed.provider = provider.clone();
            }
            if let Some(width) = patch.width {
                embed.width = width;
            }
            if let Some(height) = patch.height {
                embed.height = height;
            }
            reject_fields(patch, &["formats", "value", "paragraphType", "placeholderText", "layoutType", "tagName", "src"])
                .map_err(|field| unsupported(field))
        }
        ComponentKind::Section(_) => Err(unsupported("any")),
    }
}

fn reject_fields(patch: &ComponentPatch, fields: &[&'static str]) -> std::result::Result<(), &'static str> {
    for field in fields {
        let set = match *field {
            "formats" => patch.formats.is_some(),
            "value" => patch.value.is_some(),
            "paragraphType" => patch.paragraph_type.is_some(),
            "placeholderText" => patch.placeholder_text.is_some(),
            "layoutType" => patch.layout_type.is_some(),
            "tagName" => patch.tag_name.is_some(),
            "src" => patch.src.is_some(),
            "url" => patch.url.is_some(),
            "provider" => patch.provider.is_some(),
            "width" => patch.width.is_some(),
            "height" => patch.height.is_some(),
            _ => false,
        };
        if set {
            return Err(field);
        }
    }
    Ok(())
}
