use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::component::{ComponentKind, ComponentName};
use crate::document::Document;
use crate::error::Result;
use crate::format::offset_formats;
use crate::ops::{ComponentPatch, Op, OpPair};
use crate::planner::{Direction, Planner};

/// A cursor edge: an offset into a component's own content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionPoint {
    pub component: ComponentName,
    pub offset: usize,
}

impl SelectionPoint {
    pub fn new(component: impl Into<ComponentName>, offset: usize) -> Self {
        Self {
            component: component.into(),
            offset,
        }
    }
}

/// Model selection. Both edges are `None` until a document is loaded;
/// otherwise `start` never follows `end` in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<SelectionPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<SelectionPoint>,
}

impl Selection {
    pub fn collapsed(point: SelectionPoint) -> Self {
        Self {
            start: Some(point.clone()),
            end: Some(point),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() || self.end.is_none()
    }

    pub fn set_cursor(&mut self, point: SelectionPoint) {
        *self = Self::collapsed(point);
    }

    /// Selects between two points, swapping them when `a` comes after `b`.
    pub fn select(&mut self, doc: &Document, a: SelectionPoint, b: SelectionPoint) -> Result<()> {
        let (start, end) = match doc.compare_points(&a, &b)? {
            Ordering::Greater => (b, a),
            _ => (a, b),
        };
        self.start = Some(start);
        self.end = Some(end);
        Ok(())
    }

    pub fn is_range(&self) -> bool {
        self.start != self.end
    }

    pub fn is_cursor_at_beginning(&self) -> bool {
        !self.is_range() && self.start.as_ref().is_some_and(|p| p.offset == 0)
    }

    pub fn is_cursor_at_ending(&self, doc: &Document) -> Result<bool> {
        if self.is_range() {
            return Ok(false);
        }
        match &self.start {
            Some(point) => Ok(point.offset == doc.get_length(&point.component)?),
            None => Ok(false),
        }
    }

    /// True when both edges still resolve and fit their component.
    pub fn is_valid_in(&self, doc: &Document) -> bool {
        [&self.start, &self.end].into_iter().all(|point| match point {
            Some(point) => doc
                .get_length(&point.component)
                .is_ok_and(|len| point.offset <= len),
            None => true,
        })
    }

    /// Plans the removal of everything between `start` and `end`.
    ///
    /// Whole components strictly inside the range are deleted. When both
    /// edges sit in top-level paragraphs the end paragraph is deleted and
    /// its trailing text (with formats shifted by the retained prefix) is
    /// appended to the start paragraph, which survives. The last operation
    /// carries the cursor hint for the collapsed result.
    pub fn get_delete_selection_ops(&self, doc: &Document) -> Result<Vec<OpPair>> {
        let (Some(start), Some(end)) = (&self.start, &self.end) else {
            return Ok(Vec::new());
        };
        if start == end {
            return Ok(Vec::new());
        }

        let mut planner = Planner::new(doc);
        if start.component == end.component {
            delete_within(&mut planner, start, end.offset)?;
            return Ok(planner.into_ops());
        }

        for between in doc.get_components_between(&start.component, &end.component)? {
            // Nested captions live and die with their owner.
            if !planner.doc().contains(&between) {
                continue;
            }
            let ops = planner.doc().get_delete_ops(&between, 0, None)?;
            planner.extend(ops)?;
        }

        let start_is_text = doc.resolve(&start.component)?.paragraph().is_some();
        let end_is_text = doc.resolve(&end.component)?.paragraph().is_some();
        let mergeable = start_is_text
            && end_is_text
            && !doc.resolve(&start.component)?.is_inline()
            && !doc.resolve(&end.component)?.is_inline();

        if mergeable {
            merge_paragraphs(&mut planner, start, end)?;
            return Ok(planner.into_ops());
        }

        // Edges that cannot merge are trimmed independently.
        if start_is_text {
            let len = planner.doc().get_length(&start.component)?;
            if start.offset < len {
                let ops = planner.doc().get_remove_chars_ops(
                    &start.component,
                    len - start.offset,
                    start.offset,
                    Direction::Forward,
                )?;
                planner.extend(ops)?;
            }
        } else if start.offset == 0 {
            let cursor = Some(SelectionPoint::new(end.component.clone(), 0));
            let ops = planner.doc().get_delete_ops(&start.component, 0, cursor)?;
            planner.extend(ops)?;
        }

        if end_is_text {
            if end.offset > 0 {
                let ops = planner.doc().get_remove_chars_ops(
                    &end.component,
                    end.offset,
                    0,
                    Direction::Forward,
                )?;
                planner.extend(ops)?;
            }
        } else if end.offset > 0 && planner.doc().contains(&end.component) {
            let cursor = planner
                .doc()
                .contains(&start.component)
                .then(|| start.clone());
            let ops = planner.doc().get_delete_ops(&end.component, 0, cursor)?;
            planner.extend(ops)?;
        }

        Ok(planner.into_ops())
    }
}

fn delete_within(planner: &mut Planner, start: &SelectionPoint, end_offset: usize) -> Result<()> {
    let (from, to) = (start.offset.min(end_offset), start.offset.max(end_offset));
    let component = planner.doc().resolve(&start.component)?;
    match component.kind() {
        ComponentKind::Paragraph(_) => {
            let ops = planner.doc().get_remove_chars_ops(
                &start.component,
                to - from,
                from,
                Direction::Forward,
            )?;
            planner.extend(ops)
        }
        ComponentKind::Figure(_) | ComponentKind::Embed(_) => {
            let ops = planner.doc().get_delete_ops(&start.component, 0, None)?;
            planner.extend(ops)
        }
        // Selections never rest on containers.
        _ => Ok(()),
    }
}

fn merge_paragraphs(planner: &mut Planner, start: &SelectionPoint, end: &SelectionPoint) -> Result<()> {
    let (tail, tail_formats) = {
        let paragraph = planner.doc().paragraph(&end.component)?;
        let len = paragraph.len();
        let formats = paragraph.get_formats_for_range(end.offset, len);
        (
            paragraph.slice(end.offset, len).to_string(),
            offset_formats(&formats, -(end.offset as isize)),
        )
    };

    let cursor = Some(start.clone());
    let ops = planner.doc().get_delete_ops(&end.component, 0, cursor)?;
    planner.extend(ops)?;

    let len = planner.doc().get_length(&start.component)?;
    if start.offset < len {
        let ops = planner.doc().get_remove_chars_ops(
            &start.component,
            len - start.offset,
            start.offset,
            Direction::Forward,
        )?;
        planner.extend(ops)?;
    }

    if !tail.is_empty() {
        let mut ops = planner.doc().get_insert_chars_ops(&start.component, &tail, start.offset)?;
        // The spliced tail goes after the cursor, not before it.
        for pair in &mut ops {
            if let Op::InsertChars(op) = &mut pair.do_op {
                op.cursor_offset = Some(start.offset);
            }
        }
        planner.extend(ops)?;
    }

    if !tail_formats.is_empty() {
        let mut formats = planner.doc().paragraph(&start.component)?.formats().to_vec();
        formats.extend(offset_formats(&tail_formats, start.offset as isize));
        let ops = planner.doc().get_update_ops(
            &start.component,
            ComponentPatch::formats(formats),
            Some(start.offset),
            None,
        )?;
        planner.extend(ops)?;
    }
    Ok(())
}
