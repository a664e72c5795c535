use std::time::{Duration, Instant};

use similar::{DiffTag, TextDiff};

use crate::component::ComponentName;
use crate::document::Document;
use crate::error::Result;
use crate::ops::OpPair;
use crate::paragraph::{char_slice, normalize_text};
use crate::planner::{Direction, Planner};

/// Text typed into one paragraph that has not been turned into
/// operations yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInput {
    component: ComponentName,
    baseline: String,
    current: String,
    cursor: usize,
    last_input: Instant,
}

impl PendingInput {
    pub fn new(component: ComponentName, baseline: &str, now: Instant) -> Self {
        let baseline = normalize_text(baseline);
        Self {
            component,
            current: baseline.clone(),
            baseline,
            cursor: 0,
            last_input: now,
        }
    }

    pub fn component(&self) -> &ComponentName {
        &self.component
    }

    pub fn baseline(&self) -> &str {
        &self.baseline
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn update(&mut self, text: &str, cursor: usize, now: Instant) {
        self.current = normalize_text(text);
        self.cursor = cursor;
        self.last_input = now;
    }

    pub fn is_due(&self, now: Instant, debounce: Duration) -> bool {
        now.saturating_duration_since(self.last_input) >= debounce
    }

    pub fn is_unchanged(&self) -> bool {
        self.baseline == self.current
    }

    /// Char-level diff of baseline against current text as character
    /// operations on the paragraph.
    pub fn to_ops(&self, doc: &Document) -> Result<Vec<OpPair>> {
        let mut planner = Planner::new(doc);
        let diff = TextDiff::from_chars(self.baseline.as_str(), self.current.as_str());
        for op in diff.ops() {
            let at = op.new_range().start;
            match op.tag() {
                DiffTag::Equal => {}
                DiffTag::Delete => {
                    let ops = planner.doc().get_remove_chars_ops(
                        &self.component,
                        op.old_range().len(),
                        at,
                        Direction::Forward,
                    )?;
                    planner.extend(ops)?;
                }
                DiffTag::Insert => {
                    let range = op.new_range();
                    let chars = char_slice(&self.current, range.start, range.end);
                    let ops = planner.doc().get_insert_chars_ops(&self.component, chars, at)?;
                    planner.extend(ops)?;
                }
                DiffTag::Replace => {
                    let ops = planner.doc().get_remove_chars_ops(
                        &self.component,
                        op.old_range().len(),
                        at,
                        Direction::Forward,
                    )?;
                    planner.extend(ops)?;
                    let range = op.new_range();
                    let chars = char_slice(&self.current, range.start, range.end);
                    let ops = planner.doc().get_insert_chars_ops(&self.component, chars, at)?;
                    planner.extend(ops)?;
                }
            }
        }
        Ok(planner.into_ops())
    }
}
