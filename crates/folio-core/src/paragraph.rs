use serde::{Deserialize, Serialize};

use crate::error::{EditorError, Result};
use crate::format::{
    Format, clip_formats, normalize_formats, shift_for_insert, shift_for_remove,
};

/// Keeps an empty editable node focusable in the rendered document.
pub const ZERO_WIDTH_SPACE: char = '\u{200B}';
pub const NON_BREAKING_SPACE: char = '\u{00A0}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ParagraphType {
    #[default]
    #[serde(rename = "p")]
    Paragraph,
    #[serde(rename = "h1")]
    MainHeader,
    #[serde(rename = "h2")]
    SecondaryHeader,
    #[serde(rename = "h3")]
    ThirdHeader,
    #[serde(rename = "blockquote")]
    Quote,
    #[serde(rename = "pre")]
    Code,
    #[serde(rename = "figcaption")]
    Caption,
    #[serde(rename = "li")]
    ListItem,
}

impl ParagraphType {
    pub fn tag(self) -> &'static str {
        match self {
            ParagraphType::Paragraph => "p",
            ParagraphType::MainHeader => "h1",
            ParagraphType::SecondaryHeader => "h2",
            ParagraphType::ThirdHeader => "h3",
            ParagraphType::Quote => "blockquote",
            ParagraphType::Code => "pre",
            ParagraphType::Caption => "figcaption",
            ParagraphType::ListItem => "li",
        }
    }

    pub fn is_header(self) -> bool {
        matches!(
            self,
            ParagraphType::MainHeader | ParagraphType::SecondaryHeader | ParagraphType::ThirdHeader
        )
    }

    /// Type given to the paragraph created when this one is split.
    pub fn split_successor(self) -> Self {
        match self {
            ParagraphType::MainHeader
            | ParagraphType::SecondaryHeader
            | ParagraphType::ThirdHeader
            | ParagraphType::Caption => ParagraphType::Paragraph,
            other => other,
        }
    }
}

/// Canonical model text: rendering markers are stripped and non-breaking
/// spaces become plain spaces. Length is preserved except for markers.
pub fn normalize_text(text: &str) -> String {
    text.chars()
        .filter(|ch| *ch != ZERO_WIDTH_SPACE)
        .map(|ch| if ch == NON_BREAKING_SPACE { ' ' } else { ch })
        .collect()
}

pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

pub(crate) fn byte_index(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(ix, _)| ix)
        .unwrap_or(text.len())
}

pub(crate) fn char_slice(text: &str, from: usize, to: usize) -> &str {
    let start = byte_index(text, from);
    let end = byte_index(text, to);
    &text[start..end.max(start)]
}

/// Leaf text component: text plus inline format ranges over it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Paragraph {
    text: String,
    paragraph_type: ParagraphType,
    formats: Vec<Format>,
    placeholder_text: Option<String>,
}

impl Paragraph {
    pub fn new(paragraph_type: ParagraphType) -> Self {
        Self {
            paragraph_type,
            ..Self::default()
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.set_text(text);
        self
    }

    pub fn with_formats(mut self, formats: Vec<Format>) -> Self {
        self.set_formats(formats);
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder_text = Some(placeholder.into());
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn paragraph_type(&self) -> ParagraphType {
        self.paragraph_type
    }

    pub fn formats(&self) -> &[Format] {
        &self.formats
    }

    pub fn placeholder_text(&self) -> Option<&str> {
        self.placeholder_text.as_deref()
    }

    pub fn len(&self) -> usize {
        char_len(&self.text)
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Blank paragraphs hold no visible content and show no placeholder.
    pub fn is_blank(&self) -> bool {
        self.placeholder_text.is_none() && self.text.trim().is_empty()
    }

    pub fn set_text(&mut self, text: &str) {
        self.text = normalize_text(text);
        let len = self.len();
        self.formats = normalize_formats(std::mem::take(&mut self.formats), len);
    }

    pub fn set_paragraph_type(&mut self, paragraph_type: ParagraphType) {
        self.paragraph_type = paragraph_type;
    }

    pub fn set_placeholder_text(&mut self, placeholder: Option<String>) {
        self.placeholder_text = placeholder;
    }

    /// Replaces the format list wholesale. Ranges past the end of the text
    /// are clamped.
    pub fn set_formats(&mut self, formats: Vec<Format>) {
        self.formats = normalize_formats(formats, self.len());
    }

    pub fn slice(&self, from: usize, to: usize) -> &str {
        char_slice(&self.text, from, to)
    }

    pub fn insert_characters_at(&mut self, chars: &str, index: usize) -> Result<()> {
        let len = self.len();
        if index > len {
            return Err(EditorError::IndexOutOfRange {
                container: "paragraph text".into(),
                index,
                len,
            });
        }
        let chars = normalize_text(chars);
        let count = char_len(&chars);
        let at = byte_index(&self.text, index);
        self.text.insert_str(at, &chars);
        shift_for_insert(&mut self.formats, index, count);
        self.formats = normalize_formats(std::mem::take(&mut self.formats), self.len());
        Ok(())
    }

    /// Removes `count` characters starting at `index` and returns them.
    pub fn remove_characters_at(&mut self, index: usize, count: usize) -> Result<String> {
        let len = self.len();
        let end = match index.checked_add(count) {
            Some(end) if end <= len => end,
            Some(end) => {
                return Err(EditorError::IndexOutOfRange {
                    container: "paragraph text".into(),
                    index: end,
                    len,
                });
            }
            None => {
                return Err(EditorError::IndexOutOfRange {
                    container: "paragraph text".into(),
                    index,
                    len,
                });
            }
        };
        let start = byte_index(&self.text, index);
        let end = byte_index(&self.text, end);
        let removed: String = self.text.drain(start..end).collect();
        let shifted = shift_for_remove(std::mem::take(&mut self.formats), index, count);
        self.formats = normalize_formats(shifted, self.len());
        Ok(removed)
    }

    /// Applies (or, with `clear`, removes) an inline format over a range.
    ///
    /// Existing ranges of the same type are toggled, trimmed, split or
    /// unioned against the candidate. Ranges of other types under the
    /// candidate are cleared first so that the result stays a set of
    /// disjoint ranges.
    pub fn format(&mut self, candidate: Format, clear: bool) -> Result<()> {
        self.check_range(candidate.from, candidate.to)?;

        let matches = self.get_formatted_ranges(&candidate, true);
        match matches {
            Some(matches) if !matches.is_empty() => {
                self.merge_same_type(&candidate, &matches, clear);
            }
            _ if clear => {
                let formats = std::mem::take(&mut self.formats);
                self.formats = formats
                    .into_iter()
                    .flat_map(|f| f.without_range(candidate.from, candidate.to))
                    .collect();
            }
            _ => {
                let overlapping = self
                    .get_formatted_ranges(&candidate, false)
                    .unwrap_or_default();
                if overlapping.is_empty() {
                    self.formats.push(candidate);
                } else {
                    let cleared: Vec<Format> = overlapping
                        .iter()
                        .map(|&ix| {
                            let existing = &self.formats[ix];
                            existing.with_range(
                                existing.from.max(candidate.from),
                                existing.to.min(candidate.to),
                            )
                        })
                        .filter(|f| !f.is_empty())
                        .collect();
                    for sub in cleared {
                        self.format(sub, true)?;
                    }
                    return self.format(candidate, false);
                }
            }
        }

        self.normalize_formats();
        Ok(())
    }

    fn merge_same_type(&mut self, candidate: &Format, matches: &[usize], clear: bool) {
        let mut next: Vec<Format> = Vec::with_capacity(self.formats.len() + 1);
        for (ix, existing) in self.formats.iter().enumerate() {
            if !matches.contains(&ix) {
                next.push(existing.clone());
                continue;
            }
            if clear {
                next.extend(existing.without_range(candidate.from, candidate.to));
                continue;
            }

            if existing.from == candidate.from && existing.to == candidate.to {
                if candidate.attrs.is_some() {
                    let mut updated = existing.clone();
                    updated.attrs = candidate.attrs.clone();
                    next.push(updated);
                }
            } else if existing.to == candidate.to && candidate.from > existing.from {
                next.push(existing.with_range(existing.from, candidate.from));
            } else if existing.from == candidate.from && candidate.to < existing.to {
                next.push(existing.with_range(candidate.to, existing.to));
            } else if candidate.from > existing.from && candidate.to < existing.to {
                next.push(existing.with_range(existing.from, candidate.from));
                next.push(existing.with_range(candidate.to, existing.to));
            } else {
                next.push(existing.with_range(
                    existing.from.min(candidate.from),
                    existing.to.max(candidate.to),
                ));
            }
        }
        self.formats = next;
    }

    /// Indices of stored ranges overlapping the candidate.
    ///
    /// With `match_type`, same-type ranges count when they merely touch the
    /// candidate and carry the same attributes, and `None` signals that a range of another type shares
    /// characters with it (the caller must clear those first). Without
    /// `match_type`, every range sharing characters with the candidate is
    /// returned along with touching same-type ranges.
    pub fn get_formatted_ranges(&self, candidate: &Format, match_type: bool) -> Option<Vec<usize>> {
        let mut found = Vec::new();
        for (ix, existing) in self.formats.iter().enumerate() {
            if existing.kind == candidate.kind {
                // Differently attributed neighbours, e.g. two links, stay apart.
                let joins = existing.attrs == candidate.attrs
                    || existing.intersects(candidate.from, candidate.to);
                if joins && existing.touches(candidate.from, candidate.to) {
                    found.push(ix);
                }
            } else if existing.intersects(candidate.from, candidate.to) {
                if match_type {
                    return None;
                }
                found.push(ix);
            }
        }
        Some(found)
    }

    /// Formats clipped to `[from, to)`, in text coordinates.
    pub fn get_formats_for_range(&self, from: usize, to: usize) -> Vec<Format> {
        clip_formats(&self.formats, from, to)
    }

    fn normalize_formats(&mut self) {
        let len = self.len();
        self.formats = normalize_formats(std::mem::take(&mut self.formats), len);
    }

    fn check_range(&self, from: usize, to: usize) -> Result<()> {
        if from >= to || to > self.len() {
            return Err(EditorError::invalid(format!(
                "format range {from}..{to} is empty or exceeds text length {}",
                self.len()
            )));
        }
        Ok(())
    }
}
