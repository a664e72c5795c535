use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type FormatAttrs = BTreeMap<String, String>;

/// Inline style tag. Serialized as the HTML tag the style renders to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatType {
    #[serde(rename = "a")]
    Link,
    #[serde(rename = "code")]
    Code,
    #[serde(rename = "em")]
    Emphasis,
    #[serde(rename = "s")]
    Strikethrough,
    #[serde(rename = "strong")]
    Strong,
    #[serde(rename = "u")]
    Underline,
}

impl FormatType {
    pub fn tag(self) -> &'static str {
        match self {
            FormatType::Link => "a",
            FormatType::Code => "code",
            FormatType::Emphasis => "em",
            FormatType::Strikethrough => "s",
            FormatType::Strong => "strong",
            FormatType::Underline => "u",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "a" => FormatType::Link,
            "code" => FormatType::Code,
            "em" | "i" => FormatType::Emphasis,
            "s" | "strike" => FormatType::Strikethrough,
            "strong" | "b" => FormatType::Strong,
            "u" => FormatType::Underline,
            _ => return None,
        })
    }
}

// Ties between formats starting at the same offset are broken by tag name.
impl Ord for FormatType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tag().cmp(other.tag())
    }
}

impl PartialOrd for FormatType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Half-open `[from, to)` interval over a paragraph's characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Format {
    #[serde(rename = "type")]
    pub kind: FormatType,
    pub from: usize,
    pub to: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<FormatAttrs>,
}

impl Format {
    pub fn new(kind: FormatType, from: usize, to: usize) -> Self {
        Self {
            kind,
            from,
            to,
            attrs: None,
        }
    }

    pub fn link(from: usize, to: usize, href: impl Into<String>) -> Self {
        Self::new(FormatType::Link, from, to).attr("href", href)
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs
            .get_or_insert_with(FormatAttrs::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_range(&self, from: usize, to: usize) -> Self {
        Self {
            kind: self.kind,
            from,
            to,
            attrs: self.attrs.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.from >= self.to
    }

    /// Geometric overlap that also accepts ranges sharing only a boundary.
    pub fn touches(&self, from: usize, to: usize) -> bool {
        let contained_in = from >= self.from && to <= self.to;
        let contains = from <= self.from && to >= self.to;
        let overlaps_left = from < self.from && to >= self.from;
        let overlaps_right = from <= self.to && to > self.to;
        contained_in || contains || overlaps_left || overlaps_right
    }

    /// True when the two ranges share at least one character.
    pub fn intersects(&self, from: usize, to: usize) -> bool {
        from < self.to && to > self.from
    }

    /// The pieces of this range left after cutting `[from, to)` out of it.
    pub fn without_range(&self, from: usize, to: usize) -> Vec<Format> {
        if !self.intersects(from, to) {
            return vec![self.clone()];
        }
        let mut out = Vec::new();
        if self.from < from {
            out.push(self.with_range(self.from, from));
        }
        if to < self.to {
            out.push(self.with_range(to, self.to));
        }
        out
    }
}

pub fn sort_formats(formats: &mut [Format]) {
    formats.sort_by(|a, b| a.from.cmp(&b.from).then_with(|| a.kind.cmp(&b.kind)));
}

/// Clamps every range to `text_len`, drops empty ranges and merges
/// overlapping ranges of the same type. Adjacent ones merge only when
/// their attributes agree.
pub fn normalize_formats(formats: Vec<Format>, text_len: usize) -> Vec<Format> {
    let mut formats: Vec<Format> = formats
        .into_iter()
        .map(|mut f| {
            f.to = f.to.min(text_len);
            f
        })
        .filter(|f| !f.is_empty())
        .collect();
    sort_formats(&mut formats);

    let mut out: Vec<Format> = Vec::with_capacity(formats.len());
    for format in formats {
        let previous = out
            .iter_mut()
            .rev()
            .find(|f| {
                f.kind == format.kind
                    && (format.from < f.to || (format.from == f.to && format.attrs == f.attrs))
            });
        match previous {
            Some(previous) => previous.to = previous.to.max(format.to),
            None => out.push(format),
        }
    }
    out
}

/// Shifts ranges for `count` characters inserted at `index`.
pub fn shift_for_insert(formats: &mut [Format], index: usize, count: usize) {
    for format in formats.iter_mut() {
        if format.from >= index {
            format.from += count;
        }
        if format.to > index {
            format.to += count;
        }
    }
}

/// Shifts ranges for `count` characters removed at `index`. Ranges wholly
/// consumed by the removal are dropped; ranges straddling it are clipped.
pub fn shift_for_remove(formats: Vec<Format>, index: usize, count: usize) -> Vec<Format> {
    formats
        .into_iter()
        .filter_map(|mut format| {
            if format.from >= index && format.to <= index + count {
                return None;
            }
            if format.from >= index {
                format.from = format.from.saturating_sub(count).max(index);
            }
            if format.to > index {
                format.to = format.to.saturating_sub(count).max(index);
            }
            (!format.is_empty()).then_some(format)
        })
        .collect()
}

/// Ranges overlapping `[from, to)`, clipped to it.
pub fn clip_formats(formats: &[Format], from: usize, to: usize) -> Vec<Format> {
    formats
        .iter()
        .filter(|f| f.intersects(from, to))
        .map(|f| f.with_range(f.from.max(from), f.to.min(to)))
        .filter(|f| !f.is_empty())
        .collect()
}

/// Moves every range by `delta` characters towards the end of the text.
pub fn offset_formats(formats: &[Format], delta: isize) -> Vec<Format> {
    formats
        .iter()
        .map(|f| {
            f.with_range(
                f.from.saturating_add_signed(delta),
                f.to.saturating_add_signed(delta),
            )
        })
        .collect()
}
