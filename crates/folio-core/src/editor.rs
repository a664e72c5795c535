use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::article::{Article, Edit};
use crate::component::{
    ComponentKind, ComponentModel, ComponentName, EMBEDDED_COMPONENT, EmbedModel, FigureModel,
    LayoutModel, LayoutType, ListModel, ListTag, ParagraphModel, SectionModel,
};
use crate::document::{ArticleModel, Document};
use crate::error::{EditorError, Result};
use crate::format::{Format, FormatAttrs, FormatType, offset_formats, shift_for_remove};
use crate::input::PendingInput;
use crate::interpreter::{Change, apply_op};
use crate::ops::{ComponentPatch, Transaction};
use crate::paragraph::{ParagraphType, char_len, char_slice, normalize_text};
use crate::planner::{Direction, Planner};
use crate::registry::{ComponentClass, ComponentRegistry, EmbedInfo, EmbedTask, builtin_classes};
use crate::selection::{Selection, SelectionPoint};

/// Editor settings. Every field has a default, so partial JSON works.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Quiet period before pending input becomes operations.
    pub input_debounce_ms: u64,
    /// Placeholder shown by the paragraph of an empty document.
    pub placeholder_text: Option<String>,
    pub default_layout: LayoutType,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            input_debounce_ms: 300,
            placeholder_text: None,
            default_layout: LayoutType::SingleColumn,
        }
    }
}

impl EditorConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn input_debounce(&self) -> Duration {
        Duration::from_millis(self.input_debounce_ms)
    }
}

/// The text a regex trigger matched, ending at the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegexMatch {
    pub component: ComponentName,
    pub text: String,
    /// Matched length in characters.
    pub len: usize,
}

pub type RegexHandler = Arc<dyn Fn(&mut Editor, &RegexMatch) -> Result<()> + Send + Sync>;

#[derive(Clone)]
struct RegexTrigger {
    regex: Regex,
    handler: RegexHandler,
}

/// Editing facade: owns the article and turns user intents into
/// transactions with explicit cursor placement.
pub struct Editor {
    article: Article,
    config: EditorConfig,
    regexes: Vec<RegexTrigger>,
    embed_providers: Vec<String>,
    pending: Option<PendingInput>,
    reinstalling: bool,
}

impl Editor {
    /// Creates an editor with the built-in component classes installed and
    /// an empty document.
    pub fn new(config: EditorConfig) -> Result<Self> {
        let mut editor = Self {
            article: Article::new(Document::new(), ComponentRegistry::new()),
            config,
            regexes: Vec::new(),
            embed_providers: Vec::new(),
            pending: None,
            reinstalling: false,
        };
        for class in builtin_classes() {
            editor.install(class, None, false)?;
        }
        editor.load_article(&ArticleModel::default())?;
        Ok(editor)
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(EditorConfig::default())
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn article(&self) -> &Article {
        &self.article
    }

    pub fn doc(&self) -> &Document {
        self.article.doc()
    }

    pub fn selection(&self) -> &Selection {
        self.article.selection()
    }

    pub fn registry(&self) -> &ComponentRegistry {
        self.article.registry()
    }

    pub fn history(&self) -> &[Transaction] {
        self.article.history()
    }

    pub fn history_at(&self) -> usize {
        self.article.history_at()
    }

    pub fn take_changes(&mut self) -> Vec<Change> {
        self.article.take_changes()
    }

    pub fn embed_providers(&self) -> &[String] {
        &self.embed_providers
    }

    pub(crate) fn set_embed_providers(&mut self, providers: Vec<String>) {
        self.embed_providers = providers;
    }

    /// Registers a component class and runs its install hook once.
    pub fn install(
        &mut self,
        class: Arc<dyn ComponentClass>,
        config: Option<&Value>,
        override_existing: bool,
    ) -> Result<()> {
        let name = class.class_name();
        if self.registry().contains(name) && !override_existing {
            return Err(EditorError::AlreadyRegistered {
                kind: "component class",
                name: name.to_string(),
            });
        }
        self.reinstalling = override_existing && self.registry().contains(name);
        let installed = class.on_install(self, config);
        self.reinstalling = false;
        installed?;
        self.article.registry_mut().register(class, true)?;
        debug!(class = name, "installed component class");
        Ok(())
    }

    /// True while `install` replaces an already registered class. Install
    /// hooks pass it on so their own registrations may replace the old ones.
    pub fn is_reinstalling(&self) -> bool {
        self.reinstalling
    }

    /// Runs `handler` whenever the text before the cursor matches `pattern`
    /// right after a space is typed.
    pub fn register_regex(
        &mut self,
        pattern: &str,
        handler: RegexHandler,
        override_existing: bool,
    ) -> Result<()> {
        let regex = Regex::new(pattern)?;
        let existing = self.regexes.iter().position(|t| t.regex.as_str() == pattern);
        match existing {
            Some(_) if !override_existing => Err(EditorError::AlreadyRegistered {
                kind: "regex",
                name: pattern.to_string(),
            }),
            Some(ix) => {
                self.regexes[ix] = RegexTrigger { regex, handler };
                Ok(())
            }
            None => {
                self.regexes.push(RegexTrigger { regex, handler });
                Ok(())
            }
        }
    }

    pub fn regex_patterns(&self) -> Vec<&str> {
        self.regexes.iter().map(|t| t.regex.as_str()).collect()
    }

    /// Replaces the document. History is cleared and the cursor moves to
    /// the start of the first leaf.
    pub fn load_article(&mut self, model: &ArticleModel) -> Result<()> {
        for section in &model.sections {
            for class in section.class_names() {
                self.registry().load(class)?;
            }
        }
        let mut doc = Document::from_model(model)?;
        let mut planner = Planner::new(&doc);
        if self.ensure_paragraph(&mut planner)?.is_some() {
            for pair in planner.into_ops() {
                apply_op(&mut doc, &pair.do_op)?;
            }
        }
        let selection = match doc.first_leaf_in_document()? {
            Some(leaf) => Selection::collapsed(SelectionPoint::new(leaf, 0)),
            None => Selection::default(),
        };
        self.pending = None;
        self.article.reset(doc, selection);
        debug!(sections = model.sections.len(), "loaded article");
        Ok(())
    }

    pub fn load_json(&mut self, json: &str) -> Result<()> {
        let model = ArticleModel::from_json_str(json)?;
        self.load_article(&model)
    }

    /// Committed document state. Pending input is not included; flush it
    /// first.
    pub fn to_model(&self) -> Result<ArticleModel> {
        self.doc().to_model()
    }

    pub fn set_cursor(&mut self, point: SelectionPoint) -> Result<()> {
        self.flush_pending_input()?;
        self.check_point(&point)?;
        self.article.set_selection(Selection::collapsed(point));
        Ok(())
    }

    pub fn select(&mut self, a: SelectionPoint, b: SelectionPoint) -> Result<()> {
        self.flush_pending_input()?;
        self.check_point(&a)?;
        self.check_point(&b)?;
        let mut selection = Selection::default();
        selection.select(self.doc(), a, b)?;
        self.article.set_selection(selection);
        Ok(())
    }

    pub fn select_all(&mut self) -> Result<()> {
        let (Some(first), Some(last)) = (
            self.doc().first_leaf_in_document()?,
            self.doc().last_leaf_in_document()?,
        ) else {
            return Ok(());
        };
        let len = self.doc().get_length(&last)?;
        self.select(SelectionPoint::new(first, 0), SelectionPoint::new(last, len))
    }

    pub fn can_undo(&self) -> bool {
        self.pending.as_ref().is_some_and(|p| !p.is_unchanged()) || self.article.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.article.can_redo()
    }

    pub fn undo(&mut self) -> Result<bool> {
        self.flush_pending_input()?;
        self.article.undo()
    }

    pub fn redo(&mut self) -> Result<bool> {
        self.flush_pending_input()?;
        self.article.redo()
    }

    // Debounced input.

    pub fn pending_input(&self) -> Option<&PendingInput> {
        self.pending.as_ref()
    }

    /// Records the text a paragraph now shows in the rendered view. The
    /// model catches up when the input is flushed.
    pub fn on_dom_input(
        &mut self,
        component: &ComponentName,
        text: &str,
        cursor: usize,
        now: Instant,
    ) -> Result<()> {
        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.component() != component)
        {
            self.flush_pending_input()?;
        }
        let baseline = self.doc().paragraph(component)?.text().to_string();
        let pending = self
            .pending
            .get_or_insert_with(|| PendingInput::new(component.clone(), &baseline, now));
        pending.update(text, cursor, now);
        Ok(())
    }

    /// Flushes pending input once the debounce window has passed.
    pub fn tick(&mut self, now: Instant) -> Result<bool> {
        let due = self
            .pending
            .as_ref()
            .is_some_and(|p| p.is_due(now, self.config.input_debounce()));
        if !due {
            return Ok(false);
        }
        self.flush_pending_input()
    }

    /// Turns pending input into one transaction. Returns whether anything
    /// was committed.
    pub fn flush_pending_input(&mut self) -> Result<bool> {
        let Some(pending) = self.pending.take() else {
            return Ok(false);
        };
        if pending.is_unchanged() || !self.doc().contains(pending.component()) {
            return Ok(false);
        }
        let ops = pending.to_ops(self.doc())?;
        let component = pending.component().clone();
        let offset = pending.cursor().min(char_len(pending.current()));
        let selection = Selection::collapsed(SelectionPoint::new(component.clone(), offset));
        self.article
            .commit(Edit::new(ops).selection_after(selection).source("input"))?;
        if char_slice(pending.current(), 0, offset).ends_with(' ') {
            self.run_regex_triggers(&component)?;
        }
        Ok(true)
    }

    // Text entry.

    /// Inserts `text` at the cursor, replacing a range selection.
    pub fn type_text(&mut self, text: &str) -> Result<()> {
        if text.contains('\n') {
            return self.paste_text(text);
        }
        // Markers are dropped on insert, so the cursor counts what is stored.
        let text = normalize_text(text);
        if text.is_empty() {
            return Ok(());
        }
        self.flush_pending_input()?;
        let mut planner = Planner::new(self.doc());
        let point = self.plan_delete_selection(&mut planner)?;
        let (target, offset) = self.writable_point(&mut planner, point)?;
        let ops = planner.doc().get_insert_chars_ops(&target, &text, offset)?;
        planner.extend(ops)?;
        let cursor = SelectionPoint::new(target.clone(), offset + char_len(&text));
        self.commit(planner, Selection::collapsed(cursor), "type")?;
        if text.ends_with(' ') {
            self.run_regex_triggers(&target)?;
        }
        Ok(())
    }

    /// Pastes plain text; each line after the first becomes a paragraph.
    pub fn paste_text(&mut self, text: &str) -> Result<()> {
        self.flush_pending_input()?;
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        let lines: Vec<&str> = text.split('\n').collect();
        let mut planner = Planner::new(self.doc());
        let point = self.plan_delete_selection(&mut planner)?;
        let (target, offset) = self.writable_point(&mut planner, point)?;

        let Some((last_line, first_lines)) = lines.split_last() else {
            return Ok(());
        };
        // Captions hold a single line.
        if first_lines.is_empty() || planner.doc().resolve(&target)?.is_inline() {
            let line = lines.join(" ");
            let ops = planner.doc().get_insert_chars_ops(&target, &line, offset)?;
            planner.extend(ops)?;
            let cursor = SelectionPoint::new(target, offset + char_len(&line));
            return self.commit(planner, Selection::collapsed(cursor), "paste");
        }

        let paragraph = planner.doc().paragraph(&target)?;
        let len = paragraph.len();
        let tail = paragraph.slice(offset, len).to_string();
        let tail_formats = offset_formats(
            &paragraph.get_formats_for_range(offset, len),
            -(offset as isize),
        );
        let line_type = match paragraph.paragraph_type() {
            ParagraphType::ListItem => ParagraphType::ListItem,
            _ => ParagraphType::Paragraph,
        };
        if offset < len {
            let ops = planner
                .doc()
                .get_remove_chars_ops(&target, len - offset, offset, Direction::Forward)?;
            planner.extend(ops)?;
        }
        let ops = planner.doc().get_insert_chars_ops(&target, first_lines[0], offset)?;
        planner.extend(ops)?;

        let mut previous = target;
        for line in &first_lines[1..] {
            let model = ParagraphModel {
                text: line.to_string(),
                paragraph_type: line_type,
                ..ParagraphModel::default()
            };
            previous = insert_after(&mut planner, &previous, ComponentModel::Paragraph(model))?;
        }
        let last_len = char_len(last_line);
        let model = ParagraphModel {
            text: format!("{last_line}{tail}"),
            paragraph_type: line_type,
            formats: offset_formats(&tail_formats, last_len as isize),
            ..ParagraphModel::default()
        };
        let last = insert_after(&mut planner, &previous, ComponentModel::Paragraph(model))?;
        self.commit(
            planner,
            Selection::collapsed(SelectionPoint::new(last, last_len)),
            "paste",
        )
    }

    // Structural keys.

    pub fn handle_enter(&mut self) -> Result<()> {
        self.flush_pending_input()?;
        let mut planner = Planner::new(self.doc());
        let point = self.plan_delete_selection(&mut planner)?;
        let component = planner.doc().resolve(&point.component)?.clone();

        let cursor = match component.kind() {
            ComponentKind::Paragraph(_) if component.is_inline() => {
                // Enter inside a caption continues after its owner.
                let owner = planner.doc().block_anchor(&point.component)?.clone();
                let name = insert_after(&mut planner, &owner, self.empty_paragraph(None))?;
                SelectionPoint::new(name, 0)
            }
            ComponentKind::Paragraph(paragraph) => {
                let in_list = self.owner_is_list(planner.doc(), &point.component)?;
                if in_list && paragraph.is_empty() {
                    let name = unlist(&mut planner, &point.component)?;
                    SelectionPoint::new(name, 0)
                } else if point.offset == 0 && !paragraph.is_empty() {
                    let (section, index) = position_of(planner.doc(), &point.component)?;
                    let model = ParagraphModel {
                        paragraph_type: paragraph.paragraph_type(),
                        ..ParagraphModel::default()
                    };
                    insert_at(
                        &mut planner,
                        section.as_ref(),
                        index,
                        ComponentModel::Paragraph(model),
                    )?;
                    point.clone()
                } else {
                    let name = split_paragraph(&mut planner, &point.component, point.offset)?;
                    SelectionPoint::new(name, 0)
                }
            }
            _ if point.offset == 0 => {
                let (section, index) = position_of(planner.doc(), &point.component)?;
                insert_at(&mut planner, section.as_ref(), index, self.empty_paragraph(None))?;
                point.clone()
            }
            _ => {
                let name = insert_after(&mut planner, &point.component, self.empty_paragraph(None))?;
                SelectionPoint::new(name, 0)
            }
        };
        self.commit(planner, Selection::collapsed(cursor), "enter")
    }

    pub fn handle_backspace(&mut self) -> Result<()> {
        self.flush_pending_input()?;
        if self.selection().is_range() {
            return self.delete_selection("backspace");
        }
        let point = self.cursor()?;
        let doc = self.doc();
        let component = doc.resolve(&point.component)?;
        let mut planner = Planner::new(doc);

        let Some(paragraph) = component.paragraph() else {
            if point.offset == 0 {
                return self.move_cursor_left();
            }
            let cursor = self.neighbour_point(&point.component, false)?;
            let ops = planner.doc().get_delete_ops(&point.component, 0, None)?;
            planner.extend(ops)?;
            return self.commit_with_fallback(planner, cursor, "backspace");
        };

        if point.offset > 0 {
            let ops = planner.doc().get_remove_chars_ops(
                &point.component,
                1,
                point.offset,
                Direction::Backward,
            )?;
            planner.extend(ops)?;
            let cursor = SelectionPoint::new(point.component.clone(), point.offset - 1);
            return self.commit(planner, Selection::collapsed(cursor), "backspace");
        }
        if component.is_inline() {
            return Ok(());
        }
        if self.owner_is_list(doc, &point.component)? {
            let name = unlist(&mut planner, &point.component)?;
            return self.commit(
                planner,
                Selection::collapsed(SelectionPoint::new(name, 0)),
                "backspace",
            );
        }

        let Some(previous) = doc.get_previous_component(&point.component)? else {
            return Ok(());
        };
        let previous_len = doc.get_length(&previous)?;
        if doc.resolve(&previous)?.paragraph().is_some() {
            let range = Selection {
                start: Some(SelectionPoint::new(previous.clone(), previous_len)),
                end: Some(point.clone()),
            };
            let ops = range.get_delete_selection_ops(planner.doc())?;
            planner.extend(ops)?;
            let cursor = SelectionPoint::new(previous, previous_len);
            return self.commit(planner, Selection::collapsed(cursor), "backspace");
        }

        // An embed precedes: drop an empty paragraph, otherwise step onto it.
        let cursor = SelectionPoint::new(previous, previous_len);
        if paragraph.is_empty() {
            let ops = planner.doc().get_delete_ops(&point.component, 0, None)?;
            planner.extend(ops)?;
            return self.commit(planner, Selection::collapsed(cursor), "backspace");
        }
        self.article.set_selection(Selection::collapsed(cursor));
        Ok(())
    }

    pub fn handle_delete(&mut self) -> Result<()> {
        self.flush_pending_input()?;
        if self.selection().is_range() {
            return self.delete_selection("delete");
        }
        let point = self.cursor()?;
        let doc = self.doc();
        let component = doc.resolve(&point.component)?;
        let mut planner = Planner::new(doc);

        let Some(paragraph) = component.paragraph() else {
            if point.offset > 0 {
                return self.move_cursor_right();
            }
            let cursor = self.neighbour_point(&point.component, true)?;
            let ops = planner.doc().get_delete_ops(&point.component, 0, None)?;
            planner.extend(ops)?;
            return self.commit_with_fallback(planner, cursor, "delete");
        };

        if point.offset < paragraph.len() {
            let ops = planner.doc().get_remove_chars_ops(
                &point.component,
                1,
                point.offset,
                Direction::Forward,
            )?;
            planner.extend(ops)?;
            return self.commit(planner, Selection::collapsed(point), "delete");
        }
        if component.is_inline() {
            return Ok(());
        }

        let Some(next) = doc.get_next_component(&point.component)? else {
            return Ok(());
        };
        if doc.resolve(&next)?.paragraph().is_some() {
            let range = Selection {
                start: Some(point.clone()),
                end: Some(SelectionPoint::new(next, 0)),
            };
            let ops = range.get_delete_selection_ops(planner.doc())?;
            planner.extend(ops)?;
            return self.commit(planner, Selection::collapsed(point), "delete");
        }

        let cursor = SelectionPoint::new(next, 0);
        if paragraph.is_empty() {
            let ops = planner.doc().get_delete_ops(&point.component, 0, None)?;
            planner.extend(ops)?;
            return self.commit(planner, Selection::collapsed(cursor), "delete");
        }
        self.article.set_selection(Selection::collapsed(cursor));
        Ok(())
    }

    /// Removes the selected content and returns it as plain text.
    pub fn cut(&mut self) -> Result<String> {
        self.flush_pending_input()?;
        if !self.selection().is_range() {
            return Ok(String::new());
        }
        let text = self.selected_text()?;
        self.delete_selection("cut")?;
        Ok(text)
    }

    /// Plain text of the selection, one line per paragraph.
    pub fn selected_text(&self) -> Result<String> {
        let (Some(start), Some(end)) = (&self.selection().start, &self.selection().end) else {
            return Ok(String::new());
        };
        let doc = self.doc();
        if start.component == end.component {
            return Ok(match doc.resolve(&start.component)?.paragraph() {
                Some(p) => p.slice(start.offset, end.offset).to_string(),
                None => String::new(),
            });
        }
        let mut lines = Vec::new();
        if let Some(p) = doc.resolve(&start.component)?.paragraph() {
            lines.push(p.slice(start.offset, p.len()).to_string());
        }
        for name in doc.get_components_between(&start.component, &end.component)? {
            if let Some(p) = doc.resolve(&name)?.paragraph() {
                lines.push(p.text().to_string());
            }
        }
        if let Some(p) = doc.resolve(&end.component)?.paragraph() {
            lines.push(p.slice(0, end.offset).to_string());
        }
        Ok(lines.join("\n"))
    }

    // Formatting.

    /// Toggles an inline format over the selection. When every selected
    /// span already carries `kind` it is cleared, otherwise applied.
    pub fn format_selection(&mut self, kind: FormatType, attrs: Option<FormatAttrs>) -> Result<()> {
        self.flush_pending_input()?;
        if !self.selection().is_range() {
            return Ok(());
        }
        let spans = self.selected_spans()?;
        let doc = self.doc();
        let covered = spans.iter().all(|(name, from, to)| {
            doc.paragraph(name).is_ok_and(|p| {
                p.formats()
                    .iter()
                    .any(|f| f.kind == kind && f.from <= *from && f.to >= *to)
            })
        });
        let clear = covered && attrs.is_none();

        let mut planner = Planner::new(doc);
        for (name, from, to) in spans {
            if covered && !clear {
                // Re-applying attrs only updates ranges matching exactly.
                let exact = doc
                    .paragraph(&name)?
                    .formats()
                    .iter()
                    .any(|f| f.kind == kind && f.from == from && f.to == to);
                if !exact {
                    continue;
                }
            }
            if !covered && !clear {
                let p = doc.paragraph(&name)?;
                if p.formats().iter().any(|f| f.kind == kind && f.from <= from && f.to >= to) {
                    continue;
                }
            }
            let mut paragraph = planner.doc().paragraph(&name)?.clone();
            let mut candidate = Format::new(kind, from, to);
            candidate.attrs = attrs.clone();
            paragraph.format(candidate, clear)?;
            let ops = planner.doc().get_update_ops(
                &name,
                ComponentPatch::formats(paragraph.formats().to_vec()),
                None,
                None,
            )?;
            planner.extend(ops)?;
        }
        let selection = self.selection().clone();
        self.commit(planner, selection, "format")
    }

    /// Sets the type of every selected paragraph, or resets them to plain
    /// paragraphs when they all have it already.
    pub fn set_paragraph_type(&mut self, paragraph_type: ParagraphType) -> Result<()> {
        self.flush_pending_input()?;
        let doc = self.doc();
        let targets: Vec<ComponentName> = self
            .selected_paragraphs()?
            .into_iter()
            .filter(|name| {
                doc.paragraph(name).is_ok_and(|p| {
                    !matches!(
                        p.paragraph_type(),
                        ParagraphType::Caption | ParagraphType::ListItem
                    )
                })
            })
            .collect();
        if targets.is_empty() {
            return Ok(());
        }
        let all_set = targets.iter().all(|name| {
            doc.paragraph(name)
                .is_ok_and(|p| p.paragraph_type() == paragraph_type)
        });
        let next = if all_set {
            ParagraphType::Paragraph
        } else {
            paragraph_type
        };
        let mut planner = Planner::new(doc);
        for name in targets {
            let ops = planner
                .doc()
                .get_update_ops(&name, ComponentPatch::paragraph_type(next), None, None)?;
            planner.extend(ops)?;
        }
        let selection = self.selection().clone();
        self.commit(planner, selection, "paragraph-type")
    }

    /// Wraps the selected paragraphs in a list of `tag`, switches the tag
    /// of the lists they are in, or unwraps them when they already are.
    pub fn toggle_list(&mut self, tag: ListTag) -> Result<()> {
        self.flush_pending_input()?;
        let doc = self.doc();
        let paragraphs = self.selected_paragraphs()?;
        if paragraphs.is_empty() {
            return Ok(());
        }
        let mut owners = Vec::with_capacity(paragraphs.len());
        for name in &paragraphs {
            owners.push(self.list_of(doc, name)?);
        }

        let mut planner = Planner::new(doc);
        let mut renames = HashMap::new();
        if owners.iter().all(Option::is_some) {
            let lists: Vec<(ComponentName, ListTag)> = owners.into_iter().flatten().collect();
            if lists.iter().all(|(_, t)| *t == tag) {
                for name in &paragraphs {
                    let renamed = unlist(&mut planner, name)?;
                    renames.insert(name.clone(), renamed);
                }
            } else {
                let mut seen = Vec::new();
                for (list, _) in lists {
                    if seen.contains(&list) {
                        continue;
                    }
                    let ops = planner
                        .doc()
                        .get_update_ops(&list, ComponentPatch::tag_name(tag), None, None)?;
                    planner.extend(ops)?;
                    seen.push(list);
                }
            }
        } else {
            for (name, owner) in paragraphs.iter().zip(owners) {
                if owner.is_some() {
                    continue;
                }
                let renamed = into_list(&mut planner, name, 0, tag)?;
                renames.insert(name.clone(), renamed);
            }
        }
        let selection = remap_selection(self.selection(), &renames);
        self.commit(planner, selection, "list")
    }

    /// Turns `component` into a list item after a trigger matched, dropping
    /// the first `strip` characters.
    pub fn convert_to_list_item(
        &mut self,
        component: &ComponentName,
        strip: usize,
        tag: ListTag,
    ) -> Result<()> {
        let doc = self.doc();
        let Some(resolved) = doc.get_reference(component) else {
            return Ok(());
        };
        let eligible = !resolved.is_inline()
            && resolved
                .paragraph()
                .is_some_and(|p| p.paragraph_type() == ParagraphType::Paragraph);
        if !eligible || self.owner_is_list(doc, component)? {
            return Ok(());
        }
        let mut planner = Planner::new(doc);
        let renamed = into_list(&mut planner, component, strip, tag)?;
        self.commit(
            planner,
            Selection::collapsed(SelectionPoint::new(renamed, 0)),
            "list-trigger",
        )
    }

    // Blocks.

    pub fn insert_figure(
        &mut self,
        src: &str,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<ComponentName> {
        self.flush_pending_input()?;
        let model = ComponentModel::Figure(FigureModel {
            name: None,
            src: src.to_string(),
            width,
            height,
            caption: ParagraphModel {
                paragraph_type: ParagraphType::Caption,
                ..ParagraphModel::default()
            },
        });
        let mut planner = Planner::new(self.doc());
        let point = self.plan_delete_selection(&mut planner)?;
        let name = self.plan_block_insert(&mut planner, &point, model)?;
        self.ensure_paragraph(&mut planner)?;
        let cursor = SelectionPoint::new(name.clone(), 1);
        self.commit(planner, Selection::collapsed(cursor), "figure")?;
        Ok(name)
    }

    /// Inserts an embed for `url` right away and returns the lookup the
    /// host must resolve through [`Editor::complete_embed`].
    pub fn insert_embed(&mut self, url: &str) -> Result<EmbedTask> {
        self.flush_pending_input()?;
        self.registry().load(EMBEDDED_COMPONENT)?;
        let provider = self
            .embed_providers
            .iter()
            .find(|provider| url.contains(provider.as_str()))
            .cloned()
            .ok_or_else(|| EditorError::invalid(format!("no embed provider handles `{url}`")))?;
        let model = ComponentModel::Embed(EmbedModel {
            name: None,
            url: url.to_string(),
            provider: None,
            width: None,
            height: None,
            caption: ParagraphModel {
                paragraph_type: ParagraphType::Caption,
                ..ParagraphModel::default()
            },
        });
        let mut planner = Planner::new(self.doc());
        let point = self.plan_delete_selection(&mut planner)?;
        let name = self.plan_block_insert(&mut planner, &point, model)?;
        self.ensure_paragraph(&mut planner)?;
        let cursor = SelectionPoint::new(name.clone(), 1);
        self.commit(planner, Selection::collapsed(cursor), "embed")?;
        Ok(EmbedTask {
            component: name,
            url: url.to_string(),
            provider,
        })
    }

    /// Applies a finished embed lookup. A task whose component is gone is
    /// discarded and `Ok(false)` returned; a failed lookup removes the
    /// embed.
    pub fn complete_embed(
        &mut self,
        task: &EmbedTask,
        result: std::result::Result<EmbedInfo, String>,
    ) -> Result<bool> {
        if !self.doc().contains(&task.component) {
            debug!(component = %task.component, "discarding stale embed task");
            return Ok(false);
        }
        self.flush_pending_input()?;
        let mut planner = Planner::new(self.doc());
        match result {
            Ok(info) => {
                let patch = ComponentPatch {
                    provider: Some(Some(task.provider.clone())),
                    width: Some(info.width),
                    height: Some(info.height),
                    ..ComponentPatch::default()
                };
                let ops = planner.doc().get_update_ops(&task.component, patch, None, None)?;
                planner.extend(ops)?;
                let selection = self.selection().clone();
                self.commit(planner, selection, "embed-complete")?;
            }
            Err(reason) => {
                warn!(url = %task.url, %reason, "embed lookup failed");
                let cursor = self.neighbour_point(&task.component, false)?;
                let ops = planner.doc().get_delete_ops(&task.component, 0, None)?;
                planner.extend(ops)?;
                let selection = if self.selection_touches(&task.component) {
                    cursor
                } else {
                    self.selection().start.clone()
                };
                self.commit_with_fallback(planner, selection, "embed-failed")?;
            }
        }
        Ok(true)
    }

    /// Gives the layout around the cursor a new type. Siblings of the
    /// cursor's block are split off first so only that block changes.
    pub fn set_layout_type(&mut self, layout_type: LayoutType) -> Result<()> {
        self.flush_pending_input()?;
        let point = self.cursor()?;
        let doc = self.doc();
        let Some(layout) = doc.find_ancestor(&point.component, |c| {
            matches!(c.kind(), ComponentKind::Layout { .. })
        })?
        else {
            return Ok(());
        };
        if let ComponentKind::Layout { layout_type: current, .. } = doc.resolve(&layout)?.kind() {
            if *current == layout_type {
                return Ok(());
            }
        }

        let child = doc
            .find_ancestor(&point.component, |c| c.section() == Some(&layout))?
            .ok_or_else(|| EditorError::invalid("cursor is not inside its layout"))?;
        let index = doc.get_index_in_section(&child)?;
        let len = doc.children_of(Some(&layout))?.len();

        let mut planner = Planner::new(doc);
        if index + 1 < len {
            let (ops, _) = planner.doc().get_split_ops(&layout, index + 1)?;
            planner.extend(ops)?;
        }
        let target = if index > 0 {
            let (ops, sibling) = planner.doc().get_split_ops(&layout, index)?;
            planner.extend(ops)?;
            sibling
        } else {
            layout
        };
        let ops = planner
            .doc()
            .get_update_ops(&target, ComponentPatch::layout_type(layout_type), None, None)?;
        planner.extend(ops)?;
        let selection = self.selection().clone();
        self.commit(planner, selection, "layout")
    }

    // Cursor movement.

    pub fn move_cursor_left(&mut self) -> Result<()> {
        self.flush_pending_input()?;
        let selection = self.selection().clone();
        if selection.is_range() {
            if let Some(start) = selection.start {
                self.article.set_selection(Selection::collapsed(start));
            }
            return Ok(());
        }
        let point = self.cursor()?;
        let next = if point.offset > 0 {
            SelectionPoint::new(point.component, point.offset - 1)
        } else {
            let doc = self.doc();
            match doc.get_previous_component(&point.component)? {
                Some(previous) => {
                    let len = doc.get_length(&previous)?;
                    SelectionPoint::new(previous, len)
                }
                None => point,
            }
        };
        self.article.set_selection(Selection::collapsed(next));
        Ok(())
    }

    pub fn move_cursor_right(&mut self) -> Result<()> {
        self.flush_pending_input()?;
        let selection = self.selection().clone();
        if selection.is_range() {
            if let Some(end) = selection.end {
                self.article.set_selection(Selection::collapsed(end));
            }
            return Ok(());
        }
        let point = self.cursor()?;
        let len = self.doc().get_length(&point.component)?;
        let next = if point.offset < len {
            SelectionPoint::new(point.component, point.offset + 1)
        } else {
            match self.doc().get_next_component(&point.component)? {
                Some(next) => SelectionPoint::new(next, 0),
                None => point,
            }
        };
        self.article.set_selection(Selection::collapsed(next));
        Ok(())
    }

    // Helpers.

    fn cursor(&self) -> Result<SelectionPoint> {
        self.selection()
            .start
            .clone()
            .ok_or_else(|| EditorError::invalid("no selection"))
    }

    fn check_point(&self, point: &SelectionPoint) -> Result<()> {
        let len = self.doc().get_length(&point.component)?;
        if point.offset > len {
            return Err(EditorError::IndexOutOfRange {
                container: point.component.to_string(),
                index: point.offset,
                len,
            });
        }
        Ok(())
    }

    fn selection_touches(&self, name: &ComponentName) -> bool {
        let selection = self.selection();
        [&selection.start, &selection.end]
            .into_iter()
            .flatten()
            .any(|p| &p.component == name)
    }

    fn empty_paragraph(&self, placeholder: Option<String>) -> ComponentModel {
        ComponentModel::Paragraph(ParagraphModel {
            placeholder_text: placeholder,
            ..ParagraphModel::default()
        })
    }

    fn default_layout(&self) -> ComponentModel {
        ComponentModel::Layout(LayoutModel {
            name: None,
            layout_type: self.config.default_layout,
            components: vec![self.empty_paragraph(self.config.placeholder_text.clone())],
        })
    }

    /// Adds an empty paragraph when the document has none left. Returns the
    /// new paragraph.
    fn ensure_paragraph(&self, planner: &mut Planner) -> Result<Option<ComponentName>> {
        let doc = planner.doc();
        for leaf in doc.leaves()? {
            if doc.resolve(&leaf)?.paragraph().is_some() {
                return Ok(None);
            }
        }
        let mut layout = self.default_layout();
        doc.assign_names(&mut layout);
        let paragraph = layout
            .children()
            .first()
            .and_then(ComponentModel::name)
            .cloned()
            .ok_or_else(|| EditorError::invalid("default layout has no paragraph"))?;
        let ops = match doc.sections().last() {
            Some(section) => {
                let len = doc.children_of(Some(section))?.len();
                doc.get_insert_ops(layout, Some(section), len, None, None)?
            }
            None => {
                let section = ComponentModel::Section(SectionModel {
                    name: None,
                    components: vec![layout],
                });
                doc.get_insert_ops(section, None, doc.sections().len(), None, None)?
            }
        };
        planner.extend(ops)?;
        Ok(Some(paragraph))
    }

    /// Plans removal of a range selection and returns where the cursor ends
    /// up. A collapsed selection plans nothing.
    fn plan_delete_selection(&self, planner: &mut Planner) -> Result<SelectionPoint> {
        let selection = self.selection().clone();
        let start = selection
            .start
            .clone()
            .ok_or_else(|| EditorError::invalid("no selection"))?;
        if !selection.is_range() {
            return Ok(start);
        }
        let end = selection.end.clone().unwrap_or_else(|| start.clone());
        let ops = selection.get_delete_selection_ops(planner.doc())?;
        planner.extend(ops)?;

        let doc = planner.doc();
        let point = if doc.contains(&start.component) {
            let len = doc.get_length(&start.component)?;
            SelectionPoint::new(start.component, start.offset.min(len))
        } else if doc.contains(&end.component) {
            SelectionPoint::new(end.component, 0)
        } else {
            match self.ensure_paragraph(planner)? {
                Some(name) => SelectionPoint::new(name, 0),
                None => {
                    let first = planner
                        .doc()
                        .first_leaf_in_document()?
                        .ok_or_else(|| EditorError::invalid("document has no leaves"))?;
                    SelectionPoint::new(first, 0)
                }
            }
        };
        Ok(point)
    }

    fn delete_selection(&mut self, source: &str) -> Result<()> {
        let mut planner = Planner::new(self.doc());
        let point = self.plan_delete_selection(&mut planner)?;
        self.commit_with_fallback(planner, Some(point), source)
    }

    /// A paragraph position text can be typed at. On an embed a new
    /// paragraph is planned after it.
    fn writable_point(
        &self,
        planner: &mut Planner,
        point: SelectionPoint,
    ) -> Result<(ComponentName, usize)> {
        if planner.doc().resolve(&point.component)?.paragraph().is_some() {
            return Ok((point.component, point.offset));
        }
        let name = if point.offset == 0 {
            let (section, index) = position_of(planner.doc(), &point.component)?;
            insert_at(planner, section.as_ref(), index, self.empty_paragraph(None))?
        } else {
            insert_after(planner, &point.component, self.empty_paragraph(None))?
        };
        Ok((name, 0))
    }

    /// Places a block component at the cursor, splitting the paragraph when
    /// the cursor is inside its text. An empty paragraph is replaced.
    fn plan_block_insert(
        &self,
        planner: &mut Planner,
        point: &SelectionPoint,
        model: ComponentModel,
    ) -> Result<ComponentName> {
        let doc = planner.doc();
        let component = doc.resolve(&point.component)?;
        if component.is_inline() {
            let owner = doc.block_anchor(&point.component)?.clone();
            return insert_after(planner, &owner, model);
        }
        if let Some(list) = self.list_of(doc, &point.component)?.map(|(list, _)| list) {
            return insert_after(planner, &list, model);
        }
        let Some(paragraph) = component.paragraph() else {
            return insert_after(planner, &point.component, model);
        };
        let (section, index) = position_of(doc, &point.component)?;
        if paragraph.is_empty() {
            let name = insert_at(planner, section.as_ref(), index, model)?;
            let ops = planner.doc().get_delete_ops(&point.component, 0, None)?;
            planner.extend(ops)?;
            return Ok(name);
        }
        if point.offset == 0 {
            return insert_at(planner, section.as_ref(), index, model);
        }
        if point.offset < paragraph.len() {
            split_paragraph(planner, &point.component, point.offset)?;
        }
        insert_at(planner, section.as_ref(), index + 1, model)
    }

    fn owner_is_list(&self, doc: &Document, name: &ComponentName) -> Result<bool> {
        Ok(self.list_of(doc, name)?.is_some())
    }

    fn list_of(&self, doc: &Document, name: &ComponentName) -> Result<Option<(ComponentName, ListTag)>> {
        let component = doc.resolve(name)?;
        let Some(owner) = component.section() else {
            return Ok(None);
        };
        Ok(match doc.resolve(owner)?.kind() {
            ComponentKind::List { tag, .. } => Some((owner.clone(), *tag)),
            _ => None,
        })
    }

    /// Leaf paragraphs touched by the selection, in document order.
    fn selected_paragraphs(&self) -> Result<Vec<ComponentName>> {
        let (Some(start), Some(end)) = (&self.selection().start, &self.selection().end) else {
            return Ok(Vec::new());
        };
        let doc = self.doc();
        let mut names = vec![start.component.clone()];
        if start.component != end.component {
            names.extend(doc.get_components_between(&start.component, &end.component)?);
            names.push(end.component.clone());
        }
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let component = doc.resolve(&name)?;
            if component.paragraph().is_some() && !component.is_inline() {
                out.push(name);
            }
        }
        Ok(out)
    }

    /// Non-empty `(paragraph, from, to)` spans covered by the selection.
    fn selected_spans(&self) -> Result<Vec<(ComponentName, usize, usize)>> {
        let (Some(start), Some(end)) = (&self.selection().start, &self.selection().end) else {
            return Ok(Vec::new());
        };
        let doc = self.doc();
        let mut spans = Vec::new();
        if start.component == end.component {
            if doc.resolve(&start.component)?.paragraph().is_some() {
                spans.push((start.component.clone(), start.offset, end.offset));
            }
        } else {
            if let Some(p) = doc.resolve(&start.component)?.paragraph() {
                spans.push((start.component.clone(), start.offset, p.len()));
            }
            for name in doc.get_components_between(&start.component, &end.component)? {
                if let Some(p) = doc.resolve(&name)?.paragraph() {
                    spans.push((name, 0, p.len()));
                }
            }
            if doc.resolve(&end.component)?.paragraph().is_some() {
                spans.push((end.component.clone(), 0, end.offset));
            }
        }
        spans.retain(|(_, from, to)| from < to);
        Ok(spans)
    }

    /// Where the cursor goes once `name` is removed: the end of the
    /// previous leaf, else the start of the next one.
    fn neighbour_point(&self, name: &ComponentName, forward: bool) -> Result<Option<SelectionPoint>> {
        let doc = self.doc();
        let previous = match doc.get_previous_component(name)? {
            Some(previous) => {
                let len = doc.get_length(&previous)?;
                Some(SelectionPoint::new(previous, len))
            }
            None => None,
        };
        let next = doc
            .get_next_component(name)?
            .map(|next| SelectionPoint::new(next, 0));
        Ok(if forward {
            next.or(previous)
        } else {
            previous.or(next)
        })
    }

    fn run_regex_triggers(&mut self, component: &ComponentName) -> Result<bool> {
        let Some(paragraph) = self.doc().get_reference(component).and_then(|c| c.paragraph()) else {
            return Ok(false);
        };
        let cursor = match &self.selection().start {
            Some(point) if &point.component == component => point.offset,
            _ => paragraph.len(),
        };
        let before = char_slice(paragraph.text(), 0, cursor).to_string();
        let triggers = self.regexes.clone();
        for trigger in triggers {
            let Some(found) = trigger.regex.find(&before) else {
                continue;
            };
            let matched = RegexMatch {
                component: component.clone(),
                text: found.as_str().to_string(),
                len: char_len(found.as_str()),
            };
            debug!(pattern = trigger.regex.as_str(), component = %component, "regex trigger");
            (trigger.handler)(self, &matched)?;
            return Ok(true);
        }
        Ok(false)
    }

    fn commit(&mut self, planner: Planner, selection: Selection, source: &str) -> Result<()> {
        let selection = settle_selection(planner.doc(), selection)?;
        self.article
            .commit(Edit::new(planner.into_ops()).selection_after(selection).source(source))
    }

    fn commit_with_fallback(
        &mut self,
        mut planner: Planner,
        cursor: Option<SelectionPoint>,
        source: &str,
    ) -> Result<()> {
        let fallback = self.ensure_paragraph(&mut planner)?;
        let selection = match (cursor, fallback) {
            (_, Some(paragraph)) => Selection::collapsed(SelectionPoint::new(paragraph, 0)),
            (Some(point), None) => Selection::collapsed(point),
            (None, None) => Selection::default(),
        };
        self.commit(planner, selection, source)
    }
}

/// Keeps `selection` when it resolves in `doc`, otherwise collapses it to
/// the start of the first leaf.
fn settle_selection(doc: &Document, selection: Selection) -> Result<Selection> {
    if !selection.is_empty() && selection.is_valid_in(doc) {
        return Ok(selection);
    }
    Ok(match doc.first_leaf_in_document()? {
        Some(first) => Selection::collapsed(SelectionPoint::new(first, 0)),
        None => Selection::default(),
    })
}

fn remap_selection(selection: &Selection, renames: &HashMap<ComponentName, ComponentName>) -> Selection {
    let remap = |point: &Option<SelectionPoint>| {
        point.as_ref().map(|p| match renames.get(&p.component) {
            Some(name) => SelectionPoint::new(name.clone(), p.offset),
            None => p.clone(),
        })
    };
    Selection {
        start: remap(&selection.start),
        end: remap(&selection.end),
    }
}

fn position_of(doc: &Document, name: &ComponentName) -> Result<(Option<ComponentName>, usize)> {
    let section = doc.resolve(name)?.section().cloned();
    Ok((section, doc.get_index_in_section(name)?))
}

fn insert_at(
    planner: &mut Planner,
    section: Option<&ComponentName>,
    index: usize,
    mut model: ComponentModel,
) -> Result<ComponentName> {
    let name = planner.doc().assign_names(&mut model);
    let ops = planner.doc().get_insert_ops(model, section, index, None, None)?;
    planner.extend(ops)?;
    Ok(name)
}

fn insert_after(
    planner: &mut Planner,
    anchor: &ComponentName,
    model: ComponentModel,
) -> Result<ComponentName> {
    let (section, index) = position_of(planner.doc(), anchor)?;
    insert_at(planner, section.as_ref(), index + 1, model)
}

/// Cuts the paragraph at `offset`; the text after it moves, formats
/// included, into a new paragraph right after. Returns the new paragraph.
fn split_paragraph(planner: &mut Planner, name: &ComponentName, offset: usize) -> Result<ComponentName> {
    let paragraph = planner.doc().paragraph(name)?;
    let len = paragraph.len();
    let tail = paragraph.slice(offset, len).to_string();
    let formats = offset_formats(&paragraph.get_formats_for_range(offset, len), -(offset as isize));
    let model = ParagraphModel {
        text: tail,
        paragraph_type: paragraph.paragraph_type().split_successor(),
        formats,
        ..ParagraphModel::default()
    };
    if offset < len {
        let ops = planner
            .doc()
            .get_remove_chars_ops(name, len - offset, offset, Direction::Forward)?;
        planner.extend(ops)?;
    }
    insert_after(planner, name, ComponentModel::Paragraph(model))
}

/// Copy of a paragraph's model under a fresh name with `paragraph_type`,
/// minus its first `strip` characters.
fn reshaped_paragraph(
    doc: &Document,
    name: &ComponentName,
    paragraph_type: ParagraphType,
    strip: usize,
) -> Result<(ComponentName, ComponentModel)> {
    let paragraph = doc.paragraph(name)?;
    let strip = strip.min(paragraph.len());
    let renamed = doc.generate_name();
    let model = ComponentModel::Paragraph(ParagraphModel {
        name: Some(renamed.clone()),
        text: paragraph.slice(strip, paragraph.len()).to_string(),
        paragraph_type,
        formats: shift_for_remove(paragraph.formats().to_vec(), 0, strip),
        placeholder_text: paragraph.placeholder_text().map(str::to_string),
    });
    Ok((renamed, model))
}

/// Moves a list item out of its list as a plain paragraph, splitting the
/// list when the item sits in the middle. Returns the new paragraph.
fn unlist(planner: &mut Planner, name: &ComponentName) -> Result<ComponentName> {
    let doc = planner.doc();
    let list = doc
        .resolve(name)?
        .section()
        .cloned()
        .ok_or_else(|| EditorError::invalid(format!("`{name}` is not in a list")))?;
    let index = doc.get_index_in_section(name)?;
    let len = doc.children_of(Some(&list))?.len();
    let (_, model) = reshaped_paragraph(doc, name, ParagraphType::Paragraph, 0)?;

    if index > 0 && index + 1 < len {
        let (ops, _) = planner.doc().get_split_ops(&list, index + 1)?;
        planner.extend(ops)?;
    }
    let (owner, list_index) = position_of(planner.doc(), &list)?;
    let at = if index == 0 { list_index } else { list_index + 1 };
    let renamed = insert_at(planner, owner.as_ref(), at, model)?;
    let ops = planner.doc().get_delete_ops(name, 0, None)?;
    planner.extend(ops)?;
    Ok(renamed)
}

/// Moves a paragraph into a list of `tag`: the list right before it when
/// one exists, otherwise a new list in its place. Returns the new item.
fn into_list(
    planner: &mut Planner,
    name: &ComponentName,
    strip: usize,
    tag: ListTag,
) -> Result<ComponentName> {
    let doc = planner.doc();
    let (renamed, item) = reshaped_paragraph(doc, name, ParagraphType::ListItem, strip)?;
    let (owner, index) = position_of(doc, name)?;
    let previous = match index {
        0 => None,
        _ => doc.children_of(owner.as_ref())?.get(index - 1).cloned(),
    };
    let joinable = previous.filter(|previous| {
        doc.get_reference(previous).is_some_and(
            |c| matches!(c.kind(), ComponentKind::List { tag: t, .. } if *t == tag),
        )
    });

    match joinable {
        Some(list) => {
            let len = doc.children_of(Some(&list))?.len();
            insert_at(planner, Some(&list), len, item)?;
        }
        None => {
            let list = ComponentModel::List(ListModel {
                name: None,
                tag_name: tag,
                components: vec![item],
            });
            insert_at(planner, owner.as_ref(), index + 1, list)?;
        }
    }
    let ops = planner.doc().get_delete_ops(name, 0, None)?;
    planner.extend(ops)?;
    Ok(renamed)
}
