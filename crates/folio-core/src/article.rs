use tracing::{debug, trace};

use crate::document::Document;
use crate::error::Result;
use crate::interpreter::{Change, CursorHint, apply_op};
use crate::ops::{Op, OpPair, OpSide, Transaction, TransactionMeta};
use crate::registry::ComponentRegistry;
use crate::selection::Selection;

/// A transaction waiting to be committed.
#[derive(Debug, Clone, Default)]
pub struct Edit {
    pub ops: Vec<OpPair>,
    pub selection_after: Option<Selection>,
    pub meta: TransactionMeta,
}

impl Edit {
    pub fn new(ops: Vec<OpPair>) -> Self {
        Self {
            ops,
            ..Self::default()
        }
    }

    pub fn selection_after(mut self, selection: Selection) -> Self {
        self.selection_after = Some(selection);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = Some(source.into());
        self
    }
}

struct Snapshot {
    doc: Document,
    selection: Selection,
    changes: usize,
}

/// Root aggregate: the document, the linear history and the selection.
///
/// `history[..history_at]` has been applied; the rest has been undone and
/// is dropped by the next committed transaction.
#[derive(Debug)]
pub struct Article {
    doc: Document,
    registry: ComponentRegistry,
    history: Vec<Transaction>,
    history_at: usize,
    selection: Selection,
    changes: Vec<Change>,
}

impl Article {
    pub fn new(doc: Document, registry: ComponentRegistry) -> Self {
        Self {
            doc,
            registry,
            history: Vec::new(),
            history_at: 0,
            selection: Selection::default(),
            changes: Vec::new(),
        }
    }

    pub fn doc(&self) -> &Document {
        &self.doc
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.registry
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
    }

    pub fn history(&self) -> &[Transaction] {
        &self.history
    }

    pub fn history_at(&self) -> usize {
        self.history_at
    }

    pub fn can_undo(&self) -> bool {
        self.history_at > 0
    }

    pub fn can_redo(&self) -> bool {
        self.history_at < self.history.len()
    }

    /// Replaces the document and forgets all history.
    pub fn reset(&mut self, doc: Document, selection: Selection) {
        self.doc = doc;
        self.selection = selection;
        self.history.clear();
        self.history_at = 0;
        self.changes.clear();
        self.changes.push(Change::Reset);
    }

    /// Drains the change notifications produced since the last call.
    pub fn take_changes(&mut self) -> Vec<Change> {
        std::mem::take(&mut self.changes)
    }

    pub fn transaction(&mut self, ops: Vec<OpPair>) -> Result<()> {
        self.commit(Edit::new(ops))
    }

    /// Applies every `do` side in order and records the transaction. On
    /// failure the document and selection are restored and history is
    /// left untouched.
    pub fn commit(&mut self, edit: Edit) -> Result<()> {
        if edit.ops.is_empty() {
            return Ok(());
        }
        for pair in &edit.ops {
            pair.validate()?;
        }

        let snapshot = self.snapshot();
        let selection_before = self.selection.clone();
        for pair in &edit.ops {
            if let Err(err) = self.exec(pair, OpSide::Do) {
                self.restore(snapshot);
                return Err(err);
            }
        }
        if let Some(selection) = edit.selection_after {
            self.selection = selection;
        }

        self.history.truncate(self.history_at);
        debug!(
            ops = edit.ops.len(),
            source = edit.meta.source.as_deref().unwrap_or("-"),
            history_at = self.history_at + 1,
            "commit transaction"
        );
        self.history.push(Transaction {
            ops: edit.ops,
            selection_before,
            selection_after: self.selection.clone(),
            meta: edit.meta,
        });
        self.history_at += 1;
        Ok(())
    }

    /// Reverts the last applied transaction. Returns `false` when there is
    /// nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        if self.history_at == 0 {
            return Ok(false);
        }
        let tx = self.history[self.history_at - 1].clone();
        let snapshot = self.snapshot();
        for pair in tx.ops.iter().rev() {
            if let Err(err) = self.exec(pair, OpSide::Undo) {
                self.restore(snapshot);
                return Err(err);
            }
        }
        self.history_at -= 1;
        self.selection = tx.selection_before;
        debug!(history_at = self.history_at, "undo");
        Ok(true)
    }

    /// Re-applies the next undone transaction. Returns `false` when there is
    /// nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        if self.history_at == self.history.len() {
            return Ok(false);
        }
        let tx = self.history[self.history_at].clone();
        let snapshot = self.snapshot();
        for pair in &tx.ops {
            if let Err(err) = self.exec(pair, OpSide::Do) {
                self.restore(snapshot);
                return Err(err);
            }
        }
        self.history_at += 1;
        self.selection = tx.selection_after;
        debug!(history_at = self.history_at, "redo");
        Ok(true)
    }

    /// Runs one side of a pair against the live document and applies the
    /// operation's cursor hint.
    pub fn exec(&mut self, pair: &OpPair, side: OpSide) -> Result<()> {
        let op = pair.side(side);
        if let Op::InsertComponent(insert) = op {
            for class in insert.attrs.class_names() {
                self.registry.load(class)?;
            }
            self.registry.load(&insert.component_class)?;
        }
        trace!(?side, op = op.kind(), component = %op.component(), "exec");
        let applied = apply_op(&mut self.doc, op)?;
        self.changes.push(applied.change);
        match applied.cursor {
            Some(CursorHint::Collapsed(point)) => self.selection.set_cursor(point),
            Some(CursorHint::Range(start, end)) => {
                self.selection = Selection {
                    start: Some(start),
                    end: Some(end),
                };
            }
            None => {}
        }
        Ok(())
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            doc: self.doc.clone(),
            selection: self.selection.clone(),
            changes: self.changes.len(),
        }
    }

    fn restore(&mut self, snapshot: Snapshot) {
        debug!("roll back transaction");
        self.doc = snapshot.doc;
        self.selection = snapshot.selection;
        self.changes.truncate(snapshot.changes);
    }
}
