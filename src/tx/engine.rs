//! The transaction engine: scope gate plus undo and redo stacks.
//!
//! The engine owns the journals but never touches the document arenas; delta
//! application lives on `Document`, which borrows deltas out of the stacks.

use super::delta::Delta;
use crate::func::FuncInstance;
use crate::model::{FuncId, Node, NodeId, ParamId, Parameter};
use std::collections::VecDeque;

pub(crate) const DEFAULT_UNDO_LIMIT: usize = 100;

#[derive(Debug, Default)]
pub struct TransactionEngine {
    undo: VecDeque<Delta>,
    redo: Vec<Delta>,
    open: Option<Delta>,
    undo_limit: usize,
}

impl TransactionEngine {
    pub fn new(undo_limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            open: None,
            undo_limit,
        }
    }

    /// Begins a transactional scope. Nested scopes are a programming error.
    pub fn open_command(&mut self) {
        if self.open.is_some() {
            panic!("transaction is already open: transactional scopes do not nest");
        }
        self.open = Some(Delta::default());
    }

    /// Snapshots the recompute log into the open scope so an abort can
    /// restore it.
    pub(crate) fn stash_logbook(&mut self, logbook: crate::logbook::LogBook) {
        if let Some(delta) = self.open.as_mut() {
            delta.logbook_before = Some(logbook);
        }
    }

    pub fn has_open_command(&self) -> bool {
        self.open.is_some()
    }

    pub fn nb_undos(&self) -> usize {
        self.undo.len()
    }

    pub fn nb_redos(&self) -> usize {
        self.redo.len()
    }

    /// Tag of the most recently committed transaction, if any.
    pub fn last_commit_tag(&self) -> Option<&super::TxData> {
        self.undo.back().and_then(|d| d.tag())
    }

    pub(crate) fn take_open(&mut self) -> Delta {
        self.open
            .take()
            .expect("no transaction is open: open a command before committing or aborting")
    }

    pub(crate) fn push_committed(&mut self, delta: Delta) {
        if self.undo.len() == self.undo_limit {
            self.undo.pop_front();
        }
        self.undo.push_back(delta);
        self.redo.clear();
    }

    pub(crate) fn pop_undo(&mut self) -> Option<Delta> {
        self.undo.pop_back()
    }

    pub(crate) fn pop_redo(&mut self) -> Option<Delta> {
        self.redo.pop()
    }

    pub(crate) fn push_redo(&mut self, delta: Delta) {
        self.redo.push(delta);
    }

    pub(crate) fn push_undone_back(&mut self, delta: Delta) {
        self.undo.push_back(delta);
    }

    // --- journaling entry points (first-touch semantics) ---

    pub(crate) fn journal_param(&mut self, id: ParamId, before: Option<Parameter>) {
        self.open_delta().record_param(id, before);
    }

    pub(crate) fn journal_node(&mut self, id: NodeId, before: Option<Box<Node>>) {
        self.open_delta().record_node(id, before);
    }

    pub(crate) fn journal_func(&mut self, id: FuncId, before: Option<FuncInstance>) {
        self.open_delta().record_func(id, before);
    }

    fn open_delta(&mut self) -> &mut Delta {
        self.open
            .as_mut()
            .expect("no transaction is open: all document writes must occur in a transactional scope")
    }
}
