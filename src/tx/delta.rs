//! Journaled records of one transactional scope.

use crate::func::FuncInstance;
use crate::logbook::LogBook;
use crate::model::{FuncId, Node, NodeId, ParamId, Parameter};
use std::collections::BTreeSet;

/// Opaque payload a caller may attach to a committed transaction, e.g. to
/// drive asynchronous follow-up once a detached pass completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxData(pub String);

/// Identity of a journaled slot, used for first-touch deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum DeltaKey {
    Param(ParamId),
    Node(NodeId),
    Func(FuncId),
}

/// One journaled change. `before` is captured at the first touch inside the
/// transaction, `after` at commit; absent means the slot did not exist on
/// that side. Undo applies `before` states in reverse order, redo applies
/// `after` states forward.
#[derive(Debug, Clone)]
pub(crate) enum DeltaEntry {
    Param {
        id: ParamId,
        before: Option<Parameter>,
        after: Option<Parameter>,
    },
    Node {
        id: NodeId,
        before: Option<Box<Node>>,
        after: Option<Box<Node>>,
    },
    Func {
        id: FuncId,
        before: Option<FuncInstance>,
        after: Option<FuncInstance>,
    },
}

/// The journal of one transaction: an ordered list of first-touch entries.
///
/// `logbook_before` snapshots the recompute log at scope open so an abort
/// restores it along with the arenas.
#[derive(Debug, Clone, Default)]
pub struct Delta {
    pub(crate) entries: Vec<DeltaEntry>,
    pub(crate) seen: BTreeSet<DeltaKey>,
    pub(crate) tag: Option<TxData>,
    pub(crate) logbook_before: Option<LogBook>,
}

impl Delta {
    pub fn tag(&self) -> Option<&TxData> {
        self.tag.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn record_param(&mut self, id: ParamId, before: Option<Parameter>) {
        if self.seen.insert(DeltaKey::Param(id)) {
            self.entries.push(DeltaEntry::Param {
                id,
                before,
                after: None,
            });
        }
    }

    pub(crate) fn record_node(&mut self, id: NodeId, before: Option<Box<Node>>) {
        if self.seen.insert(DeltaKey::Node(id)) {
            self.entries.push(DeltaEntry::Node {
                id,
                before,
                after: None,
            });
        }
    }

    pub(crate) fn record_func(&mut self, id: FuncId, before: Option<FuncInstance>) {
        if self.seen.insert(DeltaKey::Func(id)) {
            self.entries.push(DeltaEntry::Func {
                id,
                before,
                after: None,
            });
        }
    }

    /// Parameter GIDs affected by replaying this delta in either direction.
    pub fn affected_params(&self) -> BTreeSet<ParamId> {
        let mut out = BTreeSet::new();
        for entry in &self.entries {
            match entry {
                DeltaEntry::Param { id, .. } => {
                    out.insert(*id);
                }
                DeltaEntry::Node { id, before, after } => {
                    let slots = before
                        .as_ref()
                        .map(|n| n.params.len())
                        .unwrap_or(0)
                        .max(after.as_ref().map(|n| n.params.len()).unwrap_or(0));
                    for slot in 0..slots as u32 {
                        out.insert(ParamId::new(*id, slot));
                    }
                }
                DeltaEntry::Func { .. } => {}
            }
        }
        out
    }
}
