//! The LogBook: ledger of Parameters touched by the last transaction.
//!
//! TOUCHED records come from committed transactions, IMPACTED records from
//! derived writes during an execution pass. FORCED and DEPLOYED records queue
//! computation units for unconditional or heavy execution. The ledger only
//! seeds the dirty set of the next pass and is cleared once the pass ends.

use crate::model::{FuncId, NodeId, ParamId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogBook {
    touched: BTreeSet<ParamId>,
    impacted: BTreeSet<ParamId>,
    forced: BTreeSet<FuncId>,
    deployed: BTreeSet<FuncId>,
}

impl LogBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn touch(&mut self, pid: ParamId) {
        self.touched.insert(pid);
    }

    pub fn impact(&mut self, pid: ParamId) {
        self.impacted.insert(pid);
    }

    pub fn is_touched(&self, pid: ParamId) -> bool {
        self.touched.contains(&pid)
    }

    pub fn is_impacted(&self, pid: ParamId) -> bool {
        self.impacted.contains(&pid)
    }

    /// TOUCHED or IMPACTED.
    pub fn is_modified(&self, pid: ParamId) -> bool {
        self.is_touched(pid) || self.is_impacted(pid)
    }

    /// Marks a unit for execution regardless of whether its inputs changed.
    pub fn force(&mut self, fid: FuncId) {
        self.forced.insert(fid);
    }

    pub fn is_forced(&self, fid: FuncId) -> bool {
        self.forced.contains(&fid)
    }

    /// Grants a heavy unit the right to execute in the next pass.
    pub fn deploy(&mut self, fid: FuncId) {
        self.deployed.insert(fid);
    }

    pub fn is_deployed(&self, fid: FuncId) -> bool {
        self.deployed.contains(&fid)
    }

    pub fn is_empty(&self) -> bool {
        self.touched.is_empty()
            && self.impacted.is_empty()
            && self.forced.is_empty()
            && self.deployed.is_empty()
    }

    pub fn touched_params(&self) -> impl Iterator<Item = ParamId> + '_ {
        self.touched.iter().copied()
    }

    pub fn modified_params(&self) -> impl Iterator<Item = ParamId> + '_ {
        self.touched.iter().chain(self.impacted.iter()).copied()
    }

    /// Distinct Nodes resolved from the touched Parameter set.
    pub fn touched_nodes(&self) -> BTreeSet<NodeId> {
        self.touched.iter().map(|p| p.node).collect()
    }

    /// Drops every record naming the given Node. Called by recursive delete
    /// before the Node storage is freed.
    pub fn clear_references_for(&mut self, node: NodeId, anchored: &[FuncId]) {
        self.touched.retain(|p| p.node != node);
        self.impacted.retain(|p| p.node != node);
        for fid in anchored {
            self.forced.remove(fid);
            self.deployed.remove(fid);
        }
    }

    pub fn release_modified(&mut self) {
        self.touched.clear();
        self.impacted.clear();
    }

    pub fn release_forced(&mut self) {
        self.forced.clear();
        self.deployed.clear();
    }

    /// Full cleanup at the end of an execution pass.
    pub fn release_all(&mut self) {
        self.release_modified();
        self.release_forced();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeId;

    fn pid(n: u32, s: u32) -> ParamId {
        ParamId::new(NodeId(n), s)
    }

    #[test]
    fn touched_set_is_deduplicated() {
        let mut log = LogBook::new();
        log.touch(pid(1, 0));
        log.touch(pid(1, 0));
        log.touch(pid(1, 2));
        assert_eq!(log.touched_params().count(), 2);
        assert_eq!(log.touched_nodes().len(), 1);
    }

    #[test]
    fn clearing_references_removes_only_one_node() {
        let mut log = LogBook::new();
        log.touch(pid(1, 0));
        log.impact(pid(2, 0));
        log.force(FuncId(7));
        log.clear_references_for(NodeId(1), &[FuncId(7)]);
        assert!(!log.is_modified(pid(1, 0)));
        assert!(log.is_impacted(pid(2, 0)));
        assert!(!log.is_forced(FuncId(7)));
    }

    #[test]
    fn release_empties_everything() {
        let mut log = LogBook::new();
        log.touch(pid(1, 0));
        log.force(FuncId(0));
        log.release_all();
        assert!(log.is_empty());
    }
}
