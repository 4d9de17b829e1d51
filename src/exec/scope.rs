//! The facade a driver sees while executing.

use crate::func::FuncGuid;
use crate::model::{Document, NodeId, ParamId, ParamValue};
use crate::observe::{Plotter, ProgressEntry};
use crate::tx::TxData;
use std::any::Any;
use std::sync::Arc;

/// Borrowed view of the document handed to a driver during a pass.
///
/// Reads are unrestricted. Writes go through [`ExecScope::set_value`], which
/// bypasses the transaction journal (derived values are recomputable, not
/// undoable state) and records the Parameter as impacted so downstream units
/// see fresh inputs.
pub struct ExecScope<'a> {
    pub(crate) doc: &'a mut Document,
}

impl<'a> ExecScope<'a> {
    pub(crate) fn new(doc: &'a mut Document) -> Self {
        Self { doc }
    }

    pub fn value(&self, pid: ParamId) -> Option<&ParamValue> {
        self.doc.param(pid).map(|p| &p.value)
    }

    pub fn expression(&self, pid: ParamId) -> Option<&str> {
        self.doc.param(pid).and_then(|p| p.expression.as_deref())
    }

    pub fn node_name(&self, nid: NodeId) -> Option<&str> {
        self.doc.node(nid).map(|n| n.name.as_str())
    }

    pub fn node_exists(&self, nid: NodeId) -> bool {
        self.doc.node(nid).is_some()
    }

    /// Writes a derived value. Journal-free, marks the Parameter impacted.
    pub fn set_value(&mut self, pid: ParamId, value: ParamValue) {
        self.doc.derived_set_value(pid, value);
    }

    /// Resolves a variable by name to its value Parameter, if a variable
    /// node with that name exists.
    pub fn variable_param(&self, name: &str) -> Option<ParamId> {
        self.doc.variable_param_by_name(name)
    }

    pub fn progress(&self) -> ProgressEntry {
        self.doc.ctx().progress()
    }

    pub fn plotter(&self) -> Option<Arc<dyn Plotter>> {
        self.doc.ctx().plotter().cloned()
    }

    pub fn user_data(&self, guid: &FuncGuid) -> Option<Arc<dyn Any + Send + Sync>> {
        self.doc.ctx().user_data(guid).cloned()
    }

    pub fn tx_data(&self) -> Option<&TxData> {
        self.doc.ctx().tx_data()
    }
}
