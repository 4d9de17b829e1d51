//! The document: arenas, partitions, transactions and high-level editing.

use super::id::{FuncId, NodeId, ParamId, TypeTag};
use super::node::Node;
use super::param::Parameter;
use super::partition::Partition;
use super::value::ParamValue;
use crate::clipboard::{CopyBuffer, CopyPasteEngine, ReferenceFilter};
use crate::exec::{ExecutionCtx, ExecutionStatus};
use crate::expr;
use crate::func::{evaluator::EVALUATOR_GUID, FuncGuid, FuncInstance, FuncRegistry};
use crate::logbook::LogBook;
use crate::store::VersionRecord;
use crate::tx::{Delta, TransactionEngine, TxData, DEFAULT_UNDO_LIMIT};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};

/// Built-in variable flavors. Each kind owns one Partition; the variable
/// value always lives in slot 0 of its Node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Real,
    Int,
    Bool,
}

impl VariableKind {
    pub fn type_tag(&self) -> TypeTag {
        match self {
            Self::Real => TypeTag::of("var.real"),
            Self::Int => TypeTag::of("var.int"),
            Self::Bool => TypeTag::of("var.bool"),
        }
    }

    fn all() -> [VariableKind; 3] {
        [Self::Real, Self::Int, Self::Bool]
    }

    fn default_value(&self) -> ParamValue {
        match self {
            Self::Real => ParamValue::Real(0.0),
            Self::Int => ParamValue::Int(0),
            Self::Bool => ParamValue::Bool(false),
        }
    }
}

/// Construction-time wiring of a document: the Partition set, the driver
/// registry and transactional limits. The variable Partitions are always
/// registered on top of whatever the application declares.
pub struct DocumentConfig {
    pub partitions: Vec<TypeTag>,
    pub registry: FuncRegistry,
    pub undo_limit: usize,
    pub app_version: u32,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        let mut registry = FuncRegistry::new();
        registry.register(std::sync::Arc::new(crate::func::evaluator::RealEvaluator));
        Self {
            partitions: Vec::new(),
            registry,
            undo_limit: DEFAULT_UNDO_LIMIT,
            app_version: 1,
        }
    }
}

/// A persistent, transactional model: Node arenas organized into typed
/// Partitions, computation-unit instances wired over Parameters, and the
/// transaction engine guarding every write.
pub struct Document {
    pub(crate) nodes: Vec<Option<Node>>,
    pub(crate) partitions: BTreeMap<TypeTag, Partition>,
    pub(crate) registry: FuncRegistry,
    pub(crate) funcs: Vec<Option<FuncInstance>>,
    pub(crate) engine: TransactionEngine,
    pub(crate) logbook: LogBook,
    pub(crate) clipboard: CopyPasteEngine,
    pub(crate) ctx: ExecutionCtx,
    pub(crate) version: VersionRecord,
    modified: bool,
}

impl Document {
    pub fn new(config: DocumentConfig) -> Self {
        let mut partitions = BTreeMap::new();
        for kind in VariableKind::all() {
            let tag = kind.type_tag();
            partitions.insert(tag.clone(), Partition::new(tag));
        }
        for tag in config.partitions {
            partitions.entry(tag.clone()).or_insert_with(|| Partition::new(tag));
        }
        Self {
            nodes: Vec::new(),
            partitions,
            registry: config.registry,
            funcs: Vec::new(),
            engine: TransactionEngine::new(config.undo_limit),
            logbook: LogBook::new(),
            clipboard: CopyPasteEngine::default(),
            ctx: ExecutionCtx::default(),
            version: VersionRecord::current(config.app_version),
            modified: false,
        }
    }

    // --- lookup ---

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(|slot| slot.as_ref())
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(|slot| slot.as_mut())
    }

    pub fn param(&self, pid: ParamId) -> Option<&Parameter> {
        self.node(pid.node).and_then(|n| n.param(pid.slot))
    }

    pub fn instance(&self, fid: FuncId) -> Option<&FuncInstance> {
        self.funcs.get(fid.index()).and_then(|slot| slot.as_ref())
    }

    /// Live instances in arena order.
    pub fn instances(&self) -> impl Iterator<Item = &FuncInstance> {
        self.funcs.iter().filter_map(|slot| slot.as_ref())
    }

    /// Live Nodes in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter_map(|slot| slot.as_ref())
    }

    /// The Partition of the given tag. Unregistered tags are a programming
    /// error.
    pub fn partition(&self, tag: &TypeTag) -> &Partition {
        self.partitions
            .get(tag)
            .unwrap_or_else(|| panic!("partition {tag} was never registered"))
    }

    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.values()
    }

    pub fn registry(&self) -> &FuncRegistry {
        &self.registry
    }

    pub fn logbook(&self) -> &LogBook {
        &self.logbook
    }

    pub(crate) fn logbook_mut(&mut self) -> &mut LogBook {
        &mut self.logbook
    }

    pub fn ctx(&self) -> &ExecutionCtx {
        &self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut ExecutionCtx {
        &mut self.ctx
    }

    pub fn version(&self) -> &VersionRecord {
        &self.version
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn set_clean(&mut self) {
        self.modified = false;
    }

    // --- transactional scope ---

    pub fn open_command(&mut self) {
        assert!(
            !self.ctx.is_frozen(),
            "cannot open a transaction while an execution pass is running"
        );
        self.engine.open_command();
        self.engine.stash_logbook(self.logbook.clone());
    }

    pub fn has_open_command(&self) -> bool {
        self.engine.has_open_command()
    }

    /// Closes the open scope, captures the after-states and pushes the delta
    /// onto the undo stack. Returns the Parameters the transaction touched.
    pub fn commit_command(&mut self, tag: Option<TxData>) -> BTreeSet<ParamId> {
        let mut delta = self.engine.take_open();
        delta.tag = tag;
        delta.logbook_before = None;
        self.capture_afters(&mut delta);
        let affected = delta.affected_params();
        if !delta.is_empty() {
            self.engine.push_committed(delta);
        }
        tracing::debug!(target: "arbordoc", affected = affected.len(), "transaction committed");
        affected
    }

    /// Closes the open scope and rolls every journaled change back,
    /// recompute log included. The delta is discarded; nothing reaches the
    /// undo stack.
    pub fn abort_command(&mut self) -> BTreeSet<ParamId> {
        let mut delta = self.engine.take_open();
        let affected = delta.affected_params();
        self.apply_backward(&delta);
        if let Some(logbook) = delta.logbook_before.take() {
            self.logbook = logbook;
        }
        affected
    }

    /// Rolls back up to `steps` committed transactions. Returns every
    /// Parameter whose state was replayed; callers typically queue these for
    /// recomputation.
    pub fn undo(&mut self, steps: usize) -> BTreeSet<ParamId> {
        assert!(
            !self.engine.has_open_command(),
            "cannot undo while a transaction is open"
        );
        let mut affected = BTreeSet::new();
        for _ in 0..steps {
            let Some(delta) = self.engine.pop_undo() else {
                break;
            };
            affected.extend(delta.affected_params());
            self.apply_backward(&delta);
            self.engine.push_redo(delta);
        }
        for pid in &affected {
            self.logbook.touch(*pid);
        }
        tracing::debug!(target: "arbordoc", affected = affected.len(), "undo applied");
        affected
    }

    /// Replays up to `steps` undone transactions forward.
    pub fn redo(&mut self, steps: usize) -> BTreeSet<ParamId> {
        assert!(
            !self.engine.has_open_command(),
            "cannot redo while a transaction is open"
        );
        let mut affected = BTreeSet::new();
        for _ in 0..steps {
            let Some(delta) = self.engine.pop_redo() else {
                break;
            };
            affected.extend(delta.affected_params());
            self.apply_forward(&delta);
            self.engine.push_undone_back(delta);
        }
        for pid in &affected {
            self.logbook.touch(*pid);
        }
        affected
    }

    pub fn nb_undos(&self) -> usize {
        self.engine.nb_undos()
    }

    pub fn nb_redos(&self) -> usize {
        self.engine.nb_redos()
    }

    pub fn last_commit_tag(&self) -> Option<&TxData> {
        self.engine.last_commit_tag()
    }

    // --- delta replay ---

    fn capture_afters(&self, delta: &mut Delta) {
        use crate::tx::DeltaEntry;
        for entry in &mut delta.entries {
            match entry {
                DeltaEntry::Param { id, after, .. } => {
                    *after = self.param(*id).cloned();
                }
                DeltaEntry::Node { id, after, .. } => {
                    *after = self.node(*id).cloned().map(Box::new);
                }
                DeltaEntry::Func { id, after, .. } => {
                    *after = self.instance(*id).cloned();
                }
            }
        }
    }

    fn apply_backward(&mut self, delta: &Delta) {
        use crate::tx::DeltaEntry;
        for entry in delta.entries.iter().rev() {
            match entry {
                DeltaEntry::Param { id, before, .. } => {
                    self.restore_param(*id, before.clone());
                }
                DeltaEntry::Node { id, before, .. } => {
                    self.restore_node(*id, before.clone().map(|b| *b));
                }
                DeltaEntry::Func { id, before, .. } => {
                    self.restore_func(*id, before.clone());
                }
            }
        }
    }

    fn apply_forward(&mut self, delta: &Delta) {
        use crate::tx::DeltaEntry;
        for entry in delta.entries.iter() {
            match entry {
                DeltaEntry::Param { id, after, .. } => {
                    self.restore_param(*id, after.clone());
                }
                DeltaEntry::Node { id, after, .. } => {
                    self.restore_node(*id, after.clone().map(|b| *b));
                }
                DeltaEntry::Func { id, after, .. } => {
                    self.restore_func(*id, after.clone());
                }
            }
        }
    }

    fn restore_param(&mut self, pid: ParamId, state: Option<Parameter>) {
        let Some(node) = self.node_mut(pid.node) else {
            // The owning Node is itself journaled in the same delta and will
            // be restored wholesale; nothing to do here.
            return;
        };
        let slot = pid.slot as usize;
        match state {
            Some(param) => {
                if slot < node.params.len() {
                    node.params[slot] = param;
                } else if slot == node.params.len() {
                    node.params.push(param);
                }
            }
            None => {
                // Slots are append-only, so absence means the tail.
                node.params.truncate(slot);
            }
        }
    }

    fn restore_node(&mut self, id: NodeId, state: Option<Node>) {
        if self.nodes.len() <= id.index() {
            self.nodes.resize_with(id.index() + 1, || None);
        }
        let previous = self.nodes[id.index()].take();
        if let Some(prev) = &previous {
            if let Some(partition) = self.partitions.get_mut(&prev.type_tag) {
                partition.remove(id);
            }
        }
        if let Some(node) = state {
            if let Some(partition) = self.partitions.get_mut(&node.type_tag) {
                partition.add(id);
            }
            self.nodes[id.index()] = Some(node);
        }
    }

    fn restore_func(&mut self, id: FuncId, state: Option<FuncInstance>) {
        if self.funcs.len() <= id.index() {
            self.funcs.resize_with(id.index() + 1, || None);
        }
        self.funcs[id.index()] = state;
    }

    // --- journaling helpers ---

    fn assert_structural_ok(&self) {
        assert!(
            !self.ctx.is_frozen(),
            "structural edits are forbidden while an execution pass is running"
        );
    }

    fn journal_node_touch(&mut self, id: NodeId) {
        let before = self.node(id).cloned().map(Box::new);
        self.engine.journal_node(id, before);
        self.modified = true;
    }

    fn journal_param_touch(&mut self, pid: ParamId) {
        let before = self.param(pid).cloned();
        self.engine.journal_param(pid, before);
        self.modified = true;
    }

    fn journal_func_touch(&mut self, id: FuncId) {
        let before = self.instance(id).cloned();
        self.engine.journal_func(id, before);
        self.modified = true;
    }

    // --- structural editing ---

    /// Creates a detached Node in the Partition of the given tag.
    pub fn create_node(&mut self, tag: &TypeTag, name: &str) -> NodeId {
        self.assert_structural_ok();
        assert!(
            self.partitions.contains_key(tag),
            "partition {tag} was never registered"
        );
        let id = NodeId::new(self.nodes.len());
        self.journal_node_touch(id);
        self.nodes.push(Some(Node::new(id, tag.clone(), name)));
        if let Some(partition) = self.partitions.get_mut(tag) {
            partition.add(id);
        }
        id
    }

    /// Hangs `child` under `parent` in the user tree.
    pub fn set_parent(&mut self, parent: NodeId, child: NodeId) {
        self.assert_structural_ok();
        assert!(self.node(parent).is_some(), "parent {parent} does not exist");
        assert!(self.node(child).is_some(), "child {child} does not exist");
        self.journal_node_touch(parent);
        self.journal_node_touch(child);
        let old = self.node(child).and_then(|n| n.parent);
        if let Some(old) = old {
            if old != parent {
                self.journal_node_touch(old);
                if let Some(old_parent) = self.node_mut(old) {
                    old_parent.children.retain(|c| *c != child);
                }
            }
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.node_mut(parent) {
            if !node.children.contains(&child) {
                node.children.push(child);
            }
        }
    }

    /// Appends a Parameter to the Node and returns its global id.
    pub fn add_param(&mut self, node: NodeId, name: &str, value: ParamValue) -> ParamId {
        self.assert_structural_ok();
        self.journal_node_touch(node);
        let owner = self
            .node_mut(node)
            .unwrap_or_else(|| panic!("node {node} does not exist"));
        let slot = owner.params.len() as u32;
        owner.params.push(Parameter::new(name, value));
        let pid = ParamId::new(node, slot);
        self.logbook.touch(pid);
        pid
    }

    /// Writes a Parameter value. Inside a transaction the write is journaled
    /// and the Parameter is recorded as touched; during an execution pass the
    /// write bypasses the journal and is recorded as impacted.
    pub fn set_value(&mut self, pid: ParamId, value: ParamValue) {
        if self.ctx.is_frozen() {
            self.derived_set_value(pid, value);
            return;
        }
        self.journal_param_touch(pid);
        let param = self
            .node_mut(pid.node)
            .and_then(|n| n.param_mut(pid.slot))
            .unwrap_or_else(|| panic!("parameter {pid} does not exist"));
        param.value = value;
        param.touched = true;
        self.logbook.touch(pid);
    }

    /// Journal-free value write used by drivers. The Parameter is recorded
    /// as impacted, never touched.
    pub(crate) fn derived_set_value(&mut self, pid: ParamId, value: ParamValue) {
        let Some(param) = self.node_mut(pid.node).and_then(|n| n.param_mut(pid.slot)) else {
            return;
        };
        param.value = value;
        self.logbook.impact(pid);
    }

    /// Sets or clears the evaluation string of a Parameter.
    pub fn set_expression(&mut self, pid: ParamId, expression: Option<&str>) {
        self.journal_param_touch(pid);
        let param = self
            .node_mut(pid.node)
            .and_then(|n| n.param_mut(pid.slot))
            .unwrap_or_else(|| panic!("parameter {pid} does not exist"));
        param.expression = expression.map(str::to_owned);
        param.touched = true;
        self.logbook.touch(pid);
    }

    pub fn rename_node(&mut self, id: NodeId, name: &str) {
        self.journal_node_touch(id);
        let node = self
            .node_mut(id)
            .unwrap_or_else(|| panic!("node {id} does not exist"));
        node.name = name.to_owned();
    }

    /// Deletes a Node and its whole subtree, children first. All anchored
    /// instances are disconnected and every incoming reference from the rest
    /// of the document is severed before the storage is freed.
    pub fn delete_node(&mut self, id: NodeId) -> bool {
        self.assert_structural_ok();
        if self.node(id).is_none() {
            return false;
        }
        if let Some(parent) = self.node(id).and_then(|n| n.parent) {
            self.journal_node_touch(parent);
            if let Some(parent) = self.node_mut(parent) {
                parent.children.retain(|c| *c != id);
            }
        }
        self.delete_subtree(id);
        true
    }

    fn delete_subtree(&mut self, id: NodeId) {
        let children = self
            .node(id)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        for child in children {
            self.delete_subtree(child);
        }

        let anchored = self.node(id).map(|n| n.anchored.clone()).unwrap_or_default();
        for fid in &anchored {
            self.disconnect_function(*fid);
        }
        // Instances elsewhere that merely reference this Node keep running;
        // only direct Parameter references get nulled.
        self.sever_incoming_references(id);
        self.logbook.clear_references_for(id, &anchored);

        self.journal_node_touch(id);
        if let Some(node) = self.nodes[id.index()].take() {
            if let Some(partition) = self.partitions.get_mut(&node.type_tag) {
                partition.remove(id);
            }
        }
    }

    /// Nulls every Reference and ReferenceList slot in the document that
    /// points at the given Node.
    fn sever_incoming_references(&mut self, target: NodeId) {
        let mut dirty: Vec<ParamId> = Vec::new();
        for node in self.nodes() {
            if node.id == target {
                continue;
            }
            for (slot, param) in node.params.iter().enumerate() {
                if param.value.referenced_nodes().contains(&target) {
                    dirty.push(ParamId::new(node.id, slot as u32));
                }
            }
        }
        for pid in dirty {
            self.journal_param_touch(pid);
            let Some(param) = self.node_mut(pid.node).and_then(|n| n.param_mut(pid.slot)) else {
                continue;
            };
            match &mut param.value {
                ParamValue::Reference(r) => *r = None,
                ParamValue::ReferenceList(list) => list.retain(|n| *n != target),
                _ => {}
            }
            param.touched = true;
            self.logbook.touch(pid);
        }
    }

    // --- computation-unit wiring ---

    /// Anchors an instance of the registered unit type on a Node and wires
    /// its argument and result Parameters. The new instance is forced to run
    /// on the next pass.
    pub fn connect_function(
        &mut self,
        guid: &FuncGuid,
        anchor: NodeId,
        arguments: Vec<ParamId>,
        results: Vec<ParamId>,
    ) -> FuncId {
        self.assert_structural_ok();
        assert!(
            self.registry.contains(guid),
            "computation unit {guid} is not registered"
        );
        assert!(self.node(anchor).is_some(), "anchor {anchor} does not exist");

        let id = FuncId::new(self.funcs.len());
        self.journal_func_touch(id);
        let instance = FuncInstance {
            id,
            guid: guid.clone(),
            anchor,
            arguments: SmallVec::from_vec(arguments),
            results: SmallVec::from_vec(results),
        };
        let wired: Vec<NodeId> = instance.wired_nodes().collect();
        self.funcs.push(Some(instance));

        self.journal_node_touch(anchor);
        if let Some(node) = self.node_mut(anchor) {
            node.anchored.push(id);
        }
        for nid in wired {
            self.journal_node_touch(nid);
            if let Some(node) = self.node_mut(nid) {
                node.refs.insert(id);
            }
        }
        self.logbook.force(id);
        id
    }

    /// Makes a Parameter evaluable: stores the expression and anchors an
    /// evaluator instance producing into it. The initial argument wiring is a
    /// bare self-reference; the evaluator rewires itself before each pass.
    pub fn connect_evaluator(&mut self, pid: ParamId, expression: &str) -> FuncId {
        self.set_expression(pid, Some(expression));
        let fid = self.connect_function(
            &FuncGuid::of(EVALUATOR_GUID),
            pid.node,
            vec![pid],
            vec![pid],
        );
        self.journal_param_touch(pid);
        if let Some(param) = self.node_mut(pid.node).and_then(|n| n.param_mut(pid.slot)) {
            param.evaluator = Some(fid);
        }
        fid
    }

    /// Removes an instance and severs its wiring from every involved Node.
    pub fn disconnect_function(&mut self, fid: FuncId) {
        self.assert_structural_ok();
        let Some(instance) = self.instance(fid).cloned() else {
            return;
        };
        self.journal_func_touch(fid);

        self.journal_node_touch(instance.anchor);
        if let Some(node) = self.node_mut(instance.anchor) {
            node.anchored.retain(|f| *f != fid);
        }
        for nid in instance.wired_nodes() {
            self.journal_node_touch(nid);
            if let Some(node) = self.node_mut(nid) {
                node.refs.remove(&fid);
            }
        }
        for pid in instance.results.iter().chain(instance.arguments.iter()) {
            let owns = self
                .param(*pid)
                .is_some_and(|p| p.evaluator == Some(fid));
            if owns {
                self.journal_param_touch(*pid);
                if let Some(param) = self.node_mut(pid.node).and_then(|n| n.param_mut(pid.slot)) {
                    param.evaluator = None;
                }
            }
        }
        self.funcs[fid.index()] = None;
    }

    /// Journal-free rewiring used by the pass machinery while the graph is
    /// frozen. Reference bookkeeping on the involved Nodes is kept in sync.
    pub(crate) fn rewire_instance_derived(
        &mut self,
        fid: FuncId,
        arguments: SmallVec<[ParamId; 4]>,
        results: SmallVec<[ParamId; 2]>,
    ) {
        let Some(old) = self.instance(fid).cloned() else {
            return;
        };
        if old.arguments == arguments && old.results == results {
            return;
        }
        for nid in old.wired_nodes() {
            if let Some(node) = self.node_mut(nid) {
                node.refs.remove(&fid);
            }
        }
        if let Some(slot) = self.funcs.get_mut(fid.index()).and_then(|s| s.as_mut()) {
            slot.arguments = arguments;
            slot.results = results;
        }
        let wired: Vec<NodeId> = self
            .instance(fid)
            .map(|i| i.wired_nodes().collect())
            .unwrap_or_default();
        for nid in wired {
            if let Some(node) = self.node_mut(nid) {
                node.refs.insert(fid);
            }
        }
    }

    /// Journaled rewiring of an instance outside a pass. Reference
    /// bookkeeping on the involved Nodes is kept in sync.
    fn rewire_instance(
        &mut self,
        fid: FuncId,
        arguments: SmallVec<[ParamId; 4]>,
        results: SmallVec<[ParamId; 2]>,
    ) {
        self.assert_structural_ok();
        let Some(old) = self.instance(fid).cloned() else {
            return;
        };
        if old.arguments == arguments && old.results == results {
            return;
        }
        self.journal_func_touch(fid);
        let old_wired: Vec<NodeId> = old.wired_nodes().collect();
        for nid in old_wired {
            self.journal_node_touch(nid);
            if let Some(node) = self.node_mut(nid) {
                node.refs.remove(&fid);
            }
        }
        if let Some(slot) = self.funcs.get_mut(fid.index()).and_then(|s| s.as_mut()) {
            slot.arguments = arguments;
            slot.results = results;
        }
        let wired: Vec<NodeId> = self
            .instance(fid)
            .map(|i| i.wired_nodes().collect())
            .unwrap_or_default();
        for nid in wired {
            self.journal_node_touch(nid);
            if let Some(node) = self.node_mut(nid) {
                node.refs.insert(fid);
            }
        }
    }

    // --- variables ---

    /// Creates a named variable Node of the given kind with its value in
    /// slot 0, then sweeps the document for expressions that already name
    /// it so they pick the new variable up on the next pass.
    pub fn add_variable(&mut self, kind: VariableKind, name: &str) -> NodeId {
        let id = self.create_node(&kind.type_tag(), name);
        self.add_param(id, "Value", kind.default_value());
        self.charge_evaluators_with_var(name);
        id
    }

    /// The value Parameter of the variable Node with the given name, if one
    /// exists. Lookup order follows Partition registration, then insertion.
    pub fn variable_param_by_name(&self, name: &str) -> Option<ParamId> {
        for kind in VariableKind::all() {
            let partition = self.partitions.get(&kind.type_tag())?;
            for nid in partition.nodes() {
                if self.node(*nid).is_some_and(|n| n.name == name) {
                    return Some(ParamId::new(*nid, 0));
                }
            }
        }
        None
    }

    /// Renames a variable and patches every evaluation string in the
    /// document that mentions it as a whole token. Substrings of longer
    /// identifiers are left alone. With `full_sync` the sweep also covers
    /// expressions staged in the copy buffer and re-charges the evaluators
    /// of every Parameter now naming the variable.
    pub fn rename_variable(&mut self, id: NodeId, new_name: &str, full_sync: bool) {
        let old_name = match self.node(id) {
            Some(node) => node.name.clone(),
            None => return,
        };
        self.rename_node(id, new_name);

        let mut dirty: Vec<(ParamId, String)> = Vec::new();
        for node in self.nodes() {
            for (slot, param) in node.params.iter().enumerate() {
                if let Some(source) = &param.expression {
                    if expr::is_lexeme(source, &old_name) {
                        dirty.push((
                            ParamId::new(node.id, slot as u32),
                            expr::replace_lexeme(source, &old_name, new_name),
                        ));
                    }
                }
            }
        }
        for (pid, patched) in dirty {
            self.set_expression(pid, Some(&patched));
        }

        if full_sync {
            self.clipboard.rewrite_expressions(&old_name, new_name);
            self.charge_evaluators_with_var(new_name);
        }
    }

    /// Sweeps every evaluable Parameter whose expression names `name` as a
    /// whole token: Parameters without an evaluator get one anchored, those
    /// with one get their arguments rebuilt from the expression. Every hit
    /// is queued for recomputation.
    fn charge_evaluators_with_var(&mut self, name: &str) {
        let mut attach: Vec<ParamId> = Vec::new();
        let mut reargue: Vec<(FuncId, ParamId, String)> = Vec::new();
        for node in self.nodes() {
            for (slot, param) in node.params.iter().enumerate() {
                let Some(source) = &param.expression else {
                    continue;
                };
                if !expr::is_lexeme(source, name) {
                    continue;
                }
                let pid = ParamId::new(node.id, slot as u32);
                match param.evaluator {
                    Some(fid) => reargue.push((fid, pid, source.clone())),
                    None => attach.push(pid),
                }
            }
        }
        for pid in attach {
            let fid = self.connect_function(
                &FuncGuid::of(EVALUATOR_GUID),
                pid.node,
                vec![pid],
                vec![pid],
            );
            self.journal_param_touch(pid);
            if let Some(param) = self.node_mut(pid.node).and_then(|n| n.param_mut(pid.slot)) {
                param.evaluator = Some(fid);
                param.touched = true;
            }
            self.logbook.touch(pid);
        }
        for (fid, pid, source) in reargue {
            let mut arguments: SmallVec<[ParamId; 4]> = SmallVec::new();
            for ident in expr::referenced_idents(&source) {
                if let Some(arg) = self.variable_param_by_name(&ident) {
                    if arg != pid && !arguments.contains(&arg) {
                        arguments.push(arg);
                    }
                }
            }
            let results = self
                .instance(fid)
                .map(|i| i.results.clone())
                .unwrap_or_default();
            self.rewire_instance(fid, arguments, results);
            self.journal_param_touch(pid);
            if let Some(param) = self.node_mut(pid.node).and_then(|n| n.param_mut(pid.slot)) {
                param.touched = true;
            }
            self.logbook.touch(pid);
        }
    }

    // --- copy and paste ---

    /// Snapshots the subtree rooted at `root` into the copy buffer, severing
    /// out-of-scope links the filter does not whitelist.
    pub fn copy(&mut self, root: NodeId, filter: &ReferenceFilter) -> bool {
        if self.node(root).is_none() {
            return false;
        }
        let mut scope = BTreeSet::new();
        let mut stack = vec![root];
        while let Some(nid) = stack.pop() {
            if scope.insert(nid) {
                if let Some(node) = self.node(nid) {
                    stack.extend(node.children.iter().copied());
                }
            }
        }
        let nodes: BTreeMap<NodeId, Node> = scope
            .iter()
            .filter_map(|nid| self.node(*nid).cloned().map(|n| (*nid, n)))
            .collect();
        let instances: Vec<FuncInstance> = self
            .instances()
            .filter(|inst| scope.contains(&inst.anchor))
            .cloned()
            .collect();

        let mut buffer = CopyBuffer {
            root,
            nodes,
            instances,
            scope,
        };
        buffer.apply_filter(filter);
        self.clipboard.set_buffer(buffer);
        true
    }

    /// Materializes the copy buffer under `parent` with freshly allocated
    /// ids. Pasting into the copied scope itself is rejected. Returns the id
    /// of the new subtree root.
    pub fn paste(&mut self, parent: NodeId) -> Option<NodeId> {
        self.assert_structural_ok();
        let buffer = self.clipboard.buffer()?.clone();
        if self.node(parent).is_none() || buffer.contains(parent) {
            return None;
        }

        let mut node_map = BTreeMap::new();
        for (offset, old_id) in buffer.nodes.keys().enumerate() {
            node_map.insert(*old_id, NodeId::new(self.nodes.len() + offset));
        }
        let mut func_map = BTreeMap::new();
        for (offset, inst) in buffer.instances.iter().enumerate() {
            func_map.insert(inst.id, FuncId::new(self.funcs.len() + offset));
        }

        let (nodes, instances) = buffer.relocate(&node_map, &func_map);
        for node in nodes {
            let id = node.id;
            self.journal_node_touch(id);
            if let Some(partition) = self.partitions.get_mut(&node.type_tag) {
                partition.add(id);
            }
            for pid in node.param_ids() {
                self.logbook.touch(pid);
            }
            self.nodes.push(Some(node));
        }
        for instance in instances {
            let id = instance.id;
            self.journal_func_touch(id);
            self.funcs.push(Some(instance));
            self.logbook.force(id);
        }

        let new_root = node_map[&buffer.root];
        self.set_parent(parent, new_root);
        self.clipboard.set_relocation(node_map);
        Some(new_root)
    }

    pub fn clipboard(&self) -> &CopyPasteEngine {
        &self.clipboard
    }

    pub fn release_copy_buffer(&mut self) {
        self.clipboard.release();
    }

    // --- execution ---

    /// Runs one execution pass. See [`crate::exec::execute_all`].
    pub fn execute(&mut self, data: Option<TxData>) -> ExecutionStatus {
        crate::exec::execute_all(self, data)
    }

    /// Clears the persistent touch flags after a pass.
    pub(crate) fn clear_touched(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            for param in &mut node.params {
                param.touched = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHAPE: &str = "shape";

    fn doc() -> Document {
        Document::new(DocumentConfig {
            partitions: vec![TypeTag::of(SHAPE)],
            ..Default::default()
        })
    }

    fn doc_with_value(value: ParamValue) -> (Document, NodeId, ParamId) {
        let mut doc = doc();
        doc.open_command();
        let node = doc.create_node(&TypeTag::of(SHAPE), "box");
        let pid = doc.add_param(node, "width", value);
        doc.commit_command(None);
        (doc, node, pid)
    }

    #[test]
    fn committed_write_survives_and_grows_undo_stack() {
        let (doc, _, pid) = doc_with_value(ParamValue::Real(4.0));
        assert_eq!(doc.param(pid).unwrap().value, ParamValue::Real(4.0));
        assert_eq!(doc.nb_undos(), 1);
        assert_eq!(doc.nb_redos(), 0);
    }

    #[test]
    #[should_panic(expected = "no transaction is open")]
    fn write_outside_scope_is_fatal() {
        let (mut doc, _, pid) = doc_with_value(ParamValue::Real(4.0));
        doc.set_value(pid, ParamValue::Real(5.0));
    }

    #[test]
    fn undo_then_redo_replays_a_value_write() {
        let (mut doc, _, pid) = doc_with_value(ParamValue::Real(4.0));
        doc.open_command();
        doc.set_value(pid, ParamValue::Real(9.0));
        doc.commit_command(None);

        let affected = doc.undo(1);
        assert!(affected.contains(&pid));
        assert_eq!(doc.param(pid).unwrap().value, ParamValue::Real(4.0));
        assert_eq!(doc.nb_redos(), 1);

        let affected = doc.redo(1);
        assert!(affected.contains(&pid));
        assert_eq!(doc.param(pid).unwrap().value, ParamValue::Real(9.0));
    }

    #[test]
    fn undo_of_creation_removes_the_node_and_redo_restores_it() {
        let (mut doc, node, pid) = doc_with_value(ParamValue::Int(7));
        doc.undo(1);
        assert!(doc.node(node).is_none());
        assert!(doc.partition(&TypeTag::of(SHAPE)).is_empty());

        doc.redo(1);
        assert_eq!(doc.param(pid).unwrap().value, ParamValue::Int(7));
        assert_eq!(doc.partition(&TypeTag::of(SHAPE)).len(), 1);
    }

    #[test]
    fn abort_rolls_back_without_touching_the_undo_stack() {
        let (mut doc, _, pid) = doc_with_value(ParamValue::Real(4.0));
        doc.open_command();
        doc.set_value(pid, ParamValue::Real(100.0));
        let affected = doc.abort_command();
        assert!(affected.contains(&pid));
        assert_eq!(doc.param(pid).unwrap().value, ParamValue::Real(4.0));
        assert_eq!(doc.nb_undos(), 1);
    }

    #[test]
    fn first_touch_journaling_undoes_to_the_pre_transaction_state() {
        let (mut doc, _, pid) = doc_with_value(ParamValue::Real(1.0));
        doc.open_command();
        doc.set_value(pid, ParamValue::Real(2.0));
        doc.set_value(pid, ParamValue::Real(3.0));
        doc.commit_command(None);

        doc.undo(1);
        assert_eq!(doc.param(pid).unwrap().value, ParamValue::Real(1.0));
    }

    #[test]
    fn commit_clears_pending_redos() {
        let (mut doc, _, pid) = doc_with_value(ParamValue::Real(1.0));
        doc.open_command();
        doc.set_value(pid, ParamValue::Real(2.0));
        doc.commit_command(None);
        doc.undo(1);
        assert_eq!(doc.nb_redos(), 1);

        doc.open_command();
        doc.set_value(pid, ParamValue::Real(5.0));
        doc.commit_command(None);
        assert_eq!(doc.nb_redos(), 0);
    }

    #[test]
    fn recursive_delete_severs_incoming_references() {
        let mut doc = doc();
        doc.open_command();
        let target = doc.create_node(&TypeTag::of(SHAPE), "target");
        let child = doc.create_node(&TypeTag::of(SHAPE), "child");
        doc.set_parent(target, child);
        let holder = doc.create_node(&TypeTag::of(SHAPE), "holder");
        let ref_pid = doc.add_param(holder, "link", ParamValue::Reference(Some(child)));
        doc.commit_command(None);

        doc.open_command();
        assert!(doc.delete_node(target));
        doc.commit_command(None);

        assert!(doc.node(target).is_none());
        assert!(doc.node(child).is_none());
        assert_eq!(
            doc.param(ref_pid).unwrap().value,
            ParamValue::Reference(None)
        );

        doc.undo(1);
        assert_eq!(
            doc.param(ref_pid).unwrap().value,
            ParamValue::Reference(Some(child))
        );
        assert_eq!(doc.node(child).unwrap().parent, Some(target));
    }

    #[test]
    fn delete_of_an_anchored_node_disconnects_its_instances() {
        let mut doc = doc();
        doc.open_command();
        let node = doc.create_node(&TypeTag::of(SHAPE), "evaluated");
        let pid = doc.add_param(node, "width", ParamValue::Real(0.0));
        let fid = doc.connect_evaluator(pid, "1 + 1");
        doc.commit_command(None);
        assert!(doc.instance(fid).is_some());

        doc.open_command();
        doc.delete_node(node);
        doc.commit_command(None);
        assert!(doc.instance(fid).is_none());
    }

    #[test]
    fn rename_variable_patches_whole_tokens_only() {
        let mut doc = doc();
        doc.open_command();
        let x = doc.add_variable(VariableKind::Real, "x");
        let node = doc.create_node(&TypeTag::of(SHAPE), "box");
        let pid = doc.add_param(node, "width", ParamValue::Real(0.0));
        doc.connect_evaluator(pid, "x1 + x");
        doc.commit_command(None);

        doc.open_command();
        doc.rename_variable(x, "length", false);
        doc.commit_command(None);

        assert_eq!(
            doc.param(pid).unwrap().expression.as_deref(),
            Some("x1 + length")
        );
        assert_eq!(doc.node(x).unwrap().name, "length");
    }

    #[test]
    fn full_sync_rename_patches_buffered_expressions() {
        let mut doc = doc();
        doc.open_command();
        let x = doc.add_variable(VariableKind::Real, "x");
        let node = doc.create_node(&TypeTag::of(SHAPE), "box");
        let pid = doc.add_param(node, "width", ParamValue::Real(0.0));
        doc.connect_evaluator(pid, "x + 1");
        doc.commit_command(None);

        assert!(doc.copy(node, &ReferenceFilter::default()));

        doc.open_command();
        doc.rename_variable(x, "y", true);
        let bin = doc.create_node(&TypeTag::of(SHAPE), "bin");
        let pasted = doc.paste(bin).expect("paste");
        doc.commit_command(None);

        assert_eq!(doc.param(pid).unwrap().expression.as_deref(), Some("y + 1"));
        assert_eq!(
            doc.param(ParamId::new(pasted, 0)).unwrap().expression.as_deref(),
            Some("y + 1")
        );
    }

    #[test]
    fn copy_buffer_survives_repeated_pastes() {
        let mut doc = doc();
        doc.open_command();
        let node = doc.create_node(&TypeTag::of(SHAPE), "box");
        doc.add_param(node, "width", ParamValue::Real(2.0));
        let bin = doc.create_node(&TypeTag::of(SHAPE), "bin");
        doc.commit_command(None);

        assert!(doc.copy(node, &ReferenceFilter::default()));

        doc.open_command();
        let first = doc.paste(bin).expect("first paste");
        let second = doc.paste(bin).expect("second paste");
        doc.commit_command(None);

        assert_ne!(first, second);
        assert!(doc.clipboard().has_buffer());
        assert_eq!(
            doc.param(ParamId::new(second, 0)).unwrap().value,
            ParamValue::Real(2.0)
        );
    }

    #[test]
    fn abort_restores_the_recompute_log() {
        let (mut doc, _, pid) = doc_with_value(ParamValue::Real(4.0));
        doc.logbook_mut().release_all();

        doc.open_command();
        doc.set_value(pid, ParamValue::Real(100.0));
        assert!(doc.logbook().is_touched(pid));
        doc.abort_command();

        assert!(!doc.logbook().is_touched(pid));
        assert!(doc.logbook().is_empty());
    }

    #[test]
    fn variable_lookup_resolves_slot_zero() {
        let mut doc = doc();
        doc.open_command();
        let x = doc.add_variable(VariableKind::Int, "count");
        doc.commit_command(None);
        assert_eq!(
            doc.variable_param_by_name("count"),
            Some(ParamId::new(x, 0))
        );
        assert_eq!(doc.variable_param_by_name("missing"), None);
    }

    #[test]
    #[should_panic(expected = "never registered")]
    fn unregistered_partition_is_fatal() {
        let mut doc = doc();
        doc.open_command();
        doc.create_node(&TypeTag::of("unknown"), "x");
    }
}
