//! Subtree copy and paste with reference filtering.
//!
//! Copying snapshots a subtree together with the computation-unit instances
//! anchored inside it. A [`ReferenceFilter`] decides which links pointing out
//! of the copied scope survive; everything else is severed in the buffer, so
//! a paste can never resurrect a dangling reference. Paste relocates every
//! snapshot object to freshly allocated ids and publishes the relocation
//! table for callers that need to track identity across the paste.

use crate::expr;
use crate::func::{FuncGuid, FuncInstance};
use serde::{Deserialize, Serialize};
use crate::model::{FuncId, Node, NodeId, ParamId, ParamValue, TypeTag};
use std::collections::{BTreeMap, BTreeSet};

/// Declares which out-of-scope links survive a copy.
///
/// The built-in expression evaluator always passes: severing it would leave
/// evaluable Parameters silently dead after a paste.
#[derive(Debug, Clone, Default)]
pub struct ReferenceFilter {
    passed_guids: BTreeSet<FuncGuid>,
    passed_refs: BTreeSet<(TypeTag, u32)>,
}

impl ReferenceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows instances of the given unit type to survive even when they are
    /// wired to Parameters outside the copied scope.
    pub fn pass_func(&mut self, guid: FuncGuid) {
        self.passed_guids.insert(guid);
    }

    /// Allows reference Parameters in the given slot of the given Node type
    /// to keep out-of-scope targets.
    pub fn pass_reference(&mut self, tag: TypeTag, slot: u32) {
        self.passed_refs.insert((tag, slot));
    }

    pub fn passes_func(&self, guid: &FuncGuid) -> bool {
        guid.0 == crate::func::evaluator::EVALUATOR_GUID || self.passed_guids.contains(guid)
    }

    pub fn passes_reference(&self, tag: &TypeTag, slot: u32) -> bool {
        self.passed_refs.contains(&(tag.clone(), slot))
    }
}

/// Snapshot of one copied subtree, detached from the arenas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyBuffer {
    pub(crate) root: NodeId,
    pub(crate) nodes: BTreeMap<NodeId, Node>,
    pub(crate) instances: Vec<FuncInstance>,
    pub(crate) scope: BTreeSet<NodeId>,
}

/// Holder of the current copy buffer and the relocation table of the most
/// recent paste.
#[derive(Debug, Clone, Default)]
pub struct CopyPasteEngine {
    buffer: Option<CopyBuffer>,
    relocation: BTreeMap<NodeId, NodeId>,
}

impl CopyPasteEngine {
    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }

    pub(crate) fn buffer(&self) -> Option<&CopyBuffer> {
        self.buffer.as_ref()
    }

    pub(crate) fn set_buffer(&mut self, buffer: CopyBuffer) {
        self.buffer = Some(buffer);
    }

    pub(crate) fn set_relocation(&mut self, table: BTreeMap<NodeId, NodeId>) {
        self.relocation = table;
    }

    /// Old id to new id mapping of the most recent paste.
    pub fn relocation(&self) -> &BTreeMap<NodeId, NodeId> {
        &self.relocation
    }

    /// Drops the buffer and the relocation table.
    pub fn release(&mut self) {
        self.buffer = None;
        self.relocation.clear();
    }

    /// Patches every staged expression that names `what` as a whole token,
    /// keeping the buffer in step with a variable rename.
    pub(crate) fn rewrite_expressions(&mut self, what: &str, with: &str) {
        let Some(buffer) = self.buffer.as_mut() else {
            return;
        };
        for node in buffer.nodes.values_mut() {
            for param in node.params.iter_mut() {
                if let Some(source) = &param.expression {
                    if expr::is_lexeme(source, what) {
                        param.expression = Some(expr::replace_lexeme(source, what, with));
                    }
                }
            }
        }
    }
}

impl CopyBuffer {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn contains(&self, nid: NodeId) -> bool {
        self.scope.contains(&nid)
    }

    /// Severs every link of the snapshot that leaves the copied scope and is
    /// not whitelisted by the filter. Runs once at copy time so the buffer
    /// is self-consistent from then on.
    pub(crate) fn apply_filter(&mut self, filter: &ReferenceFilter) {
        let scope = self.scope.clone();

        self.instances.retain(|inst| {
            let fully_scoped = inst.wired_nodes().all(|n| scope.contains(&n));
            fully_scoped || filter.passes_func(&inst.guid)
        });
        let kept: BTreeSet<_> = self.instances.iter().map(|i| i.id).collect();

        for node in self.nodes.values_mut() {
            node.anchored.retain(|fid| kept.contains(fid));
            node.refs.retain(|fid| kept.contains(fid));

            let tag = node.type_tag.clone();
            for (slot, param) in node.params.iter_mut().enumerate() {
                let passes = filter.passes_reference(&tag, slot as u32);
                match &mut param.value {
                    ParamValue::Reference(target) => {
                        if target.is_some_and(|t| !scope.contains(&t)) && !passes {
                            param.value = ParamValue::Reference(None);
                        }
                    }
                    ParamValue::ReferenceList(targets) => {
                        if !passes {
                            targets.retain(|t| scope.contains(t));
                        }
                    }
                    _ => {}
                }
                if param
                    .evaluator
                    .is_some_and(|fid| !kept.contains(&fid))
                {
                    param.evaluator = None;
                    param.expression = None;
                }
            }
        }
    }

    /// Rewrites every in-scope id through the relocation table. Out-of-scope
    /// ids survived filtering deliberately and stay as they are.
    pub(crate) fn relocate(
        &self,
        node_map: &BTreeMap<NodeId, NodeId>,
        func_map: &BTreeMap<FuncId, FuncId>,
    ) -> (Vec<Node>, Vec<FuncInstance>) {
        let reloc_param = |pid: ParamId| -> ParamId {
            match node_map.get(&pid.node) {
                Some(new) => ParamId::new(*new, pid.slot),
                None => pid,
            }
        };

        let mut nodes = Vec::with_capacity(self.nodes.len());
        for (old_id, node) in &self.nodes {
            let mut copy = node.clone();
            copy.id = node_map[old_id];
            copy.parent = node.parent.and_then(|p| node_map.get(&p).copied());
            copy.children = node
                .children
                .iter()
                .filter_map(|c| node_map.get(c).copied())
                .collect();
            copy.anchored = node
                .anchored
                .iter()
                .filter_map(|f| func_map.get(f).copied())
                .collect();
            copy.refs = node
                .refs
                .iter()
                .filter_map(|f| func_map.get(f).copied())
                .collect();
            for param in &mut copy.params {
                match &mut param.value {
                    ParamValue::Reference(Some(target)) => {
                        if let Some(new) = node_map.get(target) {
                            *target = *new;
                        }
                    }
                    ParamValue::ReferenceList(targets) => {
                        for target in targets.iter_mut() {
                            if let Some(new) = node_map.get(target) {
                                *target = *new;
                            }
                        }
                    }
                    _ => {}
                }
                param.evaluator = param.evaluator.and_then(|f| func_map.get(&f).copied());
            }
            nodes.push(copy);
        }

        let mut instances = Vec::with_capacity(self.instances.len());
        for inst in &self.instances {
            let mut copy = inst.clone();
            copy.id = func_map[&inst.id];
            if let Some(new) = node_map.get(&inst.anchor) {
                copy.anchor = *new;
            }
            copy.arguments = inst.arguments.iter().map(|p| reloc_param(*p)).collect();
            copy.results = inst.results.iter().map(|p| reloc_param(*p)).collect();
            instances.push(copy);
        }

        (nodes, instances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Document, DocumentConfig, ParamId, TypeTag};

    const TAG: &str = "shape";

    fn doc() -> Document {
        Document::new(DocumentConfig {
            partitions: vec![TypeTag::of(TAG)],
            ..Default::default()
        })
    }

    /// Root with one child; the child holds a reference to a sibling target
    /// inside the subtree and one to an outsider.
    fn seeded() -> (Document, NodeId, NodeId, NodeId, ParamId) {
        let mut doc = doc();
        doc.open_command();
        let root = doc.create_node(&TypeTag::of(TAG), "root");
        let child = doc.create_node(&TypeTag::of(TAG), "child");
        doc.set_parent(root, child);
        let outsider = doc.create_node(&TypeTag::of(TAG), "outsider");
        let link = doc.add_param(child, "inner", ParamValue::Reference(Some(root)));
        doc.add_param(child, "outer", ParamValue::Reference(Some(outsider)));
        doc.commit_command(None);
        (doc, root, child, outsider, link)
    }

    #[test]
    fn paste_relocates_in_scope_references() {
        let (mut doc, root, child, _, _) = seeded();
        assert!(doc.copy(root, &ReferenceFilter::new()));

        doc.open_command();
        let target = doc.create_node(&TypeTag::of(TAG), "target");
        let new_root = doc.paste(target).expect("paste failed");
        doc.commit_command(None);

        assert_ne!(new_root, root);
        assert_eq!(doc.node(new_root).unwrap().parent, Some(target));
        let reloc = doc.clipboard().relocation();
        assert_eq!(reloc[&root], new_root);
        let new_child = reloc[&child];
        assert_eq!(
            doc.param(ParamId::new(new_child, 0)).unwrap().value,
            ParamValue::Reference(Some(new_root))
        );
    }

    #[test]
    fn out_of_scope_reference_is_severed_unless_whitelisted() {
        let (mut doc, root, child, outsider, _) = seeded();

        doc.copy(root, &ReferenceFilter::new());
        doc.open_command();
        let target = doc.create_node(&TypeTag::of(TAG), "t1");
        doc.paste(target).unwrap();
        doc.commit_command(None);
        let pasted_child = doc.clipboard().relocation()[&child];
        assert_eq!(
            doc.param(ParamId::new(pasted_child, 1)).unwrap().value,
            ParamValue::Reference(None)
        );

        let mut filter = ReferenceFilter::new();
        filter.pass_reference(TypeTag::of(TAG), 1);
        doc.copy(root, &filter);
        doc.open_command();
        let target = doc.create_node(&TypeTag::of(TAG), "t2");
        doc.paste(target).unwrap();
        doc.commit_command(None);
        let pasted_child = doc.clipboard().relocation()[&child];
        assert_eq!(
            doc.param(ParamId::new(pasted_child, 1)).unwrap().value,
            ParamValue::Reference(Some(outsider))
        );
    }

    #[test]
    fn pasting_into_the_copied_scope_is_rejected() {
        let (mut doc, root, child, _, _) = seeded();
        doc.copy(root, &ReferenceFilter::new());
        doc.open_command();
        assert_eq!(doc.paste(child), None);
        assert_eq!(doc.paste(root), None);
        doc.abort_command();
    }

    #[test]
    fn evaluator_instances_always_survive_the_filter() {
        let mut doc = doc();
        doc.open_command();
        let x = doc.add_variable(crate::model::VariableKind::Real, "x");
        let root = doc.create_node(&TypeTag::of(TAG), "root");
        let out = doc.add_param(root, "out", ParamValue::Real(0.0));
        doc.connect_evaluator(out, "x + 1");
        doc.commit_command(None);
        // The evaluator argument wiring crosses the scope once it binds to
        // the variable; the default filter must still let it through.
        doc.execute(None);

        doc.copy(root, &ReferenceFilter::new());
        doc.open_command();
        let target = doc.create_node(&TypeTag::of(TAG), "target");
        let new_root = doc.paste(target).expect("paste failed");
        doc.commit_command(None);

        let pasted = doc
            .instances()
            .find(|inst| inst.anchor == new_root)
            .expect("evaluator was dropped");
        assert!(pasted.produces(ParamId::new(new_root, 0)));
        assert_eq!(
            doc.param(ParamId::new(new_root, 0))
                .unwrap()
                .expression
                .as_deref(),
            Some("x + 1")
        );
        let _ = x;
    }

    #[test]
    fn release_drops_buffer_and_relocation_table() {
        let (mut doc, root, _, _, _) = seeded();
        doc.copy(root, &ReferenceFilter::new());
        assert!(doc.clipboard().has_buffer());
        doc.release_copy_buffer();
        assert!(!doc.clipboard().has_buffer());
        assert!(doc.clipboard().relocation().is_empty());
    }
}
