//! The dependency graph of computation-unit instances.
//!
//! The graph is derived, never stored: it is rebuilt from the live
//! cross-references each time execution is requested. Vertices are instances,
//! edges run from the producer of a Parameter to every consumer of it.

mod analyzer;

pub use analyzer::{DependencyAnalyzer, GraphState};

use crate::model::{Document, FuncId, ParamId};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    pub(crate) graph: DiGraph<FuncId, ()>,
    pub(crate) index: BTreeMap<FuncId, NodeIndex>,
}

impl DependencyGraph {
    /// Builds the producer to consumer graph from the live instances.
    ///
    /// Instances are inserted in arena order, which keeps vertex numbering
    /// and therefore downstream scheduling deterministic.
    pub fn build(doc: &Document) -> Self {
        let mut graph = DiGraph::new();
        let mut index = BTreeMap::new();

        for inst in doc.instances() {
            let v = graph.add_node(inst.id);
            index.insert(inst.id, v);
        }

        // Producer table: which instance drives each Parameter.
        let mut producers: BTreeMap<ParamId, Vec<FuncId>> = BTreeMap::new();
        for inst in doc.instances() {
            for out in &inst.results {
                producers.entry(*out).or_default().push(inst.id);
            }
        }

        for inst in doc.instances() {
            let consumer = index[&inst.id];
            for arg in &inst.arguments {
                let Some(drivers) = producers.get(arg) else {
                    continue;
                };
                for producer in drivers {
                    if *producer == inst.id {
                        // A stale self-reference slot is not a dependency edge.
                        continue;
                    }
                    let from = index[producer];
                    if !graph.contains_edge(from, consumer) {
                        graph.add_edge(from, consumer, ());
                    }
                }
            }
        }

        Self { graph, index }
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, fid: FuncId) -> bool {
        self.index.contains_key(&fid)
    }

    /// Direct consumers of the given instance, in ascending id order.
    pub fn successors(&self, fid: FuncId) -> Vec<FuncId> {
        self.neighbors(fid, petgraph::Direction::Outgoing)
    }

    /// Direct producers feeding the given instance, in ascending id order.
    pub fn predecessors(&self, fid: FuncId) -> Vec<FuncId> {
        self.neighbors(fid, petgraph::Direction::Incoming)
    }

    fn neighbors(&self, fid: FuncId, dir: petgraph::Direction) -> Vec<FuncId> {
        let Some(&v) = self.index.get(&fid) else {
            return Vec::new();
        };
        let mut out: Vec<FuncId> = self
            .graph
            .neighbors_directed(v, dir)
            .map(|n| self.graph[n])
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Every instance reachable from `roots` along consumer edges, the roots
    /// themselves included.
    pub fn downstream_from<I>(&self, roots: I) -> std::collections::BTreeSet<FuncId>
    where
        I: IntoIterator<Item = FuncId>,
    {
        let mut visited = std::collections::BTreeSet::new();
        let mut queue: std::collections::VecDeque<FuncId> = roots.into_iter().collect();
        while let Some(fid) = queue.pop_front() {
            if visited.insert(fid) {
                queue.extend(self.successors(fid));
            }
        }
        visited
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecScope;
    use crate::func::{FuncError, FuncGuid, FuncInstance, FuncRegistry, TreeFunction};
    use crate::model::{Document, DocumentConfig, NodeId, ParamValue, TypeTag};
    use std::sync::Arc;

    const TAG: &str = "unit";

    struct Sum;

    impl TreeFunction for Sum {
        fn guid(&self) -> FuncGuid {
            FuncGuid::of("test.sum")
        }

        fn name(&self) -> &str {
            "sum"
        }

        fn execute(
            &self,
            instance: &FuncInstance,
            scope: &mut ExecScope<'_>,
        ) -> Result<(), FuncError> {
            let target = *instance.results.first().ok_or(FuncError::NoResult)?;
            let total: f64 = instance
                .arguments
                .iter()
                .filter_map(|a| scope.value(*a).and_then(ParamValue::as_real))
                .sum();
            scope.set_value(target, ParamValue::Real(total));
            Ok(())
        }
    }

    fn doc() -> Document {
        let mut registry = FuncRegistry::new();
        registry.register(Arc::new(Sum));
        Document::new(DocumentConfig {
            partitions: vec![TypeTag::of(TAG)],
            registry,
            ..Default::default()
        })
    }

    fn sum_unit(doc: &mut Document, name: &str, args: &[ParamId]) -> (FuncId, ParamId, NodeId) {
        let node = doc.create_node(&TypeTag::of(TAG), name);
        let out = doc.add_param(node, "out", ParamValue::Real(0.0));
        let fid = doc.connect_function(&FuncGuid::of("test.sum"), node, args.to_vec(), vec![out]);
        (fid, out, node)
    }

    #[test]
    fn edges_run_from_producer_to_consumer() {
        let mut doc = doc();
        doc.open_command();
        let (fa, out_a, _) = sum_unit(&mut doc, "a", &[]);
        let (fb, out_b, _) = sum_unit(&mut doc, "b", &[out_a]);
        let (fc, _, _) = sum_unit(&mut doc, "c", &[out_b]);
        doc.commit_command(None);

        let graph = DependencyGraph::build(&doc);
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.successors(fa), vec![fb]);
        assert_eq!(graph.successors(fb), vec![fc]);
        assert_eq!(graph.predecessors(fc), vec![fb]);
        assert_eq!(graph.downstream_from([fa]).len(), 3);
    }

    #[test]
    fn empty_document_reports_no_graph() {
        let doc = doc();
        let graph = DependencyGraph::build(&doc);
        let analysis = DependencyAnalyzer::analyze(&doc, &graph);
        assert_eq!(analysis.state(), GraphState::NO_GRAPH);
    }

    #[test]
    fn acyclic_well_wired_graph_is_ok() {
        let mut doc = doc();
        doc.open_command();
        let (_, out_a, _) = sum_unit(&mut doc, "a", &[]);
        sum_unit(&mut doc, "b", &[out_a]);
        doc.commit_command(None);

        let graph = DependencyGraph::build(&doc);
        let analysis = DependencyAnalyzer::analyze(&doc, &graph);
        assert!(analysis.is_ok());
        assert!(analysis.faulty().is_empty());
    }

    #[test]
    fn cycle_is_enriched_with_its_downstream() {
        let mut doc = doc();
        doc.open_command();
        // b and c feed each other; d consumes c; e stands alone.
        let b_node = doc.create_node(&TypeTag::of(TAG), "b");
        let out_b = doc.add_param(b_node, "out", ParamValue::Real(0.0));
        let c_node = doc.create_node(&TypeTag::of(TAG), "c");
        let out_c = doc.add_param(c_node, "out", ParamValue::Real(0.0));
        let fb =
            doc.connect_function(&FuncGuid::of("test.sum"), b_node, vec![out_c], vec![out_b]);
        let fc =
            doc.connect_function(&FuncGuid::of("test.sum"), c_node, vec![out_b], vec![out_c]);
        let (fd, _, _) = sum_unit(&mut doc, "d", &[out_c]);
        let (fe, _, _) = sum_unit(&mut doc, "e", &[]);
        doc.commit_command(None);

        let graph = DependencyGraph::build(&doc);
        let analysis = DependencyAnalyzer::analyze(&doc, &graph);
        assert!(analysis.has_loops());
        assert_eq!(
            analysis.cyclic().iter().copied().collect::<Vec<_>>(),
            vec![fb, fc]
        );
        assert!(analysis.faulty().contains(&fd));
        assert!(!analysis.faulty().contains(&fe));
        assert!(!analysis.cyclic_parameters(&doc).is_empty());
    }

    #[test]
    fn dangling_argument_marks_the_instance_malformed() {
        let mut doc = doc();
        doc.open_command();
        let (_, out_a, a_node) = sum_unit(&mut doc, "a", &[]);
        let (fb, _, _) = sum_unit(&mut doc, "b", &[out_a]);
        doc.commit_command(None);

        doc.open_command();
        // Drop a's own instance first so the anchor can be deleted cleanly.
        let anchored = doc.node(a_node).unwrap().anchored.clone();
        for fid in anchored {
            doc.disconnect_function(fid);
        }
        doc.delete_node(a_node);
        doc.commit_command(None);

        let graph = DependencyGraph::build(&doc);
        let analysis = DependencyAnalyzer::analyze(&doc, &graph);
        assert!(analysis.state().contains(GraphState::MALFORMED));
        assert!(analysis.malformed().contains(&fb));
    }

    #[test]
    fn stale_self_reference_does_not_create_a_cycle() {
        let mut doc = doc();
        doc.open_command();
        let node = doc.create_node(&TypeTag::of(TAG), "solo");
        let out = doc.add_param(node, "out", ParamValue::Real(0.0));
        doc.connect_function(&FuncGuid::of("test.sum"), node, vec![out], vec![out]);
        doc.commit_command(None);

        let graph = DependencyGraph::build(&doc);
        assert_eq!(graph.edge_count(), 0);
        let analysis = DependencyAnalyzer::analyze(&doc, &graph);
        assert!(analysis.is_ok());
    }
}
