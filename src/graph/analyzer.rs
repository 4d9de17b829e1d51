//! Structural diagnostics over the dependency graph.

use super::DependencyGraph;
use crate::model::{Document, FuncId, ParamId};
use bitflags::bitflags;
use petgraph::algo::tarjan_scc;
use std::collections::BTreeSet;

bitflags! {
    /// Health summary of a built dependency graph.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GraphState: u32 {
        /// The graph is acyclic and every instance is well wired.
        const OK        = 0b0001;
        /// At least one dependency cycle exists.
        const HAS_LOOPS = 0b0010;
        /// There are no instances at all.
        const NO_GRAPH  = 0b0100;
        /// Some instance refers to a missing driver, anchor or Parameter.
        const MALFORMED = 0b1000;
    }
}

/// Inspects a [`DependencyGraph`] for cycles and broken wiring.
///
/// The faulty set returned by [`DependencyAnalyzer::faulty`] is enriched:
/// besides the instances sitting on a cycle it contains every instance
/// downstream of one, since those can never receive trustworthy inputs.
#[derive(Debug, Clone)]
pub struct DependencyAnalyzer {
    state: GraphState,
    cyclic: BTreeSet<FuncId>,
    faulty: BTreeSet<FuncId>,
    malformed: BTreeSet<FuncId>,
}

impl DependencyAnalyzer {
    pub fn analyze(doc: &Document, graph: &DependencyGraph) -> Self {
        if graph.is_empty() {
            return Self {
                state: GraphState::NO_GRAPH,
                cyclic: BTreeSet::new(),
                faulty: BTreeSet::new(),
                malformed: BTreeSet::new(),
            };
        }

        let malformed = Self::check_wiring(doc);

        let mut cyclic = BTreeSet::new();
        for scc in tarjan_scc(&graph.graph) {
            if scc.len() > 1 {
                cyclic.extend(scc.iter().map(|&v| graph.graph[v]));
            } else {
                // A single vertex is cyclic only through a self-edge.
                let v = scc[0];
                if graph.graph.contains_edge(v, v) {
                    cyclic.insert(graph.graph[v]);
                }
            }
        }

        let faulty = graph.downstream_from(cyclic.iter().copied());

        let mut state = GraphState::empty();
        if !cyclic.is_empty() {
            state |= GraphState::HAS_LOOPS;
        }
        if !malformed.is_empty() {
            state |= GraphState::MALFORMED;
        }
        if state.is_empty() {
            state = GraphState::OK;
        }

        Self {
            state,
            cyclic,
            faulty,
            malformed,
        }
    }

    /// Instances whose wiring cannot be resolved against the live model.
    fn check_wiring(doc: &Document) -> BTreeSet<FuncId> {
        let mut bad = BTreeSet::new();
        for inst in doc.instances() {
            if !doc.registry().contains(&inst.guid) {
                bad.insert(inst.id);
                continue;
            }
            if doc.node(inst.anchor).is_none() {
                bad.insert(inst.id);
                continue;
            }
            let resolvable = inst
                .arguments
                .iter()
                .chain(inst.results.iter())
                .all(|pid| doc.param(*pid).is_some());
            if !resolvable {
                bad.insert(inst.id);
            }
        }
        bad
    }

    pub fn state(&self) -> GraphState {
        self.state
    }

    pub fn is_ok(&self) -> bool {
        self.state.contains(GraphState::OK)
    }

    pub fn has_loops(&self) -> bool {
        self.state.contains(GraphState::HAS_LOOPS)
    }

    /// Instances sitting directly on a dependency cycle.
    pub fn cyclic(&self) -> &BTreeSet<FuncId> {
        &self.cyclic
    }

    /// Cyclic instances plus everything downstream of them.
    pub fn faulty(&self) -> &BTreeSet<FuncId> {
        &self.faulty
    }

    pub fn malformed(&self) -> &BTreeSet<FuncId> {
        &self.malformed
    }

    /// Result Parameters of every faulty instance, for diagnostics and UI
    /// highlighting.
    pub fn cyclic_parameters(&self, doc: &Document) -> Vec<ParamId> {
        let mut out = Vec::new();
        for fid in &self.faulty {
            if let Some(inst) = doc.instance(*fid) {
                out.extend(inst.results.iter().copied());
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }
}
