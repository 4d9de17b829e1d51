//! Dependency-driven execution of computation units.
//!
//! A pass freezes the model, refreshes automatic wirings, rebuilds and
//! analyzes the dependency graph, then walks a deterministic topological
//! order executing only the units whose inputs changed since the last pass.

mod context;
mod scope;

pub use context::ExecutionCtx;
pub use scope::ExecScope;

use crate::func::Priority;
use crate::graph::{DependencyAnalyzer, DependencyGraph};
use crate::model::{Document, FuncId};
use crate::tx::TxData;
use bitflags::bitflags;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

bitflags! {
    /// Outcome summary of an execution pass.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ExecutionStatus: u32 {
        /// Every scheduled unit ran without error.
        const DONE           = 0b0001;
        /// At least one unit failed or was wired to missing objects.
        const FAILED         = 0b0010;
        /// Dependency cycles were found; the cyclic region was skipped.
        const LOOPS_DETECTED = 0b0100;
        /// The document holds no instances; nothing to do.
        const NO_FUNCTIONS   = 0b1000;
    }
}

/// Runs one full execution pass over the document.
///
/// `data` is attached to the pass context for the duration of the pass so
/// drivers can inspect the originating command.
pub fn execute_all(doc: &mut Document, data: Option<TxData>) -> ExecutionStatus {
    if doc.instances().next().is_none() {
        tracing::debug!(target: "arbordoc", "execution requested with no instances");
        return ExecutionStatus::NO_FUNCTIONS;
    }

    doc.ctx_mut().set_tx_data(data);
    doc.ctx_mut().freeze();
    doc.ctx().progress().reset();

    auto_connect_pass(doc);

    let graph = DependencyGraph::build(doc);
    let analyzer = DependencyAnalyzer::analyze(doc, &graph);

    if !analyzer.malformed().is_empty() {
        tracing::error!(
            target: "arbordoc",
            malformed = ?analyzer.malformed(),
            "instances with unresolvable wiring, pass aborted"
        );
        doc.ctx_mut().unfreeze();
        doc.ctx_mut().set_tx_data(None);
        return ExecutionStatus::FAILED;
    }

    deploy_heavy_queue(doc, &graph);

    let mut status = ExecutionStatus::empty();
    let skip: BTreeSet<FuncId> = analyzer.faulty().clone();

    if analyzer.has_loops() {
        status |= ExecutionStatus::LOOPS_DETECTED;
        tracing::warn!(
            target: "arbordoc",
            cyclic = ?analyzer.cyclic(),
            skipped = ?analyzer.faulty(),
            "dependency cycles detected, cyclic region skipped"
        );
    }

    let order = schedule(doc, &graph, &skip);
    let mut errors = 0usize;

    for fid in order {
        let Some(inst) = doc.instance(fid).cloned() else {
            continue;
        };
        let Some(driver) = doc.registry().driver(&inst.guid) else {
            continue;
        };

        if !must_execute(doc, &inst) {
            continue;
        }
        if driver.is_heavy() && !doc.logbook().is_deployed(fid) && !doc.logbook().is_forced(fid) {
            tracing::debug!(target: "arbordoc", %fid, "heavy unit pending, not deployed");
            continue;
        }

        tracing::debug!(target: "arbordoc", %fid, unit = driver.name(), "executing");
        let mut scope = ExecScope::new(doc);
        match driver.execute(&inst, &mut scope) {
            Ok(()) => {
                // Results may have been written through the scope already;
                // impact them unconditionally so consumers wake up even when
                // the driver wrote nothing.
                for out in &inst.results {
                    doc.logbook_mut().impact(*out);
                }
            }
            Err(err) => {
                errors += 1;
                tracing::error!(target: "arbordoc", %fid, unit = driver.name(), %err, "unit failed");
            }
        }
    }

    doc.ctx_mut().unfreeze();
    doc.ctx_mut().set_tx_data(None);
    doc.clear_touched();
    doc.logbook_mut().release_all();

    // Loops alone do not fail the pass; DONE reports that everything
    // schedulable ran cleanly.
    if errors > 0 {
        status |= ExecutionStatus::FAILED;
    } else {
        status |= ExecutionStatus::DONE;
    }
    status
}

/// Runs a pass on a worker thread. The document stays locked for the whole
/// pass; callers resume interacting with it once the handle joins.
pub fn execute_all_detached(
    doc: Arc<Mutex<Document>>,
    data: Option<TxData>,
) -> JoinHandle<ExecutionStatus> {
    std::thread::spawn(move || {
        let mut guard = doc.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        execute_all(&mut guard, data)
    })
}

/// Drains the pending heavy-deployment queue. A deployed unit is also
/// forced, and every downstream heavy unit is forced and deployed with it so
/// one deployment settles the whole heavy chain.
fn deploy_heavy_queue(doc: &mut Document, graph: &DependencyGraph) {
    let queued = doc.ctx_mut().take_deploy_queue();
    for fid in queued {
        doc.logbook_mut().deploy(fid);
        doc.logbook_mut().force(fid);
        for succ in graph.downstream_from([fid]) {
            let heavy = doc
                .instance(succ)
                .and_then(|inst| doc.registry().driver(&inst.guid))
                .is_some_and(|driver| driver.is_heavy());
            if heavy {
                doc.logbook_mut().deploy(succ);
                doc.logbook_mut().force(succ);
            }
        }
    }
}

/// Asks every driver for a refreshed wiring before the graph is built.
fn auto_connect_pass(doc: &mut Document) {
    let ids: Vec<FuncId> = doc.instances().map(|i| i.id).collect();
    for fid in ids {
        let Some(inst) = doc.instance(fid).cloned() else {
            continue;
        };
        let Some(driver) = doc.registry().driver(&inst.guid) else {
            continue;
        };
        let proposal = {
            let scope = ExecScope::new(doc);
            driver.auto_connect(&scope, &inst)
        };
        if let Some(wiring) = proposal {
            doc.rewire_instance_derived(fid, wiring.arguments, wiring.results);
        }
    }
}

fn must_execute(doc: &Document, inst: &crate::func::FuncInstance) -> bool {
    if doc.logbook().is_forced(inst.id) {
        return true;
    }
    let inputs_fresh = inst
        .arguments
        .iter()
        .any(|arg| doc.logbook().is_modified(*arg));
    let outputs_dirty = inst
        .results
        .iter()
        .any(|out| doc.logbook().is_touched(*out) || doc.param(*out).is_some_and(|p| p.touched));
    inputs_fresh || outputs_dirty
}

/// Deterministic topological order over the non-skipped instances.
///
/// Two ready queues are kept, one per priority class. Evaluation units drain
/// first; ties inside a queue break on ascending instance id.
pub(crate) fn schedule(
    doc: &Document,
    graph: &DependencyGraph,
    skip: &BTreeSet<FuncId>,
) -> Vec<FuncId> {
    let mut indegree: BTreeMap<FuncId, usize> = BTreeMap::new();
    for (&fid, _) in graph.index.iter() {
        if skip.contains(&fid) {
            continue;
        }
        let live_preds = graph
            .predecessors(fid)
            .into_iter()
            .filter(|p| !skip.contains(p))
            .count();
        indegree.insert(fid, live_preds);
    }

    let priority_of = |fid: FuncId| -> Priority {
        doc.instance(fid)
            .and_then(|inst| doc.registry().driver(&inst.guid))
            .map_or(Priority::Normal, |d| d.priority())
    };

    let mut high: BTreeSet<FuncId> = BTreeSet::new();
    let mut normal: BTreeSet<FuncId> = BTreeSet::new();
    for (&fid, &deg) in &indegree {
        if deg == 0 {
            match priority_of(fid) {
                Priority::Evaluation => high.insert(fid),
                Priority::Normal => normal.insert(fid),
            };
        }
    }

    let mut order = Vec::with_capacity(indegree.len());
    loop {
        let next = if let Some(&fid) = high.iter().next() {
            high.remove(&fid);
            fid
        } else if let Some(&fid) = normal.iter().next() {
            normal.remove(&fid);
            fid
        } else {
            break;
        };
        order.push(next);

        for succ in graph.successors(next) {
            let Some(deg) = indegree.get_mut(&succ) else {
                continue;
            };
            *deg -= 1;
            if *deg == 0 {
                match priority_of(succ) {
                    Priority::Evaluation => high.insert(succ),
                    Priority::Normal => normal.insert(succ),
                };
            }
        }
    }
    order
}
