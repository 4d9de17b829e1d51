//! Computation-unit instances, the vertices of the dependency graph.

use super::FuncGuid;
use crate::model::{FuncId, NodeId, ParamId};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A computation unit anchored at a concrete Node.
///
/// Arguments and results are non-owning Parameter references; edges of the
/// dependency graph run from the instance producing a Parameter to every
/// instance consuming it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncInstance {
    pub id: FuncId,
    pub guid: FuncGuid,
    pub anchor: NodeId,
    pub arguments: SmallVec<[ParamId; 4]>,
    pub results: SmallVec<[ParamId; 2]>,
}

impl FuncInstance {
    pub fn new(id: FuncId, guid: FuncGuid, anchor: NodeId) -> Self {
        Self {
            id,
            guid,
            anchor,
            arguments: SmallVec::new(),
            results: SmallVec::new(),
        }
    }

    /// Nodes this instance is wired to, anchor included.
    pub fn wired_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::once(self.anchor)
            .chain(self.arguments.iter().map(|p| p.node))
            .chain(self.results.iter().map(|p| p.node))
    }

    pub fn consumes(&self, pid: ParamId) -> bool {
        self.arguments.contains(&pid)
    }

    pub fn produces(&self, pid: ParamId) -> bool {
        self.results.contains(&pid)
    }
}
