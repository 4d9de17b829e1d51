//! Nodes: addressable entities composed of Parameters, organized in a tree.

use super::id::{FuncId, NodeId, ParamId, TypeTag};
use super::param::Parameter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An addressable entity of the document.
///
/// The parent link is a back-pointer for lookup only; ownership flows from
/// the arena. `anchored` lists the computation-unit instances anchored on
/// this Node, `refs` lists every instance that consumes or produces one of
/// its Parameters. Both sets exist so that recursive deletion can sever all
/// wiring before the storage is freed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub type_tag: TypeTag,
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub params: Vec<Parameter>,
    pub anchored: Vec<FuncId>,
    pub refs: BTreeSet<FuncId>,
}

impl Node {
    pub fn new(id: NodeId, type_tag: TypeTag, name: &str) -> Self {
        Self {
            id,
            type_tag,
            name: name.to_owned(),
            parent: None,
            children: Vec::new(),
            params: Vec::new(),
            anchored: Vec::new(),
            refs: BTreeSet::new(),
        }
    }

    pub fn param(&self, slot: u32) -> Option<&Parameter> {
        self.params.get(slot as usize)
    }

    pub fn param_mut(&mut self, slot: u32) -> Option<&mut Parameter> {
        self.params.get_mut(slot as usize)
    }

    /// Identifiers of all Parameters owned by this Node, in slot order.
    pub fn param_ids(&self) -> impl Iterator<Item = ParamId> + '_ {
        let id = self.id;
        (0..self.params.len() as u32).map(move |slot| ParamId::new(id, slot))
    }
}
