//! Partitions: homogeneous registries of Nodes by type tag.

use super::id::{NodeId, TypeTag};
use serde::{Deserialize, Serialize};

/// The registry of all Nodes of one type.
///
/// Partitions are created once at document initialization and never altered
/// at runtime; requesting an unregistered Partition is a programming error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub tag: TypeTag,
    nodes: Vec<NodeId>,
}

impl Partition {
    pub fn new(tag: TypeTag) -> Self {
        Self {
            tag,
            nodes: Vec::new(),
        }
    }

    pub(crate) fn add(&mut self, id: NodeId) {
        if !self.nodes.contains(&id) {
            self.nodes.push(id);
        }
    }

    pub(crate) fn remove(&mut self, id: NodeId) {
        self.nodes.retain(|n| *n != id);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }
}
