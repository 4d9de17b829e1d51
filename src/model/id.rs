//! Stable handles for addressing document entities.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A stable handle of a Node within the document arena.
///
/// Slots are allocated monotonically and never reused within a session, so a
/// handle captured before a deletion stays valid for undo replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn new(idx: usize) -> Self {
        Self(idx as u32)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}

/// Global identifier of a Parameter: the owning Node plus the slot number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamId {
    pub node: NodeId,
    pub slot: u32,
}

impl ParamId {
    pub fn new(node: NodeId, slot: u32) -> Self {
        Self { node, slot }
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.slot)
    }
}

/// A stable handle of a computation-unit instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FuncId(pub u32);

impl FuncId {
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    pub fn new(idx: usize) -> Self {
        Self(idx as u32)
    }
}

impl fmt::Display for FuncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Type tag of a Node. Each registered tag owns exactly one Partition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeTag(pub String);

impl TypeTag {
    pub fn of(tag: &str) -> Self {
        Self(tag.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
