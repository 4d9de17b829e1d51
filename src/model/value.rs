//! The closed set of value kinds a Parameter can carry.

use super::id::NodeId;
use serde::{Deserialize, Serialize};

/// Raw payload of a Parameter.
///
/// Reference kinds hold non-owning Node handles; they are the cross-links the
/// Copy/Paste Engine relocates and filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Real(f64),
    Str(String),
    RealArray(Vec<f64>),
    Reference(Option<NodeId>),
    ReferenceList(Vec<NodeId>),
}

impl ParamValue {
    /// Numeric view used by the evaluation machinery. Strings and references
    /// have no numeric meaning.
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Int(i) => Some(*i as f64),
            Self::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// Node handles referenced by this value, if any.
    pub fn referenced_nodes(&self) -> Vec<NodeId> {
        match self {
            Self::Reference(Some(id)) => vec![*id],
            Self::ReferenceList(ids) => ids.clone(),
            _ => Vec::new(),
        }
    }
}
