//! Parameters: typed, addressable fields owned by a Node.

use super::id::FuncId;
use super::value::ParamValue;
use serde::{Deserialize, Serialize};

/// A typed field of a Node.
///
/// `expression` being present makes the Parameter evaluable: the textual
/// expression can be bound to an evaluator computation unit which derives the
/// raw value from named variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: ParamValue,
    /// Set when the Parameter was modified in the open transaction or was
    /// explicitly queued for recomputation.
    pub touched: bool,
    /// Evaluation string. `None` means the Parameter is not evaluable.
    pub expression: Option<String>,
    /// Attached evaluator instance, if any.
    pub evaluator: Option<FuncId>,
}

impl Parameter {
    pub fn new(name: &str, value: ParamValue) -> Self {
        Self {
            name: name.to_owned(),
            value,
            touched: false,
            expression: None,
            evaluator: None,
        }
    }

    pub fn is_evaluable(&self) -> bool {
        self.expression.is_some()
    }
}
