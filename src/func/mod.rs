//! Computation units ("tree functions") and their session registry.

pub mod evaluator;
mod instance;

pub use instance::FuncInstance;

use crate::exec::ExecScope;
use crate::expr::EvalError;
use crate::model::ParamId;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Globally unique type identifier of a computation unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FuncGuid(pub String);

impl FuncGuid {
    pub fn of(guid: &str) -> Self {
        Self(guid.to_owned())
    }
}

impl fmt::Display for FuncGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scheduling priority class of a computation-unit type.
///
/// `Evaluation` units are ordered ahead of `Normal` units they share no
/// dependency edge with; this is what makes implicit parameterization via
/// expressions work in a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Evaluation,
    Normal,
}

/// Wiring proposal returned by [`TreeFunction::auto_connect`].
#[derive(Debug, Clone, Default)]
pub struct Wiring {
    pub arguments: SmallVec<[ParamId; 4]>,
    pub results: SmallVec<[ParamId; 2]>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FuncError {
    #[error("computation unit has no result parameter")]
    NoResult,
    #[error("input parameter {0} is missing or not numeric")]
    BadInput(ParamId),
    #[error("expression evaluation failed: {0}")]
    Evaluation(#[from] EvalError),
    #[error("{0}")]
    Failed(String),
}

/// A pure, named transform deriving result Parameters from argument
/// Parameters. Implementations must not mutate the document structure while
/// the dependency graph is frozen; doing so is a logic error in the unit.
pub trait TreeFunction: Send + Sync {
    fn guid(&self) -> FuncGuid;

    fn name(&self) -> &str;

    fn priority(&self) -> Priority {
        Priority::Normal
    }

    /// Heavy units run only when explicitly deployed for execution.
    fn is_heavy(&self) -> bool {
        false
    }

    /// Gives the unit a chance to refresh its own wiring before a pass.
    /// Returning `None` keeps the stored wiring untouched.
    fn auto_connect(&self, _scope: &ExecScope<'_>, _instance: &FuncInstance) -> Option<Wiring> {
        None
    }

    fn execute(&self, instance: &FuncInstance, scope: &mut ExecScope<'_>)
        -> Result<(), FuncError>;
}

/// Session-owned registry mapping computation-unit GUIDs to implementations.
///
/// The registry is passed into the document at construction time; there is no
/// process-wide driver table.
#[derive(Clone, Default)]
pub struct FuncRegistry {
    drivers: BTreeMap<FuncGuid, Arc<dyn TreeFunction>>,
}

impl FuncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, func: Arc<dyn TreeFunction>) {
        self.drivers.insert(func.guid(), func);
    }

    pub fn contains(&self, guid: &FuncGuid) -> bool {
        self.drivers.contains_key(guid)
    }

    pub fn driver(&self, guid: &FuncGuid) -> Option<Arc<dyn TreeFunction>> {
        self.drivers.get(guid).cloned()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl fmt::Debug for FuncRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FuncRegistry")
            .field("types", &self.drivers.keys().collect::<Vec<_>>())
            .finish()
    }
}
