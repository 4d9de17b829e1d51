//! The built-in expression evaluator computation unit.

use super::{FuncError, FuncGuid, FuncInstance, Priority, TreeFunction, Wiring};
use crate::exec::ExecScope;
use crate::expr;
use crate::model::ParamValue;
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// GUID of the real-valued expression evaluator.
pub const EVALUATOR_GUID: &str = "arbordoc.func.real-evaluator";

/// Evaluates the textual expression of its single result Parameter against
/// the Variable Nodes supplied as arguments.
///
/// Runs with `Priority::Evaluation` so that expression-driven Parameters are
/// settled before ordinary units consume them.
#[derive(Debug, Default)]
pub struct RealEvaluator;

impl TreeFunction for RealEvaluator {
    fn guid(&self) -> FuncGuid {
        FuncGuid::of(EVALUATOR_GUID)
    }

    fn name(&self) -> &str {
        "Real expression evaluator"
    }

    fn priority(&self) -> Priority {
        Priority::Evaluation
    }

    /// Rewires the argument slots to the value Parameters of every variable
    /// the expression mentions. This is how renames and newly introduced
    /// variables take effect without manual reconnection.
    fn auto_connect(&self, scope: &ExecScope<'_>, instance: &FuncInstance) -> Option<Wiring> {
        let target = *instance.results.first()?;
        let source = scope.expression(target)?.to_owned();

        let mut arguments: SmallVec<[_; 4]> = SmallVec::new();
        for ident in expr::referenced_idents(&source) {
            if let Some(pid) = scope.variable_param(&ident) {
                if pid != target && !arguments.contains(&pid) {
                    arguments.push(pid);
                }
            }
        }
        Some(Wiring {
            arguments,
            results: instance.results.clone(),
        })
    }

    fn execute(
        &self,
        instance: &FuncInstance,
        scope: &mut ExecScope<'_>,
    ) -> Result<(), FuncError> {
        let target = *instance.results.first().ok_or(FuncError::NoResult)?;
        let source = scope
            .expression(target)
            .unwrap_or_default()
            .to_owned();

        // Bind every argument variable by the name of its owning Node. The
        // stale self-reference slot left by a bare connect is skipped.
        let mut env: BTreeMap<String, f64> = BTreeMap::new();
        for arg in &instance.arguments {
            if *arg == target {
                continue;
            }
            let value = scope
                .value(*arg)
                .and_then(ParamValue::as_real)
                .ok_or(FuncError::BadInput(*arg))?;
            if let Some(name) = scope.node_name(arg.node) {
                env.insert(name.to_owned(), value);
            }
        }

        let result = expr::evaluate(&source, &|ident| env.get(ident).copied())?;
        scope.set_value(target, ParamValue::Real(result));
        Ok(())
    }
}
