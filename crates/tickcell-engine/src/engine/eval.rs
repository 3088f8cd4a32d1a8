//! Rhai engine creation and host formula evaluation.
//!
//! Two engines are built here:
//! - the snippet engine, with snippet built-ins and strict variables, which
//!   compiles and runs embedded expressions;
//! - the host engine, with the ALL CAPS cell/range built-ins, which evaluates
//!   ordinary formulas and the bodies of wrapper formulas.

use rhai::{Dynamic, Engine, Scope};

use super::preprocess::preprocess_script;
use super::value::Value;
use super::ValueGrid;
use crate::error::RuntimeError;

/// Resource limits applied to both engines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineLimits {
    /// Maximum Rhai operations per evaluation; `None` is unlimited.
    pub max_operations: Option<u64>,
}

fn apply_limits(engine: &mut Engine, limits: EngineLimits) {
    if let Some(max) = limits.max_operations {
        engine.set_max_operations(max);
    }
}

/// Create the engine snippets are compiled and invoked with.
pub fn create_snippet_engine(limits: EngineLimits) -> Engine {
    let mut engine = Engine::new();
    // Every free name must be a declared binding.
    engine.set_strict_variables(true);
    apply_limits(&mut engine, limits);
    crate::builtins::register_snippet_builtins(&mut engine);
    engine
}

/// Create a host formula engine reading cell values from `values`.
pub fn create_host_engine(values: ValueGrid, limits: EngineLimits) -> Engine {
    let mut engine = Engine::new();
    apply_limits(&mut engine, limits);
    crate::builtins::register_host_builtins(&mut engine, values);
    engine
}

/// Evaluate host formula text (without the leading `=`) with `locals` in scope.
pub fn eval_host_formula(
    engine: &Engine,
    body: &str,
    locals: &[(String, Value)],
) -> Result<Dynamic, RuntimeError> {
    let processed = preprocess_script(body);
    let mut scope = Scope::new();
    for (name, value) in locals {
        scope.push_dynamic(name.clone(), value.to_dynamic());
    }
    Ok(engine.eval_with_scope::<Dynamic>(&mut scope, &processed)?)
}
