//! Transform definitions and the string-keyed registry the runner dispatches
//! through. A pipeline step is `["@transform", name, ...params]`; parameters
//! are arity-checked against the definition before the transform is applied.

pub mod cluster;
pub mod combining;
pub mod grouping;
pub mod plot;
pub mod rowwise;
pub mod source;
pub mod stat_tests;

use crate::error::EngineError;
use crate::expr::Expr;
use crate::table::Table;
use crate::value::Cell;
use indexmap::IndexMap;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;

pub use cluster::{Clustering, SilhouetteScore};
pub use plot::{PlotKind, PlotSpec, Regression};
pub use stat_tests::TestResult;

/// The shared table environment of one program run.
pub type Environment = IndexMap<String, Table>;

/// Transform parameter arity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arity {
    /// Exactly `n` parameters.
    Fixed(usize),
    /// At least `n` parameters.
    AtLeast(usize),
    /// Between `min` and `max` parameters inclusive.
    Range(usize, usize),
}

/// Mutable state a transform runs against: the shared environment, the
/// pipeline's current table, and the artifact sinks of the run.
pub struct RunCtx<'a> {
    pub env: &'a mut Environment,
    pub current: Option<Table>,
    pub plots: &'a mut Vec<PlotSpec>,
    pub tests: &'a mut Vec<TestResult>,
    pub clusterings: &'a mut Vec<Clustering>,
    pub silhouettes: &'a mut Vec<SilhouetteScore>,
}

/// The type of a transform's apply function. `args` are the parameters after
/// the `"@transform"` marker and the transform name.
pub type ApplyFn = for<'a> fn(&[Json], &mut RunCtx<'a>) -> Result<(), EngineError>;

/// A named transform.
pub struct TransformDefinition {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub arity: Arity,
    pub apply_fn: ApplyFn,
}

/// Asserts that a step carries the number of parameters its transform expects.
pub fn assert_arity(name: &str, arity: &Arity, got: usize) -> Result<(), EngineError> {
    let ok = match arity {
        Arity::Fixed(n) => got == *n,
        Arity::AtLeast(n) => got >= *n,
        Arity::Range(min, max) => got >= *min && got <= *max,
    };
    if ok {
        return Ok(());
    }
    let expected = match arity {
        Arity::Fixed(n) => format!("{n}"),
        Arity::AtLeast(n) => format!("at least {n}"),
        Arity::Range(min, max) => format!("{min} to {max}"),
    };
    Err(EngineError::Arity(format!(
        "\"{name}\" transform expects {expected} parameter(s), got {got}"
    )))
}

/// All transforms combined.
pub fn all_transforms() -> Vec<Arc<TransformDefinition>> {
    let mut defs = Vec::new();
    defs.extend(source::transforms());
    defs.extend(rowwise::transforms());
    defs.extend(grouping::transforms());
    defs.extend(combining::transforms());
    defs.extend(plot::transforms());
    defs.extend(stat_tests::transforms());
    defs.extend(cluster::transforms());
    defs
}

/// Map of transform name/alias to definition.
pub fn transforms_map() -> HashMap<String, Arc<TransformDefinition>> {
    let mut map = HashMap::new();
    for def in all_transforms() {
        map.insert(def.name.to_string(), Arc::clone(&def));
        for alias in def.aliases {
            map.insert(alias.to_string(), Arc::clone(&def));
        }
    }
    map
}

// ------------------------------------------------------------ shared helpers

/// Takes the pipeline's current table, or fails if nothing has produced one.
pub(crate) fn take_input(name: &str, ctx: &mut RunCtx<'_>) -> Result<Table, EngineError> {
    ctx.current.take().ok_or_else(|| {
        EngineError::Dependency(format!(
            "\"{name}\" has no input table; start the pipeline with a data source"
        ))
    })
}

pub(crate) fn arg_str<'a>(name: &str, args: &'a [Json], i: usize) -> Result<&'a str, EngineError> {
    args.get(i).and_then(Json::as_str).ok_or_else(|| {
        EngineError::Parse(format!("\"{name}\" parameter {i} must be a string"))
    })
}

pub(crate) fn arg_f64(name: &str, args: &[Json], i: usize) -> Result<f64, EngineError> {
    args.get(i).and_then(Json::as_f64).ok_or_else(|| {
        EngineError::Parse(format!("\"{name}\" parameter {i} must be a number"))
    })
}

pub(crate) fn arg_u64(name: &str, args: &[Json], i: usize) -> Result<u64, EngineError> {
    args.get(i).and_then(Json::as_u64).ok_or_else(|| {
        EngineError::Parse(format!(
            "\"{name}\" parameter {i} must be a non-negative integer"
        ))
    })
}

pub(crate) fn arg_expr(name: &str, args: &[Json], i: usize) -> Result<Expr, EngineError> {
    let raw = args.get(i).ok_or_else(|| {
        EngineError::Parse(format!("\"{name}\" parameter {i} must be an expression"))
    })?;
    Expr::from_json(raw)
}

/// The remaining parameters as column names.
pub(crate) fn rest_columns(
    name: &str,
    args: &[Json],
    from: usize,
) -> Result<Vec<String>, EngineError> {
    args[from..]
        .iter()
        .enumerate()
        .map(|(i, a)| {
            a.as_str().map(str::to_string).ok_or_else(|| {
                EngineError::Parse(format!(
                    "\"{name}\" parameter {} must be a column name",
                    from + i
                ))
            })
        })
        .collect()
}

/// Fails with a schema error if any named column is absent from `table`.
pub(crate) fn check_columns(
    name: &str,
    table: &Table,
    columns: &[String],
) -> Result<(), EngineError> {
    for col in columns {
        if !table.has_column(col) {
            return Err(EngineError::Schema(format!(
                "\"{name}\" references unknown column \"{col}\""
            )));
        }
    }
    Ok(())
}

/// Non-missing numeric values of a column, in row order. A non-numeric,
/// non-missing cell is a type error.
pub(crate) fn numeric_values(
    name: &str,
    table: &Table,
    column: &str,
) -> Result<Vec<f64>, EngineError> {
    check_columns(name, table, std::slice::from_ref(&column.to_string()))?;
    let mut out = Vec::with_capacity(table.len());
    for row in table.rows() {
        match &row[column] {
            Cell::Number(n) => out.push(*n),
            Cell::Missing => {}
            other => {
                return Err(EngineError::Type(format!(
                    "\"{name}\" requires numeric column \"{column}\", found a {} cell",
                    other.kind()
                )))
            }
        }
    }
    Ok(out)
}

/// Looks a table up in the environment.
pub(crate) fn env_table<'a>(
    name: &str,
    ctx: &'a RunCtx<'_>,
    table: &str,
) -> Result<&'a Table, EngineError> {
    ctx.env.get(table).ok_or_else(|| {
        EngineError::Dependency(format!(
            "\"{name}\" references table \"{table}\", which no pipeline has produced"
        ))
    })
}
