//! Data sources and the save sink: transforms that move tables in and out of
//! the shared environment.

use super::{arg_str, arg_u64, take_input, Arity, RunCtx, TransformDefinition};
use crate::error::EngineError;
use crate::table::{Row, Table};
use crate::value::Cell;
use serde_json::Value as Json;
use std::sync::Arc;

/// Built-in datasets shipped with the engine.
const DATASETS: &[(&str, &str)] = &[("colors", include_str!("../../datasets/colors.csv"))];

fn data_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let name = arg_str("data", args, 0)?;
    let raw = DATASETS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, text)| *text)
        .ok_or_else(|| EngineError::Lookup(format!("unknown built-in dataset \"{name}\"")))?;
    let table = Table::from_delimited(raw)?;
    ctx.env.insert(name.to_string(), table.clone());
    ctx.current = Some(table);
    Ok(())
}

fn sequence_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let name = arg_str("sequence", args, 0)?;
    let n = arg_u64("sequence", args, 1)?;
    let mut table = Table::new(vec![name.to_string()]);
    for i in 1..=n {
        let mut row = Row::new();
        row.insert(name.to_string(), Cell::Number(i as f64));
        table.push_row(row);
    }
    ctx.env.insert(name.to_string(), table.clone());
    ctx.current = Some(table);
    Ok(())
}

fn table_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let name = arg_str("table", args, 0)?;
    let rows_json = args
        .get(1)
        .and_then(Json::as_array)
        .ok_or_else(|| EngineError::Parse("\"table\" parameter 1 must be an array of rows".into()))?;
    // Column order is the first-seen key order across all rows.
    let mut columns: Vec<String> = Vec::new();
    let mut rows: Vec<Row> = Vec::with_capacity(rows_json.len());
    for raw in rows_json {
        let obj = raw.as_object().ok_or_else(|| {
            EngineError::Parse("\"table\" rows must be JSON objects".into())
        })?;
        let mut row = Row::with_capacity(obj.len());
        for (key, value) in obj {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
            row.insert(key.clone(), Cell::from_json(value)?);
        }
        rows.push(row);
    }
    let mut table = Table::new(columns);
    for row in rows {
        table.push_row(row);
    }
    ctx.env.insert(name.to_string(), table.clone());
    ctx.current = Some(table);
    Ok(())
}

fn load_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let name = arg_str("load", args, 0)?;
    let table = ctx.env.get(name).cloned().ok_or_else(|| {
        EngineError::Dependency(format!(
            "\"load\" references table \"{name}\", which no pipeline has produced"
        ))
    })?;
    ctx.current = Some(table);
    Ok(())
}

fn save_as_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let name = arg_str("saveAs", args, 0)?;
    let table = take_input("saveAs", ctx)?;
    let mut stored = table.clone();
    stored.clear_groups();
    ctx.env.insert(name.to_string(), stored);
    ctx.current = Some(table);
    Ok(())
}

pub fn transforms() -> Vec<Arc<TransformDefinition>> {
    vec![
        Arc::new(TransformDefinition {
            name: "data",
            aliases: &[],
            arity: Arity::Fixed(1),
            apply_fn: data_apply,
        }),
        Arc::new(TransformDefinition {
            name: "sequence",
            aliases: &[],
            arity: Arity::Fixed(2),
            apply_fn: sequence_apply,
        }),
        Arc::new(TransformDefinition {
            name: "table",
            aliases: &["create"],
            arity: Arity::Fixed(2),
            apply_fn: table_apply,
        }),
        Arc::new(TransformDefinition {
            name: "load",
            aliases: &[],
            arity: Arity::Fixed(1),
            apply_fn: load_apply,
        }),
        Arc::new(TransformDefinition {
            name: "saveAs",
            aliases: &["report"],
            arity: Arity::Fixed(1),
            apply_fn: save_as_apply,
        }),
    ]
}
