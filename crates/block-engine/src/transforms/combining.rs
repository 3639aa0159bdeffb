//! Transforms that combine two environment tables: join and glue.

use super::{arg_str, env_table, Arity, RunCtx, TransformDefinition};
use crate::error::EngineError;
use crate::table::{Row, Table};
use serde_json::Value as Json;
use std::sync::Arc;

/// Output column name for a joined table: qualified with the source table
/// name only when both sides carry the column.
fn joined_name(table: &str, column: &str, other: &Table) -> String {
    if other.has_column(column) {
        format!("{table}.{column}")
    } else {
        column.to_string()
    }
}

fn join_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let left_name = arg_str("join", args, 0)?;
    let left_col = arg_str("join", args, 1)?;
    let right_name = arg_str("join", args, 2)?;
    let right_col = arg_str("join", args, 3)?;
    if left_name == right_name {
        return Err(EngineError::Schema(
            "\"join\" requires two distinct tables".into(),
        ));
    }
    let left = env_table("join", ctx, left_name)?.clone();
    let right = env_table("join", ctx, right_name)?.clone();
    for (table, col) in [(&left, left_col), (&right, right_col)] {
        if !table.has_column(col) {
            return Err(EngineError::Schema(format!(
                "\"join\" references unknown column \"{col}\""
            )));
        }
    }

    let mut columns = Vec::with_capacity(left.columns().len() + right.columns().len());
    for col in left.columns() {
        columns.push(joined_name(left_name, col, &right));
    }
    for col in right.columns() {
        columns.push(joined_name(right_name, col, &left));
    }
    let mut out = Table::new(columns);

    // Inner equi-join: a Missing key never matches, equal keys produce the
    // full cross product of their row pairs.
    for lrow in left.rows() {
        let key = &lrow[left_col];
        if key.is_missing() {
            continue;
        }
        for rrow in right.rows() {
            if rrow[right_col] != *key {
                continue;
            }
            let mut row = Row::new();
            for (col, cell) in lrow {
                row.insert(joined_name(left_name, col, &right), cell.clone());
            }
            for (col, cell) in rrow {
                row.insert(joined_name(right_name, col, &left), cell.clone());
            }
            out.push_row(row);
        }
    }
    ctx.current = Some(out);
    Ok(())
}

fn glue_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let first_name = arg_str("glue", args, 0)?;
    let second_name = arg_str("glue", args, 1)?;
    let first = env_table("glue", ctx, first_name)?.clone();
    let second = env_table("glue", ctx, second_name)?.clone();

    let mut a: Vec<&String> = first.columns().iter().collect();
    let mut b: Vec<&String> = second.columns().iter().collect();
    a.sort();
    b.sort();
    if a != b {
        return Err(EngineError::Schema(format!(
            "\"glue\" requires identical column sets; \"{first_name}\" has [{}] but \"{second_name}\" has [{}]",
            first.columns().join(", "),
            second.columns().join(", ")
        )));
    }

    let mut out = Table::new(first.columns().to_vec());
    for row in first.rows().iter().chain(second.rows()) {
        out.push_row(row.clone());
    }
    ctx.current = Some(out);
    Ok(())
}

pub fn transforms() -> Vec<Arc<TransformDefinition>> {
    vec![
        Arc::new(TransformDefinition {
            name: "join",
            aliases: &[],
            arity: Arity::Fixed(4),
            apply_fn: join_apply,
        }),
        Arc::new(TransformDefinition {
            name: "glue",
            aliases: &[],
            arity: Arity::Fixed(2),
            apply_fn: glue_apply,
        }),
    ]
}
