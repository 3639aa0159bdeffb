//! Row-wise transforms: filter, mutate, select, drop, sort, unique.

use super::{
    arg_expr, arg_str, check_columns, rest_columns, take_input, Arity, RunCtx,
    TransformDefinition,
};
use crate::error::EngineError;
use crate::table::{Grouping, Table};
use crate::value::Cell;
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::sync::Arc;

/// Rebuilds a table from a subset of row indices, carrying the group tag.
fn keep_rows(table: &Table, keep: &[usize]) -> Table {
    let mut out = Table::new(table.columns().to_vec());
    for &i in keep {
        out.push_row(table.rows()[i].clone());
    }
    if let Some(grouping) = table.groups() {
        out.set_groups(Grouping {
            columns: grouping.columns.clone(),
            ids: keep.iter().map(|&i| grouping.ids[i]).collect(),
        });
    }
    out
}

fn filter_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let mut predicate = arg_expr("filter", args, 0)?;
    let table = take_input("filter", ctx)?;
    let mut keep = Vec::with_capacity(table.len());
    for (i, row) in table.rows().iter().enumerate() {
        // Rows where the predicate is Missing, non-logical, or ill-typed for
        // the row's cells are dropped; other evaluation errors are real.
        match predicate.eval(row, i, &table) {
            Ok(Cell::Logical(true)) => keep.push(i),
            Ok(_) | Err(EngineError::Type(_)) => {}
            Err(other) => return Err(other),
        }
    }
    ctx.current = Some(keep_rows(&table, &keep));
    Ok(())
}

fn mutate_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let column = arg_str("mutate", args, 0)?;
    let mut expr = arg_expr("mutate", args, 1)?;
    let table = take_input("mutate", ctx)?;
    let mut columns = table.columns().to_vec();
    if !table.has_column(column) {
        columns.push(column.to_string());
    }
    let mut out = Table::new(columns);
    for (i, row) in table.rows().iter().enumerate() {
        let cell = expr.eval(row, i, &table)?;
        let mut new_row = row.clone();
        new_row.insert(column.to_string(), cell);
        out.push_row(new_row);
    }
    // Overwriting a key column invalidates the tag; the ids were computed
    // from the old values.
    if let Some(grouping) = table.groups() {
        if !grouping.columns.iter().any(|c| c == column) {
            out.set_groups(grouping.clone());
        }
    }
    ctx.current = Some(out);
    Ok(())
}

/// Drops the group tag if a projection removed one of its key columns.
fn project(table: &Table, columns: Vec<String>) -> Table {
    let mut out = Table::new(columns);
    for row in table.rows() {
        out.push_row(row.clone());
    }
    if let Some(grouping) = table.groups() {
        if grouping.columns.iter().all(|c| out.has_column(c)) {
            out.set_groups(grouping.clone());
        }
    }
    out
}

fn select_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let columns = rest_columns("select", args, 0)?;
    let table = take_input("select", ctx)?;
    check_columns("select", &table, &columns)?;
    ctx.current = Some(project(&table, columns));
    Ok(())
}

fn drop_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let dropped = rest_columns("drop", args, 0)?;
    let table = take_input("drop", ctx)?;
    check_columns("drop", &table, &dropped)?;
    let columns: Vec<String> = table
        .columns()
        .iter()
        .filter(|c| !dropped.contains(c))
        .cloned()
        .collect();
    ctx.current = Some(project(&table, columns));
    Ok(())
}

fn sort_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let columns: Vec<String> = args
        .first()
        .and_then(Json::as_array)
        .ok_or_else(|| {
            EngineError::Parse("\"sort\" parameter 0 must be an array of column names".into())
        })?
        .iter()
        .map(|c| {
            c.as_str()
                .map(str::to_string)
                .ok_or_else(|| EngineError::Parse("\"sort\" keys must be column names".into()))
        })
        .collect::<Result<_, _>>()?;
    if columns.is_empty() {
        return Err(EngineError::Arity(
            "\"sort\" needs at least one key column".into(),
        ));
    }
    let descending = match args.get(1) {
        None => false,
        Some(Json::Bool(b)) => *b,
        Some(_) => {
            return Err(EngineError::Parse(
                "\"sort\" parameter 1 must be a boolean".into(),
            ))
        }
    };
    let table = take_input("sort", ctx)?;
    check_columns("sort", &table, &columns)?;

    let mut order: Vec<usize> = (0..table.len()).collect();
    order.sort_by(|&i, &j| {
        let a = &table.rows()[i];
        let b = &table.rows()[j];
        for col in &columns {
            let ord = compare_for_sort(&a[col.as_str()], &b[col.as_str()], descending);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    ctx.current = Some(keep_rows(&table, &order));
    Ok(())
}

/// `Missing` sorts after every defined cell regardless of direction.
fn compare_for_sort(a: &Cell, b: &Cell, descending: bool) -> Ordering {
    match (a.is_missing(), b.is_missing()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = a.sort_cmp(b);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
    }
}

fn unique_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let columns = rest_columns("unique", args, 0)?;
    let table = take_input("unique", ctx)?;
    check_columns("unique", &table, &columns)?;
    let mut seen: Vec<Vec<Cell>> = Vec::new();
    let mut keep = Vec::new();
    for (i, row) in table.rows().iter().enumerate() {
        let key: Vec<Cell> = columns.iter().map(|c| row[c.as_str()].clone()).collect();
        if !seen.contains(&key) {
            seen.push(key);
            keep.push(i);
        }
    }
    ctx.current = Some(keep_rows(&table, &keep));
    Ok(())
}

pub fn transforms() -> Vec<Arc<TransformDefinition>> {
    vec![
        Arc::new(TransformDefinition {
            name: "filter",
            aliases: &[],
            arity: Arity::Fixed(1),
            apply_fn: filter_apply,
        }),
        Arc::new(TransformDefinition {
            name: "mutate",
            aliases: &[],
            arity: Arity::Fixed(2),
            apply_fn: mutate_apply,
        }),
        Arc::new(TransformDefinition {
            name: "select",
            aliases: &[],
            arity: Arity::AtLeast(1),
            apply_fn: select_apply,
        }),
        Arc::new(TransformDefinition {
            name: "drop",
            aliases: &[],
            arity: Arity::AtLeast(1),
            apply_fn: drop_apply,
        }),
        Arc::new(TransformDefinition {
            name: "sort",
            aliases: &[],
            arity: Arity::Range(1, 2),
            apply_fn: sort_apply,
        }),
        Arc::new(TransformDefinition {
            name: "unique",
            aliases: &[],
            arity: Arity::AtLeast(1),
            apply_fn: unique_apply,
        }),
    ]
}
