//! Grouping and aggregation: groupBy, ungroup, summarize.

use super::{arg_str, check_columns, rest_columns, take_input, Arity, RunCtx, TransformDefinition};
use crate::error::EngineError;
use crate::stats;
use crate::table::{Grouping, Row, Table};
use crate::value::Cell;
use serde_json::Value as Json;
use std::sync::Arc;

fn group_by_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let columns = rest_columns("groupBy", args, 0)?;
    let mut table = take_input("groupBy", ctx)?;
    check_columns("groupBy", &table, &columns)?;
    // Group ids are issued in first-seen key order; the rows themselves are
    // not partitioned or reordered.
    let mut keys: Vec<Vec<Cell>> = Vec::new();
    let mut ids = Vec::with_capacity(table.len());
    for row in table.rows() {
        let key: Vec<Cell> = columns.iter().map(|c| row[c.as_str()].clone()).collect();
        let id = match keys.iter().position(|k| *k == key) {
            Some(id) => id,
            None => {
                keys.push(key);
                keys.len() - 1
            }
        };
        ids.push(id);
    }
    table.set_groups(Grouping { columns, ids });
    ctx.current = Some(table);
    Ok(())
}

fn ungroup_apply(_args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let mut table = take_input("ungroup", ctx)?;
    table.clear_groups();
    ctx.current = Some(table);
    Ok(())
}

fn summarize_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let op = arg_str("summarize", args, 0)?;
    let column = arg_str("summarize", args, 1)?.to_string();
    let table = take_input("summarize", ctx)?;
    check_columns("summarize", &table, std::slice::from_ref(&column))?;
    let out_column = format!("{column}_{op}");

    // One bucket per group id still present, in first-seen row order, or a
    // single bucket when the table is ungrouped. Ids can be sparse: a filter
    // between groupBy and here may have emptied a group entirely, and an
    // emptied group must not produce an output row.
    let (key_columns, buckets): (Vec<String>, Vec<Vec<usize>>) = match table.groups() {
        Some(grouping) => {
            let mut seen: Vec<usize> = Vec::new();
            let mut buckets: Vec<Vec<usize>> = Vec::new();
            for (i, &id) in grouping.ids.iter().enumerate() {
                let slot = match seen.iter().position(|&s| s == id) {
                    Some(slot) => slot,
                    None => {
                        seen.push(id);
                        buckets.push(Vec::new());
                        buckets.len() - 1
                    }
                };
                buckets[slot].push(i);
            }
            (grouping.columns.clone(), buckets)
        }
        None => (Vec::new(), vec![(0..table.len()).collect()]),
    };

    let mut columns = key_columns.clone();
    columns.push(out_column.clone());
    let mut out = Table::new(columns);
    for bucket in &buckets {
        let cells: Vec<&Cell> = bucket
            .iter()
            .map(|&i| &table.rows()[i][column.as_str()])
            .filter(|c| !c.is_missing())
            .collect();
        let aggregate = aggregate(op, &cells)?;
        let mut row = Row::new();
        if let Some(&first) = bucket.first() {
            for key in &key_columns {
                row.insert(key.clone(), table.rows()[first][key.as_str()].clone());
            }
        }
        row.insert(out_column.clone(), aggregate);
        out.push_row(row);
    }
    ctx.current = Some(out);
    Ok(())
}

/// Aggregates the non-missing cells of one group. Cells of the wrong kind for
/// the aggregator (a text cell that degraded on ingest, say) are skipped like
/// missing ones; an empty usable set yields 0 for `count` and `Missing` for
/// everything else.
fn aggregate(op: &str, cells: &[&Cell]) -> Result<Cell, EngineError> {
    if op == "count" {
        return Ok(Cell::Number(cells.len() as f64));
    }
    match op {
        "any" | "all" => {
            let flags: Vec<bool> = cells
                .iter()
                .filter_map(|c| match c {
                    Cell::Logical(b) => Some(*b),
                    _ => None,
                })
                .collect();
            if flags.is_empty() {
                return Ok(Cell::Missing);
            }
            let result = if op == "any" {
                flags.iter().any(|b| *b)
            } else {
                flags.iter().all(|b| *b)
            };
            Ok(Cell::Logical(result))
        }
        _ => {
            let xs: Vec<f64> = cells
                .iter()
                .filter_map(|c| match c {
                    Cell::Number(n) => Some(*n),
                    _ => None,
                })
                .collect();
            if xs.is_empty() {
                return Ok(Cell::Missing);
            }
            let n = match op {
                "sum" => xs.iter().sum(),
                "mean" => stats::mean(&xs),
                "median" => stats::median(&xs),
                "minimum" => xs.iter().copied().fold(f64::INFINITY, f64::min),
                "maximum" => xs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                "variance" => {
                    if xs.len() < 2 {
                        return Ok(Cell::Missing);
                    }
                    stats::sample_variance(&xs)
                }
                "stdDev" => {
                    if xs.len() < 2 {
                        return Ok(Cell::Missing);
                    }
                    stats::sample_variance(&xs).sqrt()
                }
                other => {
                    return Err(EngineError::Parse(format!(
                        "unknown summarize operation \"{other}\""
                    )))
                }
            };
            Ok(Cell::Number(n))
        }
    }
}

pub fn transforms() -> Vec<Arc<TransformDefinition>> {
    vec![
        Arc::new(TransformDefinition {
            name: "groupBy",
            aliases: &[],
            arity: Arity::AtLeast(1),
            apply_fn: group_by_apply,
        }),
        Arc::new(TransformDefinition {
            name: "ungroup",
            aliases: &[],
            arity: Arity::Fixed(0),
            apply_fn: ungroup_apply,
        }),
        Arc::new(TransformDefinition {
            name: "summarize",
            aliases: &["summarise"],
            arity: Arity::Fixed(2),
            apply_fn: summarize_apply,
        }),
    ]
}
