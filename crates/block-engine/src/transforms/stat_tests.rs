//! Statistical tests: one-sample and paired t-tests. Each attaches a
//! structured verdict and passes the table through unchanged.

use super::{arg_f64, arg_str, check_columns, numeric_values, take_input, Arity, RunCtx, TransformDefinition};
use crate::error::EngineError;
use crate::stats;
use crate::table::Table;
use crate::value::Cell;
use serde::Serialize;
use serde_json::Value as Json;
use std::sync::Arc;

/// The verdict of a statistical test.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub name: String,
    pub statistic: f64,
    pub p_value: f64,
    pub alpha: f64,
    pub reject: bool,
}

fn check_alpha(name: &str, alpha: f64) -> Result<(), EngineError> {
    if alpha > 0.0 && alpha < 1.0 {
        Ok(())
    } else {
        Err(EngineError::Domain(format!(
            "\"{name}\" significance level must be in (0, 1), got {alpha}"
        )))
    }
}

/// One-sample t statistic against a hypothesized mean.
fn t_statistic(name: &str, xs: &[f64], mu: f64) -> Result<(f64, f64), EngineError> {
    if xs.len() < 2 {
        return Err(EngineError::Domain(format!(
            "\"{name}\" needs at least two observations, got {}",
            xs.len()
        )));
    }
    let sd = stats::sample_variance(xs).sqrt();
    if sd == 0.0 {
        return Err(EngineError::Domain(format!(
            "\"{name}\" is undefined for a zero-variance sample"
        )));
    }
    let n = xs.len() as f64;
    let t = (stats::mean(xs) - mu) / (sd / n.sqrt());
    Ok((t, n - 1.0))
}

fn push_verdict(ctx: &mut RunCtx<'_>, name: &str, t: f64, df: f64, alpha: f64) {
    let p_value = stats::t_p_two_sided(t, df);
    ctx.tests.push(TestResult {
        name: name.to_string(),
        statistic: t,
        p_value,
        alpha,
        reject: p_value < alpha,
    });
}

fn ttest_one_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let column = arg_str("ttestOne", args, 0)?.to_string();
    let mu = arg_f64("ttestOne", args, 1)?;
    let alpha = arg_f64("ttestOne", args, 2)?;
    check_alpha("ttestOne", alpha)?;
    let table = take_input("ttestOne", ctx)?;
    let xs = numeric_values("ttestOne", &table, &column)?;
    let (t, df) = t_statistic("ttestOne", &xs, mu)?;
    push_verdict(ctx, "one-sample t-test", t, df, alpha);
    ctx.current = Some(table);
    Ok(())
}

fn ttest_paired_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let left = arg_str("ttestPaired", args, 0)?.to_string();
    let right = arg_str("ttestPaired", args, 1)?.to_string();
    let alpha = arg_f64("ttestPaired", args, 2)?;
    check_alpha("ttestPaired", alpha)?;
    let table = take_input("ttestPaired", ctx)?;
    check_columns("ttestPaired", &table, &[left.clone(), right.clone()])?;

    // Pairs drop out when either side is missing; non-numeric cells are an
    // error, matching the single-column rule.
    let diffs = paired_diffs(&table, &left, &right)?;
    let (t, df) = t_statistic("ttestPaired", &diffs, 0.0)?;
    push_verdict(ctx, "paired t-test", t, df, alpha);
    ctx.current = Some(table);
    Ok(())
}

fn paired_diffs(table: &Table, left: &str, right: &str) -> Result<Vec<f64>, EngineError> {
    let mut diffs = Vec::with_capacity(table.len());
    for row in table.rows() {
        match (&row[left], &row[right]) {
            (Cell::Number(a), Cell::Number(b)) => diffs.push(a - b),
            (Cell::Missing, _) | (_, Cell::Missing) => {}
            (a, b) => {
                let bad = if matches!(a, Cell::Number(_)) { b } else { a };
                return Err(EngineError::Type(format!(
                    "\"ttestPaired\" requires numeric columns, found a {} cell",
                    bad.kind()
                )));
            }
        }
    }
    Ok(diffs)
}

pub fn transforms() -> Vec<Arc<TransformDefinition>> {
    vec![
        Arc::new(TransformDefinition {
            name: "ttestOne",
            aliases: &[],
            arity: Arity::Fixed(3),
            apply_fn: ttest_one_apply,
        }),
        Arc::new(TransformDefinition {
            name: "ttestPaired",
            aliases: &[],
            arity: Arity::Fixed(3),
            apply_fn: ttest_paired_apply,
        }),
    ]
}
