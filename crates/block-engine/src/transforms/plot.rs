//! Plot transforms: validate their columns, then emit a declarative spec for
//! an external renderer. No pixels are produced here.

use super::{
    arg_str, arg_u64, check_columns, numeric_values, take_input, Arity, RunCtx,
    TransformDefinition,
};
use crate::error::EngineError;
use crate::stats;
use crate::value::Cell;
use serde::Serialize;
use serde_json::Value as Json;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlotKind {
    Bar,
    Box,
    Dot,
    Histogram,
    Scatter,
}

/// Fitted line carried on a scatter spec when the program asks for one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
}

/// A declarative chart description handed back to the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlotSpec {
    pub kind: PlotKind,
    pub x_axis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y_axis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bins: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regression: Option<Regression>,
}

/// Validates an x/y chart: x must exist, y must exist and be numeric.
fn xy_plot(kind: PlotKind, args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let name = match kind {
        PlotKind::Bar => "bar",
        PlotKind::Box => "box",
        _ => unreachable!("only bar and box go through xy_plot"),
    };
    let x = arg_str(name, args, 0)?.to_string();
    let y = arg_str(name, args, 1)?.to_string();
    let table = take_input(name, ctx)?;
    check_columns(name, &table, std::slice::from_ref(&x))?;
    numeric_values(name, &table, &y)?;
    ctx.plots.push(PlotSpec {
        kind,
        x_axis: x,
        y_axis: Some(y),
        bins: None,
        regression: None,
    });
    ctx.current = Some(table);
    Ok(())
}

fn bar_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    xy_plot(PlotKind::Bar, args, ctx)
}

fn box_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    xy_plot(PlotKind::Box, args, ctx)
}

fn dot_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let x = arg_str("dot", args, 0)?.to_string();
    let table = take_input("dot", ctx)?;
    check_columns("dot", &table, std::slice::from_ref(&x))?;
    ctx.plots.push(PlotSpec {
        kind: PlotKind::Dot,
        x_axis: x,
        y_axis: None,
        bins: None,
        regression: None,
    });
    ctx.current = Some(table);
    Ok(())
}

fn histogram_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let column = arg_str("histogram", args, 0)?.to_string();
    let bins = arg_u64("histogram", args, 1)?;
    if bins == 0 {
        return Err(EngineError::Domain(
            "\"histogram\" needs at least one bin".into(),
        ));
    }
    let table = take_input("histogram", ctx)?;
    numeric_values("histogram", &table, &column)?;
    ctx.plots.push(PlotSpec {
        kind: PlotKind::Histogram,
        x_axis: column,
        y_axis: None,
        bins: Some(bins as usize),
        regression: None,
    });
    ctx.current = Some(table);
    Ok(())
}

fn scatter_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let x = arg_str("scatter", args, 0)?.to_string();
    let y = arg_str("scatter", args, 1)?.to_string();
    let fit_line = match args.get(2) {
        None => false,
        Some(Json::Bool(b)) => *b,
        Some(_) => {
            return Err(EngineError::Parse(
                "\"scatter\" parameter 2 must be a boolean".into(),
            ))
        }
    };
    let table = take_input("scatter", ctx)?;
    numeric_values("scatter", &table, &x)?;
    numeric_values("scatter", &table, &y)?;

    // The fit uses only rows where both coordinates are present.
    let regression = if fit_line {
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for row in table.rows() {
            if let (Cell::Number(a), Cell::Number(b)) = (&row[x.as_str()], &row[y.as_str()]) {
                xs.push(*a);
                ys.push(*b);
            }
        }
        stats::linear_fit(&xs, &ys).map(|(slope, intercept)| Regression { slope, intercept })
    } else {
        None
    };
    ctx.plots.push(PlotSpec {
        kind: PlotKind::Scatter,
        x_axis: x,
        y_axis: Some(y),
        bins: None,
        regression,
    });
    ctx.current = Some(table);
    Ok(())
}

pub fn transforms() -> Vec<Arc<TransformDefinition>> {
    vec![
        Arc::new(TransformDefinition {
            name: "bar",
            aliases: &[],
            arity: Arity::Fixed(2),
            apply_fn: bar_apply,
        }),
        Arc::new(TransformDefinition {
            name: "box",
            aliases: &[],
            arity: Arity::Fixed(2),
            apply_fn: box_apply,
        }),
        Arc::new(TransformDefinition {
            name: "dot",
            aliases: &[],
            arity: Arity::Fixed(1),
            apply_fn: dot_apply,
        }),
        Arc::new(TransformDefinition {
            name: "histogram",
            aliases: &[],
            arity: Arity::Fixed(2),
            apply_fn: histogram_apply,
        }),
        Arc::new(TransformDefinition {
            name: "scatter",
            aliases: &[],
            arity: Arity::Range(2, 3),
            apply_fn: scatter_apply,
        }),
    ]
}
