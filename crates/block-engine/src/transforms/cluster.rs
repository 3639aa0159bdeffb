//! Clustering transforms: seeded k-means (Lloyd iterations) and silhouette
//! scores. Both append a column to the current table and attach an artifact.

use super::{arg_str, arg_u64, check_columns, rest_columns, take_input, Arity, RunCtx, TransformDefinition};
use crate::error::EngineError;
use crate::table::{Row, Table};
use crate::value::Cell;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use serde::Serialize;
use serde_json::Value as Json;
use std::sync::Arc;

/// Iteration cap for Lloyd's algorithm; assignment convergence usually ends
/// the loop much earlier.
const MAX_ITERATIONS: usize = 100;

/// Fitted centroids attached by `kmeans`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Clustering {
    pub columns: Vec<String>,
    pub k: usize,
    pub centroids: Vec<Vec<f64>>,
}

/// Mean silhouette score attached by `silhouette`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SilhouetteScore {
    pub label_column: String,
    pub columns: Vec<String>,
    pub mean: f64,
}

/// Extracts the feature matrix; every selected cell must be a number.
fn points(name: &str, table: &Table, columns: &[String]) -> Result<Vec<Vec<f64>>, EngineError> {
    check_columns(name, table, columns)?;
    table
        .rows()
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|col| match &row[col.as_str()] {
                    Cell::Number(n) => Ok(*n),
                    other => Err(EngineError::Type(format!(
                        "\"{name}\" requires numeric column \"{col}\", found a {} cell",
                        other.kind()
                    ))),
                })
                .collect()
        })
        .collect()
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(point, c);
        // Strict comparison keeps ties on the lowest cluster index.
        if d < best_d {
            best_d = d;
            best = i;
        }
    }
    best
}

/// Appends `column` with numeric values to a copy of `table`.
fn with_column(table: &Table, column: &str, values: &[f64]) -> Table {
    let mut columns = table.columns().to_vec();
    if !table.has_column(column) {
        columns.push(column.to_string());
    }
    let mut out = Table::new(columns);
    for (row, v) in table.rows().iter().zip(values) {
        let mut new_row: Row = row.clone();
        new_row.insert(column.to_string(), Cell::Number(*v));
        out.push_row(new_row);
    }
    out
}

fn kmeans_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let k = arg_u64("kmeans", args, 0)? as usize;
    let seed = arg_u64("kmeans", args, 1)?;
    let columns = rest_columns("kmeans", args, 2)?;
    let table = take_input("kmeans", ctx)?;
    let data = points("kmeans", &table, &columns)?;
    let n = data.len();
    if k == 0 || k > n {
        return Err(EngineError::Domain(format!(
            "\"kmeans\" needs 1 <= k <= {n} rows, got k = {k}"
        )));
    }

    // Seed policy: k distinct row indices drawn from a xoshiro256** generator
    // seeded with the program-supplied seed, so runs are reproducible.
    let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
    let mut chosen: Vec<usize> = Vec::with_capacity(k);
    while chosen.len() < k {
        let i = rng.gen_range(0..n);
        if !chosen.contains(&i) {
            chosen.push(i);
        }
    }
    let mut centroids: Vec<Vec<f64>> = chosen.iter().map(|&i| data[i].clone()).collect();

    let mut assignment: Vec<usize> = data.iter().map(|p| nearest(p, &centroids)).collect();
    for _ in 0..MAX_ITERATIONS {
        // Recompute centroids; an emptied cluster keeps its previous one.
        for (ci, centroid) in centroids.iter_mut().enumerate() {
            let members: Vec<&Vec<f64>> = data
                .iter()
                .zip(&assignment)
                .filter(|(_, &a)| a == ci)
                .map(|(p, _)| p)
                .collect();
            if members.is_empty() {
                continue;
            }
            for (d, slot) in centroid.iter_mut().enumerate() {
                *slot = members.iter().map(|p| p[d]).sum::<f64>() / members.len() as f64;
            }
        }
        let next: Vec<usize> = data.iter().map(|p| nearest(p, &centroids)).collect();
        if next == assignment {
            break;
        }
        assignment = next;
    }

    let labels: Vec<f64> = assignment.iter().map(|&a| a as f64).collect();
    ctx.current = Some(with_column(&table, "cluster", &labels));
    ctx.clusterings.push(Clustering {
        columns,
        k,
        centroids,
    });
    Ok(())
}

fn silhouette_apply(args: &[Json], ctx: &mut RunCtx<'_>) -> Result<(), EngineError> {
    let label_column = arg_str("silhouette", args, 0)?.to_string();
    let columns = rest_columns("silhouette", args, 1)?;
    let table = take_input("silhouette", ctx)?;
    check_columns("silhouette", &table, std::slice::from_ref(&label_column))?;
    let data = points("silhouette", &table, &columns)?;

    let labels: Vec<&Cell> = table.rows().iter().map(|r| &r[label_column.as_str()]).collect();
    if labels.iter().any(|c| c.is_missing()) {
        return Err(EngineError::Type(format!(
            "\"silhouette\" label column \"{label_column}\" contains missing cells"
        )));
    }
    let mut distinct: Vec<&Cell> = Vec::new();
    for label in &labels {
        if !distinct.contains(label) {
            distinct.push(label);
        }
    }

    let mut scores = Vec::with_capacity(data.len());
    for (i, point) in data.iter().enumerate() {
        let mine = labels[i];
        let mut intra = Vec::new();
        // Mean distance to each other cluster; the smallest is b(i).
        let mut inter = f64::INFINITY;
        for label in &distinct {
            let members: Vec<usize> = (0..data.len())
                .filter(|&j| j != i && labels[j] == *label)
                .collect();
            if members.is_empty() {
                continue;
            }
            let mean_d = members
                .iter()
                .map(|&j| squared_distance(point, &data[j]).sqrt())
                .sum::<f64>()
                / members.len() as f64;
            if *label == mine {
                intra.push(mean_d);
            } else if mean_d < inter {
                inter = mean_d;
            }
        }
        let score = match intra.first() {
            // Singleton cluster: silhouette is defined as 0.
            None => 0.0,
            Some(&a) => {
                if inter.is_infinite() {
                    0.0
                } else {
                    (inter - a) / a.max(inter)
                }
            }
        };
        scores.push(score);
    }

    let mean = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };
    ctx.current = Some(with_column(&table, "silhouette", &scores));
    ctx.silhouettes.push(SilhouetteScore {
        label_column,
        columns,
        mean,
    });
    Ok(())
}

pub fn transforms() -> Vec<Arc<TransformDefinition>> {
    vec![
        Arc::new(TransformDefinition {
            name: "kmeans",
            aliases: &[],
            arity: Arity::AtLeast(3),
            apply_fn: kmeans_apply,
        }),
        Arc::new(TransformDefinition {
            name: "silhouette",
            aliases: &[],
            arity: Arity::AtLeast(2),
            apply_fn: silhouette_apply,
        }),
    ]
}
