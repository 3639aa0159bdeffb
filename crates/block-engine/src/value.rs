//! Typed cells and the expression-leaf value model.

use crate::error::EngineError;
use crate::table::{Row, Table};
use chrono::NaiveDateTime;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use std::cmp::Ordering;

/// A primitive stored in a table cell.
///
/// `Missing` is an explicit, propagating null: rows always carry it rather
/// than omitting a key.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Missing,
    Logical(bool),
    Number(f64),
    Text(String),
    Datetime(NaiveDateTime),
}

impl Cell {
    pub fn is_missing(&self) -> bool {
        matches!(self, Cell::Missing)
    }

    /// Kind name used in error messages and `type`-style introspection.
    pub fn kind(&self) -> &'static str {
        match self {
            Cell::Missing => "missing",
            Cell::Logical(_) => "logical",
            Cell::Number(_) => "number",
            Cell::Text(_) => "text",
            Cell::Datetime(_) => "datetime",
        }
    }

    /// Total order used by `sort`: `Missing` after every defined cell, mixed
    /// kinds ordered by kind so the comparison never panics.
    pub fn sort_cmp(&self, other: &Cell) -> Ordering {
        fn rank(c: &Cell) -> u8 {
            match c {
                Cell::Logical(_) => 0,
                Cell::Number(_) => 1,
                Cell::Text(_) => 2,
                Cell::Datetime(_) => 3,
                Cell::Missing => 4,
            }
        }
        match (self, other) {
            (Cell::Missing, Cell::Missing) => Ordering::Equal,
            (Cell::Missing, _) => Ordering::Greater,
            (_, Cell::Missing) => Ordering::Less,
            (Cell::Logical(a), Cell::Logical(b)) => a.cmp(b),
            (Cell::Number(a), Cell::Number(b)) => a.total_cmp(b),
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            (Cell::Datetime(a), Cell::Datetime(b)) => a.cmp(b),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }

    /// Converts a JSON scalar into a cell. `null` maps to `Missing`; strings
    /// stay text (ingest-time inference applies only to delimited input).
    pub fn from_json(v: &serde_json::Value) -> Result<Cell, EngineError> {
        match v {
            serde_json::Value::Null => Ok(Cell::Missing),
            serde_json::Value::Bool(b) => Ok(Cell::Logical(*b)),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Cell::Number)
                .ok_or_else(|| EngineError::Conversion(format!("non-finite number: {n}"))),
            serde_json::Value::String(s) => Ok(Cell::Text(s.clone())),
            other => Err(EngineError::Conversion(format!(
                "cannot store {other} in a table cell"
            ))),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Cell::Missing => serde_json::Value::Null,
            Cell::Logical(b) => serde_json::Value::Bool(*b),
            Cell::Number(n) => serde_json::json!(n),
            Cell::Text(s) => serde_json::Value::String(s.clone()),
            Cell::Datetime(d) => {
                serde_json::Value::String(d.format("%Y-%m-%dT%H:%M:%S").to_string())
            }
        }
    }
}

/// An expression leaf: a constant, a deferred lookup, or a sampling generator.
///
/// Sampling variants own their generator and draw a fresh sample on every
/// evaluation; two leaves never share generator state, so independent
/// expression trees can be evaluated from different threads while a single
/// node stays confined to one.
#[derive(Debug, Clone)]
pub enum Value {
    /// Placeholder for an incomplete block; evaluating it is always an error.
    Absent,
    Missing,
    Logical(bool),
    Number(f64),
    Text(String),
    Datetime(NaiveDateTime),
    /// Current row index, 1-based.
    RowNum,
    /// Late-bound column lookup; the name is only checked at evaluation time.
    Column(String),
    Exponential { rate: f64, rng: Xoshiro256StarStar },
    Normal { mean: f64, std_dev: f64, rng: Xoshiro256StarStar },
    Uniform { low: f64, high: f64, rng: Xoshiro256StarStar },
}

/// Equality is variant + payload; generator state is ignored.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Absent, Value::Absent) => true,
            (Value::Missing, Value::Missing) => true,
            (Value::Logical(a), Value::Logical(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Datetime(a), Value::Datetime(b)) => a == b,
            (Value::RowNum, Value::RowNum) => true,
            (Value::Column(a), Value::Column(b)) => a == b,
            (Value::Exponential { rate: a, .. }, Value::Exponential { rate: b, .. }) => a == b,
            (
                Value::Normal { mean: a, std_dev: sa, .. },
                Value::Normal { mean: b, std_dev: sb, .. },
            ) => a == b && sa == sb,
            (
                Value::Uniform { low: a, high: ha, .. },
                Value::Uniform { low: b, high: hb, .. },
            ) => a == b && ha == hb,
            _ => false,
        }
    }
}

impl Value {
    /// A validated numeric constant.
    pub fn number(n: f64) -> Result<Value, EngineError> {
        if n.is_finite() {
            Ok(Value::Number(n))
        } else {
            Err(EngineError::Construction(format!(
                "number constant must be finite, got {n}"
            )))
        }
    }

    /// Exponential sampler with inverse-CDF draws. Requires `rate > 0`.
    pub fn exponential(rate: f64, seed: u64) -> Result<Value, EngineError> {
        if !(rate.is_finite() && rate > 0.0) {
            return Err(EngineError::Construction(format!(
                "exponential rate must be positive, got {rate}"
            )));
        }
        Ok(Value::Exponential {
            rate,
            rng: Xoshiro256StarStar::seed_from_u64(seed),
        })
    }

    /// Normal sampler (Box-Muller). Requires `std_dev >= 0`.
    pub fn normal(mean: f64, std_dev: f64, seed: u64) -> Result<Value, EngineError> {
        if !(mean.is_finite() && std_dev.is_finite() && std_dev >= 0.0) {
            return Err(EngineError::Construction(format!(
                "normal requires finite mean and non-negative stdDev, got ({mean}, {std_dev})"
            )));
        }
        Ok(Value::Normal {
            mean,
            std_dev,
            rng: Xoshiro256StarStar::seed_from_u64(seed),
        })
    }

    /// Uniform sampler over `[low, high]`. Requires `low <= high`.
    pub fn uniform(low: f64, high: f64, seed: u64) -> Result<Value, EngineError> {
        if !(low.is_finite() && high.is_finite() && low <= high) {
            return Err(EngineError::Construction(format!(
                "uniform requires low <= high, got ({low}, {high})"
            )));
        }
        Ok(Value::Uniform {
            low,
            high,
            rng: Xoshiro256StarStar::seed_from_u64(seed),
        })
    }

    /// Evaluates the leaf for one row of `table`.
    ///
    /// Constants return their payload, `RowNum` the 1-based index, `Column`
    /// a late-bound lookup, and sampling variants a fresh draw.
    pub fn run(&mut self, row: &Row, index: usize, table: &Table) -> Result<Cell, EngineError> {
        match self {
            Value::Absent => Err(EngineError::Construction(
                "an absent value cannot be evaluated; the program is incomplete".into(),
            )),
            Value::Missing => Ok(Cell::Missing),
            Value::Logical(b) => Ok(Cell::Logical(*b)),
            Value::Number(n) => Ok(Cell::Number(*n)),
            Value::Text(s) => Ok(Cell::Text(s.clone())),
            Value::Datetime(d) => Ok(Cell::Datetime(*d)),
            Value::RowNum => {
                check_index(index, table)?;
                Ok(Cell::Number((index + 1) as f64))
            }
            Value::Column(name) => {
                check_index(index, table)?;
                row.get(name.as_str())
                    .cloned()
                    .ok_or_else(|| EngineError::Lookup(format!("unknown column \"{name}\"")))
            }
            Value::Exponential { rate, rng } => {
                let u: f64 = rng.gen();
                Ok(Cell::Number(-(1.0 - u).ln() / *rate))
            }
            Value::Normal { mean, std_dev, rng } => {
                let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
                let u2: f64 = rng.gen();
                let z = (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos();
                Ok(Cell::Number(*mean + *std_dev * z))
            }
            Value::Uniform { low, high, rng } => {
                let u: f64 = rng.gen();
                Ok(Cell::Number(*low + (*high - *low) * u))
            }
        }
    }
}

fn check_index(index: usize, table: &Table) -> Result<(), EngineError> {
    if index >= table.len() {
        Err(EngineError::Lookup(format!(
            "row index {index} out of range for a table of {} rows",
            table.len()
        )))
    } else {
        Ok(())
    }
}
