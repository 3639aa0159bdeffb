//! The in-memory relation: ordered named columns, rows of typed cells, and
//! ingestion from delimited text with fixed type-inference precedence.

use crate::error::EngineError;
use crate::value::Cell;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use indexmap::IndexMap;

/// One row: column name to cell, in the table's column order.
pub type Row = IndexMap<String, Cell>;

/// The transient tag left by `groupBy`: the key columns and one group id per
/// row, ids issued in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    pub columns: Vec<String>,
    pub ids: Vec<usize>,
}

/// An ordered sequence of named columns plus rows.
///
/// Invariant: every row carries exactly the table's column set; absent data is
/// an explicit [`Cell::Missing`], never a missing key. An optional group tag
/// (one group id per row, ids issued in first-seen order) rides alongside the
/// rows and is cleared by `ungroup`; it never participates in equality.
#[derive(Debug, Clone, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
    groups: Option<Grouping>,
}

/// Structural equality: identical column sets (order-insensitive) and
/// identical rows in the same order.
impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        if self.rows.len() != other.rows.len() {
            return false;
        }
        let mut a = self.columns.clone();
        let mut b = other.columns.clone();
        a.sort();
        b.sort();
        a == b && self.rows == other.rows
    }
}

impl Table {
    /// An empty table with the given column order.
    pub fn new(columns: Vec<String>) -> Table {
        Table {
            columns,
            rows: Vec::new(),
            groups: None,
        }
    }

    /// Builds a table from rows, padding absent cells with `Missing` and
    /// rejecting keys outside the column set.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Row>) -> Result<Table, EngineError> {
        let mut table = Table::new(columns);
        for row in rows {
            for key in row.keys() {
                if !table.columns.iter().any(|c| c == key) {
                    return Err(EngineError::Schema(format!(
                        "row has a cell for unknown column \"{key}\""
                    )));
                }
            }
            table.push_row(row);
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Appends a row, normalizing it to the table's column set and order.
    pub fn push_row(&mut self, row: Row) {
        let mut normalized = Row::with_capacity(self.columns.len());
        for col in &self.columns {
            normalized.insert(
                col.clone(),
                row.get(col.as_str()).cloned().unwrap_or(Cell::Missing),
            );
        }
        self.rows.push(normalized);
    }

    /// The transient group tag, if `groupBy` has run.
    pub fn groups(&self) -> Option<&Grouping> {
        self.groups.as_ref()
    }

    pub fn set_groups(&mut self, grouping: Grouping) {
        debug_assert_eq!(grouping.ids.len(), self.rows.len(), "one group id per row");
        self.groups = Some(grouping);
    }

    pub fn clear_groups(&mut self) {
        self.groups = None;
    }

    /// Parses comma-separated text with a header line.
    ///
    /// Cell inference tries, in order: empty/`NA` as `Missing`, `true`/`false`
    /// (case-insensitive) as `Logical`, an `f64` parse as `Number`, ISO-8601
    /// (`%Y-%m-%dT%H:%M:%S`, then a bare `%Y-%m-%d` date) as `Datetime`, and
    /// falls back to `Text`. Inference is per cell and never fatal. Short rows
    /// pad with `Missing`; rows longer than the header are a schema error.
    pub fn from_delimited(text: &str) -> Result<Table, EngineError> {
        let mut lines = text.lines().map(|l| l.trim_end_matches('\r'));
        let header = lines
            .next()
            .ok_or_else(|| EngineError::Schema("delimited input has no header line".into()))?;
        let columns: Vec<String> = header.split(',').map(|c| c.trim().to_string()).collect();
        let mut table = Table::new(columns);
        for (lineno, line) in lines.enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let cells: Vec<&str> = line.split(',').collect();
            if cells.len() > table.columns.len() {
                return Err(EngineError::Schema(format!(
                    "line {} has {} cells but the header has {} columns",
                    lineno + 2,
                    cells.len(),
                    table.columns.len()
                )));
            }
            let mut row = Row::with_capacity(table.columns.len());
            for (i, col) in table.columns.iter().enumerate() {
                let cell = cells.get(i).map_or(Cell::Missing, |raw| infer_cell(raw.trim()));
                row.insert(col.clone(), cell);
            }
            table.rows.push(row);
        }
        Ok(table)
    }

    /// The table as a JSON array of row objects, column order preserved.
    pub fn to_json(&self) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = self
            .rows
            .iter()
            .map(|row| {
                let mut obj = serde_json::Map::new();
                for (k, v) in row {
                    obj.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(obj)
            })
            .collect();
        serde_json::Value::Array(rows)
    }
}

/// Parses a datetime in the two accepted ISO-8601 shapes.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

fn infer_cell(raw: &str) -> Cell {
    if raw.is_empty() || raw == "NA" {
        return Cell::Missing;
    }
    if raw.eq_ignore_ascii_case("true") {
        return Cell::Logical(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Cell::Logical(false);
    }
    if let Ok(n) = raw.parse::<f64>() {
        if n.is_finite() {
            return Cell::Number(n);
        }
    }
    if let Some(dt) = parse_datetime(raw) {
        return Cell::Datetime(dt);
    }
    Cell::Text(raw.to_string())
}
