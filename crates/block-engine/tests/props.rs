//! Property tests for the order-sensitive transforms.

use block_engine::{Cell, Environment, Program, Row, Runner, Table};
use proptest::prelude::*;
use serde_json::{json, Value as Json};

/// A generated cell: missing, a finite number, or a short text.
fn cell() -> impl Strategy<Value = Cell> {
    prop_oneof![
        1 => Just(Cell::Missing),
        4 => (-100i32..100).prop_map(|n| Cell::Number(f64::from(n))),
        2 => "[a-c]{1,2}".prop_map(Cell::Text),
    ]
}

fn rows() -> impl Strategy<Value = Vec<(Cell, Cell)>> {
    prop::collection::vec((cell(), cell()), 0..12)
}

fn table_of(rows: &[(Cell, Cell)]) -> Table {
    let rows = rows
        .iter()
        .map(|(x, y)| {
            let mut row = Row::new();
            row.insert("x".to_string(), x.clone());
            row.insert("y".to_string(), y.clone());
            row
        })
        .collect();
    Table::from_rows(vec!["x".to_string(), "y".to_string()], rows).unwrap()
}

/// Runs `steps` against an injected table and returns the saved result.
fn apply(input: &Table, steps: &[Json]) -> Table {
    let mut pipeline = vec![json!(["@transform", "load", "in"])];
    pipeline.extend(steps.iter().cloned());
    pipeline.push(json!(["@transform", "saveAs", "out"]));
    let program = Program::from_json(&json!([pipeline])).unwrap();

    let mut env = Environment::new();
    env.insert("in".to_string(), input.clone());
    let report = Runner::new().run_with_env(&program, env);
    assert!(report.failures.is_empty(), "failures: {:?}", report.failures);
    report.tables["out"].clone()
}

/// Multiset of rows, for permutation checks.
fn row_keys(table: &Table) -> Vec<Vec<Cell>> {
    let mut keys: Vec<Vec<Cell>> = table
        .rows()
        .iter()
        .map(|r| r.values().cloned().collect())
        .collect();
    keys.sort_by(|a, b| {
        a.iter()
            .zip(b)
            .map(|(x, y)| x.sort_cmp(y))
            .find(|o| !o.is_eq())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    keys
}

proptest! {
    #[test]
    fn sort_permutes_and_is_idempotent(rows in rows()) {
        let input = table_of(&rows);
        let once = apply(&input, &[json!(["@transform", "sort", ["x"]])]);
        let twice = apply(&once, &[json!(["@transform", "sort", ["x"]])]);
        prop_assert_eq!(row_keys(&input), row_keys(&once));
        prop_assert_eq!(&once, &twice);
    }

    #[test]
    fn sort_puts_missing_keys_last(rows in rows()) {
        let input = table_of(&rows);
        let sorted = apply(&input, &[json!(["@transform", "sort", ["x"]])]);
        let first_missing = sorted
            .rows()
            .iter()
            .position(|r| r["x"].is_missing())
            .unwrap_or(sorted.len());
        for row in &sorted.rows()[first_missing..] {
            prop_assert!(row["x"].is_missing());
        }
    }

    #[test]
    fn sort_descending_reverses_defined_keys(rows in rows()) {
        let input = table_of(&rows);
        let up = apply(&input, &[json!(["@transform", "sort", ["x"]])]);
        let down = apply(&input, &[json!(["@transform", "sort", ["x"], true])]);
        let up_keys: Vec<&Cell> =
            up.rows().iter().map(|r| &r["x"]).filter(|c| !c.is_missing()).collect();
        let mut down_keys: Vec<&Cell> =
            down.rows().iter().map(|r| &r["x"]).filter(|c| !c.is_missing()).collect();
        down_keys.reverse();
        prop_assert_eq!(up_keys, down_keys);
    }

    #[test]
    fn unique_is_idempotent_and_never_grows(rows in rows()) {
        let input = table_of(&rows);
        let step = json!(["@transform", "unique", "x", "y"]);
        let once = apply(&input, &[step.clone()]);
        let twice = apply(&once, &[step]);
        prop_assert!(once.len() <= input.len());
        prop_assert_eq!(&once, &twice);
    }

    #[test]
    fn filter_returns_a_subsequence(rows in rows()) {
        let input = table_of(&rows);
        let kept = apply(
            &input,
            &[json!(["@transform", "filter",
                ["@op", "greater", ["@value", "column", "x"], 0]])],
        );
        // Every kept row appears in the input, in the same relative order.
        let mut cursor = 0;
        for row in kept.rows() {
            let found = input.rows()[cursor..]
                .iter()
                .position(|r| r == row)
                .map(|p| cursor + p);
            prop_assert!(found.is_some(), "row {row:?} is not a subsequence match");
            cursor = found.unwrap() + 1;
        }
        for row in kept.rows() {
            prop_assert_eq!(row["x"].kind(), "number");
        }
    }

    #[test]
    fn select_then_glue_round_trips_nothing_but_schema(rows in rows()) {
        // Gluing a table to itself doubles the rows and keeps the schema.
        let input = table_of(&rows);
        let mut env = Environment::new();
        env.insert("a".to_string(), input.clone());
        env.insert("b".to_string(), input.clone());
        let program = Program::from_json(&json!([[
            ["@transform", "glue", "a", "b"],
            ["@transform", "saveAs", "out"]
        ]]))
        .unwrap();
        let report = Runner::new().run_with_env(&program, env);
        prop_assert!(report.failures.is_empty());
        let out = &report.tables["out"];
        prop_assert_eq!(out.len(), input.len() * 2);
        prop_assert_eq!(out.columns(), input.columns());
    }
}
