//! Value and expression semantics: construction validation, missing
//! propagation, coercions, and the sampling generators.

use block_engine::{Cell, EngineError, Expr, Table, Value};
use serde_json::{json, Value as Json};

/// A small fixture table: `n` is numeric, `m` has a missing cell, `t` is
/// text, `b` is logical, `d` is a datetime.
fn fixture() -> Table {
    Table::from_delimited(
        "n,m,t,b,d\n\
         3,,word,true,2021-06-15T12:30:45\n\
         5,7,other,false,2021-06-16\n",
    )
    .unwrap()
}

fn eval_at(expr: Json, table: &Table, index: usize) -> Result<Cell, EngineError> {
    let mut e = Expr::from_json(&expr)?;
    let row = table.row(index).cloned().unwrap_or_default();
    e.eval(&row, index, table)
}

fn check(expr: Json, expected: Cell) {
    let table = fixture();
    let result = eval_at(expr.clone(), &table, 0)
        .unwrap_or_else(|e| panic!("eval({expr}) failed: {e}"));
    assert_eq!(result, expected, "expression: {expr}");
}

fn check_err(expr: Json) -> EngineError {
    let table = fixture();
    eval_at(expr.clone(), &table, 0)
        .err()
        .unwrap_or_else(|| panic!("expected an error for {expr}"))
}

// ----------------------------------------------------------------- Values

#[test]
fn constants_return_their_payload() {
    check(json!(2.5), Cell::Number(2.5));
    check(json!("hi"), Cell::Text("hi".into()));
    check(json!(true), Cell::Logical(true));
    check(json!(null), Cell::Missing);
    check(json!(["@value", "number", 4]), Cell::Number(4.0));
}

#[test]
fn rownum_is_one_based() {
    let table = fixture();
    assert_eq!(
        eval_at(json!(["@value", "rownum"]), &table, 1).unwrap(),
        Cell::Number(2.0)
    );
}

#[test]
fn column_lookup_is_late_bound() {
    check(json!(["@value", "column", "n"]), Cell::Number(3.0));
    check(json!(["@value", "column", "m"]), Cell::Missing);
    assert!(matches!(
        check_err(json!(["@value", "column", "nope"])),
        EngineError::Lookup(_)
    ));
}

#[test]
fn row_index_out_of_range_is_a_lookup_error() {
    let table = fixture();
    let err = eval_at(json!(["@value", "column", "n"]), &table, 9).unwrap_err();
    assert!(matches!(err, EngineError::Lookup(_)));
}

#[test]
fn absent_cannot_be_evaluated() {
    assert!(matches!(
        check_err(json!(["@value", "absent"])),
        EngineError::Construction(_)
    ));
}

#[test]
fn construction_rejects_bad_sampler_parameters() {
    assert!(Value::exponential(0.0, 1).is_err());
    assert!(Value::exponential(-2.0, 1).is_err());
    assert!(Value::normal(0.0, -1.0, 1).is_err());
    assert!(Value::uniform(3.0, 2.0, 1).is_err());
    assert!(Value::number(f64::NAN).is_err());
}

#[test]
fn value_equality_is_variant_discriminating() {
    assert_eq!(Value::Number(1.0), Value::Number(1.0));
    assert_ne!(Value::Number(1.0), Value::Logical(true));
    assert_ne!(Value::Text("1".into()), Value::Number(1.0));
    assert_eq!(Value::Absent, Value::Absent);
    // Generator state does not participate.
    let mut a = Value::uniform(0.0, 1.0, 7).unwrap();
    let b = Value::uniform(0.0, 1.0, 99).unwrap();
    let table = fixture();
    let row = table.row(0).unwrap().clone();
    a.run(&row, 0, &table).unwrap();
    assert_eq!(a, b);
}

#[test]
fn degenerate_uniform_always_samples_its_bound() {
    let table = fixture();
    let row = table.row(0).unwrap().clone();
    let mut v = Value::uniform(2.0, 2.0, 123).unwrap();
    for _ in 0..20 {
        assert_eq!(v.run(&row, 0, &table).unwrap(), Cell::Number(2.0));
    }
}

#[test]
fn samplers_are_seed_deterministic() {
    let table = fixture();
    let row = table.row(0).unwrap().clone();
    let mut a = Value::normal(0.0, 1.0, 42).unwrap();
    let mut b = Value::normal(0.0, 1.0, 42).unwrap();
    for _ in 0..5 {
        assert_eq!(
            a.run(&row, 0, &table).unwrap(),
            b.run(&row, 0, &table).unwrap()
        );
    }
}

#[test]
fn exponential_samples_are_positive() {
    let table = fixture();
    let row = table.row(0).unwrap().clone();
    let mut v = Value::exponential(0.5, 9).unwrap();
    for _ in 0..50 {
        match v.run(&row, 0, &table).unwrap() {
            Cell::Number(n) => assert!(n >= 0.0, "draw was {n}"),
            other => panic!("expected a number, got {other:?}"),
        }
    }
}

// ----------------------------------------------------------------- Arithmetic

#[test]
fn arithmetic_on_numbers() {
    check(json!(["@op", "add", 1, 2]), Cell::Number(3.0));
    check(json!(["@op", "subtract", 1, 2]), Cell::Number(-1.0));
    check(json!(["@op", "multiply", 3, 2]), Cell::Number(6.0));
    check(json!(["@op", "divide", 10, 4]), Cell::Number(2.5));
    check(json!(["@op", "power", 2, 10]), Cell::Number(1024.0));
    check(json!(["@op", "remainder", 10, 3]), Cell::Number(1.0));
    check(json!(["@op", "minimum", 3, 1]), Cell::Number(1.0));
    check(json!(["@op", "maximum", 3, 1]), Cell::Number(3.0));
    check(json!(["@op", "negate", 5]), Cell::Number(-5.0));
    check(json!(["@op", "abs", -5]), Cell::Number(5.0));
}

#[test]
fn arithmetic_nests() {
    check(
        json!(["@op", "add", ["@op", "multiply", 2, 3], ["@value", "column", "n"]]),
        Cell::Number(9.0),
    );
}

#[test]
fn arithmetic_propagates_missing() {
    for op in ["add", "subtract", "multiply", "divide", "power", "remainder"] {
        check(json!(["@op", op, ["@value", "column", "m"], 2]), Cell::Missing);
        check(json!(["@op", op, 2, ["@value", "column", "m"]]), Cell::Missing);
    }
    check(json!(["@op", "negate", null]), Cell::Missing);
}

#[test]
fn arithmetic_rejects_non_numbers() {
    assert!(matches!(
        check_err(json!(["@op", "add", 1, "two"])),
        EngineError::Type(_)
    ));
}

#[test]
fn division_by_zero_is_a_domain_error() {
    assert!(matches!(
        check_err(json!(["@op", "divide", 1, 0])),
        EngineError::Domain(_)
    ));
    assert!(matches!(
        check_err(json!(["@op", "remainder", 1, 0])),
        EngineError::Domain(_)
    ));
}

// ----------------------------------------------------------------- Comparison

#[test]
fn equality_works_across_kinds_without_failing() {
    check(json!(["@op", "equal", 2, 2]), Cell::Logical(true));
    check(json!(["@op", "equal", 2, "2"]), Cell::Logical(false));
    check(json!(["@op", "notEqual", "a", "b"]), Cell::Logical(true));
}

#[test]
fn ordering_requires_compatible_kinds() {
    check(json!(["@op", "less", 1, 2]), Cell::Logical(true));
    check(json!(["@op", "greaterEqual", "b", "a"]), Cell::Logical(true));
    assert!(matches!(
        check_err(json!(["@op", "less", 1, "two"])),
        EngineError::Type(_)
    ));
}

#[test]
fn datetimes_order_chronologically() {
    check(
        json!(["@op", "less",
            ["@value", "datetime", "2021-01-01"],
            ["@value", "datetime", "2021-06-15T12:30:45"]]),
        Cell::Logical(true),
    );
}

#[test]
fn comparison_propagates_missing() {
    check(json!(["@op", "equal", null, 2]), Cell::Missing);
    check(json!(["@op", "less", ["@value", "column", "m"], 2]), Cell::Missing);
}

// ----------------------------------------------------------------- Logical

#[test]
fn logical_operators_follow_two_valued_logic() {
    check(json!(["@op", "and", true, false]), Cell::Logical(false));
    check(json!(["@op", "or", false, true]), Cell::Logical(true));
    check(json!(["@op", "not", true]), Cell::Logical(false));
}

#[test]
fn logical_short_circuit_skips_the_right_operand() {
    // The right operand would fail with a lookup error if evaluated.
    check(
        json!(["@op", "and", false, ["@value", "column", "nope"]]),
        Cell::Logical(false),
    );
    check(
        json!(["@op", "or", true, ["@value", "column", "nope"]]),
        Cell::Logical(true),
    );
}

#[test]
fn logical_missing_propagates() {
    check(json!(["@op", "and", null, true]), Cell::Missing);
    check(json!(["@op", "and", true, null]), Cell::Missing);
    check(json!(["@op", "not", null]), Cell::Missing);
}

#[test]
fn logical_rejects_non_logical_operands() {
    assert!(matches!(
        check_err(json!(["@op", "and", 1, true])),
        EngineError::Type(_)
    ));
}

// ----------------------------------------------------------------- ifElse

#[test]
fn if_else_takes_exactly_one_branch() {
    check(json!(["@op", "ifElse", true, 1, 2]), Cell::Number(1.0));
    check(json!(["@op", "ifElse", false, 1, 2]), Cell::Number(2.0));
    // The untaken branch is never evaluated.
    check(
        json!(["@op", "ifElse", true, 1, ["@value", "column", "nope"]]),
        Cell::Number(1.0),
    );
}

#[test]
fn if_else_missing_condition_yields_missing_without_evaluating_branches() {
    check(
        json!(["@op", "ifElse", null, ["@value", "column", "nope"], 2]),
        Cell::Missing,
    );
}

// ----------------------------------------------------------------- Conversion

#[test]
fn to_number_coercions() {
    check(json!(["@op", "toNumber", "3.5"]), Cell::Number(3.5));
    check(json!(["@op", "toNumber", true]), Cell::Number(1.0));
    check(json!(["@op", "toNumber", false]), Cell::Number(0.0));
    check(json!(["@op", "toNumber", null]), Cell::Missing);
    assert!(matches!(
        check_err(json!(["@op", "toNumber", "word"])),
        EngineError::Conversion(_)
    ));
}

#[test]
fn to_logical_coercions() {
    check(json!(["@op", "toLogical", "TRUE"]), Cell::Logical(true));
    check(json!(["@op", "toLogical", "false"]), Cell::Logical(false));
    check(json!(["@op", "toLogical", 0]), Cell::Logical(false));
    check(json!(["@op", "toLogical", 2]), Cell::Logical(true));
    assert!(matches!(
        check_err(json!(["@op", "toLogical", "maybe"])),
        EngineError::Conversion(_)
    ));
}

#[test]
fn to_text_formats_whole_numbers_without_a_fraction() {
    check(json!(["@op", "toText", 3]), Cell::Text("3".into()));
    check(json!(["@op", "toText", 2.5]), Cell::Text("2.5".into()));
    check(json!(["@op", "toText", true]), Cell::Text("true".into()));
}

#[test]
fn to_datetime_parses_and_rejects() {
    check(
        json!(["@op", "toDatetime", "2021-06-15T12:30:45"]),
        Cell::Datetime(
            chrono::NaiveDate::from_ymd_opt(2021, 6, 15)
                .unwrap()
                .and_hms_opt(12, 30, 45)
                .unwrap(),
        ),
    );
    assert!(matches!(
        check_err(json!(["@op", "toDatetime", "yesterday"])),
        EngineError::Conversion(_)
    ));
}

#[test]
fn date_decomposition() {
    let d = json!(["@value", "column", "d"]);
    check(json!(["@op", "toYear", d.clone()]), Cell::Number(2021.0));
    check(json!(["@op", "toMonth", d.clone()]), Cell::Number(6.0));
    check(json!(["@op", "toDay", d.clone()]), Cell::Number(15.0));
    check(json!(["@op", "toHours", d.clone()]), Cell::Number(12.0));
    check(json!(["@op", "toMinutes", d.clone()]), Cell::Number(30.0));
    check(json!(["@op", "toSeconds", d.clone()]), Cell::Number(45.0));
    // 2021-06-15 was a Tuesday; weekdays count from Sunday = 0.
    check(json!(["@op", "toWeekday", d]), Cell::Number(2.0));
}

// ----------------------------------------------------------------- Type checks

#[test]
fn type_checks_classify_everything_and_never_fail() {
    check(json!(["@op", "isNumber", 1]), Cell::Logical(true));
    check(json!(["@op", "isNumber", "1"]), Cell::Logical(false));
    check(json!(["@op", "isText", "x"]), Cell::Logical(true));
    check(json!(["@op", "isLogical", true]), Cell::Logical(true));
    check(
        json!(["@op", "isDatetime", ["@value", "column", "d"]]),
        Cell::Logical(true),
    );
    check(json!(["@op", "isMissing", null]), Cell::Logical(true));
    check(json!(["@op", "isMissing", 0]), Cell::Logical(false));
    check(
        json!(["@op", "isNumber", ["@value", "column", "m"]]),
        Cell::Logical(false),
    );
}

// ----------------------------------------------------------------- Structure

#[test]
fn expressions_compare_structurally() {
    let a = Expr::from_json(&json!(["@op", "add", 1, 2])).unwrap();
    let b = Expr::from_json(&json!(["@op", "add", 1, 2])).unwrap();
    let c = Expr::from_json(&json!(["@op", "add", 2, 1])).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
}

#[test]
fn arity_is_checked_at_construction() {
    assert!(matches!(
        Expr::from_json(&json!(["@op", "add", 1])),
        Err(EngineError::Arity(_))
    ));
    assert!(matches!(
        Expr::from_json(&json!(["@op", "not", true, false])),
        Err(EngineError::Arity(_))
    ));
    assert!(matches!(
        Expr::from_json(&json!(["@op", "frobnicate", 1, 2])),
        Err(EngineError::UnknownExpression(_))
    ));
    assert!(matches!(
        Expr::from_json(&json!(["@value", "uniform", 1])),
        Err(EngineError::Arity(_))
    ));
}
