//! Expression ASTs and per-row evaluation.
//!
//! Expressions arrive as JSON in the compiled-block convention: a bare scalar
//! is a literal, `["@value", kind, ...payload]` is a value leaf, and
//! `["@op", name, ...operands]` is an operator application. Arity is checked
//! when the AST is built; column names are deliberately not checked until
//! evaluation, since the table a pipeline feeds an expression can change from
//! step to step.

use crate::error::EngineError;
use crate::table::{parse_datetime, Row, Table};
use crate::value::{Cell, Value};
use chrono::{DateTime, Datelike, Timelike};
use serde_json::Value as Json;

/// Single-operand operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Abs,
    Not,
    ToNumber,
    ToText,
    ToLogical,
    ToDatetime,
    ToYear,
    ToMonth,
    ToDay,
    ToHours,
    ToMinutes,
    ToSeconds,
    ToWeekday,
    IsNumber,
    IsText,
    IsLogical,
    IsDatetime,
    IsMissing,
}

/// Two-operand operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
    Remainder,
    Minimum,
    Maximum,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

/// An immutable expression node; the only interior state is the private
/// generator inside a sampling leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Leaf(Value),
    Unary { op: UnaryOp, a: Box<Expr> },
    Binary { op: BinaryOp, a: Box<Expr>, b: Box<Expr> },
    IfElse { cond: Box<Expr>, then: Box<Expr>, otherwise: Box<Expr> },
}

impl Expr {
    /// Evaluates the expression for one row, returning the primitive cell.
    ///
    /// Arithmetic, comparison, and logical operators propagate `Missing`;
    /// `and`/`or` short-circuit on the left operand, `ifElse` on its
    /// condition.
    pub fn eval(&mut self, row: &Row, index: usize, table: &Table) -> Result<Cell, EngineError> {
        match self {
            Expr::Leaf(v) => v.run(row, index, table),
            Expr::Unary { op, a } => {
                let op = *op;
                let cell = a.eval(row, index, table)?;
                eval_unary(op, cell)
            }
            Expr::Binary { op, a, b } => {
                let op = *op;
                match op {
                    BinaryOp::And | BinaryOp::Or => {
                        let left = a.eval(row, index, table)?;
                        eval_logical(op, left, |e: &mut Expr| e.eval(row, index, table), b)
                    }
                    _ => {
                        let left = a.eval(row, index, table)?;
                        let right = b.eval(row, index, table)?;
                        eval_binary(op, left, right)
                    }
                }
            }
            Expr::IfElse { cond, then, otherwise } => {
                match cond.eval(row, index, table)? {
                    Cell::Missing => Ok(Cell::Missing),
                    Cell::Logical(true) => then.eval(row, index, table),
                    Cell::Logical(false) => otherwise.eval(row, index, table),
                    other => Err(EngineError::Type(format!(
                        "\"ifElse\" condition must be logical, got {}",
                        other.kind()
                    ))),
                }
            }
        }
    }

    /// Builds an AST from the compiled-block JSON convention.
    pub fn from_json(expr: &Json) -> Result<Expr, EngineError> {
        match expr {
            Json::Null => Ok(Expr::Leaf(Value::Missing)),
            Json::Bool(b) => Ok(Expr::Leaf(Value::Logical(*b))),
            Json::Number(n) => {
                let n = n
                    .as_f64()
                    .ok_or_else(|| EngineError::Parse(format!("bad number literal: {n}")))?;
                Ok(Expr::Leaf(Value::number(n)?))
            }
            Json::String(s) => Ok(Expr::Leaf(Value::Text(s.clone()))),
            Json::Array(arr) => from_array(arr),
            other => Err(EngineError::UnknownExpression(other.to_string())),
        }
    }
}

fn from_array(arr: &[Json]) -> Result<Expr, EngineError> {
    let marker = arr.first().and_then(Json::as_str).ok_or_else(|| {
        EngineError::UnknownExpression(format!("{}", Json::Array(arr.to_vec())))
    })?;
    match marker {
        "@value" => {
            let kind = arr.get(1).and_then(Json::as_str).ok_or_else(|| {
                EngineError::Parse("\"@value\" needs a kind string".into())
            })?;
            value_leaf(kind, &arr[2..]).map(Expr::Leaf)
        }
        "@op" => {
            let name = arr.get(1).and_then(Json::as_str).ok_or_else(|| {
                EngineError::Parse("\"@op\" needs an operator name".into())
            })?;
            op_node(name, &arr[2..])
        }
        other => Err(EngineError::UnknownExpression(other.to_string())),
    }
}

fn assert_arity(name: &str, expected: usize, got: usize) -> Result<(), EngineError> {
    if expected != got {
        Err(EngineError::Arity(format!(
            "\"{name}\" expects {expected} operand(s), got {got}"
        )))
    } else {
        Ok(())
    }
}

fn payload_f64(name: &str, args: &[Json], i: usize) -> Result<f64, EngineError> {
    args.get(i).and_then(Json::as_f64).ok_or_else(|| {
        EngineError::Parse(format!("\"{name}\" payload {i} must be a number"))
    })
}

fn payload_seed(name: &str, args: &[Json], i: usize) -> Result<u64, EngineError> {
    args.get(i).and_then(Json::as_u64).ok_or_else(|| {
        EngineError::Parse(format!("\"{name}\" seed must be a non-negative integer"))
    })
}

fn value_leaf(kind: &str, args: &[Json]) -> Result<Value, EngineError> {
    match kind {
        "absent" => {
            assert_arity("absent", 0, args.len())?;
            Ok(Value::Absent)
        }
        "missing" => {
            assert_arity("missing", 0, args.len())?;
            Ok(Value::Missing)
        }
        "rownum" => {
            assert_arity("rownum", 0, args.len())?;
            Ok(Value::RowNum)
        }
        "logical" => {
            assert_arity("logical", 1, args.len())?;
            let b = args[0].as_bool().ok_or_else(|| {
                EngineError::Construction("logical payload must be a boolean".into())
            })?;
            Ok(Value::Logical(b))
        }
        "number" => {
            assert_arity("number", 1, args.len())?;
            Value::number(payload_f64("number", args, 0)?)
        }
        "text" => {
            assert_arity("text", 1, args.len())?;
            let s = args[0].as_str().ok_or_else(|| {
                EngineError::Construction("text payload must be a string".into())
            })?;
            Ok(Value::Text(s.to_string()))
        }
        "datetime" => {
            assert_arity("datetime", 1, args.len())?;
            let s = args[0].as_str().ok_or_else(|| {
                EngineError::Construction("datetime payload must be a string".into())
            })?;
            parse_datetime(s)
                .map(Value::Datetime)
                .ok_or_else(|| EngineError::Construction(format!("bad datetime literal \"{s}\"")))
        }
        "column" => {
            assert_arity("column", 1, args.len())?;
            let s = args[0].as_str().ok_or_else(|| {
                EngineError::Construction("column payload must be a string".into())
            })?;
            Ok(Value::Column(s.to_string()))
        }
        "exponential" => {
            assert_arity("exponential", 2, args.len())?;
            Value::exponential(
                payload_f64("exponential", args, 0)?,
                payload_seed("exponential", args, 1)?,
            )
        }
        "normal" => {
            assert_arity("normal", 3, args.len())?;
            Value::normal(
                payload_f64("normal", args, 0)?,
                payload_f64("normal", args, 1)?,
                payload_seed("normal", args, 2)?,
            )
        }
        "uniform" => {
            assert_arity("uniform", 3, args.len())?;
            Value::uniform(
                payload_f64("uniform", args, 0)?,
                payload_f64("uniform", args, 1)?,
                payload_seed("uniform", args, 2)?,
            )
        }
        other => Err(EngineError::UnknownExpression(format!("@value {other}"))),
    }
}

fn op_node(name: &str, operands: &[Json]) -> Result<Expr, EngineError> {
    if let Some(op) = unary_op(name) {
        assert_arity(name, 1, operands.len())?;
        return Ok(Expr::Unary {
            op,
            a: Box::new(Expr::from_json(&operands[0])?),
        });
    }
    if let Some(op) = binary_op(name) {
        assert_arity(name, 2, operands.len())?;
        return Ok(Expr::Binary {
            op,
            a: Box::new(Expr::from_json(&operands[0])?),
            b: Box::new(Expr::from_json(&operands[1])?),
        });
    }
    if name == "ifElse" {
        assert_arity(name, 3, operands.len())?;
        return Ok(Expr::IfElse {
            cond: Box::new(Expr::from_json(&operands[0])?),
            then: Box::new(Expr::from_json(&operands[1])?),
            otherwise: Box::new(Expr::from_json(&operands[2])?),
        });
    }
    Err(EngineError::UnknownExpression(format!("@op {name}")))
}

fn unary_op(name: &str) -> Option<UnaryOp> {
    Some(match name {
        "negate" => UnaryOp::Negate,
        "abs" => UnaryOp::Abs,
        "not" => UnaryOp::Not,
        "toNumber" => UnaryOp::ToNumber,
        "toText" => UnaryOp::ToText,
        "toLogical" => UnaryOp::ToLogical,
        "toDatetime" => UnaryOp::ToDatetime,
        "toYear" => UnaryOp::ToYear,
        "toMonth" => UnaryOp::ToMonth,
        "toDay" => UnaryOp::ToDay,
        "toHours" => UnaryOp::ToHours,
        "toMinutes" => UnaryOp::ToMinutes,
        "toSeconds" => UnaryOp::ToSeconds,
        "toWeekday" => UnaryOp::ToWeekday,
        "isNumber" => UnaryOp::IsNumber,
        "isText" => UnaryOp::IsText,
        "isLogical" => UnaryOp::IsLogical,
        "isDatetime" => UnaryOp::IsDatetime,
        "isMissing" => UnaryOp::IsMissing,
        _ => return None,
    })
}

fn binary_op(name: &str) -> Option<BinaryOp> {
    Some(match name {
        "add" => BinaryOp::Add,
        "subtract" => BinaryOp::Subtract,
        "multiply" => BinaryOp::Multiply,
        "divide" => BinaryOp::Divide,
        "power" => BinaryOp::Power,
        "remainder" => BinaryOp::Remainder,
        "minimum" => BinaryOp::Minimum,
        "maximum" => BinaryOp::Maximum,
        "equal" => BinaryOp::Equal,
        "notEqual" => BinaryOp::NotEqual,
        "less" => BinaryOp::Less,
        "lessEqual" => BinaryOp::LessEqual,
        "greater" => BinaryOp::Greater,
        "greaterEqual" => BinaryOp::GreaterEqual,
        "and" => BinaryOp::And,
        "or" => BinaryOp::Or,
        _ => return None,
    })
}

fn op_name(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Subtract => "subtract",
        BinaryOp::Multiply => "multiply",
        BinaryOp::Divide => "divide",
        BinaryOp::Power => "power",
        BinaryOp::Remainder => "remainder",
        BinaryOp::Minimum => "minimum",
        BinaryOp::Maximum => "maximum",
        BinaryOp::Equal => "equal",
        BinaryOp::NotEqual => "notEqual",
        BinaryOp::Less => "less",
        BinaryOp::LessEqual => "lessEqual",
        BinaryOp::Greater => "greater",
        BinaryOp::GreaterEqual => "greaterEqual",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
    }
}

fn require_number(op: &str, cell: &Cell) -> Result<f64, EngineError> {
    match cell {
        Cell::Number(n) => Ok(*n),
        other => Err(EngineError::Type(format!(
            "\"{op}\" requires a number operand, got {}",
            other.kind()
        ))),
    }
}

fn require_logical(op: &str, cell: &Cell) -> Result<bool, EngineError> {
    match cell {
        Cell::Logical(b) => Ok(*b),
        other => Err(EngineError::Type(format!(
            "\"{op}\" requires a logical operand, got {}",
            other.kind()
        ))),
    }
}

fn eval_unary(op: UnaryOp, cell: Cell) -> Result<Cell, EngineError> {
    // Type checks are total; everything else propagates Missing first.
    match op {
        UnaryOp::IsNumber => return Ok(Cell::Logical(matches!(cell, Cell::Number(_)))),
        UnaryOp::IsText => return Ok(Cell::Logical(matches!(cell, Cell::Text(_)))),
        UnaryOp::IsLogical => return Ok(Cell::Logical(matches!(cell, Cell::Logical(_)))),
        UnaryOp::IsDatetime => return Ok(Cell::Logical(matches!(cell, Cell::Datetime(_)))),
        UnaryOp::IsMissing => return Ok(Cell::Logical(cell.is_missing())),
        _ => {}
    }
    if cell.is_missing() {
        return Ok(Cell::Missing);
    }
    match op {
        UnaryOp::Negate => Ok(Cell::Number(-require_number("negate", &cell)?)),
        UnaryOp::Abs => Ok(Cell::Number(require_number("abs", &cell)?.abs())),
        UnaryOp::Not => Ok(Cell::Logical(!require_logical("not", &cell)?)),
        UnaryOp::ToNumber => to_number(cell),
        UnaryOp::ToText => Ok(Cell::Text(to_text(&cell))),
        UnaryOp::ToLogical => to_logical(cell),
        UnaryOp::ToDatetime => to_datetime(cell),
        UnaryOp::ToYear
        | UnaryOp::ToMonth
        | UnaryOp::ToDay
        | UnaryOp::ToHours
        | UnaryOp::ToMinutes
        | UnaryOp::ToSeconds
        | UnaryOp::ToWeekday => decompose(op, cell),
        UnaryOp::IsNumber
        | UnaryOp::IsText
        | UnaryOp::IsLogical
        | UnaryOp::IsDatetime
        | UnaryOp::IsMissing => unreachable!("type checks handled above"),
    }
}

fn eval_logical<F>(op: BinaryOp, left: Cell, eval_right: F, b: &mut Expr) -> Result<Cell, EngineError>
where
    F: FnOnce(&mut Expr) -> Result<Cell, EngineError>,
{
    let name = op_name(op);
    if left.is_missing() {
        return Ok(Cell::Missing);
    }
    let left = require_logical(name, &left)?;
    // Short-circuit without touching the right operand.
    match (op, left) {
        (BinaryOp::And, false) => return Ok(Cell::Logical(false)),
        (BinaryOp::Or, true) => return Ok(Cell::Logical(true)),
        _ => {}
    }
    let right = eval_right(b)?;
    if right.is_missing() {
        return Ok(Cell::Missing);
    }
    Ok(Cell::Logical(require_logical(name, &right)?))
}

fn eval_binary(op: BinaryOp, left: Cell, right: Cell) -> Result<Cell, EngineError> {
    if left.is_missing() || right.is_missing() {
        return Ok(Cell::Missing);
    }
    let name = op_name(op);
    match op {
        BinaryOp::Add
        | BinaryOp::Subtract
        | BinaryOp::Multiply
        | BinaryOp::Divide
        | BinaryOp::Power
        | BinaryOp::Remainder
        | BinaryOp::Minimum
        | BinaryOp::Maximum => {
            let a = require_number(name, &left)?;
            let b = require_number(name, &right)?;
            let out = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Subtract => a - b,
                BinaryOp::Multiply => a * b,
                BinaryOp::Divide => {
                    if b == 0.0 {
                        return Err(EngineError::Domain("division by zero".into()));
                    }
                    a / b
                }
                BinaryOp::Remainder => {
                    if b == 0.0 {
                        return Err(EngineError::Domain("remainder by zero".into()));
                    }
                    a % b
                }
                BinaryOp::Power => a.powf(b),
                BinaryOp::Minimum => a.min(b),
                BinaryOp::Maximum => a.max(b),
                _ => unreachable!(),
            };
            Ok(Cell::Number(out))
        }
        BinaryOp::Equal => Ok(Cell::Logical(left == right)),
        BinaryOp::NotEqual => Ok(Cell::Logical(left != right)),
        BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
            let ord = ordering(name, &left, &right)?;
            let keep = match op {
                BinaryOp::Less => ord.is_lt(),
                BinaryOp::LessEqual => ord.is_le(),
                BinaryOp::Greater => ord.is_gt(),
                BinaryOp::GreaterEqual => ord.is_ge(),
                _ => unreachable!(),
            };
            Ok(Cell::Logical(keep))
        }
        BinaryOp::And | BinaryOp::Or => unreachable!("logical ops short-circuit in eval"),
    }
}

/// Ordering comparisons are defined within numbers, texts, and datetimes only.
fn ordering(op: &str, left: &Cell, right: &Cell) -> Result<std::cmp::Ordering, EngineError> {
    match (left, right) {
        (Cell::Number(a), Cell::Number(b)) => Ok(a.total_cmp(b)),
        (Cell::Text(a), Cell::Text(b)) => Ok(a.cmp(b)),
        (Cell::Datetime(a), Cell::Datetime(b)) => Ok(a.cmp(b)),
        (a, b) => Err(EngineError::Type(format!(
            "\"{op}\" cannot compare {} with {}",
            a.kind(),
            b.kind()
        ))),
    }
}

fn to_number(cell: Cell) -> Result<Cell, EngineError> {
    match cell {
        Cell::Number(n) => Ok(Cell::Number(n)),
        Cell::Logical(b) => Ok(Cell::Number(if b { 1.0 } else { 0.0 })),
        Cell::Text(s) => s
            .trim()
            .parse::<f64>()
            .map(Cell::Number)
            .map_err(|_| EngineError::Conversion(format!("cannot convert \"{s}\" to a number"))),
        Cell::Datetime(d) => Ok(Cell::Number(d.and_utc().timestamp() as f64)),
        Cell::Missing => Ok(Cell::Missing),
    }
}

/// Display form used by `toText`; whole numbers print without a fraction.
fn to_text(cell: &Cell) -> String {
    match cell {
        Cell::Missing => String::new(),
        Cell::Logical(b) => b.to_string(),
        Cell::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 9.0e15 {
                format!("{}", *n as i64)
            } else {
                n.to_string()
            }
        }
        Cell::Text(s) => s.clone(),
        Cell::Datetime(d) => d.format("%Y-%m-%dT%H:%M:%S").to_string(),
    }
}

fn to_logical(cell: Cell) -> Result<Cell, EngineError> {
    match cell {
        Cell::Logical(b) => Ok(Cell::Logical(b)),
        Cell::Number(n) => Ok(Cell::Logical(n != 0.0)),
        Cell::Text(s) => {
            if s.eq_ignore_ascii_case("true") {
                Ok(Cell::Logical(true))
            } else if s.eq_ignore_ascii_case("false") {
                Ok(Cell::Logical(false))
            } else {
                Err(EngineError::Conversion(format!(
                    "cannot convert \"{s}\" to a logical"
                )))
            }
        }
        other => Err(EngineError::Type(format!(
            "\"toLogical\" cannot convert a {}",
            other.kind()
        ))),
    }
}

fn to_datetime(cell: Cell) -> Result<Cell, EngineError> {
    match cell {
        Cell::Datetime(d) => Ok(Cell::Datetime(d)),
        Cell::Text(s) => parse_datetime(&s)
            .map(Cell::Datetime)
            .ok_or_else(|| EngineError::Conversion(format!("cannot convert \"{s}\" to a datetime"))),
        Cell::Number(n) => DateTime::from_timestamp(n as i64, 0)
            .map(|d| Cell::Datetime(d.naive_utc()))
            .ok_or_else(|| EngineError::Conversion(format!("timestamp {n} out of range"))),
        other => Err(EngineError::Type(format!(
            "\"toDatetime\" cannot convert a {}",
            other.kind()
        ))),
    }
}

fn decompose(op: UnaryOp, cell: Cell) -> Result<Cell, EngineError> {
    let d = match cell {
        Cell::Datetime(d) => d,
        other => {
            return Err(EngineError::Type(format!(
                "date decomposition requires a datetime, got {}",
                other.kind()
            )))
        }
    };
    let n = match op {
        UnaryOp::ToYear => f64::from(d.year()),
        UnaryOp::ToMonth => f64::from(d.month()),
        UnaryOp::ToDay => f64::from(d.day()),
        UnaryOp::ToHours => f64::from(d.hour()),
        UnaryOp::ToMinutes => f64::from(d.minute()),
        UnaryOp::ToSeconds => f64::from(d.second()),
        UnaryOp::ToWeekday => f64::from(d.weekday().num_days_from_sunday()),
        _ => unreachable!("only decomposition ops reach here"),
    };
    Ok(Cell::Number(n))
}
