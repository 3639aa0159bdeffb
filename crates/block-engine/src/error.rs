use thiserror::Error;

/// Every failure the engine can raise.
///
/// Missing-value propagation is not represented here: a `Missing` cell flowing
/// through an operator is designed semantics for incomplete data, not a fault.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// Invalid value or expression parameters at construction time.
    #[error("construction: {0}")]
    Construction(String),

    /// Operator applied to incompatible operand kinds.
    #[error("type: {0}")]
    Type(String),

    /// Valid types, invalid value (division by zero, empty range, bad k).
    #[error("domain: {0}")]
    Domain(String),

    /// Unknown column or out-of-range row at evaluation time.
    #[error("lookup: {0}")]
    Lookup(String),

    /// Incompatible table shapes in join/glue/select.
    #[error("schema: {0}")]
    Schema(String),

    /// Failed type coercion.
    #[error("conversion: {0}")]
    Conversion(String),

    /// Pipeline references a table nothing has produced yet.
    #[error("dependency: {0}")]
    Dependency(String),

    /// Wrong number of operands or parameters.
    #[error("{0}")]
    Arity(String),

    #[error("unknown transform: {0}")]
    UnknownTransform(String),

    #[error("unknown expression: {0}")]
    UnknownExpression(String),

    /// Malformed program JSON.
    #[error("parse: {0}")]
    Parse(String),
}
