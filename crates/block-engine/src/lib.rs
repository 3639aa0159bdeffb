//! Execution engine for block-compiled data-analysis programs.
//!
//! # Overview
//!
//! Visual blocks compile to a JSON program: an array of pipelines, each an
//! array of `["@transform", name, ...params]` steps. Expressions inside steps
//! use `["@op", name, ...operands]` and `["@value", kind, ...payload]`. The
//! engine parses the program, threads each pipeline's table through its
//! transforms, and reports the named tables, plot specs, and test verdicts
//! back to the host.
//!
//! # Example
//!
//! ```
//! use block_engine::{Program, Runner};
//! use serde_json::json;
//!
//! let program = Program::from_json(&json!([
//!     [
//!         ["@transform", "sequence", "seq", 3],
//!         ["@transform", "filter", ["@op", "greater", ["@value", "column", "seq"], 1]],
//!         ["@transform", "saveAs", "big"]
//!     ]
//! ])).unwrap();
//!
//! let report = Runner::new().run(&program);
//! assert!(report.failures.is_empty());
//! assert_eq!(report.tables["big"].len(), 2);
//! ```

pub mod error;
pub mod expr;
pub mod program;
pub mod stats;
pub mod table;
pub mod transforms;
pub mod value;

// Re-export the core public API
pub use error::EngineError;
pub use expr::{BinaryOp, Expr, UnaryOp};
pub use program::{Pipeline, PipelineFailure, Program, RunReport, Runner};
pub use table::{Grouping, Row, Table};
pub use transforms::{
    Clustering, Environment, PlotKind, PlotSpec, Regression, SilhouetteScore, TestResult,
};
pub use value::{Cell, Value};
