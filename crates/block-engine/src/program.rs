//! Program parsing and the pipeline runner.
//!
//! A program is a JSON array of pipelines; a pipeline is an array of
//! `["@transform", name, ...params]` steps, optionally preceded by a
//! `["@pipeline", name]` header. Pipelines execute strictly in program order
//! over one shared environment. A failing step aborts only its own pipeline:
//! the failure is recorded with its position and the run continues, keeping
//! everything earlier pipelines produced.

use crate::error::EngineError;
use crate::transforms::{
    assert_arity, transforms_map, Clustering, Environment, PlotSpec, RunCtx, SilhouetteScore,
    TestResult, TransformDefinition,
};
use serde_json::{json, Value as Json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// One named (or anonymous) sequence of transform steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub name: Option<String>,
    pub steps: Vec<Json>,
}

/// A parsed program: an ordered list of pipelines.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub pipelines: Vec<Pipeline>,
}

impl Program {
    /// Parses a program from its JSON form.
    pub fn from_json(value: &Json) -> Result<Program, EngineError> {
        let raw = value
            .as_array()
            .ok_or_else(|| EngineError::Parse("a program must be a JSON array".into()))?;
        let mut pipelines = Vec::with_capacity(raw.len());
        for (i, p) in raw.iter().enumerate() {
            let steps = p.as_array().ok_or_else(|| {
                EngineError::Parse(format!("pipeline {i} must be a JSON array of steps"))
            })?;
            let mut steps = steps.clone();
            let name = pipeline_header(&steps)?;
            if name.is_some() {
                steps.remove(0);
            }
            pipelines.push(Pipeline { name, steps });
        }
        Ok(Program { pipelines })
    }

    /// Parses a program from JSON text.
    pub fn from_str(text: &str) -> Result<Program, EngineError> {
        let value: Json =
            serde_json::from_str(text).map_err(|e| EngineError::Parse(e.to_string()))?;
        Program::from_json(&value)
    }
}

/// Extracts the optional `["@pipeline", name]` header.
fn pipeline_header(steps: &[Json]) -> Result<Option<String>, EngineError> {
    let Some(first) = steps.first().and_then(Json::as_array) else {
        return Ok(None);
    };
    if first.first().and_then(Json::as_str) != Some("@pipeline") {
        return Ok(None);
    }
    first
        .get(1)
        .and_then(Json::as_str)
        .map(|s| Some(s.to_string()))
        .ok_or_else(|| EngineError::Parse("\"@pipeline\" header needs a name string".into()))
}

/// Where and why a pipeline stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineFailure {
    pub pipeline: usize,
    pub name: Option<String>,
    pub step: usize,
    pub transform: String,
    pub error: EngineError,
}

/// Everything a run produced: the final environment, the collected artifacts,
/// and the failures of any aborted pipelines.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunReport {
    pub tables: Environment,
    pub plots: Vec<PlotSpec>,
    pub tests: Vec<TestResult>,
    pub clusterings: Vec<Clustering>,
    pub silhouettes: Vec<SilhouetteScore>,
    pub failures: Vec<PipelineFailure>,
}

impl RunReport {
    /// The report as JSON for the host.
    pub fn to_json(&self) -> Json {
        let mut tables = serde_json::Map::new();
        for (name, table) in &self.tables {
            tables.insert(name.clone(), table.to_json());
        }
        let failures: Vec<Json> = self
            .failures
            .iter()
            .map(|f| {
                json!({
                    "pipeline": f.pipeline,
                    "name": f.name,
                    "step": f.step,
                    "transform": f.transform,
                    "error": f.error.to_string(),
                })
            })
            .collect();
        json!({
            "tables": tables,
            "plots": serde_json::to_value(&self.plots).unwrap_or_default(),
            "tests": serde_json::to_value(&self.tests).unwrap_or_default(),
            "clusterings": serde_json::to_value(&self.clusterings).unwrap_or_default(),
            "silhouettes": serde_json::to_value(&self.silhouettes).unwrap_or_default(),
            "failures": failures,
        })
    }
}

/// Executes programs against the transform registry.
pub struct Runner {
    transforms: HashMap<String, Arc<TransformDefinition>>,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Runner {
        Runner {
            transforms: transforms_map(),
        }
    }

    /// Runs a program over a fresh environment.
    pub fn run(&self, program: &Program) -> RunReport {
        self.run_with_env(program, Environment::new())
    }

    /// Runs a program over a pre-populated environment (host-loaded tables).
    pub fn run_with_env(&self, program: &Program, mut env: Environment) -> RunReport {
        let mut plots = Vec::new();
        let mut tests = Vec::new();
        let mut clusterings = Vec::new();
        let mut silhouettes = Vec::new();
        let mut failures = Vec::new();

        for (pi, pipeline) in program.pipelines.iter().enumerate() {
            let mut ctx = RunCtx {
                env: &mut env,
                current: None,
                plots: &mut plots,
                tests: &mut tests,
                clusterings: &mut clusterings,
                silhouettes: &mut silhouettes,
            };
            for (si, step) in pipeline.steps.iter().enumerate() {
                match self.apply_step(step, &mut ctx) {
                    Ok(name) => {
                        debug!(pipeline = pi, step = si, transform = %name, "applied transform");
                    }
                    Err((transform, error)) => {
                        warn!(pipeline = pi, step = si, transform = %transform, %error, "pipeline aborted");
                        failures.push(PipelineFailure {
                            pipeline: pi,
                            name: pipeline.name.clone(),
                            step: si,
                            transform,
                            error,
                        });
                        break;
                    }
                }
            }
        }
        RunReport {
            tables: env,
            plots,
            tests,
            clusterings,
            silhouettes,
            failures,
        }
    }

    /// Applies one step, returning the transform name for logging, or the
    /// name paired with the error for failure reporting.
    fn apply_step(
        &self,
        step: &Json,
        ctx: &mut RunCtx<'_>,
    ) -> Result<String, (String, EngineError)> {
        let parsed = parse_step(step).map_err(|e| ("?".to_string(), e))?;
        let (name, args) = parsed;
        let def = self
            .transforms
            .get(name)
            .ok_or_else(|| (name.to_string(), EngineError::UnknownTransform(name.to_string())))?;
        assert_arity(def.name, &def.arity, args.len()).map_err(|e| (name.to_string(), e))?;
        (def.apply_fn)(args, ctx).map_err(|e| (name.to_string(), e))?;
        Ok(name.to_string())
    }
}

fn parse_step(step: &Json) -> Result<(&str, &[Json]), EngineError> {
    let arr = step
        .as_array()
        .ok_or_else(|| EngineError::Parse(format!("a step must be a JSON array, got {step}")))?;
    if arr.first().and_then(Json::as_str) != Some("@transform") {
        return Err(EngineError::Parse(format!(
            "a step must start with \"@transform\", got {step}"
        )));
    }
    let name = arr
        .get(1)
        .and_then(Json::as_str)
        .ok_or_else(|| EngineError::Parse("\"@transform\" needs a transform name".into()))?;
    Ok((name, &arr[2..]))
}
