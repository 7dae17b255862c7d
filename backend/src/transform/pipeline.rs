//! High-level execution API.
//!
//! Combines validation, ingestion, the step interpreter and result shaping
//! into the single call external callers use:
//!
//! ```rust,ignore
//! use serde_json::json;
//! use tablecraft::execute;
//!
//! let recipe = json!({"steps": [
//!     {"op": "regex_extract", "column": "line", "pattern": "\\d+$", "group": 0, "as": "n"}
//! ]});
//! let result = execute(&recipe, "row7\nrowX\nrow42");
//! println!("{}", result.to_json()?);
//! ```
//!
//! The recipe is always validated before the input is ingested, so an invalid
//! recipe never touches user data.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::dsl::executor::{ExecutionContext, StepExecutor};
use super::dsl::recipe::Recipe;
use super::dsl::registry::StepRegistry;
use crate::config::ExecutionLimits;
use crate::error::{ErrorKind, ExecutionError, ValidationError};
use crate::models::Table;
use crate::parser::{InputSource, RawInput};
use crate::validation::validate_recipe;

// =============================================================================
// Result shapes
// =============================================================================

/// Column names and counts of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputMeta {
    pub columns: Vec<String>,
    pub row_count: usize,
    pub column_count: usize,
}

/// Rows of a successful run, keyed in column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionOutput {
    pub output: Vec<Map<String, Value>>,
    pub meta: OutputMeta,
}

impl ExecutionOutput {
    pub fn from_table(table: &Table) -> Self {
        Self {
            output: table.to_records(),
            meta: OutputMeta {
                columns: table.columns().to_vec(),
                row_count: table.row_count(),
                column_count: table.column_count(),
            },
        }
    }
}

/// One reported problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureDetail {
    pub step_index: Option<usize>,
    pub op: Option<String>,
    pub error_kind: ErrorKind,
    pub message: String,
}

impl From<&ValidationError> for FailureDetail {
    fn from(e: &ValidationError) -> Self {
        Self {
            step_index: e.step_index,
            op: e.op.clone(),
            error_kind: e.kind,
            message: e.message.clone(),
        }
    }
}

/// A failed run.
///
/// Serializes to exactly `error_kind`, `step_index` and `message`, the first
/// problem found. The rest is for diagnostics and is never serialized:
/// `details` lists every problem (all validation errors, or the single step
/// failure) and `diagnostic_table` holds the table the failing step received.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionFailure {
    pub error_kind: ErrorKind,
    pub step_index: Option<usize>,
    pub message: String,
    #[serde(skip)]
    pub details: Vec<FailureDetail>,
    #[serde(skip)]
    pub diagnostic_table: Option<Table>,
}

impl From<ExecutionError> for ExecutionFailure {
    fn from(err: ExecutionError) -> Self {
        let error_kind = err.kind();
        let step_index = err.step_index();
        let message = err.to_string();
        match err {
            ExecutionError::Invalid(errors) => Self {
                error_kind,
                step_index,
                message: errors.first().map(|e| e.message.clone()).unwrap_or(message),
                details: errors.iter().map(FailureDetail::from).collect(),
                diagnostic_table: None,
            },
            ExecutionError::Step(e) => Self {
                error_kind,
                step_index,
                details: vec![FailureDetail {
                    step_index,
                    op: Some(e.op),
                    error_kind,
                    message: e.cause.to_string(),
                }],
                message,
                diagnostic_table: Some(e.table_before),
            },
            ExecutionError::Input(_) | ExecutionError::Budget(_) => Self {
                error_kind,
                step_index,
                details: vec![FailureDetail {
                    step_index,
                    op: None,
                    error_kind,
                    message: message.clone(),
                }],
                message,
                diagnostic_table: None,
            },
        }
    }
}

/// Outcome of [`execute`]: the success or failure shape, serialized untagged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExecutionResult {
    Success(ExecutionOutput),
    Failure(ExecutionFailure),
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success(_))
    }

    pub fn success(&self) -> Option<&ExecutionOutput> {
        match self {
            ExecutionResult::Success(out) => Some(out),
            ExecutionResult::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ExecutionFailure> {
        match self {
            ExecutionResult::Success(_) => None,
            ExecutionResult::Failure(f) => Some(f),
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Compact JSON, byte-identical for identical runs.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

impl From<Result<Table, ExecutionError>> for ExecutionResult {
    fn from(result: Result<Table, ExecutionError>) -> Self {
        match result {
            Ok(table) => ExecutionResult::Success(ExecutionOutput::from_table(&table)),
            Err(err) => ExecutionResult::Failure(err.into()),
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Validates and runs recipes against one registry and one set of limits.
///
/// Holds no per-run state; every call builds its own [`ExecutionContext`],
/// so one engine can serve concurrent runs.
#[derive(Debug, Clone, Copy)]
pub struct Engine<'r> {
    registry: &'r StepRegistry,
    limits: ExecutionLimits,
}

impl Default for Engine<'static> {
    fn default() -> Self {
        Self::new(ExecutionLimits::default())
    }
}

impl Engine<'static> {
    /// Engine over the built-in registry.
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            registry: StepRegistry::global(),
            limits,
        }
    }
}

impl<'r> Engine<'r> {
    pub fn with_registry(registry: &'r StepRegistry, limits: ExecutionLimits) -> Self {
        Self { registry, limits }
    }

    pub fn registry(&self) -> &'r StepRegistry {
        self.registry
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Validate `doc`, ingest `input` and run every step.
    pub fn execute<I: InputSource + ?Sized>(&self, doc: &Value, input: &I) -> ExecutionResult {
        self.run_with(doc, input, self.registry).into()
    }

    /// [`Engine::execute`] with line ingestion of `text`.
    pub fn execute_text(&self, doc: &Value, text: &str) -> ExecutionResult {
        self.execute(doc, &RawInput::text(text))
    }

    /// Validate, ingest and run with a caller-provided step executor.
    pub fn run_with<I, E>(&self, doc: &Value, input: &I, executor: &E) -> Result<Table, ExecutionError>
    where
        I: InputSource + ?Sized,
        E: StepExecutor + ?Sized,
    {
        let recipe = validate_recipe(doc, self.registry).map_err(|errors| {
            warn!(errors = errors.len(), "recipe rejected");
            ExecutionError::Invalid(errors)
        })?;
        self.run_recipe(&recipe, input, executor)
    }

    /// Ingest and run an already validated recipe.
    pub fn run_recipe<I, E>(&self, recipe: &Recipe, input: &I, executor: &E) -> Result<Table, ExecutionError>
    where
        I: InputSource + ?Sized,
        E: StepExecutor + ?Sized,
    {
        let table = input.ingest(&self.limits)?;
        debug!(rows = table.row_count(), columns = table.column_count(), "input ingested");

        let ctx = ExecutionContext::new(table, self.limits).map_err(ExecutionError::Budget)?;
        match ctx.run(recipe, executor) {
            Ok(table) => {
                info!(
                    steps = recipe.steps().len(),
                    rows = table.row_count(),
                    columns = table.column_count(),
                    "recipe executed"
                );
                Ok(table)
            }
            Err(err) => {
                warn!(step = err.index, op = %err.op, kind = %err.cause.kind(), "recipe failed");
                Err(err.into())
            }
        }
    }
}

/// Run `recipe` against `input_text` with the built-in registry and default
/// limits.
pub fn execute(recipe: &Value, input_text: &str) -> ExecutionResult {
    Engine::default().execute_text(recipe, input_text)
}

/// [`execute`] with explicit limits.
pub fn execute_with_limits(recipe: &Value, input_text: &str, limits: ExecutionLimits) -> ExecutionResult {
    Engine::new(limits).execute_text(recipe, input_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Cell;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let result = execute(&json!({"steps": [{"op": "select", "columns": ["line"]}]}), "a\nb");
        assert_eq!(
            result.to_value().unwrap(),
            json!({
                "output": [{"line": "a"}, {"line": "b"}],
                "meta": {"columns": ["line"], "row_count": 2, "column_count": 1}
            })
        );
    }

    #[test]
    fn test_validation_failure_shape() {
        let result = execute(
            &json!({"steps": [{"op": "select"}, {"op": "frobnicate"}]}),
            "a",
        );
        let value = result.to_value().unwrap();
        assert_eq!(value["error_kind"], "MissingArgument");
        assert_eq!(value["step_index"], 0);
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["error_kind", "step_index", "message"]);

        let details = &result.failure().unwrap().details;
        assert_eq!(details.len(), 2);
        assert_eq!(details[1].error_kind, ErrorKind::UnknownOperation);
        assert_eq!(details[1].op.as_deref(), Some("frobnicate"));
    }

    #[test]
    fn test_step_failure_keeps_diagnostic_table() {
        let result = execute(
            &json!({"steps": [
                {"op": "add_row_number"},
                {"op": "select", "columns": ["title"]}
            ]}),
            "x",
        );
        let failure = result.failure().unwrap();
        assert_eq!(failure.error_kind, ErrorKind::UnknownColumn);
        assert_eq!(failure.step_index, Some(1));
        assert!(failure.message.contains("title"));
        let table = failure.diagnostic_table.as_ref().unwrap();
        assert_eq!(table.value(0, "row_index"), Some(&Cell::Int(0)));

        let value = result.to_value().unwrap();
        assert!(value.get("diagnostic_table").is_none());
        assert!(value.get("output").is_none());
    }

    #[test]
    fn test_input_limit_failure() {
        let limits = ExecutionLimits {
            max_input_bytes: 4,
            ..ExecutionLimits::default()
        };
        let result = execute_with_limits(&json!({"steps": [{"op": "head"}]}), "0123456789", limits);
        let failure = result.failure().unwrap();
        assert_eq!(failure.error_kind, ErrorKind::ResourceExceeded);
        assert_eq!(failure.step_index, None);
    }
}
