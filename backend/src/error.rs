//! Error types for the Tablecraft recipe engine.
//!
//! The hierarchy mirrors the three failure classes of a run:
//!
//! - [`ValidationError`] - the recipe document is structurally or schema-invalid
//! - [`OpError`] / [`StepError`] - a step's preconditions failed against real data
//! - [`InputError`] - the raw input could not be ingested
//!
//! [`ExecutionError`] wraps all of them. Every error maps onto exactly one
//! [`ErrorKind`], the closed set of kinds reported to callers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::models::Table;

// =============================================================================
// Error Kinds
// =============================================================================

/// The externally visible failure kinds.
///
/// Serialized with the exact variant names (`"UnknownColumn"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnknownOperation,
    MissingArgument,
    InvalidArgumentType,
    UnexpectedArgument,
    UnknownColumn,
    InvalidPattern,
    InvalidGroup,
    ResourceExceeded,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::UnknownOperation => "UnknownOperation",
            ErrorKind::MissingArgument => "MissingArgument",
            ErrorKind::InvalidArgumentType => "InvalidArgumentType",
            ErrorKind::UnexpectedArgument => "UnexpectedArgument",
            ErrorKind::UnknownColumn => "UnknownColumn",
            ErrorKind::InvalidPattern => "InvalidPattern",
            ErrorKind::InvalidGroup => "InvalidGroup",
            ErrorKind::ResourceExceeded => "ResourceExceeded",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// A static problem found in a recipe document before execution.
///
/// `step_index` and `op` are `None` for document-level problems
/// (missing `steps`, empty recipe, unexpected top-level key).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub step_index: Option<usize>,
    pub op: Option<String>,
    pub kind: ErrorKind,
    pub message: String,
}

impl ValidationError {
    /// Error about the document as a whole.
    pub fn document(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            step_index: None,
            op: None,
            kind,
            message: message.into(),
        }
    }

    /// Error about one step. The message is prefixed with the step position.
    pub fn step(index: usize, op: Option<&str>, kind: ErrorKind, message: impl AsRef<str>) -> Self {
        let prefix = match op {
            Some(op) => format!("step {} ({})", index, op),
            None => format!("step {}", index),
        };
        Self {
            step_index: Some(index),
            op: op.map(str::to_string),
            kind,
            message: format!("{}: {}", prefix, message.as_ref()),
        }
    }
}

// =============================================================================
// Operation Errors
// =============================================================================

/// Failure of a single operation against the current table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpError {
    /// A referenced column is not declared on the table.
    #[error("unknown column '{column}' (available: {})", .available.join(", "))]
    UnknownColumn { column: String, available: Vec<String> },

    /// The regex pattern does not compile.
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A capture group index beyond what the pattern defines.
    #[error("capture group {group} does not exist; pattern defines {available} group(s)")]
    InvalidGroup { group: usize, available: usize },

    /// Data-derived output names clash with each other or an existing column.
    #[error("output column '{column}' would appear twice")]
    DuplicateColumn { column: String },

    /// The run's operation budget was exhausted.
    #[error("resource limit exceeded: {0}")]
    ResourceExceeded(String),
}

impl OpError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OpError::UnknownColumn { .. } => ErrorKind::UnknownColumn,
            OpError::InvalidPattern { .. } => ErrorKind::InvalidPattern,
            OpError::InvalidGroup { .. } => ErrorKind::InvalidGroup,
            OpError::DuplicateColumn { .. } => ErrorKind::InvalidArgumentType,
            OpError::ResourceExceeded(_) => ErrorKind::ResourceExceeded,
        }
    }
}

/// An operation failure tagged with the step that produced it.
///
/// `table_before` is the table the failing step received. It exists for
/// diagnostics only and is never part of the reported output.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("step {index} ({op}) failed: {cause}")]
pub struct StepError {
    pub index: usize,
    pub op: String,
    #[source]
    pub cause: OpError,
    pub table_before: Table,
}

// =============================================================================
// Input Errors
// =============================================================================

/// Errors while turning raw input into the initial table.
#[derive(Debug, Error)]
pub enum InputError {
    /// Input larger than the configured byte limit.
    #[error("input is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    /// Input produces more rows than the configured row limit.
    #[error("input has more than {limit} rows")]
    TooManyRows { limit: usize },

    /// CSV input could not be parsed.
    #[error("invalid CSV input: {0}")]
    Csv(#[from] csv::Error),

    /// JSON input could not be parsed.
    #[error("invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON input parsed but is not an array of flat objects.
    #[error("JSON input must be an array of flat objects: {0}")]
    NotTabular(String),

    /// Failed to read an input file.
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

impl InputError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InputError::TooLarge { .. } | InputError::TooManyRows { .. } => ErrorKind::ResourceExceeded,
            _ => ErrorKind::InvalidArgumentType,
        }
    }
}

// =============================================================================
// Execution Errors (top-level)
// =============================================================================

/// Everything that can stop a recipe run.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The recipe failed validation; nothing was executed.
    #[error("recipe is invalid ({} error(s)): {}", .0.len(), first_message(.0))]
    Invalid(Vec<ValidationError>),

    /// Ingestion failed before the first step.
    #[error("input error: {0}")]
    Input(#[from] InputError),

    /// The ingested table alone exhausted the operation budget.
    #[error("input exceeds the operation budget: {0}")]
    Budget(OpError),

    /// A step failed at run time.
    #[error(transparent)]
    Step(#[from] StepError),
}

fn first_message(errors: &[ValidationError]) -> &str {
    errors.first().map(|e| e.message.as_str()).unwrap_or("")
}

impl ExecutionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecutionError::Invalid(errors) => errors
                .first()
                .map(|e| e.kind)
                .unwrap_or(ErrorKind::MissingArgument),
            ExecutionError::Input(e) => e.kind(),
            ExecutionError::Budget(e) => e.kind(),
            ExecutionError::Step(e) => e.cause.kind(),
        }
    }

    pub fn step_index(&self) -> Option<usize> {
        match self {
            ExecutionError::Invalid(errors) => errors.first().and_then(|e| e.step_index),
            ExecutionError::Input(_) | ExecutionError::Budget(_) => None,
            ExecutionError::Step(e) => Some(e.index),
        }
    }
}

impl From<Vec<ValidationError>> for ExecutionError {
    fn from(errors: Vec<ValidationError>) -> Self {
        ExecutionError::Invalid(errors)
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' (expected a positive integer)")]
    InvalidValue { var: String, value: String },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for a single operation.
pub type OpResult<T> = Result<T, OpError>;

/// Result type for ingestion.
pub type InputResult<T> = Result<T, InputError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
