//! # Tablecraft - deterministic text-to-table recipes
//!
//! Tablecraft turns raw text into a table by running a declarative recipe:
//! an ordered list of steps, each naming an operation from a closed registry.
//! Recipes are typically proposed by a language model and previewed by a
//! user, so every recipe is validated before it touches input, and every run
//! is bounded by an operation budget.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Recipe JSON │────▶│  Validator  │────▶│ Interpreter │────▶│   Result    │
//! │             │     │ (registry)  │     │ (fail-fast) │     │   shaper    │
//! └─────────────┘     └─────────────┘     └──────▲──────┘     └─────────────┘
//!                                                │
//!                     ┌─────────────┐     ┌──────┴──────┐
//!                     │ Input text  │────▶│  Ingestion  │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use serde_json::json;
//! use tablecraft::execute;
//!
//! let recipe = json!({"steps": [
//!     {"op": "regex_extract", "pattern": "\\d+$", "as": "n"},
//!     {"op": "select", "columns": ["n"]}
//! ]});
//! let result = execute(&recipe, "row7\nrow42");
//! println!("{}", result.to_json().unwrap());
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Error types and the closed set of error kinds
//! - [`config`] - Operation budget and environment configuration
//! - [`models`] - Cell and Table
//! - [`parser`] - Ingestion of raw input
//! - [`transform`] - Recipe DSL, operations, interpreter and pipeline
//! - [`validation`] - Recipe validation and JSON Schema export

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Ingestion
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError,
    ErrorKind,
    ExecutionError,
    InputError,
    OpError,
    StepError,
    ValidationError,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::{EngineConfig, ExecutionLimits};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{Cell, Table};

// =============================================================================
// Re-exports - Ingestion
// =============================================================================

pub use parser::{
    detect_delimiter,
    detect_encoding,
    decode_content,
    ingest_lines,
    read_input_file,
    InputFormat,
    InputSource,
    RawInput,
    LINE_COLUMN,
};

// =============================================================================
// Re-exports - Validation
// =============================================================================

pub use validation::{check_document, parse_recipe, recipe_schema, validate_recipe};

// =============================================================================
// Re-exports - DSL
// =============================================================================

pub use transform::dsl::{
    example_recipe,
    operations_description,
    Budget,
    ExecutionContext,
    Operation,
    Recipe,
    Step,
    StepExecutor,
    StepRegistry,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    execute,
    execute_with_limits,
    Engine,
    ExecutionFailure,
    ExecutionOutput,
    ExecutionResult,
    FailureDetail,
    OutputMeta,
};
