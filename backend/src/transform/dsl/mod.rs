//! Recipe DSL.
//!
//! This module provides:
//! - `recipe`: validated recipe and step types
//! - `registry`: the closed operation catalogue (names, argument specs, parsers)
//! - `operations`: typed operation arguments and their table transforms
//! - `executor`: the step interpreter and its operation budget
//!
//! ## Usage Flow
//!
//! ```text
//! recipe JSON → validation::validate_recipe → Recipe
//! input text  → parser::RawInput::ingest   → Table
//! Recipe + Table → executor::ExecutionContext::run → Table | StepError
//! ```

pub mod executor;
pub mod operations;
pub mod recipe;
pub mod registry;

// Re-exports for convenience
pub use executor::{Budget, ExecutionContext, StepExecutor};
pub use operations::Operation;
pub use recipe::{example_recipe, Recipe, Step};
pub use registry::{operations_description, ArgKind, ArgSpec, OpEntry, StepRegistry, REGISTRY_VERSION};
