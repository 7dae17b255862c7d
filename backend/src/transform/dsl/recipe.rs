//! Recipe definition.
//!
//! A recipe is an ordered, non-empty list of steps. Recipes are only built
//! from validated documents ([`crate::validation::validate_recipe`]) or from
//! already-typed operations, so the interpreter never re-checks arguments.

use serde::Serialize;
use serde_json::Value;

use super::operations::{Descending, Operation, RegexExtractArgs, SelectArgs, SortByArgs};
use crate::error::{ErrorKind, ValidationError};
use crate::parser::LINE_COLUMN;

/// One operation with its parsed arguments. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Step {
    operation: Operation,
}

impl Step {
    pub fn new(operation: Operation) -> Self {
        Self { operation }
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn op_name(&self) -> &'static str {
        self.operation.name()
    }
}

/// A validated recipe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recipe {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    steps: Vec<Step>,
}

impl Recipe {
    pub(crate) fn from_parts(steps: Vec<Step>, version: Option<String>, description: Option<String>) -> Self {
        Self {
            version,
            description,
            steps,
        }
    }

    /// Build a recipe from typed operations. Fails when `operations` is empty.
    pub fn from_operations(operations: Vec<Operation>) -> Result<Self, ValidationError> {
        if operations.is_empty() {
            return Err(ValidationError::document(
                ErrorKind::MissingArgument,
                "recipe must contain at least one step",
            ));
        }
        Ok(Self::from_parts(operations.into_iter().map(Step::new).collect(), None, None))
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The recipe document this recipe was built from, in canonical form.
    pub fn to_document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Example recipe for documentation and model prompts: pull the trailing
/// number off each line and sort by it.
pub fn example_recipe() -> Recipe {
    let steps = vec![
        Step::new(Operation::RegexExtract(RegexExtractArgs {
            column: LINE_COLUMN.to_string(),
            pattern: r"^(\w+)".to_string(),
            group: 1,
            alias: "name".to_string(),
        })),
        Step::new(Operation::RegexExtract(RegexExtractArgs {
            column: LINE_COLUMN.to_string(),
            pattern: r"\d+$".to_string(),
            group: 0,
            alias: "n".to_string(),
        })),
        Step::new(Operation::SortBy(SortByArgs {
            columns: vec!["n".to_string()],
            descending: Descending::All(false),
        })),
        Step::new(Operation::Select(SelectArgs {
            columns: vec!["name".to_string(), "n".to_string()],
        })),
    ];
    Recipe::from_parts(
        steps,
        Some("1".to_string()),
        Some("Split 'name 42' lines into a name and a trailing number".to_string()),
    )
}
