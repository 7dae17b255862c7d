//! Recipe validation.
//!
//! Checks a raw recipe document against the [`StepRegistry`] before any input
//! is touched, and turns it into a typed [`Recipe`]. Every problem is
//! collected rather than stopping at the first, so the caller can report them
//! all at once.
//!
//! # Checks
//!
//! Document level:
//! - the document is an object with a non-empty `steps` array
//! - only `steps`, `version` and `description` appear at the top level
//!
//! Per step:
//! - `op` names a registered operation
//! - every required argument is present, with the declared kind
//! - no undeclared argument is present
//! - value constraints that need no input data hold
//!
//! Column existence is checked at run time, because the column set depends
//! on the ingested input.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use tablecraft::{validate_recipe, StepRegistry};
//!
//! let doc = json!({"steps": [{"op": "select", "columns": ["line"]}]});
//! let recipe = validate_recipe(&doc, StepRegistry::global()).unwrap();
//! assert_eq!(recipe.steps().len(), 1);
//! ```

pub mod schema;

use serde_json::{Map, Value};

use crate::error::{ErrorKind, ValidationError};
use crate::transform::dsl::recipe::{Recipe, Step};
use crate::transform::dsl::registry::{OpEntry, StepRegistry};

pub use schema::{check_document, is_valid, recipe_schema, validate};

/// Top-level keys a recipe document may carry.
pub const DOCUMENT_KEYS: [&str; 3] = ["steps", "version", "description"];

/// Result of validating a recipe document.
pub type ValidationResult = Result<Recipe, Vec<ValidationError>>;

/// Validate a recipe document and build the typed recipe.
pub fn validate_recipe(doc: &Value, registry: &StepRegistry) -> ValidationResult {
    let obj = match doc.as_object() {
        Some(obj) => obj,
        None => {
            return Err(vec![ValidationError::document(
                ErrorKind::InvalidArgumentType,
                format!("recipe must be an object, got {}", json_type(doc)),
            )])
        }
    };

    let mut errors = Vec::new();

    for key in obj.keys() {
        if !DOCUMENT_KEYS.contains(&key.as_str()) {
            errors.push(ValidationError::document(
                ErrorKind::UnexpectedArgument,
                format!("unexpected top-level key '{}'", key),
            ));
        }
    }

    let version = optional_text(obj, "version", &mut errors);
    let description = optional_text(obj, "description", &mut errors);

    let raw_steps = match obj.get("steps") {
        None => {
            errors.push(ValidationError::document(ErrorKind::MissingArgument, "recipe has no 'steps'"));
            return Err(errors);
        }
        Some(Value::Array(steps)) => steps,
        Some(other) => {
            errors.push(ValidationError::document(
                ErrorKind::InvalidArgumentType,
                format!("'steps' must be an array, got {}", json_type(other)),
            ));
            return Err(errors);
        }
    };
    if raw_steps.is_empty() {
        errors.push(ValidationError::document(
            ErrorKind::MissingArgument,
            "recipe must contain at least one step",
        ));
        return Err(errors);
    }

    let mut steps = Vec::with_capacity(raw_steps.len());
    for (index, raw) in raw_steps.iter().enumerate() {
        match validate_step(index, raw, registry) {
            Ok(step) => steps.push(step),
            Err(mut step_errors) => errors.append(&mut step_errors),
        }
    }

    if errors.is_empty() {
        Ok(Recipe::from_parts(steps, version, description))
    } else {
        Err(errors)
    }
}

/// Parse JSON text and validate it. Unparseable text is a document-level
/// `InvalidArgumentType`.
pub fn parse_recipe(text: &str, registry: &StepRegistry) -> ValidationResult {
    let doc: Value = serde_json::from_str(text).map_err(|e| {
        vec![ValidationError::document(
            ErrorKind::InvalidArgumentType,
            format!("recipe is not valid JSON: {}", e),
        )]
    })?;
    validate_recipe(&doc, registry)
}

/// Validate one step document.
pub fn validate_step(index: usize, raw: &Value, registry: &StepRegistry) -> Result<Step, Vec<ValidationError>> {
    let fail = |op: Option<&str>, kind: ErrorKind, message: String| -> Result<Step, Vec<ValidationError>> {
        Err(vec![ValidationError::step(index, op, kind, message)])
    };

    let obj = match raw.as_object() {
        Some(obj) => obj,
        None => {
            return fail(
                None,
                ErrorKind::InvalidArgumentType,
                format!("step must be an object, got {}", json_type(raw)),
            )
        }
    };
    let op = match obj.get("op") {
        None => return fail(None, ErrorKind::MissingArgument, "step has no 'op'".to_string()),
        Some(Value::String(op)) => op.as_str(),
        Some(other) => {
            return fail(
                None,
                ErrorKind::InvalidArgumentType,
                format!("'op' must be a string, got {}", json_type(other)),
            )
        }
    };
    let entry = match registry.get(op) {
        Some(entry) => entry,
        None => return fail(Some(op), ErrorKind::UnknownOperation, format!("unknown operation '{}'", op)),
    };

    let args = step_args(obj, entry);
    let errors = check_args(index, entry, &args);
    if !errors.is_empty() {
        return Err(errors);
    }

    let operation = match entry.parse(Value::Object(args)) {
        Ok(operation) => operation,
        Err(e) => return fail(Some(op), ErrorKind::InvalidArgumentType, e.to_string()),
    };
    if let Err(message) = operation.check() {
        return fail(Some(op), ErrorKind::InvalidArgumentType, message);
    }
    Ok(Step::new(operation))
}

/// Step arguments without `op`. A null optional argument counts as absent.
fn step_args(step: &Map<String, Value>, entry: &OpEntry) -> Map<String, Value> {
    step.iter()
        .filter(|(key, _)| key.as_str() != "op")
        .filter(|(key, value)| !(value.is_null() && entry.arg(key).map_or(false, |spec| !spec.required)))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn check_args(index: usize, entry: &OpEntry, args: &Map<String, Value>) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let op = Some(entry.name);

    for (key, value) in args {
        match entry.arg(key) {
            None => errors.push(ValidationError::step(
                index,
                op,
                ErrorKind::UnexpectedArgument,
                format!("unexpected argument '{}'", key),
            )),
            Some(spec) if !spec.kind.matches(value) => errors.push(ValidationError::step(
                index,
                op,
                ErrorKind::InvalidArgumentType,
                format!("'{}' must be {}, got {}", key, spec.kind.as_str(), json_type(value)),
            )),
            Some(_) => {}
        }
    }
    for spec in entry.required_args() {
        if !args.contains_key(spec.name) {
            errors.push(ValidationError::step(
                index,
                op,
                ErrorKind::MissingArgument,
                format!("missing required argument '{}'", spec.name),
            ));
        }
    }
    errors
}

fn optional_text(obj: &Map<String, Value>, key: &str, errors: &mut Vec<ValidationError>) -> Option<String> {
    match obj.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) if key == "version" => Some(n.to_string()),
        Some(other) => {
            errors.push(ValidationError::document(
                ErrorKind::InvalidArgumentType,
                format!("'{}' must be a string, got {}", key, json_type(other)),
            ));
            None
        }
    }
}

/// JSON type name for messages.
pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_u64() || n.is_i64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::dsl::operations::Operation;
    use serde_json::json;

    fn validate(doc: Value) -> ValidationResult {
        validate_recipe(&doc, StepRegistry::global())
    }

    fn kinds(errors: &[ValidationError]) -> Vec<(Option<usize>, ErrorKind)> {
        errors.iter().map(|e| (e.step_index, e.kind)).collect()
    }

    #[test]
    fn test_valid_recipe() {
        let recipe = validate(json!({
            "version": "1",
            "steps": [
                {"op": "regex_extract", "column": "line", "pattern": "\\d+$", "group": 0, "as": "n"},
                {"op": "select", "columns": ["n"]}
            ]
        }))
        .unwrap();
        assert_eq!(recipe.steps().len(), 2);
        assert_eq!(recipe.version(), Some("1"));
        assert!(matches!(recipe.steps()[0].operation(), Operation::RegexExtract(_)));
    }

    #[test]
    fn test_unknown_operation() {
        let errors = validate(json!({"steps": [{"op": "frobnicate"}]})).unwrap_err();
        assert_eq!(kinds(&errors), vec![(Some(0), ErrorKind::UnknownOperation)]);
        assert_eq!(errors[0].op.as_deref(), Some("frobnicate"));
    }

    #[test]
    fn test_document_level_errors() {
        let errors = validate(json!([])).unwrap_err();
        assert_eq!(kinds(&errors), vec![(None, ErrorKind::InvalidArgumentType)]);

        let errors = validate(json!({})).unwrap_err();
        assert_eq!(kinds(&errors), vec![(None, ErrorKind::MissingArgument)]);

        let errors = validate(json!({"steps": []})).unwrap_err();
        assert_eq!(kinds(&errors), vec![(None, ErrorKind::MissingArgument)]);

        let errors = validate(json!({"steps": {"op": "select"}})).unwrap_err();
        assert_eq!(kinds(&errors), vec![(None, ErrorKind::InvalidArgumentType)]);

        let errors = validate(json!({"steps": [{"op": "head"}], "mode": "fast"})).unwrap_err();
        assert_eq!(kinds(&errors), vec![(None, ErrorKind::UnexpectedArgument)]);
    }

    #[test]
    fn test_argument_errors_collected_across_steps() {
        let errors = validate(json!({
            "steps": [
                {"op": "select"},
                {"op": "head", "n": "5"},
                {"op": "head", "count": 5},
                {"op": "select", "columns": ["line"]},
                7,
                {"columns": ["line"]},
                {"op": 3}
            ]
        }))
        .unwrap_err();
        assert_eq!(
            kinds(&errors),
            vec![
                (Some(0), ErrorKind::MissingArgument),
                (Some(1), ErrorKind::InvalidArgumentType),
                (Some(2), ErrorKind::UnexpectedArgument),
                (Some(4), ErrorKind::InvalidArgumentType),
                (Some(5), ErrorKind::MissingArgument),
                (Some(6), ErrorKind::InvalidArgumentType),
            ]
        );
        assert!(errors[0].message.starts_with("step 0 (select)"));
    }

    #[test]
    fn test_negative_group_rejected() {
        let errors = validate(json!({
            "steps": [{"op": "regex_extract", "pattern": "a", "group": -1, "as": "x"}]
        }))
        .unwrap_err();
        assert_eq!(kinds(&errors), vec![(Some(0), ErrorKind::InvalidArgumentType)]);
    }

    #[test]
    fn test_value_constraints() {
        for step in [
            json!({"op": "cast", "mapping": {"n": "decimal"}}),
            json!({"op": "take_every", "n": 0}),
            json!({"op": "group_by_agg", "aggregations": [{"func": "median", "column": "n"}]}),
            json!({"op": "sort_by", "columns": ["a"], "descending": [true, false]}),
            json!({"op": "select", "columns": ["a", "a"]}),
        ] {
            let errors = validate(json!({ "steps": [step] })).unwrap_err();
            assert_eq!(kinds(&errors), vec![(Some(0), ErrorKind::InvalidArgumentType)], "{:?}", errors);
        }
    }

    #[test]
    fn test_null_optional_argument_is_absent() {
        let recipe = validate(json!({
            "steps": [{"op": "regex_replace", "column": "line", "pattern": "x", "as": null}]
        }))
        .unwrap();
        assert_eq!(recipe.to_document()["steps"][0].get("as"), None);

        let errors = validate(json!({"steps": [{"op": "select", "columns": null}]})).unwrap_err();
        assert_eq!(kinds(&errors), vec![(Some(0), ErrorKind::InvalidArgumentType)]);
    }

    #[test]
    fn test_filter_eq_accepts_null_value() {
        assert!(validate(json!({"steps": [{"op": "filter_eq", "column": "a", "value": null}]})).is_ok());
    }

    #[test]
    fn test_parse_recipe_text() {
        let errors = parse_recipe("{not json", StepRegistry::global()).unwrap_err();
        assert_eq!(kinds(&errors), vec![(None, ErrorKind::InvalidArgumentType)]);
        assert!(parse_recipe(r#"{"steps":[{"op":"head"}]}"#, StepRegistry::global()).is_ok());
    }
}
