//! JSON Schema (draft-07) of the recipe document.
//!
//! The schema is generated from the [`StepRegistry`], so it always matches
//! the operations the engine accepts. It is published for external tools
//! (editors, model prompts); the engine itself validates with
//! [`super::validate_recipe`], which also reports error kinds.

use serde_json::{json, Map, Value};

use crate::transform::dsl::registry::{ArgKind, OpEntry, StepRegistry};

/// Validate `data` against a JSON Schema. Returns every error message.
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = jsonschema::draft7::new(schema).map_err(|e| vec![format!("invalid schema: {}", e)])?;

    let errors: Vec<String> = validator.iter_errors(data).map(|e| e.to_string()).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Quick boolean form of [`validate`].
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

fn step_schema(entry: &OpEntry) -> Value {
    let mut properties = Map::new();
    properties.insert("op".to_string(), json!({ "const": entry.name }));
    for arg in &entry.args {
        let mut schema = arg.kind.schema();
        // Null optional arguments count as absent.
        if !arg.required && arg.kind != ArgKind::Scalar {
            schema = json!({ "anyOf": [schema, {"type": "null"}] });
        }
        if let Value::Object(map) = &mut schema {
            map.insert("description".to_string(), Value::String(arg.doc.to_string()));
        }
        properties.insert(arg.name.to_string(), schema);
    }

    let mut required = vec![Value::String("op".to_string())];
    required.extend(entry.required_args().map(|a| Value::String(a.name.to_string())));

    json!({
        "title": entry.name,
        "description": entry.summary,
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

/// Schema of a full recipe document for `registry`.
pub fn recipe_schema(registry: &StepRegistry) -> Value {
    let steps: Vec<Value> = registry.entries().iter().map(step_schema).collect();
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "Tablecraft recipe",
        "description": format!("Recipe document, registry version {}", registry.version()),
        "type": "object",
        "properties": {
            "version": {"type": ["string", "number", "null"]},
            "description": {"type": ["string", "null"]},
            "steps": {
                "type": "array",
                "minItems": 1,
                "items": {"oneOf": steps}
            }
        },
        "required": ["steps"],
        "additionalProperties": false
    })
}

/// Check a document against the generated schema.
pub fn check_document(doc: &Value, registry: &StepRegistry) -> Result<(), Vec<String>> {
    validate(&recipe_schema(registry), doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::dsl::recipe::example_recipe;

    #[test]
    fn test_example_recipe_matches_schema() {
        let doc = example_recipe().to_document();
        assert_eq!(check_document(&doc, StepRegistry::global()), Ok(()));
    }

    #[test]
    fn test_schema_rejects_bad_documents() {
        let registry = StepRegistry::global();
        let schema = recipe_schema(registry);
        assert!(!is_valid(&schema, &json!({"steps": []})));
        assert!(!is_valid(&schema, &json!({"steps": [{"op": "frobnicate"}]})));
        assert!(!is_valid(&schema, &json!({"steps": [{"op": "select"}]})));
        assert!(!is_valid(&schema, &json!({"steps": [{"op": "head", "n": -1}]})));
        assert!(!is_valid(&schema, &json!({"steps": [{"op": "head", "count": 1}]})));
        assert!(is_valid(&schema, &json!({"steps": [{"op": "head", "n": null}]})));
    }

    #[test]
    fn test_validate_reports_messages() {
        let errors = check_document(&json!({"steps": "all"}), StepRegistry::global()).unwrap_err();
        assert!(!errors.is_empty());
    }
}
