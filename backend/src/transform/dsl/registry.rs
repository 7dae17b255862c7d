//! Step registry.
//!
//! The single source of truth for which operations exist, which arguments
//! each accepts, and how a step document becomes a typed [`Operation`].
//! The registry is built once and shared read-only across runs.

use once_cell::sync::Lazy;
use serde_json::{json, Value};

use super::operations::Operation;

/// Version of the operation catalogue. Bumped whenever an operation or
/// argument contract changes.
pub const REGISTRY_VERSION: u32 = 1;

// =============================================================================
// Argument specs
// =============================================================================

/// Expected value kind of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    String,
    /// Non-negative integer.
    Integer,
    Boolean,
    /// null, string, number or boolean.
    Scalar,
    StringList,
    /// One string or a list of strings.
    StringOrStringList,
    /// Object whose values are strings.
    StringMap,
    /// Object whose values are scalars.
    ScalarMap,
    BoolOrBoolList,
    ObjectList,
}

fn is_scalar(value: &Value) -> bool {
    !(value.is_array() || value.is_object())
}

impl ArgKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgKind::String => "string",
            ArgKind::Integer => "integer",
            ArgKind::Boolean => "boolean",
            ArgKind::Scalar => "scalar",
            ArgKind::StringList => "string_list",
            ArgKind::StringOrStringList => "string_or_string_list",
            ArgKind::StringMap => "string_map",
            ArgKind::ScalarMap => "scalar_map",
            ArgKind::BoolOrBoolList => "bool_or_bool_list",
            ArgKind::ObjectList => "object_list",
        }
    }

    /// Whether `value` has this kind.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ArgKind::String => value.is_string(),
            ArgKind::Integer => value.is_u64(),
            ArgKind::Boolean => value.is_boolean(),
            ArgKind::Scalar => is_scalar(value),
            ArgKind::StringList => value
                .as_array()
                .map_or(false, |items| items.iter().all(Value::is_string)),
            ArgKind::StringOrStringList => value.is_string() || ArgKind::StringList.matches(value),
            ArgKind::StringMap => value
                .as_object()
                .map_or(false, |map| map.values().all(Value::is_string)),
            ArgKind::ScalarMap => value
                .as_object()
                .map_or(false, |map| map.values().all(is_scalar)),
            ArgKind::BoolOrBoolList => {
                value.is_boolean()
                    || value
                        .as_array()
                        .map_or(false, |items| items.iter().all(Value::is_boolean))
            }
            ArgKind::ObjectList => value
                .as_array()
                .map_or(false, |items| items.iter().all(Value::is_object)),
        }
    }

    /// JSON Schema (draft-07) fragment for this kind.
    pub fn schema(&self) -> Value {
        let scalar = json!({"type": ["null", "string", "number", "boolean"]});
        match self {
            ArgKind::String => json!({"type": "string"}),
            ArgKind::Integer => json!({"type": "integer", "minimum": 0}),
            ArgKind::Boolean => json!({"type": "boolean"}),
            ArgKind::Scalar => scalar,
            ArgKind::StringList => json!({"type": "array", "items": {"type": "string"}}),
            ArgKind::StringOrStringList => json!({
                "oneOf": [
                    {"type": "string"},
                    {"type": "array", "items": {"type": "string"}}
                ]
            }),
            ArgKind::StringMap => json!({"type": "object", "additionalProperties": {"type": "string"}}),
            ArgKind::ScalarMap => json!({"type": "object", "additionalProperties": scalar}),
            ArgKind::BoolOrBoolList => json!({
                "oneOf": [
                    {"type": "boolean"},
                    {"type": "array", "items": {"type": "boolean"}}
                ]
            }),
            ArgKind::ObjectList => json!({"type": "array", "items": {"type": "object"}}),
        }
    }
}

/// One declared argument of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
    pub doc: &'static str,
}

const fn required(name: &'static str, kind: ArgKind, doc: &'static str) -> ArgSpec {
    ArgSpec {
        name,
        kind,
        required: true,
        doc,
    }
}

const fn optional(name: &'static str, kind: ArgKind, doc: &'static str) -> ArgSpec {
    ArgSpec {
        name,
        kind,
        required: false,
        doc,
    }
}

// =============================================================================
// Entries
// =============================================================================

/// Builds a typed operation from a step object with `op` removed.
pub type ParseFn = fn(Value) -> Result<Operation, serde_json::Error>;

/// A registered operation.
#[derive(Debug, Clone)]
pub struct OpEntry {
    pub name: &'static str,
    pub summary: &'static str,
    pub args: Vec<ArgSpec>,
    parse: ParseFn,
}

impl OpEntry {
    pub fn arg(&self, name: &str) -> Option<&ArgSpec> {
        self.args.iter().find(|a| a.name == name)
    }

    pub fn required_args(&self) -> impl Iterator<Item = &ArgSpec> {
        self.args.iter().filter(|a| a.required)
    }

    /// Parse arguments that already passed kind checks.
    pub fn parse(&self, args: Value) -> Result<Operation, serde_json::Error> {
        (self.parse)(args)
    }
}

/// The closed operation catalogue.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    entries: Vec<OpEntry>,
}

static GLOBAL: Lazy<StepRegistry> = Lazy::new(StepRegistry::builtin);

macro_rules! entry {
    ($name:literal, $variant:ident, $summary:literal, [$($arg:expr),* $(,)?]) => {
        OpEntry {
            name: $name,
            summary: $summary,
            args: vec![$($arg),*],
            parse: |args| serde_json::from_value(args).map(Operation::$variant),
        }
    };
}

impl StepRegistry {
    /// Shared built-in registry.
    pub fn global() -> &'static StepRegistry {
        &GLOBAL
    }

    /// Fresh registry holding every built-in operation.
    pub fn builtin() -> Self {
        use ArgKind::*;

        let entries = vec![
            entry!("select", Select, "Keep only the listed columns, in the listed order", [
                required("columns", StringList, "columns to keep"),
            ]),
            entry!("regex_extract", RegexExtract, "Write one capture group of the first match into a column", [
                optional("column", String, "source column (default \"line\")"),
                required("pattern", String, "regex pattern"),
                optional("group", Integer, "capture group, 0 = whole match (default 0)"),
                required("as", String, "destination column"),
            ]),
            entry!("regex_extract_multi", RegexExtractMulti, "Write capture groups 1..n into several columns", [
                optional("column", String, "source column (default \"line\")"),
                required("pattern", String, "regex pattern"),
                required("as", StringList, "destination column per group"),
            ]),
            entry!("regex_replace", RegexReplace, "Replace every match of a pattern", [
                required("column", String, "source column"),
                required("pattern", String, "regex pattern"),
                optional("replacement", String, "replacement text, $1 for groups (default \"\")"),
                optional("as", String, "destination column (default: column)"),
            ]),
            entry!("filter_regex", FilterRegex, "Keep rows whose value matches a pattern", [
                optional("column", String, "column to test (default \"line\")"),
                required("pattern", String, "regex pattern"),
            ]),
            entry!("filter_eq", FilterEq, "Keep rows whose value equals a literal", [
                required("column", String, "column to test"),
                required("value", Scalar, "value to compare against"),
            ]),
            entry!("rename", Rename, "Rename columns", [
                required("mapping", StringMap, "{old: new}"),
            ]),
            entry!("drop", Drop, "Remove columns; absent ones are ignored", [
                required("columns", StringList, "columns to remove"),
            ]),
            entry!("cast", Cast, "Convert column types; failures become null", [
                required("mapping", StringMap, "{column: int|float|str|bool}"),
            ]),
            entry!("fill_null", FillNull, "Replace nulls with a literal", [
                required("mapping", ScalarMap, "{column: value}"),
            ]),
            entry!("replace_values", ReplaceValues, "Map literal values to replacements", [
                required("column", String, "source column"),
                required("mapping", ScalarMap, "{text: replacement}"),
                optional("as", String, "destination column (default: column)"),
            ]),
            entry!("lookup", Lookup, "Join a column against an inline key/value table", [
                required("on", String, "column holding the keys"),
                required("table", ObjectList, "entries like {key: ..., value: ...}"),
                optional("key_field", String, "key field name (default \"key\")"),
                optional("value_field", String, "value field name (default \"value\")"),
                optional("default", Scalar, "value when no entry matches (default: keep)"),
                optional("as", String, "destination column (default: on)"),
            ]),
            entry!("slice", Slice, "Keep a window of rows", [
                optional("offset", Integer, "first row (default 0)"),
                optional("length", Integer, "row count (default: all)"),
            ]),
            entry!("head", Head, "Keep the first n rows", [
                optional("n", Integer, "row count (default 5)"),
            ]),
            entry!("tail", Tail, "Keep the last n rows", [
                optional("n", Integer, "row count (default 5)"),
            ]),
            entry!("take_every", TakeEvery, "Keep every nth row", [
                optional("n", Integer, "step, at least 1 (default 1)"),
                optional("offset", Integer, "first row (default 0)"),
            ]),
            entry!("add_row_number", AddRowNumber, "Add a running row number", [
                optional("as", String, "destination column (default \"row_index\")"),
                optional("start", Integer, "first number (default 0)"),
            ]),
            entry!("distinct", Distinct, "Drop duplicate rows, keeping the first", [
                optional("columns", StringList, "columns forming the key (default: all)"),
            ]),
            entry!("sort_by", SortBy, "Stable sort by one or more columns", [
                required("columns", StringList, "sort keys"),
                optional("descending", BoolOrBoolList, "one flag or one per column (default false)"),
            ]),
            entry!("split_column", SplitColumn, "Split a value into several columns", [
                required("column", String, "source column"),
                required("into", StringList, "destination columns"),
                optional("delimiter", String, "separator (default \",\")"),
                optional("drop_original", Boolean, "remove the source column (default false)"),
            ]),
            entry!("split_to_rows", SplitToRows, "Split a value into one row per part", [
                required("column", String, "source column"),
                optional("delimiter", String, "separator (default \",\")"),
                optional("as", String, "destination column (default: column)"),
                optional("drop_original", Boolean, "remove the source column (default true)"),
            ]),
            entry!("concat_columns", ConcatColumns, "Join several columns into one string", [
                required("columns", StringList, "columns to join"),
                optional("delimiter", String, "separator (default \"\")"),
                optional("as", String, "destination column (default \"line\")"),
            ]),
            entry!("coalesce", Coalesce, "First non-null value across columns", [
                required("columns", StringList, "columns in priority order"),
                optional("as", String, "destination column (default: first column)"),
            ]),
            entry!("drop_na", DropNa, "Drop rows containing nulls", [
                optional("columns", StringList, "columns to check (default: all)"),
            ]),
            entry!("group_by_agg", GroupByAgg, "Group rows and aggregate", [
                optional("keys", StringList, "grouping columns (default: one global group)"),
                required("aggregations", ObjectList, "[{func, column?, as?, delimiter?}]"),
            ]),
            entry!("pivot_wider", PivotWider, "One column per distinct value of a column, one row per key", [
                required("keys", StringList, "row keys"),
                required("column", String, "column whose values become column names"),
                optional("values", StringOrStringList, "value columns (default: all others)"),
                optional("agg", String, "aggregation for repeated cells (default \"first\")"),
            ]),
            entry!("pivot_longer", PivotLonger, "Unpivot columns into variable/value rows", [
                optional("id_vars", StringList, "columns kept on every row (default: none)"),
                optional("value_vars", StringList, "columns to unpivot (default: all non-id)"),
                optional("variable_name", String, "name column (default \"variable\")"),
                optional("value_name", String, "value column (default \"value\")"),
            ]),
            entry!("window_cumsum", WindowCumsum, "Running sum, optionally per partition", [
                required("column", String, "numeric column"),
                optional("partition_by", StringList, "partition columns (default: none)"),
                optional("as", String, "destination column (default \"<column>_cumsum\")"),
            ]),
            entry!("rank", Rank, "Rank values, optionally per partition", [
                required("column", String, "column to rank"),
                optional("method", String, "average|min|max|dense|ordinal (default \"ordinal\")"),
                optional("descending", Boolean, "rank largest first (default false)"),
                optional("partition_by", StringList, "partition columns (default: none)"),
                optional("as", String, "destination column (default \"<column>_rank\")"),
            ]),
            entry!("rolling_mean", RollingMean, "Mean over a sliding window of rows", [
                required("column", String, "numeric column"),
                optional("window", Integer, "window size, at least 1 (default 3)"),
                optional("as", String, "destination column (default \"<column>_rolling_mean\")"),
            ]),
            entry!("rolling_sum", RollingSum, "Sum over a sliding window of rows", [
                required("column", String, "numeric column"),
                optional("window", Integer, "window size, at least 1 (default 3)"),
                optional("as", String, "destination column (default \"<column>_rolling_sum\")"),
            ]),
        ];
        Self { entries }
    }

    pub fn version(&self) -> u32 {
        REGISTRY_VERSION
    }

    pub fn get(&self, name: &str) -> Option<&OpEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn entries(&self) -> &[OpEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|e| e.name)
    }

    /// Markdown table of every operation, for documentation and model prompts.
    pub fn operations_description(&self) -> String {
        let mut out = format!(
            "Available recipe operations (registry version {}):\n\n\
             | Operation | Description | Arguments |\n\
             |-----------|-------------|-----------|\n",
            self.version()
        );
        for entry in &self.entries {
            let args: Vec<String> = entry
                .args
                .iter()
                .map(|a| {
                    let marker = if a.required { "" } else { "?" };
                    format!("{}{}: {} ({})", a.name, marker, a.kind.as_str(), a.doc)
                })
                .collect();
            out.push_str(&format!("| {} | {} | {} |\n", entry.name, entry.summary, args.join("; ")));
        }
        out.push_str(
            r#"
Aggregation functions (group_by_agg, pivot_wider): count, sum, mean, min, max, first, last, n_unique, concat_str.
Input starts as one column "line" holding one row per non-empty input line.

Example recipe:
{"steps": [
  {"op": "regex_extract", "pattern": "^(\\w+)", "group": 1, "as": "name"},
  {"op": "regex_extract", "pattern": "\\d+$", "as": "n"},
  {"op": "cast", "mapping": {"n": "int"}},
  {"op": "sort_by", "columns": ["n"], "descending": true},
  {"op": "select", "columns": ["name", "n"]}
]}"#,
        );
        out
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Operations table of the built-in registry.
pub fn operations_description() -> String {
    StepRegistry::global().operations_description()
}
