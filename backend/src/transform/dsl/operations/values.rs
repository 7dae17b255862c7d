//! Value mapping operations.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::error::OpResult;
use crate::models::{Cell, CellKey, Table};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplaceValuesArgs {
    pub column: String,
    /// Text value to replacement. Unmapped values pass through.
    pub mapping: IndexMap<String, Value>,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl ReplaceValuesArgs {
    pub fn apply(&self, table: &Table) -> OpResult<Table> {
        let idx = table.require_column(&self.column)?;
        let values = table
            .rows()
            .iter()
            .map(|row| {
                let cell = &row[idx];
                cell.as_text()
                    .and_then(|text| self.mapping.get(&*text))
                    .and_then(Cell::from_json)
                    .unwrap_or_else(|| cell.clone())
            })
            .collect();
        let target = self.alias.as_deref().unwrap_or(&self.column);
        Ok(table.with_column(target, values))
    }
}

fn default_key_field() -> String {
    "key".to_string()
}

fn default_value_field() -> String {
    "value".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupArgs {
    /// Column whose values are looked up.
    pub on: String,
    /// Inline reference table: one object per entry.
    pub table: Vec<Map<String, Value>>,
    #[serde(default = "default_key_field")]
    pub key_field: String,
    #[serde(default = "default_value_field")]
    pub value_field: String,
    /// Used when no entry matches; the original value is kept otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl LookupArgs {
    pub(super) fn check(&self) -> Result<(), String> {
        super::non_empty("table", &self.table)?;
        for (i, entry) in self.table.iter().enumerate() {
            for field in [&self.key_field, &self.value_field] {
                match entry.get(field.as_str()) {
                    None => return Err(format!("'table' entry {} has no '{}' field", i, field)),
                    Some(v) if v.is_array() || v.is_object() => {
                        return Err(format!("'table' entry {} field '{}' must be a scalar", i, field))
                    }
                    Some(_) => {}
                }
            }
        }
        if matches!(&self.default, Some(v) if v.is_array() || v.is_object()) {
            return Err("'default' must be a scalar".to_string());
        }
        Ok(())
    }

    /// Later entries win on duplicate keys.
    fn index(&self) -> HashMap<CellKey, Cell> {
        self.table
            .iter()
            .filter_map(|entry| {
                let key = Cell::from_json(entry.get(self.key_field.as_str())?)?;
                let value = Cell::from_json(entry.get(self.value_field.as_str())?)?;
                Some((key.key(), value))
            })
            .collect()
    }

    pub fn apply(&self, table: &Table) -> OpResult<Table> {
        let idx = table.require_column(&self.on)?;
        let index = self.index();
        let fallback = self.default.as_ref().and_then(Cell::from_json);
        let values = table
            .rows()
            .iter()
            .map(|row| {
                let cell = &row[idx];
                index
                    .get(&cell.key())
                    .cloned()
                    .or_else(|| fallback.clone())
                    .unwrap_or_else(|| cell.clone())
            })
            .collect();
        let target = self.alias.as_deref().unwrap_or(&self.on);
        Ok(table.with_column(target, values))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{column, strings, table};
    use super::*;
    use serde_json::json;

    #[test]
    fn test_replace_values() {
        let t = table(&["s"], &[&[Some("y")], &[Some("n")], &[Some("?")], &[None]]);
        let args: ReplaceValuesArgs =
            serde_json::from_value(json!({"column": "s", "mapping": {"y": true, "n": false}, "as": "flag"}))
                .unwrap();
        let out = args.apply(&t).unwrap();
        assert_eq!(
            column(&out, "flag"),
            vec![Cell::Bool(true), Cell::Bool(false), Cell::from("?"), Cell::Null]
        );
    }

    #[test]
    fn test_lookup_with_default() {
        let t = table(&["code"], &[&[Some("FR")], &[Some("DE")], &[Some("XX")]]);
        let args: LookupArgs = serde_json::from_value(json!({
            "on": "code",
            "table": [
                {"key": "FR", "value": "France"},
                {"key": "DE", "value": "Germany"}
            ],
            "default": "unknown",
            "as": "country"
        }))
        .unwrap();
        args.check().unwrap();
        let out = args.apply(&t).unwrap();
        assert_eq!(
            column(&out, "country"),
            strings(&[Some("France"), Some("Germany"), Some("unknown")])
        );
        assert_eq!(column(&out, "code"), strings(&[Some("FR"), Some("DE"), Some("XX")]));
    }

    #[test]
    fn test_lookup_custom_fields_keep_unmatched() {
        let t = table(&["c"], &[&[Some("a")], &[Some("b")]]);
        let args: LookupArgs = serde_json::from_value(json!({
            "on": "c",
            "table": [{"k": "a", "v": 1}],
            "key_field": "k",
            "value_field": "v"
        }))
        .unwrap();
        let out = args.apply(&t).unwrap();
        assert_eq!(column(&out, "c"), vec![Cell::Int(1), Cell::from("b")]);
    }

    #[test]
    fn test_lookup_entries_checked() {
        let args: LookupArgs =
            serde_json::from_value(json!({"on": "c", "table": [{"key": "a"}]})).unwrap();
        assert!(args.check().unwrap_err().contains("'value'"));
    }
}
