//! Reshaping between long and wide layouts.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use super::aggregate::AggFunc;
use crate::error::{OpError, OpResult};
use crate::models::{Cell, CellKey, Table};
use crate::transform::dsl::executor::Budget;

/// Columns not named in `excluded`, in table order.
fn remaining_columns(table: &Table, excluded: &[&str]) -> Vec<String> {
    table
        .columns()
        .iter()
        .filter(|c| !excluded.contains(&c.as_str()))
        .cloned()
        .collect()
}

// =============================================================================
// Wide
// =============================================================================

/// `values` of `pivot_wider`: one column name or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PivotValues {
    One(String),
    Many(Vec<String>),
}

impl Default for PivotValues {
    fn default() -> Self {
        PivotValues::Many(Vec::new())
    }
}

impl PivotValues {
    pub fn names(&self) -> &[String] {
        match self {
            PivotValues::One(name) => std::slice::from_ref(name),
            PivotValues::Many(names) => names,
        }
    }
}

fn default_first() -> AggFunc {
    AggFunc::First
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PivotWiderArgs {
    pub keys: Vec<String>,
    pub column: String,
    #[serde(default)]
    pub values: PivotValues,
    #[serde(default = "default_first")]
    pub agg: AggFunc,
}

impl PivotWiderArgs {
    pub(super) fn check(&self) -> Result<(), String> {
        super::non_empty("keys", &self.keys)?;
        super::unique_names("keys", &self.keys)?;
        super::unique_names("values", self.values.names())?;
        if self.keys.contains(&self.column) {
            return Err(format!("'column' '{}' is also a key", self.column));
        }
        match self.values.names().iter().find(|v| **v == self.column || self.keys.contains(*v)) {
            Some(v) => Err(format!("'values' lists '{}', which is the pivot column or a key", v)),
            None => Ok(()),
        }
    }

    /// One row per distinct key and one column per distinct value of
    /// `column`, both in order of first appearance. With one value column the
    /// new columns are named after the pivot values, otherwise
    /// `<value>_<pivot>`. Missing combinations are null. Every output cell
    /// counts as a row operation.
    pub fn apply(&self, table: &Table, budget: &mut Budget) -> OpResult<Table> {
        let key_idx = table.require_columns(&self.keys)?;
        let pivot_idx = table.require_column(&self.column)?;
        let value_names = match self.values.names() {
            [] => {
                let mut excluded: Vec<&str> = self.keys.iter().map(String::as_str).collect();
                excluded.push(&self.column);
                remaining_columns(table, &excluded)
            }
            listed => listed.to_vec(),
        };
        let value_idx = table.require_columns(&value_names)?;

        let mut labels: IndexMap<CellKey, String> = IndexMap::new();
        let mut groups: IndexMap<Vec<CellKey>, (usize, HashMap<CellKey, Vec<usize>>)> = IndexMap::new();
        for (i, row) in table.rows().iter().enumerate() {
            let pivot = row[pivot_idx].key();
            labels
                .entry(pivot.clone())
                .or_insert_with(|| row[pivot_idx].as_text().map_or_else(|| "null".to_string(), |t| t.into_owned()));
            let key = key_idx.iter().map(|&k| row[k].key()).collect();
            groups
                .entry(key)
                .or_insert_with(|| (i, HashMap::new()))
                .1
                .entry(pivot)
                .or_default()
                .push(i);
        }

        let mut columns = self.keys.clone();
        for name in &value_names {
            for label in labels.values() {
                columns.push(if value_names.len() == 1 {
                    label.clone()
                } else {
                    format!("{}_{}", name, label)
                });
            }
        }
        let mut seen = HashSet::with_capacity(columns.len());
        if let Some(dup) = columns.iter().find(|c| !seen.insert(c.as_str())) {
            return Err(OpError::DuplicateColumn { column: dup.clone() });
        }
        budget.charge_rows(groups.len().saturating_mul(columns.len()))?;

        let rows = groups
            .values()
            .map(|(first, cells)| {
                let mut out: Vec<Cell> = key_idx.iter().map(|&k| table.rows()[*first][k].clone()).collect();
                for &v in &value_idx {
                    for pivot in labels.keys() {
                        out.push(match cells.get(pivot) {
                            Some(members) => {
                                let picked: Vec<&Cell> = members.iter().map(|&r| &table.rows()[r][v]).collect();
                                self.agg.reduce(&picked, members.len(), "")
                            }
                            None => Cell::Null,
                        });
                    }
                }
                out
            })
            .collect();

        Ok(Table::from_rows(columns, rows))
    }
}

// =============================================================================
// Long
// =============================================================================

fn default_variable_name() -> String {
    "variable".to_string()
}

fn default_value_name() -> String {
    "value".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PivotLongerArgs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub id_vars: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_vars: Vec<String>,
    #[serde(default = "default_variable_name")]
    pub variable_name: String,
    #[serde(default = "default_value_name")]
    pub value_name: String,
}

impl PivotLongerArgs {
    pub(super) fn check(&self) -> Result<(), String> {
        super::unique_names("id_vars", &self.id_vars)?;
        if self.variable_name == self.value_name {
            return Err(format!("'variable_name' and 'value_name' are both '{}'", self.value_name));
        }
        match [&self.variable_name, &self.value_name].into_iter().find(|n| self.id_vars.contains(*n)) {
            Some(n) => Err(format!("'{}' is already an id column", n)),
            None => Ok(()),
        }
    }

    /// Unpivot `value_vars` (default: every non-id column) into
    /// `variable`/`value` pairs. Rows are ordered by value column first, then
    /// by input row.
    pub fn apply(&self, table: &Table, budget: &mut Budget) -> OpResult<Table> {
        let id_idx = table.require_columns(&self.id_vars)?;
        let value_names = if self.value_vars.is_empty() {
            let excluded: Vec<&str> = self.id_vars.iter().map(String::as_str).collect();
            remaining_columns(table, &excluded)
        } else {
            self.value_vars.clone()
        };
        let value_idx = table.require_columns(&value_names)?;

        let total = table.row_count().saturating_mul(value_idx.len());
        budget.check_table_rows(total)?;
        budget.charge_rows(total)?;

        let mut columns = self.id_vars.clone();
        columns.push(self.variable_name.clone());
        columns.push(self.value_name.clone());

        let mut rows = Vec::with_capacity(total);
        for (name, &v) in value_names.iter().zip(&value_idx) {
            for row in table.rows() {
                let mut out: Vec<Cell> = id_idx.iter().map(|&i| row[i].clone()).collect();
                out.push(Cell::from(name.as_str()));
                out.push(row[v].clone());
                rows.push(out);
            }
        }
        Ok(Table::from_rows(columns, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{budget, column, names, strings};
    use super::*;
    use crate::config::ExecutionLimits;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn readings() -> Table {
        Table::from_rows(
            names(&["site", "metric", "v"]),
            vec![
                vec![Cell::from("n1"), Cell::from("temp"), Cell::Int(20)],
                vec![Cell::from("n1"), Cell::from("hum"), Cell::Int(40)],
                vec![Cell::from("n2"), Cell::from("temp"), Cell::Int(18)],
                vec![Cell::from("n1"), Cell::from("temp"), Cell::Int(22)],
            ],
        )
    }

    #[test]
    fn test_pivot_wider_single_value() {
        let args: PivotWiderArgs =
            serde_json::from_value(json!({"keys": ["site"], "column": "metric", "values": "v", "agg": "sum"})).unwrap();
        args.check().unwrap();
        let out = args.apply(&readings(), &mut budget()).unwrap();
        assert_eq!(out.columns(), &["site", "temp", "hum"]);
        assert_eq!(out.rows()[0], vec![Cell::from("n1"), Cell::Int(42), Cell::Int(40)]);
        assert_eq!(out.rows()[1], vec![Cell::from("n2"), Cell::Int(18), Cell::Null]);
    }

    #[test]
    fn test_pivot_wider_defaults_to_first_of_remaining_columns() {
        let t = readings().with_column("unit", strings(&[Some("c"), Some("%"), Some("c"), Some("f")]));
        let args: PivotWiderArgs = serde_json::from_value(json!({"keys": ["site"], "column": "metric"})).unwrap();
        let out = args.apply(&t, &mut budget()).unwrap();
        assert_eq!(out.columns(), &["site", "v_temp", "v_hum", "unit_temp", "unit_hum"]);
        assert_eq!(column(&out, "v_temp"), vec![Cell::Int(20), Cell::Int(18)]);
        assert_eq!(column(&out, "unit_temp"), strings(&[Some("c"), Some("c")]));
    }

    #[test]
    fn test_pivot_wider_rejects_clashing_names() {
        let t = Table::from_rows(
            names(&["site", "metric", "v"]),
            vec![vec![Cell::from("n1"), Cell::from("site"), Cell::Int(1)]],
        );
        let args: PivotWiderArgs =
            serde_json::from_value(json!({"keys": ["site"], "column": "metric", "values": ["v"]})).unwrap();
        let err = args.apply(&t, &mut budget()).unwrap_err();
        assert_eq!(err, OpError::DuplicateColumn { column: "site".into() });
        assert_eq!(err.kind(), ErrorKind::InvalidArgumentType);

        let args: PivotWiderArgs =
            serde_json::from_value(json!({"keys": ["site"], "column": "site"})).unwrap();
        assert!(args.check().is_err());
    }

    #[test]
    fn test_pivot_longer() {
        let t = Table::from_rows(
            names(&["id", "q1", "q2"]),
            vec![
                vec![Cell::from("a"), Cell::Int(1), Cell::Int(2)],
                vec![Cell::from("b"), Cell::Int(3), Cell::Null],
            ],
        );
        let args: PivotLongerArgs =
            serde_json::from_value(json!({"id_vars": ["id"], "variable_name": "quarter"})).unwrap();
        args.check().unwrap();
        let out = args.apply(&t, &mut budget()).unwrap();
        assert_eq!(out.columns(), &["id", "quarter", "value"]);
        assert_eq!(column(&out, "id"), strings(&[Some("a"), Some("b"), Some("a"), Some("b")]));
        assert_eq!(column(&out, "quarter"), strings(&[Some("q1"), Some("q1"), Some("q2"), Some("q2")]));
        assert_eq!(column(&out, "value"), vec![Cell::Int(1), Cell::Int(3), Cell::Int(2), Cell::Null]);
    }

    #[test]
    fn test_pivot_longer_checks_growth_first() {
        let t = Table::from_rows(
            names(&["a", "b", "c"]),
            vec![vec![Cell::Int(1), Cell::Int(2), Cell::Int(3)]; 2],
        );
        let mut budget = Budget::new(ExecutionLimits {
            max_rows: 5,
            ..ExecutionLimits::default()
        });
        let err = PivotLongerArgs {
            id_vars: Vec::new(),
            value_vars: Vec::new(),
            variable_name: default_variable_name(),
            value_name: default_value_name(),
        }
        .apply(&t, &mut budget)
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExceeded);
        assert_eq!(budget.row_operations(), 0);
    }

    #[test]
    fn test_pivot_longer_name_checks() {
        let args: PivotLongerArgs =
            serde_json::from_value(json!({"variable_name": "x", "value_name": "x"})).unwrap();
        assert!(args.check().is_err());
        let args: PivotLongerArgs = serde_json::from_value(json!({"id_vars": ["value"]})).unwrap();
        assert!(args.check().is_err());
    }
}
