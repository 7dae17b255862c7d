//! Grouped aggregation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::OpResult;
use crate::models::{Cell, CellKey, Table};

/// Aggregation functions for `group_by_agg`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggFunc {
    Count,
    Sum,
    Mean,
    Min,
    Max,
    First,
    Last,
    NUnique,
    ConcatStr,
}

impl AggFunc {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggFunc::Count => "count",
            AggFunc::Sum => "sum",
            AggFunc::Mean => "mean",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::First => "first",
            AggFunc::Last => "last",
            AggFunc::NUnique => "n_unique",
            AggFunc::ConcatStr => "concat_str",
        }
    }

    /// Reduce the given cells (one per row of the group).
    pub(super) fn reduce(&self, cells: &[&Cell], group_size: usize, delimiter: &str) -> Cell {
        match self {
            AggFunc::Count => Cell::Int(group_size as i64),
            AggFunc::Sum => sum(cells),
            AggFunc::Mean => {
                let numbers: Vec<f64> = cells.iter().filter_map(|c| c.as_f64()).collect();
                if numbers.is_empty() {
                    Cell::Null
                } else {
                    Cell::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
                }
            }
            AggFunc::Min => non_null(cells).min_by(|a, b| a.total_cmp(b)).cloned().unwrap_or(Cell::Null),
            AggFunc::Max => non_null(cells).max_by(|a, b| a.total_cmp(b)).cloned().unwrap_or(Cell::Null),
            AggFunc::First => cells.first().map(|c| (*c).clone()).unwrap_or(Cell::Null),
            AggFunc::Last => cells.last().map(|c| (*c).clone()).unwrap_or(Cell::Null),
            AggFunc::NUnique => {
                let distinct: HashSet<CellKey> = cells.iter().map(|c| c.key()).collect();
                Cell::Int(distinct.len() as i64)
            }
            AggFunc::ConcatStr => {
                let parts: Vec<String> = non_null(cells)
                    .filter_map(|c| c.as_text().map(|t| t.into_owned()))
                    .collect();
                Cell::Str(parts.join(delimiter))
            }
        }
    }
}

fn non_null<'a>(cells: &'a [&'a Cell]) -> impl Iterator<Item = &'a Cell> + 'a {
    cells.iter().copied().filter(|c| !c.is_null())
}

/// Integer sum while every value is an integer; float as soon as one is not.
pub(super) fn sum(cells: &[&Cell]) -> Cell {
    let mut int_total: Option<i64> = Some(0);
    let mut float_total = 0.0;
    for cell in cells {
        match cell {
            Cell::Null => {}
            Cell::Int(i) => {
                int_total = int_total.and_then(|t| t.checked_add(*i));
                float_total += *i as f64;
            }
            other => {
                if let Some(f) = other.as_f64() {
                    int_total = None;
                    float_total += f;
                }
            }
        }
    }
    match int_total {
        Some(total) => Cell::Int(total),
        None => Cell::Float(float_total),
    }
}

/// One output column of `group_by_agg`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AggregationSpec {
    pub func: AggFunc,
    /// Source column; optional only for `count`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Separator for `concat_str`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

impl AggregationSpec {
    /// `as`, or `count`, or `<column>_<func>`.
    pub fn output_name(&self) -> String {
        match (&self.alias, &self.column) {
            (Some(alias), _) => alias.clone(),
            (None, Some(column)) if self.func != AggFunc::Count => format!("{}_{}", column, self.func.as_str()),
            _ => self.func.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupByAggArgs {
    #[serde(default)]
    pub keys: Vec<String>,
    pub aggregations: Vec<AggregationSpec>,
}

impl GroupByAggArgs {
    pub(super) fn check(&self) -> Result<(), String> {
        super::non_empty("aggregations", &self.aggregations)?;
        super::unique_names("keys", &self.keys)?;
        for (i, agg) in self.aggregations.iter().enumerate() {
            if agg.column.is_none() && agg.func != AggFunc::Count {
                return Err(format!("aggregation {} ({}) requires 'column'", i, agg.func.as_str()));
            }
        }
        let outputs: Vec<String> = self
            .keys
            .iter()
            .cloned()
            .chain(self.aggregations.iter().map(AggregationSpec::output_name))
            .collect();
        super::unique_names("output columns", &outputs)
    }

    /// One row per distinct key, in order of first appearance. Without keys
    /// the whole table is a single group, so an empty table still yields one
    /// row.
    pub fn apply(&self, table: &Table) -> OpResult<Table> {
        let key_idx = table.require_columns(&self.keys)?;
        let agg_idx = self
            .aggregations
            .iter()
            .map(|agg| agg.column.as_deref().map(|c| table.require_column(c)).transpose())
            .collect::<OpResult<Vec<_>>>()?;

        let mut groups: IndexMap<Vec<CellKey>, Vec<usize>> = IndexMap::new();
        for (i, row) in table.rows().iter().enumerate() {
            let key = key_idx.iter().map(|&k| row[k].key()).collect();
            groups.entry(key).or_default().push(i);
        }
        if self.keys.is_empty() && groups.is_empty() {
            groups.insert(Vec::new(), Vec::new());
        }

        let mut columns = self.keys.clone();
        columns.extend(self.aggregations.iter().map(AggregationSpec::output_name));

        let rows = groups
            .values()
            .map(|members| {
                let mut out: Vec<Cell> = match members.first() {
                    Some(&first) => key_idx.iter().map(|&k| table.rows()[first][k].clone()).collect(),
                    None => Vec::new(),
                };
                for (agg, source) in self.aggregations.iter().zip(&agg_idx) {
                    let cells: Vec<&Cell> = match source {
                        Some(c) => members.iter().map(|&r| &table.rows()[r][*c]).collect(),
                        None => Vec::new(),
                    };
                    out.push(agg.func.reduce(&cells, members.len(), agg.delimiter.as_deref().unwrap_or("")));
                }
                out
            })
            .collect();

        Ok(Table::from_rows(columns, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{column, names, strings};
    use super::*;
    use serde_json::json;

    fn sales() -> Table {
        Table::from_rows(
            names(&["region", "amount", "rep"]),
            vec![
                vec![Cell::from("west"), Cell::Int(10), Cell::from("ann")],
                vec![Cell::from("east"), Cell::Int(5), Cell::from("bo")],
                vec![Cell::from("west"), Cell::Float(2.5), Cell::from("cy")],
                vec![Cell::from("east"), Cell::Null, Cell::from("bo")],
            ],
        )
    }

    #[test]
    fn test_groups_in_first_appearance_order() {
        let args: GroupByAggArgs = serde_json::from_value(json!({
            "keys": ["region"],
            "aggregations": [
                {"func": "count"},
                {"func": "sum", "column": "amount"},
                {"func": "n_unique", "column": "rep", "as": "reps"},
                {"func": "concat_str", "column": "rep", "delimiter": "|"}
            ]
        }))
        .unwrap();
        args.check().unwrap();
        let out = args.apply(&sales()).unwrap();
        assert_eq!(out.columns(), &["region", "count", "amount_sum", "reps", "rep_concat_str"]);
        assert_eq!(column(&out, "region"), strings(&[Some("west"), Some("east")]));
        assert_eq!(column(&out, "count"), vec![Cell::Int(2), Cell::Int(2)]);
        assert_eq!(column(&out, "amount_sum"), vec![Cell::Float(12.5), Cell::Int(5)]);
        assert_eq!(column(&out, "reps"), vec![Cell::Int(2), Cell::Int(1)]);
        assert_eq!(column(&out, "rep_concat_str"), strings(&[Some("ann|cy"), Some("bo|bo")]));
    }

    #[test]
    fn test_global_aggregation() {
        let args: GroupByAggArgs = serde_json::from_value(json!({
            "aggregations": [
                {"func": "mean", "column": "amount"},
                {"func": "min", "column": "amount"},
                {"func": "max", "column": "amount"},
                {"func": "last", "column": "rep"}
            ]
        }))
        .unwrap();
        let out = args.apply(&sales()).unwrap();
        assert_eq!(out.row_count(), 1);
        assert_eq!(
            out.rows()[0],
            vec![Cell::Float(17.5 / 3.0), Cell::Float(2.5), Cell::Int(10), Cell::from("bo")]
        );
    }

    #[test]
    fn test_global_aggregation_of_empty_table() {
        let args: GroupByAggArgs = serde_json::from_value(json!({"aggregations": [{"func": "count"}]})).unwrap();
        let out = args.apply(&Table::new(names(&["line"]))).unwrap();
        assert_eq!(out.rows(), &[vec![Cell::Int(0)]]);
    }

    #[test]
    fn test_check_rejects_missing_column_and_clashes() {
        let args: GroupByAggArgs =
            serde_json::from_value(json!({"aggregations": [{"func": "sum"}]})).unwrap();
        assert!(args.check().is_err());

        let args: GroupByAggArgs = serde_json::from_value(json!({
            "keys": ["count"],
            "aggregations": [{"func": "count"}]
        }))
        .unwrap();
        assert!(args.check().is_err());
    }
}
