//! Row-level operations: filtering, slicing, ordering and row explosion.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;

use super::{default_comma, default_true};
use crate::error::OpResult;
use crate::models::{Cell, CellKey, Table};
use crate::transform::dsl::executor::Budget;

// =============================================================================
// Filtering
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterEqArgs {
    pub column: String,
    pub value: Value,
}

impl FilterEqArgs {
    /// Keeps rows equal to `value`. Integers and floats compare numerically;
    /// a null `value` keeps null cells.
    pub fn apply(&self, table: &Table) -> OpResult<Table> {
        let idx = table.require_column(&self.column)?;
        let target = Cell::from_json(&self.value).unwrap_or(Cell::Null);
        Ok(table.filter_rows(|_, row| row[idx].loose_eq(&target)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropNaArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

impl DropNaArgs {
    /// Drops rows with a null in any listed column, or any column at all.
    pub fn apply(&self, table: &Table) -> OpResult<Table> {
        let indices = match &self.columns {
            Some(columns) => table.require_columns(columns)?,
            None => (0..table.column_count()).collect(),
        };
        Ok(table.filter_rows(|_, row| indices.iter().all(|&i| !row[i].is_null())))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistinctArgs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

impl DistinctArgs {
    /// Keeps the first row of each distinct key, in input order.
    pub fn apply(&self, table: &Table) -> OpResult<Table> {
        let indices = match &self.columns {
            Some(columns) => table.require_columns(columns)?,
            None => (0..table.column_count()).collect(),
        };
        let mut seen: HashSet<Vec<CellKey>> = HashSet::with_capacity(table.row_count());
        Ok(table.filter_rows(|_, row| seen.insert(indices.iter().map(|&i| row[i].key()).collect())))
    }
}

// =============================================================================
// Slicing
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SliceArgs {
    #[serde(default)]
    pub offset: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,
}

impl SliceArgs {
    pub fn apply(&self, table: &Table) -> Table {
        let end = match self.length {
            Some(len) => self.offset.saturating_add(len),
            None => usize::MAX,
        };
        table.filter_rows(|i, _| i >= self.offset && i < end)
    }
}

fn default_five() -> usize {
    5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeadArgs {
    #[serde(default = "default_five")]
    pub n: usize,
}

impl HeadArgs {
    pub fn apply(&self, table: &Table) -> Table {
        table.filter_rows(|i, _| i < self.n)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TailArgs {
    #[serde(default = "default_five")]
    pub n: usize,
}

impl TailArgs {
    pub fn apply(&self, table: &Table) -> Table {
        let start = table.row_count().saturating_sub(self.n);
        table.filter_rows(|i, _| i >= start)
    }
}

fn default_one() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TakeEveryArgs {
    #[serde(default = "default_one")]
    pub n: usize,
    #[serde(default)]
    pub offset: usize,
}

impl TakeEveryArgs {
    /// Rows whose index is congruent to `offset` modulo `n`, so rows before
    /// `offset` are kept when `offset >= n`. `n` is at least 1 once validated.
    pub fn apply(&self, table: &Table) -> Table {
        let n = self.n.max(1);
        let phase = self.offset % n;
        table.filter_rows(|i, _| i % n == phase)
    }
}

// =============================================================================
// Ordering
// =============================================================================

/// Sort direction: one flag for every column, or one per column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Descending {
    All(bool),
    PerColumn(Vec<bool>),
}

impl Default for Descending {
    fn default() -> Self {
        Descending::All(false)
    }
}

impl Descending {
    fn for_column(&self, position: usize) -> bool {
        match self {
            Descending::All(d) => *d,
            Descending::PerColumn(flags) => flags.get(position).copied().unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SortByArgs {
    pub columns: Vec<String>,
    #[serde(default)]
    pub descending: Descending,
}

impl SortByArgs {
    pub(super) fn check(&self) -> Result<(), String> {
        super::non_empty("columns", &self.columns)?;
        match &self.descending {
            Descending::PerColumn(flags) if flags.len() != self.columns.len() => Err(format!(
                "'descending' has {} flag(s) for {} column(s)",
                flags.len(),
                self.columns.len()
            )),
            _ => Ok(()),
        }
    }

    /// Stable sort. Nulls sort first whatever the direction.
    pub fn apply(&self, table: &Table) -> OpResult<Table> {
        let indices = table.require_columns(&self.columns)?;
        let mut rows = table.rows().to_vec();
        rows.sort_by(|a, b| {
            for (pos, &i) in indices.iter().enumerate() {
                let ord = match (a[i].is_null(), b[i].is_null()) {
                    (true, true) => Ordering::Equal,
                    (true, false) => Ordering::Less,
                    (false, true) => Ordering::Greater,
                    (false, false) if self.descending.for_column(pos) => a[i].total_cmp(&b[i]).reverse(),
                    (false, false) => a[i].total_cmp(&b[i]),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        Ok(table.with_rows(rows))
    }
}

// =============================================================================
// Explosion
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitToRowsArgs {
    pub column: String,
    #[serde(default = "default_comma")]
    pub delimiter: String,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default = "default_true")]
    pub drop_original: bool,
}

impl SplitToRowsArgs {
    /// One output row per part. A null value yields a single row with a null
    /// part. Parts are counted against the row limit before any row is built.
    pub fn apply(&self, table: &Table, budget: &mut Budget) -> OpResult<Table> {
        let src = table.require_column(&self.column)?;
        let target = self.alias.as_deref().unwrap_or(&self.column);
        let drop_src = self.drop_original && target != self.column;

        // Source positions carried into every output row.
        let carried: Vec<usize> = (0..table.column_count()).filter(|&i| !(drop_src && i == src)).collect();
        let mut columns: Vec<String> = carried.iter().map(|&i| table.columns()[i].clone()).collect();
        let target_idx = match columns.iter().position(|c| c == target) {
            Some(i) => i,
            None => {
                columns.push(target.to_string());
                columns.len() - 1
            }
        };

        let mut rows = Vec::with_capacity(table.row_count());
        for row in table.rows() {
            let text = row[src].as_text();
            let count = text.as_deref().map_or(1, |t| t.split(self.delimiter.as_str()).count());
            budget.check_table_rows(rows.len().saturating_add(count))?;
            budget.charge_rows(count)?;

            let mut base: Vec<Cell> = carried.iter().map(|&i| row[i].clone()).collect();
            base.resize(columns.len(), Cell::Null);
            let mut emit = |part: Cell| {
                let mut out = base.clone();
                out[target_idx] = part;
                rows.push(out);
            };
            match text.as_deref() {
                None => emit(Cell::Null),
                Some(t) => t.split(self.delimiter.as_str()).map(Cell::from).for_each(&mut emit),
            }
        }

        Ok(Table::from_rows(columns, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{budget, column, names, strings, table};
    use super::*;
    use crate::config::ExecutionLimits;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn numbered() -> Table {
        table(
            &["n"],
            &[&[Some("0")], &[Some("1")], &[Some("2")], &[Some("3")], &[Some("4")], &[Some("5")]],
        )
    }

    #[test]
    fn test_filter_eq_numeric_and_null() {
        let t = Table::from_rows(
            names(&["v"]),
            vec![vec![Cell::Int(3)], vec![Cell::Float(3.0)], vec![Cell::Null], vec![Cell::from("3")]],
        );
        let args = FilterEqArgs {
            column: "v".into(),
            value: json!(3),
        };
        assert_eq!(args.apply(&t).unwrap().row_count(), 2);

        let args = FilterEqArgs {
            column: "v".into(),
            value: Value::Null,
        };
        assert_eq!(column(&args.apply(&t).unwrap(), "v"), vec![Cell::Null]);
    }

    #[test]
    fn test_drop_na_and_distinct() {
        let t = table(
            &["a", "b"],
            &[&[Some("x"), Some("1")], &[Some("x"), Some("1")], &[Some("y"), None], &[Some("x"), Some("2")]],
        );
        assert_eq!(DropNaArgs { columns: None }.apply(&t).unwrap().row_count(), 3);

        let out = DistinctArgs { columns: None }.apply(&t).unwrap();
        assert_eq!(out.row_count(), 3);

        let out = DistinctArgs {
            columns: Some(names(&["a"])),
        }
        .apply(&t)
        .unwrap();
        assert_eq!(column(&out, "b"), strings(&[Some("1"), None]));
    }

    #[test]
    fn test_slicing() {
        let t = numbered();
        let slice = SliceArgs {
            offset: 4,
            length: Some(10),
        };
        assert_eq!(column(&slice.apply(&t), "n"), strings(&[Some("4"), Some("5")]));
        assert_eq!(HeadArgs { n: 2 }.apply(&t).row_count(), 2);
        assert_eq!(column(&TailArgs { n: 2 }.apply(&t), "n"), strings(&[Some("4"), Some("5")]));
        assert_eq!(TailArgs { n: 100 }.apply(&t).row_count(), 6);

        let every = TakeEveryArgs { n: 2, offset: 1 };
        assert_eq!(column(&every.apply(&t), "n"), strings(&[Some("1"), Some("3"), Some("5")]));
    }

    #[test]
    fn test_take_every_offset_wraps_around_n() {
        let every = TakeEveryArgs { n: 2, offset: 3 };
        assert_eq!(
            column(&every.apply(&numbered()), "n"),
            strings(&[Some("1"), Some("3"), Some("5")])
        );
        let every = TakeEveryArgs { n: 4, offset: 9 };
        assert_eq!(column(&every.apply(&numbered()), "n"), strings(&[Some("1"), Some("5")]));
    }

    #[test]
    fn test_sort_by_mixed_directions() {
        let t = Table::from_rows(
            names(&["g", "v"]),
            vec![
                vec![Cell::from("b"), Cell::Int(1)],
                vec![Cell::from("a"), Cell::Int(1)],
                vec![Cell::from("a"), Cell::Int(5)],
                vec![Cell::Null, Cell::Int(0)],
            ],
        );
        let args: SortByArgs =
            serde_json::from_value(json!({"columns": ["g", "v"], "descending": [false, true]})).unwrap();
        let out = args.apply(&t).unwrap();
        assert_eq!(
            column(&out, "v"),
            vec![Cell::Int(0), Cell::Int(5), Cell::Int(1), Cell::Int(1)]
        );
        assert_eq!(out.value(3, "g"), Some(&Cell::from("b")));
    }

    #[test]
    fn test_sort_by_keeps_nulls_first_when_descending() {
        let t = table(&["n"], &[&[Some("1")], &[None], &[Some("2")]]);
        let args: SortByArgs = serde_json::from_value(json!({"columns": ["n"], "descending": true})).unwrap();
        assert_eq!(column(&args.apply(&t).unwrap(), "n"), strings(&[None, Some("2"), Some("1")]));

        let args: SortByArgs = serde_json::from_value(json!({"columns": ["n"]})).unwrap();
        assert_eq!(column(&args.apply(&t).unwrap(), "n"), strings(&[None, Some("1"), Some("2")]));
    }

    #[test]
    fn test_sort_by_flag_count_checked() {
        let args: SortByArgs =
            serde_json::from_value(json!({"columns": ["g"], "descending": [true, false]})).unwrap();
        assert!(args.check().is_err());
    }

    #[test]
    fn test_split_to_rows() {
        let t = table(&["id", "tags"], &[&[Some("1"), Some("a,b")], &[Some("2"), None]]);
        let args: SplitToRowsArgs = serde_json::from_value(json!({"column": "tags", "as": "tag"})).unwrap();
        let out = args.apply(&t, &mut budget()).unwrap();
        assert_eq!(out.columns(), &["id", "tag"]);
        assert_eq!(column(&out, "id"), strings(&[Some("1"), Some("1"), Some("2")]));
        assert_eq!(column(&out, "tag"), strings(&[Some("a"), Some("b"), None]));
    }

    #[test]
    fn test_split_to_rows_respects_row_limit() {
        let t = table(&["line"], &[&[Some("a,b,c,d")]]);
        let mut budget = Budget::new(ExecutionLimits {
            max_rows: 3,
            ..ExecutionLimits::default()
        });
        let args: SplitToRowsArgs = serde_json::from_value(json!({"column": "line"})).unwrap();
        let err = args.apply(&t, &mut budget).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExceeded);
    }

    #[test]
    fn test_split_to_rows_stops_before_building_a_huge_line() {
        let line = ",".repeat(200_000);
        let t = table(&["line"], &[&[Some(line.as_str())]]);
        let mut budget = Budget::new(ExecutionLimits {
            max_rows: 2,
            ..ExecutionLimits::default()
        });
        let args: SplitToRowsArgs = serde_json::from_value(json!({"column": "line", "as": "part"})).unwrap();
        let err = args.apply(&t, &mut budget).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExceeded);
        // Nothing was charged: the limit fired on the part count alone.
        assert_eq!(budget.row_operations(), 0);
    }

    #[test]
    fn test_split_to_rows_charges_parts() {
        let t = table(&["line"], &[&[Some("a,b,c")], &[None]]);
        let mut budget = budget();
        let args: SplitToRowsArgs = serde_json::from_value(json!({"column": "line"})).unwrap();
        let out = args.apply(&t, &mut budget).unwrap();
        assert_eq!(column(&out, "line"), strings(&[Some("a"), Some("b"), Some("c"), None]));
        assert_eq!(budget.row_operations(), 4);
    }
}
