//! Window operations: running sums, ranks and rolling aggregates.
//!
//! Each writes one new column and keeps every row in place.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::aggregate::sum as sum_cells;
use crate::error::OpResult;
use crate::models::{Cell, CellKey, Table};
use crate::transform::dsl::executor::Budget;

/// Row positions grouped by their `by` key, in order of first appearance.
/// Without keys the whole table is one partition.
fn partitions(table: &Table, by: &[usize]) -> Vec<Vec<usize>> {
    if by.is_empty() {
        return vec![(0..table.row_count()).collect()];
    }
    let mut groups: IndexMap<Vec<CellKey>, Vec<usize>> = IndexMap::new();
    for (i, row) in table.rows().iter().enumerate() {
        let key = by.iter().map(|&k| row[k].key()).collect();
        groups.entry(key).or_default().push(i);
    }
    groups.into_values().collect()
}

fn output_name(alias: Option<&str>, column: &str, suffix: &str) -> String {
    alias.map_or_else(|| format!("{}_{}", column, suffix), str::to_string)
}

// =============================================================================
// Cumulative sum
// =============================================================================

/// Running total that stays integral until a float (or overflow) shows up.
#[derive(Debug, Clone, Copy)]
enum Total {
    Int(i64),
    Float(f64),
}

impl Total {
    fn as_f64(self) -> f64 {
        match self {
            Total::Int(i) => i as f64,
            Total::Float(f) => f,
        }
    }

    /// Add `cell` and return the new total, or null when `cell` has no number.
    fn add(&mut self, cell: &Cell) -> Cell {
        let next = match (*self, cell) {
            (_, Cell::Null) => return Cell::Null,
            (Total::Int(t), Cell::Int(i)) => t.checked_add(*i).map_or(Total::Float(t as f64 + *i as f64), Total::Int),
            (total, other) => match other.as_f64() {
                Some(f) => Total::Float(total.as_f64() + f),
                None => return Cell::Null,
            },
        };
        *self = next;
        match next {
            Total::Int(i) => Cell::Int(i),
            Total::Float(f) => Cell::Float(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowCumsumArgs {
    pub column: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partition_by: Vec<String>,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl WindowCumsumArgs {
    /// Running sum per partition. Null and non-numeric cells yield null and
    /// leave the total unchanged.
    pub fn apply(&self, table: &Table) -> OpResult<Table> {
        let src = table.require_column(&self.column)?;
        let by = table.require_columns(&self.partition_by)?;

        let mut values = vec![Cell::Null; table.row_count()];
        for members in partitions(table, &by) {
            let mut total = Total::Int(0);
            for r in members {
                values[r] = total.add(&table.rows()[r][src]);
            }
        }
        Ok(table.with_column(&output_name(self.alias.as_deref(), &self.column, "cumsum"), values))
    }
}

// =============================================================================
// Rank
// =============================================================================

/// How tied values are ranked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankMethod {
    /// Mean of the tied positions, as a float.
    Average,
    Min,
    Max,
    /// Ties share a rank and the next value takes the next integer.
    Dense,
    /// Ties ranked by order of appearance.
    #[default]
    Ordinal,
}

impl RankMethod {
    /// Rank of the tie at `pos` within the run `start..end` (0-based positions).
    fn rank(&self, start: usize, end: usize, pos: usize, dense: usize) -> Cell {
        match self {
            RankMethod::Average => Cell::Float((start + 1 + end) as f64 / 2.0),
            RankMethod::Min => Cell::Int(start as i64 + 1),
            RankMethod::Max => Cell::Int(end as i64),
            RankMethod::Dense => Cell::Int(dense as i64),
            RankMethod::Ordinal => Cell::Int(pos as i64 + 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RankArgs {
    pub column: String,
    #[serde(default)]
    pub method: RankMethod,
    #[serde(default)]
    pub descending: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub partition_by: Vec<String>,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl RankArgs {
    /// 1-based rank within each partition. Nulls get no rank.
    pub fn apply(&self, table: &Table) -> OpResult<Table> {
        let src = table.require_column(&self.column)?;
        let by = table.require_columns(&self.partition_by)?;
        let rows = table.rows();
        let cmp = |a: usize, b: usize| {
            let ord = rows[a][src].total_cmp(&rows[b][src]);
            if self.descending {
                ord.reverse()
            } else {
                ord
            }
        };

        let mut values = vec![Cell::Null; table.row_count()];
        for members in partitions(table, &by) {
            let mut ranked: Vec<usize> = members.into_iter().filter(|&r| !rows[r][src].is_null()).collect();
            ranked.sort_by(|&a, &b| cmp(a, b));

            let mut start = 0;
            let mut dense = 0;
            while start < ranked.len() {
                let mut end = start + 1;
                while end < ranked.len() && cmp(ranked[start], ranked[end]) == Ordering::Equal {
                    end += 1;
                }
                dense += 1;
                for (pos, &r) in ranked.iter().enumerate().take(end).skip(start) {
                    values[r] = self.method.rank(start, end, pos, dense);
                }
                start = end;
            }
        }
        Ok(table.with_column(&output_name(self.alias.as_deref(), &self.column, "rank"), values))
    }
}

// =============================================================================
// Rolling aggregates
// =============================================================================

fn default_window() -> usize {
    3
}

/// Arguments shared by `rolling_sum` and `rolling_mean`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RollingArgs {
    pub column: String,
    #[serde(default = "default_window")]
    pub window: usize,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl RollingArgs {
    pub(super) fn check(&self) -> Result<(), String> {
        if self.window == 0 {
            Err("'window' must be at least 1".to_string())
        } else {
            Ok(())
        }
    }

    /// Sum of the last `window` values, integral when they all are.
    pub fn sum(&self, table: &Table, budget: &mut Budget) -> OpResult<Table> {
        self.roll(table, budget, "rolling_sum", sum_cells)
    }

    /// Mean of the last `window` values.
    pub fn mean(&self, table: &Table, budget: &mut Budget) -> OpResult<Table> {
        let window = self.window as f64;
        self.roll(table, budget, "rolling_mean", |cells| match sum_cells(cells).as_f64() {
            Some(total) => Cell::Float(total / window),
            None => Cell::Null,
        })
    }

    /// The first `window - 1` rows, and any window holding a null or
    /// non-numeric value, yield null. Every value read counts as a row
    /// operation.
    fn roll<F>(&self, table: &Table, budget: &mut Budget, suffix: &str, reduce: F) -> OpResult<Table>
    where
        F: Fn(&[&Cell]) -> Cell,
    {
        let src = table.require_column(&self.column)?;
        let window = self.window.max(1);
        let row_count = table.row_count();
        budget.charge_rows(row_count.saturating_mul(window.min(row_count)))?;

        let cells: Vec<&Cell> = table.rows().iter().map(|row| &row[src]).collect();
        let values = (0..row_count)
            .map(|i| {
                if i + 1 < window {
                    return Cell::Null;
                }
                let span = &cells[i + 1 - window..=i];
                if span.iter().any(|c| c.as_f64().is_none()) {
                    Cell::Null
                } else {
                    reduce(span)
                }
            })
            .collect();
        Ok(table.with_column(&output_name(self.alias.as_deref(), &self.column, suffix), values))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{budget, column, names, table};
    use super::*;
    use crate::config::ExecutionLimits;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn scores() -> Table {
        Table::from_rows(
            names(&["team", "pts"]),
            vec![
                vec![Cell::from("a"), Cell::Int(3)],
                vec![Cell::from("b"), Cell::Int(7)],
                vec![Cell::from("a"), Cell::Int(7)],
                vec![Cell::from("b"), Cell::Null],
                vec![Cell::from("a"), Cell::Int(1)],
            ],
        )
    }

    #[test]
    fn test_cumsum_per_partition() {
        let args: WindowCumsumArgs = serde_json::from_value(json!({"column": "pts", "partition_by": ["team"]})).unwrap();
        let out = args.apply(&scores()).unwrap();
        assert_eq!(out.columns(), &["team", "pts", "pts_cumsum"]);
        assert_eq!(
            column(&out, "pts_cumsum"),
            vec![Cell::Int(3), Cell::Int(7), Cell::Int(10), Cell::Null, Cell::Int(11)]
        );
    }

    #[test]
    fn test_cumsum_switches_to_float() {
        let t = Table::from_rows(
            names(&["v"]),
            vec![vec![Cell::Int(1)], vec![Cell::Float(0.5)], vec![Cell::from("x")], vec![Cell::Int(2)]],
        );
        let args: WindowCumsumArgs = serde_json::from_value(json!({"column": "v", "as": "run"})).unwrap();
        assert_eq!(
            column(&args.apply(&t).unwrap(), "run"),
            vec![Cell::Int(1), Cell::Float(1.5), Cell::Null, Cell::Float(3.5)]
        );
    }

    #[test]
    fn test_rank_methods() {
        let t = Table::from_rows(
            names(&["v"]),
            vec![vec![Cell::Int(20)], vec![Cell::Int(10)], vec![Cell::Null], vec![Cell::Int(20)], vec![Cell::Int(30)]],
        );
        let rank = |method: &str| {
            let args: RankArgs = serde_json::from_value(json!({"column": "v", "method": method})).unwrap();
            column(&args.apply(&t).unwrap(), "v_rank")
        };
        let ints = |v: [i64; 4]| vec![Cell::Int(v[0]), Cell::Int(v[1]), Cell::Null, Cell::Int(v[2]), Cell::Int(v[3])];

        assert_eq!(rank("ordinal"), ints([2, 1, 3, 4]));
        assert_eq!(rank("min"), ints([2, 1, 2, 4]));
        assert_eq!(rank("max"), ints([3, 1, 3, 4]));
        assert_eq!(rank("dense"), ints([2, 1, 2, 3]));
        assert_eq!(
            rank("average"),
            vec![Cell::Float(2.5), Cell::Float(1.0), Cell::Null, Cell::Float(2.5), Cell::Float(4.0)]
        );
    }

    #[test]
    fn test_rank_descending_within_partitions() {
        let args: RankArgs = serde_json::from_value(json!({
            "column": "pts", "descending": true, "partition_by": ["team"], "as": "place"
        }))
        .unwrap();
        let out = args.apply(&scores()).unwrap();
        assert_eq!(
            column(&out, "place"),
            vec![Cell::Int(2), Cell::Int(1), Cell::Int(1), Cell::Null, Cell::Int(3)]
        );
    }

    #[test]
    fn test_rolling_sum_and_mean() {
        let t = table(&["v"], &[&[Some("1")], &[Some("2")], &[Some("3")], &[None], &[Some("5")], &[Some("6")]]);
        let args: RollingArgs = serde_json::from_value(json!({"column": "v", "window": 2})).unwrap();

        let out = args.sum(&t, &mut budget()).unwrap();
        assert_eq!(
            column(&out, "v_rolling_sum"),
            vec![Cell::Null, Cell::Float(3.0), Cell::Float(5.0), Cell::Null, Cell::Null, Cell::Float(11.0)]
        );

        let out = args.mean(&t, &mut budget()).unwrap();
        assert_eq!(
            column(&out, "v_rolling_mean"),
            vec![Cell::Null, Cell::Float(1.5), Cell::Float(2.5), Cell::Null, Cell::Null, Cell::Float(5.5)]
        );
    }

    #[test]
    fn test_rolling_sum_of_integers_stays_integral() {
        let t = Table::from_rows(names(&["v"]), (1..=4).map(|i| vec![Cell::Int(i)]).collect());
        let args: RollingArgs = serde_json::from_value(json!({"column": "v", "as": "s"})).unwrap();
        let out = args.sum(&t, &mut budget()).unwrap();
        assert_eq!(column(&out, "s"), vec![Cell::Null, Cell::Null, Cell::Int(6), Cell::Int(9)]);
    }

    #[test]
    fn test_rolling_window_checked_and_charged() {
        let args: RollingArgs = serde_json::from_value(json!({"column": "v", "window": 0})).unwrap();
        assert!(args.check().is_err());

        let t = table(&["v"], &[&[Some("1")], &[Some("2")], &[Some("3")], &[Some("4")]]);
        let mut budget = Budget::new(ExecutionLimits {
            max_row_operations: 10,
            ..ExecutionLimits::default()
        });
        let args: RollingArgs = serde_json::from_value(json!({"column": "v", "window": 4})).unwrap();
        let err = args.sum(&t, &mut budget).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExceeded);
    }
}
