//! Row/Table model shared by every step.
//!
//! - [`Cell`] - a scalar value: null, boolean, integer, float or string
//! - [`Table`] - ordered column names plus ordered rows
//!
//! Rows are stored positionally, one cell per declared column, so a row can
//! never lack a value for a column. Lookup is by name through
//! [`Table::column_index`].

use serde::Serialize;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::cmp::Ordering;

use crate::error::{OpError, OpResult};

// =============================================================================
// Cell
// =============================================================================

/// A single cell value. No nested structures.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Hashable identity of a cell, used for grouping and de-duplication.
///
/// Integral floats share the key of the equal integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CellKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
}

impl Cell {
    pub fn str(value: impl Into<String>) -> Self {
        Cell::Str(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// Convert a JSON scalar. Arrays and objects have no cell form.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Cell::Null),
            Value::Bool(b) => Some(Cell::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Cell::Int(i)),
                None => n.as_f64().map(Cell::Float),
            },
            Value::String(s) => Some(Cell::Str(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Bool(b) => Value::Bool(*b),
            Cell::Int(i) => Value::from(*i),
            // Non-finite floats become null
            Cell::Float(f) => Value::from(*f),
            Cell::Str(s) => Value::String(s.clone()),
        }
    }

    /// Text form used by string operations. `None` for null.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Cell::Null => None,
            Cell::Bool(b) => Some(Cow::Owned(b.to_string())),
            Cell::Int(i) => Some(Cow::Owned(i.to_string())),
            Cell::Float(f) => Some(Cow::Owned(f.to_string())),
            Cell::Str(s) => Some(Cow::Borrowed(s)),
        }
    }

    /// Numeric view: numbers as-is, strings parsed after trimming.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) => Some(*f),
            Cell::Str(s) => s.trim().parse().ok(),
            Cell::Null | Cell::Bool(_) => None,
        }
    }

    pub fn key(&self) -> CellKey {
        match self {
            Cell::Null => CellKey::Null,
            Cell::Bool(b) => CellKey::Bool(*b),
            Cell::Int(i) => CellKey::Int(*i),
            Cell::Float(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                    CellKey::Int(*f as i64)
                } else {
                    CellKey::Float(f.to_bits())
                }
            }
            Cell::Str(s) => CellKey::Str(s.clone()),
        }
    }

    /// Equality where integers and floats compare numerically.
    pub fn loose_eq(&self, other: &Cell) -> bool {
        match (self, other) {
            (Cell::Int(a), Cell::Float(b)) | (Cell::Float(b), Cell::Int(a)) => (*a as f64) == *b,
            _ => self == other,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Cell::Null => 0,
            Cell::Bool(_) => 1,
            Cell::Int(_) | Cell::Float(_) => 2,
            Cell::Str(_) => 3,
        }
    }

    /// Total order: null < booleans < numbers < strings.
    pub fn total_cmp(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Bool(a), Cell::Bool(b)) => a.cmp(b),
            (Cell::Int(a), Cell::Int(b)) => a.cmp(b),
            (Cell::Int(a), Cell::Float(b)) => (*a as f64).total_cmp(b),
            (Cell::Float(a), Cell::Int(b)) => a.total_cmp(&(*b as f64)),
            (Cell::Float(a), Cell::Float(b)) => a.total_cmp(b),
            (Cell::Str(a), Cell::Str(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Str(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Str(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<bool> for Cell {
    fn from(value: bool) -> Self {
        Cell::Bool(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

// =============================================================================
// Table
// =============================================================================

/// Ordered rows plus ordered column names.
///
/// Every row holds exactly one cell per declared column. Steps never mutate a
/// table they received; they build a new one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    /// An empty table with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from positional rows. Short rows are padded with nulls and
    /// long rows truncated so the width invariant always holds.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Null);
                row
            })
            .collect();
        Self { columns, rows }
    }

    /// A one-column table.
    pub fn single_column(name: &str, values: Vec<Cell>) -> Self {
        Self {
            columns: vec![name.to_string()],
            rows: values.into_iter().map(|v| vec![v]).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Column index or an `UnknownColumn` error listing what exists.
    pub fn require_column(&self, name: &str) -> OpResult<usize> {
        self.column_index(name).ok_or_else(|| OpError::UnknownColumn {
            column: name.to_string(),
            available: self.columns.clone(),
        })
    }

    /// Indices for several columns, in the given order.
    pub fn require_columns(&self, names: &[String]) -> OpResult<Vec<usize>> {
        names.iter().map(|n| self.require_column(n)).collect()
    }

    /// Cell by row position and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&Cell> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// All values of one column, top to bottom.
    pub fn column_values(&self, name: &str) -> Option<Vec<&Cell>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// New table with `name` set to `values`: overwritten in place when the
    /// column exists, appended otherwise. `values` must have one entry per row.
    pub fn with_column(&self, name: &str, values: Vec<Cell>) -> Table {
        debug_assert_eq!(values.len(), self.rows.len(), "one value per row");
        let mut columns = self.columns.clone();
        let existing = self.column_index(name);
        if existing.is_none() {
            columns.push(name.to_string());
        }
        let rows = self
            .rows
            .iter()
            .zip(values)
            .map(|(row, value)| {
                let mut row = row.clone();
                match existing {
                    Some(idx) => row[idx] = value,
                    None => row.push(value),
                }
                row
            })
            .collect();
        Table { columns, rows }
    }

    /// New table keeping only the given column positions, in that order.
    pub fn project(&self, indices: &[usize]) -> Table {
        let columns = indices.iter().map(|&i| self.columns[i].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Table { columns, rows }
    }

    /// New table with the same columns and the rows selected by `keep`.
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(usize, &[Cell]) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .enumerate()
            .filter(|(i, row)| keep(*i, row))
            .map(|(_, row)| row.clone())
            .collect();
        Table {
            columns: self.columns.clone(),
            rows,
        }
    }

    /// New table with the same columns and the given rows.
    pub fn with_rows(&self, rows: Vec<Vec<Cell>>) -> Table {
        Table::from_rows(self.columns.clone(), rows)
    }

    /// Rows as JSON objects keyed in column order.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| (c.clone(), v.to_json()))
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Table {
        Table::from_rows(
            vec!["a".into(), "b".into()],
            vec![
                vec![Cell::from("x"), Cell::Int(1)],
                vec![Cell::from("y")],
            ],
        )
    }

    #[test]
    fn test_rows_padded_to_width() {
        let table = sample();
        assert_eq!(table.rows()[1], vec![Cell::from("y"), Cell::Null]);
        assert_eq!(table.value(0, "b"), Some(&Cell::Int(1)));
    }

    #[test]
    fn test_with_column_appends_then_overwrites() {
        let table = sample().with_column("c", vec![Cell::Bool(true), Cell::Null]);
        assert_eq!(table.columns(), &["a", "b", "c"]);

        let table = table.with_column("a", vec![Cell::Int(5), Cell::Int(6)]);
        assert_eq!(table.columns(), &["a", "b", "c"]);
        assert_eq!(table.value(1, "a"), Some(&Cell::Int(6)));
    }

    #[test]
    fn test_require_column_lists_available() {
        let err = sample().require_column("zzz").unwrap_err();
        assert_eq!(
            err,
            OpError::UnknownColumn {
                column: "zzz".into(),
                available: vec!["a".into(), "b".into()],
            }
        );
    }

    #[test]
    fn test_records_keep_column_order() {
        let table = sample().project(&[1, 0]);
        let records = table.to_records();
        let keys: Vec<&String> = records[0].keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(serde_json::Value::Object(records[1].clone()), json!({"b": null, "a": "y"}));
    }

    #[test]
    fn test_cell_ordering_and_keys() {
        assert_eq!(Cell::Null.total_cmp(&Cell::Int(0)), Ordering::Less);
        assert_eq!(Cell::Int(2).total_cmp(&Cell::Float(1.5)), Ordering::Greater);
        assert_eq!(Cell::Int(9).total_cmp(&Cell::from("1")), Ordering::Less);
        assert_eq!(Cell::Float(3.0).key(), Cell::Int(3).key());
        assert!(Cell::Int(3).loose_eq(&Cell::Float(3.0)));
    }

    #[test]
    fn test_cell_text_and_json() {
        assert_eq!(Cell::Int(42).as_text().as_deref(), Some("42"));
        assert_eq!(Cell::Null.as_text(), None);
        assert_eq!(Cell::Float(f64::NAN).to_json(), Value::Null);
        assert_eq!(Cell::from_json(&json!([1])), None);
        assert_eq!(Cell::from_json(&json!(2.5)), Some(Cell::Float(2.5)));
    }
}
