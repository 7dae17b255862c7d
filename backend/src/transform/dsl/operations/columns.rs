//! Column-shaping operations: projection, renaming, typing and derived columns.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{default_comma, default_line_column};
use crate::error::OpResult;
use crate::models::{Cell, Table};

// =============================================================================
// select / drop / rename
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectArgs {
    pub columns: Vec<String>,
}

impl SelectArgs {
    pub fn apply(&self, table: &Table) -> OpResult<Table> {
        let indices = table.require_columns(&self.columns)?;
        Ok(table.project(&indices))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DropArgs {
    pub columns: Vec<String>,
}

impl DropArgs {
    /// Columns not present are ignored.
    pub fn apply(&self, table: &Table) -> Table {
        let keep: Vec<usize> = table
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, c)| !self.columns.contains(c))
            .map(|(i, _)| i)
            .collect();
        table.project(&keep)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameArgs {
    pub mapping: IndexMap<String, String>,
}

impl RenameArgs {
    pub(super) fn check(&self) -> Result<(), String> {
        let targets: Vec<String> = self.mapping.values().cloned().collect();
        super::unique_names("mapping", &targets)
    }

    /// A target that names an existing, non-renamed column replaces it.
    pub fn apply(&self, table: &Table) -> OpResult<Table> {
        for old in self.mapping.keys() {
            table.require_column(old)?;
        }

        let mut keep = Vec::with_capacity(table.column_count());
        let mut names = Vec::with_capacity(table.column_count());
        for (i, column) in table.columns().iter().enumerate() {
            match self.mapping.get(column) {
                Some(new) => {
                    keep.push(i);
                    names.push(new.clone());
                }
                None if self.mapping.values().any(|t| t == column) => {}
                None => {
                    keep.push(i);
                    names.push(column.clone());
                }
            }
        }
        let projected = table.project(&keep);
        Ok(Table::from_rows(names, projected.rows().to_vec()))
    }
}

// =============================================================================
// cast / fill_null
// =============================================================================

/// Target type for `cast`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CastType {
    Int,
    Float,
    Str,
    Bool,
}

impl CastType {
    /// Convert one cell. Values that do not convert become null.
    pub fn convert(self, cell: &Cell) -> Cell {
        match (self, cell) {
            (_, Cell::Null) => Cell::Null,
            (CastType::Int, Cell::Int(i)) => Cell::Int(*i),
            (CastType::Int, Cell::Float(f)) => float_to_int(*f),
            (CastType::Int, Cell::Bool(b)) => Cell::Int(i64::from(*b)),
            (CastType::Int, Cell::Str(s)) => s.trim().parse::<i64>().map(Cell::Int).unwrap_or(Cell::Null),
            (CastType::Float, Cell::Bool(b)) => Cell::Float(if *b { 1.0 } else { 0.0 }),
            (CastType::Float, other) => other.as_f64().map(Cell::Float).unwrap_or(Cell::Null),
            (CastType::Str, other) => other.as_text().map(|t| Cell::Str(t.into_owned())).unwrap_or(Cell::Null),
            (CastType::Bool, Cell::Bool(b)) => Cell::Bool(*b),
            (CastType::Bool, Cell::Int(i)) => Cell::Bool(*i != 0),
            (CastType::Bool, Cell::Float(f)) => Cell::Bool(*f != 0.0),
            (CastType::Bool, Cell::Str(s)) => parse_bool(s).map(Cell::Bool).unwrap_or(Cell::Null),
        }
    }
}

fn float_to_int(f: f64) -> Cell {
    let t = f.trunc();
    if t.is_finite() && t >= i64::MIN as f64 && t < i64::MAX as f64 {
        Cell::Int(t as i64)
    } else {
        Cell::Null
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CastArgs {
    pub mapping: IndexMap<String, CastType>,
}

impl CastArgs {
    pub fn apply(&self, table: &Table) -> OpResult<Table> {
        let targets = self
            .mapping
            .iter()
            .map(|(column, ty)| Ok((table.require_column(column)?, *ty)))
            .collect::<OpResult<Vec<_>>>()?;
        let rows = table
            .rows()
            .iter()
            .map(|row| {
                let mut row = row.clone();
                for (idx, ty) in &targets {
                    row[*idx] = ty.convert(&row[*idx]);
                }
                row
            })
            .collect();
        Ok(table.with_rows(rows))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FillNullArgs {
    pub mapping: IndexMap<String, Value>,
}

impl FillNullArgs {
    pub fn apply(&self, table: &Table) -> OpResult<Table> {
        let fills = self
            .mapping
            .iter()
            .map(|(column, value)| {
                Ok((table.require_column(column)?, Cell::from_json(value).unwrap_or(Cell::Null)))
            })
            .collect::<OpResult<Vec<_>>>()?;
        let rows = table
            .rows()
            .iter()
            .map(|row| {
                let mut row = row.clone();
                for (idx, fill) in &fills {
                    if row[*idx].is_null() {
                        row[*idx] = fill.clone();
                    }
                }
                row
            })
            .collect();
        Ok(table.with_rows(rows))
    }
}

// =============================================================================
// Derived columns
// =============================================================================

fn default_row_index() -> String {
    "row_index".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddRowNumberArgs {
    #[serde(rename = "as", default = "default_row_index")]
    pub alias: String,
    #[serde(default)]
    pub start: i64,
}

impl AddRowNumberArgs {
    pub fn apply(&self, table: &Table) -> Table {
        let values = (0..table.row_count())
            .map(|i| Cell::Int(self.start.saturating_add(i as i64)))
            .collect();
        table.with_column(&self.alias, values)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConcatColumnsArgs {
    pub columns: Vec<String>,
    #[serde(default)]
    pub delimiter: String,
    #[serde(rename = "as", default = "default_line_column")]
    pub alias: String,
}

impl ConcatColumnsArgs {
    /// A null in any source column makes the result null.
    pub fn apply(&self, table: &Table) -> OpResult<Table> {
        let indices = table.require_columns(&self.columns)?;
        let values = table
            .rows()
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|&i| row[i].as_text())
                    .collect::<Option<Vec<_>>>()
                    .map(|parts| Cell::Str(parts.join(self.delimiter.as_str())))
                    .unwrap_or(Cell::Null)
            })
            .collect();
        Ok(table.with_column(&self.alias, values))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CoalesceArgs {
    pub columns: Vec<String>,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl CoalesceArgs {
    /// Output defaults to the first listed column.
    pub fn apply(&self, table: &Table) -> OpResult<Table> {
        let indices = table.require_columns(&self.columns)?;
        let target = self
            .alias
            .as_deref()
            .or_else(|| self.columns.first().map(String::as_str))
            .unwrap_or_default();
        let values = table
            .rows()
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|&i| &row[i])
                    .find(|c| !c.is_null())
                    .cloned()
                    .unwrap_or(Cell::Null)
            })
            .collect();
        Ok(table.with_column(target, values))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitColumnArgs {
    pub column: String,
    pub into: Vec<String>,
    #[serde(default = "default_comma")]
    pub delimiter: String,
    #[serde(default)]
    pub drop_original: bool,
}

impl SplitColumnArgs {
    /// Missing parts become null; parts beyond `into` are discarded.
    pub fn apply(&self, table: &Table) -> OpResult<Table> {
        let idx = table.require_column(&self.column)?;
        let mut parts: Vec<Vec<Cell>> = vec![Vec::with_capacity(table.row_count()); self.into.len()];
        for row in table.rows() {
            let text = row[idx].as_text();
            let mut pieces = text.as_deref().map(|t| t.split(self.delimiter.as_str()));
            for slot in parts.iter_mut() {
                let piece = pieces.as_mut().and_then(|p| p.next());
                slot.push(piece.map(Cell::from).unwrap_or(Cell::Null));
            }
        }

        let mut out = table.clone();
        for (name, values) in self.into.iter().zip(parts) {
            out = out.with_column(name, values);
        }
        if self.drop_original && !self.into.contains(&self.column) {
            out = DropArgs {
                columns: vec![self.column.clone()],
            }
            .apply(&out);
        }
        Ok(out)
    }
}
