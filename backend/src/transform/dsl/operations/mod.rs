//! Recipe operations.
//!
//! Each operation is a pure function from one [`Table`] to a new one, failing
//! only with the [`OpError`]s it declares. Arguments arrive already parsed and
//! checked by the validator.

mod aggregate;
mod columns;
mod patterns;
mod reshape;
mod rows;
mod values;
mod window;

use serde::Serialize;

pub use self::aggregate::{AggFunc, AggregationSpec, GroupByAggArgs};
pub use self::columns::{
    AddRowNumberArgs, CastArgs, CastType, CoalesceArgs, ConcatColumnsArgs, DropArgs, FillNullArgs, RenameArgs,
    SelectArgs, SplitColumnArgs,
};
pub use self::patterns::{
    compile_pattern, FilterRegexArgs, RegexExtractArgs, RegexExtractMultiArgs, RegexReplaceArgs,
};
pub use self::reshape::{PivotLongerArgs, PivotValues, PivotWiderArgs};
pub use self::rows::{
    Descending, DistinctArgs, DropNaArgs, FilterEqArgs, HeadArgs, SliceArgs, SortByArgs, SplitToRowsArgs,
    TailArgs, TakeEveryArgs,
};
pub use self::values::{LookupArgs, ReplaceValuesArgs};
pub use self::window::{RankArgs, RankMethod, RollingArgs, WindowCumsumArgs};

use super::executor::Budget;
use crate::error::OpResult;
use crate::models::Table;
use crate::parser::LINE_COLUMN;

/// All available operations, tagged by `op` in recipe documents.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Select(SelectArgs),
    RegexExtract(RegexExtractArgs),
    RegexExtractMulti(RegexExtractMultiArgs),
    RegexReplace(RegexReplaceArgs),
    FilterRegex(FilterRegexArgs),
    FilterEq(FilterEqArgs),
    Rename(RenameArgs),
    Drop(DropArgs),
    Cast(CastArgs),
    FillNull(FillNullArgs),
    ReplaceValues(ReplaceValuesArgs),
    Lookup(LookupArgs),
    Slice(SliceArgs),
    Head(HeadArgs),
    Tail(TailArgs),
    TakeEvery(TakeEveryArgs),
    AddRowNumber(AddRowNumberArgs),
    Distinct(DistinctArgs),
    SortBy(SortByArgs),
    SplitColumn(SplitColumnArgs),
    SplitToRows(SplitToRowsArgs),
    ConcatColumns(ConcatColumnsArgs),
    Coalesce(CoalesceArgs),
    DropNa(DropNaArgs),
    GroupByAgg(GroupByAggArgs),
    PivotWider(PivotWiderArgs),
    PivotLonger(PivotLongerArgs),
    WindowCumsum(WindowCumsumArgs),
    Rank(RankArgs),
    RollingMean(RollingArgs),
    RollingSum(RollingArgs),
}

impl Operation {
    /// The `op` name used in recipe documents.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Select(_) => "select",
            Operation::RegexExtract(_) => "regex_extract",
            Operation::RegexExtractMulti(_) => "regex_extract_multi",
            Operation::RegexReplace(_) => "regex_replace",
            Operation::FilterRegex(_) => "filter_regex",
            Operation::FilterEq(_) => "filter_eq",
            Operation::Rename(_) => "rename",
            Operation::Drop(_) => "drop",
            Operation::Cast(_) => "cast",
            Operation::FillNull(_) => "fill_null",
            Operation::ReplaceValues(_) => "replace_values",
            Operation::Lookup(_) => "lookup",
            Operation::Slice(_) => "slice",
            Operation::Head(_) => "head",
            Operation::Tail(_) => "tail",
            Operation::TakeEvery(_) => "take_every",
            Operation::AddRowNumber(_) => "add_row_number",
            Operation::Distinct(_) => "distinct",
            Operation::SortBy(_) => "sort_by",
            Operation::SplitColumn(_) => "split_column",
            Operation::SplitToRows(_) => "split_to_rows",
            Operation::ConcatColumns(_) => "concat_columns",
            Operation::Coalesce(_) => "coalesce",
            Operation::DropNa(_) => "drop_na",
            Operation::GroupByAgg(_) => "group_by_agg",
            Operation::PivotWider(_) => "pivot_wider",
            Operation::PivotLonger(_) => "pivot_longer",
            Operation::WindowCumsum(_) => "window_cumsum",
            Operation::Rank(_) => "rank",
            Operation::RollingMean(_) => "rolling_mean",
            Operation::RollingSum(_) => "rolling_sum",
        }
    }

    /// Argument checks that need no input data. Returns a message on failure.
    pub fn check(&self) -> Result<(), String> {
        match self {
            Operation::Select(a) => unique_names("columns", &a.columns),
            Operation::RegexExtractMulti(a) => {
                non_empty("as", &a.aliases)?;
                unique_names("as", &a.aliases)
            }
            Operation::Rename(a) => a.check(),
            Operation::Lookup(a) => a.check(),
            Operation::TakeEvery(a) => {
                if a.n == 0 {
                    Err("'n' must be at least 1".to_string())
                } else {
                    Ok(())
                }
            }
            Operation::SortBy(a) => a.check(),
            Operation::SplitColumn(a) => {
                non_empty("into", &a.into)?;
                unique_names("into", &a.into)?;
                non_empty_delimiter(&a.delimiter)
            }
            Operation::SplitToRows(a) => non_empty_delimiter(&a.delimiter),
            Operation::ConcatColumns(a) => non_empty("columns", &a.columns),
            Operation::Coalesce(a) => non_empty("columns", &a.columns),
            Operation::GroupByAgg(a) => a.check(),
            Operation::PivotWider(a) => a.check(),
            Operation::PivotLonger(a) => a.check(),
            Operation::RollingMean(a) | Operation::RollingSum(a) => a.check(),
            _ => Ok(()),
        }
    }

    /// Apply this operation to a table.
    pub fn apply(&self, table: &Table, budget: &mut Budget) -> OpResult<Table> {
        match self {
            Operation::Select(a) => a.apply(table),
            Operation::RegexExtract(a) => a.apply(table, budget),
            Operation::RegexExtractMulti(a) => a.apply(table, budget),
            Operation::RegexReplace(a) => a.apply(table, budget),
            Operation::FilterRegex(a) => a.apply(table, budget),
            Operation::FilterEq(a) => a.apply(table),
            Operation::Rename(a) => a.apply(table),
            Operation::Drop(a) => Ok(a.apply(table)),
            Operation::Cast(a) => a.apply(table),
            Operation::FillNull(a) => a.apply(table),
            Operation::ReplaceValues(a) => a.apply(table),
            Operation::Lookup(a) => a.apply(table),
            Operation::Slice(a) => Ok(a.apply(table)),
            Operation::Head(a) => Ok(a.apply(table)),
            Operation::Tail(a) => Ok(a.apply(table)),
            Operation::TakeEvery(a) => Ok(a.apply(table)),
            Operation::AddRowNumber(a) => Ok(a.apply(table)),
            Operation::Distinct(a) => a.apply(table),
            Operation::SortBy(a) => a.apply(table),
            Operation::SplitColumn(a) => a.apply(table),
            Operation::SplitToRows(a) => a.apply(table, budget),
            Operation::ConcatColumns(a) => a.apply(table),
            Operation::Coalesce(a) => a.apply(table),
            Operation::DropNa(a) => a.apply(table),
            Operation::GroupByAgg(a) => a.apply(table),
            Operation::PivotWider(a) => a.apply(table, budget),
            Operation::PivotLonger(a) => a.apply(table, budget),
            Operation::WindowCumsum(a) => a.apply(table),
            Operation::Rank(a) => a.apply(table),
            Operation::RollingMean(a) => a.mean(table, budget),
            Operation::RollingSum(a) => a.sum(table, budget),
        }
    }
}

fn default_line_column() -> String {
    LINE_COLUMN.to_string()
}

fn default_comma() -> String {
    ",".to_string()
}

fn default_true() -> bool {
    true
}

fn non_empty<T>(field: &str, items: &[T]) -> Result<(), String> {
    if items.is_empty() {
        Err(format!("'{}' must not be empty", field))
    } else {
        Ok(())
    }
}

fn unique_names(field: &str, names: &[String]) -> Result<(), String> {
    for (i, name) in names.iter().enumerate() {
        if names[..i].contains(name) {
            return Err(format!("'{}' lists '{}' more than once", field, name));
        }
    }
    Ok(())
}

fn non_empty_delimiter(delimiter: &str) -> Result<(), String> {
    if delimiter.is_empty() {
        Err("'delimiter' must not be empty".to_string())
    } else {
        Ok(())
    }
}

/// Shared fixtures for operation tests.
#[cfg(test)]
pub(crate) mod test_support {
    use crate::config::ExecutionLimits;
    use crate::models::{Cell, Table};

    use super::Budget;

    pub fn budget() -> Budget {
        Budget::new(ExecutionLimits::default())
    }

    /// Table from string literals; `None` becomes null.
    pub fn table(columns: &[&str], rows: &[&[Option<&str>]]) -> Table {
        Table::from_rows(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|v| Cell::from(*v)).collect())
                .collect(),
        )
    }

    pub fn column(table: &Table, name: &str) -> Vec<Cell> {
        table
            .column_values(name)
            .unwrap_or_default()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn strings(values: &[Option<&str>]) -> Vec<Cell> {
        values.iter().map(|v| Cell::from(*v)).collect()
    }

    pub fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }
}
