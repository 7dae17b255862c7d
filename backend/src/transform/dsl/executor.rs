//! Step interpreter.
//!
//! Applies validated steps strictly in order, threading the table through
//! each one, and stops at the first failure.

use tracing::debug;

use super::recipe::{Recipe, Step};
use super::registry::StepRegistry;
use crate::config::ExecutionLimits;
use crate::error::{OpError, OpResult, StepError};
use crate::models::Table;

// =============================================================================
// Budget
// =============================================================================

/// Monotonic operation budget for one run.
#[derive(Debug, Clone)]
pub struct Budget {
    limits: ExecutionLimits,
    row_operations: u64,
    regex_bytes: u64,
}

impl Budget {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            limits,
            row_operations: 0,
            regex_bytes: 0,
        }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    pub fn row_operations(&self) -> u64 {
        self.row_operations
    }

    pub fn regex_bytes(&self) -> u64 {
        self.regex_bytes
    }

    /// Charge `rows` row operations.
    pub fn charge_rows(&mut self, rows: usize) -> OpResult<()> {
        self.row_operations = self.row_operations.saturating_add(rows as u64);
        if self.row_operations > self.limits.max_row_operations {
            return Err(OpError::ResourceExceeded(format!(
                "more than {} row operations",
                self.limits.max_row_operations
            )));
        }
        Ok(())
    }

    /// Fail when a table would hold more than `max_rows` rows.
    pub fn check_table_rows(&self, rows: usize) -> OpResult<()> {
        if rows > self.limits.max_rows {
            return Err(OpError::ResourceExceeded(format!(
                "table would have more than {} rows",
                self.limits.max_rows
            )));
        }
        Ok(())
    }

    /// Charge one regex evaluation over `haystack`.
    pub fn charge_regex(&mut self, haystack: &str) -> OpResult<()> {
        if haystack.len() > self.limits.max_cell_bytes {
            return Err(OpError::ResourceExceeded(format!(
                "value of {} bytes exceeds the {} byte regex input limit",
                haystack.len(),
                self.limits.max_cell_bytes
            )));
        }
        self.regex_bytes = self.regex_bytes.saturating_add(haystack.len() as u64);
        if self.regex_bytes > self.limits.max_regex_bytes {
            return Err(OpError::ResourceExceeded(format!(
                "regex evaluation scanned more than {} bytes",
                self.limits.max_regex_bytes
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Step execution seam
// =============================================================================

/// Applies one step to a table.
///
/// [`StepRegistry`] is the production implementation. The interpreter only
/// sees this trait, so the loop stays uniform across operations.
pub trait StepExecutor {
    fn apply(&self, step: &Step, table: &Table, budget: &mut Budget) -> OpResult<Table>;
}

impl StepExecutor for StepRegistry {
    fn apply(&self, step: &Step, table: &Table, budget: &mut Budget) -> OpResult<Table> {
        step.operation().apply(table, budget)
    }
}

// =============================================================================
// Execution Context
// =============================================================================

/// Per-run state: current table, step index and budget.
///
/// Created fresh for every run and consumed by [`ExecutionContext::run`].
#[derive(Debug)]
pub struct ExecutionContext {
    table: Table,
    step_index: usize,
    budget: Budget,
}

impl ExecutionContext {
    /// Start a run from the ingested table. Ingested rows count against the budget.
    pub fn new(table: Table, limits: ExecutionLimits) -> OpResult<Self> {
        let mut budget = Budget::new(limits);
        budget.check_table_rows(table.row_count())?;
        budget.charge_rows(table.row_count())?;
        Ok(Self {
            table,
            step_index: 0,
            budget,
        })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    /// Run every step in order. The first failure stops the run; later steps
    /// are never applied.
    pub fn run<E: StepExecutor + ?Sized>(mut self, recipe: &Recipe, executor: &E) -> Result<Table, StepError> {
        for (index, step) in recipe.steps().iter().enumerate() {
            self.step_index = index;
            match self.apply_step(step, executor) {
                Ok(next) => {
                    debug!(
                        step = index,
                        op = step.op_name(),
                        rows = next.row_count(),
                        columns = next.column_count(),
                        "step applied"
                    );
                    self.table = next;
                }
                Err(cause) => {
                    debug!(step = index, op = step.op_name(), kind = %cause.kind(), "step failed");
                    return Err(StepError {
                        index,
                        op: step.op_name().to_string(),
                        cause,
                        table_before: self.table,
                    });
                }
            }
        }
        Ok(self.table)
    }

    fn apply_step<E: StepExecutor + ?Sized>(&mut self, step: &Step, executor: &E) -> OpResult<Table> {
        self.budget.charge_rows(self.table.row_count())?;
        let next = executor.apply(step, &self.table, &mut self.budget)?;
        self.budget.check_table_rows(next.row_count())?;
        self.budget.charge_rows(next.row_count())?;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::Cell;
    use crate::parser::ingest_lines;
    use crate::transform::dsl::operations::{Operation, RegexExtractArgs, SelectArgs};

    fn select(columns: &[&str]) -> Operation {
        Operation::Select(SelectArgs {
            columns: columns.iter().map(|c| c.to_string()).collect(),
        })
    }

    fn extract(pattern: &str, alias: &str) -> Operation {
        Operation::RegexExtract(RegexExtractArgs {
            column: "line".into(),
            pattern: pattern.into(),
            group: 0,
            alias: alias.into(),
        })
    }

    #[test]
    fn test_steps_applied_in_order() {
        let recipe = Recipe::from_operations(vec![extract(r"\d+", "n"), select(&["n"])]).unwrap();
        let ctx = ExecutionContext::new(ingest_lines("a1\nb"), ExecutionLimits::default()).unwrap();
        let table = ctx.run(&recipe, StepRegistry::global()).unwrap();
        assert_eq!(table.columns(), &["n"]);
        assert_eq!(table.rows(), &[vec![Cell::from("1")], vec![Cell::Null]]);
    }

    #[test]
    fn test_failure_keeps_table_before_step() {
        let recipe = Recipe::from_operations(vec![extract(r"\d", "n"), select(&["missing"]), select(&["n"])]).unwrap();
        let ctx = ExecutionContext::new(ingest_lines("a1"), ExecutionLimits::default()).unwrap();
        let err = ctx.run(&recipe, StepRegistry::global()).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.op, "select");
        assert_eq!(err.cause.kind(), ErrorKind::UnknownColumn);
        assert_eq!(err.table_before.columns(), &["line", "n"]);
    }

    #[test]
    fn test_new_context_charges_ingested_rows() {
        let ctx = ExecutionContext::new(ingest_lines("a\nb\nc"), ExecutionLimits::default()).unwrap();
        assert_eq!(ctx.table().row_count(), 3);
        assert_eq!(ctx.step_index(), 0);
        assert_eq!(ctx.budget().row_operations(), 3);

        let limits = ExecutionLimits {
            max_rows: 2,
            ..ExecutionLimits::default()
        };
        let err = ExecutionContext::new(ingest_lines("a\nb\nc"), limits).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExceeded);
    }

    #[test]
    fn test_row_operation_budget() {
        let limits = ExecutionLimits {
            max_row_operations: 5,
            ..ExecutionLimits::default()
        };
        let recipe = Recipe::from_operations(vec![select(&["line"]), select(&["line"])]).unwrap();
        // 2 ingested + 2 read + 2 produced = 6
        let ctx = ExecutionContext::new(ingest_lines("a\nb"), limits).unwrap();
        let err = ctx.run(&recipe, StepRegistry::global()).unwrap_err();
        assert_eq!(err.index, 0);
        assert_eq!(err.cause.kind(), ErrorKind::ResourceExceeded);
    }

    #[test]
    fn test_regex_budget_counts_bytes() {
        let mut budget = Budget::new(ExecutionLimits {
            max_regex_bytes: 10,
            max_cell_bytes: 8,
            ..ExecutionLimits::default()
        });
        assert!(budget.charge_regex("abcdef").is_ok());
        assert_eq!(budget.regex_bytes(), 6);
        assert!(budget.charge_regex("abcdefghi").is_err());
        assert!(budget.charge_regex("abcde").is_err());
    }
}
