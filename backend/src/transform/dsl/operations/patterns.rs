//! Regex-driven operations.
//!
//! Patterns use the `regex` crate syntax and are compiled with the size
//! limits from [`ExecutionLimits`], so a run cannot allocate an unbounded
//! automaton. Every evaluated value is charged to the run's [`Budget`].
//!
//! Checks happen in a fixed order: the source column must exist, then the
//! pattern must compile, then the requested group must exist.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::default_line_column;
use crate::config::ExecutionLimits;
use crate::error::{OpError, OpResult};
use crate::models::{Cell, Table};
use crate::transform::dsl::executor::Budget;

/// Compile `pattern` under the configured size limits.
///
/// Syntax errors are `InvalidPattern`; a pattern whose compiled form is too
/// large is `ResourceExceeded`.
pub fn compile_pattern(pattern: &str, limits: &ExecutionLimits) -> OpResult<Regex> {
    RegexBuilder::new(pattern)
        .size_limit(limits.regex_size_limit)
        .dfa_size_limit(limits.regex_dfa_size_limit)
        .build()
        .map_err(|e| match e {
            regex::Error::CompiledTooBig(limit) => {
                OpError::ResourceExceeded(format!("pattern compiles to more than {} bytes", limit))
            }
            other => OpError::InvalidPattern {
                pattern: pattern.to_string(),
                message: other.to_string(),
            },
        })
}

/// Number of capture groups, excluding the implicit whole-match group 0.
fn group_count(re: &Regex) -> usize {
    re.captures_len().saturating_sub(1)
}

// =============================================================================
// regex_extract
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegexExtractArgs {
    #[serde(default = "default_line_column")]
    pub column: String,
    pub pattern: String,
    #[serde(default)]
    pub group: usize,
    #[serde(rename = "as")]
    pub alias: String,
}

impl RegexExtractArgs {
    /// First match per row; null when the value is null, nothing matches or
    /// the group did not participate.
    pub fn apply(&self, table: &Table, budget: &mut Budget) -> OpResult<Table> {
        let idx = table.require_column(&self.column)?;
        let re = compile_pattern(&self.pattern, budget.limits())?;
        let available = group_count(&re);
        if self.group > available {
            return Err(OpError::InvalidGroup {
                group: self.group,
                available,
            });
        }

        let mut values = Vec::with_capacity(table.row_count());
        for row in table.rows() {
            let value = match row[idx].as_text() {
                None => Cell::Null,
                Some(text) => {
                    budget.charge_regex(&text)?;
                    let found = if self.group == 0 {
                        re.find(&text).map(|m| m.as_str().to_string())
                    } else {
                        re.captures(&text)
                            .and_then(|caps| caps.get(self.group))
                            .map(|m| m.as_str().to_string())
                    };
                    Cell::from(found)
                }
            };
            values.push(value);
        }
        Ok(table.with_column(&self.alias, values))
    }
}

// =============================================================================
// regex_extract_multi
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegexExtractMultiArgs {
    #[serde(default = "default_line_column")]
    pub column: String,
    pub pattern: String,
    /// One output column per capture group, starting at group 1.
    #[serde(rename = "as")]
    pub aliases: Vec<String>,
}

impl RegexExtractMultiArgs {
    pub fn apply(&self, table: &Table, budget: &mut Budget) -> OpResult<Table> {
        let idx = table.require_column(&self.column)?;
        let re = compile_pattern(&self.pattern, budget.limits())?;
        let available = group_count(&re);
        if self.aliases.len() > available {
            return Err(OpError::InvalidGroup {
                group: self.aliases.len(),
                available,
            });
        }

        let mut outputs: Vec<Vec<Cell>> = vec![Vec::with_capacity(table.row_count()); self.aliases.len()];
        for row in table.rows() {
            let text = row[idx].as_text();
            let caps = match text.as_deref() {
                Some(t) => {
                    budget.charge_regex(t)?;
                    re.captures(t)
                }
                None => None,
            };
            for (group, out) in outputs.iter_mut().enumerate() {
                let value = caps
                    .as_ref()
                    .and_then(|c| c.get(group + 1))
                    .map(|m| Cell::from(m.as_str()))
                    .unwrap_or(Cell::Null);
                out.push(value);
            }
        }

        let mut table = table.clone();
        for (alias, values) in self.aliases.iter().zip(outputs) {
            table = table.with_column(alias, values);
        }
        Ok(table)
    }
}

// =============================================================================
// regex_replace
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegexReplaceArgs {
    pub column: String,
    pub pattern: String,
    /// Replacement text; `$1` / `${name}` refer to capture groups.
    #[serde(default)]
    pub replacement: String,
    #[serde(rename = "as", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl RegexReplaceArgs {
    /// Replaces every match. Null stays null.
    pub fn apply(&self, table: &Table, budget: &mut Budget) -> OpResult<Table> {
        let idx = table.require_column(&self.column)?;
        let re = compile_pattern(&self.pattern, budget.limits())?;

        let mut values = Vec::with_capacity(table.row_count());
        for row in table.rows() {
            let value = match row[idx].as_text() {
                None => Cell::Null,
                Some(text) => {
                    budget.charge_regex(&text)?;
                    Cell::Str(re.replace_all(&text, self.replacement.as_str()).into_owned())
                }
            };
            values.push(value);
        }
        let target = self.alias.as_deref().unwrap_or(&self.column);
        Ok(table.with_column(target, values))
    }
}

// =============================================================================
// filter_regex
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterRegexArgs {
    #[serde(default = "default_line_column")]
    pub column: String,
    pub pattern: String,
}

impl FilterRegexArgs {
    /// Keeps rows whose value matches anywhere. Null never matches.
    pub fn apply(&self, table: &Table, budget: &mut Budget) -> OpResult<Table> {
        let idx = table.require_column(&self.column)?;
        let re = compile_pattern(&self.pattern, budget.limits())?;

        let mut keep = Vec::with_capacity(table.row_count());
        for row in table.rows() {
            let matched = match row[idx].as_text() {
                None => false,
                Some(text) => {
                    budget.charge_regex(&text)?;
                    re.is_match(&text)
                }
            };
            keep.push(matched);
        }
        Ok(table.filter_rows(|i, _| keep[i]))
    }
}
