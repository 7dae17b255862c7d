//! Engine configuration.
//!
//! Limits are plain values handed to each run; the engine never reads the
//! environment while executing. [`EngineConfig::from_env`] is for binaries.

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Environment variable prefix for every setting.
pub const ENV_PREFIX: &str = "TABLECRAFT_";

/// Operation budget for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Largest raw input accepted, in bytes.
    pub max_input_bytes: usize,
    /// Largest table any step may produce.
    pub max_rows: usize,
    /// Total rows read plus produced across all steps.
    pub max_row_operations: u64,
    /// Total haystack bytes scanned by regex evaluation.
    pub max_regex_bytes: u64,
    /// Longest single value a regex is evaluated against.
    pub max_cell_bytes: usize,
    /// Compiled program size limit for `regex::RegexBuilder`.
    pub regex_size_limit: usize,
    /// Lazy DFA cache limit for `regex::RegexBuilder`.
    pub regex_dfa_size_limit: usize,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: 8 * 1024 * 1024,
            max_rows: 100_000,
            max_row_operations: 5_000_000,
            max_regex_bytes: 256 * 1024 * 1024,
            max_cell_bytes: 64 * 1024,
            regex_size_limit: 1024 * 1024,
            regex_dfa_size_limit: 2 * 1024 * 1024,
        }
    }
}

/// Top-level engine settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub limits: ExecutionLimits,
}

impl EngineConfig {
    /// Read overrides from `TABLECRAFT_*` environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary lookup (environment, tests, ...).
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = ExecutionLimits::default();
        let read = |name: &str, default: u64| -> ConfigResult<u64> {
            let var = format!("{}{}", ENV_PREFIX, name);
            match lookup(&var) {
                None => Ok(default),
                Some(raw) => match raw.trim().parse::<u64>() {
                    Ok(v) if v > 0 => Ok(v),
                    _ => Err(ConfigError::InvalidValue { var, value: raw }),
                },
            }
        };
        let read_usize = |name: &str, default: usize| -> ConfigResult<usize> {
            read(name, default as u64).map(|v| usize::try_from(v).unwrap_or(usize::MAX))
        };

        Ok(Self {
            limits: ExecutionLimits {
                max_input_bytes: read_usize("MAX_INPUT_BYTES", defaults.max_input_bytes)?,
                max_rows: read_usize("MAX_ROWS", defaults.max_rows)?,
                max_row_operations: read("MAX_ROW_OPERATIONS", defaults.max_row_operations)?,
                max_regex_bytes: read("MAX_REGEX_BYTES", defaults.max_regex_bytes)?,
                max_cell_bytes: read_usize("MAX_CELL_BYTES", defaults.max_cell_bytes)?,
                regex_size_limit: read_usize("REGEX_SIZE_LIMIT", defaults.regex_size_limit)?,
                regex_dfa_size_limit: read_usize("REGEX_DFA_SIZE_LIMIT", defaults.regex_dfa_size_limit)?,
            },
        })
    }
}
