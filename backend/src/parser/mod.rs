//! Ingestion: raw input text to the initial [`Table`].
//!
//! The fixed entry contract is line ingestion: one column named
//! [`LINE_COLUMN`], one row per non-empty line, in original order. CSV and
//! JSON ingestion are available when a caller asks for them explicitly.

use serde_json::Value;
use std::path::Path;

use crate::config::ExecutionLimits;
use crate::error::{InputError, InputResult};
use crate::models::{Cell, Table};

/// Column holding each raw line.
pub const LINE_COLUMN: &str = "line";

/// How raw input text is turned into the initial table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputFormat {
    /// One row per non-empty line in column `line`.
    #[default]
    Text,
    /// Delimited text. Delimiter is auto-detected when `None`.
    Csv {
        delimiter: Option<char>,
        has_header: bool,
    },
    /// An array of flat JSON objects.
    Json,
}

/// Anything that can produce the initial table of a run.
pub trait InputSource {
    fn ingest(&self, limits: &ExecutionLimits) -> InputResult<Table>;
}

/// Raw text plus the format it should be read as.
#[derive(Debug, Clone, Copy)]
pub struct RawInput<'a> {
    pub text: &'a str,
    pub format: InputFormat,
}

impl<'a> RawInput<'a> {
    pub fn text(text: &'a str) -> Self {
        Self {
            text,
            format: InputFormat::Text,
        }
    }

    pub fn with_format(text: &'a str, format: InputFormat) -> Self {
        Self { text, format }
    }
}

impl InputSource for RawInput<'_> {
    fn ingest(&self, limits: &ExecutionLimits) -> InputResult<Table> {
        if self.text.len() > limits.max_input_bytes {
            return Err(InputError::TooLarge {
                size: self.text.len(),
                limit: limits.max_input_bytes,
            });
        }
        let table = match self.format {
            InputFormat::Text => ingest_lines(self.text),
            InputFormat::Csv { delimiter, has_header } => {
                let delimiter = delimiter.unwrap_or_else(|| detect_delimiter(self.text));
                ingest_csv(self.text, delimiter, has_header)?
            }
            InputFormat::Json => ingest_json(self.text)?,
        };
        if table.row_count() > limits.max_rows {
            return Err(InputError::TooManyRows { limit: limits.max_rows });
        }
        Ok(table)
    }
}

/// Characters that end a line: `\n`, `\r` (so `\r\n` too), vertical tab,
/// form feed, the file/group/record separators, NEL and the Unicode line and
/// paragraph separators.
const LINE_BREAKS: &[char] = &[
    '\n', '\r', '\u{0b}', '\u{0c}', '\u{1c}', '\u{1d}', '\u{1e}', '\u{85}', '\u{2028}', '\u{2029}',
];

/// Split text into one row per non-empty line. Whitespace-only lines are kept.
pub fn ingest_lines(text: &str) -> Table {
    let values = text
        .split(LINE_BREAKS)
        .filter(|line| !line.is_empty())
        .map(Cell::from)
        .collect();
    Table::single_column(LINE_COLUMN, values)
}

/// Detect the delimiter by counting occurrences in the first line.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse delimited text. Every cell is a string; empty lines are skipped.
///
/// Without a header row, columns are named `column_1..n` after the widest record.
pub fn ingest_csv(content: &str, delimiter: char, has_header: bool) -> InputResult<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(ascii_delimiter(delimiter))
        .has_headers(has_header)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut columns: Vec<String> = if has_header {
        unique_names(reader.headers()?.iter().map(str::to_string))
    } else {
        Vec::new()
    };

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if !has_header && record.len() > columns.len() {
            columns = (1..=record.len()).map(|i| format!("column_{}", i)).collect();
        }
        rows.push(record.iter().map(Cell::from).collect());
    }

    Ok(Table::from_rows(columns, rows))
}

fn ascii_delimiter(delimiter: char) -> u8 {
    u8::try_from(delimiter).ok().filter(u8::is_ascii).unwrap_or(b',')
}

/// Make header names non-empty and unique, keeping their order.
fn unique_names(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for (i, name) in names.enumerate() {
        let base = if name.is_empty() { format!("column_{}", i + 1) } else { name };
        let mut candidate = base.clone();
        let mut suffix = 2;
        while out.contains(&candidate) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        out.push(candidate);
    }
    out
}

/// Parse an array of flat objects. Columns follow first appearance.
pub fn ingest_json(content: &str) -> InputResult<Table> {
    let parsed: Value = serde_json::from_str(content)?;
    let items = match parsed {
        Value::Array(items) => items,
        other => {
            return Err(InputError::NotTabular(format!(
                "expected an array, got {}",
                json_type_name(&other)
            )))
        }
    };

    let mut columns: Vec<String> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let obj = item
            .as_object()
            .ok_or_else(|| InputError::NotTabular(format!("item {} is not an object", i)))?;
        for key in obj.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let mut rows = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let mut row = Vec::with_capacity(columns.len());
        for column in &columns {
            let cell = match item.get(column) {
                None => Cell::Null,
                Some(v) => Cell::from_json(v).ok_or_else(|| {
                    InputError::NotTabular(format!("item {} field '{}' is nested", i, column))
                })?,
            };
            row.push(cell);
        }
        rows.push(row);
    }

    Ok(Table::from_rows(columns, rows))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Detect the encoding of raw bytes using chardet.
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to a string using the given encoding. Never fails: unknown
/// encodings and invalid UTF-8 fall back to lossy decoding.
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned(),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Read an input file, detecting its encoding.
pub fn read_input_file(path: impl AsRef<Path>) -> InputResult<String> {
    let bytes = std::fs::read(path.as_ref())?;
    if let Ok(text) = std::str::from_utf8(&bytes) {
        return Ok(text.to_string());
    }
    let encoding = detect_encoding(&bytes);
    Ok(decode_content(&bytes, &encoding))
}
