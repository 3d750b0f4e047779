//! CSV normalizer: infers a minimal column schema and rewrites null markers.
//!
//! Two streaming passes over the downloaded export:
//!
//! 1. infer a type per column from every non-null cell;
//! 2. rewrite the file in place with null cells written as [`NULL_TOKEN`].
//!
//! Cells equal to `"n/a"` or the empty string are null. Only three column
//! types exist: integer, floating point and text. A column with any cell
//! that is not a valid integer falls back to float, then to text.
//!
//! Inference ignores surrounding whitespace, so numeric cells are written
//! back trimmed. Text cells are copied untouched.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;

/// Literal written for null cells.
pub const NULL_TOKEN: &str = "NULL";

const NULL_INPUTS: [&str; 2] = ["n/a", ""];

// =============================================================================
// Column types
// =============================================================================

/// Inferred column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Integer,
    Float,
    Text,
}

impl ColumnType {
    /// SQL-style name used in extract schemas.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Integer => "big_int",
            ColumnType::Float => "double",
            ColumnType::Text => "text",
        }
    }

    /// Widen to accommodate `value`.
    fn widen(self, value: &str) -> ColumnType {
        let value = value.trim();
        match self {
            ColumnType::Integer if value.parse::<i64>().is_ok() => ColumnType::Integer,
            ColumnType::Integer | ColumnType::Float
                if value.parse::<f64>().is_ok_and(f64::is_finite) =>
            {
                ColumnType::Float
            }
            _ => ColumnType::Text,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Outcome of a successful normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCsv {
    pub columns: Vec<Column>,
    pub row_count: u64,
}

impl NormalizedCsv {
    /// True when the export held a header but no data rows.
    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }
}

fn is_null(cell: &str) -> bool {
    NULL_INPUTS.contains(&cell)
}

fn csv_error(err: csv::Error) -> AppError {
    AppError::NormalizeError(err.to_string())
}

/// Unique, non-empty column names. Blank headers become `Unnamed: <index>`,
/// repeats get a `.<n>` suffix.
fn column_names(headers: &csv::StringRecord) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    headers
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            let base = if raw.trim().is_empty() {
                format!("Unnamed: {}", i)
            } else {
                raw.to_string()
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{}.{}", base, count)
            };
            *count += 1;
            name
        })
        .collect()
}

fn reader(path: &Path) -> Result<csv::Reader<std::fs::File>, AppError> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)
}

// =============================================================================
// Normalization
// =============================================================================

/// Infer column types and rewrite `csv_path` in place.
///
/// Returns `Ok(None)` for a file with no header at all; the caller treats
/// that as zero rows imported. Blank lines are skipped by the reader.
pub fn normalize(csv_path: &Path) -> Result<Option<NormalizedCsv>, AppError> {
    let mut rdr = reader(csv_path)?;
    let headers = rdr.headers().map_err(csv_error)?.clone();
    if headers.is_empty() {
        debug!(path = %csv_path.display(), "Empty CSV export");
        return Ok(None);
    }

    let names = column_names(&headers);
    let width = names.len();

    // Pass 1: inference. `None` until the first non-null cell is seen.
    let mut inferred: Vec<Option<ColumnType>> = vec![None; width];
    let mut record = csv::StringRecord::new();
    while rdr.read_record(&mut record).map_err(csv_error)? {
        if record.len() > width {
            return Err(AppError::NormalizeError(format!(
                "row {} has {} fields, header has {}",
                record.position().map_or(0, |p| p.line()),
                record.len(),
                width
            )));
        }
        for (slot, cell) in inferred.iter_mut().zip(record.iter()) {
            if is_null(cell) {
                continue;
            }
            *slot = Some(slot.unwrap_or(ColumnType::Integer).widen(cell));
        }
    }

    let columns: Vec<Column> = names
        .into_iter()
        .zip(inferred)
        .map(|(name, ty)| Column::new(name, ty.unwrap_or(ColumnType::Text)))
        .collect();

    // Pass 2: rewrite with explicit null tokens into a sibling temp file,
    // then swap it over the original.
    let dir = csv_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    let mut row_count = 0u64;
    {
        let mut wtr = csv::WriterBuilder::new().from_writer(tmp.as_file());
        wtr.write_record(columns.iter().map(|c| c.name.as_str()))
            .map_err(csv_error)?;

        let mut rdr = reader(csv_path)?;
        while rdr.read_record(&mut record).map_err(csv_error)? {
            let mut out: Vec<&str> = Vec::with_capacity(width);
            for (i, column) in columns.iter().enumerate() {
                match record.get(i) {
                    Some(cell) if !is_null(cell) => match column.column_type {
                        ColumnType::Text => out.push(cell),
                        ColumnType::Integer | ColumnType::Float => out.push(cell.trim()),
                    },
                    _ => out.push(NULL_TOKEN),
                }
            }
            wtr.write_record(&out).map_err(csv_error)?;
            row_count += 1;
        }
        wtr.flush()?;
    }
    tmp.persist(csv_path).map_err(|e| AppError::IoError(e.error))?;

    debug!(
        path = %csv_path.display(),
        columns = columns.len(),
        rows = row_count,
        "Normalized CSV"
    );

    Ok(Some(NormalizedCsv { columns, row_count }))
}
