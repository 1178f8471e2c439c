//! Raw algorithm output -> canonical trajectory (`t tx ty tz qx qy qz qw`).

use crate::error::{BenchError, Result};
use crate::output::atomic_write_bytes;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Position (3) + orientation quaternion (4).
pub const POSE_DIM: usize = 7;
pub const CANONICAL_COLUMNS: usize = 1 + POSE_DIM;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawDelimiter {
    /// Comma separated, first row is a header.
    CommaWithHeader,
    /// Any run of whitespace, no header. `#` starts a comment line.
    Whitespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSchema {
    pub columns: usize,
    pub delimiter: RawDelimiter,
    /// Raw column indices projected into the canonical layout, in order.
    pub keep: &'static [usize],
}

impl RawSchema {
    pub fn extension(&self) -> &'static str {
        match self.delimiter {
            RawDelimiter::CommaWithHeader => "csv",
            RawDelimiter::Whitespace => "txt",
        }
    }
}

/// Converts `raw_path` into the canonical layout at `output_path` and removes
/// the raw file. Nothing appears at `output_path` unless every row converts.
/// On error the raw file is left in place for inspection.
pub fn normalize_trajectory(raw_path: &Path, output_path: &Path, schema: &RawSchema) -> Result<usize> {
    debug_assert_eq!(schema.keep.len(), CANONICAL_COLUMNS);
    let rows = match schema.delimiter {
        RawDelimiter::CommaWithHeader => read_csv_rows(raw_path, schema.columns)?,
        RawDelimiter::Whitespace => read_whitespace_rows(raw_path, schema.columns)?,
    };
    if rows.is_empty() {
        warn!(raw = %raw_path.display(), "raw trajectory has no rows");
    }

    let mut out = String::new();
    for row in &rows {
        let line = schema
            .keep
            .iter()
            .map(|&i| format!("{:.6}", row[i]))
            .collect::<Vec<_>>()
            .join(" ");
        let _ = writeln!(out, "{}", line);
    }
    atomic_write_bytes(output_path, out.as_bytes())?;
    fs::remove_file(raw_path)?;
    info!(
        rows = rows.len(),
        output = %output_path.display(),
        "saved trajectory in canonical format"
    );
    Ok(rows.len())
}

fn read_csv_rows(path: &Path, columns: usize) -> Result<Vec<Vec<f64>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;
    let header_len = reader.headers().map_err(|e| csv_error(path, e))?.len();
    if header_len != columns {
        return Err(column_mismatch(path, columns, header_len, 1));
    }
    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| csv_error(path, e))?;
        let line_no = idx + 2;
        if record.len() != columns {
            return Err(column_mismatch(path, columns, record.len(), line_no));
        }
        rows.push(parse_cells(path, record.iter(), line_no)?);
    }
    Ok(rows)
}

fn read_whitespace_rows(path: &Path, columns: usize) -> Result<Vec<Vec<f64>>> {
    let text = fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::InvalidData => BenchError::format(path, "raw trajectory is not valid UTF-8"),
        _ => BenchError::Io(e),
    })?;
    let mut rows = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let cells: Vec<&str> = trimmed.split_whitespace().collect();
        if cells.len() != columns {
            return Err(column_mismatch(path, columns, cells.len(), idx + 1));
        }
        rows.push(parse_cells(path, cells.into_iter(), idx + 1)?);
    }
    Ok(rows)
}

fn parse_cells<'a>(
    path: &Path,
    cells: impl Iterator<Item = &'a str>,
    line_no: usize,
) -> Result<Vec<f64>> {
    cells
        .map(|cell| {
            cell.parse::<f64>().map_err(|_| {
                BenchError::format(path, format!("line {}: non-numeric value '{}'", line_no, cell))
            })
        })
        .collect()
}

fn column_mismatch(path: &Path, expected: usize, found: usize, line_no: usize) -> BenchError {
    BenchError::format(
        path,
        format!(
            "line {}: expected {} columns, found {} (algorithm saved file in wrong format)",
            line_no, expected, found
        ),
    )
}

fn csv_error(path: &Path, err: csv::Error) -> BenchError {
    match err.into_kind() {
        csv::ErrorKind::Io(e) => BenchError::Io(e),
        other => BenchError::format(path, format!("{:?}", other)),
    }
}
