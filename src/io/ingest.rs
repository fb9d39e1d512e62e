//! Raw plate export ingest.
//!
//! This module is responsible for turning a plate reader export into a clean
//! `RawGrid` of readings:
//!
//! - **Best-effort decoding**: invalid UTF-8 sequences (instrument exports often
//!   carry a stray degree sign or similar in Latin-1) are dropped and counted,
//!   never fatal
//! - **Declarative region**: header/footer skipping and the column range come
//!   from a `RegionDescriptor`, not from ad-hoc line arithmetic
//! - **Strict shape**: short rows or missing lines are `ShapeMismatch` errors;
//!   we never silently truncate
//! - **Separation of concerns**: no aggregation or fitting logic here

use std::fs;
use std::path::Path;

use crate::domain::{RawGrid, RegionDescriptor, RowSpan};
use crate::error::{AppError, ErrorKind};

/// Decoded text plus how many bytes had to be dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitized {
    pub text: String,
    pub dropped_bytes: usize,
}

/// Decode bytes as UTF-8, dropping invalid sequences.
pub fn sanitize_bytes(bytes: &[u8]) -> Sanitized {
    let mut text = String::with_capacity(bytes.len());
    let mut dropped_bytes = 0;
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
        dropped_bytes += chunk.invalid().len();
    }
    Sanitized { text, dropped_bytes }
}

/// Ingest output: parsed grid + decoding diagnostics.
#[derive(Debug, Clone)]
pub struct IngestedPlate {
    pub grid: RawGrid,
    pub dropped_bytes: usize,
}

/// Read, sanitise and parse one export file.
pub fn load_raw_grid(path: &Path, region: &RegionDescriptor) -> Result<IngestedPlate, AppError> {
    let bytes = fs::read(path)
        .map_err(|e| AppError::io(format!("Failed to read '{}': {e}", path.display())))?;
    let sanitized = sanitize_bytes(&bytes);
    let grid = parse_region(&sanitized.text, region)?;
    Ok(IngestedPlate {
        grid,
        dropped_bytes: sanitized.dropped_bytes,
    })
}

/// Parse the data region of an export into a grid.
pub fn parse_region(text: &str, region: &RegionDescriptor) -> Result<RawGrid, AppError> {
    let lines: Vec<&str> = text.lines().collect();
    let total = lines.len();

    let start = region.header_lines;
    let end = match region.rows {
        RowSpan::Count(n) => start + n,
        RowSpan::SkipFooter(n) => total.saturating_sub(n),
    };
    if end > total || start > end {
        return Err(AppError::shape(format!(
            "Export has {total} lines; the data region needs lines {}..{end}.",
            start + 1
        )));
    }

    let mut body = lines[start..end].join("\n");
    body.push('\n');

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());

    let first = region.first_column;
    let last = first + region.column_count;
    let mut rows = Vec::with_capacity(end - start);

    for (idx, result) in reader.records().enumerate() {
        // 1-based line number in the export.
        let line = start + idx + 1;
        let record = result.map_err(|e| AppError::new(ErrorKind::Parse, format!("Line {line}: {e}")))?;

        if record.len() < last {
            return Err(AppError::shape(format!(
                "Line {line} has {} fields; columns {first}..{last} are required.",
                record.len()
            )));
        }

        let row = (first..last)
            .map(|col| parse_cell(&record[col], line, col))
            .collect::<Result<Vec<f64>, AppError>>()?;
        rows.push(row);
    }

    // csv skips blank lines; a region with holes is too short.
    let expected = end - start;
    if rows.len() != expected {
        return Err(AppError::shape(format!(
            "Data region has {} readable rows, expected {expected}.",
            rows.len()
        )));
    }

    RawGrid::new(rows)
}

fn parse_cell(cell: &str, line: usize, col: usize) -> Result<f64, AppError> {
    if cell.is_empty() {
        return Err(AppError::shape(format!("Line {line}, column {col} is empty.")));
    }
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(AppError::new(
            ErrorKind::Parse,
            format!("Line {line}, column {col}: '{cell}' is not a finite number."),
        )),
    }
}
