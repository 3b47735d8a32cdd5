//! Writer for the tile summary table.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use super::loaders::{ReportField, TileReport, FILE_NAME_COLUMN};

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Union of the fields populated across `reports`, in first-appearance order.
pub fn summary_columns(reports: &[TileReport]) -> Vec<ReportField> {
    let mut columns: Vec<ReportField> = Vec::new();
    for field in reports.iter().flat_map(|r| r.fields()) {
        if !columns.contains(&field) {
            columns.push(field);
        }
    }
    columns
}

/// Write one row per report to a CSV table.
///
/// The header is `File Name` followed by every field that appeared in at
/// least one report. Fields a report lacks are written as empty cells. An
/// existing file at `path` is overwritten.
///
/// # Example
///
/// ```no_run
/// use lidar_pipeline::core::loaders::{ReportField, TileReport};
/// use lidar_pipeline::core::writers::write_summary_csv;
/// use std::path::Path;
///
/// let mut report = TileReport::new("tile_001");
/// report.set(ReportField::TotalPoints, "1024");
/// write_summary_csv(Path::new("summary.csv"), &[report]).unwrap();
/// ```
pub fn write_summary_csv(path: &Path, reports: &[TileReport]) -> Result<Vec<ReportField>> {
    ensure_parent_dirs(path)?;

    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut csv_writer = csv::Writer::from_writer(BufWriter::new(file));

    let path_str = path.display().to_string();
    let columns = summary_columns(reports);

    // Write header
    let header = std::iter::once(FILE_NAME_COLUMN).chain(columns.iter().map(|f| f.column()));
    csv_writer
        .write_record(header)
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    // Write data rows
    for report in reports {
        let row = std::iter::once(report.name.as_str())
            .chain(columns.iter().map(|&f| report.get(f).unwrap_or("")));
        csv_writer
            .write_record(row)
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(columns)
}
