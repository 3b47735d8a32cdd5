//! Tile report aggregation into a single summary table.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;

use crate::core::loaders::{parse_report, ReportField, TileReport};
use crate::core::writers::write_summary_csv;

/// What a summary run produced.
#[derive(Debug, Clone)]
pub struct SummaryOutcome {
    pub reports: Vec<TileReport>,
    pub columns: Vec<ReportField>,
    pub output: PathBuf,
}

/// Find report files directly under `input_dir`.
///
/// Only regular files whose name ends in `.{extension}` are returned, in
/// directory listing order.
pub fn find_reports(input_dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let suffix = format!(".{}", extension);
    let entries = fs::read_dir(input_dir)
        .with_context(|| format!("Failed to read directory '{}'", input_dir.display()))?;

    let mut reports = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("Failed to read entry in '{}'", input_dir.display()))?;
        let path = entry.path();
        let matches_suffix = entry
            .file_name()
            .as_encoded_bytes()
            .ends_with(suffix.as_bytes());

        if matches_suffix && path.is_file() {
            reports.push(path);
        }
    }

    Ok(reports)
}

/// Parse every report under `input_dir`, one record per file.
pub fn collect_reports(input_dir: &Path, extension: &str) -> Result<Vec<TileReport>> {
    find_reports(input_dir, extension)?
        .iter()
        .map(|path| {
            debug!("parsing report '{}'", path.display());
            parse_report(path).map_err(anyhow::Error::from)
        })
        .collect()
}

/// Parse all reports in `input_dir` and write the summary table to `output`.
pub fn summarize_tiles(input_dir: &Path, output: &Path, extension: &str) -> Result<SummaryOutcome> {
    let reports = collect_reports(input_dir, extension)?;
    let columns = write_summary_csv(output, &reports)
        .with_context(|| format!("Failed to write summary '{}'", output.display()))?;

    Ok(SummaryOutcome {
        reports,
        columns,
        output: output.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_report(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        write!(file, "{}", body).unwrap();
        path
    }

    const TILE_A: &str = "\
  extended number of point records: 1000
  min x y z:                  1.00 2.00 3.00
  max x y z:                  4.00 5.00 6.00
       250  ground (2)
";

    const TILE_B: &str = "\
  extended number of point records: 2000
  max x y z:                  7.00 8.00 9.00
";

    #[test]
    fn test_find_reports_filters_suffix_and_dirs() {
        let temp_dir = TempDir::new().unwrap();
        write_report(temp_dir.path(), "tileA.txt", TILE_A);
        write_report(temp_dir.path(), "tileA.laz", "binary");
        write_report(temp_dir.path(), "notes.TXT", "upper case");
        fs::create_dir(temp_dir.path().join("folder.txt")).unwrap();

        let found = find_reports(temp_dir.path(), "txt").unwrap();
        assert_eq!(found, vec![temp_dir.path().join("tileA.txt")]);
    }

    // Some filesystems (APFS) refuse names that are not UTF-8
    #[cfg(target_os = "linux")]
    #[test]
    fn test_find_reports_accepts_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().unwrap();
        let name = OsStr::from_bytes(b"tile\xff.txt");
        let path = temp_dir.path().join(name);
        File::create(&path).unwrap();

        let found = find_reports(temp_dir.path(), "txt").unwrap();
        assert_eq!(found, vec![path]);
    }

    #[test]
    fn test_summarize_two_tiles() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("reports");
        fs::create_dir(&input).unwrap();
        write_report(&input, "tileA.txt", TILE_A);
        write_report(&input, "tileB.txt", TILE_B);
        let output = temp_dir.path().join("summary.csv");

        let outcome = summarize_tiles(&input, &output, "txt").unwrap();
        assert_eq!(outcome.reports.len(), 2);
        assert_eq!(outcome.columns.len(), 8);

        let mut reader = csv::Reader::from_path(&output).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), 9);
        assert_eq!(&headers[0], "File Name");

        let col = |name: &str| headers.iter().position(|h| h == name).unwrap();
        let mut rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        rows.sort_by(|a, b| a[0].cmp(&b[0]));

        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "tileA");
        assert_eq!(&rows[0][col("minZ")], "3.00");
        assert_eq!(&rows[0][col("ground_count")], "250");
        assert_eq!(&rows[1][0], "tileB");
        assert_eq!(&rows[1][col("minX")], "");
        assert_eq!(&rows[1][col("maxY")], "8.00");
        assert_eq!(&rows[1][col("total_num_of_points")], "2000");
    }

    #[test]
    fn test_columns_limited_to_fields_seen() {
        let temp_dir = TempDir::new().unwrap();
        write_report(temp_dir.path(), "tileB.txt", TILE_B);
        let output = temp_dir.path().join("out.csv");

        summarize_tiles(temp_dir.path(), &output, "txt").unwrap();

        let content = fs::read_to_string(&output).unwrap();
        let header = content.lines().next().unwrap();
        assert_eq!(header, "File Name,total_num_of_points,maxX,maxY,maxZ");
    }

    #[test]
    fn test_missing_input_dir_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = summarize_tiles(
            &temp_dir.path().join("nope"),
            &temp_dir.path().join("out.csv"),
            "txt",
        );
        assert!(result.is_err());
    }
}
