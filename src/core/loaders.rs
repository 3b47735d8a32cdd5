//! Loader for per-tile LAS info text reports.
//!
//! Each report is scanned line by line against a fixed rule table. A line is
//! claimed by the first rule whose label it contains; a claimed line either
//! fills all of that rule's fields or none of them.

use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while loading a report.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("failed to open report '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read report '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, ReportError>;

/// Column name for the record key.
pub const FILE_NAME_COLUMN: &str = "File Name";

/// A value that can be pulled out of a tile report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReportField {
    TotalPoints,
    MinX,
    MinY,
    MinZ,
    MaxX,
    MaxY,
    MaxZ,
    GroundCount,
}

impl ReportField {
    /// Column header used in the summary table.
    pub const fn column(self) -> &'static str {
        match self {
            ReportField::TotalPoints => "total_num_of_points",
            ReportField::MinX => "minX",
            ReportField::MinY => "minY",
            ReportField::MinZ => "minZ",
            ReportField::MaxX => "maxX",
            ReportField::MaxY => "maxY",
            ReportField::MaxZ => "maxZ",
            ReportField::GroundCount => "ground_count",
        }
    }
}

impl fmt::Display for ReportField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// How a matched line is turned into values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseRule {
    /// Whitespace tokens after the last `": "`; count must equal the field count.
    TrailingTokens,
    /// First whitespace token of the line.
    LeadingCount,
}

/// Maps a label substring to the fields its line populates.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRule {
    pub label: &'static str,
    pub fields: &'static [ReportField],
    pub parse: ParseRule,
}

impl ExtractionRule {
    /// Extract `(field, value)` pairs from a line already known to match.
    ///
    /// Returns an empty vector when the token count does not fit the rule.
    fn extract<'a>(&self, line: &'a str) -> Vec<(ReportField, &'a str)> {
        match self.parse {
            ParseRule::LeadingCount => match (self.fields.first(), line.split_whitespace().next()) {
                (Some(&field), Some(count)) => vec![(field, count)],
                _ => Vec::new(),
            },
            ParseRule::TrailingTokens => {
                let tail = line.trim().rsplit(": ").next().unwrap_or("");
                let tokens: Vec<&str> = tail.split_whitespace().collect();
                if tokens.len() != self.fields.len() {
                    return Vec::new();
                }
                self.fields.iter().copied().zip(tokens).collect()
            }
        }
    }
}

/// The fixed rule table, tested in this order against every line.
pub const EXTRACTION_RULES: [ExtractionRule; 4] = [
    ExtractionRule {
        label: "extended number of point records:",
        fields: &[ReportField::TotalPoints],
        parse: ParseRule::TrailingTokens,
    },
    ExtractionRule {
        label: "min x y z:",
        fields: &[ReportField::MinX, ReportField::MinY, ReportField::MinZ],
        parse: ParseRule::TrailingTokens,
    },
    ExtractionRule {
        label: "max x y z:",
        fields: &[ReportField::MaxX, ReportField::MaxY, ReportField::MaxZ],
        parse: ParseRule::TrailingTokens,
    },
    ExtractionRule {
        label: "ground",
        fields: &[ReportField::GroundCount],
        parse: ParseRule::LeadingCount,
    },
];

/// One row of the summary: a report's key plus the fields found in it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileReport {
    /// Report file name without its extension.
    pub name: String,
    /// Extracted values in the order each field was first seen.
    values: Vec<(ReportField, String)>,
}

impl TileReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    /// Set a field, keeping its original position if it was already set.
    pub fn set(&mut self, field: ReportField, value: impl Into<String>) {
        let value = value.into();
        match self.values.iter_mut().find(|(f, _)| *f == field) {
            Some(slot) => slot.1 = value,
            None => self.values.push((field, value)),
        }
    }

    pub fn get(&self, field: ReportField) -> Option<&str> {
        self.values
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
    }

    /// Fields present in this record, in first-seen order.
    pub fn fields(&self) -> impl Iterator<Item = ReportField> + '_ {
        self.values.iter().map(|(f, _)| *f)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Apply the rule table to a single line.
pub fn apply_rules(report: &mut TileReport, line: &str) {
    if let Some(rule) = EXTRACTION_RULES.iter().find(|rule| line.contains(rule.label)) {
        for (field, value) in rule.extract(line) {
            report.set(field, value);
        }
    }
}

/// Parse report text from any buffered reader.
pub fn parse_report_lines<R: BufRead>(name: &str, reader: R) -> std::io::Result<TileReport> {
    let mut report = TileReport::new(name);
    for line in reader.lines() {
        apply_rules(&mut report, &line?);
    }
    Ok(report)
}

/// Record key for a report path: the file name with its extension stripped.
pub fn report_key(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Load and parse a single report file.
pub fn parse_report(path: &Path) -> Result<TileReport> {
    let file = File::open(path).map_err(|source| ReportError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    parse_report_lines(&report_key(path), BufReader::new(file)).map_err(|source| {
        ReportError::Read {
            path: path.to_path_buf(),
            source,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use tempfile::Builder;

    const FULL_REPORT: &str = "\
lasinfo (240220) report for 'tileA.laz'
reporting all LAS header entries:
  version major.minor:        1.4
  extended number of point records: 1234567
  scale factor x y z:         0.01 0.01 0.01
  min x y z:                  500000.00 4100000.00 12.34
  max x y z:                  501000.00 4101000.00 98.76
histogram of classification of points:
          456789  ground (2)
";

    fn parse(text: &str) -> TileReport {
        parse_report_lines("tile", Cursor::new(text)).unwrap()
    }

    #[test]
    fn test_full_report_populates_every_field() {
        let report = parse(FULL_REPORT);

        assert_eq!(report.get(ReportField::TotalPoints), Some("1234567"));
        assert_eq!(report.get(ReportField::MinX), Some("500000.00"));
        assert_eq!(report.get(ReportField::MinY), Some("4100000.00"));
        assert_eq!(report.get(ReportField::MinZ), Some("12.34"));
        assert_eq!(report.get(ReportField::MaxX), Some("501000.00"));
        assert_eq!(report.get(ReportField::MaxY), Some("4101000.00"));
        assert_eq!(report.get(ReportField::MaxZ), Some("98.76"));
        assert_eq!(report.get(ReportField::GroundCount), Some("456789"));
        assert_eq!(report.len(), 8);
    }

    #[test]
    fn test_missing_min_line_leaves_fields_absent() {
        let text: String = FULL_REPORT
            .lines()
            .filter(|l| !l.contains("min x y z:"))
            .map(|l| format!("{}\n", l))
            .collect();
        let report = parse(&text);

        assert_eq!(report.get(ReportField::MinX), None);
        assert_eq!(report.get(ReportField::MinY), None);
        assert_eq!(report.get(ReportField::MinZ), None);
        assert_eq!(report.get(ReportField::MaxZ), Some("98.76"));
        assert_eq!(report.get(ReportField::TotalPoints), Some("1234567"));
    }

    #[test]
    fn test_token_count_mismatch_drops_whole_line() {
        let report = parse("  min x y z:    1.0 2.0\n");
        assert!(report.is_empty());

        let report = parse("  max x y z:    1.0 2.0 3.0 4.0\n");
        assert!(report.is_empty());
    }

    #[test]
    fn test_first_matching_rule_wins() {
        // Contains both the min label and "ground"; only the min rule applies
        let report = parse("  min x y z: 1 2 3 ground\n");
        assert_eq!(report.get(ReportField::GroundCount), None);
        assert!(report.get(ReportField::MinX).is_none());

        let report = parse("  min x y z: 1 2 3\n  42 ground\n");
        assert_eq!(report.get(ReportField::MinZ), Some("3"));
        assert_eq!(report.get(ReportField::GroundCount), Some("42"));
    }

    #[test]
    fn test_ground_takes_leading_token() {
        let report = parse("       17  ground (2)\n");
        assert_eq!(report.get(ReportField::GroundCount), Some("17"));
    }

    #[test]
    fn test_later_line_overwrites_in_place() {
        let report = parse("   5 ground\n  min x y z: 1 2 3\n   9 ground\n");
        assert_eq!(report.get(ReportField::GroundCount), Some("9"));

        let order: Vec<ReportField> = report.fields().collect();
        assert_eq!(order[0], ReportField::GroundCount);
        assert_eq!(order[1], ReportField::MinX);
    }

    #[test]
    fn test_tail_uses_last_colon_space() {
        let report = parse("extended number of point records: total: 99\n");
        assert_eq!(report.get(ReportField::TotalPoints), Some("99"));
    }

    #[test]
    fn test_parse_report_uses_file_stem() {
        let mut file = Builder::new().suffix(".txt").tempfile().unwrap();
        write!(file, "{}", FULL_REPORT).unwrap();

        let report = parse_report(file.path()).unwrap();
        let expected = file
            .path()
            .file_stem()
            .unwrap()
            .to_string_lossy()
            .to_string();
        assert_eq!(report.name, expected);
        assert_eq!(report.len(), 8);
    }

    #[test]
    fn test_parse_report_missing_file() {
        let result = parse_report(Path::new("/nonexistent/tile.txt"));
        assert!(matches!(result, Err(ReportError::Open { .. })));
    }
}
