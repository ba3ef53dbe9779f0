//! CSV report writer
//!
//! Reports are written to timestamped files such as
//! `transfer-config-conflicts-2024-05-01-10-30-00.csv`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::error::FilesystemError;
use crate::infra::filesystem::write_file;

/// A row type that can be written to a CSV report
pub trait CsvRecord {
    /// Column names, in order
    fn headers() -> &'static [&'static str];

    /// Field values, in the same order as [`CsvRecord::headers`]
    fn fields(&self) -> Vec<String>;
}

/// Quote a field when it contains a delimiter, quote or line break
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Render records as CSV text with a header row
pub fn render<R: CsvRecord>(records: &[R]) -> String {
    let mut out = R::headers().join(",");
    out.push('\n');
    for record in records {
        let line: Vec<String> = record.fields().iter().map(|f| escape_field(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

/// Write records to `<dir>/<prefix>-<timestamp>.csv` and return the path
pub fn write_report<R: CsvRecord>(
    dir: &Path,
    prefix: &str,
    records: &[R],
    timestamp: DateTime<Local>,
) -> Result<PathBuf, FilesystemError> {
    let name = format!("{prefix}-{}.csv", timestamp.format("%Y-%m-%d-%H-%M-%S"));
    let path = dir.join(name);
    write_file(&path, render(records))?;
    Ok(path)
}
