//! # Vector file loading
//!
//! Prevalence and status vectors arrive as headerless single-column text
//! files, one value per line in population order. Lines starting with `#` are
//! comments. Values are parsed strictly: a bad line is reported with its
//! position rather than skipped, since dropping a line would silently shift
//! every later individual.

use crate::error::{ScreenError, validate_prevalences};
use crate::types::Status;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A comprehensive error type for all input loading failures.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Error reading delimited input: {0}")]
    CsvError(#[from] csv::Error),
    #[error("Failed to parse TOML file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Line {line} of '{}' holds '{value}', which is not a valid {expected}.", .path.display())]
    InvalidValue {
        path: PathBuf,
        line: u64,
        value: String,
        expected: &'static str,
    },
    #[error("'{}' contains no values.", .0.display())]
    Empty(PathBuf),
    #[error(transparent)]
    Screen(#[from] ScreenError),
}

/// Reads one value per line, parsing each with `parse`.
fn read_column<T>(
    path: &Path,
    expected: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Vec<T>, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .flexible(false)
        .from_path(path)?;

    let mut values = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());
        let field = record.get(0).unwrap_or_default();
        if record.len() != 1 {
            return Err(InputError::InvalidValue {
                path: path.to_path_buf(),
                line,
                value: record.iter().collect::<Vec<_>>().join(","),
                expected,
            });
        }
        match parse(field) {
            Some(v) => values.push(v),
            None => {
                return Err(InputError::InvalidValue {
                    path: path.to_path_buf(),
                    line,
                    value: field.to_string(),
                    expected,
                });
            }
        }
    }

    if values.is_empty() {
        return Err(InputError::Empty(path.to_path_buf()));
    }
    Ok(values)
}

/// Loads an ordered prevalence vector; every entry must lie in [0, 1].
pub fn read_prevalences(path: &Path) -> Result<Vec<f64>, InputError> {
    let prevalences = read_column(path, "prevalence", |s| s.parse::<f64>().ok())?;
    validate_prevalences(&prevalences)?;
    Ok(prevalences)
}

/// Loads a true-status vector of 0/1 values.
pub fn read_statuses(path: &Path) -> Result<Vec<Status>, InputError> {
    read_column(path, "status (0 or 1)", |s| {
        s.parse::<u8>().ok().and_then(|v| Status::try_from(v).ok())
    })
}

/// Writes `index<TAB>status<TAB>classification` rows.
pub fn write_classification<W: Write>(
    writer: W,
    truth: &[Status],
    classification: &[Status],
) -> Result<(), InputError> {
    let mut out = BufWriter::new(writer);
    writeln!(out, "index\tstatus\tclassification")?;
    for (idx, (x, x_hat)) in truth.iter().zip(classification).enumerate() {
        writeln!(out, "{idx}\t{x}\t{x_hat}")?;
    }
    out.flush()?;
    Ok(())
}

/// [`write_classification`] into a newly created file.
pub fn save_classification(
    path: &Path,
    truth: &[Status],
    classification: &[Status],
) -> Result<(), InputError> {
    write_classification(File::create(path)?, truth, classification)
}
