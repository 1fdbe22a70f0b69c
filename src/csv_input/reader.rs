use std::{collections::HashMap, fs::File, path::Path, rc::Rc};

use anyhow::Context;
use thiserror::Error;

/// The header of a CSV file lacks columns the pipeline needs.
#[derive(Error, Debug, PartialEq)]
#[error("{path}: missing required column(s) {}", .missing.join(", "))]
pub struct MissingFieldError {
    pub path: String,
    pub missing: Vec<String>,
}

/// A CSV row that could not be decoded at all, e.g. because it is not valid UTF-8.
#[derive(Error, Debug)]
#[error("row {row}: could not be read, {message}")]
pub struct UnreadableRowError {
    pub row: usize,
    pub line: Option<u64>,
    pub message: String,
}

/// One data row of a CSV file. Values are looked up by column name.
#[derive(Debug, Clone)]
pub struct InputRecord {
    /// 1-based position of the row among the data rows, the header not counted.
    pub row_number: usize,
    /// Line in the source file where the row starts, if known.
    pub line: Option<u64>,
    header: Rc<Header>,
    values: csv::StringRecord,
}

#[derive(Debug)]
struct Header {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl InputRecord {
    /// Raw value of a column, `None` when the column is unknown or the row is too short.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.header
            .positions
            .get(column)
            .and_then(|position| self.values.get(*position))
    }
}

/// Single-pass reader producing `InputRecord`s from a comma separated file with a header row.
pub struct CsvRecordReader {
    records: csv::StringRecordsIntoIter<File>,
    header: Rc<Header>,
    rows_read: usize,
}

impl CsvRecordReader {
    /// Open `filepath` and check that every column in `required_columns` is in its header.
    pub fn open(filepath: &Path, required_columns: &[&str]) -> anyhow::Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_path(filepath)
            .with_context(|| format!("Opening CSV file {:?}", filepath))?;
        let names: Vec<String> = reader
            .headers()
            .with_context(|| format!("Reading CSV header of {:?}", filepath))?
            .iter()
            .map(|name| name.trim_start_matches('\u{feff}').to_string())
            .collect();

        let missing: Vec<String> = required_columns
            .iter()
            .filter(|column| !names.iter().any(|name| name == *column))
            .map(|column| column.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(MissingFieldError {
                path: filepath.display().to_string(),
                missing,
            }
            .into());
        }

        // With duplicate column names, the first occurrence wins.
        let mut positions = HashMap::new();
        for (position, name) in names.iter().enumerate() {
            positions.entry(name.clone()).or_insert(position);
        }

        Ok(Self {
            records: reader.into_records(),
            header: Rc::new(Header { names, positions }),
            rows_read: 0,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.header.names
    }
}

impl Iterator for CsvRecordReader {
    type Item = Result<InputRecord, UnreadableRowError>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.records.next()?;
        self.rows_read += 1;
        Some(match result {
            Ok(values) => Ok(InputRecord {
                row_number: self.rows_read,
                line: values.position().map(|position| position.line()),
                header: Rc::clone(&self.header),
                values,
            }),
            Err(err) => Err(UnreadableRowError {
                row: self.rows_read,
                line: err.position().map(|position| position.line()),
                message: err.to_string(),
            }),
        })
    }
}
