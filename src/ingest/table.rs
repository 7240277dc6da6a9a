//! Raw tabular input as read from CSV

use std::io::Read;
use std::path::Path;

use crate::types::*;

/// Header row plus string cells, before any typing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Build a table from in-memory headers and rows
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Convenience constructor for string literals
    pub fn from_rows(headers: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    /// Read a CSV file; the first record is the header
    pub fn from_path<P: AsRef<Path>>(path: P) -> ReconResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| ReconError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::read(file).map_err(|source| ReconError::Load {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Read CSV from any reader; ragged rows are tolerated
    pub fn read<R: Read>(reader: R) -> Result<Self, csv::Error> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(reader);

        let headers = reader.headers()?.iter().map(str::to_string).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
