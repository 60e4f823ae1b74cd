//! Screen rows produced by the external sketcher (mash screen).
//!
//! Fixed schema: similarity, shared hashes, median multiplicity, p-value,
//! reference id. Only similarity and the reference id feed the selector;
//! the middle columns are validated for shape and otherwise ignored.

use std::io::BufRead;
use std::path::Path;

use crate::{HymetError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ScreenRow {
    pub similarity: f64,
    pub reference_id: String,
}

impl ScreenRow {
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 5 {
            return Err(HymetError::Other(format!(
                "screen row has {} columns, expected 5",
                fields.len()
            )));
        }
        let similarity: f64 = fields[0]
            .parse()
            .map_err(|_| HymetError::Other(format!("invalid similarity: {:?}", fields[0])))?;
        if !(0.0..=1.0).contains(&similarity) {
            return Err(HymetError::Other(format!(
                "similarity {} outside [0, 1]",
                similarity
            )));
        }
        let reference_id = fields[4].trim().to_string();
        if reference_id.is_empty() {
            return Err(HymetError::Other("screen row has empty reference id".into()));
        }
        Ok(Self {
            similarity,
            reference_id,
        })
    }
}

/// Read all rows from a screen table (plain or gzipped). Blank lines and
/// `#` comments are skipped.
pub fn read_screen_rows(path: &Path) -> Result<Vec<ScreenRow>> {
    let reader = super::taxonomy::open_maybe_gz(path)?;
    let mut rows = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        rows.push(ScreenRow::parse(&line)?);
    }
    Ok(rows)
}
