//! Query scanning.
//!
//! The pipeline needs two things from the query file before any external
//! tool runs: the ordered list of query ids (the assignment table is written
//! in input order) and the query count (the candidate floor scales with it).
//! This scanner streams FASTA or FASTQ, plain or gzipped, and keeps only
//! `(id, length)` pairs.

use std::collections::HashSet;
use std::io::BufRead;
use std::path::Path;

use crate::{HymetError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryInfo {
    pub id: String,
    pub length: u64,
}

/// Scan a FASTA or FASTQ file. The format is chosen from the first
/// non-empty line (`>` or `@`). Duplicate ids and empty files are errors.
pub fn scan_queries(path: &Path) -> Result<Vec<QueryInfo>> {
    if !path.exists() {
        return Err(HymetError::MissingInput(path.display().to_string()));
    }
    let mut reader = super::taxonomy::open_maybe_gz(path)?;

    let mut first = String::new();
    loop {
        first.clear();
        if reader.read_line(&mut first)? == 0 {
            return Err(HymetError::MissingInput(format!(
                "{}: no sequences found",
                path.display()
            )));
        }
        if !first.trim().is_empty() {
            break;
        }
    }

    let queries = match first.as_bytes().first() {
        Some(b'>') => scan_fasta(&first, reader)?,
        Some(b'@') => scan_fastq(&first, reader)?,
        _ => {
            return Err(HymetError::MissingInput(format!(
                "{}: not a FASTA or FASTQ file",
                path.display()
            )))
        }
    };

    if queries.is_empty() {
        return Err(HymetError::MissingInput(format!(
            "{}: no sequences found",
            path.display()
        )));
    }

    let mut seen = HashSet::with_capacity(queries.len());
    for q in &queries {
        if !seen.insert(q.id.as_str()) {
            return Err(HymetError::MissingInput(format!(
                "duplicate query id: {}",
                q.id
            )));
        }
    }
    Ok(queries)
}

fn header_id(line: &str) -> String {
    line[1..]
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_string()
}

fn scan_fasta(first: &str, reader: Box<dyn BufRead + Send>) -> Result<Vec<QueryInfo>> {
    let mut queries = Vec::new();
    let mut id = header_id(first);
    let mut length: u64 = 0;

    for line in reader.lines() {
        let line = line?;
        if let Some(rest) = line.strip_prefix('>') {
            queries.push(QueryInfo { id, length });
            id = rest.split_whitespace().next().unwrap_or("").to_string();
            length = 0;
        } else {
            length += line.trim().len() as u64;
        }
    }
    queries.push(QueryInfo { id, length });
    Ok(queries)
}

fn scan_fastq(first: &str, reader: Box<dyn BufRead + Send>) -> Result<Vec<QueryInfo>> {
    let mut queries = Vec::new();
    let mut header = first.to_string();
    let mut lines = reader.lines();

    loop {
        let seq = match lines.next() {
            Some(line) => line?,
            None => {
                return Err(HymetError::MissingInput(
                    "truncated FASTQ record".into(),
                ))
            }
        };
        let plus = lines.next().transpose()?;
        let qual = lines.next().transpose()?;
        if plus.is_none() || qual.is_none() {
            return Err(HymetError::MissingInput("truncated FASTQ record".into()));
        }
        queries.push(QueryInfo {
            id: header_id(&header),
            length: seq.trim().len() as u64,
        });

        header = match lines.next() {
            Some(line) => line?,
            None => break,
        };
        if header.trim().is_empty() {
            break;
        }
        if !header.starts_with('@') {
            return Err(HymetError::MissingInput(format!(
                "malformed FASTQ header: {:?}",
                header
            )));
        }
    }
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn scans_fasta_ids_and_lengths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.fasta");
        std::fs::write(&path, ">q1 sample contig\nACGT\nACGT\n>q2\nACG\n").unwrap();
        let queries = scan_queries(&path).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0], QueryInfo { id: "q1".into(), length: 8 });
        assert_eq!(queries[1], QueryInfo { id: "q2".into(), length: 3 });
    }

    #[test]
    fn scans_fastq() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reads.fastq");
        std::fs::write(&path, "@r1\nACGTACGT\n+\nFFFFFFFF\n@r2\nACGT\n+\nFFFF\n").unwrap();
        let queries = scan_queries(&path).unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].length, 8);
        assert_eq!(queries[1].id, "r2");
    }

    #[test]
    fn gzipped_fasta() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.fasta.gz");
        let file = std::fs::File::create(&path).unwrap();
        let mut enc = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        enc.write_all(b">q1\nACGTAC\n").unwrap();
        enc.finish().unwrap();
        let queries = scan_queries(&path).unwrap();
        assert_eq!(queries[0].length, 6);
    }

    #[test]
    fn duplicate_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dup.fasta");
        std::fs::write(&path, ">q1\nAC\n>q1\nGT\n").unwrap();
        assert!(scan_queries(&path).is_err());
    }

    #[test]
    fn missing_file_is_missing_input() {
        let err = scan_queries(Path::new("/nonexistent/queries.fa")).unwrap_err();
        assert!(matches!(err, HymetError::MissingInput(_)));
    }

    #[test]
    fn empty_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.fasta");
        std::fs::write(&path, "").unwrap();
        assert!(scan_queries(&path).is_err());
    }
}
