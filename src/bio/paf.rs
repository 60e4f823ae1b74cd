//! PAF alignment records.
//!
//! Fixed schema: the twelve mandatory columns are parsed, trailing tag
//! columns are ignored. Coordinates are 0-based, half-open on the query.

use crate::{HymetError, Result};

/// One alignment line.
#[derive(Debug, Clone, PartialEq)]
pub struct PafRecord {
    pub query_id: String,
    pub query_len: u64,
    pub query_start: u64,
    pub query_end: u64,
    pub strand: char,
    pub target_id: String,
    pub target_len: u64,
    pub target_start: u64,
    pub target_end: u64,
    pub matches: u64,
    pub aln_len: u64,
    pub mapq: u8,
}

impl PafRecord {
    /// Parse one tab-separated line. Columns beyond the twelfth are ignored.
    pub fn parse(line: &str) -> Result<Self> {
        let mut fields = line.split('\t');
        let mut next = |name: &str| {
            fields
                .next()
                .ok_or_else(|| HymetError::AlignmentStream(format!("missing column: {}", name)))
        };

        let query_id = next("query_id")?.to_string();
        let query_len = parse_u64(next("query_len")?, "query_len")?;
        let query_start = parse_u64(next("query_start")?, "query_start")?;
        let query_end = parse_u64(next("query_end")?, "query_end")?;
        let strand_field = next("strand")?;
        let target_id = next("target_id")?.to_string();
        let target_len = parse_u64(next("target_len")?, "target_len")?;
        let target_start = parse_u64(next("target_start")?, "target_start")?;
        let target_end = parse_u64(next("target_end")?, "target_end")?;
        let matches = parse_u64(next("matches")?, "matches")?;
        let aln_len = parse_u64(next("aln_len")?, "aln_len")?;
        let mapq = parse_u64(next("mapq")?, "mapq")?;

        let strand = match strand_field {
            "+" => '+',
            "-" => '-',
            other => {
                return Err(HymetError::AlignmentStream(format!(
                    "invalid strand: {:?}",
                    other
                )))
            }
        };
        if mapq > 255 {
            return Err(HymetError::AlignmentStream(format!(
                "mapq out of range: {}",
                mapq
            )));
        }

        let record = Self {
            query_id,
            query_len,
            query_start,
            query_end,
            strand,
            target_id,
            target_len,
            target_start,
            target_end,
            matches,
            aln_len,
            mapq: mapq as u8,
        };
        record.check()?;
        Ok(record)
    }

    /// Enforce the record invariants: 0 <= qs < qe <= qlen, matches <= aln_len.
    fn check(&self) -> Result<()> {
        if self.query_id.is_empty() || self.target_id.is_empty() {
            return Err(HymetError::AlignmentStream("empty sequence id".into()));
        }
        if self.query_start >= self.query_end || self.query_end > self.query_len {
            return Err(HymetError::AlignmentStream(format!(
                "query interval [{}, {}) out of bounds for length {}",
                self.query_start, self.query_end, self.query_len
            )));
        }
        if self.matches > self.aln_len {
            return Err(HymetError::AlignmentStream(format!(
                "matches {} exceed alignment length {}",
                self.matches, self.aln_len
            )));
        }
        Ok(())
    }
}

fn parse_u64(field: &str, name: &str) -> Result<u64> {
    field
        .parse::<u64>()
        .map_err(|_| HymetError::AlignmentStream(format!("invalid {}: {:?}", name, field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINE: &str = "q1\t1000\t0\t500\t+\tr1\t5000\t100\t600\t480\t505\t60";

    #[test]
    fn parses_mandatory_columns() {
        let rec = PafRecord::parse(LINE).unwrap();
        assert_eq!(rec.query_id, "q1");
        assert_eq!(rec.query_len, 1000);
        assert_eq!(rec.query_start, 0);
        assert_eq!(rec.query_end, 500);
        assert_eq!(rec.strand, '+');
        assert_eq!(rec.target_id, "r1");
        assert_eq!(rec.matches, 480);
        assert_eq!(rec.aln_len, 505);
        assert_eq!(rec.mapq, 60);
    }

    #[test]
    fn trailing_tags_are_ignored() {
        let with_tags = format!("{}\ttp:A:P\tcm:i:100\tcg:Z:500M", LINE);
        assert_eq!(PafRecord::parse(&with_tags).unwrap(), PafRecord::parse(LINE).unwrap());
    }

    #[test]
    fn rejects_truncated_line() {
        assert!(PafRecord::parse("q1\t1000\t0\t500\t+").is_err());
    }

    #[test]
    fn rejects_inverted_interval() {
        let line = "q1\t1000\t500\t500\t+\tr1\t5000\t0\t500\t480\t505\t60";
        assert!(PafRecord::parse(line).is_err());
    }

    #[test]
    fn rejects_end_past_query_len() {
        let line = "q1\t400\t0\t500\t+\tr1\t5000\t0\t500\t480\t505\t60";
        assert!(PafRecord::parse(line).is_err());
    }

    #[test]
    fn rejects_matches_above_aln_len() {
        let line = "q1\t1000\t0\t500\t+\tr1\t5000\t0\t500\t600\t505\t60";
        assert!(PafRecord::parse(line).is_err());
    }

    #[test]
    fn rejects_bad_strand() {
        let line = "q1\t1000\t0\t500\t*\tr1\t5000\t0\t500\t480\t505\t60";
        assert!(PafRecord::parse(line).is_err());
    }
}
