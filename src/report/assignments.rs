//! The per-query assignment table (`classified_sequences.tsv`).
//!
//! One row per input sequence, in input order. Queries the aggregator never
//! saw get the unclassified sentinel row.

use std::io::Write;
use std::path::Path;

use indexmap::IndexMap;

use crate::bio::fasta::QueryInfo;
use crate::core::resolver::QueryAssignment;
use crate::report::format_confidence;
use crate::Result;

pub const HEADER: &str = "Query\tLineage\tTaxonomicLevel\tConfidence\tTaxID\tAmbiguous";

/// Merge resolved assignments with the full query list, restoring input
/// order and filling gaps with the unclassified sentinel.
pub fn order_assignments(
    queries: &[QueryInfo],
    resolved: Vec<QueryAssignment>,
) -> Vec<QueryAssignment> {
    let mut by_id: IndexMap<String, QueryAssignment> = resolved
        .into_iter()
        .map(|a| (a.query_id.clone(), a))
        .collect();

    queries
        .iter()
        .map(|q| {
            by_id
                .shift_remove(&q.id)
                .unwrap_or_else(|| QueryAssignment::unclassified(&q.id))
        })
        .collect()
}

pub fn write_assignments(path: &Path, assignments: &[QueryAssignment]) -> Result<()> {
    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    writeln!(out, "{}", HEADER)?;
    for a in assignments {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{}\t{}",
            a.query_id,
            a.lineage,
            a.rank,
            format_confidence(a.confidence),
            a.taxid,
            a.ambiguous
        )?;
    }
    out.into_inner().map_err(|e| e.into_error())?.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bio::taxonomy::Rank;

    fn query(id: &str) -> QueryInfo {
        QueryInfo {
            id: id.to_string(),
            length: 100,
        }
    }

    #[test]
    fn preserves_input_order_and_fills_gaps() {
        let queries = vec![query("q1"), query("q2"), query("q3")];
        let resolved = vec![
            QueryAssignment {
                query_id: "q3".into(),
                taxid: 562,
                rank: Rank::Species,
                confidence: 0.9,
                lineage: "root;Escherichia coli".into(),
                support_weight: 100.0,
                ambiguous: false,
            },
            QueryAssignment {
                query_id: "q1".into(),
                taxid: 561,
                rank: Rank::Genus,
                confidence: 0.8,
                lineage: "root;Escherichia".into(),
                support_weight: 50.0,
                ambiguous: true,
            },
        ];
        let ordered = order_assignments(&queries, resolved);
        assert_eq!(ordered[0].query_id, "q1");
        assert_eq!(ordered[1].query_id, "q2");
        assert!(!ordered[1].is_classified());
        assert_eq!(ordered[2].query_id, "q3");
    }

    #[test]
    fn writes_unclassified_sentinel_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classified_sequences.tsv");
        let assignments = vec![QueryAssignment::unclassified("q1")];
        write_assignments(&path, &assignments).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some(HEADER));
        assert_eq!(
            lines.next(),
            Some("q1\tunclassified\tno_rank\t0.0\t0\tfalse")
        );
    }
}
