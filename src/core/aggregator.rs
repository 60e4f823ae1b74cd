//! Streaming PAF aggregation.
//!
//! Input must arrive grouped by query (minimap2 writes it that way). The
//! aggregator holds state for exactly one query at a time: per reference, a
//! disjoint interval set over the query plus running match/length sums. When
//! a group closes, each surviving reference becomes one [`HitSummary`].
//!
//! A query id that reappears after its group closed is a stream error; this
//! implementation does not re-sort unsorted input.

use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::bio::paf::PafRecord;
use crate::bio::taxonomy::UNASSIGNED;
use crate::core::config::AlignmentConfig;
use crate::core::counters::RunCounters;
use crate::core::registry::ReferenceRegistry;
use crate::{HymetError, Result};

/// Disjoint, sorted union of half-open intervals on a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalSet {
    spans: SmallVec<[(u64, u64); 4]>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `[start, end)`, merging any overlapping or adjacent spans.
    pub fn insert(&mut self, start: u64, end: u64) {
        debug_assert!(start < end);
        // First span with span.end >= start can overlap the insertion
        let lo = self.spans.partition_point(|&(_, e)| e < start);
        // Spans beyond this cannot overlap: span.start > end
        let hi = self.spans[lo..].partition_point(|&(s, _)| s <= end) + lo;

        if lo == hi {
            self.spans.insert(lo, (start, end));
            return;
        }
        let merged = (
            self.spans[lo].0.min(start),
            self.spans[hi - 1].1.max(end),
        );
        self.spans.drain(lo..hi);
        self.spans.insert(lo, merged);
    }

    /// Total covered length.
    pub fn covered(&self) -> u64 {
        self.spans.iter().map(|&(s, e)| e - s).sum()
    }

    pub fn span_count(&self) -> usize {
        self.spans.len()
    }
}

/// Per-(query, reference) evidence surviving the filters.
#[derive(Debug, Clone, PartialEq)]
pub struct HitSummary {
    pub reference_id: String,
    pub taxid: u32,
    pub query_len: u64,
    pub covered_bases: u64,
    pub weighted_identity: f64,
    pub best_mapq: u8,
    pub alignment_count: u32,
}

/// All surviving hits for one query, in reference-id order.
#[derive(Debug, Clone)]
pub struct QueryHits {
    pub query_id: String,
    pub query_len: u64,
    pub hits: Vec<HitSummary>,
}

#[derive(Debug, Default)]
struct RefState {
    intervals: IntervalSet,
    matches_sum: u64,
    aln_len_sum: u64,
    best_mapq: u8,
    alignment_count: u32,
}

pub struct AlignmentAggregator<'a> {
    config: AlignmentConfig,
    registry: &'a ReferenceRegistry,
    counters: Arc<RunCounters>,
}

impl<'a> AlignmentAggregator<'a> {
    pub fn new(
        config: AlignmentConfig,
        registry: &'a ReferenceRegistry,
        counters: Arc<RunCounters>,
    ) -> Self {
        Self {
            config,
            registry,
            counters,
        }
    }

    /// Stream a PAF source, invoking `emit` once per query group. `emit`
    /// returning `false` stops the stream early (cancellation).
    pub fn run<R, F>(&self, reader: R, mut emit: F) -> Result<()>
    where
        R: BufRead,
        F: FnMut(QueryHits) -> bool,
    {
        let mut completed: HashSet<String> = HashSet::new();
        let mut current_query: Option<(String, u64)> = None;
        let mut refs: HashMap<String, RefState> = HashMap::new();
        let mut parse_errors: u64 = 0;

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = match PafRecord::parse(&line) {
                Ok(r) => r,
                Err(e) => {
                    parse_errors += 1;
                    RunCounters::bump(&self.counters.paf_parse_errors);
                    tracing::warn!(error = %e, "skipping malformed PAF line");
                    if parse_errors > self.config.max_parse_errors {
                        return Err(HymetError::AlignmentStream(format!(
                            "{} malformed lines exceed the limit of {}",
                            parse_errors, self.config.max_parse_errors
                        )));
                    }
                    continue;
                }
            };
            RunCounters::bump(&self.counters.paf_records);

            let same_group = current_query
                .as_ref()
                .is_some_and(|(id, _)| *id == record.query_id);
            if !same_group {
                if let Some((id, query_len)) = current_query.take() {
                    completed.insert(id.clone());
                    let hits = self.flush(&id, query_len, &mut refs);
                    if !emit(hits) {
                        return Ok(());
                    }
                }
                if completed.contains(&record.query_id) {
                    return Err(HymetError::AlignmentStream(format!(
                        "query {} reappeared after its group closed; input is not grouped",
                        record.query_id
                    )));
                }
                current_query = Some((record.query_id.clone(), record.query_len));
            }

            let state = refs.entry(record.target_id.clone()).or_default();
            state.intervals.insert(record.query_start, record.query_end);
            state.matches_sum += record.matches;
            state.aln_len_sum += record.aln_len;
            state.best_mapq = state.best_mapq.max(record.mapq);
            state.alignment_count += 1;
        }

        if let Some((id, query_len)) = current_query.take() {
            let hits = self.flush(&id, query_len, &mut refs);
            emit(hits);
        }
        Ok(())
    }

    /// Close the current group: filter per-reference state into summaries
    /// and release it.
    fn flush(&self, query_id: &str, query_len: u64, refs: &mut HashMap<String, RefState>) -> QueryHits {
        RunCounters::bump(&self.counters.queries_aggregated);

        let mut hits = Vec::with_capacity(refs.len());
        let mut states: Vec<(String, RefState)> = refs.drain().collect();
        states.sort_by(|a, b| a.0.cmp(&b.0));

        for (reference_id, state) in states {
            let covered_bases = state.intervals.covered();
            let weighted_identity = if state.aln_len_sum == 0 {
                0.0
            } else {
                state.matches_sum as f64 / state.aln_len_sum as f64
            };

            let rel_ok =
                covered_bases as f64 >= self.config.rel_cov_threshold * query_len as f64;
            let abs_ok =
                covered_bases as f64 >= self.config.abs_cov_threshold * query_len as f64;
            if !rel_ok || !abs_ok {
                RunCounters::bump(&self.counters.hits_below_coverage);
                continue;
            }
            if weighted_identity < self.config.min_identity {
                RunCounters::bump(&self.counters.hits_below_identity);
                continue;
            }

            let taxid = self.registry.lookup(&reference_id);
            if taxid == UNASSIGNED {
                RunCounters::bump(&self.counters.hits_unknown_taxid);
                if self.config.drop_unknown_taxids {
                    continue;
                }
            }

            RunCounters::bump(&self.counters.summaries_emitted);
            hits.push(HitSummary {
                reference_id,
                taxid,
                query_len,
                covered_bases,
                weighted_identity,
                best_mapq: state.best_mapq,
                alignment_count: state.alignment_count,
            });
        }

        QueryHits {
            query_id: query_id.to_string(),
            query_len,
            hits,
        }
    }
}
