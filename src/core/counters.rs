//! Runtime counters shared across the streaming threads.
//!
//! Plain atomics; incremented from the aggregator and resolver, snapshotted
//! once at the end of the run for the resolver log and metadata record.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct RunCounters {
    pub paf_records: AtomicU64,
    pub paf_parse_errors: AtomicU64,
    pub queries_aggregated: AtomicU64,
    pub summaries_emitted: AtomicU64,
    pub hits_below_coverage: AtomicU64,
    pub hits_below_identity: AtomicU64,
    pub hits_unknown_taxid: AtomicU64,
    pub queries_classified: AtomicU64,
    pub queries_unclassified: AtomicU64,
    pub queries_ambiguous: AtomicU64,
}

/// Point-in-time copy for serialization.
#[derive(Debug, Clone, Serialize)]
pub struct CounterSnapshot {
    pub paf_records: u64,
    pub paf_parse_errors: u64,
    pub queries_aggregated: u64,
    pub summaries_emitted: u64,
    pub hits_below_coverage: u64,
    pub hits_below_identity: u64,
    pub hits_unknown_taxid: u64,
    pub queries_classified: u64,
    pub queries_unclassified: u64,
    pub queries_ambiguous: u64,
    pub unknown_registry_lookups: u64,
    pub unknown_taxonomy_queries: u64,
}

impl RunCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        unknown_registry_lookups: u64,
        unknown_taxonomy_queries: u64,
    ) -> CounterSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            paf_records: get(&self.paf_records),
            paf_parse_errors: get(&self.paf_parse_errors),
            queries_aggregated: get(&self.queries_aggregated),
            summaries_emitted: get(&self.summaries_emitted),
            hits_below_coverage: get(&self.hits_below_coverage),
            hits_below_identity: get(&self.hits_below_identity),
            hits_unknown_taxid: get(&self.hits_unknown_taxid),
            queries_classified: get(&self.queries_classified),
            queries_unclassified: get(&self.queries_unclassified),
            queries_ambiguous: get(&self.queries_ambiguous),
            unknown_registry_lookups,
            unknown_taxonomy_queries,
        }
    }
}
