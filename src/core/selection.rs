//! Candidate selection: screen rows in, ordered reference list out.
//!
//! The similarity threshold adapts downward until enough candidates pass,
//! never below the configured floor. The returned fingerprint keys the
//! reference cache and is invariant to input row order.

use rayon::prelude::*;
use sha2::{Digest, Sha256};

use crate::bio::screen::ScreenRow;
use crate::bio::taxonomy::{Rank, TaxonomyStore, UNASSIGNED};
use crate::core::config::SelectionConfig;
use crate::core::registry::ReferenceRegistry;
use crate::{HymetError, Result};

/// One reference chosen for alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedReference {
    pub reference_id: String,
    pub similarity: f64,
}

/// Outcome of a selection round, including the numbers that go into
/// candidate_limit.log.
#[derive(Debug, Clone)]
pub struct Selection {
    pub references: Vec<SelectedReference>,
    /// Threshold the descent settled on.
    pub threshold: f64,
    /// 160-bit hex fingerprint of the sorted, deduplicated reference ids.
    pub fingerprint: String,
    /// Screen rows examined.
    pub total_rows: usize,
    /// Candidate floor that drove the descent.
    pub min_candidates: usize,
    /// Rows passing the final threshold, before dedup and cap.
    pub retained: usize,
}

pub struct CandidateSelector {
    config: SelectionConfig,
}

impl CandidateSelector {
    pub fn new(config: SelectionConfig) -> Self {
        Self { config }
    }

    /// Select references for `n_queries` query sequences. `registry` and
    /// `taxonomy` are only consulted when species deduplication is enabled.
    pub fn select(
        &self,
        mut rows: Vec<ScreenRow>,
        n_queries: usize,
        registry: Option<&ReferenceRegistry>,
        taxonomy: Option<&TaxonomyStore>,
    ) -> Result<Selection> {
        let total_rows = rows.len();

        // Deterministic order: similarity descending, reference id ascending
        rows.par_sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.reference_id.cmp(&b.reference_id))
        });

        let min_candidates = self
            .config
            .min_candidates
            .max((self.config.min_candidates_factor * n_queries as f64).ceil() as usize);

        // The descent runs in integer milli-units so identical configs land
        // on identical thresholds regardless of accumulation order.
        let mut threshold_milli = to_milli(self.config.initial_threshold);
        let floor_milli = to_milli(self.config.threshold_floor);
        let step_milli = to_milli(self.config.threshold_step).max(1);

        loop {
            let threshold = threshold_milli as f64 / 1000.0;
            let count = rows.iter().filter(|r| r.similarity > threshold).count();
            if count >= min_candidates || threshold_milli <= floor_milli {
                break;
            }
            threshold_milli = (threshold_milli - step_milli).max(floor_milli);
        }
        let threshold = threshold_milli as f64 / 1000.0;

        let mut passing: Vec<&ScreenRow> =
            rows.iter().filter(|r| r.similarity > threshold).collect();
        let retained = passing.len();
        if passing.is_empty() {
            return Err(HymetError::EmptyCandidateSet);
        }

        if self.config.species_dedup {
            passing = dedup_by_species(passing, registry, taxonomy);
        }

        passing.truncate(self.config.cand_max);

        let references: Vec<SelectedReference> = passing
            .iter()
            .map(|r| SelectedReference {
                reference_id: r.reference_id.clone(),
                similarity: r.similarity,
            })
            .collect();

        let fingerprint = selection_fingerprint(references.iter().map(|r| r.reference_id.as_str()));

        Ok(Selection {
            references,
            threshold,
            fingerprint,
            total_rows,
            min_candidates,
            retained,
        })
    }
}

/// Keep the top-similarity row per species-level taxid. Rows whose species
/// cannot be resolved pass through untouched. Input must already be in
/// final (similarity-descending) order.
fn dedup_by_species<'a>(
    rows: Vec<&'a ScreenRow>,
    registry: Option<&ReferenceRegistry>,
    taxonomy: Option<&TaxonomyStore>,
) -> Vec<&'a ScreenRow> {
    let (registry, taxonomy) = match (registry, taxonomy) {
        (Some(r), Some(t)) => (r, t),
        _ => {
            tracing::warn!("species_dedup enabled without registry/taxonomy; skipping dedup");
            return rows;
        }
    };

    let mut seen_species = std::collections::HashSet::new();
    let mut kept = Vec::with_capacity(rows.len());
    for row in rows {
        let taxid = registry.lookup(&row.reference_id);
        let species = taxonomy.ancestor_at_rank(taxid, Rank::Species);
        if species == UNASSIGNED || seen_species.insert(species) {
            kept.push(row);
        }
    }
    kept
}

/// SHA-256 over the lexicographically sorted, deduplicated reference ids,
/// truncated to 160 bits, lower-case hex.
pub fn selection_fingerprint<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let mut sorted: Vec<&str> = ids.collect();
    sorted.sort_unstable();
    sorted.dedup();

    let mut hasher = Sha256::new();
    for id in sorted {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(&hasher.finalize()[..20])
}

fn to_milli(value: f64) -> i64 {
    (value * 1000.0).round() as i64
}
