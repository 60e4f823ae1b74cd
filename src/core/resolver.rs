//! Weighted-LCA resolution: one query's hit summaries in, exactly one
//! assignment out.
//!
//! Votes are canonicalised, merged by taxid, expanded root-ward, then the
//! tree is walked root to leaf along the heaviest child. The walk stops
//! when the best child lacks support, falls below the confidence floor, or
//! sits within the tie margin of its sibling. The resolver is a pure
//! function of its inputs.

use std::collections::HashMap;

use crate::bio::taxonomy::{Rank, TaxonomyStore, UNASSIGNED};
use crate::core::aggregator::QueryHits;
use crate::core::config::{ResolverConfig, WeightingMode};

/// Separator used in lineage strings and output paths.
pub const LINEAGE_SEPARATOR: &str = ";";

/// Final call for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAssignment {
    pub query_id: String,
    pub taxid: u32,
    pub rank: Rank,
    pub confidence: f64,
    pub lineage: String,
    pub support_weight: f64,
    pub ambiguous: bool,
}

impl QueryAssignment {
    /// The sentinel for queries with no usable evidence.
    pub fn unclassified(query_id: &str) -> Self {
        Self {
            query_id: query_id.to_string(),
            taxid: UNASSIGNED,
            rank: Rank::NoRank,
            confidence: 0.0,
            lineage: "unclassified".to_string(),
            support_weight: 0.0,
            ambiguous: false,
        }
    }

    pub fn is_classified(&self) -> bool {
        self.taxid != UNASSIGNED
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct NodeSupport {
    weight: f64,
    /// Distinct references in the subtree.
    support: u32,
}

pub struct LcaResolver<'a> {
    taxonomy: &'a TaxonomyStore,
    config: ResolverConfig,
}

impl<'a> LcaResolver<'a> {
    pub fn new(taxonomy: &'a TaxonomyStore, config: ResolverConfig) -> Self {
        Self { taxonomy, config }
    }

    pub fn resolve(&self, query: &QueryHits) -> QueryAssignment {
        // 1-2. Weighted votes, merged by canonical taxid. Votes for unknown
        // taxa still count toward the total so confidence reflects them.
        let mut votes: HashMap<u32, NodeSupport> = HashMap::new();
        let mut total_weight = 0.0;
        for hit in &query.hits {
            let weight = match self.config.weighting {
                WeightingMode::IdentityWeighted => {
                    hit.covered_bases as f64 * hit.weighted_identity
                }
                WeightingMode::CoverageOnly => hit.covered_bases as f64,
            };
            total_weight += weight;
            let taxid = self.taxonomy.canonical(hit.taxid);
            if taxid == UNASSIGNED {
                continue;
            }
            let entry = votes.entry(taxid).or_default();
            entry.weight += weight;
            entry.support += 1;
        }

        // 3. Not enough evidence at all
        if votes.is_empty() || total_weight < self.config.min_support_weight {
            return QueryAssignment::unclassified(&query.query_id);
        }

        // 4. Expand votes root-ward; record the child edges actually voted.
        // Taxid order keeps the float accumulation (and so the emitted
        // confidences) identical across runs.
        let mut ordered_votes: Vec<(u32, NodeSupport)> =
            votes.iter().map(|(&t, &v)| (t, v)).collect();
        ordered_votes.sort_unstable_by_key(|&(t, _)| t);

        let mut cumulative: HashMap<u32, NodeSupport> = HashMap::new();
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for &(taxid, vote) in &ordered_votes {
            let lineage = self.taxonomy.lineage(taxid);
            for &ancestor in &lineage {
                let entry = cumulative.entry(ancestor).or_default();
                entry.weight += vote.weight;
                entry.support += vote.support;
            }
            for pair in lineage.windows(2) {
                children.entry(pair[1]).or_default().push(pair[0]);
            }
        }
        for kids in children.values_mut() {
            kids.sort_unstable();
            kids.dedup();
        }

        // 5. Root-to-leaf descent along the heaviest admissible child.
        let root = self.taxonomy.root();
        if !cumulative.contains_key(&root) {
            // All voted lineages were empty; nothing to walk.
            return QueryAssignment::unclassified(&query.query_id);
        }
        let mut node = root;
        let mut ambiguous = false;
        loop {
            let Some(kids) = children.get(&node) else {
                break;
            };
            let mut ranked: Vec<(u32, NodeSupport)> = kids
                .iter()
                .map(|&k| (k, cumulative[&k]))
                .collect();
            // Equal weights order by canonical taxid, keeping the walk
            // deterministic regardless of map iteration order.
            ranked.sort_by(|a, b| {
                b.1.weight
                    .partial_cmp(&a.1.weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });

            let (best, best_support) = ranked[0];
            if best_support.support < self.config.min_taxid_support {
                ambiguous = true;
                break;
            }
            if best_support.weight / total_weight < self.config.confidence_floor {
                ambiguous = true;
                break;
            }
            if let Some(&(_, second)) = ranked.get(1) {
                let margin = best_support.weight - second.weight;
                if margin <= self.config.tie_epsilon * best_support.weight {
                    ambiguous = true;
                    break;
                }
            }
            node = best;
        }

        // 6-7. Emit the node we stopped on.
        let node_support = cumulative[&node];
        let confidence = (node_support.weight / total_weight).clamp(0.0, 1.0);
        QueryAssignment {
            query_id: query.query_id.clone(),
            taxid: node,
            rank: self.taxonomy.rank(node),
            confidence,
            lineage: self.lineage_string(node),
            support_weight: node_support.weight,
            ambiguous,
        }
    }

    /// Scientific names root -> node, joined with the fixed separator.
    fn lineage_string(&self, taxid: u32) -> String {
        let mut names: Vec<&str> = self
            .taxonomy
            .lineage(taxid)
            .into_iter()
            .map(|t| self.taxonomy.name(t))
            .collect();
        names.reverse();
        names.join(LINEAGE_SEPARATOR)
    }
}
