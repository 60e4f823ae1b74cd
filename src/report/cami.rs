//! Sample-level abundance profile in CAMI format.
//!
//! Support weights roll up to each of the seven profile ranks; per-rank
//! percentages are computed in integer micro-percent (six decimals) and the
//! truncation residual is assigned to the final row in emission order, so
//! every populated rank sums to exactly 100.000000.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use crate::bio::taxonomy::{Rank, TaxonomyStore, PROFILE_RANKS, UNASSIGNED};
use crate::core::resolver::QueryAssignment;
use crate::Result;

const CAMI_VERSION: &str = "0.9.4";
/// 100% expressed in micro-percent units.
const FULL_SCALE: u64 = 100_000_000;

#[derive(Debug, Clone, PartialEq)]
pub struct ProfileRow {
    pub taxid: u32,
    pub rank: Rank,
    /// Taxids along the profile ranks down to this row, empty where a rank
    /// is absent from the lineage.
    pub tax_path: String,
    /// Scientific names matching `tax_path`.
    pub tax_path_names: String,
    /// Micro-percent (1e-6 of a percent).
    pub micro_percent: u64,
}

impl ProfileRow {
    pub fn percentage(&self) -> f64 {
        self.micro_percent as f64 / 1_000_000.0
    }
}

pub struct ProfileBuilder<'a> {
    taxonomy: &'a TaxonomyStore,
    /// Per rank: taxid -> accumulated support weight.
    accum: HashMap<Rank, HashMap<u32, f64>>,
}

impl<'a> ProfileBuilder<'a> {
    pub fn new(taxonomy: &'a TaxonomyStore) -> Self {
        Self {
            taxonomy,
            accum: HashMap::new(),
        }
    }

    /// Fold one assignment into every rank at or above its own.
    pub fn add(&mut self, assignment: &QueryAssignment) {
        if !assignment.is_classified() || assignment.support_weight <= 0.0 {
            return;
        }
        for rank in PROFILE_RANKS {
            let ancestor = self.taxonomy.ancestor_at_rank(assignment.taxid, rank);
            if ancestor == UNASSIGNED {
                continue;
            }
            *self
                .accum
                .entry(rank)
                .or_default()
                .entry(ancestor)
                .or_insert(0.0) += assignment.support_weight;
        }
    }

    /// Normalise every populated rank and emit rows ordered by
    /// (rank, percentage desc, taxid asc).
    pub fn build(&self) -> Vec<ProfileRow> {
        let mut rows = Vec::new();
        for rank in PROFILE_RANKS {
            let Some(bins) = self.accum.get(&rank) else {
                continue;
            };
            // Taxid order first so the float total accumulates identically
            // across runs, then rank by weight for emission
            let mut ranked: Vec<(u32, f64)> =
                bins.iter().map(|(&t, &w)| (t, w)).collect();
            ranked.sort_unstable_by_key(|&(t, _)| t);
            let total: f64 = ranked.iter().map(|&(_, w)| w).sum();
            if total <= 0.0 {
                continue;
            }
            ranked.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });

            let mut micro: Vec<(u32, u64)> = ranked
                .iter()
                .map(|&(taxid, weight)| {
                    (taxid, (weight / total * FULL_SCALE as f64).floor() as u64)
                })
                .collect();

            // The residual keeps the rank summing to exactly 100.000000
            let assigned: u64 = micro.iter().map(|&(_, m)| m).sum();
            if let Some(last) = micro.last_mut() {
                last.1 += FULL_SCALE - assigned;
            }

            for (taxid, micro_percent) in micro {
                let (tax_path, tax_path_names) = self.paths_for(taxid, rank);
                rows.push(ProfileRow {
                    taxid,
                    rank,
                    tax_path,
                    tax_path_names,
                    micro_percent,
                });
            }
        }
        rows
    }

    /// Pipe-joined taxid and name chains along the profile ranks down to
    /// `rank`; missing intermediate ranks stay empty.
    fn paths_for(&self, taxid: u32, rank: Rank) -> (String, String) {
        let mut ids = Vec::new();
        let mut names = Vec::new();
        for r in PROFILE_RANKS {
            if r > rank {
                break;
            }
            let ancestor = self.taxonomy.ancestor_at_rank(taxid, r);
            if ancestor == UNASSIGNED {
                ids.push(String::new());
                names.push(String::new());
            } else {
                ids.push(ancestor.to_string());
                names.push(self.taxonomy.name(ancestor).to_string());
            }
        }
        (ids.join("|"), names.join("|"))
    }
}

/// Write the profile file: CAMI headers, then one row per taxon. A profile
/// with no rows still gets its headers.
pub fn write_profile(path: &Path, sample_id: &str, rows: &[ProfileRow]) -> Result<()> {
    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    writeln!(out, "#CAMI Submission for Taxonomic Profiling")?;
    writeln!(out, "@SampleID:{}", sample_id)?;
    writeln!(out, "@Version:{}", CAMI_VERSION)?;
    writeln!(
        out,
        "@Ranks:superkingdom|phylum|class|order|family|genus|species"
    )?;
    writeln!(out, "@@TAXID\tRANK\tTAXPATH\tTAXPATHSN\tPERCENTAGE")?;
    for row in rows {
        writeln!(
            out,
            "{}\t{}\t{}\t{}\t{:.6}",
            row.taxid,
            row.rank,
            row.tax_path,
            row.tax_path_names,
            row.percentage()
        )?;
    }
    out.into_inner().map_err(|e| e.into_error())?.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two genera under one family; G1 holds species A and B, G2 holds C.
    fn taxonomy() -> TaxonomyStore {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("nodes.dmp"),
            "\
1\t|\t1\t|\tno rank\t|\n\
2\t|\t1\t|\tsuperkingdom\t|\n\
100\t|\t2\t|\tfamily\t|\n\
201\t|\t100\t|\tgenus\t|\n\
202\t|\t100\t|\tgenus\t|\n\
301\t|\t201\t|\tspecies\t|\n\
302\t|\t201\t|\tspecies\t|\n\
303\t|\t202\t|\tspecies\t|\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("names.dmp"),
            "\
1\t|\troot\t|\t\t|\tscientific name\t|\n\
2\t|\tBacteria\t|\t\t|\tscientific name\t|\n\
100\t|\tFamilyX\t|\t\t|\tscientific name\t|\n\
201\t|\tGenusOne\t|\t\t|\tscientific name\t|\n\
202\t|\tGenusTwo\t|\t\t|\tscientific name\t|\n\
301\t|\tSpeciesA\t|\t\t|\tscientific name\t|\n\
302\t|\tSpeciesB\t|\t\t|\tscientific name\t|\n\
303\t|\tSpeciesC\t|\t\t|\tscientific name\t|\n",
        )
        .unwrap();
        TaxonomyStore::load(dir.path()).unwrap()
    }

    fn assignment(taxid: u32, weight: f64) -> QueryAssignment {
        QueryAssignment {
            query_id: format!("q{}", taxid),
            taxid,
            rank: Rank::Species,
            confidence: 1.0,
            lineage: String::new(),
            support_weight: weight,
            ambiguous: false,
        }
    }

    #[test]
    fn equal_thirds_sum_to_exactly_one_hundred() {
        let tax = taxonomy();
        let mut builder = ProfileBuilder::new(&tax);
        for taxid in [301, 302, 303] {
            builder.add(&assignment(taxid, 10.0));
        }
        let rows = builder.build();

        let species: Vec<&ProfileRow> =
            rows.iter().filter(|r| r.rank == Rank::Species).collect();
        assert_eq!(species.len(), 3);
        assert_eq!(species[0].micro_percent, 33_333_333);
        assert_eq!(species[1].micro_percent, 33_333_333);
        assert_eq!(species[2].micro_percent, 33_333_334);
        assert_eq!(species[2].taxid, 303);
        let sum: u64 = species.iter().map(|r| r.micro_percent).sum();
        assert_eq!(sum, FULL_SCALE);

        let genus: Vec<&ProfileRow> =
            rows.iter().filter(|r| r.rank == Rank::Genus).collect();
        assert_eq!(genus.len(), 2);
        assert_eq!(genus[0].taxid, 201);
        assert_eq!(genus[0].micro_percent, 66_666_666);
        assert_eq!(genus[1].taxid, 202);
        assert_eq!(genus[1].micro_percent, 33_333_334);
    }

    #[test]
    fn rows_are_rank_then_percentage_ordered() {
        let tax = taxonomy();
        let mut builder = ProfileBuilder::new(&tax);
        builder.add(&assignment(301, 1.0));
        builder.add(&assignment(303, 3.0));
        let rows = builder.build();

        let ranks: Vec<Rank> = rows.iter().map(|r| r.rank).collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        assert_eq!(ranks, sorted);

        let species: Vec<&ProfileRow> =
            rows.iter().filter(|r| r.rank == Rank::Species).collect();
        assert_eq!(species[0].taxid, 303);
        assert_eq!(species[1].taxid, 301);
    }

    #[test]
    fn unclassified_assignments_contribute_nothing() {
        let tax = taxonomy();
        let mut builder = ProfileBuilder::new(&tax);
        builder.add(&QueryAssignment::unclassified("q1"));
        assert!(builder.build().is_empty());
    }

    #[test]
    fn genus_level_assignment_skips_species_rank() {
        let tax = taxonomy();
        let mut builder = ProfileBuilder::new(&tax);
        let mut a = assignment(201, 5.0);
        a.rank = Rank::Genus;
        builder.add(&a);
        let rows = builder.build();
        assert!(rows.iter().all(|r| r.rank != Rank::Species));
        let genus: Vec<&ProfileRow> =
            rows.iter().filter(|r| r.rank == Rank::Genus).collect();
        assert_eq!(genus[0].micro_percent, FULL_SCALE);
    }

    #[test]
    fn tax_paths_have_empty_slots_for_missing_ranks() {
        let tax = taxonomy();
        let mut builder = ProfileBuilder::new(&tax);
        builder.add(&assignment(301, 1.0));
        let rows = builder.build();
        let species_row = rows.iter().find(|r| r.rank == Rank::Species).unwrap();
        // phylum, class and order are absent from this fixture
        assert_eq!(species_row.tax_path, "2||||100|201|301");
        assert_eq!(
            species_row.tax_path_names,
            "Bacteria||||FamilyX|GenusOne|SpeciesA"
        );
    }

    #[test]
    fn empty_profile_writes_headers_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.cami.tsv");
        write_profile(&path, "sample1", &[]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("#CAMI Submission"));
        assert!(text.contains("@SampleID:sample1"));
        assert_eq!(text.lines().count(), 5);
    }

    #[test]
    fn percentage_formatting_is_six_decimals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.cami.tsv");
        let tax = taxonomy();
        let mut builder = ProfileBuilder::new(&tax);
        for taxid in [301, 302, 303] {
            builder.add(&assignment(taxid, 10.0));
        }
        write_profile(&path, "s", &builder.build()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\t33.333333\n"));
        assert!(text.contains("\t33.333334\n"));
        assert!(text.contains("\t66.666666\n"));
    }
}
