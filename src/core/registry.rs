//! Reference registry: the `reference_id -> taxid` table.
//!
//! Built from a two-column TSV (the per-cache `reference_taxonomy.tsv`, or
//! the global accession table when the selector needs species resolution
//! before any cache exists). Shared read-only across the pipeline.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::bio::taxonomy::{TaxonomyStore, UNASSIGNED};
use crate::{HymetError, Result};

#[derive(Debug)]
pub struct ReferenceRegistry {
    map: HashMap<String, u32>,
    /// Reference ids already warned about, so each logs once.
    warned: DashMap<String, ()>,
    unknown_lookups: AtomicU64,
}

impl ReferenceRegistry {
    pub fn empty() -> Self {
        Self {
            map: HashMap::new(),
            warned: DashMap::new(),
            unknown_lookups: AtomicU64::new(0),
        }
    }

    /// Build from `reference_id\ttaxid` rows. Duplicate keys with
    /// conflicting taxids are an error unless both resolve to the same
    /// canonical taxid, in which case the first wins.
    pub fn build_from_path(path: &Path, taxonomy: &TaxonomyStore) -> Result<Self> {
        let reader = crate::bio::taxonomy::open_maybe_gz(path)?;
        let mut map: HashMap<String, u32> = HashMap::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t');
            let reference_id = fields.next().unwrap_or("").trim();
            let taxid_field = fields.next().ok_or_else(|| {
                HymetError::Registry(format!("{}:{}: missing taxid column", path.display(), i + 1))
            })?;
            let taxid: u32 = taxid_field.trim().parse().map_err(|_| {
                HymetError::Registry(format!(
                    "{}:{}: invalid taxid {:?}",
                    path.display(),
                    i + 1,
                    taxid_field
                ))
            })?;
            if reference_id.is_empty() {
                return Err(HymetError::Registry(format!(
                    "{}:{}: empty reference id",
                    path.display(),
                    i + 1
                )));
            }

            match map.get(reference_id) {
                None => {
                    map.insert(reference_id.to_string(), taxid);
                }
                Some(&existing) if existing == taxid => {}
                Some(&existing) => {
                    // First wins when the ids merge to the same node
                    if taxonomy.canonical(existing) != taxonomy.canonical(taxid)
                        || taxonomy.canonical(existing) == UNASSIGNED
                    {
                        return Err(HymetError::Registry(format!(
                            "conflicting taxids for {}: {} vs {}",
                            reference_id, existing, taxid
                        )));
                    }
                }
            }
        }

        Ok(Self {
            map,
            warned: DashMap::new(),
            unknown_lookups: AtomicU64::new(0),
        })
    }

    /// Resolve a reference id. Unknown ids return [`UNASSIGNED`] and warn
    /// once per id.
    pub fn lookup(&self, reference_id: &str) -> u32 {
        match self.map.get(reference_id) {
            Some(&taxid) => taxid,
            None => {
                self.unknown_lookups.fetch_add(1, Ordering::Relaxed);
                if self.warned.insert(reference_id.to_string(), ()).is_none() {
                    tracing::warn!(reference_id, "reference id has no taxid mapping");
                }
                UNASSIGNED
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn unknown_lookup_count(&self) -> u64 {
        self.unknown_lookups.load(Ordering::Relaxed)
    }
}
