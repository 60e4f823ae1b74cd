//! In-memory NCBI taxonomy: arena-backed node storage with merged/deleted
//! id resolution, lineage walks, and LCA queries.

use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::{HymetError, Result};

/// Sentinel for "no taxon" / unassigned.
pub const UNASSIGNED: u32 = 0;

/// Maximum hops when following the merged chain. Well-formed dumps need one.
const MAX_MERGE_HOPS: usize = 64;

/// The seven profile ranks, root -> leaf, plus NoRank for intermediate nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Superkingdom,
    Phylum,
    Class,
    Order,
    Family,
    Genus,
    Species,
    NoRank,
}

/// Ranks carried into the CAMI profile, in emission order.
pub const PROFILE_RANKS: [Rank; 7] = [
    Rank::Superkingdom,
    Rank::Phylum,
    Rank::Class,
    Rank::Order,
    Rank::Family,
    Rank::Genus,
    Rank::Species,
];

impl Rank {
    /// Parse an NCBI rank string. Anything outside the seven profile ranks
    /// collapses to NoRank.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "superkingdom" | "domain" => Rank::Superkingdom,
            "phylum" => Rank::Phylum,
            "class" => Rank::Class,
            "order" => Rank::Order,
            "family" => Rank::Family,
            "genus" => Rank::Genus,
            "species" => Rank::Species,
            _ => Rank::NoRank,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Superkingdom => "superkingdom",
            Rank::Phylum => "phylum",
            Rank::Class => "class",
            Rank::Order => "order",
            Rank::Family => "family",
            Rank::Genus => "genus",
            Rank::Species => "species",
            Rank::NoRank => "no_rank",
        }
    }
}

impl std::fmt::Display for Rank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
struct Node {
    taxid: u32,
    /// Arena index of the parent. The root points at itself.
    parent: u32,
    rank: Rank,
    name: String,
}

/// Immutable taxonomy queried throughout the pipeline.
///
/// Load-time errors are fatal; query-time misses return [`UNASSIGNED`] and
/// bump `unknown_queries`.
#[derive(Debug)]
pub struct TaxonomyStore {
    nodes: Vec<Node>,
    index: HashMap<u32, u32>,
    merged: HashMap<u32, u32>,
    deleted: HashSet<u32>,
    root: u32,
    unknown_queries: AtomicU64,
}

impl TaxonomyStore {
    /// Load from an NCBI dump directory: nodes.dmp and names.dmp are
    /// required, merged.dmp and delnodes.dmp optional. Gzipped variants are
    /// accepted.
    pub fn load(dump_dir: &Path) -> Result<Self> {
        let nodes_path = locate(dump_dir, "nodes.dmp")
            .ok_or_else(|| HymetError::Taxonomy(format!("nodes.dmp not found in {:?}", dump_dir)))?;
        let names_path = locate(dump_dir, "names.dmp")
            .ok_or_else(|| HymetError::Taxonomy(format!("names.dmp not found in {:?}", dump_dir)))?;

        let mut parents: HashMap<u32, (u32, Rank)> = HashMap::new();
        for_each_dmp_row(&nodes_path, |fields, line_no| {
            if fields.len() < 3 {
                return Err(HymetError::Taxonomy(format!(
                    "nodes.dmp line {}: expected at least 3 fields",
                    line_no
                )));
            }
            let taxid = parse_taxid(fields[0], "nodes.dmp", line_no)?;
            let parent = parse_taxid(fields[1], "nodes.dmp", line_no)?;
            parents.insert(taxid, (parent, Rank::parse(fields[2])));
            Ok(())
        })?;

        if parents.is_empty() {
            return Err(HymetError::Taxonomy("nodes.dmp contains no nodes".into()));
        }

        let mut names: HashMap<u32, String> = HashMap::new();
        for_each_dmp_row(&names_path, |fields, line_no| {
            if fields.len() < 4 {
                return Err(HymetError::Taxonomy(format!(
                    "names.dmp line {}: expected at least 4 fields",
                    line_no
                )));
            }
            if fields[3].trim() == "scientific name" {
                let taxid = parse_taxid(fields[0], "names.dmp", line_no)?;
                names.insert(taxid, fields[1].trim().to_string());
            }
            Ok(())
        })?;

        let mut merged: HashMap<u32, u32> = HashMap::new();
        if let Some(path) = locate(dump_dir, "merged.dmp") {
            for_each_dmp_row(&path, |fields, line_no| {
                if fields.len() < 2 {
                    return Err(HymetError::Taxonomy(format!(
                        "merged.dmp line {}: expected 2 fields",
                        line_no
                    )));
                }
                let old = parse_taxid(fields[0], "merged.dmp", line_no)?;
                let new = parse_taxid(fields[1], "merged.dmp", line_no)?;
                merged.insert(old, new);
                Ok(())
            })?;
        }

        let mut deleted: HashSet<u32> = HashSet::new();
        if let Some(path) = locate(dump_dir, "delnodes.dmp") {
            for_each_dmp_row(&path, |fields, line_no| {
                if fields.is_empty() {
                    return Err(HymetError::Taxonomy(format!(
                        "delnodes.dmp line {}: empty row",
                        line_no
                    )));
                }
                deleted.insert(parse_taxid(fields[0], "delnodes.dmp", line_no)?);
                Ok(())
            })?;
        }

        Self::build(parents, names, merged, deleted)
    }

    /// Assemble the arena and verify tree shape.
    fn build(
        parents: HashMap<u32, (u32, Rank)>,
        mut names: HashMap<u32, String>,
        merged: HashMap<u32, u32>,
        deleted: HashSet<u32>,
    ) -> Result<Self> {
        let mut taxids: Vec<u32> = parents.keys().copied().collect();
        taxids.sort_unstable();

        let mut index: HashMap<u32, u32> = HashMap::with_capacity(taxids.len());
        for (i, &taxid) in taxids.iter().enumerate() {
            index.insert(taxid, i as u32);
        }

        let mut nodes = Vec::with_capacity(taxids.len());
        let mut root = None;
        for &taxid in &taxids {
            let (parent_taxid, rank) = parents[&taxid];
            if parent_taxid == taxid {
                if let Some(prev) = root {
                    return Err(HymetError::Taxonomy(format!(
                        "multiple roots: {} and {}",
                        prev, taxid
                    )));
                }
                root = Some(taxid);
            }
            let parent_idx = *index.get(&parent_taxid).ok_or_else(|| {
                HymetError::Taxonomy(format!(
                    "node {} references missing parent {}",
                    taxid, parent_taxid
                ))
            })?;
            nodes.push(Node {
                taxid,
                parent: parent_idx,
                rank,
                name: names.remove(&taxid).unwrap_or_default(),
            });
        }

        let root = root.ok_or_else(|| HymetError::Taxonomy("no root node found".into()))?;

        let store = Self {
            nodes,
            index,
            merged,
            deleted,
            root,
            unknown_queries: AtomicU64::new(0),
        };
        store.check_acyclic()?;
        Ok(store)
    }

    /// Depth-bounded walk from every node; a walk longer than the node count
    /// means a cycle.
    fn check_acyclic(&self) -> Result<()> {
        let bound = self.nodes.len();
        for start in 0..self.nodes.len() {
            let mut idx = start as u32;
            let mut steps = 0usize;
            loop {
                let parent = self.nodes[idx as usize].parent;
                if parent == idx {
                    break;
                }
                idx = parent;
                steps += 1;
                if steps > bound {
                    return Err(HymetError::Taxonomy(format!(
                        "cycle detected while walking ancestors of taxid {}",
                        self.nodes[start].taxid
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn root(&self) -> u32 {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Queries that missed the taxonomy since load.
    pub fn unknown_query_count(&self) -> u64 {
        self.unknown_queries.load(Ordering::Relaxed)
    }

    /// Resolve merges and deletions: merged ids follow their chain (capped),
    /// deleted and unknown ids become [`UNASSIGNED`].
    pub fn canonical(&self, taxid: u32) -> u32 {
        if taxid == UNASSIGNED {
            return UNASSIGNED;
        }
        let mut current = taxid;
        let mut hops = 0;
        while let Some(&next) = self.merged.get(&current) {
            current = next;
            hops += 1;
            if hops > MAX_MERGE_HOPS {
                tracing::error!(taxid, "merged chain exceeded {} hops", MAX_MERGE_HOPS);
                return UNASSIGNED;
            }
        }
        if self.deleted.contains(&current) {
            return UNASSIGNED;
        }
        if self.index.contains_key(&current) {
            current
        } else {
            self.unknown_queries.fetch_add(1, Ordering::Relaxed);
            UNASSIGNED
        }
    }

    fn node(&self, taxid: u32) -> Option<&Node> {
        let canonical = self.canonical(taxid);
        if canonical == UNASSIGNED {
            return None;
        }
        self.index.get(&canonical).map(|&i| &self.nodes[i as usize])
    }

    pub fn parent(&self, taxid: u32) -> u32 {
        self.node(taxid)
            .map(|n| self.nodes[n.parent as usize].taxid)
            .unwrap_or(UNASSIGNED)
    }

    pub fn rank(&self, taxid: u32) -> Rank {
        self.node(taxid).map(|n| n.rank).unwrap_or(Rank::NoRank)
    }

    pub fn name(&self, taxid: u32) -> &str {
        self.node(taxid).map(|n| n.name.as_str()).unwrap_or("")
    }

    /// Root-ward chain starting at `taxid` and ending at the root.
    /// Empty for unknown ids.
    pub fn lineage(&self, taxid: u32) -> Vec<u32> {
        let canonical = self.canonical(taxid);
        if canonical == UNASSIGNED {
            return Vec::new();
        }
        let mut chain = Vec::new();
        let mut idx = self.index[&canonical];
        loop {
            let node = &self.nodes[idx as usize];
            chain.push(node.taxid);
            if node.parent == idx {
                break;
            }
            idx = node.parent;
        }
        chain
    }

    /// Classic LCA via ancestor-set intersection. Returns the root when
    /// either input is unassigned.
    pub fn lca(&self, a: u32, b: u32) -> u32 {
        let lineage_a = self.lineage(a);
        if lineage_a.is_empty() {
            return self.root;
        }
        let set: HashSet<u32> = lineage_a.into_iter().collect();
        for ancestor in self.lineage(b) {
            if set.contains(&ancestor) {
                return ancestor;
            }
        }
        self.root
    }

    /// First ancestor of `taxid` (inclusive) carrying rank `rank`, else
    /// [`UNASSIGNED`].
    pub fn ancestor_at_rank(&self, taxid: u32, rank: Rank) -> u32 {
        for ancestor in self.lineage(taxid) {
            if self.rank(ancestor) == rank {
                return ancestor;
            }
        }
        UNASSIGNED
    }
}

/// Prefer the plain file, fall back to the gzipped variant.
fn locate(dir: &Path, name: &str) -> Option<std::path::PathBuf> {
    let plain = dir.join(name);
    if plain.exists() {
        return Some(plain);
    }
    let gz = dir.join(format!("{}.gz", name));
    gz.exists().then_some(gz)
}

/// Stream a `|`-delimited dump file row by row.
fn for_each_dmp_row<F>(path: &Path, mut f: F) -> Result<()>
where
    F: FnMut(&[&str], usize) -> Result<()>,
{
    let reader = open_maybe_gz(path)?;
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim_end_matches(['\t', '|', '\n']);
        if trimmed.is_empty() {
            continue;
        }
        let fields: Vec<&str> = trimmed.split('|').map(str::trim).collect();
        f(&fields, i + 1)?;
    }
    Ok(())
}

fn parse_taxid(field: &str, file: &str, line_no: usize) -> Result<u32> {
    field.trim().parse::<u32>().map_err(|_| {
        HymetError::Taxonomy(format!("{} line {}: invalid taxid {:?}", file, line_no, field))
    })
}

/// Open a file, decoding gzip when the name ends in .gz.
pub(crate) fn open_maybe_gz(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = std::fs::File::open(path)?;
    if path.extension().is_some_and(|e| e == "gz") {
        Ok(Box::new(std::io::BufReader::new(
            flate2::read::MultiGzDecoder::new(file),
        )))
    } else {
        Ok(Box::new(std::io::BufReader::new(file)))
    }
}
