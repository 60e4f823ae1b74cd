//! Reference materialisation from a local assembly mirror.
//!
//! Downloading genomes is out of scope; this adapter expects a directory
//! prepared ahead of time:
//!
//! ```text
//! <assembly_summary_dir>/
//!   accession2taxid.tsv          reference_id \t taxid, whole collection
//!   genomes/<reference_id>.fna[.gz]
//! ```
//!
//! `materialise` concatenates the selected genomes into one FASTA and
//! writes the per-entry taxid table restricted to the selection.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use crate::core::selection::SelectedReference;
use crate::tools::traits::{MaterialisedReferences, ReferenceMaterialiser};
use crate::utils::cancel::CancelToken;

pub const ACCESSION_TABLE: &str = "accession2taxid.tsv";
pub const GENOMES_SUBDIR: &str = "genomes";

pub struct LocalMirrorMaterialiser {
    mirror_dir: PathBuf,
}

impl LocalMirrorMaterialiser {
    pub fn new(mirror_dir: PathBuf) -> Result<Self> {
        if !mirror_dir.join(ACCESSION_TABLE).exists() {
            bail!(
                "assembly mirror at {:?} is missing {}",
                mirror_dir,
                ACCESSION_TABLE
            );
        }
        Ok(Self { mirror_dir })
    }

    /// The global accession table, used by the selector for species dedup.
    pub fn accession_table(&self) -> PathBuf {
        self.mirror_dir.join(ACCESSION_TABLE)
    }

    fn genome_path(&self, reference_id: &str) -> Option<PathBuf> {
        let base = self.mirror_dir.join(GENOMES_SUBDIR);
        for name in [
            format!("{}.fna", reference_id),
            format!("{}.fna.gz", reference_id),
            format!("{}.fasta", reference_id),
            format!("{}.fasta.gz", reference_id),
        ] {
            let path = base.join(name);
            if path.exists() {
                return Some(path);
            }
        }
        None
    }

    fn load_taxid_table(&self) -> Result<HashMap<String, u32>> {
        let reader = crate::bio::taxonomy::open_maybe_gz(&self.accession_table())
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        let mut map = HashMap::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t');
            let (Some(id), Some(taxid)) = (fields.next(), fields.next()) else {
                continue;
            };
            if let Ok(taxid) = taxid.trim().parse::<u32>() {
                map.insert(id.trim().to_string(), taxid);
            }
        }
        Ok(map)
    }
}

impl ReferenceMaterialiser for LocalMirrorMaterialiser {
    fn materialise(
        &self,
        references: &[SelectedReference],
        scratch: &Path,
        cancel: &CancelToken,
    ) -> Result<MaterialisedReferences> {
        let taxids = self.load_taxid_table()?;

        let fasta_path = scratch.join(crate::storage::cache::REFERENCES_FASTA);
        let table_path = scratch.join(crate::storage::cache::REFERENCE_TAXONOMY);
        let mut fasta = std::io::BufWriter::new(std::fs::File::create(&fasta_path)?);
        let mut table = std::io::BufWriter::new(std::fs::File::create(&table_path)?);

        for selected in references {
            if cancel.is_cancelled() {
                bail!("materialisation cancelled");
            }
            let id = selected.reference_id.as_str();
            let genome = self
                .genome_path(id)
                .with_context(|| format!("genome for {} not present in mirror", id))?;

            let mut reader = crate::bio::taxonomy::open_maybe_gz(&genome)
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            std::io::copy(&mut reader, &mut fasta)
                .with_context(|| format!("copying {:?}", genome))?;

            match taxids.get(id) {
                Some(taxid) => writeln!(table, "{}\t{}", id, taxid)?,
                None => {
                    tracing::warn!(reference_id = id, "no taxid in mirror table");
                    writeln!(table, "{}\t0", id)?;
                }
            }
        }

        fasta.flush()?;
        table.flush()?;
        Ok(MaterialisedReferences {
            fasta: fasta_path,
            taxonomy_tsv: table_path,
        })
    }

    fn name(&self) -> &str {
        "local-mirror"
    }
}
