//! Shared fixtures: a miniature NCBI taxonomy dump and mock collaborators
//! that stand in for the external sketcher, aligner, and genome mirror.

use std::path::{Path, PathBuf};

use anyhow::Result;
use hymet::core::config::Config;
use hymet::tools::traits::{
    Aligner, MaterialisedReferences, ReferenceMaterialiser, Sketcher,
};
use hymet::utils::cancel::CancelToken;

/// Escherichia coli lineage, a sibling species under the same genus, one
/// merged id (511145 -> 562) and one deleted id (4242).
pub fn write_taxdump(dir: &Path) {
    std::fs::write(
        dir.join("nodes.dmp"),
        "\
1\t|\t1\t|\tno rank\t|\n\
2\t|\t1\t|\tsuperkingdom\t|\n\
1224\t|\t2\t|\tphylum\t|\n\
1236\t|\t1224\t|\tclass\t|\n\
91347\t|\t1236\t|\torder\t|\n\
543\t|\t91347\t|\tfamily\t|\n\
561\t|\t543\t|\tgenus\t|\n\
562\t|\t561\t|\tspecies\t|\n\
622\t|\t561\t|\tspecies\t|\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("names.dmp"),
        "\
1\t|\troot\t|\t\t|\tscientific name\t|\n\
2\t|\tBacteria\t|\t\t|\tscientific name\t|\n\
1224\t|\tProteobacteria\t|\t\t|\tscientific name\t|\n\
1236\t|\tGammaproteobacteria\t|\t\t|\tscientific name\t|\n\
91347\t|\tEnterobacterales\t|\t\t|\tscientific name\t|\n\
543\t|\tEnterobacteriaceae\t|\t\t|\tscientific name\t|\n\
561\t|\tEscherichia\t|\t\t|\tscientific name\t|\n\
562\t|\tEscherichia coli\t|\t\t|\tscientific name\t|\n\
622\t|\tShigella dysenteriae\t|\t\t|\tscientific name\t|\n",
    )
    .unwrap();
    std::fs::write(dir.join("merged.dmp"), "511145\t|\t562\t|\n").unwrap();
    std::fs::write(dir.join("delnodes.dmp"), "4242\t|\n").unwrap();
}

/// Sketcher that writes a canned screen table.
pub struct MockSketcher {
    pub screen_tsv: String,
}

impl Sketcher for MockSketcher {
    fn screen(&self, _queries: &Path, out_dir: &Path, _cancel: &CancelToken) -> Result<PathBuf> {
        let path = out_dir.join("screen.tsv");
        std::fs::write(&path, &self.screen_tsv)?;
        Ok(path)
    }

    fn verify_installation(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "mock-sketcher"
    }

    fn version(&self) -> Result<String> {
        Ok("mock-1.0".to_string())
    }
}

/// Aligner that writes a canned PAF file and a placeholder index.
pub struct MockAligner {
    pub paf: String,
}

impl Aligner for MockAligner {
    fn build_index(
        &self,
        _reference_fasta: &Path,
        index_path: &Path,
        _cancel: &CancelToken,
    ) -> Result<()> {
        std::fs::write(index_path, b"mock-index")?;
        Ok(())
    }

    fn align(
        &self,
        _queries: &Path,
        _index_path: &Path,
        out_dir: &Path,
        _cancel: &CancelToken,
    ) -> Result<PathBuf> {
        let path = out_dir.join("alignments.paf");
        std::fs::write(&path, &self.paf)?;
        Ok(path)
    }

    fn verify_installation(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "mock-aligner"
    }

    fn version(&self) -> Result<String> {
        Ok("mock-2.0".to_string())
    }
}

/// Materialiser that fabricates one contig per reference and a canned
/// taxid table.
pub struct MockMaterialiser {
    /// reference_id -> taxid rows, written verbatim.
    pub taxid_table: String,
}

impl ReferenceMaterialiser for MockMaterialiser {
    fn materialise(
        &self,
        references: &[hymet::core::selection::SelectedReference],
        scratch: &Path,
        _cancel: &CancelToken,
    ) -> Result<MaterialisedReferences> {
        let fasta = scratch.join("references.fasta");
        let mut contents = String::new();
        for r in references {
            contents.push_str(&format!(">{}\nACGTACGTACGT\n", r.reference_id));
        }
        std::fs::write(&fasta, contents)?;
        let taxonomy_tsv = scratch.join("reference_taxonomy.tsv");
        std::fs::write(&taxonomy_tsv, &self.taxid_table)?;
        Ok(MaterialisedReferences {
            fasta,
            taxonomy_tsv,
        })
    }

    fn name(&self) -> &str {
        "mock-materialiser"
    }
}

/// Everything one pipeline run needs, rooted in a tempdir the caller owns.
pub struct Fixture {
    pub config: Config,
    pub input: PathBuf,
}

impl Fixture {
    /// Lay out a taxdump, a query FASTA, and a cache root under `base`.
    pub fn new(base: &Path, query_fasta: &str) -> Self {
        let taxdump = base.join("taxdump");
        std::fs::create_dir_all(&taxdump).unwrap();
        write_taxdump(&taxdump);

        let input = base.join("queries.fasta");
        std::fs::write(&input, query_fasta).unwrap();

        let mut config = Config::default();
        config.taxonomy.dump_dir = taxdump;
        config.cache.root = base.join("cache");
        Self { config, input }
    }
}

/// A FASTA sequence line of `len` bases for synthetic queries.
pub fn bases(len: usize) -> String {
    "ACGT".chars().cycle().take(len).collect()
}
