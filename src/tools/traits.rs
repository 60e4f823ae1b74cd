//! Collaborator interfaces for the external stages.
//!
//! The pipeline never shells out directly: sketching, alignment, and
//! reference materialisation sit behind these traits, implemented once as
//! subprocess/filesystem adapters and re-implemented as mocks in tests.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::core::selection::SelectedReference;
use crate::utils::cancel::CancelToken;

/// Produces screen rows `(similarity, reference_id)` for a query file.
pub trait Sketcher: Send + Sync {
    /// Screen `queries` against the reference sketch collection; returns
    /// the path of the written screen table.
    fn screen(&self, queries: &Path, out_dir: &Path, cancel: &CancelToken) -> Result<PathBuf>;

    /// Verify that the tool is properly installed.
    fn verify_installation(&self) -> Result<()>;

    fn name(&self) -> &str;

    fn version(&self) -> Result<String>;
}

/// Long-sequence aligner producing PAF.
pub trait Aligner: Send + Sync {
    /// Build an index over the reference FASTA at `index_path`.
    fn build_index(
        &self,
        reference_fasta: &Path,
        index_path: &Path,
        cancel: &CancelToken,
    ) -> Result<()>;

    /// Align `queries` against the indexed references; returns the path of
    /// the written PAF file.
    fn align(
        &self,
        queries: &Path,
        index_path: &Path,
        out_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<PathBuf>;

    fn verify_installation(&self) -> Result<()>;

    fn name(&self) -> &str;

    fn version(&self) -> Result<String>;
}

/// Artifacts a materialiser deposits into a cache scratch directory.
#[derive(Debug, Clone)]
pub struct MaterialisedReferences {
    pub fasta: PathBuf,
    pub taxonomy_tsv: PathBuf,
}

/// Turns a selected reference list into a concatenated FASTA plus its
/// `reference_id -> taxid` table. Downloading is out of scope: the shipped
/// implementation reads a local mirror.
pub trait ReferenceMaterialiser: Send + Sync {
    fn materialise(
        &self,
        references: &[SelectedReference],
        scratch: &Path,
        cancel: &CancelToken,
    ) -> Result<MaterialisedReferences>;

    fn name(&self) -> &str;
}
