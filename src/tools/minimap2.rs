//! minimap2 adapter: index construction and PAF alignment.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::core::config::{Minimap2Config, RunMode};
use crate::tools::traits::Aligner;
use crate::utils::cancel::CancelToken;

pub struct Minimap2Aligner {
    binary: String,
    preset: String,
    threads: usize,
}

impl Minimap2Aligner {
    pub fn new(config: &Minimap2Config, mode: RunMode, threads: usize) -> Self {
        let preset = match mode {
            RunMode::Contigs => config.preset_contigs.clone(),
            RunMode::Reads => config.preset_reads.clone(),
        };
        Self {
            binary: config.binary.clone(),
            preset,
            threads: threads.max(1),
        }
    }
}

impl Aligner for Minimap2Aligner {
    fn build_index(
        &self,
        reference_fasta: &Path,
        index_path: &Path,
        cancel: &CancelToken,
    ) -> Result<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-x")
            .arg(&self.preset)
            .arg("-t")
            .arg(self.threads.to_string())
            .arg("-d")
            .arg(index_path)
            .arg(reference_fasta);
        super::run_cancellable(cmd, "minimap2 index", cancel)
    }

    fn align(
        &self,
        queries: &Path,
        index_path: &Path,
        out_dir: &Path,
        cancel: &CancelToken,
    ) -> Result<PathBuf> {
        let out_path = out_dir.join("alignments.paf");
        let out_file = std::fs::File::create(&out_path)
            .with_context(|| format!("creating {:?}", out_path))?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-x")
            .arg(&self.preset)
            .arg("-t")
            .arg(self.threads.to_string())
            .arg(index_path)
            .arg(queries)
            .stdout(out_file)
            .stderr(Stdio::piped());

        tracing::debug!(command = ?cmd, "spawning minimap2");
        let child = cmd.spawn().context("failed to spawn minimap2")?;
        super::wait_child(child, "minimap2", cancel)?;
        Ok(out_path)
    }

    fn verify_installation(&self) -> Result<()> {
        self.version().map(|_| ())
    }

    fn name(&self) -> &str {
        "minimap2"
    }

    fn version(&self) -> Result<String> {
        super::probe_version(&self.binary, "--version")
    }
}
