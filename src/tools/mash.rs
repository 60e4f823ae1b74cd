//! mash screen adapter.
//!
//! Screens the query file against a prebuilt reference sketch collection;
//! stdout (the screen table) is redirected straight into the work
//! directory.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::core::config::MashConfig;
use crate::tools::traits::Sketcher;
use crate::utils::cancel::CancelToken;

pub struct MashSketcher {
    binary: String,
    sketch_db: PathBuf,
}

impl MashSketcher {
    pub fn new(config: &MashConfig) -> Result<Self> {
        let sketch_db = config
            .sketch_db
            .clone()
            .context("tools.mash.sketch_db is not configured")?;
        if !sketch_db.exists() {
            bail!("mash sketch collection not found at {:?}", sketch_db);
        }
        Ok(Self {
            binary: config.binary.clone(),
            sketch_db,
        })
    }
}

impl Sketcher for MashSketcher {
    fn screen(&self, queries: &Path, out_dir: &Path, cancel: &CancelToken) -> Result<PathBuf> {
        let out_path = out_dir.join("screen.tsv");
        let out_file = std::fs::File::create(&out_path)
            .with_context(|| format!("creating {:?}", out_path))?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("screen")
            .arg(&self.sketch_db)
            .arg(queries)
            .stdout(out_file)
            .stderr(Stdio::piped());

        tracing::debug!(command = ?cmd, "spawning mash screen");
        let child = cmd.spawn().context("failed to spawn mash screen")?;
        super::wait_child(child, "mash screen", cancel)?;
        Ok(out_path)
    }

    fn verify_installation(&self) -> Result<()> {
        self.version().map(|_| ())
    }

    fn name(&self) -> &str {
        "mash"
    }

    fn version(&self) -> Result<String> {
        super::probe_version(&self.binary, "--version")
    }
}
