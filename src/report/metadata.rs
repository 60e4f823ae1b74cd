//! Run provenance (`metadata.json`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::config::Config;
use crate::core::counters::CounterSnapshot;
use crate::{HymetError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub version: String,
    /// Build commit when the build system provided one.
    pub commit: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub input: PathBuf,
    pub mode: String,
    pub selection_fingerprint: String,
    pub selection_threshold: f64,
    pub selected_references: usize,
    pub cache_dir: PathBuf,
    pub tool_versions: BTreeMap<String, String>,
    pub counters: CounterSnapshot,
    pub config: Config,
}

impl RunMetadata {
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| HymetError::Other(format!("metadata serialization: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

pub fn build_commit() -> String {
    option_env!("HYMET_BUILD_COMMIT")
        .unwrap_or("unknown")
        .to_string()
}

pub fn package_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
