//! Cache entry metadata (`cache.meta`).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{HymetError, Result};

/// Provenance record stored next to the artifacts of one cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMeta {
    /// Fingerprint this entry is keyed by.
    pub fingerprint: String,
    /// Reference ids the entry was built from, sorted.
    pub references: Vec<String>,
    /// SHA-256 per artifact file name.
    pub checksums: std::collections::BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    /// Tool name -> version string, as reported at build time.
    pub tool_versions: std::collections::BTreeMap<String, String>,
}

impl CacheMeta {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| HymetError::Cache(format!("malformed cache.meta: {}", e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| HymetError::Cache(format!("cache.meta serialization: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// SHA-256 of a file, streamed.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
