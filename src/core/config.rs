//! Run configuration.
//!
//! Everything tunable lives here: thresholds, cache location, tool paths.
//! The recognised environment variables arrive through clap's `env`
//! attributes on the matching CLI flags and are folded in once before
//! validation; no component reads the environment after startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{HymetError, Result};

/// How the mode flag on the CLI maps to the aligner preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Contigs,
    Reads,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunMode::Contigs => write!(f, "contigs"),
            RunMode::Reads => write!(f, "reads"),
        }
    }
}

/// Vote weighting used by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeightingMode {
    /// weight = covered_bases x weighted_identity
    IdentityWeighted,
    /// weight = covered_bases
    CoverageOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub selection: SelectionConfig,
    pub alignment: AlignmentConfig,
    pub resolver: ResolverConfig,
    pub cache: CacheConfig,
    pub tools: ToolsConfig,
    pub taxonomy: TaxonomyConfig,
    pub run: RunConfig,
}

/// Candidate selection (screen rows -> reference list).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Starting similarity threshold for the adaptive descent.
    pub initial_threshold: f64,
    /// Decrement applied while too few rows pass.
    pub threshold_step: f64,
    /// Hard floor for the descent.
    pub threshold_floor: f64,
    /// Absolute minimum candidate count.
    pub min_candidates: usize,
    /// Candidate floor scales with query count: max(min_candidates, ceil(factor * n_queries)).
    pub min_candidates_factor: f64,
    /// Hard cap on selected references.
    pub cand_max: usize,
    /// Keep only the top-similarity row per species-level taxid.
    pub species_dedup: bool,
}

/// PAF aggregation filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    /// Minimum covered_bases / query_len for a hit to survive.
    pub rel_cov_threshold: f64,
    /// Minimum covered_bases as a fraction of query_len (second, independent gate).
    pub abs_cov_threshold: f64,
    /// Minimum weighted identity for a hit to survive.
    pub min_identity: f64,
    /// Drop hits whose reference has no known taxid.
    pub drop_unknown_taxids: bool,
    /// Malformed PAF lines tolerated before the stream is abandoned.
    pub max_parse_errors: u64,
    /// Depth of the aggregator -> resolver queue.
    pub queue_depth: usize,
}

/// Weighted-LCA resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum cumulative vote weight for any assignment.
    pub min_support_weight: f64,
    /// Minimum number of distinct references behind the chosen taxid.
    pub min_taxid_support: u32,
    /// Minimum confidence required to descend into a child.
    pub confidence_floor: f64,
    /// Relative margin below which sibling weights count as tied.
    pub tie_epsilon: f64,
    /// Vote weighting scheme.
    pub weighting: WeightingMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root directory. Defaults to ~/.hymet/cache.
    pub root: PathBuf,
    /// Invalidate the resolved entry before use.
    pub force_rebuild: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub mash: MashConfig,
    pub minimap2: Minimap2Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MashConfig {
    /// mash binary (name or path).
    pub binary: String,
    /// Prebuilt reference sketch (.msh) screened against the queries.
    pub sketch_db: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Minimap2Config {
    /// minimap2 binary (name or path).
    pub binary: String,
    /// Preset used in contigs mode.
    pub preset_contigs: String,
    /// Preset used in reads mode.
    pub preset_reads: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaxonomyConfig {
    /// Directory holding nodes.dmp / names.dmp / merged.dmp / delnodes.dmp.
    pub dump_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Retain the intermediate work directory under <out>/work.
    pub keep_work: bool,
    /// On an empty candidate set, still write an all-unclassified table.
    pub allow_empty: bool,
    /// Sample identifier for the CAMI profile header. Defaults to the input stem.
    pub sample_id: Option<String>,
    /// Directory with the global accession2taxid table and genome mirror.
    pub assembly_summary_dir: Option<PathBuf>,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            initial_threshold: 0.90,
            threshold_step: 0.02,
            threshold_floor: 0.70,
            min_candidates: 5,
            min_candidates_factor: 3.25,
            cand_max: 500,
            species_dedup: false,
        }
    }
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            rel_cov_threshold: 0.30,
            abs_cov_threshold: 0.0,
            min_identity: 0.0,
            drop_unknown_taxids: false,
            max_parse_errors: 100,
            queue_depth: 64,
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            min_support_weight: 0.0,
            min_taxid_support: 1,
            confidence_floor: 0.5,
            tie_epsilon: 0.05,
            weighting: WeightingMode::IdentityWeighted,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_cache_root(),
            force_rebuild: false,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            mash: MashConfig::default(),
            minimap2: Minimap2Config::default(),
        }
    }
}

impl Default for MashConfig {
    fn default() -> Self {
        Self {
            binary: "mash".to_string(),
            sketch_db: None,
        }
    }
}

impl Default for Minimap2Config {
    fn default() -> Self {
        Self {
            binary: "minimap2".to_string(),
            preset_contigs: "asm20".to_string(),
            preset_reads: "map-ont".to_string(),
        }
    }
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            dump_dir: PathBuf::from("taxdump"),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            keep_work: false,
            allow_empty: true,
            sample_id: None,
            assembly_summary_dir: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            selection: SelectionConfig::default(),
            alignment: AlignmentConfig::default(),
            resolver: ResolverConfig::default(),
            cache: CacheConfig::default(),
            tools: ToolsConfig::default(),
            taxonomy: TaxonomyConfig::default(),
            run: RunConfig::default(),
        }
    }
}

/// ~/.hymet/cache, falling back to a relative path when no home exists.
pub fn default_cache_root() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".hymet").join("cache"))
        .unwrap_or_else(|| PathBuf::from(".hymet-cache"))
}

impl Config {
    /// Reject contradictory or out-of-range settings. Runs at startup only.
    pub fn validate(&self) -> Result<()> {
        let s = &self.selection;
        check_unit("selection.initial_threshold", s.initial_threshold)?;
        check_unit("selection.threshold_floor", s.threshold_floor)?;
        if s.threshold_step <= 0.0 {
            return Err(HymetError::Config(
                "selection.threshold_step must be positive".into(),
            ));
        }
        if s.threshold_floor > s.initial_threshold {
            return Err(HymetError::Config(
                "selection.threshold_floor must not exceed selection.initial_threshold".into(),
            ));
        }
        if s.min_candidates_factor <= 0.0 {
            return Err(HymetError::Config(
                "selection.min_candidates_factor must be positive".into(),
            ));
        }
        if s.cand_max == 0 {
            return Err(HymetError::Config("selection.cand_max must be > 0".into()));
        }

        let a = &self.alignment;
        check_unit("alignment.rel_cov_threshold", a.rel_cov_threshold)?;
        check_unit("alignment.abs_cov_threshold", a.abs_cov_threshold)?;
        check_unit("alignment.min_identity", a.min_identity)?;
        if a.queue_depth == 0 {
            return Err(HymetError::Config("alignment.queue_depth must be > 0".into()));
        }

        let r = &self.resolver;
        check_unit("resolver.confidence_floor", r.confidence_floor)?;
        if !(0.0..1.0).contains(&r.tie_epsilon) {
            return Err(HymetError::Config(
                "resolver.tie_epsilon must be in [0, 1)".into(),
            ));
        }
        if r.min_support_weight < 0.0 {
            return Err(HymetError::Config(
                "resolver.min_support_weight must be non-negative".into(),
            ));
        }

        Ok(())
    }
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(HymetError::Config(format!("{} must be in [0, 1]", name)));
    }
    Ok(())
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)
        .map_err(|e| HymetError::Config(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &Config) -> Result<()> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| HymetError::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn floor_above_initial_rejected() {
        let mut config = Config::default();
        config.selection.threshold_floor = 0.95;
        config.selection.initial_threshold = 0.90;
        assert!(config.validate().is_err());
    }

    #[test]
    fn tie_epsilon_of_one_rejected() {
        let mut config = Config::default();
        config.resolver.tie_epsilon = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_round_trip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.selection.cand_max, config.selection.cand_max);
        assert_eq!(back.resolver.weighting, config.resolver.weighting);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let back: Config = toml::from_str("[selection]\ncand_max = 7\n").unwrap();
        assert_eq!(back.selection.cand_max, 7);
        assert_eq!(back.alignment.max_parse_errors, 100);
    }
}
