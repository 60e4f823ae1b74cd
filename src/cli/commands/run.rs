use clap::Args;
use std::path::PathBuf;

use crate::core::config::{load_config, Config, RunMode};
use crate::core::registry::ReferenceRegistry;
use crate::pipeline::{Pipeline, PipelineTools};
use crate::tools::{LocalMirrorMaterialiser, MashSketcher, Minimap2Aligner};
use crate::utils::cancel::CancelToken;
use crate::HymetError;

#[derive(Args)]
pub struct RunArgs {
    /// Assembled contigs to classify (FASTA, optionally gzipped)
    #[arg(long, value_name = "FILE", conflicts_with = "reads")]
    pub contigs: Option<PathBuf>,

    /// Long reads to classify (FASTA/FASTQ, optionally gzipped)
    #[arg(long, value_name = "FILE")]
    pub reads: Option<PathBuf>,

    /// Output directory
    #[arg(long, value_name = "DIR")]
    pub out: PathBuf,

    /// Configuration file (TOML)
    #[arg(short = 'c', long, value_name = "FILE", env = "HYMET_CONFIG")]
    pub config: Option<PathBuf>,

    /// NCBI taxonomy dump directory (nodes.dmp, names.dmp, ...)
    #[arg(long, value_name = "DIR")]
    pub taxonomy_dir: Option<PathBuf>,

    /// Prebuilt mash sketch collection (.msh)
    #[arg(long, value_name = "FILE")]
    pub sketch_db: Option<PathBuf>,

    /// Local assembly mirror: accession2taxid.tsv plus genomes/
    #[arg(long, value_name = "DIR")]
    pub assembly_summary_dir: Option<PathBuf>,

    /// Maximum number of candidate references
    #[arg(long, value_name = "N")]
    pub cand_max: Option<usize>,

    /// Keep only the best reference per species during selection
    #[arg(long)]
    pub species_dedup: bool,

    /// Reference cache root
    #[arg(long, value_name = "DIR", env = "CACHE_ROOT")]
    pub cache_root: Option<PathBuf>,

    /// Invalidate the resolved cache entry and rebuild it before use
    #[arg(long, env = "FORCE_DOWNLOAD", value_parser = clap::builder::BoolishValueParser::new())]
    pub force_rebuild: bool,

    /// Sample identifier for the CAMI profile header
    #[arg(long, value_name = "ID")]
    pub sample_id: Option<String>,

    /// Retain the intermediate work directory
    #[arg(long, env = "KEEP_HYMET_WORK", value_parser = clap::builder::BoolishValueParser::new())]
    pub keep_work: bool,
}

pub fn run(args: RunArgs, threads: usize) -> anyhow::Result<()> {
    // Config file first, then flags (clap has already folded the recognised
    // environment variables into them); validated once
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    if let Some(dir) = &args.taxonomy_dir {
        config.taxonomy.dump_dir = dir.clone();
    }
    if let Some(path) = &args.sketch_db {
        config.tools.mash.sketch_db = Some(path.clone());
    }
    if let Some(dir) = &args.assembly_summary_dir {
        config.run.assembly_summary_dir = Some(dir.clone());
    }
    if let Some(cand_max) = args.cand_max {
        config.selection.cand_max = cand_max;
    }
    if args.species_dedup {
        config.selection.species_dedup = true;
    }
    if let Some(root) = &args.cache_root {
        config.cache.root = root.clone();
    }
    if args.force_rebuild {
        config.cache.force_rebuild = true;
    }
    if let Some(sample_id) = &args.sample_id {
        config.run.sample_id = Some(sample_id.clone());
    }
    if args.keep_work {
        config.run.keep_work = true;
    }
    config.validate()?;

    let (input, mode) = match (&args.contigs, &args.reads) {
        (Some(path), None) => (path.clone(), RunMode::Contigs),
        (None, Some(path)) => (path.clone(), RunMode::Reads),
        _ => {
            return Err(
                HymetError::Config("exactly one of --contigs or --reads is required".into())
                    .into(),
            )
        }
    };
    if !input.exists() {
        return Err(HymetError::MissingInput(input.display().to_string()).into());
    }

    let mirror_dir = config.run.assembly_summary_dir.clone().ok_or_else(|| {
        HymetError::Config("--assembly-summary-dir (or run.assembly_summary_dir) is required".into())
    })?;
    let materialiser = LocalMirrorMaterialiser::new(mirror_dir)?;

    // The selector needs the global accession table when deduplicating by
    // species; the per-entry registry only exists after the cache is built
    let global_registry = if config.selection.species_dedup {
        let taxonomy = crate::bio::taxonomy::TaxonomyStore::load(&config.taxonomy.dump_dir)?;
        Some(ReferenceRegistry::build_from_path(
            &materialiser.accession_table(),
            &taxonomy,
        )?)
    } else {
        None
    };

    let sketcher = MashSketcher::new(&config.tools.mash)?;
    let aligner = Minimap2Aligner::new(&config.tools.minimap2, mode, threads);
    crate::tools::Sketcher::verify_installation(&sketcher)?;
    crate::tools::Aligner::verify_installation(&aligner)?;

    let cancel = CancelToken::new();
    cancel.install_signal_handler();

    let tools = PipelineTools {
        sketcher: Box::new(sketcher),
        aligner: Box::new(aligner),
        materialiser: Box::new(materialiser),
    };
    let pipeline =
        Pipeline::new(config, mode, tools, cancel).with_global_registry(global_registry);

    let outcome = pipeline.run(&input, &args.out)?;
    println!(
        "Classified {} of {} queries (fingerprint {})",
        outcome.classified, outcome.queries, outcome.fingerprint
    );
    Ok(())
}
