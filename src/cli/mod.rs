pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "hymet",
    version,
    about = "Hybrid metagenomic classifier",
    long_about = "HYMET assigns query contigs or reads to taxonomic lineages by screening them \
                  against genome sketches, aligning against the selected references, and \
                  resolving the alignments through a weighted lowest-common-ancestor walk."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Number of threads to use (0 = all available)
    #[arg(short = 'j', long, default_value = "0", global = true)]
    pub threads: usize,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify query sequences and emit per-query assignments plus a CAMI profile
    Run(commands::run::RunArgs),

    /// Inspect and prune the reference cache
    Cache(commands::cache::CacheArgs),
}
