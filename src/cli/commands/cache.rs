use clap::{Args, Subcommand};
use humansize::{format_size, BINARY};
use std::path::PathBuf;

use crate::core::config::default_cache_root;
use crate::storage::cache::ReferenceCache;

#[derive(Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub command: CacheCommand,

    /// Reference cache root
    #[arg(long, value_name = "DIR", global = true, env = "CACHE_ROOT")]
    pub cache_root: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum CacheCommand {
    /// Evict ready cache entries by age and/or cumulative size
    Prune(PruneArgs),
}

#[derive(Args)]
pub struct PruneArgs {
    /// Evict entries older than this many days
    #[arg(long, value_name = "DAYS")]
    pub max_age_days: Option<u64>,

    /// Keep the cache under this many gigabytes in total
    #[arg(long, value_name = "GB")]
    pub max_size_gb: Option<u64>,
}

pub fn run(args: CacheArgs) -> anyhow::Result<()> {
    let root = args.cache_root.unwrap_or_else(default_cache_root);

    match args.command {
        CacheCommand::Prune(prune) => {
            if prune.max_age_days.is_none() && prune.max_size_gb.is_none() {
                anyhow::bail!("specify --max-age-days and/or --max-size-gb");
            }
            let cache = ReferenceCache::new(root)?;
            let max_age = prune
                .max_age_days
                .map(|days| std::time::Duration::from_secs(days * 24 * 60 * 60));
            let max_bytes = prune.max_size_gb.map(|gb| gb * 1024 * 1024 * 1024);
            let evicted = cache.prune(max_age, max_bytes)?;
            if let Some(bytes) = max_bytes {
                println!(
                    "Evicted {} entries (size budget {})",
                    evicted.len(),
                    format_size(bytes, BINARY)
                );
            } else {
                println!("Evicted {} entries", evicted.len());
            }
        }
    }
    Ok(())
}
