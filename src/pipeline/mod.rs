//! Run orchestration.
//!
//! `Pipeline::run` drives the whole classification: query scan -> screen ->
//! candidate selection -> cache resolution -> alignment -> streaming
//! aggregation -> weighted-LCA resolution -> reports. External stages sit
//! behind the tool traits; everything observable (outputs, logs, metadata)
//! lands under the output directory.
//!
//! Final artifacts and log files are written into a staging directory and
//! renamed into place on success. A cancelled run drains the aggregator's
//! current query, moves whatever was staged into `aborted/`, and surfaces
//! [`HymetError::Cancelled`]; nothing ever appears at a final output path.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};

use crate::bio::fasta::{scan_queries, QueryInfo};
use crate::bio::screen::read_screen_rows;
use crate::bio::taxonomy::TaxonomyStore;
use crate::core::aggregator::AlignmentAggregator;
use crate::core::config::{Config, RunMode};
use crate::core::counters::RunCounters;
use crate::core::registry::ReferenceRegistry;
use crate::core::resolver::{LcaResolver, QueryAssignment};
use crate::core::selection::{CandidateSelector, Selection};
use crate::report::assignments::{order_assignments, write_assignments};
use crate::report::cami::{write_profile, ProfileBuilder, ProfileRow};
use crate::report::metadata::{build_commit, package_version, RunMetadata};
use crate::storage::cache::{ReferenceCache, ALIGNMENT_INDEX, CACHE_META};
use crate::storage::meta::{file_sha256, CacheMeta};
use crate::tools::traits::{Aligner, ReferenceMaterialiser, Sketcher};
use crate::utils::cancel::CancelToken;
use crate::utils::workspace::Workspace;
use crate::{HymetError, Result};

pub const ASSIGNMENTS_FILE: &str = "classified_sequences.tsv";
pub const PROFILE_FILE: &str = "profile.cami.tsv";
pub const METADATA_FILE: &str = "metadata.json";
pub const LOGS_SUBDIR: &str = "logs";

/// The three external collaborators, injected by the CLI (subprocess
/// adapters) or by tests (mocks).
pub struct PipelineTools {
    pub sketcher: Box<dyn Sketcher>,
    pub aligner: Box<dyn Aligner>,
    pub materialiser: Box<dyn ReferenceMaterialiser>,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub queries: usize,
    pub classified: usize,
    pub unclassified: usize,
    pub fingerprint: String,
    pub cache_dir: PathBuf,
}

pub struct Pipeline {
    config: Config,
    mode: RunMode,
    tools: PipelineTools,
    cancel: CancelToken,
    /// Global accession registry for species dedup during selection.
    global_registry: Option<ReferenceRegistry>,
}

impl Pipeline {
    pub fn new(config: Config, mode: RunMode, tools: PipelineTools, cancel: CancelToken) -> Self {
        Self {
            config,
            mode,
            tools,
            cancel,
            global_registry: None,
        }
    }

    pub fn with_global_registry(mut self, registry: Option<ReferenceRegistry>) -> Self {
        self.global_registry = registry;
        self
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(HymetError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run end to end. On success the final artifacts sit directly under
    /// `out_dir`; on cancellation partial artifacts move to
    /// `out_dir/aborted`.
    pub fn run(&self, input: &Path, out_dir: &Path) -> Result<RunOutcome> {
        std::fs::create_dir_all(out_dir)?;
        let staging = Workspace::create(out_dir.join(".staging"))?;
        std::fs::create_dir_all(staging.path().join(LOGS_SUBDIR))?;

        let result = self.run_inner(input, out_dir, staging.path());
        match &result {
            Err(HymetError::Cancelled) => {
                let aborted = out_dir.join("aborted");
                std::fs::create_dir_all(&aborted)?;
                publish_staged(staging.path(), &aborted)?;
                tracing::warn!("run cancelled; partial outputs in {:?}", aborted);
            }
            // Failed runs keep their diagnostics; final artifacts stay unwritten
            Err(_) => publish_staged_logs(staging.path(), out_dir)?,
            Ok(_) => {}
        }
        result
    }

    fn run_inner(&self, input: &Path, out_dir: &Path, staging: &Path) -> Result<RunOutcome> {
        let started_at = Utc::now();
        let config = &self.config;
        // Logs stage with the other artifacts and publish together
        let logs_dir = staging.join(LOGS_SUBDIR);

        let taxonomy = TaxonomyStore::load(&config.taxonomy.dump_dir)?;
        tracing::info!(nodes = taxonomy.len(), "taxonomy loaded");

        let queries = scan_queries(input)?;
        tracing::info!(queries = queries.len(), mode = %self.mode, "queries scanned");
        self.checkpoint()?;

        let mut work = Workspace::create(out_dir.join("work"))?;
        if config.run.keep_work {
            work.keep();
        }

        // Screen + select
        let screen_path = self
            .tools
            .sketcher
            .screen(input, work.path(), &self.cancel)
            .map_err(tool_error)?;
        self.checkpoint()?;
        let rows = read_screen_rows(&screen_path)?;

        let selector = CandidateSelector::new(config.selection.clone());
        let selection = match selector.select(
            rows,
            queries.len(),
            self.global_registry.as_ref(),
            if self.global_registry.is_some() {
                Some(&taxonomy)
            } else {
                None
            },
        ) {
            Ok(selection) => selection,
            Err(HymetError::EmptyCandidateSet) => {
                return self.finish_empty(input, out_dir, staging, &queries, started_at);
            }
            Err(e) => return Err(e),
        };
        write_candidate_log(&logs_dir, &selection)?;
        write_selected_references(work.path(), &selection)?;
        tracing::info!(
            references = selection.references.len(),
            threshold = selection.threshold,
            fingerprint = %selection.fingerprint,
            "candidates selected"
        );
        self.checkpoint()?;

        // Cache resolution
        let cache = ReferenceCache::new(config.cache.root.clone())?;
        let tool_versions = self.tool_versions();
        let handle = cache.resolve(
            &selection.fingerprint,
            config.cache.force_rebuild,
            |scratch| self.build_cache_entry(scratch, &selection, &tool_versions),
        )?;
        self.checkpoint()?;

        // Registry for the active entry
        let registry = ReferenceRegistry::build_from_path(&handle.reference_taxonomy(), &taxonomy)?;

        // Alignment
        let paf_path = self
            .tools
            .aligner
            .align(input, &handle.alignment_index(), work.path(), &self.cancel)
            .map_err(tool_error)?;
        self.checkpoint()?;

        // Aggregation feeding resolution over a bounded queue
        let counters = Arc::new(RunCounters::new());
        let (resolved, profile_rows) =
            self.aggregate_and_resolve(&paf_path, &taxonomy, &registry, counters.clone())?;
        let cancelled = self.cancel.is_cancelled();

        // Reports
        let assignments = order_assignments(&queries, resolved);
        write_assignments(&staging.join(ASSIGNMENTS_FILE), &assignments)?;
        let sample_id = self.sample_id(input);
        write_profile(&staging.join(PROFILE_FILE), &sample_id, &profile_rows)?;

        let mut classified = 0usize;
        let mut ambiguous = 0usize;
        for a in &assignments {
            if a.is_classified() {
                classified += 1;
            }
            if a.ambiguous {
                ambiguous += 1;
            }
        }
        counters
            .queries_classified
            .store(classified as u64, std::sync::atomic::Ordering::Relaxed);
        counters.queries_unclassified.store(
            (assignments.len() - classified) as u64,
            std::sync::atomic::Ordering::Relaxed,
        );
        counters
            .queries_ambiguous
            .store(ambiguous as u64, std::sync::atomic::Ordering::Relaxed);

        let snapshot = counters.snapshot(
            registry.unknown_lookup_count(),
            taxonomy.unknown_query_count(),
        );
        write_resolver_log(&logs_dir, &snapshot)?;

        if cancelled {
            return Err(HymetError::Cancelled);
        }

        let metadata = RunMetadata {
            version: package_version(),
            commit: build_commit(),
            started_at,
            finished_at: Utc::now(),
            input: input.to_path_buf(),
            mode: self.mode.to_string(),
            selection_fingerprint: selection.fingerprint.clone(),
            selection_threshold: selection.threshold,
            selected_references: selection.references.len(),
            cache_dir: handle.dir().to_path_buf(),
            tool_versions,
            counters: snapshot,
            config: config.clone(),
        };
        metadata.save(&staging.join(METADATA_FILE))?;

        // Publish
        publish_staged(staging, out_dir)?;

        tracing::info!(
            classified,
            unclassified = assignments.len() - classified,
            "run complete"
        );
        Ok(RunOutcome {
            queries: assignments.len(),
            classified,
            unclassified: assignments.len() - classified,
            fingerprint: selection.fingerprint,
            cache_dir: handle.dir().to_path_buf(),
        })
    }

    /// Builder invoked on a cache miss: materialise references, index them,
    /// record provenance.
    fn build_cache_entry(
        &self,
        scratch: &Path,
        selection: &Selection,
        tool_versions: &BTreeMap<String, String>,
    ) -> Result<()> {
        let materialised = self
            .tools
            .materialiser
            .materialise(&selection.references, scratch, &self.cancel)
            .map_err(tool_error)?;

        self.tools
            .aligner
            .build_index(&materialised.fasta, &scratch.join(ALIGNMENT_INDEX), &self.cancel)
            .map_err(tool_error)?;

        let mut references: Vec<String> = selection
            .references
            .iter()
            .map(|r| r.reference_id.clone())
            .collect();
        references.sort_unstable();

        let mut checksums = BTreeMap::new();
        for name in [
            crate::storage::cache::REFERENCES_FASTA,
            crate::storage::cache::REFERENCE_TAXONOMY,
            ALIGNMENT_INDEX,
        ] {
            checksums.insert(name.to_string(), file_sha256(&scratch.join(name))?);
        }

        let meta = CacheMeta {
            fingerprint: selection.fingerprint.clone(),
            references,
            checksums,
            created_at: Utc::now(),
            tool_versions: tool_versions.clone(),
        };
        meta.save(&scratch.join(CACHE_META))
    }

    /// One thread streams PAF into summaries; a second resolves them. The
    /// bounded channel gives the parser backpressure.
    fn aggregate_and_resolve(
        &self,
        paf_path: &Path,
        taxonomy: &TaxonomyStore,
        registry: &ReferenceRegistry,
        counters: Arc<RunCounters>,
    ) -> Result<(Vec<QueryAssignment>, Vec<ProfileRow>)> {
        let reader = crate::bio::taxonomy::open_maybe_gz(paf_path)?;
        let aggregator =
            AlignmentAggregator::new(self.config.alignment.clone(), registry, counters.clone());
        let resolver = LcaResolver::new(taxonomy, self.config.resolver.clone());
        let (tx, rx) = crossbeam::channel::bounded(self.config.alignment.queue_depth);

        let progress = ProgressBar::new_spinner();
        progress.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {pos} queries resolved")
                .unwrap(),
        );

        let cancel = &self.cancel;
        std::thread::scope(|scope| {
            let resolver_thread = scope.spawn(|| {
                let mut builder = ProfileBuilder::new(taxonomy);
                let mut resolved = Vec::new();
                for hits in rx {
                    let assignment = resolver.resolve(&hits);
                    builder.add(&assignment);
                    resolved.push(assignment);
                    progress.inc(1);
                }
                (resolved, builder.build())
            });

            let stream_result = aggregator.run(reader, |hits| {
                if cancel.is_cancelled() {
                    return false;
                }
                tx.send(hits).is_ok()
            });
            drop(tx);

            let (resolved, rows) = resolver_thread
                .join()
                .map_err(|_| HymetError::Other("resolver thread panicked".into()))?;
            progress.finish_and_clear();
            stream_result?;
            Ok((resolved, rows))
        })
    }

    /// Empty candidate set: honour `allow_empty` by still writing an
    /// all-unclassified table and a headers-only profile, then surface the
    /// error so the orchestrator exits 7 either way.
    fn finish_empty(
        &self,
        input: &Path,
        out_dir: &Path,
        staging: &Path,
        queries: &[QueryInfo],
        _started_at: chrono::DateTime<Utc>,
    ) -> Result<RunOutcome> {
        if !self.config.run.allow_empty {
            return Err(HymetError::EmptyCandidateSet);
        }
        tracing::warn!("no candidate references; emitting unclassified assignments");
        let assignments = order_assignments(queries, Vec::new());
        write_assignments(&staging.join(ASSIGNMENTS_FILE), &assignments)?;
        write_profile(&staging.join(PROFILE_FILE), &self.sample_id(input), &[])?;
        publish_staged(staging, out_dir)?;
        Err(HymetError::EmptyCandidateSet)
    }

    fn sample_id(&self, input: &Path) -> String {
        self.config.run.sample_id.clone().unwrap_or_else(|| {
            input
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "sample".to_string())
        })
    }

    fn tool_versions(&self) -> BTreeMap<String, String> {
        let mut versions = BTreeMap::new();
        versions.insert(
            self.tools.sketcher.name().to_string(),
            self.tools
                .sketcher
                .version()
                .unwrap_or_else(|_| "unknown".to_string()),
        );
        versions.insert(
            self.tools.aligner.name().to_string(),
            self.tools
                .aligner
                .version()
                .unwrap_or_else(|_| "unknown".to_string()),
        );
        versions
    }
}

fn tool_error(e: anyhow::Error) -> HymetError {
    HymetError::Tool(format!("{:#}", e))
}

/// Move staged artifacts, including the logs subdirectory, into `dest`.
/// Files the run never reached are skipped, so the same helper serves the
/// success publication and the aborted/ flush.
fn publish_staged(staging: &Path, dest: &Path) -> Result<()> {
    for name in [ASSIGNMENTS_FILE, PROFILE_FILE, METADATA_FILE] {
        let staged = staging.join(name);
        if staged.exists() {
            std::fs::rename(&staged, dest.join(name))?;
        }
    }
    publish_staged_logs(staging, dest)
}

fn publish_staged_logs(staging: &Path, dest: &Path) -> Result<()> {
    let staged_logs = staging.join(LOGS_SUBDIR);
    if staged_logs.exists() {
        let dest_logs = dest.join(LOGS_SUBDIR);
        std::fs::create_dir_all(&dest_logs)?;
        for item in std::fs::read_dir(&staged_logs)? {
            let item = item?;
            std::fs::rename(item.path(), dest_logs.join(item.file_name()))?;
        }
    }
    Ok(())
}

fn write_candidate_log(logs_dir: &Path, selection: &Selection) -> Result<()> {
    let mut out = std::fs::File::create(logs_dir.join("candidate_limit.log"))?;
    writeln!(out, "screen_rows\t{}", selection.total_rows)?;
    writeln!(out, "min_candidates\t{}", selection.min_candidates)?;
    writeln!(out, "threshold\t{:.2}", selection.threshold)?;
    writeln!(out, "retained\t{}", selection.retained)?;
    writeln!(out, "selected\t{}", selection.references.len())?;
    Ok(())
}

fn write_resolver_log(logs_dir: &Path, snapshot: &crate::core::counters::CounterSnapshot) -> Result<()> {
    let contents = serde_json::to_string_pretty(snapshot)
        .map_err(|e| HymetError::Other(format!("counter serialization: {}", e)))?;
    std::fs::write(logs_dir.join("resolver.log"), contents)?;
    Ok(())
}

fn write_selected_references(work_dir: &Path, selection: &Selection) -> Result<()> {
    let mut out = std::fs::File::create(work_dir.join("selected_references.tsv"))?;
    for r in &selection.references {
        writeln!(out, "{}\t{:.6}", r.reference_id, r.similarity)?;
    }
    Ok(())
}
