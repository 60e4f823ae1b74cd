//! Rerun and permutation properties: identical inputs give byte-identical
//! outputs, the cache is reused across runs, and record order within a PAF
//! query group does not matter.

mod common;

use common::{bases, Fixture, MockAligner, MockMaterialiser, MockSketcher};
use hymet::core::config::RunMode;
use hymet::pipeline::{Pipeline, PipelineTools};
use hymet::utils::cancel::CancelToken;
use pretty_assertions::assert_eq;

const SCREEN: &str = "\
0.99\t990/1000\t30\t0.0\tr1\n\
0.97\t970/1000\t29\t0.0\tr2\n\
0.96\t960/1000\t27\t0.0\tr3\n";

const TAXID_TABLE: &str = "r1\t562\nr2\t622\nr3\t561\n";

const PAF: &str = "\
q1\t2000\t0\t1800\t+\tr1\t5000\t0\t1800\t1782\t1800\t60\n\
q1\t2000\t100\t900\t+\tr2\t5000\t0\t800\t700\t800\t40\n\
q2\t1500\t0\t1200\t+\tr2\t5000\t0\t1200\t1150\t1200\t60\n\
q3\t1000\t0\t400\t+\tr3\t5000\t0\t400\t390\t400\t30\n";

fn queries() -> String {
    format!(
        ">q1\n{}\n>q2\n{}\n>q3\n{}\n",
        bases(2000),
        bases(1500),
        bases(1000)
    )
}

fn tools(paf: &str) -> PipelineTools {
    PipelineTools {
        sketcher: Box::new(MockSketcher {
            screen_tsv: SCREEN.to_string(),
        }),
        aligner: Box::new(MockAligner {
            paf: paf.to_string(),
        }),
        materialiser: Box::new(MockMaterialiser {
            taxid_table: TAXID_TABLE.to_string(),
        }),
    }
}

fn read_outputs(out: &std::path::Path) -> (Vec<u8>, Vec<u8>) {
    (
        std::fs::read(out.join("classified_sequences.tsv")).unwrap(),
        std::fs::read(out.join("profile.cami.tsv")).unwrap(),
    )
}

#[test]
fn identical_runs_share_the_cache_and_outputs() {
    let base = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(base.path(), &queries());

    let mut fingerprints = Vec::new();
    let mut outputs = Vec::new();
    for name in ["out1", "out2"] {
        let pipeline = Pipeline::new(
            fixture.config.clone(),
            RunMode::Contigs,
            tools(PAF),
            CancelToken::new(),
        );
        let out = base.path().join(name);
        let outcome = pipeline.run(&fixture.input, &out).unwrap();
        fingerprints.push(outcome.fingerprint);
        outputs.push(read_outputs(&out));
    }

    assert_eq!(fingerprints[0], fingerprints[1]);
    assert_eq!(outputs[0], outputs[1]);

    // Both runs resolved to the same ready entry
    let metadata: serde_json::Value = serde_json::from_slice(
        &std::fs::read(base.path().join("out2").join("metadata.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(
        metadata["selection_fingerprint"].as_str().unwrap(),
        fingerprints[0]
    );
    let entry = fixture.config.cache.root.join(&fingerprints[0]);
    assert!(entry.join("ready").exists());
    assert!(entry.join("cache.meta").exists());
}

#[test]
fn permuting_paf_within_groups_changes_nothing() {
    // q1's two records swapped; group order preserved
    let permuted = "\
q1\t2000\t100\t900\t+\tr2\t5000\t0\t800\t700\t800\t40\n\
q1\t2000\t0\t1800\t+\tr1\t5000\t0\t1800\t1782\t1800\t60\n\
q2\t1500\t0\t1200\t+\tr2\t5000\t0\t1200\t1150\t1200\t60\n\
q3\t1000\t0\t400\t+\tr3\t5000\t0\t400\t390\t400\t30\n";

    let mut outputs = Vec::new();
    for paf in [PAF, permuted] {
        let base = tempfile::tempdir().unwrap();
        let fixture = Fixture::new(base.path(), &queries());
        let pipeline = Pipeline::new(
            fixture.config,
            RunMode::Contigs,
            tools(paf),
            CancelToken::new(),
        );
        let out = base.path().join("out");
        pipeline.run(&fixture.input, &out).unwrap();
        outputs.push(read_outputs(&out));
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn deleting_the_alignment_index_triggers_rebuild_with_identical_outputs() {
    let base = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(base.path(), &queries());

    let run = |name: &str| {
        let pipeline = Pipeline::new(
            fixture.config.clone(),
            RunMode::Contigs,
            tools(PAF),
            CancelToken::new(),
        );
        let out = base.path().join(name);
        let outcome = pipeline.run(&fixture.input, &out).unwrap();
        (outcome, read_outputs(&out))
    };

    let (outcome1, outputs1) = run("out1");
    std::fs::remove_file(outcome1.cache_dir.join("alignment.index")).unwrap();

    let (outcome2, outputs2) = run("out2");
    assert_eq!(outcome1.fingerprint, outcome2.fingerprint);
    assert!(outcome2.cache_dir.join("alignment.index").exists());
    assert_eq!(outputs1, outputs2);
}

#[test]
fn profile_percentages_sum_to_one_hundred_per_rank() {
    let base = tempfile::tempdir().unwrap();
    let fixture = Fixture::new(base.path(), &queries());
    let pipeline = Pipeline::new(
        fixture.config,
        RunMode::Contigs,
        tools(PAF),
        CancelToken::new(),
    );
    let out = base.path().join("out");
    pipeline.run(&fixture.input, &out).unwrap();

    let profile = std::fs::read_to_string(out.join("profile.cami.tsv")).unwrap();
    let mut per_rank: std::collections::HashMap<&str, f64> = std::collections::HashMap::new();
    for line in profile.lines().filter(|l| !l.starts_with(['#', '@'])) {
        let fields: Vec<&str> = line.split('\t').collect();
        *per_rank.entry(fields[1]).or_insert(0.0) += fields[4].parse::<f64>().unwrap();
    }
    assert!(!per_rank.is_empty());
    for (rank, sum) in per_rank {
        assert!(
            (sum - 100.0).abs() < 1e-6,
            "rank {} sums to {}",
            rank,
            sum
        );
    }
}
