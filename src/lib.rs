// HYMET - Hybrid metagenomic classification via sketch screening and weighted LCA
// Global clippy configuration

#![warn(clippy::all)]
#![warn(clippy::correctness)]
#![warn(clippy::suspicious)]
#![warn(clippy::perf)]
#![warn(clippy::style)]

// Allow some pedantic lints that don't add value
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::float_cmp)]
#![allow(clippy::similar_names)]
#![allow(clippy::doc_markdown)]

// Style preferences
#![allow(clippy::enum_glob_use)]
#![allow(clippy::wildcard_imports)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::single_match_else)]
#![allow(clippy::redundant_field_names)]
#![allow(clippy::new_without_default)]

pub mod bio;
pub mod cli;
pub mod core;
pub mod pipeline;
pub mod report;
pub mod storage;
pub mod tools;
pub mod utils;

pub use crate::core::resolver::LcaResolver;
pub use crate::core::selection::CandidateSelector;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HymetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Missing input: {0}")]
    MissingInput(String),

    #[error("Taxonomy error: {0}")]
    Taxonomy(String),

    #[error("Reference registry error: {0}")]
    Registry(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Alignment stream error: {0}")]
    AlignmentStream(String),

    #[error("Empty candidate set: no reference passed the screening threshold")]
    EmptyCandidateSet,

    #[error("External tool error: {0}")]
    Tool(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl HymetError {
    /// Process exit code for this error class.
    pub fn exit_code(&self) -> i32 {
        match self {
            HymetError::Config(_) => 2,
            HymetError::Io(_) | HymetError::MissingInput(_) => 3,
            HymetError::Taxonomy(_) | HymetError::Registry(_) => 4,
            HymetError::Cache(_) => 5,
            HymetError::AlignmentStream(_) => 6,
            HymetError::EmptyCandidateSet => 7,
            HymetError::Cancelled => 130,
            HymetError::Tool(_) | HymetError::Other(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, HymetError>;
