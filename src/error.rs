//! Error types shared by the analyzer and its configuration layer.

use std::path::PathBuf;

use thiserror::Error;

/// Problems found while loading or validating an [`AnalyzerConfig`](crate::config::AnalyzerConfig).
///
/// These fail fast: an analyzer is never constructed from an invalid configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be at least 1 (got {value})")]
    InvalidThreshold { name: &'static str, value: u32 },
    #[error("statement window must be at least 1 (got {0})")]
    InvalidWindow(usize),
    #[error("{table} contains an empty entry")]
    EmptyEntry { table: &'static str },
    #[error("{table} lists '{entry}' more than once")]
    DuplicateEntry { table: &'static str, entry: String },
    #[error("{table} does not form a valid pattern: {source}")]
    Pattern {
        table: &'static str,
        #[source]
        source: regex::Error,
    },
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// File-level failures. The orchestrator turns these into structural issues
/// instead of aborting a batch.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse source: {0}")]
    Parse(String),
}
