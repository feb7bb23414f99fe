//! Error types for the aggregation and clustering pipeline.
//!
//! Only structural problems are errors. Data-quality issues (taxonomic gaps,
//! degenerate vectors under the default policy, reseeded clusters) are
//! recovered and reported through `pipeline::Diagnostics` instead.

use thiserror::Error;

/// Fatal errors surfaced before or during a pipeline run.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// No municipalities were supplied at all.
    #[error("empty input: no municipalities to cluster")]
    EmptyInput,

    /// k is outside `[2, valid]`.
    #[error("invalid cluster count: requested {requested}, valid range is 2..={valid}")]
    InvalidClusterCount {
        requested: usize,
        /// Number of municipalities with a usable vector.
        valid: usize,
    },

    /// A municipality had zero total counts and the run was configured to fail on it.
    #[error("degenerate vector: municipality {municipality:?} has no countable taxa")]
    DegenerateVector { municipality: String },

    /// Feature vectors of differing lengths were passed to the engine.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("unknown taxonomic level {0:?} (expected order, family or species)")]
    UnknownLevel(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ClusterError {
    pub fn invalid_cluster_count(requested: usize, valid: usize) -> Self {
        Self::InvalidClusterCount { requested, valid }
    }

    pub fn dimension_mismatch(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig { message: message.into() }
    }

    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io { path: path.as_ref().display().to_string(), source }
    }

    pub fn json(path: impl AsRef<std::path::Path>, source: serde_json::Error) -> Self {
        Self::Json { path: path.as_ref().display().to_string(), source }
    }
}

pub type Result<T> = std::result::Result<T, ClusterError>;
