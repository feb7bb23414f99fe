//! Taxonomic composition clustering of municipalities from bird occurrence lists.
//!
//! Records are counted per municipality at one taxonomic level, turned into
//! unit vectors, grouped with a seeded cosine k-means and summarized by the
//! dominant taxa of each group.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod export;
pub mod kmeans;
pub mod normalize;
pub mod occurrence;
pub mod pipeline;
pub mod richness;
pub mod signature;

pub use aggregate::{aggregate, TaxonCountTable, TaxonCounts};
pub use config::{ClusterConfig, DegeneratePolicy};
pub use error::{ClusterError, Result};
pub use export::ClusterReport;
pub use kmeans::{kmeans, KMeansParams, KMeansResult, Termination};
pub use normalize::{normalize, FeatureTable, Weighting};
pub use occurrence::{Municipality, OccurrenceRecord, TaxonLevel};
pub use pipeline::{ClusterPipeline, ClusterRun, Diagnostics, ExclusionReason};
pub use richness::{richness_report, RichnessReport};
pub use signature::{cluster_signatures, ClusterSignature, SignatureEntry};
