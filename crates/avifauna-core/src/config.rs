use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, Result};
use crate::normalize::Weighting;
use crate::occurrence::TaxonLevel;
use crate::signature::{DEFAULT_MUNICIPALITY_SIGNATURE_SIZE, DEFAULT_SIGNATURE_SIZE};

/// What to do with a municipality whose vector cannot be normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegeneratePolicy {
    /// Leave it out of clustering and list it in the diagnostics.
    #[default]
    Exclude,
    /// Abort the run with `ClusterError::DegenerateVector`.
    Fail,
}

/// Options for one pipeline run.
/// Every field has a default, so a config file only needs the overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Taxonomic granularity used as the feature space.
    pub level: TaxonLevel,
    /// Number of clusters (k), 2..=valid municipalities.
    pub clusters: usize,
    pub max_iterations: usize,
    /// Top taxa kept per cluster signature.
    pub signature_size: usize,
    /// Top taxa listed per municipality row.
    pub municipality_signature_size: usize,
    /// Seeds the centroid sample.
    pub seed: u64,
    /// Municipalities with fewer counted records are left out of clustering.
    pub min_records: u64,
    pub weighting: Weighting,
    pub degenerate_policy: DegeneratePolicy,
    /// Wall-clock budget for the k-means loop, checked between iterations.
    pub time_budget_ms: Option<u64>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            level: TaxonLevel::Order,
            clusters: 5,
            max_iterations: 50,
            signature_size: DEFAULT_SIGNATURE_SIZE,
            municipality_signature_size: DEFAULT_MUNICIPALITY_SIGNATURE_SIZE,
            seed: 0,
            min_records: 0,
            weighting: Weighting::Raw,
            degenerate_policy: DegeneratePolicy::Exclude,
            time_budget_ms: None,
        }
    }
}

impl ClusterConfig {
    /// Read a JSON config file; absent fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ClusterError::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| ClusterError::json(path, e))
    }

    /// Checks that do not depend on the input data.
    /// The upper bound on `clusters` is checked once the valid municipalities are known.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(ClusterError::invalid_config("max_iterations must be at least 1"));
        }
        if self.signature_size == 0 {
            return Err(ClusterError::invalid_config("signature_size must be at least 1"));
        }
        if let Weighting::TfIdf { shrink } = self.weighting {
            if !shrink.is_finite() || shrink < 0.0 {
                return Err(ClusterError::invalid_config(format!(
                    "shrink must be a non-negative number, got {shrink}"
                )));
            }
        }
        Ok(())
    }
}
