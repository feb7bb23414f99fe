//! Occurrence records and the taxonomic levels they can be keyed by.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ClusterError;

/// Hierarchy depth used to key aggregation counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxonLevel {
    #[default]
    Order,
    Family,
    Species,
}

impl TaxonLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            TaxonLevel::Order => "order",
            TaxonLevel::Family => "family",
            TaxonLevel::Species => "species",
        }
    }
}

impl fmt::Display for TaxonLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaxonLevel {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "order" => Ok(TaxonLevel::Order),
            "family" => Ok(TaxonLevel::Family),
            "species" => Ok(TaxonLevel::Species),
            _ => Err(ClusterError::UnknownLevel(s.to_string())),
        }
    }
}

/// One observation of a species at a municipality.
///
/// Any level of the path may be absent; an empty string is treated as absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OccurrenceRecord {
    pub species_key: Option<String>,
    pub family_key: Option<String>,
    pub order_key: Option<String>,
}

impl OccurrenceRecord {
    pub fn new(
        species_key: impl Into<String>,
        family_key: impl Into<String>,
        order_key: impl Into<String>,
    ) -> Self {
        Self {
            species_key: Some(species_key.into()),
            family_key: Some(family_key.into()),
            order_key: Some(order_key.into()),
        }
    }

    /// The taxonomic path truncated at `level`, or `None` when that level is missing.
    pub fn key_at(&self, level: TaxonLevel) -> Option<&str> {
        let key = match level {
            TaxonLevel::Order => self.order_key.as_deref(),
            TaxonLevel::Family => self.family_key.as_deref(),
            TaxonLevel::Species => self.species_key.as_deref(),
        };
        key.map(str::trim).filter(|k| !k.is_empty())
    }
}

/// A municipality and the occurrence records observed there. Never mutated by the pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Municipality {
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub records: Vec<OccurrenceRecord>,
}

impl Municipality {
    pub fn new(name: impl Into<String>, code: impl Into<String>, records: Vec<OccurrenceRecord>) -> Self {
        Self { name: name.into(), code: code.into(), records }
    }
}
