//! Reader for the on-disk JSON cache left by the data-fetch client.
//!
//! Species file: `[{ "name": "...", "code": "BR-RJ-...", "species": ["code", ...] }]`
//! Taxonomy file: `[{ "speciesCode", "sciName", "comName", "order",
//!                    "familySciName", "familyComName", "category" }]`
//! Only the code, order and family fields are read. Family is
//! `familySciName`, falling back to `familyComName`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ClusterError, Result};
use crate::occurrence::{Municipality, OccurrenceRecord};

#[derive(Debug, Clone, Deserialize)]
pub struct CachedMunicipality {
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub species: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TaxonomyEntry {
    species_code: Option<String>,
    order: Option<String>,
    family_sci_name: Option<String>,
    family_com_name: Option<String>,
}

/// Order and family of one species code.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaxonInfo {
    pub order: Option<String>,
    pub family: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    by_code: BTreeMap<String, TaxonInfo>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

impl Taxonomy {
    pub fn get(&self, species_code: &str) -> Option<&TaxonInfo> {
        self.by_code.get(species_code)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    fn from_entries(entries: Vec<TaxonomyEntry>) -> Self {
        let by_code = entries
            .into_iter()
            .filter_map(|e| {
                let code = non_empty(e.species_code)?;
                let info = TaxonInfo {
                    order: non_empty(e.order),
                    family: non_empty(e.family_sci_name).or_else(|| non_empty(e.family_com_name)),
                };
                Some((code, info))
            })
            .collect();
        Self { by_code }
    }

    /// A record for `species_code`; unknown codes keep only the species level.
    pub fn record(&self, species_code: &str) -> OccurrenceRecord {
        let info = self.get(species_code);
        OccurrenceRecord {
            species_key: Some(species_code.to_string()),
            family_key: info.and_then(|i| i.family.clone()),
            order_key: info.and_then(|i| i.order.clone()),
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|e| ClusterError::io(path, e))?;
    serde_json::from_str(&text).map_err(|e| ClusterError::json(path, e))
}

pub fn load_taxonomy(path: impl AsRef<Path>) -> Result<Taxonomy> {
    let entries: Vec<TaxonomyEntry> = read_json(path.as_ref())?;
    Ok(Taxonomy::from_entries(entries))
}

/// Join cached species lists with the taxonomy.
pub fn build_municipalities(cached: Vec<CachedMunicipality>, taxonomy: &Taxonomy) -> Vec<Municipality> {
    cached
        .into_iter()
        .map(|c| {
            let records = c.species.iter().map(|code| taxonomy.record(code)).collect();
            Municipality { name: c.name, code: c.code, records }
        })
        .collect()
}

pub fn load_municipalities(species_path: impl AsRef<Path>, taxonomy: &Taxonomy) -> Result<Vec<Municipality>> {
    let path = species_path.as_ref();
    let cached: Vec<CachedMunicipality> = read_json(path)?;
    let municipalities = build_municipalities(cached, taxonomy);
    tracing::info!(
        path = %path.display(),
        municipalities = municipalities.len(),
        taxonomy = taxonomy.len(),
        "loaded cached species lists"
    );
    Ok(municipalities)
}
