//! Occurrence aggregation: raw records → per-municipality taxon counts.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::occurrence::{Municipality, TaxonLevel};

/// Taxon-key → count for one municipality.
pub type TaxonCounts = BTreeMap<String, u64>;

/// Per-municipality taxon counts at one resolution level.
///
/// Every input municipality has an entry, possibly empty. Taxa absent from a
/// municipality's map implicitly count zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaxonCountTable {
    pub level: TaxonLevel,
    pub rows: BTreeMap<String, TaxonCounts>,
    /// Records skipped per municipality because the level was missing.
    pub gaps: BTreeMap<String, usize>,
}

impl TaxonCountTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of all counts for one municipality (0 if unknown).
    pub fn total(&self, municipality: &str) -> u64 {
        self.rows.get(municipality).map_or(0, |c| c.values().sum())
    }

    pub fn total_gaps(&self) -> usize {
        self.gaps.values().sum()
    }

    /// Sorted union of taxon-keys across all rows.
    pub fn taxon_keys(&self) -> Vec<String> {
        let keys: BTreeSet<&String> = self.rows.values().flat_map(|c| c.keys()).collect();
        keys.into_iter().cloned().collect()
    }
}

/// Build the count table for `level`.
///
/// Records missing a value at `level` are dropped and tallied in `gaps`.
/// Municipalities sharing a name are merged.
pub fn aggregate(municipalities: &[Municipality], level: TaxonLevel) -> TaxonCountTable {
    let mut table = TaxonCountTable { level, ..Default::default() };

    for muni in municipalities {
        let row = table.rows.entry(muni.name.clone()).or_default();
        let mut skipped = 0usize;
        for rec in &muni.records {
            match rec.key_at(level) {
                Some(key) => *row.entry(key.to_string()).or_insert(0) += 1,
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            *table.gaps.entry(muni.name.clone()).or_insert(0) += skipped;
        }
    }

    tracing::debug!(
        level = %level,
        municipalities = table.rows.len(),
        gaps = table.total_gaps(),
        "aggregated occurrence records"
    );
    table
}
