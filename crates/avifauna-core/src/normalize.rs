//! Vector normalization: taxon counts → unit-length feature vectors.
//!
//! The global taxon ordering is computed once per table (`TaxonIndex`) and
//! shared by every vector, so dimensions always line up. Rows with no counts
//! cannot be scaled to unit length; they come back as `DegenerateVector`
//! instead of a NaN vector and the caller picks the policy.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::{TaxonCountTable, TaxonCounts};

/// Default shrinkage strength toward the global composition.
pub const DEFAULT_SHRINK: f64 = 20.0;

fn default_shrink() -> f64 {
    DEFAULT_SHRINK
}

/// Sorted, de-duplicated taxon-keys defining vector dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TaxonIndex {
    keys: Vec<String>,
}

impl TaxonIndex {
    pub fn from_table(table: &TaxonCountTable) -> Self {
        Self { keys: table.taxon_keys() }
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.keys.binary_search_by(|k| k.as_str().cmp(key)).ok()
    }

    /// Raw count vector over this ordering. Keys not in the index are ignored.
    pub fn dense(&self, counts: &TaxonCounts) -> Vec<f64> {
        let mut v = vec![0.0; self.keys.len()];
        for (key, &n) in counts {
            if let Some(i) = self.position(key) {
                v[i] = n as f64;
            }
        }
        v
    }
}

/// Per-taxon weighting applied before L2 scaling.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Weighting {
    /// Plain counts. Scale-invariant after normalization.
    #[default]
    Raw,
    /// Term frequency shrunk toward the global composition, times smoothed IDF.
    TfIdf {
        #[serde(default = "default_shrink")]
        shrink: f64,
    },
}

/// A municipality whose counts are all zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DegenerateVector {
    pub municipality: String,
}

/// Normalized vectors for every non-degenerate municipality.
#[derive(Debug, Clone, Default)]
pub struct FeatureTable {
    pub index: TaxonIndex,
    pub vectors: BTreeMap<String, Vec<f64>>,
    /// Municipalities that could not be normalized, in name order.
    pub degenerate: Vec<DegenerateVector>,
}

/// Scale `v` to unit L2 norm. `None` when the norm is zero or not finite.
pub fn unit_vector(v: &[f64]) -> Option<Vec<f64>> {
    let norm = l2_norm(v);
    if norm <= 0.0 || !norm.is_finite() {
        return None;
    }
    Some(v.iter().map(|x| x / norm).collect())
}

pub fn l2_norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

/// Normalize one municipality's counts over `index` with raw weighting.
pub fn normalize_row(
    municipality: &str,
    counts: &TaxonCounts,
    index: &TaxonIndex,
) -> Result<Vec<f64>, DegenerateVector> {
    unit_vector(&index.dense(counts))
        .ok_or_else(|| DegenerateVector { municipality: municipality.to_string() })
}

/// Normalize every row of `table`.
pub fn normalize(table: &TaxonCountTable, weighting: Weighting) -> FeatureTable {
    let index = TaxonIndex::from_table(table);
    let names: Vec<&String> = table.rows.keys().collect();
    let raw: Vec<Vec<f64>> = table.rows.values().map(|c| index.dense(c)).collect();

    let weighted = match weighting {
        Weighting::Raw => raw,
        Weighting::TfIdf { shrink } => tfidf_shrink(&raw, shrink),
    };

    let mut out = FeatureTable { index, ..Default::default() };
    for (name, row) in names.into_iter().zip(weighted) {
        match unit_vector(&row) {
            Some(v) => {
                out.vectors.insert(name.clone(), v);
            }
            None => {
                tracing::debug!(municipality = %name, "degenerate vector: no countable taxa");
                out.degenerate.push(DegenerateVector { municipality: name.clone() });
            }
        }
    }
    out
}

// ── TF-IDF with shrinkage ─────────────────────────────────────────────────────

/// Column totals divided by the grand total (all zeros when the table is empty).
fn global_distribution(rows: &[Vec<f64>]) -> Vec<f64> {
    let dim = rows.first().map_or(0, Vec::len);
    let mut totals = vec![0.0; dim];
    for row in rows {
        for (t, v) in totals.iter_mut().zip(row) {
            *t += v;
        }
    }
    let grand: f64 = totals.iter().sum();
    if grand <= 0.0 {
        return vec![0.0; dim];
    }
    totals.iter().map(|t| t / grand).collect()
}

/// Smoothed inverse document frequency: ln((1 + n) / (1 + df)) + 1.
fn inverse_document_frequency(rows: &[Vec<f64>]) -> Vec<f64> {
    let dim = rows.first().map_or(0, Vec::len);
    let n = rows.len() as f64;
    (0..dim)
        .map(|j| {
            let df = rows.iter().filter(|r| r[j] > 0.0).count() as f64;
            ((1.0 + n) / (1.0 + df)).ln() + 1.0
        })
        .collect()
}

/// Rows with a zero total stay all-zero so they are still flagged as degenerate.
fn tfidf_shrink(rows: &[Vec<f64>], shrink: f64) -> Vec<Vec<f64>> {
    let global = global_distribution(rows);
    let idf = inverse_document_frequency(rows);
    rows.iter()
        .map(|row| {
            let total: f64 = row.iter().sum();
            if total <= 0.0 {
                return vec![0.0; row.len()];
            }
            let weight = if shrink > 0.0 { total / (total + shrink) } else { 1.0 };
            row.iter()
                .zip(&global)
                .zip(&idf)
                .map(|((&v, &g), &w_idf)| (weight * v / total + (1.0 - weight) * g) * w_idf)
                .collect()
        })
        .collect()
}
