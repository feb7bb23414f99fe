//! Cluster signatures: the dominant taxa of each cluster by summed raw count.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::aggregate::{TaxonCountTable, TaxonCounts};

/// Default number of taxa kept per cluster signature.
pub const DEFAULT_SIGNATURE_SIZE: usize = 5;
/// Default number of taxa shown per municipality row.
pub const DEFAULT_MUNICIPALITY_SIGNATURE_SIZE: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureEntry {
    pub taxon: String,
    pub weight: u64,
}

/// Descending by weight, ties by taxon name.
pub type ClusterSignature = Vec<SignatureEntry>;

/// Top-`n` taxa of a summed count map. Zero weights are never listed.
pub fn top_taxa(counts: &TaxonCounts, n: usize) -> ClusterSignature {
    let mut entries: Vec<SignatureEntry> = counts
        .iter()
        .filter(|(_, w)| **w > 0)
        .map(|(taxon, &weight)| SignatureEntry { taxon: taxon.clone(), weight })
        .collect();
    entries.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.taxon.cmp(&b.taxon)));
    entries.truncate(n);
    entries
}

/// One signature per cluster index present in `assignment`.
///
/// `assignment` maps municipality name → cluster index; municipalities not in
/// `table` contribute nothing.
pub fn cluster_signatures(
    assignment: &BTreeMap<String, usize>,
    table: &TaxonCountTable,
    n: usize,
) -> BTreeMap<usize, ClusterSignature> {
    let mut summed: BTreeMap<usize, TaxonCounts> = BTreeMap::new();
    for (name, &cluster) in assignment {
        let acc = summed.entry(cluster).or_default();
        if let Some(counts) = table.rows.get(name) {
            for (taxon, &c) in counts {
                *acc.entry(taxon.clone()).or_insert(0) += c;
            }
        }
    }
    summed.into_iter().map(|(cluster, counts)| (cluster, top_taxa(&counts, n))).collect()
}

/// A single municipality's own top taxa.
pub fn municipality_signature(table: &TaxonCountTable, municipality: &str, n: usize) -> ClusterSignature {
    table.rows.get(municipality).map_or_else(Vec::new, |c| top_taxa(c, n))
}
