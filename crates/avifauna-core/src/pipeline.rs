//! Pipeline orchestrator: aggregation → normalization → k-means → signatures.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::Serialize;

use crate::aggregate::{aggregate, TaxonCountTable};
use crate::config::{ClusterConfig, DegeneratePolicy};
use crate::error::{ClusterError, Result};
use crate::kmeans::{kmeans, Centroid, KMeansParams, Termination};
use crate::normalize::{normalize, FeatureTable};
use crate::occurrence::{Municipality, TaxonLevel};
use crate::signature::{cluster_signatures, ClusterSignature};

// ── Diagnostics ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExclusionReason {
    /// No countable taxa at the chosen level.
    Degenerate,
    /// Fewer counted records than `min_records`.
    BelowMinimum { total: u64, minimum: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    pub municipality: String,
    pub reason: ExclusionReason,
}

/// An empty cluster refilled mid-run, by municipality name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveredCluster {
    pub iteration: usize,
    pub cluster: usize,
    pub municipality: String,
    pub donor: usize,
}

/// Recoverable data-quality findings attached to every run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Records skipped per municipality for lacking the requested level.
    pub data_gaps: BTreeMap<String, usize>,
    pub excluded: Vec<Exclusion>,
    pub termination: Termination,
    pub iterations: usize,
    pub recovered_clusters: Vec<RecoveredCluster>,
}

impl Diagnostics {
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }

    pub fn total_gaps(&self) -> usize {
        self.data_gaps.values().sum()
    }

    pub fn degenerate(&self) -> impl Iterator<Item = &str> {
        self.excluded
            .iter()
            .filter(|e| e.reason == ExclusionReason::Degenerate)
            .map(|e| e.municipality.as_str())
    }

    pub fn exclusion(&self, municipality: &str) -> Option<&ExclusionReason> {
        self.excluded.iter().find(|e| e.municipality == municipality).map(|e| &e.reason)
    }
}

// ── Run output ────────────────────────────────────────────────────────────────

/// Identity fields carried through to the exporter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MunicipalityInfo {
    pub code: String,
    /// Distinct species recorded.
    pub richness: usize,
}

/// Everything one pipeline run produces.
#[derive(Debug, Clone)]
pub struct ClusterRun {
    pub config: ClusterConfig,
    pub municipalities: BTreeMap<String, MunicipalityInfo>,
    pub table: TaxonCountTable,
    pub features: FeatureTable,
    /// Clustered municipality → cluster index.
    pub assignment: BTreeMap<String, usize>,
    pub centroids: Vec<Centroid>,
    pub signatures: BTreeMap<usize, ClusterSignature>,
    pub diagnostics: Diagnostics,
}

impl ClusterRun {
    /// Members of one cluster in name order.
    pub fn members(&self, cluster: usize) -> Vec<&str> {
        self.assignment
            .iter()
            .filter(|(_, c)| **c == cluster)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

// ── Orchestrator ──────────────────────────────────────────────────────────────

pub struct ClusterPipeline {
    config: ClusterConfig,
}

impl ClusterPipeline {
    pub fn new(config: ClusterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Run the full pipeline.
    ///
    /// Order:
    ///   1. Aggregate records at the configured level
    ///   2. Normalize, applying the degenerate-vector policy
    ///   3. Drop municipalities below `min_records`
    ///   4. Cluster the remaining vectors
    ///   5. Build cluster signatures from raw counts
    pub fn run(&self, municipalities: &[Municipality]) -> Result<ClusterRun> {
        let cfg = &self.config;
        cfg.validate()?;
        if municipalities.is_empty() {
            return Err(ClusterError::EmptyInput);
        }

        // ── 1. Aggregation ──────────────────────────────────────────────────
        let table = aggregate(municipalities, cfg.level);

        // ── 2. Normalization ────────────────────────────────────────────────
        let features = normalize(&table, cfg.weighting);
        let mut excluded = Vec::new();
        for d in &features.degenerate {
            if cfg.degenerate_policy == DegeneratePolicy::Fail {
                return Err(ClusterError::DegenerateVector { municipality: d.municipality.clone() });
            }
            tracing::warn!(municipality = %d.municipality, "excluding municipality with no countable taxa");
            excluded.push(Exclusion {
                municipality: d.municipality.clone(),
                reason: ExclusionReason::Degenerate,
            });
        }

        // ── 3. Eligibility ──────────────────────────────────────────────────
        let mut names = Vec::with_capacity(features.vectors.len());
        let mut points = Vec::with_capacity(features.vectors.len());
        for (name, vector) in &features.vectors {
            let total = table.total(name);
            if total < cfg.min_records {
                excluded.push(Exclusion {
                    municipality: name.clone(),
                    reason: ExclusionReason::BelowMinimum { total, minimum: cfg.min_records },
                });
                continue;
            }
            names.push(name.clone());
            points.push(vector.clone());
        }
        excluded.sort_by(|a, b| a.municipality.cmp(&b.municipality));

        // Both bounds are reported against the municipalities left after exclusions.
        if cfg.clusters < 2 || cfg.clusters > points.len() {
            return Err(ClusterError::invalid_cluster_count(cfg.clusters, points.len()));
        }
        tracing::info!(
            level = %cfg.level,
            taxa = features.index.len(),
            eligible = points.len(),
            excluded = excluded.len(),
            "feature vectors ready"
        );

        // ── 4. Clustering ───────────────────────────────────────────────────
        let params = KMeansParams {
            k: cfg.clusters,
            max_iterations: cfg.max_iterations,
            seed: cfg.seed,
            time_budget: cfg.time_budget_ms.map(Duration::from_millis),
        };
        let result = kmeans(&points, &params)?;

        let assignment: BTreeMap<String, usize> =
            names.iter().cloned().zip(result.assignment.iter().copied()).collect();
        let recovered_clusters = result
            .reseeds
            .iter()
            .map(|r| RecoveredCluster {
                iteration: r.iteration,
                cluster: r.cluster,
                municipality: names[r.point].clone(),
                donor: r.donor,
            })
            .collect();

        // ── 5. Signatures ───────────────────────────────────────────────────
        let signatures = cluster_signatures(&assignment, &table, cfg.signature_size);

        let diagnostics = Diagnostics {
            data_gaps: table.gaps.clone(),
            excluded,
            termination: result.termination,
            iterations: result.iterations,
            recovered_clusters,
        };
        tracing::info!(
            clusters = cfg.clusters,
            iterations = diagnostics.iterations,
            converged = diagnostics.converged(),
            data_gaps = diagnostics.total_gaps(),
            "clustering complete"
        );

        Ok(ClusterRun {
            config: cfg.clone(),
            municipalities: collect_info(municipalities),
            table,
            features,
            assignment,
            centroids: result.centroids,
            signatures,
            diagnostics,
        })
    }
}

/// Name → (code, richness); same-name entries are merged like the aggregator does.
fn collect_info(municipalities: &[Municipality]) -> BTreeMap<String, MunicipalityInfo> {
    let mut species: BTreeMap<&str, (&str, BTreeSet<&str>)> = BTreeMap::new();
    for m in municipalities {
        let entry = species.entry(m.name.as_str()).or_insert_with(|| (m.code.as_str(), BTreeSet::new()));
        entry.1.extend(m.records.iter().filter_map(|r| r.key_at(TaxonLevel::Species)));
    }
    species
        .into_iter()
        .map(|(name, (code, set))| {
            (name.to_string(), MunicipalityInfo { code: code.to_string(), richness: set.len() })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Weighting;
    use crate::occurrence::OccurrenceRecord;

    fn muni(name: &str, orders: &[(&str, usize)]) -> Municipality {
        let mut records = Vec::new();
        for (order, n) in orders {
            for i in 0..*n {
                records.push(OccurrenceRecord::new(format!("{order}-{i}"), format!("{order}-fam"), *order));
            }
        }
        Municipality::new(name, format!("BR-RJ-{name}"), records)
    }

    fn config(k: usize) -> ClusterConfig {
        ClusterConfig { clusters: k, level: TaxonLevel::Order, ..Default::default() }
    }

    #[test]
    fn degenerate_municipalities_are_excluded_by_default() {
        let input = vec![muni("A", &[("o1", 10)]), muni("B", &[("o2", 10)]), muni("C", &[])];
        let run = ClusterPipeline::new(config(2)).run(&input).unwrap();
        assert_eq!(run.assignment.len(), 2);
        assert!(!run.assignment.contains_key("C"));
        assert_eq!(run.diagnostics.degenerate().collect::<Vec<_>>(), vec!["C"]);
        assert_ne!(run.assignment["A"], run.assignment["B"]);
    }

    #[test]
    fn fail_policy_aborts_on_degenerate_vectors() {
        let input = vec![muni("A", &[("o1", 1)]), muni("B", &[("o2", 1)]), muni("C", &[])];
        let cfg = ClusterConfig { degenerate_policy: DegeneratePolicy::Fail, ..config(2) };
        let err = ClusterPipeline::new(cfg).run(&input).unwrap_err();
        assert!(matches!(err, ClusterError::DegenerateVector { ref municipality } if municipality == "C"));
    }

    #[test]
    fn min_records_excludes_sparse_municipalities() {
        let input = vec![
            muni("A", &[("o1", 40)]),
            muni("B", &[("o2", 35)]),
            muni("C", &[("o1", 31), ("o2", 2)]),
            muni("D", &[("o2", 3)]),
        ];
        let cfg = ClusterConfig { min_records: 30, ..config(2) };
        let run = ClusterPipeline::new(cfg).run(&input).unwrap();
        assert!(!run.assignment.contains_key("D"));
        assert_eq!(
            run.diagnostics.exclusion("D"),
            Some(&ExclusionReason::BelowMinimum { total: 3, minimum: 30 })
        );
        assert_eq!(run.assignment["A"], run.assignment["C"]);
    }

    #[test]
    fn cluster_count_is_checked_against_valid_municipalities() {
        let input = vec![muni("A", &[("o1", 1)]), muni("B", &[("o2", 1)]), muni("C", &[])];
        let err = ClusterPipeline::new(config(3)).run(&input).unwrap_err();
        assert!(matches!(err, ClusterError::InvalidClusterCount { requested: 3, valid: 2 }));

        let err = ClusterPipeline::new(config(0)).run(&input).unwrap_err();
        assert!(matches!(err, ClusterError::InvalidClusterCount { requested: 0, valid: 2 }));

        let err = ClusterPipeline::new(config(1)).run(&input).unwrap_err();
        assert_eq!(err.to_string(), "invalid cluster count: requested 1, valid range is 2..=2");

        assert!(matches!(ClusterPipeline::new(config(2)).run(&[]), Err(ClusterError::EmptyInput)));
    }

    #[test]
    fn data_gaps_surface_in_diagnostics() {
        let mut a = muni("A", &[("o1", 4)]);
        a.records.push(OccurrenceRecord { species_key: Some("x".into()), family_key: None, order_key: None });
        let input = vec![a, muni("B", &[("o2", 4)])];
        let run = ClusterPipeline::new(config(2)).run(&input).unwrap();
        assert_eq!(run.diagnostics.data_gaps.get("A"), Some(&1));
        assert_eq!(run.municipalities["A"].richness, 5);
    }

    #[test]
    fn tfidf_weighting_still_partitions_everything() {
        let input = vec![
            muni("A", &[("o1", 10), ("o3", 1)]),
            muni("B", &[("o2", 10), ("o3", 1)]),
            muni("C", &[("o1", 8), ("o3", 2)]),
            muni("D", &[("o2", 9)]),
        ];
        let cfg = ClusterConfig { weighting: Weighting::TfIdf { shrink: 2.0 }, ..config(2) };
        let run = ClusterPipeline::new(cfg).run(&input).unwrap();
        assert_eq!(run.assignment.len(), 4);
        assert_eq!(run.assignment["A"], run.assignment["C"]);
        assert_eq!(run.assignment["B"], run.assignment["D"]);
    }

    #[test]
    fn members_are_listed_in_name_order() {
        let input = vec![
            muni("Zeta", &[("o1", 5)]),
            muni("Alfa", &[("o1", 3)]),
            muni("Beta", &[("o2", 4)]),
        ];
        let run = ClusterPipeline::new(config(2)).run(&input).unwrap();
        let c = run.assignment["Zeta"];
        assert_eq!(run.members(c), vec!["Alfa", "Zeta"]);
    }

    #[test]
    fn recovered_clusters_name_the_moved_municipality() {
        let input = vec![
            muni("A", &[("o1", 3), ("o2", 1)]),
            muni("B", &[("o1", 3), ("o2", 1)]),
            muni("C", &[("o1", 3), ("o2", 1)]),
        ];
        let run = ClusterPipeline::new(config(2)).run(&input).unwrap();
        assert!(run.diagnostics.converged());
        assert_eq!(
            run.diagnostics.recovered_clusters,
            vec![RecoveredCluster { iteration: 1, cluster: 1, municipality: "A".into(), donor: 0 }]
        );
        assert_eq!(run.assignment["A"], 1);
        assert_eq!(run.members(0), vec!["B", "C"]);
    }

    #[test]
    fn iteration_cap_is_reported_in_diagnostics() {
        let input = vec![muni("A", &[("o1", 5)]), muni("B", &[("o2", 5)]), muni("C", &[("o1", 2), ("o2", 3)])];
        let cfg = ClusterConfig { max_iterations: 1, ..config(2) };
        let run = ClusterPipeline::new(cfg).run(&input).unwrap();
        assert!(!run.diagnostics.converged());
        assert_eq!(run.diagnostics.termination, Termination::IterationCap);
        assert_eq!(run.diagnostics.iterations, 1);
        assert_eq!(run.assignment.len(), 3);
    }

    #[test]
    fn exhausted_time_budget_is_reported_in_diagnostics() {
        let input = vec![muni("A", &[("o1", 5)]), muni("B", &[("o2", 5)]), muni("C", &[("o1", 2), ("o2", 3)])];
        let cfg = ClusterConfig { time_budget_ms: Some(0), ..config(2) };
        let run = ClusterPipeline::new(cfg).run(&input).unwrap();
        assert_eq!(run.diagnostics.termination, Termination::TimedOut);
        assert_eq!(run.diagnostics.iterations, 1);
        assert_eq!(run.assignment.len(), 3);
    }
}
