//! Result export: the per-municipality assignment table and the cluster summary.
//!
//! Both outputs are ordered purely by municipality name and cluster index, so
//! identical runs serialize to identical bytes.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{ClusterError, Result};
use crate::kmeans::Centroid;
use crate::occurrence::TaxonLevel;
use crate::pipeline::{ClusterRun, Diagnostics, ExclusionReason};
use crate::signature::{municipality_signature, ClusterSignature};

/// Placeholder written in the cluster column for unclustered municipalities.
pub const UNASSIGNED: &str = "NA";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignmentRow {
    pub municipality: String,
    pub code: String,
    pub cluster: Option<usize>,
    pub richness: usize,
    /// The municipality's own top taxa.
    pub signature: Vec<String>,
    pub excluded: Option<ExclusionReason>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterSummary {
    pub size: usize,
    pub municipalities: Vec<String>,
    pub signature: ClusterSignature,
    /// Unit-length centroid, one weight per entry of `ClusterReport::taxa`.
    pub centroid: Vec<f64>,
}

/// Presentation-ready view of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterReport {
    pub level: TaxonLevel,
    pub k: usize,
    pub seed: u64,
    /// Feature axes in vector order.
    pub taxa: Vec<String>,
    /// Sorted by municipality name.
    pub rows: Vec<AssignmentRow>,
    pub clusters: BTreeMap<usize, ClusterSummary>,
    pub diagnostics: Diagnostics,
}

impl ClusterReport {
    pub fn from_run(run: &ClusterRun) -> Self {
        let rows = run
            .municipalities
            .iter()
            .map(|(name, info)| {
                let cluster = run.assignment.get(name).copied();
                let signature = if cluster.is_some() {
                    municipality_signature(&run.table, name, run.config.municipality_signature_size)
                        .into_iter()
                        .map(|e| e.taxon)
                        .collect()
                } else {
                    Vec::new()
                };
                AssignmentRow {
                    municipality: name.clone(),
                    code: info.code.clone(),
                    cluster,
                    richness: info.richness,
                    signature,
                    excluded: run.diagnostics.exclusion(name).copied(),
                }
            })
            .collect();

        let clusters = run
            .signatures
            .iter()
            .map(|(&cluster, signature)| {
                let municipalities: Vec<String> =
                    run.members(cluster).into_iter().map(str::to_string).collect();
                let summary = ClusterSummary {
                    size: municipalities.len(),
                    municipalities,
                    signature: signature.clone(),
                    centroid: run.centroids.get(cluster).map(Centroid::unit).unwrap_or_default(),
                };
                (cluster, summary)
            })
            .collect();

        Self {
            level: run.config.level,
            k: run.config.clusters,
            seed: run.config.seed,
            taxa: run.features.index.keys().to_vec(),
            rows,
            clusters,
            diagnostics: run.diagnostics.clone(),
        }
    }

    /// `;`-delimited table: municipality;code;cluster;richness;signature
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().delimiter(b';').from_writer(writer);
        wtr.write_record(["municipality", "code", "cluster", "richness", "signature"])?;
        for row in &self.rows {
            let cluster = row.cluster.map_or_else(|| UNASSIGNED.to_string(), |c| c.to_string());
            wtr.write_record([
                row.municipality.as_str(),
                row.code.as_str(),
                cluster.as_str(),
                row.richness.to_string().as_str(),
                row.signature.join(",").as_str(),
            ])?;
        }
        wtr.flush().map_err(|e| ClusterError::Csv(e.into()))?;
        Ok(())
    }

    pub fn to_csv_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Pretty JSON summary: clusters keyed by index plus run diagnostics.
    pub fn summary_json(&self) -> Result<String> {
        #[derive(Serialize)]
        struct Summary<'a> {
            level: TaxonLevel,
            k: usize,
            seed: u64,
            taxa: &'a [String],
            clusters: &'a BTreeMap<usize, ClusterSummary>,
            diagnostics: &'a Diagnostics,
        }
        let doc = Summary {
            level: self.level,
            k: self.k,
            seed: self.seed,
            taxa: &self.taxa,
            clusters: &self.clusters,
            diagnostics: &self.diagnostics,
        };
        serde_json::to_string_pretty(&doc).map_err(|e| ClusterError::json("<summary>", e))
    }

    /// Write the CSV to `csv_path` and the summary beside it as `<stem>_summary.json`.
    /// Returns the summary path.
    pub fn write_files(&self, csv_path: &Path) -> Result<PathBuf> {
        if let Some(dir) = csv_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| ClusterError::io(dir, e))?;
        }
        let file = std::fs::File::create(csv_path).map_err(|e| ClusterError::io(csv_path, e))?;
        self.write_csv(file)?;

        let summary_path = summary_path_for(csv_path);
        std::fs::write(&summary_path, self.summary_json()?)
            .map_err(|e| ClusterError::io(&summary_path, e))?;
        Ok(summary_path)
    }
}

pub fn summary_path_for(csv_path: &Path) -> PathBuf {
    let stem = csv_path.file_stem().and_then(|s| s.to_str()).unwrap_or("clusters");
    csv_path.with_file_name(format!("{stem}_summary.json"))
}
