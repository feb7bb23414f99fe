//! Cluster municipalities by the taxonomic composition of their bird lists.
//! Reads the cached species/taxonomy JSON, runs the pipeline and writes
//! `<output>.csv` plus `<output stem>_summary.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use avifauna_core::cache::{load_municipalities, load_taxonomy};
use avifauna_core::richness::render_table;
use avifauna_core::{ClusterConfig, ClusterPipeline, ClusterReport, DegeneratePolicy, TaxonLevel, Weighting};
use clap::Parser;
use tracing_subscriber::EnvFilter;

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "cluster", about = "Cluster municipalities by taxonomic composition")]
struct Args {
    /// Cached species lists (municipio_species_<state>.json).
    #[arg(long)]
    species: PathBuf,

    /// Cached taxonomy (taxonomy_<state>_<locale>.json).
    #[arg(long)]
    taxonomy: PathBuf,

    /// JSON config file; flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Taxonomic level: order, family or species.
    #[arg(short, long)]
    level: Option<String>,

    /// Number of clusters (k).
    #[arg(short = 'k', long)]
    clusters: Option<usize>,

    #[arg(long)]
    max_iterations: Option<usize>,

    /// Top taxa per cluster signature.
    #[arg(long)]
    signature_size: Option<usize>,

    #[arg(short, long)]
    seed: Option<u64>,

    /// Leave out municipalities with fewer counted records.
    #[arg(long)]
    min_records: Option<u64>,

    /// Switch to TF-IDF weighting with this shrinkage constant.
    #[arg(long)]
    shrink: Option<f64>,

    /// Abort instead of excluding municipalities with no countable taxa.
    #[arg(long)]
    fail_on_degenerate: bool,

    /// Wall-clock budget for the k-means loop, in milliseconds.
    #[arg(long)]
    time_budget_ms: Option<u64>,

    /// Output CSV path.
    #[arg(short, long, default_value = "outputs/municipio_clusters.csv")]
    output: PathBuf,
}

// ── Config merge ──────────────────────────────────────────────────────────────

fn build_config(args: &Args) -> Result<ClusterConfig> {
    let mut cfg = match &args.config {
        Some(path) => ClusterConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ClusterConfig::default(),
    };
    if let Some(level) = &args.level {
        cfg.level = level.parse::<TaxonLevel>()?;
    }
    if let Some(k) = args.clusters {
        cfg.clusters = k;
    }
    if let Some(n) = args.max_iterations {
        cfg.max_iterations = n;
    }
    if let Some(n) = args.signature_size {
        cfg.signature_size = n;
    }
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }
    if let Some(min) = args.min_records {
        cfg.min_records = min;
    }
    if let Some(shrink) = args.shrink {
        cfg.weighting = Weighting::TfIdf { shrink };
    }
    if args.fail_on_degenerate {
        cfg.degenerate_policy = DegeneratePolicy::Fail;
    }
    if args.time_budget_ms.is_some() {
        cfg.time_budget_ms = args.time_budget_ms;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn cluster_table(report: &ClusterReport) -> String {
    let rows: Vec<Vec<String>> = report
        .clusters
        .iter()
        .map(|(idx, c)| {
            let top = c
                .signature
                .iter()
                .map(|e| format!("{} ({})", e.taxon, e.weight))
                .collect::<Vec<_>>()
                .join(", ");
            vec![idx.to_string(), c.size.to_string(), top]
        })
        .collect();
    render_table(&["Cluster", "Size", "Signature"], &rows)
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cfg = build_config(&args)?;

    eprintln!("Loading taxonomy from {} ...", args.taxonomy.display());
    let taxonomy = load_taxonomy(&args.taxonomy)
        .with_context(|| format!("reading taxonomy {}", args.taxonomy.display()))?;
    let municipalities = load_municipalities(&args.species, &taxonomy)
        .with_context(|| format!("reading species lists {}", args.species.display()))?;

    eprintln!(
        "Clustering {} municipalities at {} level (k={}, seed={}) ...",
        municipalities.len(),
        cfg.level,
        cfg.clusters,
        cfg.seed
    );
    let run = ClusterPipeline::new(cfg).run(&municipalities).context("clustering failed")?;
    let report = ClusterReport::from_run(&run);

    let diag = &report.diagnostics;
    if !diag.converged() {
        eprintln!("Warning: stopped after {} iterations without converging ({:?}).", diag.iterations, diag.termination);
    }
    if !diag.excluded.is_empty() {
        eprintln!("{} municipalities left out of clustering.", diag.excluded.len());
    }
    if diag.total_gaps() > 0 {
        eprintln!("{} records had no {} and were skipped.", diag.total_gaps(), report.level);
    }
    for r in &diag.recovered_clusters {
        eprintln!(
            "Cluster {} was empty at iteration {}; reseeded with {} from cluster {}.",
            r.cluster, r.iteration, r.municipality, r.donor
        );
    }

    println!("{}", cluster_table(&report));

    let summary = report
        .write_files(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    eprintln!("Wrote {} and {}", args.output.display(), summary.display());
    Ok(())
}
