//! Species-richness report for the cached municipality lists.
//! Prints the richness table, summary statistics, a histogram and the
//! best-represented families; optionally writes the report as JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use avifauna_core::cache::{load_municipalities, load_taxonomy};
use avifauna_core::richness::render_table;
use avifauna_core::{richness_report, RichnessReport};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "richness", about = "Species richness per municipality")]
struct Args {
    /// Cached species lists (municipio_species_<state>.json).
    #[arg(long)]
    species: PathBuf,

    /// Cached taxonomy (taxonomy_<state>_<locale>.json).
    #[arg(long)]
    taxonomy: PathBuf,

    /// Also write the full report as JSON.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn stats_block(report: &RichnessReport) -> String {
    let s = &report.stats;
    let mut lines = vec![
        format!("Municipalities:        {}", s.municipalities),
        format!("Unique species:        {}", s.unique_species),
        format!("Without records:       {}", s.zero_species),
        format!("Mean species:          {:.1}", s.mean),
        format!("Median:                {}", s.median),
        format!("P25 / P75:             {} / {}", s.p25, s.p75),
        format!("Min / Max:             {} / {}", s.min, s.max),
        String::new(),
        "Histogram:".to_string(),
    ];
    let peak = report.histogram.iter().map(|b| b.municipalities).max().unwrap_or(0).max(1);
    for bin in &report.histogram {
        let bar = "#".repeat(bin.municipalities * 40 / peak);
        lines.push(format!("  {:>9} | {:<40} {}", bin.label(), bar, bin.municipalities));
    }
    lines.join("\n")
}

fn families_table(report: &RichnessReport) -> String {
    let rows: Vec<Vec<String>> = report
        .top_families
        .iter()
        .map(|f| vec![f.family.clone(), f.species.to_string()])
        .collect();
    render_table(&["Family", "Species"], &rows)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let taxonomy = load_taxonomy(&args.taxonomy)
        .with_context(|| format!("reading taxonomy {}", args.taxonomy.display()))?;
    let municipalities = load_municipalities(&args.species, &taxonomy)
        .with_context(|| format!("reading species lists {}", args.species.display()))?;

    let report = richness_report(&municipalities);
    println!("{}", report.table());
    println!();
    println!("{}", stats_block(&report));
    println!();
    println!("{}", families_table(&report));

    if let Some(path) = &args.output {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        eprintln!("Wrote {}", path.display());
    }
    Ok(())
}
