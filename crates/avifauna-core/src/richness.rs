//! Species-richness report: per-municipality richness, summary statistics,
//! a richness histogram and the best-represented families.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::occurrence::{Municipality, TaxonLevel};

/// Families listed in the report.
pub const TOP_FAMILIES: usize = 15;
/// Family label for records without one.
pub const UNKNOWN_FAMILY: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RichnessRow {
    pub municipality: String,
    pub code: String,
    pub species: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RichnessStats {
    pub municipalities: usize,
    /// Distinct species across all municipalities.
    pub unique_species: usize,
    pub zero_species: usize,
    /// Rounded to one decimal.
    pub mean: f64,
    pub median: usize,
    pub p25: usize,
    pub p75: usize,
    pub max: usize,
    pub min: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistogramBin {
    pub lo: usize,
    pub hi: usize,
    pub municipalities: usize,
}

impl HistogramBin {
    pub fn label(&self) -> String {
        format!("{}-{}", self.lo, self.hi)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FamilyCount {
    pub family: String,
    pub species: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RichnessReport {
    /// Descending by species count, ties by name.
    pub rows: Vec<RichnessRow>,
    pub stats: RichnessStats,
    pub histogram: Vec<HistogramBin>,
    pub top_families: Vec<FamilyCount>,
}

/// Build the full report. Same-name municipalities are merged.
pub fn richness_report(municipalities: &[Municipality]) -> RichnessReport {
    let mut by_name: BTreeMap<&str, (&str, BTreeSet<&str>, BTreeMap<&str, &str>)> = BTreeMap::new();
    for m in municipalities {
        let entry = by_name
            .entry(m.name.as_str())
            .or_insert_with(|| (m.code.as_str(), BTreeSet::new(), BTreeMap::new()));
        for rec in &m.records {
            if let Some(sp) = rec.key_at(TaxonLevel::Species) {
                entry.1.insert(sp);
                let fam = rec.key_at(TaxonLevel::Family).unwrap_or(UNKNOWN_FAMILY);
                entry.2.entry(sp).or_insert(fam);
            }
        }
    }

    let mut rows: Vec<RichnessRow> = by_name
        .iter()
        .map(|(name, (code, species, _))| RichnessRow {
            municipality: name.to_string(),
            code: code.to_string(),
            species: species.len(),
        })
        .collect();
    rows.sort_by(|a, b| b.species.cmp(&a.species).then_with(|| a.municipality.cmp(&b.municipality)));

    let unique: BTreeSet<&str> = by_name.values().flat_map(|(_, s, _)| s.iter().copied()).collect();

    // A species counts once per municipality it was recorded in.
    let mut families: BTreeMap<&str, usize> = BTreeMap::new();
    for (_, _, fams) in by_name.values() {
        for fam in fams.values() {
            *families.entry(*fam).or_insert(0) += 1;
        }
    }
    let mut top_families: Vec<FamilyCount> = families
        .into_iter()
        .map(|(family, species)| FamilyCount { family: family.to_string(), species })
        .collect();
    top_families.sort_by(|a, b| b.species.cmp(&a.species).then_with(|| a.family.cmp(&b.family)));
    top_families.truncate(TOP_FAMILIES);

    let counts: Vec<usize> = rows.iter().map(|r| r.species).collect();
    RichnessReport {
        stats: richness_stats(&counts, unique.len()),
        histogram: histogram(&counts),
        rows,
        top_families,
    }
}

fn richness_stats(counts: &[usize], unique_species: usize) -> RichnessStats {
    let mut sorted = counts.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    let mean = if n == 0 { 0.0 } else { sorted.iter().sum::<usize>() as f64 / n as f64 };
    RichnessStats {
        municipalities: n,
        unique_species,
        zero_species: sorted.iter().filter(|&&c| c == 0).count(),
        mean: (mean * 10.0).round() / 10.0,
        median: percentile(&sorted, 50.0),
        p25: percentile(&sorted, 25.0),
        p75: percentile(&sorted, 75.0),
        max: sorted.last().copied().unwrap_or(0),
        min: sorted.first().copied().unwrap_or(0),
    }
}

/// Nearest-rank on a sorted slice: index round(p/100 · (n−1)), ties to even.
fn percentile(sorted: &[usize], p: f64) -> usize {
    if sorted.is_empty() {
        return 0;
    }
    let k = (p / 100.0 * (sorted.len() - 1) as f64).round_ties_even() as usize;
    sorted[k.min(sorted.len() - 1)]
}

/// Bin width 50 above 200 species, 25 above 100, otherwise 10.
fn bin_width(max: usize) -> usize {
    if max > 200 {
        50
    } else if max > 100 {
        25
    } else {
        10
    }
}

fn histogram(counts: &[usize]) -> Vec<HistogramBin> {
    let Some(&max) = counts.iter().max() else {
        return Vec::new();
    };
    let width = bin_width(max);
    (0..=max / width)
        .map(|i| {
            let lo = i * width;
            let hi = lo + width - 1;
            let municipalities = counts.iter().filter(|&&c| c >= lo && c <= hi).count();
            HistogramBin { lo, hi, municipalities }
        })
        .collect()
}

/// Render rows as a boxed ASCII table.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }
    let rule = widths.iter().map(|w| "-".repeat(w + 2)).collect::<Vec<_>>().join("+");

    let mut out = vec![rule.clone(), format_row(headers.iter().copied(), &widths), rule.clone()];
    for row in rows {
        out.push(format_row(row.iter().map(String::as_str), &widths));
    }
    out.push(rule);
    out.join("\n")
}

fn format_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(c, &w)| format!(" {c}{} ", " ".repeat(w.saturating_sub(c.chars().count()))))
        .collect::<Vec<_>>()
        .join("|")
}

impl RichnessReport {
    /// The richness rows as an ASCII table (Municipality | Code | Species).
    pub fn table(&self) -> String {
        let rows: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|r| vec![r.municipality.clone(), r.code.clone(), r.species.to_string()])
            .collect();
        render_table(&["Municipality", "Code", "Species"], &rows)
    }
}
