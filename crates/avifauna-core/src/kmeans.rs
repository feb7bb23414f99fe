//! Cosine k-means over unit-length feature vectors.
//!
//! Iteration:
//!   1. Assignment: every point goes to the centroid minimising `1 − dot(p, c)`,
//!      where `c` is the raw component-wise mean of the previous members
//!      (never renormalized). Ties go to the lowest cluster index.
//!   2. Reseed: any cluster left empty takes the point farthest (true cosine
//!      distance) from its own centroid, drawn from clusters with ≥ 2 members.
//!   3. Update: centroids are recomputed as member means.
//!
//! The run stops when the assignment repeats, at the iteration cap, or when an
//! optional time budget is exceeded at an iteration boundary. Initialization
//! is a seeded sample of k distinct points, so identical input and seed give
//! identical output.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::error::{ClusterError, Result};
use crate::normalize::{l2_norm, unit_vector};

/// Distance rule between a point and a centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Proximity {
    /// 1 − cos(θ), using both norms. Zero-norm operands give 1.0.
    Cosine,
    /// 1 − dot(p, c) against the raw, non-renormalized centroid.
    RawDot,
}

impl Proximity {
    pub fn distance(self, point: &[f64], centroid: &[f64]) -> f64 {
        match self {
            Proximity::Cosine => cosine_distance(point, centroid),
            Proximity::RawDot => 1.0 - dot(point, centroid),
        }
    }
}

#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// 1 − dot(a, b) / (‖a‖·‖b‖), clamped to [0, 2].
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let na = l2_norm(a);
    let nb = l2_norm(b);
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    (1.0 - dot(a, b) / (na * nb)).clamp(0.0, 2.0)
}

/// Mean direction of a cluster's members.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Centroid {
    pub raw: Vec<f64>,
}

impl Centroid {
    /// Unit-length form for reporting. Assignment never uses this.
    pub fn unit(&self) -> Vec<f64> {
        unit_vector(&self.raw).unwrap_or_else(|| self.raw.clone())
    }
}

#[derive(Debug, Clone)]
pub struct KMeansParams {
    pub k: usize,
    pub max_iterations: usize,
    pub seed: u64,
    /// Checked only between iterations.
    pub time_budget: Option<Duration>,
}

impl KMeansParams {
    pub fn new(k: usize, max_iterations: usize, seed: u64) -> Self {
        Self { k, max_iterations, seed, time_budget: None }
    }
}

/// An empty cluster refilled during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reseed {
    pub iteration: usize,
    pub cluster: usize,
    /// Index of the moved point.
    pub point: usize,
    /// Cluster the point was taken from.
    pub donor: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Converged,
    IterationCap,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct KMeansResult {
    /// Cluster index per input point, same order as the input.
    pub assignment: Vec<usize>,
    pub centroids: Vec<Centroid>,
    pub iterations: usize,
    pub termination: Termination,
    pub reseeds: Vec<Reseed>,
}

impl KMeansResult {
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }
}

/// Cluster `points` into `params.k` groups.
///
/// Fails before any iteration when the input is empty, k is outside
/// `[2, points.len()]`, the iteration cap is zero, or dimensions differ.
pub fn kmeans(points: &[Vec<f64>], params: &KMeansParams) -> Result<KMeansResult> {
    validate(points, params)?;
    let k = params.k;
    let started = Instant::now();

    let mut centroids = initial_centroids(points, k, params.seed);
    let mut assignment: Vec<usize> = Vec::new();
    let mut reseeds = Vec::new();
    let mut iterations = 0;
    let mut termination = Termination::IterationCap;

    for iteration in 1..=params.max_iterations {
        if let Some(budget) = params.time_budget {
            if iteration > 1 && started.elapsed() >= budget {
                termination = Termination::TimedOut;
                break;
            }
        }
        iterations = iteration;

        let mut next = assign(points, &centroids);
        let moved = reseed_empty(points, &mut next, &centroids, iteration);

        // A repeated assignment repeats its reseeds too; only new ones are recorded.
        if next == assignment {
            termination = Termination::Converged;
            break;
        }
        reseeds.extend(moved);
        assignment = next;
        centroids = update_centroids(points, &assignment, k);
        tracing::trace!(iteration, "k-means iteration complete");
    }

    match termination {
        Termination::Converged => tracing::debug!(iterations, k, "k-means converged"),
        Termination::IterationCap => tracing::warn!(
            iterations,
            k,
            "k-means hit the iteration cap without a stable assignment"
        ),
        Termination::TimedOut => tracing::warn!(
            iterations,
            k,
            "k-means stopped at the time budget; returning last complete assignment"
        ),
    }

    Ok(KMeansResult { assignment, centroids, iterations, termination, reseeds })
}

fn validate(points: &[Vec<f64>], params: &KMeansParams) -> Result<()> {
    if points.is_empty() {
        return Err(ClusterError::EmptyInput);
    }
    if params.k < 2 || params.k > points.len() {
        return Err(ClusterError::invalid_cluster_count(params.k, points.len()));
    }
    if params.max_iterations == 0 {
        return Err(ClusterError::invalid_config("max_iterations must be at least 1"));
    }
    let dim = points[0].len();
    if let Some(bad) = points.iter().find(|p| p.len() != dim) {
        return Err(ClusterError::dimension_mismatch(dim, bad.len()));
    }
    Ok(())
}

/// Seeded sample of k distinct points, in ascending input order.
fn initial_centroids(points: &[Vec<f64>], k: usize, seed: u64) -> Vec<Centroid> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picks = rand::seq::index::sample(&mut rng, points.len(), k).into_vec();
    picks.sort_unstable();
    picks.into_iter().map(|i| Centroid { raw: points[i].clone() }).collect()
}

fn nearest(point: &[f64], centroids: &[Centroid]) -> usize {
    let mut best = 0;
    let mut best_d = f64::INFINITY;
    for (j, c) in centroids.iter().enumerate() {
        let d = Proximity::RawDot.distance(point, &c.raw);
        if d < best_d {
            best = j;
            best_d = d;
        }
    }
    best
}

#[cfg_attr(all(feature = "threading", not(test)), allow(dead_code))]
fn assign_serial(points: &[Vec<f64>], centroids: &[Centroid]) -> Vec<usize> {
    points.iter().map(|p| nearest(p, centroids)).collect()
}

// Centroids are read-only here; the update step only runs once every point is assigned.
#[cfg(feature = "threading")]
fn assign(points: &[Vec<f64>], centroids: &[Centroid]) -> Vec<usize> {
    use rayon::prelude::*;
    points.par_iter().map(|p| nearest(p, centroids)).collect()
}

#[cfg(not(feature = "threading"))]
fn assign(points: &[Vec<f64>], centroids: &[Centroid]) -> Vec<usize> {
    assign_serial(points, centroids)
}

fn cluster_sizes(assignment: &[usize], k: usize) -> Vec<usize> {
    let mut sizes = vec![0usize; k];
    for &c in assignment {
        sizes[c] += 1;
    }
    sizes
}

/// The point farthest from its own centroid under `proximity`, considering
/// only clusters with more than one member. Ties go to the lowest index.
pub fn farthest_point(
    points: &[Vec<f64>],
    assignment: &[usize],
    centroids: &[Centroid],
    proximity: Proximity,
) -> Option<usize> {
    let sizes = cluster_sizes(assignment, centroids.len());
    let mut best: Option<(usize, f64)> = None;
    for (i, (p, &c)) in points.iter().zip(assignment).enumerate() {
        if sizes[c] < 2 {
            continue;
        }
        let d = proximity.distance(p, &centroids[c].raw);
        if best.map_or(true, |(_, bd)| d > bd) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

fn reseed_empty(
    points: &[Vec<f64>],
    assignment: &mut [usize],
    centroids: &[Centroid],
    iteration: usize,
) -> Vec<Reseed> {
    let mut reseeds = Vec::new();
    for cluster in 0..centroids.len() {
        if assignment.iter().any(|&c| c == cluster) {
            continue;
        }
        let Some(point) = farthest_point(points, assignment, centroids, Proximity::Cosine) else {
            continue;
        };
        let donor = assignment[point];
        assignment[point] = cluster;
        tracing::debug!(iteration, cluster, point, donor, "reseeded empty cluster");
        reseeds.push(Reseed { iteration, cluster, point, donor });
    }
    reseeds
}

fn update_centroids(points: &[Vec<f64>], assignment: &[usize], k: usize) -> Vec<Centroid> {
    let dim = points.first().map_or(0, Vec::len);
    let mut sums = vec![vec![0.0; dim]; k];
    let mut counts = vec![0usize; k];
    for (p, &c) in points.iter().zip(assignment) {
        counts[c] += 1;
        for (s, v) in sums[c].iter_mut().zip(p) {
            *s += v;
        }
    }
    sums.into_iter()
        .zip(counts)
        .map(|(sum, n)| {
            let n = n.max(1) as f64;
            Centroid { raw: sum.into_iter().map(|s| s / n).collect() }
        })
        .collect()
}
