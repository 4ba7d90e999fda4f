//! Lloyd's k-means with k-means++ seeding.
//!
//! Seeding draws from a seeded generator, so a fit is reproducible for a
//! fixed `seed` and varies across seeds. Everything after seeding is
//! deterministic.

use crate::rng::SeedStream;

/// Parameters controlling the k-means loop.
#[derive(Debug, Clone, Copy)]
pub struct KMeansParams {
    /// Number of clusters to produce.
    pub clusters: usize,
    /// Maximum Lloyd iterations per restart.
    pub max_iterations: usize,
    /// Convergence threshold on the total squared centroid movement,
    /// relative to the mean per-dimension variance of the data.
    pub tolerance: f64,
    /// Independent seedings to try; the lowest-inertia result wins.
    pub restarts: usize,
    /// RNG seed for k-means++ seeding.
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            clusters: 50,
            max_iterations: 300,
            tolerance: 1e-4,
            restarts: 1,
            seed: 0x6f_70_63_6f_73_74, // "opcost"
        }
    }
}

/// Result of a k-means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    /// Cluster centroids, indexed by cluster id.
    pub centroids: Vec<Vec<f64>>,
    /// Nearest-centroid id for each input point.
    pub labels: Vec<usize>,
    /// Sum of squared distances from each point to its centroid.
    pub inertia: f64,
    /// Lloyd iterations performed by the winning restart.
    pub iterations: usize,
}

/// Clusters `points` (one row per point) into `params.clusters` groups.
///
/// Always returns exactly `params.clusters` centroids. When the data has
/// fewer distinct points than clusters, the surplus centroids duplicate
/// existing points and the clusters behind them stay empty.
///
/// Returns `None` if `points` is empty, rows differ in length, or zero
/// clusters are requested.
#[must_use]
pub fn fit_kmeans(points: &[Vec<f64>], params: &KMeansParams) -> Option<KMeansFit> {
    let dim = points.first()?.len();
    if params.clusters == 0 || points.iter().any(|p| p.len() != dim) {
        return None;
    }

    let tolerance = params.tolerance * mean_variance(points, dim);
    let mut best: Option<KMeansFit> = None;
    for restart in 0..params.restarts.max(1) {
        let mut rng = SeedStream::new(params.seed, restart);
        let seeds = seed_plus_plus(points, params.clusters, &mut rng);
        let fit = lloyd(points, seeds, params.max_iterations, tolerance);
        if best.as_ref().is_none_or(|b| fit.inertia < b.inertia) {
            best = Some(fit);
        }
    }
    best
}

/// k-means++ seeding: each new centroid is sampled with probability
/// proportional to its squared distance from the nearest chosen centroid.
fn seed_plus_plus(
    points: &[Vec<f64>],
    k: usize,
    rng: &mut SeedStream,
) -> Vec<Vec<f64>> {
    let n = points.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.index_below(n)].clone());
    let mut d2: Vec<f64> = points
        .iter()
        .map(|p| squared_distance(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = d2.iter().sum();
        let next = if total > 0.0 {
            sample_weighted(&d2, rng.unit() * total)
        } else {
            // Every point coincides with a centroid already.
            rng.index_below(n)
        };
        let chosen = points[next].clone();
        for (d, p) in d2.iter_mut().zip(points) {
            *d = d.min(squared_distance(p, &chosen));
        }
        centroids.push(chosen);
    }
    centroids
}

/// Returns the index whose cumulative weight first exceeds `target`.
fn sample_weighted(weights: &[f64], target: f64) -> usize {
    let mut acc = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        acc += w;
        if acc > target {
            return i;
        }
    }
    // Rounding can leave `acc` a hair below `target`.
    weights.iter().rposition(|&w| w > 0.0).unwrap_or(0)
}

fn lloyd(
    points: &[Vec<f64>],
    mut centroids: Vec<Vec<f64>>,
    max_iterations: usize,
    tolerance: f64,
) -> KMeansFit {
    let k = centroids.len();
    let dim = centroids[0].len();
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;

        let mut sums = vec![vec![0.0; dim]; k];
        let mut counts = vec![0usize; k];
        for p in points {
            let c = nearest(&centroids, p);
            counts[c] += 1;
            for (s, x) in sums[c].iter_mut().zip(p) {
                *s += x;
            }
        }

        let mut shift = 0.0;
        for ((centroid, sum), &count) in
            centroids.iter_mut().zip(sums).zip(&counts)
        {
            // An empty cluster keeps its previous centroid.
            if count == 0 {
                continue;
            }
            #[expect(
                clippy::cast_precision_loss,
                reason = "cluster sizes stay far below 2^53"
            )]
            let count = count as f64;
            let updated: Vec<f64> = sum.into_iter().map(|s| s / count).collect();
            shift += squared_distance(centroid, &updated);
            *centroid = updated;
        }

        if shift <= tolerance {
            break;
        }
    }

    // Final labels always agree with nearest-centroid assignment on the
    // returned centroids.
    let labels: Vec<usize> =
        points.iter().map(|p| nearest(&centroids, p)).collect();
    let inertia = points
        .iter()
        .zip(&labels)
        .map(|(p, &c)| squared_distance(p, &centroids[c]))
        .sum();

    KMeansFit {
        centroids,
        labels,
        inertia,
        iterations,
    }
}

/// Nearest centroid by squared distance; ties go to the lowest id.
fn nearest(centroids: &[Vec<f64>], point: &[f64]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (id, centroid) in centroids.iter().enumerate() {
        let distance = squared_distance(centroid, point);
        if distance < best_distance {
            best = id;
            best_distance = distance;
        }
    }
    best
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

#[expect(
    clippy::cast_precision_loss,
    reason = "point counts and dimensions stay far below 2^53"
)]
fn mean_variance(points: &[Vec<f64>], dim: usize) -> f64 {
    if dim == 0 {
        return 0.0;
    }
    let n = points.len() as f64;
    let mut total = 0.0;
    for d in 0..dim {
        let mean = points.iter().map(|p| p[d]).sum::<f64>() / n;
        total += points.iter().map(|p| (p[d] - mean).powi(2)).sum::<f64>() / n;
    }
    total / dim as f64
}
