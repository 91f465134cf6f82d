//! K-means clustering with k-means++ initialization.
//!
//! Points and centroids live in flat row-major buffers. Reassignment runs in
//! parallel over points against read-only centroids; the centroid update only
//! starts once the whole pass has been collected.

use crate::config::KMeansConfig;
use crate::error::{PqError, PqResult};
use rand::prelude::*;
use rayon::prelude::*;
use tessera_core::{DistanceFunction, Metric};

/// Remainder below which the k-means++ cumulative walk selects a point.
const SEEDING_EPSILON: f64 = 1e-6;

/// Points per parallel work unit when recomputing centroids.
const UPDATE_CHUNK_POINTS: usize = 4096;

/// Result of a one-shot [`kmeans`] run.
#[derive(Debug, Clone)]
pub struct KMeansResult {
    /// Centroids for each cluster.
    pub centroids: Vec<Vec<f32>>,
    /// Cluster assignment for each point.
    pub assignments: Vec<usize>,
    /// Number of Lloyd's iterations performed.
    pub iterations: usize,
    /// Whether the change ratio dropped below the threshold before the cap.
    pub converged: bool,
}

/// A K-means++ clusterer that owns its points, centroids and RNG.
///
/// The clusterer is generic over its [`DistanceFunction`]. When the function
/// exposes a metric scale, candidate centroids that the triangle inequality
/// rules out are skipped during reassignment.
pub struct KMeansClusterer<F: DistanceFunction = Metric> {
    points: Vec<f32>,
    dim: usize,
    k: usize,
    centroids: Vec<f32>,
    assignments: Vec<usize>,
    /// k × k pairwise centroid distances on the metric scale.
    centroid_distances: Vec<f32>,
    prune: bool,
    convergence_ratio: f64,
    distance: F,
    rng: StdRng,
}

impl<F: DistanceFunction> KMeansClusterer<F> {
    /// Seed `config.num_clusters` centroids with k-means++ and assign every
    /// point to its nearest one.
    pub fn new(points: Vec<f32>, dim: usize, config: &KMeansConfig, distance: F) -> PqResult<Self> {
        let n = validate_shape(&points, dim, config.num_clusters)?;
        let mut rng = rng_for(config.seed);
        let centroids =
            kmeans_plusplus_init(&points, dim, config.num_clusters, &distance, &mut rng);
        debug_assert_eq!(centroids.len(), config.num_clusters * dim);
        tracing::trace!(points = n, k = config.num_clusters, dim, "seeded k-means++");

        Ok(Self::from_parts(points, dim, centroids, config, distance, rng))
    }

    /// Start from existing centroids instead of k-means++ seeding.
    pub fn with_centroids(
        centroids: Vec<f32>,
        points: Vec<f32>,
        dim: usize,
        config: &KMeansConfig,
        distance: F,
    ) -> PqResult<Self> {
        validate_shape(&points, dim, config.num_clusters)?;
        if centroids.len() != config.num_clusters * dim {
            return Err(PqError::DimensionMismatch {
                expected: config.num_clusters * dim,
                got: centroids.len(),
            });
        }
        let rng = rng_for(config.seed);

        Ok(Self::from_parts(points, dim, centroids, config, distance, rng))
    }

    fn from_parts(
        points: Vec<f32>,
        dim: usize,
        centroids: Vec<f32>,
        config: &KMeansConfig,
        distance: F,
        rng: StdRng,
    ) -> Self {
        let k = config.num_clusters;
        let n = points.len() / dim;
        let prune = distance.metric_scale(0.0).is_some();

        let mut clusterer = Self {
            points,
            dim,
            k,
            centroids,
            assignments: vec![0; n],
            centroid_distances: vec![0.0; k * k],
            prune,
            convergence_ratio: config.convergence_ratio,
            distance,
            rng,
        };
        clusterer.update_centroid_distances();
        clusterer.assign_points();
        clusterer
    }

    /// Run Lloyd's iterations until at most `convergence_ratio` of the points
    /// change cluster in a pass, or `max_iterations` passes have run.
    pub fn cluster(&mut self, max_iterations: usize) -> &[f32] {
        self.run(max_iterations);
        &self.centroids
    }

    /// Same as [`cluster`](Self::cluster), reporting `(iterations, converged)`.
    pub fn run(&mut self, max_iterations: usize) -> (usize, bool) {
        let n = self.len();
        let threshold = self.convergence_ratio * n as f64;

        for iter in 0..max_iterations {
            let changes = self.cluster_once();
            tracing::debug!(
                "K-means iteration {}: {} changes ({:.2}%)",
                iter + 1,
                changes,
                100.0 * changes as f64 / n as f64
            );
            if changes as f64 <= threshold {
                return (iter + 1, true);
            }
        }

        (max_iterations, false)
    }

    /// One Lloyd's step: recompute centroids, then reassign every point.
    /// Returns how many points changed cluster.
    pub fn cluster_once(&mut self) -> usize {
        self.update_centroids();
        self.update_centroid_distances();
        self.assign_points()
    }

    /// Swap in a new point set of the same shape (e.g. the same training data
    /// under a new rotation), reassign it to the current centroids and take
    /// one Lloyd's step from there.
    pub fn refine_against(&mut self, points: Vec<f32>) -> PqResult<&[f32]> {
        if points.len() != self.points.len() {
            return Err(PqError::DimensionMismatch {
                expected: self.points.len(),
                got: points.len(),
            });
        }
        self.points = points;
        self.assign_points();
        self.cluster_once();
        Ok(&self.centroids)
    }

    /// Flat centroid buffer, `k * dim` values.
    #[inline]
    pub fn centroids(&self) -> &[f32] {
        &self.centroids
    }

    #[inline]
    pub fn centroid(&self, i: usize) -> &[f32] {
        &self.centroids[i * self.dim..(i + 1) * self.dim]
    }

    #[inline]
    pub fn assignments(&self) -> &[usize] {
        &self.assignments
    }

    #[inline]
    pub fn k(&self) -> usize {
        self.k
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of points.
    #[inline]
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn into_centroids(self) -> Vec<f32> {
        self.centroids
    }

    /// Index of the nearest centroid to `point`.
    fn nearest(&self, point: &[f32]) -> usize {
        let mut best = 0;
        let mut best_dist = f32::MAX;
        let mut best_scaled = f32::MAX;

        for i in 0..self.k {
            if self.prune && i != best {
                // |d(p, best) - d(best, i)| >= d(p, best) means i cannot be closer
                let between = self.centroid_distances[best * self.k + i];
                if (best_scaled - between).abs() >= best_scaled {
                    continue;
                }
            }

            let dist = self.distance.distance(point, self.centroid(i));
            if dist < best_dist {
                best = i;
                best_dist = dist;
                best_scaled = self.distance.metric_scale(dist).unwrap_or(dist);
            }
        }

        best
    }

    fn assign_points(&mut self) -> usize {
        let new_assignments: Vec<usize> = self
            .points
            .par_chunks_exact(self.dim)
            .map(|p| self.nearest(p))
            .collect();

        let changes = self
            .assignments
            .iter()
            .zip(&new_assignments)
            .filter(|(a, b)| a != b)
            .count();

        self.assignments = new_assignments;
        changes
    }

    fn update_centroids(&mut self) {
        let (k, dim) = (self.k, self.dim);

        // Fixed-size chunks summed in order keep seeded runs bit-reproducible
        let partials: Vec<(Vec<f64>, Vec<usize>)> = self
            .points
            .par_chunks(UPDATE_CHUNK_POINTS * dim)
            .zip(self.assignments.par_chunks(UPDATE_CHUNK_POINTS))
            .map(|(points, assignments)| {
                let mut sums = vec![0.0f64; k * dim];
                let mut counts = vec![0usize; k];
                for (p, &c) in points.chunks_exact(dim).zip(assignments) {
                    counts[c] += 1;
                    for (s, &x) in sums[c * dim..(c + 1) * dim].iter_mut().zip(p) {
                        *s += x as f64;
                    }
                }
                (sums, counts)
            })
            .collect();

        let mut sums = vec![0.0f64; k * dim];
        let mut counts = vec![0usize; k];
        for (partial_sums, partial_counts) in partials {
            for (a, b) in sums.iter_mut().zip(partial_sums) {
                *a += b;
            }
            for (a, b) in counts.iter_mut().zip(partial_counts) {
                *a += b;
            }
        }

        let n = self.len();
        for c in 0..k {
            let target = &mut self.centroids[c * dim..(c + 1) * dim];
            if counts[c] == 0 {
                // empty cluster: reseed on a random point rather than divide by zero
                let idx = self.rng.gen_range(0..n);
                target.copy_from_slice(&self.points[idx * dim..(idx + 1) * dim]);
                tracing::trace!(cluster = c, point = idx, "reseeded empty cluster");
            } else {
                let count = counts[c] as f64;
                for (t, s) in target.iter_mut().zip(&sums[c * dim..(c + 1) * dim]) {
                    *t = (s / count) as f32;
                }
            }
        }
    }

    fn update_centroid_distances(&mut self) {
        if !self.prune {
            return;
        }
        let (k, dim) = (self.k, self.dim);
        let centroids = &self.centroids;
        let distance = &self.distance;

        self.centroid_distances
            .par_chunks_mut(k)
            .enumerate()
            .for_each(|(m, row)| {
                let a = &centroids[m * dim..(m + 1) * dim];
                for (n, slot) in row.iter_mut().enumerate() {
                    *slot = if m == n {
                        0.0
                    } else {
                        let d = distance.distance(a, &centroids[n * dim..(n + 1) * dim]);
                        distance.metric_scale(d).unwrap_or(d)
                    };
                }
            });
    }
}

/// Run k-means with squared L2 distance on a list of points.
pub fn kmeans(points: &[Vec<f32>], config: &KMeansConfig) -> PqResult<KMeansResult> {
    kmeans_with(points, config, Metric::L2)
}

/// Run k-means with a custom distance function on a list of points.
pub fn kmeans_with<F: DistanceFunction>(
    points: &[Vec<f32>],
    config: &KMeansConfig,
    distance: F,
) -> PqResult<KMeansResult> {
    let dim = match points.first() {
        Some(p) => p.len(),
        None => {
            return Err(PqError::InvalidConfiguration(format!(
                "cannot form {} clusters from 0 points",
                config.num_clusters
            )))
        }
    };

    let mut flat = Vec::with_capacity(points.len() * dim);
    for p in points {
        if p.len() != dim {
            return Err(PqError::DimensionMismatch {
                expected: dim,
                got: p.len(),
            });
        }
        flat.extend_from_slice(p);
    }

    let mut clusterer = KMeansClusterer::new(flat, dim, config, distance)?;
    let (iterations, converged) = clusterer.run(config.max_iterations);

    Ok(KMeansResult {
        centroids: clusterer
            .centroids()
            .chunks_exact(dim)
            .map(|c| c.to_vec())
            .collect(),
        assignments: clusterer.assignments().to_vec(),
        iterations,
        converged,
    })
}

fn rng_for(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Check the flat buffer shape and cluster count; returns the point count.
fn validate_shape(points: &[f32], dim: usize, k: usize) -> PqResult<usize> {
    if dim == 0 {
        return Err(PqError::InvalidConfiguration(
            "point dimension must be > 0".to_string(),
        ));
    }
    if points.len() % dim != 0 {
        return Err(PqError::DimensionMismatch {
            expected: dim,
            got: points.len() % dim,
        });
    }
    let n = points.len() / dim;
    if k == 0 {
        return Err(PqError::InvalidConfiguration(
            "number of clusters must be positive".to_string(),
        ));
    }
    if k > n {
        return Err(PqError::InvalidConfiguration(format!(
            "cannot form {} clusters from {} points",
            k, n
        )));
    }
    Ok(n)
}

/// K-means++ initialization over a flat point buffer.
fn kmeans_plusplus_init<F: DistanceFunction, R: Rng>(
    points: &[f32],
    dim: usize,
    k: usize,
    distance: &F,
    rng: &mut R,
) -> Vec<f32> {
    let n = points.len() / dim;
    let point = move |i: usize| &points[i * dim..(i + 1) * dim];
    let mut centroids = Vec::with_capacity(k * dim);

    // Pick first centroid uniformly at random
    let first = point(rng.gen_range(0..n));
    centroids.extend_from_slice(first);

    let mut min_distances: Vec<f32> = points
        .par_chunks_exact(dim)
        .map(|p| distance.distance(p, first))
        .collect();

    for _ in 1..k {
        let total: f64 = min_distances.iter().map(|&d| d as f64).sum();

        // Walk the cumulative weights until the remainder is spent
        let mut remainder = rng.gen::<f64>() * total;
        let mut selected = None;
        for (i, &d) in min_distances.iter().enumerate() {
            remainder -= d as f64;
            if remainder < SEEDING_EPSILON {
                selected = Some(i);
                break;
            }
        }
        let chosen = point(selected.unwrap_or_else(|| rng.gen_range(0..n)));
        centroids.extend_from_slice(chosen);

        min_distances
            .par_iter_mut()
            .zip(points.par_chunks_exact(dim))
            .for_each(|(best, p)| {
                let d = distance.distance(p, chosen);
                if d < *best {
                    *best = d;
                }
            });
    }

    centroids
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::l2_distance_squared;

    fn flatten(points: &[Vec<f32>]) -> Vec<f32> {
        points.iter().flatten().copied().collect()
    }

    fn two_clouds() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 1.0],
            vec![1.1, 1.2],
            vec![1.2, 1.1],
            vec![10.0, 10.0],
            vec![10.1, 10.2],
            vec![9.9, 10.1],
        ]
    }

    fn sorted_by_x(mut centroids: Vec<Vec<f32>>) -> Vec<Vec<f32>> {
        centroids.sort_by(|a, b| a[0].partial_cmp(&b[0]).unwrap());
        centroids
    }

    fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32) {
        for (a, e) in actual.iter().zip(expected) {
            assert!(
                (a - e).abs() <= tolerance,
                "{:?} not within {} of {:?}",
                actual,
                tolerance,
                expected
            );
        }
    }

    #[test]
    fn test_multiple_points_one_cluster() {
        let points = vec![
            vec![1.0, 2.0],
            vec![1.1, 2.2],
            vec![0.9, 1.8],
            vec![1.2, 2.1],
        ];
        let result = kmeans(&points, &KMeansConfig::new(1).with_max_iterations(10)).unwrap();

        assert_eq!(result.centroids.len(), 1);
        assert_close(&result.centroids[0], &[1.05, 2.025], 0.01);
        assert!(result.assignments.iter().all(|&a| a == 0));
    }

    #[test]
    fn test_distinct_clusters_without_seed() {
        // k-means++ seeding should find both clouds on every run
        for _ in 0..20 {
            let result = kmeans(&two_clouds(), &KMeansConfig::new(2).with_max_iterations(10)).unwrap();
            let centroids = sorted_by_x(result.centroids);

            assert_eq!(centroids.len(), 2);
            assert_close(&centroids[0], &[1.1, 1.1], 0.05);
            assert_close(&centroids[1], &[10.0, 10.1], 0.05);
            assert!(result.converged);
        }
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let mut rng = StdRng::seed_from_u64(9);
        let points: Vec<Vec<f32>> = (0..500)
            .map(|_| (0..4).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect();
        let config = KMeansConfig::new(16).with_seed(1234);

        let a = kmeans(&points, &config).unwrap();
        let b = kmeans(&points, &config).unwrap();

        assert_eq!(a.centroids, b.centroids);
        assert_eq!(a.assignments, b.assignments);
        assert_eq!(a.iterations, b.iterations);
    }

    #[test]
    fn test_all_points_identical() {
        let points = vec![vec![1.0, 2.0]; 100];
        let result = kmeans(&points, &KMeansConfig::new(10).with_max_iterations(10)).unwrap();

        assert_eq!(result.centroids.len(), 10);
        for centroid in &result.centroids {
            assert!(centroid.iter().all(|x| !x.is_nan()));
            assert_close(centroid, &[1.0, 2.0], 0.01);
        }
        assert!(result.iterations <= 10);
    }

    #[test]
    fn test_two_points_one_cluster() {
        let points = vec![vec![1.0, 2.0], vec![3.0, 4.0]];
        let result = kmeans(&points, &KMeansConfig::new(1)).unwrap();
        assert_close(&result.centroids[0], &[2.0, 3.0], 0.01);
    }

    #[test]
    fn test_invalid_cluster_counts() {
        let one = vec![vec![1.0, 2.0]];
        assert!(matches!(
            kmeans(&one, &KMeansConfig::new(2)),
            Err(PqError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            kmeans(&one, &KMeansConfig::new(0)),
            Err(PqError::InvalidConfiguration(_))
        ));

        let none: Vec<Vec<f32>> = Vec::new();
        assert!(matches!(
            kmeans(&none, &KMeansConfig::new(2)),
            Err(PqError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_ragged_points_rejected() {
        let points = vec![vec![1.0, 2.0], vec![1.0]];
        assert!(matches!(
            kmeans(&points, &KMeansConfig::new(1)),
            Err(PqError::DimensionMismatch { .. })
        ));

        assert!(matches!(
            KMeansClusterer::new(vec![1.0, 2.0, 3.0], 2, &KMeansConfig::new(1), Metric::L2),
            Err(PqError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_pruning_never_changes_assignment() {
        let mut rng = StdRng::seed_from_u64(3);
        let points: Vec<Vec<f32>> = (0..2000)
            .map(|_| (0..3).map(|_| rng.gen_range(-5.0..5.0)).collect())
            .collect();
        let config = KMeansConfig::new(64).with_seed(5);

        let mut clusterer = KMeansClusterer::new(flatten(&points), 3, &config, Metric::L2).unwrap();
        clusterer.cluster(5);

        for (p, &assigned) in points.iter().zip(clusterer.assignments()) {
            let brute = (0..clusterer.k())
                .map(|c| l2_distance_squared(p, clusterer.centroid(c)))
                .fold(f32::MAX, f32::min);
            let chosen = l2_distance_squared(p, clusterer.centroid(assigned));
            assert!(
                chosen <= brute * (1.0 + 1e-5) + 1e-6,
                "pruned away a closer centroid"
            );
        }
    }

    #[test]
    fn test_closure_distance() {
        let manhattan = |a: &[f32], b: &[f32]| -> f32 {
            a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
        };
        let result = kmeans_with(&two_clouds(), &KMeansConfig::new(2).with_seed(11), manhattan).unwrap();
        let centroids = sorted_by_x(result.centroids);
        assert_close(&centroids[0], &[1.1, 1.1], 0.05);
        assert_close(&centroids[1], &[10.0, 10.1], 0.05);
    }

    #[test]
    fn test_refine_against_moved_points() {
        let points = two_clouds();
        let config = KMeansConfig::new(2).with_seed(21);
        let mut clusterer = KMeansClusterer::new(flatten(&points), 2, &config, Metric::L2).unwrap();
        clusterer.cluster(10);

        let shifted: Vec<f32> = flatten(&points).iter().map(|x| x + 0.5).collect();
        let centroids: Vec<Vec<f32>> = clusterer
            .refine_against(shifted)
            .unwrap()
            .chunks_exact(2)
            .map(|c| c.to_vec())
            .collect();
        let centroids = sorted_by_x(centroids);

        assert_close(&centroids[0], &[1.6, 1.6], 0.05);
        assert_close(&centroids[1], &[10.5, 10.6], 0.05);

        assert!(matches!(
            clusterer.refine_against(vec![0.0; 4]),
            Err(PqError::DimensionMismatch { expected: 12, got: 4 })
        ));
    }

    #[test]
    fn test_with_centroids() {
        let config = KMeansConfig::new(2);
        let start = vec![0.0, 0.0, 15.0, 15.0];
        let mut clusterer =
            KMeansClusterer::with_centroids(start, flatten(&two_clouds()), 2, &config, Metric::L2)
                .unwrap();
        assert_eq!(clusterer.assignments(), &[0, 0, 0, 1, 1, 1]);

        clusterer.cluster(10);
        assert_close(clusterer.centroid(0), &[1.1, 1.1], 0.05);
        assert_close(clusterer.centroid(1), &[10.0, 10.1], 0.05);

        assert!(KMeansClusterer::with_centroids(
            vec![0.0; 3],
            flatten(&two_clouds()),
            2,
            &config,
            Metric::L2
        )
        .is_err());
    }
}
