//! Optimized Product Quantization (OPQ) rotations.
//!
//! OPQ learns an orthogonal matrix R so that the rotated data splits into
//! subspaces that quantize better. The optimization alternates between:
//! 1. Fixing R, refining the per-subspace codebooks
//! 2. Fixing the codebooks and codes, solving for R via SVD (orthogonal Procrustes)
//!
//! Reference: "Optimized Product Quantization" by Ge et al., CVPR 2013
//!
//! A PCA rotation (principal axes of the training set) is also available as a
//! cheaper, deterministic alternative.

use crate::codebook::{Codebook, SubspacePartition};
use crate::config::{OpqParams, PqParams};
use crate::error::{PqError, PqResult};
use crate::kmeans::KMeansClusterer;
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::time::Instant;
use tessera_core::{dot_product, l2_distance_squared, mean_of_rows, Matrix, Metric};

/// Largest deviation of `Rᵗ·R` from the identity accepted by
/// [`Rotation::from_matrix`].
pub const ORTHOGONALITY_TOLERANCE: f32 = 1e-3;

/// Rows per parallel work unit when accumulating `D × D` products.
const ACCUMULATE_CHUNK_ROWS: usize = 1024;

/// An orthogonal `D × D` rotation with its transpose cached.
///
/// `rotate(v) = R·v` and `unrotate(v) = Rᵗ·v`; both are row-by-row dot
/// products over contiguous memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Rotation {
    matrix: Matrix,
    transpose: Matrix,
}

impl Rotation {
    pub fn identity(dim: usize) -> Self {
        Self::from_orthogonal(Matrix::identity(dim))
    }

    /// Wrap an explicit matrix, rejecting anything that is not orthogonal
    /// within [`ORTHOGONALITY_TOLERANCE`].
    pub fn from_matrix(matrix: Matrix) -> PqResult<Self> {
        let error = matrix.orthogonality_error();
        if !(error <= ORTHOGONALITY_TOLERANCE) {
            return Err(PqError::InvalidConfiguration(format!(
                "rotation matrix is not orthogonal (max deviation {:.2e})",
                error
            )));
        }
        Ok(Self::from_orthogonal(matrix))
    }

    fn from_orthogonal(matrix: Matrix) -> Self {
        let transpose = matrix.transpose();
        Self { matrix, transpose }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.matrix.dim()
    }

    #[inline]
    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    #[inline]
    pub fn transpose(&self) -> &Matrix {
        &self.transpose
    }

    /// `R·v` as a new vector.
    pub fn rotate(&self, v: &[f32]) -> PqResult<Vec<f32>> {
        Ok(self.matrix.mul_vec(v)?)
    }

    /// `out = R·v`.
    pub fn rotate_into(&self, v: &[f32], out: &mut [f32]) -> PqResult<()> {
        Ok(self.matrix.mul_vec_into(v, out)?)
    }

    /// `out = Rᵗ·v`, the inverse rotation.
    pub fn unrotate_into(&self, v: &[f32], out: &mut [f32]) -> PqResult<()> {
        Ok(self.transpose.mul_vec_into(v, out)?)
    }

    /// Rotate every row of a flat `n × dim` buffer in parallel.
    pub(crate) fn rotate_rows(&self, rows: &[f32]) -> Vec<f32> {
        let dim = self.dim();
        let mut out = vec![0.0f32; rows.len()];
        out.par_chunks_exact_mut(dim)
            .zip(rows.par_chunks_exact(dim))
            .for_each(|(target, row)| {
                for (i, t) in target.iter_mut().enumerate() {
                    *t = dot_product(self.matrix.row(i), row);
                }
            });
        out
    }
}

/// Output of [`train_rotation`].
#[derive(Debug, Clone)]
pub struct RotationTraining {
    pub rotation: Rotation,
    /// One codebook per subspace, trained on the data under `rotation`.
    pub codebooks: Vec<Codebook>,
    /// Mean squared reconstruction error at the start of each round, followed
    /// by the error of the returned `codebooks` under `rotation`.
    pub errors: Vec<f32>,
}

/// Learn an OPQ rotation and matching codebooks for a flat `n × dim` buffer.
///
/// `rows` must already be centered if the model centers. The first round
/// clusters each subspace from k-means++ seeds; later rounds keep one
/// clusterer per subspace and refine it against the re-rotated data. The
/// returned codebooks get a final `params.kmeans_iterations` Lloyd's run
/// under the final rotation.
pub fn train_rotation(
    rows: &[f32],
    partition: &SubspacePartition,
    params: &PqParams,
    opq: &OpqParams,
) -> PqResult<RotationTraining> {
    let dim = partition.dim();
    if rows.len() % dim != 0 {
        return Err(PqError::DimensionMismatch {
            expected: dim,
            got: rows.len() % dim,
        });
    }
    let n = rows.len() / dim;
    let start = Instant::now();

    let mut rotation = Rotation::identity(dim);
    let mut rotated = rows.to_vec();

    let mut clusterers = (0..partition.len())
        .into_par_iter()
        .map(|m| -> PqResult<KMeansClusterer> {
            let config = params
                .kmeans_config(m)
                .with_max_iterations(opq.kmeans_iterations);
            let mut clusterer = KMeansClusterer::new(
                partition.gather(&rotated, m),
                partition.size(m),
                &config,
                Metric::L2,
            )?;
            clusterer.run(config.max_iterations);
            Ok(clusterer)
        })
        .collect::<PqResult<Vec<_>>>()?;

    let mut errors = Vec::with_capacity(opq.iterations + 1);
    for round in 0..opq.iterations {
        let reconstruction = reconstruct(&clusterers, partition, n);
        let error = mean_squared_error(&rotated, &reconstruction, dim);
        errors.push(error);
        tracing::debug!(round = round + 1, error, "OPQ round");

        let Some(next) = procrustes(rows, &reconstruction, dim) else {
            tracing::warn!(round = round + 1, "SVD did not converge; keeping previous rotation");
            break;
        };
        rotation = next;
        rotated = rotation.rotate_rows(rows);

        clusterers
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(m, clusterer)| {
                clusterer
                    .refine_against(partition.gather(&rotated, m))
                    .map(|_| ())
            })?;
    }

    clusterers.par_iter_mut().for_each(|clusterer| {
        clusterer.run(params.kmeans_iterations);
    });
    let final_error = mean_squared_error(&rotated, &reconstruct(&clusterers, partition, n), dim);
    errors.push(final_error);

    let codebooks = clusterers
        .into_par_iter()
        .enumerate()
        .map(|(m, clusterer)| Codebook::from_flat(partition.size(m), clusterer.into_centroids()))
        .collect::<PqResult<Vec<_>>>()?;

    tracing::debug!(
        rounds = errors.len() - 1,
        final_error,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "OPQ rotation trained"
    );

    Ok(RotationTraining {
        rotation,
        codebooks,
        errors,
    })
}

/// Principal axes of a flat `n × dim` buffer, one eigenvector per row of the
/// rotation, ordered by descending eigenvalue.
pub fn pca_rotation(rows: &[f32], dim: usize) -> PqResult<Rotation> {
    let mean = mean_of_rows(rows, dim)?;
    let n = rows.len() / dim;

    let mut centered = rows.to_vec();
    for row in centered.chunks_exact_mut(dim) {
        for (x, m) in row.iter_mut().zip(&mean) {
            *x -= m;
        }
    }

    let mut covariance = cross_product(&centered, &centered, dim);
    for c in covariance.iter_mut() {
        *c /= n as f64;
    }

    let eigen = DMatrix::from_row_slice(dim, dim, &covariance).symmetric_eigen();
    let mut order: Vec<usize> = (0..dim).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let mut data = Vec::with_capacity(dim * dim);
    for &col in &order {
        data.extend(eigen.eigenvectors.column(col).iter().map(|&x| x as f32));
    }

    Rotation::from_matrix(Matrix::from_row_major(dim, data)?)
}

/// Rebuild every row from its per-subspace centroid assignments.
fn reconstruct(
    clusterers: &[KMeansClusterer],
    partition: &SubspacePartition,
    n: usize,
) -> Vec<f32> {
    let dim = partition.dim();
    let mut out = vec![0.0f32; n * dim];
    out.par_chunks_exact_mut(dim)
        .enumerate()
        .for_each(|(i, row)| {
            for (m, clusterer) in clusterers.iter().enumerate() {
                let centroid = clusterer.centroid(clusterer.assignments()[i]);
                partition.subvector_mut(row, m).copy_from_slice(centroid);
            }
        });
    out
}

fn mean_squared_error(a: &[f32], b: &[f32], dim: usize) -> f32 {
    let n = a.len() / dim;
    if n == 0 {
        return 0.0;
    }
    let total: f64 = a
        .par_chunks_exact(dim)
        .zip(b.par_chunks_exact(dim))
        .map(|(x, y)| l2_distance_squared(x, y) as f64)
        .sum();
    (total / n as f64) as f32
}

/// Orthogonal Procrustes step: the orthogonal `P = U·Vᵗ` minimizing
/// `‖X·P − Y‖` where `Xᵗ·Y = U·Σ·Vᵗ`, returned as `R = Pᵗ` so that the
/// rotation applies to column vectors.
fn procrustes(x: &[f32], y: &[f32], dim: usize) -> Option<Rotation> {
    let correlation = DMatrix::from_row_slice(dim, dim, &cross_product(x, y, dim));
    let svd = correlation.svd(true, true);
    let p = svd.u? * svd.v_t?;

    let mut data = Vec::with_capacity(dim * dim);
    for i in 0..dim {
        for j in 0..dim {
            data.push(p[(j, i)] as f32);
        }
    }
    Matrix::from_row_major(dim, data)
        .ok()
        .map(Rotation::from_orthogonal)
}

/// Row-major `Xᵗ·Y` for two flat `n × dim` buffers, accumulated in f64.
///
/// Chunks are summed in order so the result does not depend on scheduling.
fn cross_product(x: &[f32], y: &[f32], dim: usize) -> Vec<f64> {
    let chunk = ACCUMULATE_CHUNK_ROWS * dim;
    let partials: Vec<Vec<f64>> = x
        .par_chunks(chunk)
        .zip(y.par_chunks(chunk))
        .map(|(xs, ys)| {
            let mut acc = vec![0.0f64; dim * dim];
            for (xr, yr) in xs.chunks_exact(dim).zip(ys.chunks_exact(dim)) {
                for (i, &xi) in xr.iter().enumerate() {
                    if xi == 0.0 {
                        continue;
                    }
                    let xi = xi as f64;
                    for (a, &yj) in acc[i * dim..(i + 1) * dim].iter_mut().zip(yr) {
                        *a += xi * yj as f64;
                    }
                }
            }
            acc
        })
        .collect();

    let mut total = vec![0.0f64; dim * dim];
    for partial in partials {
        for (t, p) in total.iter_mut().zip(partial) {
            *t += p;
        }
    }
    total
}
