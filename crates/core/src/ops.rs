//! Elementwise vector arithmetic.

use crate::error::{ensure_same_len, MathError, MathResult};

/// `a - b` as a new vector.
pub fn sub(a: &[f32], b: &[f32]) -> MathResult<Vec<f32>> {
    ensure_same_len(a.len(), b.len())?;
    Ok(a.iter().zip(b).map(|(x, y)| x - y).collect())
}

/// `target -= other`.
pub fn sub_in_place(target: &mut [f32], other: &[f32]) -> MathResult<()> {
    ensure_same_len(target.len(), other.len())?;
    for (t, o) in target.iter_mut().zip(other) {
        *t -= o;
    }
    Ok(())
}

/// `target += other`.
pub fn add_in_place(target: &mut [f32], other: &[f32]) -> MathResult<()> {
    ensure_same_len(target.len(), other.len())?;
    for (t, o) in target.iter_mut().zip(other) {
        *t += o;
    }
    Ok(())
}

/// Divide every element by `divisor`.
pub fn div_in_place(target: &mut [f32], divisor: f32) {
    let inv = 1.0 / divisor;
    for t in target.iter_mut() {
        *t *= inv;
    }
}

/// Arithmetic mean of a set of vectors, accumulated in f64.
pub fn centroid_of<V: AsRef<[f32]>>(vectors: &[V]) -> MathResult<Vec<f32>> {
    let first = vectors.first().ok_or(MathError::Empty)?;
    let dim = first.as_ref().len();

    let mut sum = vec![0.0f64; dim];
    for v in vectors {
        let v = v.as_ref();
        ensure_same_len(dim, v.len())?;
        for (s, &x) in sum.iter_mut().zip(v) {
            *s += x as f64;
        }
    }

    let n = vectors.len() as f64;
    Ok(sum.into_iter().map(|s| (s / n) as f32).collect())
}

/// Mean of the rows of a flat row-major buffer, accumulated in f64.
pub fn mean_of_rows(points: &[f32], dim: usize) -> MathResult<Vec<f32>> {
    if dim == 0 || points.is_empty() {
        return Err(MathError::Empty);
    }
    if points.len() % dim != 0 {
        return Err(MathError::DimensionMismatch {
            expected: dim,
            got: points.len() % dim,
        });
    }

    let mut sum = vec![0.0f64; dim];
    for row in points.chunks_exact(dim) {
        for (s, &x) in sum.iter_mut().zip(row) {
            *s += x as f64;
        }
    }

    let n = (points.len() / dim) as f64;
    Ok(sum.into_iter().map(|s| (s / n) as f32).collect())
}
