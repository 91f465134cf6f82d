//! Square row-major `f32` matrices.

use crate::distance::dot_product;
use crate::error::{ensure_same_len, MathError, MathResult};

/// A `dim × dim` matrix stored row-major in one contiguous buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    dim: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// The identity matrix.
    pub fn identity(dim: usize) -> Self {
        let mut data = vec![0.0f32; dim * dim];
        for i in 0..dim {
            data[i * dim + i] = 1.0;
        }
        Self { dim, data }
    }

    /// Wrap a row-major buffer of `dim * dim` values.
    pub fn from_row_major(dim: usize, data: Vec<f32>) -> MathResult<Self> {
        ensure_same_len(dim * dim, data.len())?;
        Ok(Self { dim, data })
    }

    /// Build from explicit rows; every row must have `rows.len()` entries.
    pub fn from_rows(rows: &[Vec<f32>]) -> MathResult<Self> {
        let dim = rows.len();
        let mut data = Vec::with_capacity(dim * dim);
        for row in rows {
            ensure_same_len(dim, row.len())?;
            data.extend_from_slice(row);
        }
        Ok(Self { dim, data })
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.dim + col]
    }

    pub fn transpose(&self) -> Self {
        let dim = self.dim;
        let mut data = vec![0.0f32; dim * dim];
        for i in 0..dim {
            for j in 0..dim {
                data[j * dim + i] = self.data[i * dim + j];
            }
        }
        Self { dim, data }
    }

    /// `self · v` as a new vector.
    pub fn mul_vec(&self, v: &[f32]) -> MathResult<Vec<f32>> {
        let mut out = vec![0.0f32; self.dim];
        self.mul_vec_into(v, &mut out)?;
        Ok(out)
    }

    /// `out = self · v`. Each output element is one contiguous row dot product.
    pub fn mul_vec_into(&self, v: &[f32], out: &mut [f32]) -> MathResult<()> {
        ensure_same_len(self.dim, v.len())?;
        ensure_same_len(self.dim, out.len())?;
        for (i, o) in out.iter_mut().enumerate() {
            *o = dot_product(self.row(i), v);
        }
        Ok(())
    }

    /// `self · other`.
    pub fn mul(&self, other: &Matrix) -> MathResult<Matrix> {
        ensure_same_len(self.dim, other.dim)?;
        let dim = self.dim;
        let rhs_t = other.transpose();
        let mut data = vec![0.0f32; dim * dim];
        for i in 0..dim {
            for j in 0..dim {
                data[i * dim + j] = dot_product(self.row(i), rhs_t.row(j));
            }
        }
        Ok(Matrix { dim, data })
    }

    /// Largest absolute deviation of `selfᵗ · self` from the identity.
    pub fn orthogonality_error(&self) -> f32 {
        let dim = self.dim;
        let t = self.transpose();
        let mut worst = 0.0f32;
        // (Rᵗ R)[i][j] = column i · column j = row i of Rᵗ · row j of Rᵗ
        for i in 0..dim {
            for j in 0..dim {
                let expected = if i == j { 1.0 } else { 0.0 };
                let got = dot_product(t.row(i), t.row(j));
                worst = worst.max((got - expected).abs());
            }
        }
        worst
    }

    /// True when `selfᵗ · self` is the identity within `tolerance`.
    pub fn is_orthogonal(&self, tolerance: f32) -> bool {
        self.orthogonality_error() <= tolerance
    }
}

impl TryFrom<Vec<Vec<f32>>> for Matrix {
    type Error = MathError;

    fn try_from(rows: Vec<Vec<f32>>) -> MathResult<Self> {
        Matrix::from_rows(&rows)
    }
}
