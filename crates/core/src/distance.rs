//! Unrolled distance kernels.
//!
//! The kernels accumulate into four independent lanes over 8-wide chunks so
//! the compiler can keep them in vector registers. They only `debug_assert`
//! on length; use [`squared_distance`] and [`dot`] where the inputs come from
//! outside the crate.

use crate::error::{ensure_same_len, MathResult};

/// Compute squared L2 (Euclidean) distance between two vectors.
#[inline]
pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let mut lanes = [0.0f32; 4];

    let a_chunks = a.chunks_exact(8);
    let b_chunks = b.chunks_exact(8);
    let a_tail = a_chunks.remainder();
    let b_tail = b_chunks.remainder();

    for (x, y) in a_chunks.zip(b_chunks) {
        for lane in 0..4 {
            let lo = x[lane] - y[lane];
            let hi = x[lane + 4] - y[lane + 4];
            lanes[lane] += lo * lo + hi * hi;
        }
    }

    for (x, y) in a_tail.iter().zip(b_tail) {
        let d = x - y;
        lanes[0] += d * d;
    }

    (lanes[0] + lanes[1]) + (lanes[2] + lanes[3])
}

/// Compute dot product of two vectors.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let mut lanes = [0.0f32; 4];

    let a_chunks = a.chunks_exact(8);
    let b_chunks = b.chunks_exact(8);
    let a_tail = a_chunks.remainder();
    let b_tail = b_chunks.remainder();

    for (x, y) in a_chunks.zip(b_chunks) {
        for lane in 0..4 {
            lanes[lane] += x[lane] * y[lane] + x[lane + 4] * y[lane + 4];
        }
    }

    for (x, y) in a_tail.iter().zip(b_tail) {
        lanes[0] += x * y;
    }

    (lanes[0] + lanes[1]) + (lanes[2] + lanes[3])
}

/// Squared L2 distance with a length check.
#[inline]
pub fn squared_distance(a: &[f32], b: &[f32]) -> MathResult<f32> {
    ensure_same_len(a.len(), b.len())?;
    Ok(l2_distance_squared(a, b))
}

/// Dot product with a length check.
#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> MathResult<f32> {
    ensure_same_len(a.len(), b.len())?;
    Ok(dot_product(a, b))
}

/// Compute L2 (Euclidean) distance between two vectors.
#[inline]
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    l2_distance_squared(a, b).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MathError;

    const EPSILON: f32 = 1e-5;

    fn assert_approx_eq(a: f32, b: f32) {
        assert!(
            (a - b).abs() < EPSILON,
            "Values not approximately equal: {} vs {}",
            a,
            b
        );
    }

    #[test]
    fn test_l2_distance_squared() {
        let a = [1.0, 2.0];
        let b = [3.0, 4.0];
        let c = [5.0, 1.0];
        assert_approx_eq(l2_distance_squared(&a, &a), 0.0);
        assert_approx_eq(l2_distance_squared(&a, &b), 8.0);
        assert_approx_eq(l2_distance_squared(&a, &c), 17.0);
    }

    #[test]
    fn test_uneven_lengths_hit_the_tail() {
        // 5 elements: no full chunk, all tail
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 3.0, 4.0, 5.0, 6.0];
        assert_approx_eq(l2_distance_squared(&a, &b), 5.0);

        // 11 elements: one chunk plus a tail of 3
        let c: Vec<f32> = (0..11).map(|i| i as f32).collect();
        let d: Vec<f32> = (0..11).map(|i| (i * 2) as f32).collect();
        let expected: f32 = (0..11).map(|i| (i * i) as f32).sum();
        assert_approx_eq(l2_distance_squared(&c, &d), expected);
    }

    #[test]
    fn test_empty_and_single_element() {
        assert_eq!(l2_distance_squared(&[], &[]), 0.0);
        assert_eq!(dot_product(&[], &[]), 0.0);
        assert_approx_eq(l2_distance_squared(&[1.0], &[2.0]), 1.0);
    }

    #[test]
    fn test_dot_product() {
        let a = [1.0, 2.0, 3.0];
        let b = [4.0, 5.0, 6.0];
        assert_approx_eq(dot_product(&a, &b), 32.0);

        let c: Vec<f32> = (0..17).map(|i| i as f32).collect();
        let expected: f32 = (0..17).map(|i| (i * i) as f32).sum();
        assert_approx_eq(dot_product(&c, &c), expected);
    }

    #[test]
    fn test_checked_variants_reject_mismatch() {
        let err = squared_distance(&[1.0, 2.0], &[1.0]).unwrap_err();
        assert_eq!(err, MathError::DimensionMismatch { expected: 2, got: 1 });

        assert!(dot(&[1.0], &[1.0, 2.0, 3.0]).is_err());
        assert_approx_eq(dot(&[1.0, 2.0], &[3.0, 4.0]).unwrap(), 11.0);
    }

    #[test]
    fn test_l2_distance_is_root_of_squared() {
        let a = [3.0, 0.0];
        let b = [0.0, 4.0];
        assert_approx_eq(l2_distance_squared(&a, &b), 25.0);
        assert_approx_eq(l2_distance(&a, &b), 5.0);
    }
}
