//! Distance strategies for clustering.

use crate::distance::l2_distance_squared;

/// Built-in distance strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Metric {
    /// Squared Euclidean distance - lower is more similar
    #[default]
    L2,
}

/// A pluggable distance used by clustering.
///
/// Implementors must be shareable across worker threads: the clusterer calls
/// `distance` concurrently from its parallel assignment pass.
pub trait DistanceFunction: Sync {
    /// Distance between two points of equal dimension. Lower is closer.
    fn distance(&self, a: &[f32], b: &[f32]) -> f32;

    /// Map a value returned by [`DistanceFunction::distance`] onto a scale on
    /// which the triangle inequality holds, or `None` if there is no such
    /// scale. Clustering only prunes candidates when this returns `Some`.
    fn metric_scale(&self, _distance: f32) -> Option<f32> {
        None
    }
}

impl DistanceFunction for Metric {
    #[inline]
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::L2 => l2_distance_squared(a, b),
        }
    }

    /// Squared L2 is not a metric; its square root is.
    #[inline]
    fn metric_scale(&self, distance: f32) -> Option<f32> {
        match self {
            Metric::L2 => Some(distance.max(0.0).sqrt()),
        }
    }
}

impl<F> DistanceFunction for F
where
    F: Fn(&[f32], &[f32]) -> f32 + Sync,
{
    #[inline]
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        self(a, b)
    }
}
