//! Distance metrics for vector similarity

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Distance metrics for measuring vector similarity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Euclidean (L2) distance
    Euclidean,
    /// Cosine similarity (converted to distance: 1 - similarity)
    Cosine,
    /// Manhattan (L1) distance
    Manhattan,
    /// Dot product (negated for minimum distance)
    DotProduct,
}

impl Metric {
    /// Compute the distance between two vectors using this metric.
    ///
    /// Fails with [`Error::DimensionMismatch`] when the lengths differ.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32> {
        if a.len() != b.len() {
            return Err(Error::DimensionMismatch {
                expected: a.len(),
                actual: b.len(),
            });
        }
        Ok(self.finalize(self.ordering_distance(a, b)))
    }

    /// The value the graph algorithms rank by.
    ///
    /// Same order as [`Metric::distance`], but Euclidean skips the square root.
    /// NaN is mapped to `+inf`. Callers guarantee equal lengths.
    pub(crate) fn ordering_distance(&self, a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        let d = match self {
            Metric::Euclidean => squared_euclidean(a, b),
            Metric::Cosine => cosine_distance(a, b),
            Metric::Manhattan => manhattan_distance(a, b),
            Metric::DotProduct => -dot_product(a, b),
        };
        if d.is_nan() {
            f32::INFINITY
        } else {
            d
        }
    }

    /// Convert an ordering distance into the user-visible distance.
    pub(crate) fn finalize(&self, ordering: f32) -> f32 {
        match self {
            Metric::Euclidean => ordering.sqrt(),
            _ => ordering,
        }
    }

    /// Lowercase name, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Euclidean => "euclidean",
            Metric::Cosine => "cosine",
            Metric::Manhattan => "manhattan",
            Metric::DotProduct => "dot_product",
        }
    }
}

/// Squared Euclidean distance
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Compute Euclidean (L2) distance between two vectors
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    squared_euclidean(a, b).sqrt()
}

/// Compute cosine distance between two vectors (1 - cosine similarity).
///
/// Two zero vectors are at distance 0; a zero vector and a non-zero vector
/// are at the maximal distance 2.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = norm(a);
    let norm_b = norm(b);

    match (norm_a == 0.0, norm_b == 0.0) {
        (true, true) => return 0.0,
        (true, false) | (false, true) => return 2.0,
        (false, false) => {}
    }

    let similarity = dot_product(a, b) / (norm_a * norm_b);

    // Clamp to [-1, 1] to handle floating point errors
    1.0 - similarity.clamp(-1.0, 1.0)
}

/// Compute Manhattan (L1) distance between two vectors
pub fn manhattan_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
}

/// Compute dot product of two vectors
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// L2 norm (magnitude) of a vector
pub fn norm(v: &[f32]) -> f32 {
    dot_product(v, v).sqrt()
}
