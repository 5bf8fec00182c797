//! Distance computation for vector similarity search.
//!
//! Every metric yields an ordering-compatible distance: smaller values mean
//! "closer". Dot product is negated so the convention holds across metrics.

use crate::config::DistanceMetric;

/// Trait for distance computation between vectors.
pub trait DistanceFunction: Send + Sync {
    /// Compute the ordering distance between two vectors.
    ///
    /// Callers validate lengths before entry; on a mismatch this returns the
    /// metric's sentinel (worst possible value) rather than panicking.
    fn distance(&self, a: &[f32], b: &[f32]) -> f32;

    /// Distance metric type.
    fn metric(&self) -> DistanceMetric;
}

/// Create the distance function for the given metric.
pub fn distance_function(metric: DistanceMetric) -> Box<dyn DistanceFunction> {
    match metric {
        DistanceMetric::Cosine => Box::new(CosineDistance),
        DistanceMetric::Euclidean => Box::new(EuclideanDistance),
        DistanceMetric::DotProduct => Box::new(DotProductDistance),
        DistanceMetric::Manhattan => Box::new(ManhattanDistance),
    }
}

pub struct CosineDistance;

impl DistanceFunction for CosineDistance {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 1.0;
        }

        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;
        for (x, y) in a.iter().zip(b.iter()) {
            dot += x * y;
            norm_a += x * x;
            norm_b += y * y;
        }

        let norm_product = (norm_a * norm_b).sqrt();
        if norm_product == 0.0 {
            // Similarity to a zero vector is defined as 0.
            return 1.0;
        }

        1.0 - dot / norm_product
    }

    fn metric(&self) -> DistanceMetric {
        DistanceMetric::Cosine
    }
}

pub struct EuclideanDistance;

impl DistanceFunction for EuclideanDistance {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return f32::INFINITY;
        }

        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt()
    }

    fn metric(&self) -> DistanceMetric {
        DistanceMetric::Euclidean
    }
}

pub struct DotProductDistance;

impl DistanceFunction for DotProductDistance {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        // Negated so that higher dot product sorts as lower distance.
        -a.iter().zip(b.iter()).map(|(x, y)| x * y).sum::<f32>()
    }

    fn metric(&self) -> DistanceMetric {
        DistanceMetric::DotProduct
    }
}

pub struct ManhattanDistance;

impl DistanceFunction for ManhattanDistance {
    fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return f32::INFINITY;
        }

        a.iter().zip(b.iter()).map(|(x, y)| (x - y).abs()).sum()
    }

    fn metric(&self) -> DistanceMetric {
        DistanceMetric::Manhattan
    }
}

/// L2 norm of a vector.
pub fn magnitude(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Normalize a vector to unit length. A zero vector is returned unchanged.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm = magnitude(v);
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// The `ef` to use when a caller asks for `k` results: at least `base_ef`,
/// and at least 1.5x `k` for adequate recall.
pub fn optimal_ef(k: usize, base_ef: usize) -> usize {
    base_ef.max((3 * k).div_ceil(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_euclidean_distance() {
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let b = vec![2.0, 3.0, 4.0, 5.0];

        let distance = distance_function(DistanceMetric::Euclidean).distance(&a, &b);
        assert_relative_eq!(distance, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_distance() {
        let orthogonal = distance_function(DistanceMetric::Cosine)
            .distance(&[1.0, 0.0, 0.0], &[0.0, 1.0, 0.0]);
        assert_relative_eq!(orthogonal, 1.0, epsilon = 1e-6);

        let identical = distance_function(DistanceMetric::Cosine)
            .distance(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert_relative_eq!(identical, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_cosine_distance_zero_vector() {
        let distance =
            distance_function(DistanceMetric::Cosine).distance(&[0.0, 0.0], &[1.0, 1.0]);
        assert_relative_eq!(distance, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_dot_product_distance() {
        let distance = distance_function(DistanceMetric::DotProduct)
            .distance(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]);
        assert_relative_eq!(distance, -32.0, epsilon = 1e-6);
    }

    #[test]
    fn test_manhattan_distance() {
        let distance = distance_function(DistanceMetric::Manhattan)
            .distance(&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0]);
        assert_relative_eq!(distance, 9.0, epsilon = 1e-6);
    }

    #[test]
    fn test_length_mismatch_sentinels() {
        let a = [1.0, 2.0];
        let b = [1.0, 2.0, 3.0];

        assert_eq!(
            distance_function(DistanceMetric::Euclidean).distance(&a, &b),
            f32::INFINITY
        );
        assert_eq!(
            distance_function(DistanceMetric::Manhattan).distance(&a, &b),
            f32::INFINITY
        );
        assert_eq!(
            distance_function(DistanceMetric::DotProduct).distance(&a, &b),
            0.0
        );
        assert_eq!(
            distance_function(DistanceMetric::Cosine).distance(&a, &b),
            1.0
        );
    }

    #[test]
    fn test_normalize() {
        let v = normalize(&[3.0, 4.0]);
        assert_relative_eq!(magnitude(&v), 1.0, epsilon = 1e-6);
        assert_relative_eq!(v[0], 0.6, epsilon = 1e-6);

        let zero = normalize(&[0.0, 0.0]);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_optimal_ef() {
        assert_eq!(optimal_ef(10, 50), 50);
        assert_eq!(optimal_ef(100, 50), 150);
        assert_eq!(optimal_ef(33, 10), 50);
        assert_eq!(optimal_ef(0, 50), 50);
    }
}
