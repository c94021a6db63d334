//! Normalized similarity between embeddings.
//!
//! The score is `1 - d / sqrt(D)` where `d` is the Euclidean distance and
//! `D` the dimension. `sqrt(D)` is a heuristic upper bound (the distance
//! between opposite corners of the unit hypercube), not a true maximum, so
//! the raw score is unbounded below. The raw score is canonical: it is what
//! thresholds are compared against and what results are ranked by. The
//! percentage is a clamped display form derived from it.

use crate::distance::{calculate_distance, DistanceMetric};
use crate::error::{WitnessError, WitnessResult};
use crate::vector::Embedding;

/// Raw normalized similarity in `(-inf, 1]`; `1.0` means identical.
///
/// Fails with `DimensionMismatch` when the lengths differ and with
/// `InvalidArgument` for zero-length vectors.
pub fn similarity(a: &Embedding, b: &Embedding) -> WitnessResult<f32> {
    if a.len() != b.len() {
        return Err(WitnessError::DimensionMismatch { expected: a.len(), actual: b.len() });
    }
    if a.is_empty() {
        return Err(WitnessError::InvalidArgument("Cannot score zero-dimension vectors".to_string()));
    }
    let distance = calculate_distance(DistanceMetric::Euclidean, a.view(), b.view())?;
    Ok(similarity_from_distance(distance, a.len()))
}

/// Maps a Euclidean distance in dimension `dimensions` to the raw score.
#[inline]
pub fn similarity_from_distance(distance: f32, dimensions: usize) -> f32 {
    let max_distance = (dimensions as f32).sqrt();
    1.0 - distance / max_distance
}

/// Display form of a raw score: clamped to `[0, 100]`, two decimals.
pub fn similarity_percentage(raw: f32) -> f32 {
    let pct = (raw.clamp(0.0, 1.0)) * 100.0;
    (pct * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(v: &[f32]) -> Embedding {
        Embedding::from(v.to_vec())
    }

    #[test]
    fn test_identical_vectors_score_one() {
        let a = emb(&[0.3, -0.7, 0.1, 0.9]);
        assert!((similarity(&a, &a).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_symmetry() {
        let a = emb(&[1.0, 0.2, -0.4]);
        let b = emb(&[-0.5, 0.9, 0.0]);
        assert_eq!(similarity(&a, &b).unwrap(), similarity(&b, &a).unwrap());
    }

    #[test]
    fn test_orthogonal_unit_vectors() {
        let a = emb(&[1.0, 0.0, 0.0]);
        let b = emb(&[0.0, 1.0, 0.0]);
        let expected = 1.0 - 2.0f32.sqrt() / 3.0f32.sqrt();
        let score = similarity(&a, &b).unwrap();
        assert!((score - expected).abs() < 1e-6);
        assert!((score - 0.1835).abs() < 1e-3);
    }

    #[test]
    fn test_monotonically_decreasing_in_distance() {
        let origin = emb(&[0.0, 0.0]);
        let mut previous = f32::INFINITY;
        for step in 0..10 {
            let x = step as f32 * 0.25;
            let score = similarity(&origin, &emb(&[x, 0.0])).unwrap();
            assert!(score < previous, "score {} at x={} should be below {}", score, x, previous);
            previous = score;
        }
    }

    #[test]
    fn test_raw_score_can_go_negative() {
        let a = emb(&[5.0, 5.0]);
        let b = emb(&[-5.0, -5.0]);
        let raw = similarity(&a, &b).unwrap();
        assert!(raw < 0.0);
        assert_eq!(similarity_percentage(raw), 0.0);
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        let a = emb(&[1.0, 0.0]);
        let b = emb(&[1.0, 0.0, 0.0]);
        assert!(matches!(
            similarity(&a, &b),
            Err(WitnessError::DimensionMismatch { expected: 2, actual: 3 })
        ));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        let a = emb(&[]);
        assert!(matches!(similarity(&a, &a), Err(WitnessError::InvalidArgument(_))));
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(similarity_percentage(1.0), 100.0);
        assert_eq!(similarity_percentage(0.18350342), 18.35);
        assert_eq!(similarity_percentage(0.876543), 87.65);
    }
}
