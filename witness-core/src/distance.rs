//! Defines distance metrics for comparing vectors.

use ndarray::ArrayView1;
use serde::{Serialize, Deserialize};
use crate::error::{WitnessError, WitnessResult};

/// Enum representing supported distance metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Euclidean (L2) distance. Lower values mean more similar.
    #[default]
    Euclidean,
    /// Cosine similarity. Higher values mean more similar, range [-1, 1].
    Cosine,
}

impl std::str::FromStr for DistanceMetric {
    type Err = WitnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            "cosine" => Ok(DistanceMetric::Cosine),
            other => Err(WitnessError::InvalidArgument(format!("Unknown distance metric '{}'", other))),
        }
    }
}

/// Calculates the distance/similarity between two vectors based on the specified metric.
///
/// Returns `WitnessError::DimensionMismatch` if vectors have different lengths.
///
/// # Notes
/// - Euclidean returns *distance* (lower is better, range [0, inf)).
/// - Cosine returns *similarity* (higher is better, range [-1, 1]).
pub fn calculate_distance(
    metric: DistanceMetric,
    v1: ArrayView1<f32>,
    v2: ArrayView1<f32>,
) -> WitnessResult<f32> {
    if v1.len() != v2.len() {
        return Err(WitnessError::DimensionMismatch {
            expected: v1.len(),
            actual: v2.len(),
        });
    }

    match metric {
        DistanceMetric::Euclidean => {
            let diff = &v1 - &v2;
            Ok(diff.dot(&diff).sqrt())
        }
        DistanceMetric::Cosine => {
            let dot_product = v1.dot(&v2);
            let norm_v1 = v1.dot(&v1).sqrt();
            let norm_v2 = v2.dot(&v2).sqrt();

            if norm_v1 == 0.0 || norm_v2 == 0.0 {
                // Cosine is undefined for zero vectors
                Ok(0.0)
            } else {
                Ok((dot_product / (norm_v1 * norm_v2)).clamp(-1.0, 1.0))
            }
        }
    }
}
