//! Distance and similarity scoring between feature vectors.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{SimilarityError, SimilarityResult};
use crate::features::FeatureVector;
use crate::normalize::FeatureRanges;

/// How a pair's score is derived from its Euclidean distance, and which
/// direction counts as "more similar".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPolicy {
    /// The score is the distance itself; smaller is more similar.
    RawDistance,
    /// The score is `1 / (1 + d)` in `(0, 1]`; larger is more similar.
    #[default]
    BoundedSimilarity,
}

impl ScoringPolicy {
    /// Convert a distance into a score under this policy.
    #[must_use]
    pub fn from_distance(self, distance: f64) -> f64 {
        match self {
            Self::RawDistance => distance,
            Self::BoundedSimilarity => 1.0 / (1.0 + distance),
        }
    }

    /// Whether `score` qualifies against `threshold`: at or above it for
    /// bounded similarity, at or below it for raw distance.
    #[must_use]
    pub fn passes(self, score: f64, threshold: f64) -> bool {
        match self {
            Self::RawDistance => score <= threshold,
            Self::BoundedSimilarity => score >= threshold,
        }
    }

    /// Order two scores best-first.
    #[must_use]
    pub fn rank(self, a: f64, b: f64) -> Ordering {
        match self {
            Self::RawDistance => a.total_cmp(&b),
            Self::BoundedSimilarity => b.total_cmp(&a),
        }
    }

    /// Whether `a` is strictly better than `b`.
    #[must_use]
    pub fn is_better(self, a: f64, b: f64) -> bool {
        self.rank(a, b) == Ordering::Less
    }
}

/// Per-attribute weighting inside the distance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Weighting {
    /// Plain Euclidean distance.
    #[default]
    Uniform,
    /// Each squared difference is divided by its attribute's range squared,
    /// normalizing inside the distance instead of before it.
    RangeScaled,
}

/// Euclidean distance between two equal-length slices.
pub fn euclidean(a: &[f64], b: &[f64]) -> SimilarityResult<f64> {
    if a.len() != b.len() {
        return Err(SimilarityError::DimensionMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt())
}

/// Scores pairs of feature vectors under a policy and weighting.
#[derive(Debug, Clone)]
pub struct Scorer {
    policy: ScoringPolicy,
    weighting: Weighting,
    ranges: Option<FeatureRanges>,
}

impl Scorer {
    #[must_use]
    pub const fn new(policy: ScoringPolicy) -> Self {
        Self {
            policy,
            weighting: Weighting::Uniform,
            ranges: None,
        }
    }

    /// Weight each attribute by the inverse of its squared range.
    #[must_use]
    pub fn range_scaled(mut self, ranges: FeatureRanges) -> Self {
        self.weighting = Weighting::RangeScaled;
        self.ranges = Some(ranges);
        self
    }

    #[must_use]
    pub const fn policy(&self) -> ScoringPolicy {
        self.policy
    }

    #[must_use]
    pub const fn weighting(&self) -> Weighting {
        self.weighting
    }

    pub fn distance(&self, a: &FeatureVector, b: &FeatureVector) -> SimilarityResult<f64> {
        if a.len() != b.len() {
            return Err(SimilarityError::DimensionMismatch {
                left: a.len(),
                right: b.len(),
            });
        }
        a.ensure_aligned(b)?;

        match (self.weighting, &self.ranges) {
            (Weighting::RangeScaled, Some(ranges)) => {
                let mut sum = 0.0;
                for ((key, x), y) in a.iter().zip(b.values()) {
                    let range = ranges.get(key).ok_or_else(|| {
                        SimilarityError::schema(format!("no range for attribute {key}"))
                    })?;
                    // Zero-variance attributes cannot separate tracks
                    if !range.is_degenerate() {
                        sum += (x - y).powi(2) / range.span().powi(2);
                    }
                }
                Ok(sum.sqrt())
            }
            _ => euclidean(a.values(), b.values()),
        }
    }

    /// Score a pair. A distance that overflows to infinity is an error for
    /// this pair rather than a score at the far end of the scale.
    pub fn score(&self, a: &FeatureVector, b: &FeatureVector) -> SimilarityResult<f64> {
        let distance = self.distance(a, b)?;
        if !distance.is_finite() {
            return Err(SimilarityError::NonFiniteDistance { distance });
        }
        Ok(self.policy.from_distance(distance))
    }
}
