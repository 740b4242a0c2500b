//! Min-max normalization of feature vectors.
//!
//! Ranges are computed over a population snapshot and applied to produce
//! new, normalized vectors. Stored attribute values are never rewritten, so
//! normalizing twice yields the same result as normalizing once.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use timbre_core::model::Aggregate;
use timbre_core::GraphStore;

use crate::error::{SimilarityError, SimilarityResult};
use crate::features::FeatureVector;

/// Value returned for an attribute with zero variance (`max == min`).
pub const DEGENERATE_FALLBACK: f64 = 0.0;

/// Observed `(min, max)` of one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRange {
    pub min: f64,
    pub max: f64,
}

impl FeatureRange {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.span() <= 0.0
    }

    /// Rescale `value` into `[0, 1]`, failing on a degenerate range.
    pub fn try_normalize(&self, attribute: &str, value: f64) -> SimilarityResult<f64> {
        if self.is_degenerate() {
            return Err(SimilarityError::DegenerateRange {
                attribute: attribute.to_string(),
                value: self.min,
            });
        }
        Ok(((value - self.min) / self.span()).clamp(0.0, 1.0))
    }

    /// Rescale `value` into `[0, 1]`. Degenerate ranges map every value to
    /// [`DEGENERATE_FALLBACK`]; values outside the range are clamped.
    #[must_use]
    pub fn normalize(&self, value: f64) -> f64 {
        if self.is_degenerate() {
            DEGENERATE_FALLBACK
        } else {
            ((value - self.min) / self.span()).clamp(0.0, 1.0)
        }
    }

    fn include(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

/// `(value - min) / (max - min)`, or [`DEGENERATE_FALLBACK`] when `max == min`.
#[must_use]
pub fn normalize(value: f64, range: &FeatureRange) -> f64 {
    range.normalize(value)
}

/// Per-attribute ranges for one normalization pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRanges {
    ranges: BTreeMap<String, FeatureRange>,
}

impl FeatureRanges {
    /// Issue one MIN and one MAX aggregate per attribute over every node
    /// with `label`. Attributes no node carries are left out.
    pub fn compute<S: GraphStore + ?Sized>(
        store: &S,
        label: &str,
        attributes: &[String],
    ) -> SimilarityResult<Self> {
        let mut ranges = BTreeMap::new();
        for attribute in attributes {
            let min = store.aggregate(label, attribute, Aggregate::Min)?;
            let max = store.aggregate(label, attribute, Aggregate::Max)?;
            match (min, max) {
                (Some(min), Some(max)) => {
                    let range = FeatureRange::new(min, max);
                    if range.is_degenerate() {
                        log::debug!(
                            "Attribute {attribute} has zero variance ({min}); normalizing to {DEGENERATE_FALLBACK}"
                        );
                    }
                    ranges.insert(attribute.clone(), range);
                }
                _ => log::debug!("No numeric values for {attribute} on {label} nodes"),
            }
        }
        Ok(Self { ranges })
    }

    /// Compute ranges from an already-fetched population.
    #[must_use]
    pub fn from_vectors<'a>(vectors: impl IntoIterator<Item = &'a FeatureVector>) -> Self {
        let mut ranges: BTreeMap<String, FeatureRange> = BTreeMap::new();
        for vector in vectors {
            for (key, value) in vector.iter() {
                ranges
                    .entry(key.to_string())
                    .and_modify(|r| r.include(value))
                    .or_insert_with(|| FeatureRange::new(value, value));
            }
        }
        Self { ranges }
    }

    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&FeatureRange> {
        self.ranges.get(attribute)
    }

    pub fn insert(&mut self, attribute: impl Into<String>, range: FeatureRange) {
        self.ranges.insert(attribute.into(), range);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureRange)> {
        self.ranges.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// A normalized copy of `vector`. Every attribute must have a range.
    pub fn normalize_vector(&self, vector: &FeatureVector) -> SimilarityResult<FeatureVector> {
        let values = vector
            .iter()
            .map(|(key, value)| {
                self.get(key)
                    .map(|range| range.normalize(value))
                    .ok_or_else(|| SimilarityError::schema(format!("no range for attribute {key}")))
            })
            .collect::<SimilarityResult<Vec<_>>>()?;
        Ok(vector.with_values(values))
    }
}
