//! Projection of track records onto numeric feature vectors.
//!
//! Keys are visited in canonical (sorted) order, so two records with the
//! same schema always yield vectors with identical dimension ordering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use timbre_core::model::track::{CATEGORICAL_ATTRIBUTES, EXPLICIT};
use timbre_core::model::{PropertyMap, PropertyValue};

use crate::error::{SimilarityError, SimilarityResult};

/// How the boolean `explicit` attribute takes part in similarity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplicitPolicy {
    /// Encode as 1.0 / 0.0.
    #[default]
    Encode,
    /// Treat as non-comparable and drop it.
    Exclude,
}

/// An ordered numeric projection of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    keys: Vec<String>,
    values: Vec<f64>,
}

impl FeatureVector {
    /// Build a vector from `(key, value)` pairs, already in canonical order.
    #[must_use]
    pub fn from_pairs<K: Into<String>>(pairs: impl IntoIterator<Item = (K, f64)>) -> Self {
        let (keys, values) = pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        Self { keys, values }
    }

    #[must_use]
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<f64> {
        self.keys
            .iter()
            .position(|k| k == key)
            .map(|idx| self.values[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.keys
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Fail with `SchemaMismatch` unless both vectors carry the same keys
    /// in the same order.
    pub fn ensure_aligned(&self, other: &Self) -> SimilarityResult<()> {
        if self.keys == other.keys {
            return Ok(());
        }
        let ours: BTreeSet<&str> = self.keys.iter().map(String::as_str).collect();
        let theirs: BTreeSet<&str> = other.keys.iter().map(String::as_str).collect();
        let only_left: Vec<&str> = ours.difference(&theirs).copied().collect();
        let only_right: Vec<&str> = theirs.difference(&ours).copied().collect();
        Err(SimilarityError::schema(format!(
            "vectors disagree on attributes (left only: {only_left:?}, right only: {only_right:?})"
        )))
    }

    pub(crate) fn with_values(&self, values: Vec<f64>) -> Self {
        Self {
            keys: self.keys.clone(),
            values,
        }
    }
}

/// Turns raw track records into [`FeatureVector`]s.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    denylist: BTreeSet<String>,
    schema: Option<Vec<String>>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(ExplicitPolicy::default())
    }
}

impl FeatureExtractor {
    /// An extractor that infers the schema from each record, dropping the
    /// categorical attributes.
    #[must_use]
    pub fn new(explicit: ExplicitPolicy) -> Self {
        let mut denylist: BTreeSet<String> =
            CATEGORICAL_ATTRIBUTES.iter().map(|k| (*k).to_string()).collect();
        if explicit == ExplicitPolicy::Exclude {
            denylist.insert(EXPLICIT.to_string());
        }
        Self {
            denylist,
            schema: None,
        }
    }

    /// Require exactly these attributes. A record missing one, or carrying
    /// a non-numeric value for one, fails with `SchemaMismatch`.
    #[must_use]
    pub fn with_schema<S: AsRef<str>>(mut self, keys: &[S]) -> Self {
        let schema: BTreeSet<String> = keys
            .iter()
            .map(|k| k.as_ref().to_string())
            .filter(|k| !self.denylist.contains(k))
            .collect();
        self.schema = Some(schema.into_iter().collect());
        self
    }

    /// The fixed schema, if one was configured.
    #[must_use]
    pub fn schema(&self) -> Option<&[String]> {
        self.schema.as_deref()
    }

    pub fn extract(&self, record: &PropertyMap) -> SimilarityResult<FeatureVector> {
        match &self.schema {
            Some(schema) => schema
                .iter()
                .map(|key| {
                    let value = record
                        .get(key)
                        .ok_or_else(|| SimilarityError::schema(format!("missing attribute {key}")))?;
                    encode(value)
                        .map(|v| (key.as_str(), v))
                        .ok_or_else(|| {
                            SimilarityError::schema(format!("attribute {key} is not numeric"))
                        })
                })
                .collect::<SimilarityResult<Vec<_>>>()
                .map(FeatureVector::from_pairs),
            None => Ok(FeatureVector::from_pairs(
                record
                    .iter()
                    .filter(|(key, _)| !self.denylist.contains(*key))
                    .filter_map(|(key, value)| encode(value).map(|v| (key.as_str(), v))),
            )),
        }
    }
}

fn encode(value: &PropertyValue) -> Option<f64> {
    value.as_scalar().filter(|v| v.is_finite())
}
