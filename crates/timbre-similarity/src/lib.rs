//! Similarity-graph construction and recommendation for timbre.
//!
//! The pipeline samples track pairs from a [`GraphStore`](timbre_core::GraphStore),
//! projects each track onto a numeric feature vector, optionally rescales
//! features to `[0, 1]`, scores each pair, and writes qualifying pairs back
//! as `MATCHED` edges. The [`Recommender`] answers top-K queries over those
//! edges.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod config;
pub mod context;
pub mod error;
pub mod features;
pub mod materialize;
pub mod normalize;
pub mod pipeline;
pub mod recommend;
pub mod sample;
pub mod score;

pub use config::{Config, SimilarityConfig};
pub use context::RunContext;
pub use error::{SimilarityError, SimilarityResult};
pub use features::{ExplicitPolicy, FeatureExtractor, FeatureVector};
pub use materialize::{Materializer, WritePolicy};
pub use normalize::{FeatureRange, FeatureRanges};
pub use pipeline::{RunSummary, SimilarityPipeline};
pub use recommend::{Recommendation, Recommender};
pub use sample::{Sample, SamplePool, SampleRequest, SampleStrategy, Sampler};
pub use score::{Scorer, ScoringPolicy, Weighting};
