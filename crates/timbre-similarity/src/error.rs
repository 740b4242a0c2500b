//! Error types for the similarity pipeline.

use thiserror::Error;
use timbre_core::model::NodeId;

/// Errors raised while building or querying the similarity graph.
#[derive(Debug, Error)]
pub enum SimilarityError {
    /// Two feature vectors (or a record and the configured schema) disagree
    /// on which attributes they carry.
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// Two vectors handed to the scorer have different lengths.
    #[error("dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    /// A sample asked for more items than the population holds.
    #[error("insufficient population: requested {requested}, available {available}")]
    InsufficientPopulation { requested: usize, available: usize },

    /// An attribute has zero variance (`max == min`).
    #[error("degenerate range for {attribute}: min == max == {value}")]
    DegenerateRange { attribute: String, value: f64 },

    /// The distance between two vectors overflowed or is otherwise not a
    /// finite number.
    #[error("non-finite distance: {distance}")]
    NonFiniteDistance { distance: f64 },

    /// A track referenced by the sample no longer exists.
    #[error("track not found: {id}")]
    NotFound { id: NodeId },

    /// An error propagated from the storage layer.
    #[error("storage error: {0}")]
    Store(#[from] timbre_core::Error),

    /// The request or configuration cannot be acted on.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The run was cancelled before completion.
    #[error("run cancelled")]
    Cancelled,
}

impl SimilarityError {
    /// Returns `true` when the error must abort the whole run rather than
    /// just the pair under consideration: the store is unreachable, or the
    /// run was cancelled.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Store(e) => e.is_retryable(),
            Self::Cancelled => true,
            _ => false,
        }
    }

    /// Returns `true` when a retry of the run may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_retryable())
    }

    pub(crate) fn schema(message: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
        }
    }
}

/// Convenience alias for similarity results.
pub type SimilarityResult<T> = std::result::Result<T, SimilarityError>;
