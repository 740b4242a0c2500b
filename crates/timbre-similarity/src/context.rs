//! Per-run context.
//!
//! Each run gets a fresh [`RunContext`]: an immutable snapshot of its
//! configuration, a run id, and a cancellation token. Nothing accumulates
//! across runs.

use tokio_util::sync::CancellationToken;

use timbre_core::model::RunId;

use crate::config::SimilarityConfig;
use crate::error::{SimilarityError, SimilarityResult};
use crate::features::FeatureExtractor;
use crate::sample::SampleRequest;

#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: RunId,
    config: SimilarityConfig,
    cancel: CancellationToken,
}

impl RunContext {
    /// Validate `config` and start a new run.
    pub fn new(config: SimilarityConfig) -> SimilarityResult<Self> {
        config.validate()?;
        Ok(Self {
            run_id: RunId::new(),
            config,
            cancel: CancellationToken::new(),
        })
    }

    /// Observe `token` instead of a private one, so a caller (signal
    /// handler, timeout) can abort the run.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    #[must_use]
    pub const fn config(&self) -> &SimilarityConfig {
        &self.config
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn check_cancelled(&self) -> SimilarityResult<()> {
        if self.is_cancelled() {
            Err(SimilarityError::Cancelled)
        } else {
            Ok(())
        }
    }

    #[must_use]
    pub fn sample_request(&self) -> SampleRequest {
        SampleRequest {
            strategy: self.config.strategy,
            label: self.config.track_label.clone(),
            seed_artist: self.config.seed_artist.clone(),
            sample_size: self.config.sample_size,
        }
    }

    #[must_use]
    pub fn extractor(&self) -> FeatureExtractor {
        let extractor = FeatureExtractor::new(self.config.explicit);
        match &self.config.features {
            Some(features) => extractor.with_schema(features),
            None => extractor,
        }
    }
}
