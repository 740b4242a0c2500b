//! The build pipeline: sample, extract, normalize, score, materialize.
//!
//! Store reads and writes happen on the calling thread. Feature vectors are
//! fetched once per sampled node before any scoring, and pair scoring runs
//! in parallel over those in-memory vectors. Edges are written back
//! sequentially.

use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use timbre_core::model::{NodeId, RunId};
use timbre_core::GraphStore;

use crate::context::RunContext;
use crate::error::{SimilarityError, SimilarityResult};
use crate::features::{FeatureExtractor, FeatureVector};
use crate::materialize::Materializer;
use crate::normalize::FeatureRanges;
use crate::sample::{SampleStrategy, Sampler};
use crate::score::{Scorer, Weighting};

/// Counts reported at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub pairs_considered: usize,
    pub edges_created: usize,
    pub edges_updated: usize,
    pub below_threshold: usize,
    pub errors_skipped: usize,
    pub cancelled: bool,
}

impl RunSummary {
    fn new(run_id: RunId) -> Self {
        Self {
            run_id,
            pairs_considered: 0,
            edges_created: 0,
            edges_updated: 0,
            below_threshold: 0,
            errors_skipped: 0,
            cancelled: false,
        }
    }

    /// Edges written this run, created or updated.
    #[must_use]
    pub const fn edges_written(&self) -> usize {
        self.edges_created + self.edges_updated
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run {}: {} pairs, {} created, {} updated, {} below threshold, {} skipped",
            self.run_id,
            self.pairs_considered,
            self.edges_created,
            self.edges_updated,
            self.below_threshold,
            self.errors_skipped
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

/// One run of the similarity pipeline.
#[derive(Debug)]
pub struct SimilarityPipeline {
    ctx: RunContext,
}

impl SimilarityPipeline {
    #[must_use]
    pub const fn new(ctx: RunContext) -> Self {
        Self { ctx }
    }

    #[must_use]
    pub const fn context(&self) -> &RunContext {
        &self.ctx
    }

    /// Run every stage against `store`.
    ///
    /// Per-pair failures are logged and counted in
    /// [`RunSummary::errors_skipped`]. Store connection failures abort the
    /// run. Cancellation stops the run between stages or between writes and
    /// returns the partial summary with `cancelled` set.
    pub fn run<S: GraphStore + ?Sized>(&self, store: &mut S) -> SimilarityResult<RunSummary> {
        let config = self.ctx.config();
        let mut summary = RunSummary::new(self.ctx.run_id());
        log::info!(
            "Starting similarity run {} ({:?}, sample size {})",
            summary.run_id,
            config.strategy,
            config.sample_size
        );

        match self.execute(store, &mut summary) {
            Ok(()) => {
                log::info!("Finished {summary}");
                Ok(summary)
            }
            Err(SimilarityError::Cancelled) => {
                log::warn!("Run {} cancelled", summary.run_id);
                summary.cancelled = true;
                Ok(summary)
            }
            Err(e) => Err(e),
        }
    }

    fn execute<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        summary: &mut RunSummary,
    ) -> SimilarityResult<()> {
        self.ctx.check_cancelled()?;

        let mut sampler = Sampler::new(self.ctx.config().rng_seed);
        let sample = sampler.sample(store, &self.ctx.sample_request())?;
        let pairs = sample.pairs();
        log::info!("Sampled {} pairs", pairs.len());
        self.ctx.check_cancelled()?;

        let vectors = self.load_vectors(store, &sample.node_ids())?;
        let (vectors, scorer) = self.prepare(store, vectors)?;
        self.ctx.check_cancelled()?;

        let scored: Vec<((NodeId, NodeId), Option<SimilarityResult<f64>>)> = pairs
            .par_iter()
            .map(|&(a, b)| {
                let score = match (vectors.get(&a), vectors.get(&b)) {
                    (Some(va), Some(vb)) => Some(scorer.score(va, vb)),
                    _ => None,
                };
                ((a, b), score)
            })
            .collect();

        self.write(store, scored, summary)
    }

    /// Extract one vector per sampled node. Nodes that cannot be read or
    /// projected are logged and left out, which skips every pair they are
    /// part of.
    fn load_vectors<S: GraphStore + ?Sized>(
        &self,
        store: &S,
        ids: &BTreeSet<NodeId>,
    ) -> SimilarityResult<BTreeMap<NodeId, FeatureVector>> {
        let extractor = self.ctx.extractor();
        let mut vectors = BTreeMap::new();
        for &id in ids {
            self.ctx.check_cancelled()?;
            match extract(store, &extractor, id) {
                Ok(vector) => {
                    vectors.insert(id, vector);
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => log::warn!("Skipping track {id}: {e}"),
            }
        }
        log::debug!("Extracted {} of {} feature vectors", vectors.len(), ids.len());
        Ok(vectors)
    }

    /// Normalize vectors and build the scorer. Ranges come from the whole
    /// labelled population, not just the sample.
    fn prepare<S: GraphStore + ?Sized>(
        &self,
        store: &S,
        vectors: BTreeMap<NodeId, FeatureVector>,
    ) -> SimilarityResult<(BTreeMap<NodeId, FeatureVector>, Scorer)> {
        let config = self.ctx.config();
        let scorer = Scorer::new(config.scoring_policy);
        let range_scaled = config.weighting == Weighting::RangeScaled;
        if !config.normalize && !range_scaled {
            return Ok((vectors, scorer));
        }

        let attributes: Vec<String> = match &config.features {
            Some(features) => features.clone(),
            None => vectors
                .values()
                .flat_map(|v| v.keys().iter().cloned())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };
        let ranges = FeatureRanges::compute(store, &config.track_label, &attributes)?;
        log::debug!("Computed ranges for {} attributes", ranges.len());

        if range_scaled {
            return Ok((vectors, scorer.range_scaled(ranges)));
        }

        let mut normalized = BTreeMap::new();
        for (id, vector) in vectors {
            match ranges.normalize_vector(&vector) {
                Ok(v) => {
                    normalized.insert(id, v);
                }
                Err(e) => log::warn!("Skipping track {id}: {e}"),
            }
        }
        Ok((normalized, scorer))
    }

    /// Global pairs are unordered, so their matches are written in both
    /// directions; seed-vs-random matches go from seed to candidate.
    fn write<S: GraphStore + ?Sized>(
        &self,
        store: &mut S,
        scored: Vec<((NodeId, NodeId), Option<SimilarityResult<f64>>)>,
        summary: &mut RunSummary,
    ) -> SimilarityResult<()> {
        let config = self.ctx.config();
        let mut materializer = Materializer::new(
            store,
            config.scoring_policy,
            config.threshold,
            config.write_policy,
            summary.run_id,
        )
        .symmetric(config.strategy == SampleStrategy::GlobalPairs);

        for ((a, b), score) in scored {
            self.ctx.check_cancelled()?;
            summary.pairs_considered += 1;

            let score = match score {
                Some(Ok(score)) => score,
                Some(Err(e)) => {
                    log::warn!("Skipping pair {a} -> {b}: {e}");
                    summary.errors_skipped += 1;
                    continue;
                }
                // An endpoint was already skipped during extraction
                None => {
                    summary.errors_skipped += 1;
                    continue;
                }
            };

            match materializer.record_pair(a, b, score) {
                Ok(edges) if edges.is_empty() => summary.below_threshold += 1,
                Ok(edges) => {
                    for edge in edges {
                        if edge.created {
                            summary.edges_created += 1;
                        } else {
                            summary.edges_updated += 1;
                        }
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    log::warn!("Failed to write pair {a} -> {b}: {e}");
                    summary.errors_skipped += 1;
                }
            }
        }
        Ok(())
    }
}

fn extract<S: GraphStore + ?Sized>(
    store: &S,
    extractor: &FeatureExtractor,
    id: NodeId,
) -> SimilarityResult<FeatureVector> {
    let node = store.get_node(id).map_err(|e| match e {
        timbre_core::Error::NotFound { .. } => SimilarityError::NotFound { id },
        other => other.into(),
    })?;
    extractor.extract(&node.properties)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimilarityConfig;
    use crate::score::ScoringPolicy;
    use timbre_core::model::track::{MATCHED_LABEL, TRACK_LABEL};
    use timbre_core::props;
    use timbre_graph::MemoryGraph;

    fn catalog(tempos: &[f64]) -> MemoryGraph {
        let mut graph = MemoryGraph::new();
        for (i, tempo) in tempos.iter().enumerate() {
            graph
                .create_node(
                    TRACK_LABEL,
                    props! {
                        "name" => format!("t{i}"),
                        "artist" => format!("a{i}"),
                        "tempo" => *tempo,
                    },
                )
                .unwrap();
        }
        graph
    }

    fn global(sample_size: usize) -> SimilarityConfig {
        SimilarityConfig {
            strategy: SampleStrategy::GlobalPairs,
            sample_size,
            features: Some(vec!["tempo".to_string()]),
            rng_seed: Some(7),
            ..SimilarityConfig::default()
        }
    }

    #[test]
    fn test_every_pair_is_accounted_for() {
        let mut graph = catalog(&[90.0, 100.0, 120.0, 180.0]);
        let ctx = RunContext::new(global(6)).unwrap();
        let summary = SimilarityPipeline::new(ctx).run(&mut graph).unwrap();

        // Unordered pairs are matched in both directions
        assert_eq!(summary.pairs_considered, 6);
        assert_eq!(summary.edges_created % 2, 0);
        assert_eq!(
            summary.edges_created / 2 + summary.below_threshold + summary.errors_skipped,
            6
        );
        assert_eq!(summary.edges_updated, 0);
        assert_eq!(graph.count_edges(MATCHED_LABEL).unwrap(), summary.edges_created);
        assert!(!summary.cancelled);
    }

    #[test]
    fn test_unreadable_track_skips_its_pairs() {
        let mut graph = catalog(&[90.0, 100.0]);
        graph
            .create_node(TRACK_LABEL, props! { "name" => "silent", "artist" => "x" })
            .unwrap();
        let ctx = RunContext::new(global(3)).unwrap();
        let summary = SimilarityPipeline::new(ctx).run(&mut graph).unwrap();

        assert_eq!(summary.pairs_considered, 3);
        assert_eq!(summary.errors_skipped, 2);
    }

    #[test]
    fn test_raw_distance_without_normalization() {
        let mut graph = catalog(&[100.0, 100.5, 140.0]);
        let config = SimilarityConfig {
            scoring_policy: ScoringPolicy::RawDistance,
            threshold: 1.0,
            normalize: false,
            ..global(3)
        };
        let summary = SimilarityPipeline::new(RunContext::new(config).unwrap())
            .run(&mut graph)
            .unwrap();
        assert_eq!(summary.edges_created, 2);
        assert_eq!(summary.below_threshold, 2);
    }

    #[test]
    fn test_range_scaled_weighting() {
        let mut graph = catalog(&[0.0, 10.0, 100.0]);
        let config = SimilarityConfig {
            scoring_policy: ScoringPolicy::RawDistance,
            threshold: 0.2,
            normalize: false,
            weighting: Weighting::RangeScaled,
            ..global(3)
        };
        let summary = SimilarityPipeline::new(RunContext::new(config).unwrap())
            .run(&mut graph)
            .unwrap();
        // Only 0 vs 10 is within a fifth of the full range
        assert_eq!(summary.edges_created, 2);
        assert_eq!(summary.below_threshold, 2);
    }

    #[test]
    fn test_cancelled_before_start_writes_nothing() {
        let mut graph = catalog(&[90.0, 100.0, 120.0]);
        let ctx = RunContext::new(global(3)).unwrap();
        ctx.cancellation_token().cancel();
        let summary = SimilarityPipeline::new(ctx).run(&mut graph).unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.pairs_considered, 0);
        assert_eq!(graph.count_edges(MATCHED_LABEL).unwrap(), 0);
    }

    #[test]
    fn test_insufficient_population_is_an_error() {
        let mut graph = catalog(&[90.0, 100.0]);
        let ctx = RunContext::new(global(5)).unwrap();
        let result = SimilarityPipeline::new(ctx).run(&mut graph);
        assert!(matches!(
            result,
            Err(SimilarityError::InsufficientPopulation { requested: 5, available: 1 })
        ));
    }

    #[test]
    fn test_summary_display() {
        let mut summary = RunSummary::new(RunId::new());
        summary.pairs_considered = 3;
        summary.edges_created = 2;
        summary.below_threshold = 1;
        let text = summary.to_string();
        assert!(text.contains("3 pairs, 2 created, 0 updated, 1 below threshold"));
        assert!(!text.contains("cancelled"));
        assert_eq!(summary.edges_written(), 2);
    }
}
