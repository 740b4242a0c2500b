//! Selection of the track pairs a run compares.
//!
//! Comparing every track against every other track is quadratic in the
//! catalog size. Both strategies here bound the work by a sample size:
//!
//! - [`SampleStrategy::SeedVsRandom`] compares the seed artist's tracks
//!   against `N` random other tracks (`|seeds| × N` pairs).
//! - [`SampleStrategy::GlobalPairs`] draws `N` random unordered pairs from
//!   the whole catalog. The pair space is `n(n-1)/2`; pairs are drawn by rank
//!   so it is never materialized, but its size still caps how far this
//!   strategy scales.

use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use timbre_core::model::track::ARTIST;
use timbre_core::model::{NodeId, PropertyValue};
use timbre_core::GraphStore;

use crate::error::{SimilarityError, SimilarityResult};

/// Pair spaces above this size get a warning in the log.
pub const LARGE_PAIR_SPACE: usize = 50_000_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStrategy {
    #[default]
    SeedVsRandom,
    GlobalPairs,
}

/// What to sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRequest {
    pub strategy: SampleStrategy,
    /// Node label of the track population.
    pub label: String,
    /// Artist whose tracks form the seed set. Required for `SeedVsRandom`.
    pub seed_artist: Option<String>,
    /// Candidates for `SeedVsRandom`, pairs for `GlobalPairs`.
    pub sample_size: usize,
}

/// Disjoint seed and candidate sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplePool {
    pub seeds: Vec<NodeId>,
    pub candidates: Vec<NodeId>,
}

impl SamplePool {
    /// Every seed × candidate pair, seed first.
    pub fn pairs(&self) -> impl Iterator<Item = (NodeId, NodeId)> + '_ {
        self.seeds
            .iter()
            .flat_map(move |s| self.candidates.iter().map(move |c| (*s, *c)))
    }
}

/// The outcome of sampling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sample {
    Pool(SamplePool),
    Pairs(Vec<(NodeId, NodeId)>),
}

impl Sample {
    /// The ordered pairs to compare; the first element is the edge source.
    #[must_use]
    pub fn pairs(&self) -> Vec<(NodeId, NodeId)> {
        match self {
            Self::Pool(pool) => pool.pairs().collect(),
            Self::Pairs(pairs) => pairs.clone(),
        }
    }

    /// Every distinct node the pairs touch.
    #[must_use]
    pub fn node_ids(&self) -> BTreeSet<NodeId> {
        match self {
            Self::Pool(pool) => pool.seeds.iter().chain(&pool.candidates).copied().collect(),
            Self::Pairs(pairs) => pairs.iter().flat_map(|(a, b)| [*a, *b]).collect(),
        }
    }

    #[must_use]
    pub fn pair_count(&self) -> usize {
        match self {
            Self::Pool(pool) => pool.seeds.len() * pool.candidates.len(),
            Self::Pairs(pairs) => pairs.len(),
        }
    }
}

/// Draws samples from a store with a seedable random source.
#[derive(Debug)]
pub struct Sampler {
    rng: ChaCha8Rng,
}

impl Sampler {
    /// A sampler seeded with `seed` for reproducible draws, or from OS
    /// entropy when `None`.
    #[must_use]
    pub fn new(seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(ChaCha8Rng::from_entropy, ChaCha8Rng::seed_from_u64);
        Self { rng }
    }

    pub fn sample<S: GraphStore + ?Sized>(
        &mut self,
        store: &S,
        request: &SampleRequest,
    ) -> SimilarityResult<Sample> {
        match request.strategy {
            SampleStrategy::SeedVsRandom => self.seed_vs_random(store, request).map(Sample::Pool),
            SampleStrategy::GlobalPairs => self.global_pairs(store, request).map(Sample::Pairs),
        }
    }

    fn seed_vs_random<S: GraphStore + ?Sized>(
        &mut self,
        store: &S,
        request: &SampleRequest,
    ) -> SimilarityResult<SamplePool> {
        let artist = request.seed_artist.as_deref().ok_or_else(|| {
            SimilarityError::InvalidConfig("seed-vs-random sampling needs a seed artist".to_string())
        })?;

        let seeds: Vec<NodeId> = store
            .find_nodes_by_property(&request.label, ARTIST, &PropertyValue::from(artist))?
            .into_iter()
            .map(|node| node.id)
            .collect();
        if seeds.is_empty() {
            log::warn!("No {} nodes found for seed artist {artist:?}", request.label);
        }

        let seed_set: BTreeSet<NodeId> = seeds.iter().copied().collect();
        let population: Vec<NodeId> = store
            .node_ids(&request.label)?
            .into_iter()
            .filter(|id| !seed_set.contains(id))
            .collect();

        let candidates = self.draw(&population, request.sample_size)?;
        log::debug!(
            "Sampled {} candidates from {} against {} seed tracks",
            candidates.len(),
            population.len(),
            seeds.len()
        );
        Ok(SamplePool { seeds, candidates })
    }

    fn global_pairs<S: GraphStore + ?Sized>(
        &mut self,
        store: &S,
        request: &SampleRequest,
    ) -> SimilarityResult<Vec<(NodeId, NodeId)>> {
        let ids = store.node_ids(&request.label)?;
        let n = ids.len();
        let total = pair_space(n).ok_or_else(|| {
            SimilarityError::InvalidConfig(format!("pair space of {n} tracks overflows"))
        })?;

        if request.sample_size > total {
            return Err(SimilarityError::InsufficientPopulation {
                requested: request.sample_size,
                available: total,
            });
        }
        if total > LARGE_PAIR_SPACE {
            log::warn!(
                "Pair space of {n} tracks is {total} pairs; global sampling does not scale past this"
            );
        }

        let mut ranks: Vec<usize> = index::sample(&mut self.rng, total, request.sample_size).into_vec();
        ranks.sort_unstable();
        Ok(ranks
            .into_iter()
            .map(|rank| {
                let (i, j) = unrank_pair(rank, n);
                (ids[i], ids[j])
            })
            .collect())
    }

    /// `amount` distinct ids drawn uniformly, returned in ascending order.
    fn draw(&mut self, population: &[NodeId], amount: usize) -> SimilarityResult<Vec<NodeId>> {
        if amount > population.len() {
            return Err(SimilarityError::InsufficientPopulation {
                requested: amount,
                available: population.len(),
            });
        }
        let mut picked: Vec<NodeId> = index::sample(&mut self.rng, population.len(), amount)
            .into_iter()
            .map(|idx| population[idx])
            .collect();
        picked.sort_unstable();
        Ok(picked)
    }
}

/// Number of unordered pairs of distinct items among `n`.
fn pair_space(n: usize) -> Option<usize> {
    if n < 2 {
        return Some(0);
    }
    n.checked_mul(n - 1).map(|p| p / 2)
}

/// The `rank`-th pair `(i, j)`, `i < j`, in lexicographic order over `n`
/// items.
fn unrank_pair(rank: usize, n: usize) -> (usize, usize) {
    let mut rest = rank;
    let mut i = 0;
    loop {
        let row = n - 1 - i;
        if rest < row {
            return (i, i + 1 + rest);
        }
        rest -= row;
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timbre_core::model::track::TRACK_LABEL;
    use timbre_core::props;
    use timbre_graph::MemoryGraph;

    fn catalog(seed_tracks: usize, others: usize) -> MemoryGraph {
        let mut graph = MemoryGraph::new();
        for i in 0..seed_tracks {
            graph
                .create_node(TRACK_LABEL, props! { "artist" => "Portishead", "name" => format!("seed {i}") })
                .unwrap();
        }
        for i in 0..others {
            graph
                .create_node(TRACK_LABEL, props! { "artist" => format!("artist {i}"), "name" => format!("other {i}") })
                .unwrap();
        }
        graph
    }

    fn request(strategy: SampleStrategy, sample_size: usize) -> SampleRequest {
        SampleRequest {
            strategy,
            label: TRACK_LABEL.to_string(),
            seed_artist: Some("Portishead".to_string()),
            sample_size,
        }
    }

    #[test]
    fn test_seed_vs_random_sets_are_disjoint() {
        let graph = catalog(3, 20);
        let mut sampler = Sampler::new(Some(7));
        let Sample::Pool(pool) = sampler
            .sample(&graph, &request(SampleStrategy::SeedVsRandom, 5))
            .unwrap()
        else {
            panic!("expected a pool");
        };

        assert_eq!(pool.seeds.len(), 3);
        assert_eq!(pool.candidates.len(), 5);
        assert!(pool.candidates.iter().all(|c| !pool.seeds.contains(c)));
        assert_eq!(pool.pairs().count(), 15);
    }

    #[test]
    fn test_candidates_are_distinct() {
        let graph = catalog(1, 10);
        let mut sampler = Sampler::new(Some(1));
        let sample = sampler
            .sample(&graph, &request(SampleStrategy::SeedVsRandom, 10))
            .unwrap();
        assert_eq!(sample.node_ids().len(), 11);
    }

    #[test]
    fn test_insufficient_population() {
        let graph = catalog(0, 40);
        let mut sampler = Sampler::new(Some(3));
        let err = sampler
            .sample(&graph, &request(SampleStrategy::SeedVsRandom, 50))
            .unwrap_err();
        assert!(matches!(
            err,
            SimilarityError::InsufficientPopulation {
                requested: 50,
                available: 40
            }
        ));
    }

    #[test]
    fn test_seed_vs_random_requires_artist() {
        let graph = catalog(1, 3);
        let mut req = request(SampleStrategy::SeedVsRandom, 1);
        req.seed_artist = None;
        let err = Sampler::new(Some(0)).sample(&graph, &req).unwrap_err();
        assert!(matches!(err, SimilarityError::InvalidConfig(_)));
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let graph = catalog(2, 30);
        let req = request(SampleStrategy::SeedVsRandom, 8);
        let a = Sampler::new(Some(42)).sample(&graph, &req).unwrap();
        let b = Sampler::new(Some(42)).sample(&graph, &req).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_global_pairs_are_distinct_and_unordered() {
        let graph = catalog(0, 12);
        let mut sampler = Sampler::new(Some(9));
        let sample = sampler
            .sample(&graph, &request(SampleStrategy::GlobalPairs, 30))
            .unwrap();
        let pairs = sample.pairs();
        assert_eq!(pairs.len(), 30);
        assert!(pairs.iter().all(|(a, b)| a < b));
        let unique: BTreeSet<_> = pairs.iter().collect();
        assert_eq!(unique.len(), 30);
    }

    #[test]
    fn test_global_pairs_can_exhaust_pair_space() {
        let graph = catalog(0, 5);
        let sample = Sampler::new(Some(5))
            .sample(&graph, &request(SampleStrategy::GlobalPairs, 10))
            .unwrap();
        assert_eq!(sample.pair_count(), 10);

        let err = Sampler::new(Some(5))
            .sample(&graph, &request(SampleStrategy::GlobalPairs, 11))
            .unwrap_err();
        assert!(matches!(
            err,
            SimilarityError::InsufficientPopulation {
                requested: 11,
                available: 10
            }
        ));
    }

    #[test]
    fn test_unrank_pair_enumerates_lexicographically() {
        let pairs: Vec<(usize, usize)> = (0..6).map(|r| unrank_pair(r, 4)).collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]);
    }

    #[test]
    fn test_pair_space() {
        assert_eq!(pair_space(0), Some(0));
        assert_eq!(pair_space(1), Some(0));
        assert_eq!(pair_space(4), Some(6));
        assert_eq!(pair_space(usize::MAX), None);
    }
}
