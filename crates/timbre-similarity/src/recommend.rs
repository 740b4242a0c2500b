//! Top-K recommendations read from materialized `MATCHED` edges.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use timbre_core::model::track::{ARTIST, MATCHED_LABEL, SIM_SCORE};
use timbre_core::model::{NodeId, PropertyValue, Track};
use timbre_core::GraphStore;

use crate::error::SimilarityResult;
use crate::score::ScoringPolicy;

/// A recommended track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub track_id: NodeId,
    pub track_name: String,
    pub artist: String,
    pub score: f64,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} by {} ({:.4})", self.track_name, self.artist, self.score)
    }
}

/// Answers "what is similar to this artist" from the similarity graph.
#[derive(Debug)]
pub struct Recommender<'a, S: GraphStore + ?Sized> {
    store: &'a S,
    policy: ScoringPolicy,
    label: String,
}

impl<'a, S: GraphStore + ?Sized> Recommender<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, policy: ScoringPolicy, label: impl Into<String>) -> Self {
        Self {
            store,
            policy,
            label: label.into(),
        }
    }

    /// The best `k` distinct tracks reachable over `MATCHED` edges from any
    /// track by `seed_artist`, best first under the scoring policy.
    ///
    /// Tracks reached more than once (through several seeds, or duplicate
    /// edges from append-mode runs) appear once with their best score. An
    /// artist without edges yields an empty list.
    pub fn recommend(&self, seed_artist: &str, k: usize) -> SimilarityResult<Vec<Recommendation>> {
        let seeds = self.store.find_nodes_by_property(
            &self.label,
            ARTIST,
            &PropertyValue::from(seed_artist),
        )?;

        let mut best: BTreeMap<(String, String), Recommendation> = BTreeMap::new();
        for seed in &seeds {
            for edge in self.store.outgoing_edges(seed.id, MATCHED_LABEL)? {
                let Some(score) = edge.property(SIM_SCORE).and_then(PropertyValue::as_f64) else {
                    log::warn!("MATCHED edge {} has no numeric {SIM_SCORE}", edge.id);
                    continue;
                };
                let target = match self.store.get_node(edge.to) {
                    Ok(node) => node,
                    Err(timbre_core::Error::NotFound { .. }) => {
                        log::warn!("MATCHED edge {} points at missing node {}", edge.id, edge.to);
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };
                let track = Track::new(&target);
                let candidate = Recommendation {
                    track_id: target.id,
                    track_name: track.name().to_string(),
                    artist: track.artist().to_string(),
                    score,
                };

                let key = (candidate.track_name.clone(), candidate.artist.clone());
                match best.get(&key) {
                    Some(existing) if !self.policy.is_better(score, existing.score) => {}
                    _ => {
                        best.insert(key, candidate);
                    }
                }
            }
        }

        let mut ranked: Vec<Recommendation> = best.into_values().collect();
        ranked.sort_by(|a, b| {
            self.policy
                .rank(a.score, b.score)
                .then_with(|| a.track_name.cmp(&b.track_name))
        });
        ranked.truncate(k);
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timbre_core::model::track::TRACK_LABEL;
    use timbre_core::props;
    use timbre_graph::MemoryGraph;

    /// One seed track with edges to three targets scored 0.9, 0.5, 0.7.
    fn graph_with_scores(scores: &[f64]) -> MemoryGraph {
        let mut graph = MemoryGraph::new();
        let seed = graph
            .create_node(TRACK_LABEL, props! { "name" => "Glory Box", "artist" => "Portishead" })
            .unwrap();
        for (i, score) in scores.iter().enumerate() {
            let target = graph
                .create_node(
                    TRACK_LABEL,
                    props! { "name" => format!("track {i}"), "artist" => format!("artist {i}") },
                )
                .unwrap();
            graph
                .create_edge(seed, target, MATCHED_LABEL, props! { "sim_score" => *score })
                .unwrap();
        }
        graph
    }

    fn scores(recs: &[Recommendation]) -> Vec<f64> {
        recs.iter().map(|r| r.score).collect()
    }

    #[test]
    fn test_bounded_similarity_orders_descending() {
        let graph = graph_with_scores(&[0.9, 0.5, 0.7]);
        let rec = Recommender::new(&graph, ScoringPolicy::BoundedSimilarity, TRACK_LABEL);
        let top = rec.recommend("Portishead", 2).unwrap();
        assert_eq!(scores(&top), vec![0.9, 0.7]);
        assert_eq!(top[0].track_name, "track 0");
    }

    #[test]
    fn test_raw_distance_orders_ascending() {
        let graph = graph_with_scores(&[0.9, 0.5, 0.7]);
        let rec = Recommender::new(&graph, ScoringPolicy::RawDistance, TRACK_LABEL);
        let top = rec.recommend("Portishead", 2).unwrap();
        assert_eq!(scores(&top), vec![0.5, 0.7]);
    }

    #[test]
    fn test_unknown_artist_is_empty() {
        let graph = graph_with_scores(&[0.9]);
        let rec = Recommender::new(&graph, ScoringPolicy::BoundedSimilarity, TRACK_LABEL);
        assert!(rec.recommend("Tricky", 5).unwrap().is_empty());
    }

    #[test]
    fn test_seed_without_edges_is_empty() {
        let graph = graph_with_scores(&[]);
        let rec = Recommender::new(&graph, ScoringPolicy::BoundedSimilarity, TRACK_LABEL);
        assert!(rec.recommend("Portishead", 5).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_edges_are_deduplicated() {
        let mut graph = MemoryGraph::new();
        let seed = graph
            .create_node(TRACK_LABEL, props! { "name" => "Roads", "artist" => "Portishead" })
            .unwrap();
        let target = graph
            .create_node(TRACK_LABEL, props! { "name" => "Unfinished Sympathy", "artist" => "Massive Attack" })
            .unwrap();
        // Same track re-imported under a second node id
        let twin = graph
            .create_node(TRACK_LABEL, props! { "name" => "Unfinished Sympathy", "artist" => "Massive Attack" })
            .unwrap();
        for (to, score) in [(target, 0.6), (target, 0.6), (twin, 0.8)] {
            graph
                .create_edge(seed, to, MATCHED_LABEL, props! { "sim_score" => score })
                .unwrap();
        }

        let rec = Recommender::new(&graph, ScoringPolicy::BoundedSimilarity, TRACK_LABEL);
        let top = rec.recommend("Portishead", 10).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].track_id, twin);
        assert_eq!(top[0].score, 0.8);
    }

    #[test]
    fn test_display() {
        let r = Recommendation {
            track_id: NodeId::new(1),
            track_name: "Angel".to_string(),
            artist: "Massive Attack".to_string(),
            score: 0.75,
        };
        assert_eq!(r.to_string(), "Angel by Massive Attack (0.7500)");
    }
}
