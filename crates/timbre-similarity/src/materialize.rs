//! Writing qualifying pairs back to the store as `MATCHED` edges.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use timbre_core::model::track::{MATCHED_LABEL, SIM_SCORE};
use timbre_core::model::{EdgeRef, NodeId, PropertyMap, PropertyValue, RunId};
use timbre_core::GraphStore;

use crate::error::SimilarityResult;
use crate::score::ScoringPolicy;

/// Edge property recording which run wrote the edge.
pub const RUN_ID: &str = "run_id";

/// Edge property recording when the score was written.
pub const SCORED_AT: &str = "scored_at";

/// What happens when a pair already has a `MATCHED` edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Replace the existing edge's score; one edge per pair across runs.
    #[default]
    Upsert,
    /// Always insert; repeated runs accumulate duplicate edges.
    Append,
}

/// Writes `MATCHED` edges for pairs whose score passes the threshold.
#[derive(Debug)]
pub struct Materializer<'a, S: GraphStore + ?Sized> {
    store: &'a mut S,
    policy: ScoringPolicy,
    threshold: f64,
    write: WritePolicy,
    run_id: RunId,
    symmetric: bool,
}

impl<'a, S: GraphStore + ?Sized> Materializer<'a, S> {
    #[must_use]
    pub fn new(
        store: &'a mut S,
        policy: ScoringPolicy,
        threshold: f64,
        write: WritePolicy,
        run_id: RunId,
    ) -> Self {
        Self {
            store,
            policy,
            threshold,
            write,
            run_id,
            symmetric: false,
        }
    }

    /// Also write the reverse edge for every qualifying pair.
    #[must_use]
    pub fn symmetric(mut self, symmetric: bool) -> Self {
        self.symmetric = symmetric;
        self
    }

    /// Whether `score` would be written.
    #[must_use]
    pub fn qualifies(&self, score: f64) -> bool {
        self.policy.passes(score, self.threshold)
    }

    /// Write one directed edge `from → to` carrying `score`, or return
    /// `None` when the score does not pass the threshold.
    pub fn record_match(
        &mut self,
        from: NodeId,
        to: NodeId,
        score: f64,
    ) -> SimilarityResult<Option<EdgeRef>> {
        if !self.qualifies(score) {
            log::trace!("Pair {from} -> {to} scored {score:.4}, below threshold");
            return Ok(None);
        }

        let mut properties = PropertyMap::new();
        properties.insert(SIM_SCORE.to_string(), PropertyValue::Float(score));
        properties.insert(RUN_ID.to_string(), PropertyValue::Text(self.run_id.to_string()));
        properties.insert(
            SCORED_AT.to_string(),
            PropertyValue::Text(Utc::now().to_rfc3339()),
        );

        let edge = match self.write {
            WritePolicy::Upsert => self.store.merge_edge(from, to, MATCHED_LABEL, properties)?,
            WritePolicy::Append => self.store.create_edge(from, to, MATCHED_LABEL, properties)?,
        };
        log::debug!(
            "{} MATCHED {from} -> {to} ({score:.4})",
            if edge.created { "Created" } else { "Updated" }
        );
        Ok(Some(edge))
    }

    /// Record the pair `a → b`, plus `b → a` when symmetric. Empty when the
    /// score does not pass the threshold.
    pub fn record_pair(&mut self, a: NodeId, b: NodeId, score: f64) -> SimilarityResult<Vec<EdgeRef>> {
        let Some(forward) = self.record_match(a, b, score)? else {
            return Ok(Vec::new());
        };
        let mut edges = vec![forward];
        if self.symmetric {
            edges.extend(self.record_match(b, a, score)?);
        }
        Ok(edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timbre_core::model::track::TRACK_LABEL;
    use timbre_core::props;
    use timbre_graph::MemoryGraph;

    fn two_tracks() -> (MemoryGraph, NodeId, NodeId) {
        let mut graph = MemoryGraph::new();
        let a = graph.create_node(TRACK_LABEL, props! { "name" => "a" }).unwrap();
        let b = graph.create_node(TRACK_LABEL, props! { "name" => "b" }).unwrap();
        (graph, a, b)
    }

    #[test]
    fn test_bounded_similarity_writes_above_threshold() {
        let (mut graph, a, b) = two_tracks();
        let run_id = RunId::new();
        let mut m = Materializer::new(
            &mut graph,
            ScoringPolicy::BoundedSimilarity,
            0.5,
            WritePolicy::Upsert,
            run_id,
        );
        assert!(m.record_match(a, b, 0.3).unwrap().is_none());
        let edge = m.record_match(a, b, 0.8).unwrap().unwrap();
        assert!(edge.created);

        let edges = graph.outgoing_edges(a, MATCHED_LABEL).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to, b);
        assert_eq!(edges[0].property(SIM_SCORE), Some(&PropertyValue::Float(0.8)));
        assert_eq!(
            edges[0].property(RUN_ID),
            Some(&PropertyValue::Text(run_id.to_string()))
        );
    }

    #[test]
    fn test_raw_distance_writes_below_threshold() {
        let (mut graph, a, b) = two_tracks();
        let mut m = Materializer::new(
            &mut graph,
            ScoringPolicy::RawDistance,
            1.0,
            WritePolicy::Upsert,
            RunId::new(),
        );
        assert!(m.record_match(a, b, 1.5).unwrap().is_none());
        assert!(m.record_match(a, b, 0.4).unwrap().is_some());
        assert_eq!(graph.count_edges(MATCHED_LABEL).unwrap(), 1);
    }

    #[test]
    fn test_upsert_keeps_one_edge_per_pair() {
        let (mut graph, a, b) = two_tracks();
        for _ in 0..2 {
            let mut m = Materializer::new(
                &mut graph,
                ScoringPolicy::BoundedSimilarity,
                0.5,
                WritePolicy::Upsert,
                RunId::new(),
            );
            m.record_match(a, b, 0.9).unwrap();
        }
        assert_eq!(graph.count_edges(MATCHED_LABEL).unwrap(), 1);
    }

    #[test]
    fn test_append_accumulates_duplicates() {
        let (mut graph, a, b) = two_tracks();
        for _ in 0..2 {
            let mut m = Materializer::new(
                &mut graph,
                ScoringPolicy::BoundedSimilarity,
                0.5,
                WritePolicy::Append,
                RunId::new(),
            );
            m.record_match(a, b, 0.9).unwrap();
        }
        assert_eq!(graph.count_edges(MATCHED_LABEL).unwrap(), 2);
    }

    #[test]
    fn test_symmetric_pair_writes_both_directions() {
        let (mut graph, a, b) = two_tracks();
        let mut m = Materializer::new(
            &mut graph,
            ScoringPolicy::BoundedSimilarity,
            0.5,
            WritePolicy::Upsert,
            RunId::new(),
        )
        .symmetric(true);
        assert!(m.record_pair(a, b, 0.2).unwrap().is_empty());
        assert_eq!(m.record_pair(a, b, 0.7).unwrap().len(), 2);

        assert_eq!(graph.outgoing_edges(a, MATCHED_LABEL).unwrap()[0].to, b);
        assert_eq!(graph.outgoing_edges(b, MATCHED_LABEL).unwrap()[0].to, a);
    }

    #[test]
    fn test_directed_pair_writes_one_edge() {
        let (mut graph, a, b) = two_tracks();
        let mut m = Materializer::new(
            &mut graph,
            ScoringPolicy::BoundedSimilarity,
            0.5,
            WritePolicy::Upsert,
            RunId::new(),
        );
        assert_eq!(m.record_pair(a, b, 0.7).unwrap().len(), 1);
        assert!(graph.outgoing_edges(b, MATCHED_LABEL).unwrap().is_empty());
    }

    #[test]
    fn test_missing_endpoint_is_an_error() {
        let (mut graph, a, _) = two_tracks();
        let mut m = Materializer::new(
            &mut graph,
            ScoringPolicy::BoundedSimilarity,
            0.5,
            WritePolicy::Upsert,
            RunId::new(),
        );
        assert!(m.record_match(a, NodeId::new(77), 0.9).is_err());
    }
}
