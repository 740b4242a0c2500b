//! In-memory property graph for timbre.
//!
//! [`MemoryGraph`] implements [`GraphStore`] over a petgraph
//! `StableDiGraph`, so node and edge indices stay valid across removals.
//! Useful for tests and for one-off runs that never touch disk.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef as _;
use petgraph::Direction;

use timbre_core::model::{
    Aggregate, DeleteCounts, Edge, EdgeId, EdgeRef, Node, NodeId, PropertyMap, PropertyValue,
};
use timbre_core::{Error, GraphStore, Result};

#[derive(Debug, Clone)]
struct Entity {
    label: String,
    properties: PropertyMap,
}

/// A property graph held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    graph: StableDiGraph<Entity, Entity>,
}

impl MemoryGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn node_index(&self, id: NodeId) -> Result<NodeIndex> {
        usize::try_from(id.get())
            .ok()
            .map(NodeIndex::new)
            .filter(|idx| self.graph.contains_node(*idx))
            .ok_or_else(|| Error::NotFound {
                entity: "node",
                id: id.to_string(),
            })
    }

    fn edge_ids_between(&self, from: NodeIndex, to: NodeIndex, label: &str) -> Vec<EdgeIndex> {
        self.graph
            .edges_directed(from, Direction::Outgoing)
            .filter(|e| e.target() == to && e.weight().label == label)
            .map(|e| e.id())
            .collect()
    }

    fn entities<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Entity> + 'a {
        self.graph
            .node_indices()
            .map(move |idx| &self.graph[idx])
            .filter(move |entity| entity.label == label)
    }

    fn to_node(&self, idx: NodeIndex) -> Option<Node> {
        self.graph.node_weight(idx).map(|entity| Node {
            id: index_to_node_id(idx),
            label: entity.label.clone(),
            properties: entity.properties.clone(),
        })
    }
}

#[allow(clippy::cast_possible_wrap)]
fn index_to_node_id(idx: NodeIndex) -> NodeId {
    NodeId::new(idx.index() as i64)
}

#[allow(clippy::cast_possible_wrap)]
fn index_to_edge_id(idx: EdgeIndex) -> EdgeId {
    EdgeId::new(idx.index() as i64)
}

impl GraphStore for MemoryGraph {
    fn get_node(&self, id: NodeId) -> Result<Node> {
        let idx = self.node_index(id)?;
        self.to_node(idx).ok_or_else(|| Error::NotFound {
            entity: "node",
            id: id.to_string(),
        })
    }

    fn find_nodes_by_property(
        &self,
        label: &str,
        key: &str,
        value: &PropertyValue,
    ) -> Result<Vec<Node>> {
        let mut nodes: Vec<Node> = self
            .graph
            .node_indices()
            .filter(|idx| {
                let entity = &self.graph[*idx];
                entity.label == label && entity.properties.get(key).is_some_and(|v| v == value)
            })
            .filter_map(|idx| self.to_node(idx))
            .collect();
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    fn node_ids(&self, label: &str) -> Result<Vec<NodeId>> {
        let mut ids: Vec<NodeId> = self
            .graph
            .node_indices()
            .filter(|idx| self.graph[*idx].label == label)
            .map(index_to_node_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn create_node(&mut self, label: &str, properties: PropertyMap) -> Result<NodeId> {
        let idx = self.graph.add_node(Entity {
            label: label.to_string(),
            properties,
        });
        Ok(index_to_node_id(idx))
    }

    fn create_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        label: &str,
        properties: PropertyMap,
    ) -> Result<EdgeRef> {
        let a = self.node_index(from)?;
        let b = self.node_index(to)?;
        let idx = self.graph.add_edge(
            a,
            b,
            Entity {
                label: label.to_string(),
                properties,
            },
        );
        Ok(EdgeRef {
            id: index_to_edge_id(idx),
            created: true,
        })
    }

    fn merge_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        label: &str,
        properties: PropertyMap,
    ) -> Result<EdgeRef> {
        let a = self.node_index(from)?;
        let b = self.node_index(to)?;

        // Upsert targets the oldest matching edge, as the SQLite store does
        if let Some(idx) = self.edge_ids_between(a, b, label).into_iter().min() {
            if let Some(weight) = self.graph.edge_weight_mut(idx) {
                weight.properties = properties;
                return Ok(EdgeRef {
                    id: index_to_edge_id(idx),
                    created: false,
                });
            }
        }
        self.create_edge(from, to, label, properties)
    }

    fn outgoing_edges(&self, from: NodeId, label: &str) -> Result<Vec<Edge>> {
        let a = self.node_index(from)?;
        let mut edges: Vec<Edge> = self
            .graph
            .edges_directed(a, Direction::Outgoing)
            .filter(|e| e.weight().label == label)
            .map(|e| Edge {
                id: index_to_edge_id(e.id()),
                from,
                to: index_to_node_id(e.target()),
                label: e.weight().label.clone(),
                properties: e.weight().properties.clone(),
            })
            .collect();
        edges.sort_by_key(|e| e.id);
        Ok(edges)
    }

    fn aggregate(&self, label: &str, attribute: &str, op: Aggregate) -> Result<Option<f64>> {
        let values = self
            .entities(label)
            .filter_map(|entity| entity.properties.get(attribute).and_then(PropertyValue::as_scalar));
        let result = match op {
            Aggregate::Min => values.reduce(f64::min),
            Aggregate::Max => values.reduce(f64::max),
        };
        Ok(result)
    }

    fn remove_node(&mut self, id: NodeId) -> Result<DeleteCounts> {
        let Ok(idx) = self.node_index(id) else {
            return Ok(DeleteCounts::default());
        };
        let edges = self.graph.edges_directed(idx, Direction::Outgoing).count()
            + self
                .graph
                .edges_directed(idx, Direction::Incoming)
                .filter(|e| e.source() != idx)
                .count();
        self.graph.remove_node(idx);
        log::debug!("Removed node {id}: 1 nodes, {edges} edges");
        Ok(DeleteCounts { nodes: 1, edges })
    }

    fn remove_edges(&mut self, label: &str, from: NodeId, to: NodeId) -> Result<DeleteCounts> {
        let (Ok(a), Ok(b)) = (self.node_index(from), self.node_index(to)) else {
            return Ok(DeleteCounts::default());
        };
        let doomed = self.edge_ids_between(a, b, label);
        for idx in &doomed {
            self.graph.remove_edge(*idx);
        }
        Ok(DeleteCounts {
            nodes: 0,
            edges: doomed.len(),
        })
    }

    fn delete_all(&mut self) -> Result<DeleteCounts> {
        let counts = DeleteCounts {
            nodes: self.graph.node_count(),
            edges: self.graph.edge_count(),
        };
        self.graph.clear();
        log::info!("Deleted {} nodes and {} edges", counts.nodes, counts.edges);
        Ok(counts)
    }

    fn count_nodes(&self, label: &str) -> Result<usize> {
        Ok(self.entities(label).count())
    }

    fn count_edges(&self, label: &str) -> Result<usize> {
        Ok(self
            .graph
            .edge_indices()
            .filter(|idx| self.graph.edge_weight(*idx).is_some_and(|e| e.label == label))
            .count())
    }
}
