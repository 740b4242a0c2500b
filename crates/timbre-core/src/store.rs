//! The storage interface consumed by the similarity pipeline.
//!
//! Implementations must bind every caller-supplied value as a query
//! parameter. Labels, keys, and values never become part of query text.

use crate::error::Result;
use crate::model::{Aggregate, DeleteCounts, Edge, EdgeRef, Node, NodeId, PropertyMap, PropertyValue};

/// A property graph holding track nodes and derived edges.
pub trait GraphStore {
    /// Read a node by id. Fails with [`Error::NotFound`](crate::Error::NotFound)
    /// if absent.
    fn get_node(&self, id: NodeId) -> Result<Node>;

    /// All nodes with `label` whose `key` property equals `value`.
    fn find_nodes_by_property(
        &self,
        label: &str,
        key: &str,
        value: &PropertyValue,
    ) -> Result<Vec<Node>>;

    /// Ids of every node with `label`, in ascending order.
    fn node_ids(&self, label: &str) -> Result<Vec<NodeId>>;

    fn create_node(&mut self, label: &str, properties: PropertyMap) -> Result<NodeId>;

    /// Insert a new edge unconditionally.
    fn create_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        label: &str,
        properties: PropertyMap,
    ) -> Result<EdgeRef>;

    /// Insert an edge, or replace the properties of the existing
    /// `(from, to, label)` edge.
    fn merge_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        label: &str,
        properties: PropertyMap,
    ) -> Result<EdgeRef>;

    /// Edges with `label` leaving `from`, in insertion order.
    fn outgoing_edges(&self, from: NodeId, label: &str) -> Result<Vec<Edge>>;

    /// MIN or MAX of a numeric attribute over all nodes with `label`.
    /// Booleans count as 1/0, matching feature extraction. `None` when no
    /// node carries a numeric or boolean value for it.
    fn aggregate(&self, label: &str, attribute: &str, op: Aggregate) -> Result<Option<f64>>;

    /// Delete a node along with every edge touching it.
    fn remove_node(&mut self, id: NodeId) -> Result<DeleteCounts>;

    /// Delete every `label` edge from `from` to `to`.
    fn remove_edges(&mut self, label: &str, from: NodeId, to: NodeId) -> Result<DeleteCounts>;

    /// Delete all nodes and edges.
    fn delete_all(&mut self) -> Result<DeleteCounts>;

    fn count_nodes(&self, label: &str) -> Result<usize> {
        Ok(self.node_ids(label)?.len())
    }

    fn count_edges(&self, label: &str) -> Result<usize>;
}
