pub mod graph;
pub mod ids;
pub mod property;
pub mod track;

pub use graph::{Aggregate, DeleteCounts, Edge, EdgeRef, Node};
pub use ids::{EdgeId, NodeId, RunId};
pub use property::{PropertyMap, PropertyValue};
pub use track::Track;
