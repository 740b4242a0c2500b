//! Core property-graph model and storage for timbre.
//!
//! This crate defines the node/edge model, typed property values, the
//! [`GraphStore`](store::GraphStore) interface consumed by the similarity
//! pipeline, and a SQLite-backed property graph that implements it.

#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod model;
pub mod schema;
pub mod store;

pub use error::{Error, Result};
pub use store::GraphStore;
