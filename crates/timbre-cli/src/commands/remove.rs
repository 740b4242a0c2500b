use anyhow::Result;
use timbre_core::model::track::MATCHED_LABEL;
use timbre_core::model::NodeId;
use timbre_core::GraphStore;
use timbre_similarity::Config;

use super::open_database;

pub fn remove_node(config: &Config, id: i64) -> Result<()> {
    let mut db = open_database(config)?;
    let counts = db.remove_node(NodeId::new(id))?;
    println!("✓ Removed node {id} and {} edges", counts.edges);
    Ok(())
}

pub fn remove_edges(config: &Config, from: i64, to: i64) -> Result<()> {
    let mut db = open_database(config)?;
    let counts = db.remove_edges(MATCHED_LABEL, NodeId::new(from), NodeId::new(to))?;
    if counts.edges == 0 {
        println!("No {MATCHED_LABEL} edges from {from} to {to}");
    } else {
        println!("✓ Removed {} {MATCHED_LABEL} edges from {from} to {to}", counts.edges);
    }
    Ok(())
}
