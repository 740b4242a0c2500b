use anyhow::Result;
use timbre_core::model::track::MATCHED_LABEL;
use timbre_core::GraphStore;
use timbre_similarity::Config;

use super::open_database;

pub fn show_status(config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let label = &config.similarity.track_label;

    let tracks = db.count_nodes(label)?;
    let matches = db.count_edges(MATCHED_LABEL)?;

    println!("\n📊 Timbre Status\n");
    println!("  Database: {}", config.database_path.display());
    println!("  Schema version: {}", db.schema_version()?);
    println!("  {label} nodes: {tracks}");
    println!("  {MATCHED_LABEL} edges: {matches}");

    if tracks == 0 {
        println!("\n  Run `timbre import <file.jsonl>` to load tracks");
    } else if matches == 0 {
        println!("\n  Run `timbre build --seed-artist <artist>` to match tracks");
    }

    Ok(())
}
