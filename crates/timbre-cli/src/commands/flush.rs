use anyhow::{bail, Result};
use timbre_core::GraphStore;
use timbre_similarity::Config;

use super::open_database;

pub fn run_flush(config: &Config, yes: bool) -> Result<()> {
    if !yes {
        bail!(
            "Refusing to delete every node and edge in {}\n\nRe-run with --yes to confirm.",
            config.database_path.display()
        );
    }

    let mut db = open_database(config)?;
    let counts = db.delete_all()?;
    log::warn!("Flushed {}", config.database_path.display());
    println!("✓ Deleted {} nodes and {} edges", counts.nodes, counts.edges);
    Ok(())
}
