pub mod build;
pub mod config;
pub mod flush;
pub mod import;
pub mod logging;
pub mod recommend;
pub mod remove;
pub mod status;

use anyhow::{Context, Result};
use timbre_core::schema::Database;
use timbre_similarity::Config;

/// Open the configured database, creating its directory if needed.
pub fn open_database(config: &Config) -> Result<Database> {
    let db_path = &config.database_path;
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Database::open(db_path).with_context(|| format!("Failed to open database {}", db_path.display()))
}
