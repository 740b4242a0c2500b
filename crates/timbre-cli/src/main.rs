use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use timbre_similarity::Config;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "timbre", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the database (default: ~/.local/share/timbre/timbre.db)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
}

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Build MATCHED edges between similar tracks
    ///
    /// Samples track pairs from the graph, projects each track onto its
    /// numeric audio attributes, and writes a MATCHED edge for every pair
    /// whose score passes the threshold:
    ///
    /// - seed_vs_random compares every track by the seed artist against a
    ///   random sample of other tracks
    /// - global_pairs compares a random sample of pairs drawn from the whole
    ///   catalog
    ///
    /// Flags override the [similarity] section of the config file for this
    /// run only. Ctrl-C stops the run after the current write and still
    /// prints the summary.
    Build(commands::build::BuildArgs),
    /// Recommend tracks similar to an artist
    Recommend {
        /// Artist whose MATCHED edges are followed
        artist: String,

        /// Number of recommendations (default: similarity.recommend_k)
        #[arg(short, long)]
        k: Option<usize>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show graph statistics
    Status,
    /// Import track records from a JSON-lines file
    ///
    /// Each line is one JSON object of track attributes, for example:
    ///
    /// {"id": 7, "name": "Teardrop", "artist": "Massive Attack", "tempo": 77.0}
    ///
    /// Malformed lines are reported and skipped.
    Import {
        /// Path to the .jsonl file
        path: PathBuf,
    },
    /// Delete a track node and every edge touching it
    RemoveNode {
        /// Node id
        id: i64,
    },
    /// Delete every MATCHED edge from one track to another
    RemoveEdge {
        /// Source node id
        from: i64,

        /// Target node id
        to: i64,
    },
    /// Delete every node and edge in the graph
    Flush {
        /// Skip the confirmation check
        #[arg(long)]
        yes: bool,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, clap::Subcommand)]
enum ConfigAction {
    /// Show the current effective configuration
    Show,
    /// Show the config file path
    Path,
    /// Create a config file with defaults
    Init,
    /// Print an example config file
    Example,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.db {
        Some(db_path) => Config::load_with_db_path(db_path)?,
        None => Config::load()?,
    };
    commands::logging::setup(&config.logging)?;

    match cli.command {
        Commands::Build(args) => commands::build::run_build(&config, &args)?,
        Commands::Recommend { artist, k, json } => {
            commands::recommend::run_recommend(&config, &artist, k, json)?;
        }
        Commands::Status => commands::status::show_status(&config)?,
        Commands::Import { path } => commands::import::run_import(&config, &path)?,
        Commands::RemoveNode { id } => commands::remove::remove_node(&config, id)?,
        Commands::RemoveEdge { from, to } => commands::remove::remove_edges(&config, from, to)?,
        Commands::Flush { yes } => commands::flush::run_flush(&config, yes)?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show_config(&config),
            ConfigAction::Path => commands::config::show_path(),
            ConfigAction::Init => commands::config::init_config()?,
            ConfigAction::Example => commands::config::show_example(),
        },
    }

    Ok(())
}
