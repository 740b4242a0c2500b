use anyhow::Result;
use timbre_similarity::{config, Config};

/// Show the current effective configuration.
pub fn show_config(config: &Config) {
    let config_path = config::config_file_path();

    println!("Current Configuration");
    println!("=====================\n");

    println!("Config file: {}", config_path.display());

    let exists = config_path.exists();
    println!("File exists: {}\n", if exists { "yes" } else { "no (using defaults)" });

    let s = &config.similarity;
    println!("Settings:");
    println!("  database_path: {}", config.database_path.display());
    println!("  logging.level: {}", config.logging.level);
    println!("  logging.coloured: {}", config.logging.coloured);
    println!(
        "  similarity.seed_artist: {}",
        s.seed_artist.as_deref().unwrap_or("<not set>")
    );
    println!("  similarity.strategy: {:?}", s.strategy);
    println!("  similarity.sample_size: {}", s.sample_size);
    println!("  similarity.scoring_policy: {:?}", s.scoring_policy);
    println!("  similarity.threshold: {}", s.threshold);
    println!("  similarity.normalize: {}", s.normalize);
    println!("  similarity.weighting: {:?}", s.weighting);
    println!("  similarity.write_policy: {:?}", s.write_policy);
    println!("  similarity.explicit: {:?}", s.explicit);
    match &s.features {
        Some(features) => println!("  similarity.features: {}", features.join(", ")),
        None => println!("  similarity.features: <all numeric attributes>"),
    }
    match s.rng_seed {
        Some(seed) => println!("  similarity.rng_seed: {seed}"),
        None => println!("  similarity.rng_seed: <entropy>"),
    }
    println!("  similarity.recommend_k: {}", s.recommend_k);
    println!("  similarity.track_label: {}", s.track_label);

    println!("\nPriority: CLI args > ENV vars (TIMBRE_*) > Config file > Defaults");
}

/// Show the config file path.
pub fn show_path() {
    println!("{}", config::config_file_path().display());
}

/// Show example configuration.
pub fn show_example() {
    print!("{}", config::example_config());
}

/// Initialize config file with defaults.
pub fn init_config() -> Result<()> {
    let created = config::ensure_config_file()?;
    let config_path = config::config_file_path();

    if created {
        println!("✓ Created config file: {}", config_path.display());
        println!("\nEdit this file to configure timbre.");
    } else {
        println!("Config file already exists: {}", config_path.display());
    }

    Ok(())
}
