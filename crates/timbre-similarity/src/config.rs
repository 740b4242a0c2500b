use anyhow::{Context, Result};
use confyg::{env, Confygery};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{SimilarityError, SimilarityResult};
use crate::features::ExplicitPolicy;
use crate::materialize::WritePolicy;
use crate::sample::SampleStrategy;
use crate::score::{ScoringPolicy, Weighting};

/// Configuration for timbre.
///
/// Configuration is loaded from multiple sources with the following priority:
/// 1. CLI arguments (highest priority)
/// 2. Environment variables (TIMBRE_* prefix)
/// 3. Config file (~/.config/timbre/config.toml)
/// 4. Built-in defaults (lowest priority)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to the SQLite property graph.
    ///
    /// Can be set via:
    /// - CLI: --db /path/to/db
    /// - ENV: TIMBRE_DATABASE_PATH
    /// - Config: database_path = "/path/to/db"
    /// - Default: ~/.local/share/timbre/timbre.db
    pub database_path: PathBuf,

    pub logging: LoggingConfig,

    pub similarity: SimilarityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_db_path(),
            logging: LoggingConfig::default(),
            similarity: SimilarityConfig::default(),
        }
    }
}

/// The `[logging]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error.
    pub level: String,
    pub coloured: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            coloured: true,
        }
    }
}

/// The `[similarity]` section: everything one pipeline run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Artist whose tracks anchor seed-vs-random sampling.
    pub seed_artist: Option<String>,
    /// Candidate tracks (seed-vs-random) or pairs (global) to draw.
    pub sample_size: usize,
    /// Edge cut-off, interpreted in the scoring policy's direction.
    pub threshold: f64,
    pub scoring_policy: ScoringPolicy,
    /// Min-max normalize features before measuring distance.
    pub normalize: bool,
    pub weighting: Weighting,
    pub strategy: SampleStrategy,
    pub write_policy: WritePolicy,
    pub explicit: ExplicitPolicy,
    /// Fixed feature schema. When unset, every numeric attribute counts.
    pub features: Option<Vec<String>>,
    /// Seed for the sampler's random source.
    pub rng_seed: Option<u64>,
    /// Default number of recommendations.
    pub recommend_k: usize,
    pub track_label: String,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            seed_artist: None,
            sample_size: 100,
            threshold: 0.5,
            scoring_policy: ScoringPolicy::BoundedSimilarity,
            normalize: true,
            weighting: Weighting::Uniform,
            strategy: SampleStrategy::SeedVsRandom,
            write_policy: WritePolicy::Upsert,
            explicit: ExplicitPolicy::Encode,
            features: None,
            rng_seed: None,
            recommend_k: 10,
            track_label: timbre_core::model::track::TRACK_LABEL.to_string(),
        }
    }
}

impl SimilarityConfig {
    /// Reject settings that cannot produce a meaningful run.
    pub fn validate(&self) -> SimilarityResult<()> {
        if self.sample_size == 0 {
            return Err(SimilarityError::InvalidConfig(
                "sample_size must be at least 1".to_string(),
            ));
        }
        if !self.threshold.is_finite() {
            return Err(SimilarityError::InvalidConfig(format!(
                "threshold must be finite, got {}",
                self.threshold
            )));
        }
        match self.scoring_policy {
            ScoringPolicy::BoundedSimilarity if self.threshold <= 0.0 || self.threshold > 1.0 => {
                return Err(SimilarityError::InvalidConfig(format!(
                    "bounded_similarity threshold must be in (0, 1], got {}",
                    self.threshold
                )));
            }
            ScoringPolicy::RawDistance if self.threshold < 0.0 => {
                return Err(SimilarityError::InvalidConfig(format!(
                    "raw_distance threshold must be non-negative, got {}",
                    self.threshold
                )));
            }
            _ => {}
        }
        if self.normalize && self.weighting == Weighting::RangeScaled {
            return Err(SimilarityError::InvalidConfig(
                "range_scaled weighting normalizes inside the distance; set normalize = false"
                    .to_string(),
            ));
        }
        if self.strategy == SampleStrategy::SeedVsRandom && self.seed_artist.is_none() {
            return Err(SimilarityError::InvalidConfig(
                "seed_vs_random sampling needs seed_artist".to_string(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Searches for config file at: ~/.config/timbre/config.toml
    /// Reads environment variables with TIMBRE_ prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        let mut builder = Confygery::new().context("Failed to create config builder")?;

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow::anyhow!("Config path contains invalid UTF-8"))?;
            builder
                .add_file(path_str)
                .context("Failed to load config file")?;
        }

        let env_opts = env::Options::with_top_level("timbre");
        builder
            .add_env(env_opts)
            .context("Failed to load environment variables")?;

        let config: Self = builder.build().context("Failed to build configuration")?;

        Ok(config)
    }

    /// Load configuration with custom database path.
    ///
    /// This is used when the --db CLI flag is provided.
    pub fn load_with_db_path(db_path: PathBuf) -> Result<Self> {
        let mut config = Self::load()?;
        config.database_path = db_path;
        Ok(config)
    }
}

/// Get the default database path.
///
/// Returns: ~/.local/share/timbre/timbre.db (or platform equivalent)
fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("timbre")
        .join("timbre.db")
}

/// Get the config file path.
///
/// Returns:
/// - Linux: ~/.config/timbre/config.toml
/// - macOS: ~/Library/Application Support/timbre/config.toml
/// - Windows: %APPDATA%\timbre\config.toml
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("timbre")
        .join("config.toml")
}

/// Get the example config file content.
pub fn example_config() -> &'static str {
    r#"# Timbre Configuration File
#
# Configuration is loaded from multiple sources with the following priority:
# 1. CLI arguments (highest priority)
# 2. Environment variables (TIMBRE_* prefix)
# 3. This config file
# 4. Built-in defaults (lowest priority)

# Path to the SQLite property graph holding Track nodes
#
# Can also be set via:
# - CLI: timbre --db /custom/path.db build
# - Environment: TIMBRE_DATABASE_PATH=/custom/path.db
#
# Default: Platform-specific data directory
#database_path = "/path/to/custom/timbre.db"

[logging]
# trace, debug, info, warn, error
level = "info"
coloured = true

[similarity]
# Artist whose tracks anchor seed_vs_random sampling
#seed_artist = "Radiohead"

# seed_vs_random: compare the seed artist's tracks against sample_size
#                 random other tracks
# global_pairs:   compare sample_size random pairs from the whole catalog
strategy = "seed_vs_random"
sample_size = 100

# bounded_similarity: score = 1 / (1 + distance), higher is more similar,
#                     edges are written when score >= threshold
# raw_distance:       score = distance, lower is more similar,
#                     edges are written when score <= threshold
scoring_policy = "bounded_similarity"
threshold = 0.5

# Min-max normalize features to [0, 1] before measuring distance.
# Alternatively set normalize = false and weighting = "range_scaled".
normalize = true
weighting = "uniform"

# upsert: one MATCHED edge per pair, re-runs update the score
# append: every run adds new edges
write_policy = "upsert"

# encode: explicit counts as 1/0; exclude: ignore it
explicit = "encode"

# Restrict similarity to these attributes (default: every numeric attribute)
#features = ["danceability", "energy", "valence", "tempo"]

# Fix the random source for reproducible samples
#rng_seed = 42

recommend_k = 10
track_label = "Track"
"#
}

/// Create default config file if it doesn't exist.
///
/// Returns true if a new file was created, false if it already existed.
pub fn ensure_config_file() -> Result<bool> {
    let config_path = config_file_path();

    if config_path.exists() {
        return Ok(false);
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    std::fs::write(&config_path, example_config()).context("Failed to write config file")?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(!config.database_path.as_os_str().is_empty());
        assert_eq!(config.logging.level, "info");
        assert!(config.similarity.normalize);
        assert_eq!(config.similarity.scoring_policy, ScoringPolicy::BoundedSimilarity);
    }

    #[test]
    fn test_config_load() {
        // Should not fail even if config file doesn't exist
        let result = Config::load();
        assert!(result.is_ok());
    }

    #[test]
    fn test_config_with_custom_db_path() {
        let custom_path = PathBuf::from("/tmp/test.db");
        let config = Config::load_with_db_path(custom_path.clone());
        assert!(config.is_ok());
        assert_eq!(config.unwrap().database_path, custom_path);
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config = toml::from_str(example_config()).unwrap();
        assert_eq!(config.similarity, SimilarityConfig::default());
    }

    #[test]
    fn test_partial_section_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[similarity]
seed_artist = "Air"
scoring_policy = "raw_distance"
threshold = 0.8
"#,
        )
        .unwrap();
        assert_eq!(config.similarity.seed_artist.as_deref(), Some("Air"));
        assert_eq!(config.similarity.scoring_policy, ScoringPolicy::RawDistance);
        assert_eq!(config.similarity.sample_size, 100);
        assert!(config.similarity.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let base = SimilarityConfig {
            seed_artist: Some("Air".to_string()),
            ..SimilarityConfig::default()
        };
        assert!(base.validate().is_ok());

        let zero = SimilarityConfig {
            sample_size: 0,
            ..base.clone()
        };
        assert!(zero.validate().is_err());

        let out_of_range = SimilarityConfig {
            threshold: 1.5,
            ..base.clone()
        };
        assert!(out_of_range.validate().is_err());

        let double_scaled = SimilarityConfig {
            weighting: Weighting::RangeScaled,
            ..base.clone()
        };
        assert!(double_scaled.validate().is_err());

        let no_seed = SimilarityConfig {
            seed_artist: None,
            ..base
        };
        assert!(matches!(
            no_seed.validate(),
            Err(SimilarityError::InvalidConfig(_))
        ));
    }
}
