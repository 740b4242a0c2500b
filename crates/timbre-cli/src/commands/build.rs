use anyhow::{Context, Result};
use timbre_similarity::{
    Config, RunContext, SampleStrategy, ScoringPolicy, SimilarityConfig, SimilarityPipeline,
    WritePolicy,
};

use super::open_database;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum StrategyArg {
    SeedVsRandom,
    GlobalPairs,
}

impl From<StrategyArg> for SampleStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::SeedVsRandom => Self::SeedVsRandom,
            StrategyArg::GlobalPairs => Self::GlobalPairs,
        }
    }
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum ScoringArg {
    /// Higher is more similar, 1 / (1 + distance)
    Bounded,
    /// Lower is more similar, plain euclidean distance
    Raw,
}

impl From<ScoringArg> for ScoringPolicy {
    fn from(arg: ScoringArg) -> Self {
        match arg {
            ScoringArg::Bounded => Self::BoundedSimilarity,
            ScoringArg::Raw => Self::RawDistance,
        }
    }
}

#[derive(Debug, Default, clap::Args)]
pub struct BuildArgs {
    /// Artist whose tracks are compared against the sample
    #[arg(long)]
    pub seed_artist: Option<String>,

    /// Number of candidate tracks (or pairs, with --strategy global-pairs)
    #[arg(long, short = 'n')]
    pub sample_size: Option<usize>,

    /// Minimum similarity (bounded) or maximum distance (raw) for an edge
    #[arg(long, short)]
    pub threshold: Option<f64>,

    #[arg(long, value_enum)]
    pub strategy: Option<StrategyArg>,

    #[arg(long, value_enum)]
    pub scoring: Option<ScoringArg>,

    /// Compare raw attribute values instead of normalized ones
    #[arg(long)]
    pub no_normalize: bool,

    /// Insert new edges even when a pair is already matched
    #[arg(long)]
    pub append: bool,

    /// Restrict similarity to these attributes
    #[arg(long, value_delimiter = ',')]
    pub features: Option<Vec<String>>,

    /// Seed the sampler for a reproducible run
    #[arg(long)]
    pub rng_seed: Option<u64>,

    /// Print the run summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl BuildArgs {
    /// Layer the flags over the configured `[similarity]` section.
    fn apply(&self, mut similarity: SimilarityConfig) -> SimilarityConfig {
        if let Some(artist) = &self.seed_artist {
            similarity.seed_artist = Some(artist.clone());
        }
        if let Some(size) = self.sample_size {
            similarity.sample_size = size;
        }
        if let Some(threshold) = self.threshold {
            similarity.threshold = threshold;
        }
        if let Some(strategy) = self.strategy {
            similarity.strategy = strategy.into();
        }
        if let Some(scoring) = self.scoring {
            similarity.scoring_policy = scoring.into();
        }
        if self.no_normalize {
            similarity.normalize = false;
        }
        if self.append {
            similarity.write_policy = WritePolicy::Append;
        }
        if let Some(features) = &self.features {
            similarity.features = Some(features.clone());
        }
        if let Some(seed) = self.rng_seed {
            similarity.rng_seed = Some(seed);
        }
        similarity
    }
}

pub fn run_build(config: &Config, args: &BuildArgs) -> Result<()> {
    let similarity = args.apply(config.similarity.clone());
    let ctx = RunContext::new(similarity).context("Invalid similarity configuration")?;

    let token = ctx.cancellation_token();
    ctrlc::set_handler(move || {
        log::warn!("Interrupted, stopping after the current write");
        token.cancel();
    })
    .context("Failed to install Ctrl-C handler")?;

    let mut db = open_database(config)?;
    log::info!("Building similarity graph in {}", config.database_path.display());

    let summary = SimilarityPipeline::new(ctx)
        .run(&mut db)
        .context("Similarity run failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("\n🎛  Similarity run {}\n", summary.run_id);
    println!("  Pairs considered: {}", summary.pairs_considered);
    println!("  Edges created:    {}", summary.edges_created);
    println!("  Edges updated:    {}", summary.edges_updated);
    println!("  Below threshold:  {}", summary.below_threshold);
    println!("  Skipped (errors): {}", summary.errors_skipped);

    if summary.cancelled {
        println!("\n✗ Run cancelled; edges written so far were kept");
    } else {
        println!("\n✓ Build complete");
    }
    Ok(())
}
