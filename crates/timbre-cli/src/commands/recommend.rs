use anyhow::Result;
use timbre_similarity::{Config, Recommender};

use super::open_database;

pub fn run_recommend(config: &Config, artist: &str, k: Option<usize>, json: bool) -> Result<()> {
    let db = open_database(config)?;
    let similarity = &config.similarity;
    let k = k.unwrap_or(similarity.recommend_k);

    let recommender = Recommender::new(&db, similarity.scoring_policy, &similarity.track_label);
    let recommendations = recommender.recommend(artist, k)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recommendations)?);
        return Ok(());
    }

    if recommendations.is_empty() {
        println!("No recommendations for {artist}");
        println!("\n  Run `timbre build --seed-artist \"{artist}\"` first");
        return Ok(());
    }

    println!("\n🎧 Similar to {artist}\n");
    for (rank, rec) in recommendations.iter().enumerate() {
        println!("  {:>2}. {rec}", rank + 1);
    }
    Ok(())
}
