pub mod config;
pub mod error;
pub mod features;
pub mod models;
pub mod predict;
pub mod scrapers;
pub mod training;
pub mod utils;

pub use config::PipelineConfig;
pub use error::PredictorError;
pub use models::*;

use anyhow::{Context, Result};
use features::elo::EloTable;
use features::engineering::{build_feature_table, FeatureRow, FeatureSet};
use features::form::{add_recent_form, FormScope};
use predict::engine::{PredictionEngine, TeamAliases};
use scrapers::football_data::{FootballDataClient, DEFAULT_SEASONS};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use training::trainer::{
    append_and_retrain, load_model, save_model, train_btts_model, train_odds_model,
    train_outcome_model, RetrainOutcome, TrainingReport,
};
use utils::data::{
    load_matches, load_new_results, merge_season_files, read_csv, save_matches, write_csv,
};

/// Download the default season files into the seasons directory. Failed
/// downloads are logged and skipped.
pub async fn download_seasons(config: &PipelineConfig) -> Result<Vec<PathBuf>> {
    let client = FootballDataClient::new();
    let dir = config.seasons_dir();
    let mut saved = Vec::new();

    for (league, season) in DEFAULT_SEASONS {
        match client.save_season(league, season, &dir).await {
            Ok(path) => saved.push(path),
            Err(e) => warn!("Failed to download {} {}: {:#}", league, season, e),
        }
    }
    Ok(saved)
}

/// Merge every season file into the historical dataset and save it
pub fn merge_history(config: &PipelineConfig) -> Result<Vec<MatchRecord>> {
    let matches = merge_season_files(&config.seasons_dir())?;
    if !matches.is_empty() {
        save_matches(&matches, &config.historical_matches())?;
        info!("Saved merged dataset to {}", config.historical_matches().display());
    }
    Ok(matches)
}

fn load_history(config: &PipelineConfig) -> Result<Vec<MatchRecord>> {
    let path = config.historical_matches();
    load_matches(&path).with_context(|| {
        format!("Missing match history at {}, run `merge` first", path.display())
    })
}

/// Attach rolling home and away form to the history and save it
pub fn build_form_dataset(config: &PipelineConfig) -> Result<usize> {
    let matches = load_history(config)?;
    let rows = add_recent_form(&matches, config.form_window, FormScope::Venue);
    write_csv(&rows, &config.form_dataset())?;
    Ok(rows.len())
}

/// Build the fully enhanced training table and save it
pub fn build_enhanced_dataset(config: &PipelineConfig) -> Result<Vec<FeatureRow>> {
    let matches = load_history(config)?;
    let rows = build_feature_table(&matches, config.feature_config());
    write_csv(&rows, &config.enhanced_dataset())?;
    info!(
        "Saved {} enhanced rows to {}",
        rows.len(),
        config.enhanced_dataset().display()
    );
    Ok(rows)
}

/// Train and save the outcome, BTTS and odds-only models
pub fn train_models(config: &PipelineConfig) -> Result<Vec<TrainingReport>> {
    let path = config.enhanced_dataset();
    let rows: Vec<FeatureRow> = read_csv(&path).with_context(|| {
        format!("Missing enhanced dataset at {}, run `enhance` first", path.display())
    })?;
    let mut reports = Vec::new();

    let (outcome, report) = train_outcome_model(&rows, FeatureSet::Enhanced, &config.booster)?;
    save_model(&outcome, &config.outcome_model())?;
    reports.push(report);

    match train_btts_model(&rows, FeatureSet::Enhanced, &config.booster) {
        Ok((btts, report)) => {
            save_model(&btts, &config.btts_model())?;
            reports.push(report);
        }
        Err(e) => warn!("Skipping BTTS model: {}", e),
    }

    let matches = load_history(config)?;
    match train_odds_model(&matches, &config.booster) {
        Ok((odds, report)) => {
            save_model(&odds, &config.odds_model())?;
            reports.push(report);
        }
        Err(e) => warn!("Skipping odds model: {}", e),
    }

    Ok(reports)
}

/// Fold a file of new results into the history, then retrain the outcome
/// model when the data allows it
pub fn retrain_with_results(config: &PipelineConfig, new_results: &Path) -> Result<RetrainOutcome> {
    let history = load_history(config)?;
    let results = load_new_results(new_results)?;
    let outcome = append_and_retrain(history, results, config.feature_config(), &config.booster)?;

    save_matches(&outcome.history, &config.historical_matches())?;
    write_csv(&outcome.rows, &config.enhanced_dataset())?;
    if let Some((model, _)) = &outcome.model {
        save_model(model, &config.outcome_model())?;
        info!("Model retrained and saved to {}", config.outcome_model().display());
    }
    Ok(outcome)
}

/// Team aliases from the data directory, or none when the file is absent
pub fn load_aliases(config: &PipelineConfig) -> Result<TeamAliases> {
    let path = config.team_aliases();
    if path.exists() {
        TeamAliases::load(&path)
    } else {
        warn!("No team aliases at {}", path.display());
        Ok(TeamAliases::default())
    }
}

/// Assemble a prediction engine from the saved models and data files. A
/// ClubElo snapshot is used when present, otherwise Elo is replayed from the
/// match history.
pub fn load_prediction_engine(config: &PipelineConfig) -> Result<PredictionEngine> {
    let outcome = load_model(&config.outcome_model())?;
    let history = load_history(config)?;
    let mut engine = PredictionEngine::new(outcome, &history, config.feature_config())?
        .with_aliases(load_aliases(config)?);

    if config.btts_model().exists() {
        engine = engine.with_btts_model(load_model(&config.btts_model())?);
    }
    if config.elo_ratings().exists() {
        let table = EloTable::load(&config.elo_ratings())?;
        info!("Loaded {} club ratings", table.len());
        engine = engine.with_ratings(table);
    }
    Ok(engine)
}
