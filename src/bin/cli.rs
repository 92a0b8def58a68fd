use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use edgeplay::predict::engine::predict_from_odds;
use edgeplay::training::trainer::load_model;
use edgeplay::utils::odds::{expected_value, remove_overround};
use edgeplay::{
    build_enhanced_dataset, build_form_dataset, download_seasons, load_aliases,
    load_prediction_engine, merge_history, retrain_with_results, train_models, PipelineConfig,
    PredictorError,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "edgeplay")]
#[command(about = "Football match outcome prediction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download season files from football-data.co.uk
    Download,
    /// Merge season files into the historical dataset
    Merge,
    /// Add rolling home/away form columns to the history
    Form,
    /// Build the fully enhanced training table
    Enhance,
    /// Train the outcome, BTTS and odds-only models
    Train,
    /// Append new results and retrain the outcome model
    Retrain {
        /// CSV of completed matches (date, league, home_team, away_team, home_score, away_score)
        new_results: Option<PathBuf>,
    },
    /// Predict a fixture
    Predict {
        /// Home team name
        home: String,
        /// Away team name
        away: String,
        /// Decimal home and away prices
        #[arg(long, num_args = 2, value_names = ["HOME", "AWAY"])]
        odds: Option<Vec<f64>>,
    },
    /// Predict from home, draw and away prices alone
    PredictOdds {
        home: f64,
        draw: f64,
        away: f64,
    },
    /// List supported team names
    Teams,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = PipelineConfig::from_env();

    match cli.command {
        Commands::Download => {
            let saved = download_seasons(&config).await?;
            println!("Downloaded {} season files", saved.len());
            for path in saved {
                println!("  {}", path.display());
            }
        }
        Commands::Merge => {
            let matches = merge_history(&config)?;
            if matches.is_empty() {
                println!("No season files to merge in {}", config.seasons_dir().display());
            } else {
                println!(
                    "Merged {} matches into {}",
                    matches.len(),
                    config.historical_matches().display()
                );
            }
        }
        Commands::Form => {
            let rows = build_form_dataset(&config)?;
            println!(
                "Added form features to {} matches, saved to {}",
                rows,
                config.form_dataset().display()
            );
        }
        Commands::Enhance => {
            let rows = build_enhanced_dataset(&config)?;
            println!(
                "Enhanced dataset saved to {} ({} rows)",
                config.enhanced_dataset().display(),
                rows.len()
            );
        }
        Commands::Train => {
            for report in train_models(&config)? {
                println!("{}", report);
            }
        }
        Commands::Retrain { new_results } => {
            let path = new_results.unwrap_or_else(|| config.new_results());
            let outcome = retrain_with_results(&config, &path)?;
            println!("Appended {} new matches", outcome.added);
            match outcome.model {
                Some((_, report)) => println!("{}", report),
                None => println!("Not enough variety in match results to retrain. Skipping."),
            }
        }
        Commands::Predict { home, away, odds } => {
            let engine = load_prediction_engine(&config)?
                .on_date(chrono::Local::now().date_naive());
            let odds = match odds.as_deref() {
                Some([h, a]) => Some((*h, *a)),
                _ => None,
            };
            match engine.predict_match(&home, &away, odds) {
                Ok(prediction) => println!("{}", prediction.format()),
                Err(e @ PredictorError::TeamNotFound { .. }) => println!("Match not found. {}", e),
                Err(e) => return Err(e.into()),
            }
        }
        Commands::PredictOdds { home, draw, away } => {
            let model = load_model(&config.odds_model())
                .context("No odds model found, run `train` first")?;
            let prediction = predict_from_odds(&model, home, draw, away)?;
            let market = remove_overround(home, draw, away)?;

            println!("{:<6} {:>8} {:>8} {:>8}", "", "Model %", "Market %", "EV");
            let rows = [
                ("Home", prediction.home_win, market[0], home),
                ("Draw", prediction.draw, market[1], draw),
                ("Away", prediction.away_win, market[2], away),
            ];
            for (label, model_pct, market_prob, price) in rows {
                println!(
                    "{:<6} {:>8.2} {:>8.2} {:>+8.3}",
                    label,
                    model_pct,
                    market_prob * 100.0,
                    expected_value(model_pct / 100.0, price)
                );
            }
        }
        Commands::Teams => {
            let teams = load_aliases(&config)?.supported_teams();
            if teams.is_empty() {
                println!("No team aliases found at {}", config.team_aliases().display());
            } else {
                println!("Supported teams:");
                for team in teams {
                    println!("  {}", team);
                }
            }
        }
    }

    Ok(())
}
