use crate::error::PredictorError;
use crate::features::engineering::{build_feature_table, FeatureConfig, FeatureRow, FeatureSet};
use crate::models::{MatchRecord, NewResult, Outcome};
use crate::training::gbm::{BoosterConfig, GradientBooster, Objective};
use crate::training::metrics::{accuracy, log_loss, train_test_split, ConfusionMatrix};
use crate::utils::data::{dedupe_matches, load_from_cache, save_to_cache};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

pub const TEST_FRACTION: f64 = 0.2;

/// What a saved model predicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Target {
    /// Home win / draw / away win
    Outcome,
    /// Both teams score
    Btts,
}

impl Target {
    fn labels(&self) -> &'static [&'static str] {
        match self {
            Target::Outcome => &["H", "D", "A"],
            Target::Btts => &["no", "yes"],
        }
    }

    fn objective(&self) -> Objective {
        match self {
            Target::Outcome => Objective::Multiclass {
                num_class: Outcome::NUM_CLASSES,
            },
            Target::Btts => Objective::Binary,
        }
    }
}

/// A booster together with the column layout it was trained on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedModel {
    pub target: Target,
    pub feature_set: FeatureSet,
    pub booster: GradientBooster,
}

impl SavedModel {
    pub fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, PredictorError> {
        self.booster.predict_proba(features)
    }
}

/// Held-out evaluation of a freshly trained model
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub target: Target,
    pub rows: usize,
    pub test_rows: usize,
    pub accuracy: f64,
    pub log_loss: f64,
    pub confusion: ConfusionMatrix,
    pub top_features: Vec<(String, usize)>,
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:?} model: {} rows, {} held out | accuracy {:.2}% | log loss {:.4}",
            self.target,
            self.rows,
            self.test_rows,
            self.accuracy * 100.0,
            self.log_loss
        )?;
        write!(f, "{}", self.confusion)?;
        for (name, splits) in self.top_features.iter().take(5) {
            writeln!(f, "  {:<24} {} splits", name, splits)?;
        }
        Ok(())
    }
}

fn class_count(labels: &[usize]) -> usize {
    labels.iter().collect::<BTreeSet<_>>().len()
}

/// Score a held-out split, then refit on every row
fn fit_and_evaluate(
    target: Target,
    feature_set: FeatureSet,
    x: Vec<Vec<f64>>,
    y: Vec<usize>,
    config: &BoosterConfig,
) -> Result<(SavedModel, TrainingReport), PredictorError> {
    let objective = target.objective();
    let expected = objective.num_class();
    let found = class_count(&y);
    if found < expected {
        return Err(PredictorError::InsufficientClassVariety { found, expected });
    }

    let names = feature_set.names();
    let (train_idx, test_idx) = train_test_split(x.len(), TEST_FRACTION, config.seed);
    let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<usize>) {
        idx.iter().map(|&i| (x[i].clone(), y[i])).unzip()
    };
    let (x_train, y_train) = pick(&train_idx);
    let (x_test, y_test) = pick(&test_idx);

    let holdout = GradientBooster::fit(*config, objective, names.clone(), &x_train, &y_train)?;
    let probabilities = x_test
        .iter()
        .map(|row| holdout.predict_proba(row))
        .collect::<Result<Vec<_>, _>>()?;
    let predicted: Vec<usize> = x_test
        .iter()
        .map(|row| holdout.predict(row))
        .collect::<Result<Vec<_>, _>>()?;

    let booster = GradientBooster::fit(*config, objective, names, &x, &y)?;
    let report = TrainingReport {
        target,
        rows: x.len(),
        test_rows: y_test.len(),
        accuracy: accuracy(&predicted, &y_test),
        log_loss: log_loss(&probabilities, &y_test),
        confusion: ConfusionMatrix::new(target.labels(), &predicted, &y_test),
        top_features: booster.feature_importance(),
    };
    info!(
        "Trained {:?} model on {} rows: held-out accuracy {:.2}%",
        target,
        report.rows,
        report.accuracy * 100.0
    );

    Ok((
        SavedModel {
            target,
            feature_set,
            booster,
        },
        report,
    ))
}

/// Train the outcome classifier on Bet365 prices alone. Matches without a
/// full set of prices are skipped.
pub fn train_odds_model(
    matches: &[MatchRecord],
    config: &BoosterConfig,
) -> Result<(SavedModel, TrainingReport), PredictorError> {
    let (x, y): (Vec<Vec<f64>>, Vec<usize>) = matches
        .iter()
        .filter_map(|m| {
            Some((
                vec![m.odds_home?, m.odds_draw?, m.odds_away?],
                m.outcome().class_index(),
            ))
        })
        .unzip();

    if x.is_empty() {
        return Err(PredictorError::EmptyDataset(
            "no matches with complete Bet365 odds".to_string(),
        ));
    }
    fit_and_evaluate(Target::Outcome, FeatureSet::Odds, x, y, config)
}

fn table(
    rows: &[FeatureRow],
    feature_set: FeatureSet,
    label: impl Fn(&FeatureRow) -> Result<usize, PredictorError>,
) -> Result<(Vec<Vec<f64>>, Vec<usize>), PredictorError> {
    let mut x = Vec::with_capacity(rows.len());
    let mut y = Vec::with_capacity(rows.len());
    for row in rows {
        if let Some(features) = feature_set.extract(row) {
            x.push(features);
            y.push(label(row)?);
        }
    }
    if x.is_empty() {
        return Err(PredictorError::EmptyDataset(format!(
            "no usable rows for {:?} features",
            feature_set
        )));
    }
    Ok((x, y))
}

/// Train the home/draw/away classifier on the enhanced feature table
pub fn train_outcome_model(
    rows: &[FeatureRow],
    feature_set: FeatureSet,
    config: &BoosterConfig,
) -> Result<(SavedModel, TrainingReport), PredictorError> {
    let (x, y) = table(rows, feature_set, |row| Ok(row.outcome()?.class_index()))?;
    fit_and_evaluate(Target::Outcome, feature_set, x, y, config)
}

/// Train the both-teams-to-score classifier on the enhanced feature table
pub fn train_btts_model(
    rows: &[FeatureRow],
    feature_set: FeatureSet,
    config: &BoosterConfig,
) -> Result<(SavedModel, TrainingReport), PredictorError> {
    let (x, y) = table(rows, feature_set, |row| Ok(usize::from(row.btts > 0)))?;
    fit_and_evaluate(Target::Btts, feature_set, x, y, config)
}

/// Result of folding new results into the history
pub struct RetrainOutcome {
    pub history: Vec<MatchRecord>,
    pub rows: Vec<FeatureRow>,
    pub added: usize,
    pub model: Option<(SavedModel, TrainingReport)>,
}

/// Append freshly completed matches to the history, rebuild the feature table
/// and retrain the outcome model. Retraining is skipped (with a warning) when
/// the table does not contain all three results.
pub fn append_and_retrain(
    history: Vec<MatchRecord>,
    new_results: Vec<NewResult>,
    features: FeatureConfig,
    config: &BoosterConfig,
) -> Result<RetrainOutcome, PredictorError> {
    let mut combined = dedupe_matches(history);
    let before = combined.len();
    combined.extend(new_results.into_iter().map(MatchRecord::from));
    let combined = dedupe_matches(combined);
    let added = combined.len() - before;
    info!("Appended {} new matches to historical dataset", added);

    let rows = build_feature_table(&combined, features);
    let model = match train_outcome_model(&rows, FeatureSet::Enhanced13, config) {
        Ok(trained) => Some(trained),
        Err(PredictorError::InsufficientClassVariety { found, expected }) => {
            warn!(
                "Not enough variety in match results to retrain ({} of {} classes). Skipping.",
                found, expected
            );
            None
        }
        Err(e) => return Err(e),
    };

    Ok(RetrainOutcome {
        history: combined,
        rows,
        added,
        model,
    })
}

pub fn save_model(model: &SavedModel, path: &Path) -> Result<()> {
    save_to_cache(model, path)
        .with_context(|| format!("Failed to save model to {}", path.display()))
}

pub fn load_model(path: &Path) -> Result<SavedModel> {
    load_from_cache(path).with_context(|| format!("Failed to load model from {}", path.display()))
}
