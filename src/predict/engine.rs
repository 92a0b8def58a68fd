use crate::error::PredictorError;
use crate::features::elo::{EloLookup, TeamRating};
use crate::features::engineering::{FeatureConfig, FeatureSet, FeatureState};
use crate::models::{MatchRecord, Prediction};
use crate::training::trainer::{SavedModel, Target};
use crate::utils::odds::decimal_odds_to_probability;
use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, warn};

/// Maps the many spellings of a club to one canonical name
#[derive(Debug, Clone, Default)]
pub struct TeamAliases {
    aliases: HashMap<String, String>,
}

impl TeamAliases {
    /// Load a JSON object of `alias -> canonical name`
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read team aliases {}", path.display()))?;
        let map: HashMap<String, String> =
            serde_json::from_str(&raw).context("Failed to parse team aliases")?;
        Ok(Self::from_map(map))
    }

    pub fn from_map(map: HashMap<String, String>) -> Self {
        Self {
            aliases: map
                .into_iter()
                .map(|(alias, canonical)| (alias.to_lowercase(), canonical))
                .collect(),
        }
    }

    pub fn resolve(&self, cleaned: &str) -> Option<&str> {
        self.aliases.get(cleaned).map(String::as_str)
    }

    /// Every canonical club name, sorted and de-duplicated
    pub fn supported_teams(&self) -> Vec<String> {
        self.aliases
            .values()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .cloned()
            .collect()
    }
}

/// Capitalise the first letter of every word, lowercase the rest
fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphabetic() {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    out
}

/// Turn user input like " Arsenal FC " or "man utd" into a canonical club name
pub fn normalize_team_name(raw: &str, aliases: &TeamAliases) -> String {
    let lowered = raw.trim().to_lowercase();
    let cleaned = lowered
        .split_whitespace()
        .filter(|token| *token != "fc")
        .collect::<Vec<_>>()
        .join(" ");
    let canonical = aliases.resolve(&cleaned).unwrap_or(cleaned.as_str());
    title_case(canonical)
}

/// Scores fixtures with a trained outcome model and the current league state
pub struct PredictionEngine {
    outcome_model: SavedModel,
    btts_model: Option<SavedModel>,
    ratings: Option<Box<dyn EloLookup + Send + Sync>>,
    aliases: TeamAliases,
    state: FeatureState,
    fixture_date: Option<NaiveDate>,
}

impl PredictionEngine {
    /// Build from a trained outcome model and the match history that the
    /// live form, head-to-head and running Elo are computed from
    pub fn new(
        outcome_model: SavedModel,
        history: &[MatchRecord],
        features: FeatureConfig,
    ) -> Result<Self> {
        if outcome_model.target != Target::Outcome {
            anyhow::bail!("Expected an outcome model, got {:?}", outcome_model.target);
        }
        if outcome_model.feature_set == FeatureSet::Odds {
            anyhow::bail!("The odds-only model cannot score fixtures, use predict_from_odds");
        }

        Ok(Self {
            outcome_model,
            btts_model: None,
            ratings: None,
            aliases: TeamAliases::default(),
            state: FeatureState::from_history(history, features),
            fixture_date: None,
        })
    }

    pub fn with_btts_model(mut self, model: SavedModel) -> Self {
        if model.target == Target::Btts {
            self.btts_model = Some(model);
        } else {
            warn!("Ignoring {:?} model passed as the BTTS model", model.target);
        }
        self
    }

    /// Use an external ratings snapshot instead of the running Elo table
    pub fn with_ratings(mut self, ratings: impl EloLookup + Send + Sync + 'static) -> Self {
        self.ratings = Some(Box::new(ratings));
        self
    }

    pub fn with_aliases(mut self, aliases: TeamAliases) -> Self {
        self.aliases = aliases;
        self
    }

    /// Date of the fixture being scored, used for rest-day features
    pub fn on_date(mut self, date: NaiveDate) -> Self {
        self.fixture_date = Some(date);
        self
    }

    fn rating(&self, team: &str) -> Option<TeamRating> {
        match &self.ratings {
            Some(table) => table.lookup(team),
            None => self
                .state
                .knows(team)
                .then(|| self.state.running_rating(team)),
        }
    }

    /// Predict home win / draw / away win (and BTTS when a model is loaded).
    /// `odds` are the decimal home and away prices, when known.
    pub fn predict_match(
        &self,
        home_raw: &str,
        away_raw: &str,
        odds: Option<(f64, f64)>,
    ) -> Result<Prediction, PredictorError> {
        let home = normalize_team_name(home_raw, &self.aliases);
        let away = normalize_team_name(away_raw, &self.aliases);

        let (Some(home_rating), Some(away_rating)) = (self.rating(&home), self.rating(&away))
        else {
            return Err(PredictorError::TeamNotFound {
                home: home_raw.to_string(),
                away: away_raw.to_string(),
            });
        };
        if !self.state.knows(&home) || !self.state.knows(&away) {
            debug!("No match history for {} or {}, form features are empty", home, away);
        }

        let (odds_home, odds_away) = match odds {
            Some((h, a)) => (Some(h), Some(a)),
            None => (None, None),
        };
        let features = self.state.features(
            &home,
            &away,
            self.fixture_date,
            (home_rating, away_rating),
            (odds_home, odds_away),
        );

        let row = self.outcome_model.feature_set.select(&features);
        let probs = self.outcome_model.predict_proba(&row)?;
        let btts = match &self.btts_model {
            Some(model) => {
                let row = model.feature_set.select(&features);
                model.predict_proba(&row)?.get(1).copied()
            }
            None => None,
        };

        Ok(Prediction::from_probabilities(home, away, &probs, btts))
    }
}

/// Score a fixture from its Bet365-style home, draw and away prices alone
pub fn predict_from_odds(
    model: &SavedModel,
    odds_home: f64,
    odds_draw: f64,
    odds_away: f64,
) -> Result<Prediction, PredictorError> {
    for odds in [odds_home, odds_draw, odds_away] {
        decimal_odds_to_probability(odds)?;
    }
    let probs = model.predict_proba(&[odds_home, odds_draw, odds_away])?;
    Ok(Prediction::from_probabilities(
        "Home".to_string(),
        "Away".to_string(),
        &probs,
        None,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::elo::EloTable;
    use crate::features::engineering::build_feature_table;
    use crate::training::trainer::tests::{quick_config, synthetic_league};
    use crate::training::trainer::{train_btts_model, train_odds_model, train_outcome_model};

    fn aliases() -> TeamAliases {
        TeamAliases::from_map(HashMap::from([
            ("Man Utd".to_string(), "manchester united".to_string()),
            ("man united".to_string(), "manchester united".to_string()),
            ("spurs".to_string(), "tottenham".to_string()),
        ]))
    }

    #[test]
    fn test_normalize_team_name() {
        let aliases = aliases();
        assert_eq!(normalize_team_name("  Man Utd ", &aliases), "Manchester United");
        assert_eq!(normalize_team_name("SPURS", &aliases), "Tottenham");
        assert_eq!(normalize_team_name("Arsenal FC", &aliases), "Arsenal");
        assert_eq!(normalize_team_name("fc barcelona", &aliases), "Barcelona");
        // "fc" inside a word is left alone
        assert_eq!(normalize_team_name("Fcsb", &aliases), "Fcsb");
        assert_eq!(normalize_team_name("brighton-hove", &aliases), "Brighton-Hove");
    }

    #[test]
    fn test_supported_teams() {
        assert_eq!(
            aliases().supported_teams(),
            vec!["manchester united".to_string(), "tottenham".to_string()]
        );
    }

    #[test]
    fn test_load_aliases() {
        let dir = std::env::temp_dir().join(format!("edgeplay_aliases_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("club_name_mapping.json");
        std::fs::write(&path, r#"{"Wolves": "wolverhampton"}"#).unwrap();
        let aliases = TeamAliases::load(&path).unwrap();
        assert_eq!(normalize_team_name("wolves", &aliases), "Wolverhampton");
    }

    fn engine() -> PredictionEngine {
        let history = synthetic_league(20);
        let rows = build_feature_table(&history, FeatureConfig::default());
        let (outcome, _) =
            train_outcome_model(&rows, FeatureSet::Enhanced, &quick_config()).unwrap();
        let (btts, _) = train_btts_model(&rows, FeatureSet::Enhanced13, &quick_config()).unwrap();
        PredictionEngine::new(outcome, &history, FeatureConfig::default())
            .unwrap()
            .with_btts_model(btts)
    }

    #[test]
    fn test_predict_match_with_running_elo() {
        let engine = engine();
        let prediction = engine.predict_match("strong1", "Weak2", Some((1.3, 9.0))).unwrap();
        assert_eq!(prediction.home_team, "Strong1");
        let total = prediction.home_win + prediction.draw + prediction.away_win;
        assert!((total - 100.0).abs() < 0.05);
        assert!(prediction.btts.is_some());
    }

    #[test]
    fn test_unknown_team_names_raw_input() {
        let engine = engine();
        let err = engine.predict_match("Nowhere FC", "weak1", None).unwrap_err();
        assert_eq!(err.to_string(), "Could not find teams: Nowhere FC vs weak1");
    }

    #[test]
    fn test_predict_match_with_rating_table() {
        let table = EloTable::from_rows(vec![
            ("Strong1".to_string(), 1800.0, Some(1)),
            ("Weak1".to_string(), 1400.0, Some(20)),
        ]);
        let engine = engine().with_ratings(table);
        assert!(engine.predict_match("Strong1", "Weak1", None).is_ok());
        // Known from history but missing from the snapshot
        assert!(matches!(
            engine.predict_match("Strong2", "Weak1", None),
            Err(PredictorError::TeamNotFound { .. })
        ));
    }

    #[test]
    fn test_engine_rejects_odds_model() {
        let history = synthetic_league(5);
        let (odds_model, _) = train_odds_model(&history, &quick_config()).unwrap();
        assert!(PredictionEngine::new(odds_model, &history, FeatureConfig::default()).is_err());
    }

    #[test]
    fn test_predict_from_odds() {
        let history = synthetic_league(20);
        let (model, _) = train_odds_model(&history, &quick_config()).unwrap();
        let prediction = predict_from_odds(&model, 1.3, 5.0, 9.0).unwrap();
        assert_eq!(prediction.favourite(), crate::models::Outcome::HomeWin);
        assert!(matches!(
            predict_from_odds(&model, 0.9, 3.0, 4.0),
            Err(PredictorError::InvalidOdds(_))
        ));
    }
}
