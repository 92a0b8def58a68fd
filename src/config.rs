use crate::features::elo::EloConfig;
use crate::features::engineering::FeatureConfig;
use crate::features::form::FormScope;
use crate::training::gbm::BoosterConfig;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_FORM_WINDOW: usize = 5;
pub const DEFAULT_H2H_WINDOW: usize = 3;
pub const DEFAULT_SEED: u64 = 42;

/// Paths and tuning knobs shared by every pipeline step
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub model_dir: PathBuf,
    pub form_window: usize,
    pub h2h_window: usize,
    pub booster: BoosterConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            model_dir: PathBuf::from("models"),
            form_window: DEFAULT_FORM_WINDOW,
            h2h_window: DEFAULT_H2H_WINDOW,
            booster: BoosterConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load defaults, then apply any `EDGEPLAY_*` overrides from the
    /// environment (including a `.env` file)
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let mut config = Self::default();
        if let Ok(dir) = std::env::var("EDGEPLAY_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("EDGEPLAY_MODEL_DIR") {
            config.model_dir = PathBuf::from(dir);
        }
        config.form_window = env_or("EDGEPLAY_FORM_WINDOW", config.form_window).max(1);
        config.h2h_window = env_or("EDGEPLAY_H2H_WINDOW", config.h2h_window).max(1);
        config.booster.seed = env_or("EDGEPLAY_SEED", config.booster.seed);
        config
    }

    pub fn seasons_dir(&self) -> PathBuf {
        self.data_dir.join("seasons")
    }

    pub fn historical_matches(&self) -> PathBuf {
        self.data_dir.join("historical_matches.csv")
    }

    pub fn form_dataset(&self) -> PathBuf {
        self.data_dir.join("historical_matches_with_form.csv")
    }

    pub fn enhanced_dataset(&self) -> PathBuf {
        self.data_dir.join("historical_matches_fully_enhanced.csv")
    }

    pub fn new_results(&self) -> PathBuf {
        self.data_dir.join("new_results.csv")
    }

    pub fn elo_ratings(&self) -> PathBuf {
        self.data_dir.join("clubelo_ratings.csv")
    }

    pub fn team_aliases(&self) -> PathBuf {
        self.data_dir.join("club_name_mapping.json")
    }

    pub fn outcome_model(&self) -> PathBuf {
        self.model_dir.join("match_outcome_model.json")
    }

    pub fn btts_model(&self) -> PathBuf {
        self.model_dir.join("btts_model.json")
    }

    pub fn odds_model(&self) -> PathBuf {
        self.model_dir.join("odds_model.json")
    }

    pub fn feature_config(&self) -> FeatureConfig {
        FeatureConfig {
            form_window: self.form_window,
            h2h_window: self.h2h_window,
            form_scope: FormScope::Venue,
            elo: EloConfig::default(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths() {
        let config = PipelineConfig::default();
        assert_eq!(
            config.historical_matches(),
            PathBuf::from("data/historical_matches.csv")
        );
        assert_eq!(config.seasons_dir(), PathBuf::from("data/seasons"));
        assert_eq!(
            config.outcome_model(),
            PathBuf::from("models/match_outcome_model.json")
        );
        assert_eq!(config.form_window, 5);
        assert_eq!(config.h2h_window, 3);
        assert_eq!(config.feature_config().form_window, 5);
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("EDGEPLAY_TEST_WINDOW", "not-a-number");
        assert_eq!(env_or("EDGEPLAY_TEST_WINDOW", 7usize), 7);
        std::env::set_var("EDGEPLAY_TEST_WINDOW", " 9 ");
        assert_eq!(env_or("EDGEPLAY_TEST_WINDOW", 7usize), 9);
        std::env::remove_var("EDGEPLAY_TEST_WINDOW");
        assert_eq!(env_or("EDGEPLAY_TEST_WINDOW", 7usize), 7);
    }
}
