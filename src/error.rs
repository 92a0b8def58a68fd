use thiserror::Error;

/// Errors raised by the prediction pipeline itself (as opposed to I/O failures,
/// which are reported through `anyhow` with context)
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("Could not find teams: {home} vs {away}")]
    TeamNotFound { home: String, away: String },

    #[error("Not enough variety in match results: found {found} of {expected} classes")]
    InsufficientClassVariety { found: usize, expected: usize },

    #[error("Model expects {expected} features but received {received}")]
    FeatureMismatch { expected: usize, received: usize },

    #[error("Dataset is empty: {0}")]
    EmptyDataset(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid decimal odds: {0}")]
    InvalidOdds(f64),

    #[error("Invalid label {label} for {num_class} classes")]
    InvalidLabel { label: i64, num_class: usize },

    #[error("Got {rows} feature rows but {labels} labels")]
    LabelCountMismatch { rows: usize, labels: usize },
}
