use crate::error::PredictorError;

/// Convert decimal odds to implied probability
/// Decimal odds of 2.50 pay 2.50 per unit staked (stake included)
pub fn decimal_odds_to_probability(odds: f64) -> Result<f64, PredictorError> {
    if !odds.is_finite() || odds <= 1.0 {
        return Err(PredictorError::InvalidOdds(odds));
    }
    Ok(1.0 / odds)
}

/// Odds-derived model inputs: (home - away price, implied home probability).
/// Falls back to (0, 0) when either price is missing or unusable.
pub fn odds_features(odds_home: Option<f64>, odds_away: Option<f64>) -> (f64, f64) {
    match (odds_home, odds_away) {
        (Some(home), Some(away)) if away.is_finite() => match decimal_odds_to_probability(home) {
            Ok(implied_home) => (home - away, implied_home),
            Err(_) => (0.0, 0.0),
        },
        _ => (0.0, 0.0),
    }
}

/// Normalise the three implied probabilities of a 1X2 market so they sum to one
pub fn remove_overround(
    odds_home: f64,
    odds_draw: f64,
    odds_away: f64,
) -> Result<[f64; 3], PredictorError> {
    let raw = [
        decimal_odds_to_probability(odds_home)?,
        decimal_odds_to_probability(odds_draw)?,
        decimal_odds_to_probability(odds_away)?,
    ];
    let book: f64 = raw.iter().sum();
    Ok(raw.map(|p| p / book))
}

/// Expected value per unit staked at decimal odds
/// EV = p * (odds - 1) - (1 - p)
pub fn expected_value(model_prob: f64, odds: f64) -> f64 {
    model_prob * (odds - 1.0) - (1.0 - model_prob)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_odds_to_probability() {
        let prob = decimal_odds_to_probability(2.0).unwrap();
        assert!((prob - 0.5).abs() < 1e-12);
        let prob = decimal_odds_to_probability(4.0).unwrap();
        assert!((prob - 0.25).abs() < 1e-12);
        assert!(decimal_odds_to_probability(1.0).is_err());
        assert!(decimal_odds_to_probability(f64::NAN).is_err());
    }

    #[test]
    fn test_odds_features() {
        let (diff, implied) = odds_features(Some(1.5), Some(6.0));
        assert!((diff + 4.5).abs() < 1e-12);
        assert!((implied - 1.0 / 1.5).abs() < 1e-12);

        assert_eq!(odds_features(None, Some(2.0)), (0.0, 0.0));
        assert_eq!(odds_features(Some(0.5), Some(2.0)), (0.0, 0.0));
    }

    #[test]
    fn test_remove_overround() {
        let probs = remove_overround(2.0, 3.4, 3.8).unwrap();
        let total: f64 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(probs[0] > probs[1] && probs[1] > probs[2]);
    }

    #[test]
    fn test_expected_value() {
        // 60% at evens is a good bet
        assert!(expected_value(0.6, 2.0) > 0.0);
        // 30% at 3.0 is a bad one
        assert!(expected_value(0.3, 3.0) < 0.0);
        assert!(expected_value(0.5, 2.0).abs() < 1e-12);
    }
}
