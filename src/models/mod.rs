use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A completed football match from the merged history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub date: NaiveDate,
    pub league: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub home_goals: u32, // FTHG
    pub away_goals: u32, // FTAG
    pub odds_home: Option<f64>, // Bet365 decimal odds
    pub odds_draw: Option<f64>,
    pub odds_away: Option<f64>,
    pub source_file: Option<String>,
}

impl MatchRecord {
    pub fn outcome(&self) -> Outcome {
        Outcome::from_scores(self.home_goals, self.away_goals)
    }

    pub fn both_teams_scored(&self) -> bool {
        self.home_goals > 0 && self.away_goals > 0
    }

    /// Home goals minus away goals
    pub fn goal_margin(&self) -> i32 {
        self.home_goals as i32 - self.away_goals as i32
    }

    /// Key used to drop duplicate rows across season files
    pub fn dedupe_key(&self) -> (NaiveDate, String, String) {
        (self.date, self.home_team.clone(), self.away_team.clone())
    }
}

/// Full-time result of a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    HomeWin,
    Draw,
    AwayWin,
}

impl Outcome {
    pub const NUM_CLASSES: usize = 3;

    pub fn from_scores(home_goals: u32, away_goals: u32) -> Self {
        match home_goals.cmp(&away_goals) {
            std::cmp::Ordering::Greater => Outcome::HomeWin,
            std::cmp::Ordering::Equal => Outcome::Draw,
            std::cmp::Ordering::Less => Outcome::AwayWin,
        }
    }

    /// Parse an FTR letter (H, D, A)
    pub fn from_ftr(ftr: &str) -> Option<Self> {
        match ftr.trim() {
            "H" | "h" => Some(Outcome::HomeWin),
            "D" | "d" => Some(Outcome::Draw),
            "A" | "a" => Some(Outcome::AwayWin),
            _ => None,
        }
    }

    /// Parse the signed result target (1 = home win, 0 = draw, -1 = away win)
    pub fn from_signed(result: i8) -> Option<Self> {
        match result {
            1 => Some(Outcome::HomeWin),
            0 => Some(Outcome::Draw),
            -1 => Some(Outcome::AwayWin),
            _ => None,
        }
    }

    pub fn signed(&self) -> i8 {
        match self {
            Outcome::HomeWin => 1,
            Outcome::Draw => 0,
            Outcome::AwayWin => -1,
        }
    }

    /// Class index used by the classifiers: H=0, D=1, A=2
    pub fn class_index(&self) -> usize {
        match self {
            Outcome::HomeWin => 0,
            Outcome::Draw => 1,
            Outcome::AwayWin => 2,
        }
    }

    pub fn from_class_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Outcome::HomeWin),
            1 => Some(Outcome::Draw),
            2 => Some(Outcome::AwayWin),
            _ => None,
        }
    }

    pub fn ftr(&self) -> &'static str {
        match self {
            Outcome::HomeWin => "H",
            Outcome::Draw => "D",
            Outcome::AwayWin => "A",
        }
    }
}

/// Trailing-window summary of a team's recent matches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormFeatures {
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub scored: u32,
    pub conceded: u32,
    pub played: u32,
}

impl FormFeatures {
    /// Wins plus half a point per draw
    pub fn points(&self) -> f64 {
        self.wins as f64 + 0.5 * self.draws as f64
    }

    pub fn goal_balance(&self) -> i64 {
        self.scored as i64 - self.conceded as i64
    }

    pub fn win_rate(&self) -> f64 {
        if self.played == 0 {
            0.0
        } else {
            self.wins as f64 / self.played as f64
        }
    }
}

/// A completed match as reported by a daily results feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewResult {
    pub date: NaiveDate,
    pub league: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub home_score: u32,
    pub away_score: u32,
}

impl From<NewResult> for MatchRecord {
    fn from(result: NewResult) -> Self {
        MatchRecord {
            date: result.date,
            league: result.league,
            home_team: result.home_team,
            away_team: result.away_team,
            home_goals: result.home_score,
            away_goals: result.away_score,
            odds_home: None,
            odds_draw: None,
            odds_away: None,
            source_file: Some("new_results".to_string()),
        }
    }
}

/// Outcome probabilities for a fixture, as percentages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub home_team: String,
    pub away_team: String,
    pub home_win: f64,
    pub draw: f64,
    pub away_win: f64,
    pub btts: Option<f64>,
}

impl Prediction {
    /// Build from class probabilities ordered H, D, A
    pub fn from_probabilities(
        home_team: String,
        away_team: String,
        probs: &[f64],
        btts_prob: Option<f64>,
    ) -> Self {
        let pct = |p: f64| (p * 10_000.0).round() / 100.0;
        Self {
            home_team,
            away_team,
            home_win: pct(probs.first().copied().unwrap_or(0.0)),
            draw: pct(probs.get(1).copied().unwrap_or(0.0)),
            away_win: pct(probs.get(2).copied().unwrap_or(0.0)),
            btts: btts_prob.map(pct),
        }
    }

    /// Most likely result
    pub fn favourite(&self) -> Outcome {
        if self.home_win >= self.draw && self.home_win >= self.away_win {
            Outcome::HomeWin
        } else if self.away_win >= self.draw {
            Outcome::AwayWin
        } else {
            Outcome::Draw
        }
    }

    pub fn format(&self) -> String {
        let mut line = format!(
            "{} vs {} | {} Win: {:.2}% | Draw: {:.2}% | {} Win: {:.2}%",
            self.home_team,
            self.away_team,
            self.home_team,
            self.home_win,
            self.draw,
            self.away_team,
            self.away_win
        );
        if let Some(btts) = self.btts {
            line.push_str(&format!(" | BTTS: {:.2}%", btts));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_mappings() {
        assert_eq!(Outcome::from_scores(2, 1), Outcome::HomeWin);
        assert_eq!(Outcome::from_scores(1, 1), Outcome::Draw);
        assert_eq!(Outcome::from_scores(0, 3), Outcome::AwayWin);

        assert_eq!(Outcome::from_ftr("H").unwrap().class_index(), 0);
        assert_eq!(Outcome::from_ftr("D").unwrap().class_index(), 1);
        assert_eq!(Outcome::from_ftr("A").unwrap().class_index(), 2);
        assert!(Outcome::from_ftr("X").is_none());

        assert_eq!(Outcome::from_signed(-1), Some(Outcome::AwayWin));
        assert_eq!(Outcome::AwayWin.signed(), -1);
        assert_eq!(Outcome::from_class_index(1), Some(Outcome::Draw));
    }

    #[test]
    fn test_goal_margin_and_btts() {
        let record = MatchRecord {
            date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            league: None,
            home_team: "Fulham".to_string(),
            away_team: "Brentford".to_string(),
            home_goals: 1,
            away_goals: 4,
            odds_home: None,
            odds_draw: None,
            odds_away: None,
            source_file: None,
        };
        assert_eq!(record.goal_margin(), -3);
        assert!(record.both_teams_scored());
        assert_eq!(record.outcome(), Outcome::AwayWin);
    }

    #[test]
    fn test_prediction_rounding() {
        let pred = Prediction::from_probabilities(
            "Arsenal".to_string(),
            "Chelsea".to_string(),
            &[0.512345, 0.25, 0.237655],
            Some(0.55555),
        );
        assert_eq!(pred.home_win, 51.23);
        assert_eq!(pred.draw, 25.0);
        assert_eq!(pred.away_win, 23.77);
        assert_eq!(pred.btts, Some(55.56));
        assert_eq!(pred.favourite(), Outcome::HomeWin);
        assert!(pred.format().contains("BTTS: 55.56%"));
    }

    #[test]
    fn test_form_helpers() {
        let form = FormFeatures {
            wins: 3,
            draws: 1,
            losses: 1,
            scored: 8,
            conceded: 4,
            played: 5,
        };
        assert_eq!(form.points(), 3.5);
        assert_eq!(form.goal_balance(), 4);
        assert!((form.win_rate() - 0.6).abs() < 1e-12);
        assert_eq!(FormFeatures::default().win_rate(), 0.0);
    }
}
