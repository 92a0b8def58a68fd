use crate::error::PredictorError;
use crate::features::elo::{EloConfig, EloRatings, TeamRating};
use crate::features::form::{chronological_order, FormScope, FormTracker, Side};
use crate::models::{FormFeatures, MatchRecord, Outcome};
use crate::utils::odds::odds_features;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Rest days assumed when a team has no previous match on record
pub const DEFAULT_REST_DAYS: f64 = 3.0;
/// Rest days are capped so season breaks do not dominate the feature
pub const MAX_REST_DAYS: f64 = 60.0;
/// A team that played this many days ago or fewer is on a congested schedule
pub const CONGESTION_DAYS: i64 = 3;

/// Settings for the feature builders
#[derive(Debug, Clone, Copy)]
pub struct FeatureConfig {
    pub form_window: usize,
    pub h2h_window: usize,
    pub form_scope: FormScope,
    pub elo: EloConfig,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            form_window: crate::config::DEFAULT_FORM_WINDOW,
            h2h_window: crate::config::DEFAULT_H2H_WINDOW,
            form_scope: FormScope::Venue,
            elo: EloConfig::default(),
        }
    }
}

/// The model inputs for one fixture, in training column order
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub form_diff: f64,
    pub goal_diff: f64,
    pub elo_diff: f64,
    pub rank_diff: f64,
    pub momentum_diff: f64,
    pub home_away_split_diff: f64,
    pub h2h_home_wins_last3: f64,
    pub h2h_away_wins_last3: f64,
    pub h2h_goal_diff_last3: f64,
    pub draw_rate_last5: f64,
    pub avg_goal_diff_last5: f64,
    pub days_since_last_match: f64,
    pub fixture_density_flag: f64,
    pub odds_diff: f64,
    pub implied_prob_home: f64,
}

impl FeatureVector {
    pub const NAMES: [&'static str; 15] = [
        "form_diff",
        "goal_diff",
        "elo_diff",
        "rank_diff",
        "momentum_diff",
        "home_away_split_diff",
        "h2h_home_wins_last3",
        "h2h_away_wins_last3",
        "h2h_goal_diff_last3",
        "draw_rate_last5",
        "avg_goal_diff_last5",
        "days_since_last_match",
        "fixture_density_flag",
        "odds_diff",
        "implied_prob_home",
    ];

    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.form_diff,
            self.goal_diff,
            self.elo_diff,
            self.rank_diff,
            self.momentum_diff,
            self.home_away_split_diff,
            self.h2h_home_wins_last3,
            self.h2h_away_wins_last3,
            self.h2h_goal_diff_last3,
            self.draw_rate_last5,
            self.avg_goal_diff_last5,
            self.days_since_last_match,
            self.fixture_density_flag,
            self.odds_diff,
            self.implied_prob_home,
        ]
    }
}

/// Column layouts the classifiers can be trained on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureSet {
    /// Bet365 home, draw and away prices only
    Odds,
    /// The form, Elo, head-to-head and schedule features (no prices)
    Enhanced13,
    /// Everything in [`FeatureVector`]
    Enhanced,
}

impl FeatureSet {
    pub fn names(&self) -> Vec<String> {
        let names: &[&str] = match self {
            FeatureSet::Odds => &["odds_home", "odds_draw", "odds_away"],
            FeatureSet::Enhanced13 => &FeatureVector::NAMES[..13],
            FeatureSet::Enhanced => &FeatureVector::NAMES,
        };
        names.iter().map(|n| n.to_string()).collect()
    }

    /// Select this set's columns from a full vector
    pub fn select(&self, features: &FeatureVector) -> Vec<f64> {
        let mut values = features.to_vec();
        match self {
            FeatureSet::Enhanced13 => values.truncate(13),
            FeatureSet::Enhanced => {}
            // Prices are not part of the engineered vector
            FeatureSet::Odds => values.clear(),
        }
        values
    }

    /// Extract this set's columns from a table row. Rows without complete
    /// prices yield `None` for the odds-only set.
    pub fn extract(&self, row: &FeatureRow) -> Option<Vec<f64>> {
        match self {
            FeatureSet::Odds => Some(vec![row.b365h?, row.b365d?, row.b365a?]),
            _ => Some(self.select(&row.features())),
        }
    }
}

/// Results of the last few meetings between each pair of clubs
#[derive(Debug, Clone, Default)]
pub struct HeadToHead {
    window: usize,
    /// (host, home goal margin) per meeting, oldest first
    meetings: HashMap<(String, String), VecDeque<(String, i32)>>,
}

impl HeadToHead {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            meetings: HashMap::new(),
        }
    }

    fn key(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }

    pub fn observe(&mut self, record: &MatchRecord) {
        let window = self.window;
        let entry = self
            .meetings
            .entry(Self::key(&record.home_team, &record.away_team))
            .or_default();
        entry.push_back((record.home_team.clone(), record.goal_margin()));
        while entry.len() > window {
            entry.pop_front();
        }
    }

    /// (wins for `home`, wins for `away`, goals by `home` minus goals by `away`)
    /// over their recent meetings at either venue
    pub fn summary(&self, home: &str, away: &str) -> (u32, u32, i64) {
        let Some(meetings) = self.meetings.get(&Self::key(home, away)) else {
            return (0, 0, 0);
        };
        meetings
            .iter()
            .fold((0, 0, 0), |(hw, aw, gd), (hosted_by, host_margin)| {
                let margin = if hosted_by == home {
                    i64::from(*host_margin)
                } else {
                    -i64::from(*host_margin)
                };
                (
                    hw + u32::from(margin > 0),
                    aw + u32::from(margin < 0),
                    gd + margin,
                )
            })
    }
}

/// Everything known about the league at a point in time. Feed matches in
/// chronological order with [`FeatureState::observe`].
#[derive(Debug, Clone)]
pub struct FeatureState {
    config: FeatureConfig,
    form: FormTracker,
    elo: EloRatings,
    h2h: HeadToHead,
}

impl FeatureState {
    pub fn new(config: FeatureConfig) -> Self {
        Self {
            config,
            form: FormTracker::new(config.form_window, config.form_scope),
            elo: EloRatings::new(config.elo),
            h2h: HeadToHead::new(config.h2h_window),
        }
    }

    /// State after every match in `matches`
    pub fn from_history(matches: &[MatchRecord], config: FeatureConfig) -> Self {
        let mut state = Self::new(config);
        for idx in chronological_order(matches) {
            state.observe(&matches[idx]);
        }
        state
    }

    pub fn observe(&mut self, record: &MatchRecord) {
        self.form.observe(record);
        self.elo.update(record);
        self.h2h.observe(record);
    }

    pub fn elo(&self) -> &EloRatings {
        &self.elo
    }

    pub fn form(&self, team: &str, side: Side) -> FormFeatures {
        self.form.form(team, side)
    }

    pub fn knows(&self, team: &str) -> bool {
        self.form.knows(team)
    }

    /// Rating from the running Elo table
    pub fn running_rating(&self, team: &str) -> TeamRating {
        TeamRating {
            elo: self.elo.rating(team),
            rank: self.elo.rank(team),
        }
    }

    fn rest_days(&self, team: &str, date: Option<NaiveDate>) -> Option<i64> {
        let last = self.form.last_played(team)?;
        Some((date? - last).num_days().max(0))
    }

    /// Build the feature vector for `home` vs `away` from the current state
    pub fn features(
        &self,
        home: &str,
        away: &str,
        date: Option<NaiveDate>,
        ratings: (TeamRating, TeamRating),
        odds: (Option<f64>, Option<f64>),
    ) -> FeatureVector {
        let window = self.config.form_window as f64;
        let home_form = self.form.form(home, Side::Home);
        let away_form = self.form.form(away, Side::Away);
        let (home_rating, away_rating) = ratings;
        let (h2h_home_wins, h2h_away_wins, h2h_goal_diff) = self.h2h.summary(home, away);

        let momentum_diff = (home_form.goal_balance() - away_form.goal_balance()) as f64;

        let home_rest = self.rest_days(home, date);
        let away_rest = self.rest_days(away, date);
        let days_since_last_match = home_rest
            .map(|d| (d as f64).min(MAX_REST_DAYS))
            .unwrap_or(DEFAULT_REST_DAYS);
        let congested = [home_rest, away_rest]
            .iter()
            .flatten()
            .any(|&d| d <= CONGESTION_DAYS);

        let (odds_diff, implied_prob_home) = odds_features(odds.0, odds.1);

        FeatureVector {
            form_diff: home_form.points() - away_form.points(),
            goal_diff: home_form.scored as f64 - away_form.scored as f64,
            elo_diff: home_rating.elo - away_rating.elo,
            rank_diff: away_rating.rank as f64 - home_rating.rank as f64,
            momentum_diff,
            home_away_split_diff: self.form.venue_win_rate(home, Side::Home)
                - self.form.venue_win_rate(away, Side::Away),
            h2h_home_wins_last3: h2h_home_wins as f64,
            h2h_away_wins_last3: h2h_away_wins as f64,
            h2h_goal_diff_last3: h2h_goal_diff as f64,
            draw_rate_last5: (home_form.draws + away_form.draws) as f64 / (2.0 * window),
            avg_goal_diff_last5: momentum_diff / window,
            days_since_last_match,
            fixture_density_flag: if congested { 1.0 } else { 0.0 },
            odds_diff,
            implied_prob_home,
        }
    }
}

/// One row of the fully enhanced training table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub league: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub fthg: u32,
    pub ftag: u32,
    pub b365h: Option<f64>,
    pub b365d: Option<f64>,
    pub b365a: Option<f64>,
    pub home_last5_wins: u32,
    pub home_last5_draws: u32,
    pub home_last5_losses: u32,
    pub home_last5_scored: u32,
    pub home_last5_conceded: u32,
    pub away_last5_wins: u32,
    pub away_last5_draws: u32,
    pub away_last5_losses: u32,
    pub away_last5_scored: u32,
    pub away_last5_conceded: u32,
    pub form_diff: f64,
    pub goal_diff: f64,
    pub elo_diff: f64,
    pub rank_diff: f64,
    pub momentum_diff: f64,
    pub home_away_split_diff: f64,
    pub h2h_home_wins_last3: f64,
    pub h2h_away_wins_last3: f64,
    pub h2h_goal_diff_last3: f64,
    pub draw_rate_last5: f64,
    pub avg_goal_diff_last5: f64,
    pub days_since_last_match: f64,
    pub fixture_density_flag: f64,
    pub odds_diff: f64,
    pub implied_prob_home: f64,
    /// 1 = home win, 0 = draw, -1 = away win
    pub result: i8,
    /// 1 when both teams scored
    pub btts: u8,
}

impl FeatureRow {
    fn new(record: &MatchRecord, home: FormFeatures, away: FormFeatures, f: FeatureVector) -> Self {
        Self {
            date: record.date,
            league: record.league.clone(),
            home_team: record.home_team.clone(),
            away_team: record.away_team.clone(),
            fthg: record.home_goals,
            ftag: record.away_goals,
            b365h: record.odds_home,
            b365d: record.odds_draw,
            b365a: record.odds_away,
            home_last5_wins: home.wins,
            home_last5_draws: home.draws,
            home_last5_losses: home.losses,
            home_last5_scored: home.scored,
            home_last5_conceded: home.conceded,
            away_last5_wins: away.wins,
            away_last5_draws: away.draws,
            away_last5_losses: away.losses,
            away_last5_scored: away.scored,
            away_last5_conceded: away.conceded,
            form_diff: f.form_diff,
            goal_diff: f.goal_diff,
            elo_diff: f.elo_diff,
            rank_diff: f.rank_diff,
            momentum_diff: f.momentum_diff,
            home_away_split_diff: f.home_away_split_diff,
            h2h_home_wins_last3: f.h2h_home_wins_last3,
            h2h_away_wins_last3: f.h2h_away_wins_last3,
            h2h_goal_diff_last3: f.h2h_goal_diff_last3,
            draw_rate_last5: f.draw_rate_last5,
            avg_goal_diff_last5: f.avg_goal_diff_last5,
            days_since_last_match: f.days_since_last_match,
            fixture_density_flag: f.fixture_density_flag,
            odds_diff: f.odds_diff,
            implied_prob_home: f.implied_prob_home,
            result: record.outcome().signed(),
            btts: u8::from(record.both_teams_scored()),
        }
    }

    pub fn features(&self) -> FeatureVector {
        FeatureVector {
            form_diff: self.form_diff,
            goal_diff: self.goal_diff,
            elo_diff: self.elo_diff,
            rank_diff: self.rank_diff,
            momentum_diff: self.momentum_diff,
            home_away_split_diff: self.home_away_split_diff,
            h2h_home_wins_last3: self.h2h_home_wins_last3,
            h2h_away_wins_last3: self.h2h_away_wins_last3,
            h2h_goal_diff_last3: self.h2h_goal_diff_last3,
            draw_rate_last5: self.draw_rate_last5,
            avg_goal_diff_last5: self.avg_goal_diff_last5,
            days_since_last_match: self.days_since_last_match,
            fixture_density_flag: self.fixture_density_flag,
            odds_diff: self.odds_diff,
            implied_prob_home: self.implied_prob_home,
        }
    }

    pub fn outcome(&self) -> Result<Outcome, PredictorError> {
        Outcome::from_signed(self.result).ok_or(PredictorError::InvalidLabel {
            label: i64::from(self.result),
            num_class: Outcome::NUM_CLASSES,
        })
    }
}

/// Build the training table in one chronological pass. Each row is computed
/// before its own match is applied to the running state.
pub fn build_feature_table(matches: &[MatchRecord], config: FeatureConfig) -> Vec<FeatureRow> {
    let mut state = FeatureState::new(config);
    let mut rows = Vec::with_capacity(matches.len());

    for idx in chronological_order(matches) {
        let record = &matches[idx];
        let ratings = (
            state.running_rating(&record.home_team),
            state.running_rating(&record.away_team),
        );
        let features = state.features(
            &record.home_team,
            &record.away_team,
            Some(record.date),
            ratings,
            (record.odds_home, record.odds_away),
        );
        rows.push(FeatureRow::new(
            record,
            state.form(&record.home_team, Side::Home),
            state.form(&record.away_team, Side::Away),
            features,
        ));
        state.observe(record);
    }

    rows
}
