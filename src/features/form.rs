use crate::models::{FormFeatures, MatchRecord};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Which team of a fixture a feature describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Home,
    Away,
}

impl Side {
    pub fn team<'a>(&self, record: &'a MatchRecord) -> &'a str {
        match self {
            Side::Home => &record.home_team,
            Side::Away => &record.away_team,
        }
    }

    /// (goals scored, goals conceded) from this side's point of view
    pub fn goals(&self, record: &MatchRecord) -> (u32, u32) {
        match self {
            Side::Home => (record.home_goals, record.away_goals),
            Side::Away => (record.away_goals, record.home_goals),
        }
    }
}

/// Which of a team's previous matches count towards its form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormScope {
    /// Home form from previous home games only, away form from away games only
    #[default]
    Venue,
    /// Every previous match the team played, at either venue
    AllMatches,
}

/// Indices of `matches` in chronological order. Same-day matches keep their
/// input order.
pub fn chronological_order(matches: &[MatchRecord]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..matches.len()).collect();
    order.sort_by_key(|&i| matches[i].date);
    order
}

/// Compute venue-scoped form for the team on `side` of every match.
/// The result is index-aligned with `matches`.
pub fn compute_form_features(
    matches: &[MatchRecord],
    side: Side,
    window: usize,
) -> Vec<FormFeatures> {
    compute_form_features_scoped(matches, side, window, FormScope::Venue)
}

/// Compute form for the team on `side` of every match, counting previous
/// matches according to `scope`. The result is index-aligned with `matches`.
pub fn compute_form_features_scoped(
    matches: &[MatchRecord],
    side: Side,
    window: usize,
    scope: FormScope,
) -> Vec<FormFeatures> {
    // Each team's matches in chronological order, tagged with the side it played
    let mut timelines: HashMap<&str, Vec<(usize, Side)>> = HashMap::new();
    for idx in chronological_order(matches) {
        let record = &matches[idx];
        match scope {
            FormScope::Venue => {
                timelines
                    .entry(side.team(record))
                    .or_default()
                    .push((idx, side));
            }
            FormScope::AllMatches => {
                timelines
                    .entry(record.home_team.as_str())
                    .or_default()
                    .push((idx, Side::Home));
                timelines
                    .entry(record.away_team.as_str())
                    .or_default()
                    .push((idx, Side::Away));
            }
        }
    }

    let mut features = vec![FormFeatures::default(); matches.len()];
    for timeline in timelines.values() {
        for (pos, &(idx, played_as)) in timeline.iter().enumerate() {
            if played_as != side {
                continue;
            }
            let past = &timeline[pos.saturating_sub(window)..pos];
            features[idx] = summarize(
                past.iter()
                    .map(|&(past_idx, past_side)| past_side.goals(&matches[past_idx])),
            );
        }
    }

    features
}

/// Fold (scored, conceded) pairs into a form summary
fn summarize(results: impl IntoIterator<Item = (u32, u32)>) -> FormFeatures {
    let mut form = FormFeatures::default();
    for (scored, conceded) in results {
        form.played += 1;
        form.scored += scored;
        form.conceded += conceded;
        match scored.cmp(&conceded) {
            std::cmp::Ordering::Greater => form.wins += 1,
            std::cmp::Ordering::Equal => form.draws += 1,
            std::cmp::Ordering::Less => form.losses += 1,
        }
    }
    form
}

#[derive(Debug, Default, Clone)]
struct TeamHistory {
    home: VecDeque<(u32, u32)>,
    away: VecDeque<(u32, u32)>,
    all: VecDeque<(u32, u32)>,
    last_played: Option<NaiveDate>,
}

/// Incremental form state: feed finished matches in chronological order and
/// ask for any team's current form at any point
#[derive(Debug, Clone)]
pub struct FormTracker {
    window: usize,
    scope: FormScope,
    teams: HashMap<String, TeamHistory>,
}

impl FormTracker {
    pub fn new(window: usize, scope: FormScope) -> Self {
        Self {
            window,
            scope,
            teams: HashMap::new(),
        }
    }

    /// Record a finished match
    pub fn observe(&mut self, record: &MatchRecord) {
        let window = self.window;
        for side in [Side::Home, Side::Away] {
            let goals = side.goals(record);
            let history = self.teams.entry(side.team(record).to_string()).or_default();
            let venue = match side {
                Side::Home => &mut history.home,
                Side::Away => &mut history.away,
            };
            push_capped(venue, goals, window);
            push_capped(&mut history.all, goals, window);
            history.last_played = history.last_played.max(Some(record.date));
        }
    }

    /// Current form of `team` if it were to play on `side` next
    pub fn form(&self, team: &str, side: Side) -> FormFeatures {
        let Some(history) = self.teams.get(team) else {
            return FormFeatures::default();
        };
        let results = match (self.scope, side) {
            (FormScope::Venue, Side::Home) => &history.home,
            (FormScope::Venue, Side::Away) => &history.away,
            (FormScope::AllMatches, _) => &history.all,
        };
        summarize(results.iter().copied())
    }

    /// Win rate over the team's last home (or away) games, ignoring scope
    pub fn venue_win_rate(&self, team: &str, side: Side) -> f64 {
        self.teams
            .get(team)
            .map(|history| {
                let results = match side {
                    Side::Home => &history.home,
                    Side::Away => &history.away,
                };
                summarize(results.iter().copied()).win_rate()
            })
            .unwrap_or(0.0)
    }

    pub fn last_played(&self, team: &str) -> Option<NaiveDate> {
        self.teams.get(team).and_then(|h| h.last_played)
    }

    pub fn knows(&self, team: &str) -> bool {
        self.teams.contains_key(team)
    }
}

fn push_capped(queue: &mut VecDeque<(u32, u32)>, item: (u32, u32), cap: usize) {
    queue.push_back(item);
    while queue.len() > cap {
        queue.pop_front();
    }
}

/// A match with its home and away form columns attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormRow {
    pub date: NaiveDate,
    pub league: Option<String>,
    pub home_team: String,
    pub away_team: String,
    pub fthg: u32,
    pub ftag: u32,
    pub ftr: String,
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
}

/// Attach home and away form to every match, returned in chronological order
pub fn add_recent_form(matches: &[MatchRecord], window: usize, scope: FormScope) -> Vec<FormRow> {
    let home = compute_form_features_scoped(matches, Side::Home, window, scope);
    let away = compute_form_features_scoped(matches, Side::Away, window, scope);

    chronological_order(matches)
        .into_iter()
        .map(|idx| {
            let m = &matches[idx];
            let (h, a) = (home[idx], away[idx]);
            FormRow {
                date: m.date,
                league: m.league.clone(),
                home_team: m.home_team.clone(),
                away_team: m.away_team.clone(),
                fthg: m.home_goals,
                ftag: m.away_goals,
                ftr: m.outcome().ftr().to_string(),
                b365h: m.odds_home,
                b365d: m.odds_draw,
                b365a: m.odds_away,
                home_last5_wins: h.wins,
                home_last5_draws: h.draws,
                home_last5_losses: h.losses,
                home_last5_scored: h.scored,
                home_last5_conceded: h.conceded,
                away_last5_wins: a.wins,
                away_last5_draws: a.draws,
                away_last5_losses: a.losses,
                away_last5_scored: a.scored,
                away_last5_conceded: a.conceded,
            }
        })
        .collect()
}
