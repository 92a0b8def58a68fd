use crate::models::{MatchRecord, Outcome};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::Path;

/// A club's rating and its position in the table (1 = strongest)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TeamRating {
    pub elo: f64,
    pub rank: u32,
}

/// Anything that can tell us how strong a club is
pub trait EloLookup {
    fn lookup(&self, team: &str) -> Option<TeamRating>;
}

/// Elo rating configuration
#[derive(Debug, Clone, Copy)]
pub struct EloConfig {
    /// How much ratings move per match
    pub k_factor: f64,
    /// Home advantage in rating points
    pub home_advantage: f64,
    /// Rating for a club we have not seen yet
    pub initial_rating: f64,
}

impl Default for EloConfig {
    fn default() -> Self {
        EloConfig {
            k_factor: 20.0,
            home_advantage: 60.0,
            initial_rating: 1500.0,
        }
    }
}

/// Ratings built up from match results
#[derive(Debug, Clone, Default)]
pub struct EloRatings {
    ratings: HashMap<String, f64>,
    config: EloConfig,
}

impl EloRatings {
    pub fn new(config: EloConfig) -> Self {
        EloRatings {
            ratings: HashMap::new(),
            config,
        }
    }

    /// Current rating, or the initial rating for an unknown club
    pub fn rating(&self, team: &str) -> f64 {
        self.ratings
            .get(team)
            .copied()
            .unwrap_or(self.config.initial_rating)
    }

    pub fn knows(&self, team: &str) -> bool {
        self.ratings.contains_key(team)
    }

    /// 1-based position among rated clubs. Unknown clubs are ranked as if
    /// they held the initial rating.
    pub fn rank(&self, team: &str) -> u32 {
        let rating = self.rating(team);
        1 + self.ratings.values().filter(|&&r| r > rating).count() as u32
    }

    /// Expected score (0-1) for the home side, home advantage included
    pub fn expected_score(&self, home: &str, away: &str) -> f64 {
        let home_rating = self.rating(home) + self.config.home_advantage;
        let away_rating = self.rating(away);
        1.0 / (1.0 + 10f64.powf((away_rating - home_rating) / 400.0))
    }

    /// Apply a finished match. Read any pre-match ratings before calling this.
    pub fn update(&mut self, record: &MatchRecord) {
        let home_expected = self.expected_score(&record.home_team, &record.away_team);
        let home_actual = match record.outcome() {
            Outcome::HomeWin => 1.0,
            Outcome::Draw => 0.5,
            Outcome::AwayWin => 0.0,
        };
        let delta = self.config.k_factor * (home_actual - home_expected);

        let home_new = self.rating(&record.home_team) + delta;
        let away_new = self.rating(&record.away_team) - delta;
        self.ratings.insert(record.home_team.clone(), home_new);
        self.ratings.insert(record.away_team.clone(), away_new);
    }

    /// Replay a whole history in chronological order
    pub fn from_history(matches: &[MatchRecord], config: EloConfig) -> Self {
        let mut elo = Self::new(config);
        for idx in crate::features::form::chronological_order(matches) {
            elo.update(&matches[idx]);
        }
        elo
    }
}

impl EloLookup for EloRatings {
    fn lookup(&self, team: &str) -> Option<TeamRating> {
        self.knows(team).then(|| TeamRating {
            elo: self.rating(team),
            rank: self.rank(team),
        })
    }
}

/// A ClubElo ratings snapshot
#[derive(Debug, Clone, Default)]
pub struct EloTable {
    clubs: HashMap<String, TeamRating>,
}

impl EloTable {
    /// Load a ClubElo export. Header names are matched case-insensitively;
    /// `club` and `elo` are required, `rank` is derived when absent or empty.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Failed to open Elo ratings {}", path.display()))?;

        let headers: Vec<String> = reader
            .headers()
            .context("Failed to read Elo ratings header")?
            .iter()
            .map(|h| h.to_lowercase())
            .collect();
        let column = |name: &str| headers.iter().position(|h| h == name);
        let club_col = column("club").context("Elo ratings have no 'club' column")?;
        let elo_col = column("elo").context("Elo ratings have no 'elo' column")?;
        let rank_col = column("rank");

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.context("Failed to read Elo ratings row")?;
            let club = match record.get(club_col) {
                Some(club) if !club.is_empty() => club.to_string(),
                _ => continue,
            };
            let Some(elo) = record.get(elo_col).and_then(|v| v.parse::<f64>().ok()) else {
                continue;
            };
            let rank = rank_col
                .and_then(|col| record.get(col))
                .and_then(|v| v.parse::<f64>().ok())
                .map(|r| r as u32);
            rows.push((club, elo, rank));
        }

        Ok(Self::from_rows(rows))
    }

    /// Build from (club, elo, rank) rows, filling missing ranks from Elo order
    pub fn from_rows(rows: Vec<(String, f64, Option<u32>)>) -> Self {
        let elos: Vec<f64> = rows.iter().map(|(_, elo, _)| *elo).collect();
        let clubs = rows
            .into_iter()
            .map(|(club, elo, rank)| {
                let rank =
                    rank.unwrap_or_else(|| 1 + elos.iter().filter(|&&e| e > elo).count() as u32);
                (club, TeamRating { elo, rank })
            })
            .collect();
        Self { clubs }
    }

    pub fn len(&self) -> usize {
        self.clubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clubs.is_empty()
    }
}

impl EloLookup for EloTable {
    fn lookup(&self, team: &str) -> Option<TeamRating> {
        self.clubs.get(team).copied()
    }
}
