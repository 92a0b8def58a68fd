use crate::error::PredictorError;
use crate::models::{MatchRecord, NewResult};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Date formats seen in football-data.co.uk files, day first
const DATE_FORMATS: [&str; 3] = ["%d/%m/%Y", "%d/%m/%y", "%Y-%m-%d"];

/// One row of a football-data.co.uk season file. Only the columns we use are
/// mapped; everything else in the file is ignored.
#[derive(Debug, Deserialize)]
struct SeasonRow {
    #[serde(rename = "Date", default)]
    date: Option<String>,
    #[serde(rename = "Div", default)]
    division: Option<String>,
    #[serde(rename = "HomeTeam", alias = "Home", default)]
    home_team: Option<String>,
    #[serde(rename = "AwayTeam", alias = "Away", default)]
    away_team: Option<String>,
    #[serde(rename = "FTHG", alias = "HG", default, deserialize_with = "csv::invalid_option")]
    home_goals: Option<f64>,
    #[serde(rename = "FTAG", alias = "AG", default, deserialize_with = "csv::invalid_option")]
    away_goals: Option<f64>,
    #[serde(rename = "B365H", default, deserialize_with = "csv::invalid_option")]
    odds_home: Option<f64>,
    #[serde(rename = "B365D", default, deserialize_with = "csv::invalid_option")]
    odds_draw: Option<f64>,
    #[serde(rename = "B365A", default, deserialize_with = "csv::invalid_option")]
    odds_away: Option<f64>,
}

/// Row layout of the daily results feed
#[derive(Debug, Deserialize)]
struct NewResultRow {
    date: String,
    #[serde(default)]
    league: Option<String>,
    home_team: String,
    away_team: String,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    home_score: Option<u32>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    away_score: Option<u32>,
}

/// Parse a match date, trying day-first formats before ISO
pub fn parse_match_date(raw: &str) -> Result<NaiveDate, PredictorError> {
    let trimmed = raw.trim();
    // Some exports carry a time component after the date
    let date_part = trimmed.split_whitespace().next().unwrap_or(trimmed);
    let date_part = date_part.split('T').next().unwrap_or(date_part);

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
        .ok_or_else(|| PredictorError::InvalidDate(raw.to_string()))
}

fn goals(value: Option<f64>) -> Option<u32> {
    value.filter(|g| g.is_finite() && *g >= 0.0).map(|g| g as u32)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn csv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))
}

/// Load a single season file, dropping rows without a usable date, teams or score
pub fn load_season_file(path: &Path) -> Result<Vec<MatchRecord>> {
    let mut reader = csv_reader(path)?;
    let source_file = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string());

    let mut matches = Vec::new();
    let mut dropped = 0usize;

    for row in reader.deserialize::<SeasonRow>() {
        let row = row.with_context(|| format!("Failed to parse row in {}", path.display()))?;

        let record = (|| {
            let date = parse_match_date(row.date.as_deref()?).ok()?;
            Some(MatchRecord {
                date,
                league: non_empty(row.division),
                home_team: non_empty(row.home_team)?,
                away_team: non_empty(row.away_team)?,
                home_goals: goals(row.home_goals)?,
                away_goals: goals(row.away_goals)?,
                odds_home: row.odds_home,
                odds_draw: row.odds_draw,
                odds_away: row.odds_away,
                source_file: source_file.clone(),
            })
        })();

        match record {
            Some(record) => matches.push(record),
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        warn!("Dropped {} incomplete rows from {}", dropped, path.display());
    }

    Ok(matches)
}

/// Remove repeated (date, home, away) rows, keeping the first occurrence
pub fn dedupe_matches(matches: Vec<MatchRecord>) -> Vec<MatchRecord> {
    let mut seen = HashSet::new();
    matches
        .into_iter()
        .filter(|m| seen.insert(m.dedupe_key()))
        .collect()
}

/// Merge every season CSV in `dir` into one de-duplicated history.
/// Files that fail to load are reported and skipped.
pub fn merge_season_files(dir: &Path) -> Result<Vec<MatchRecord>> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read seasons directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .map(|ext| ext.eq_ignore_ascii_case("csv"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    info!("Found {} CSV files in {}", files.len(), dir.display());

    let mut all_matches = Vec::new();
    for file in &files {
        match load_season_file(file) {
            Ok(matches) => {
                info!("Loaded {} with {} rows", file.display(), matches.len());
                all_matches.extend(matches);
            }
            Err(e) => warn!("Failed to load {}: {:#}", file.display(), e),
        }
    }

    if all_matches.is_empty() {
        warn!("No valid data to merge");
        return Ok(all_matches);
    }

    let merged = dedupe_matches(all_matches);
    info!("Merged history has {} rows", merged.len());
    Ok(merged)
}

/// Write any serializable rows to a CSV file, creating parent directories
pub fn write_csv<T: Serialize>(rows: &[T], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV file {}", path.display()))?;
    for row in rows {
        writer.serialize(row).context("Failed to serialize CSV row")?;
    }
    writer.flush().context("Failed to flush CSV file")?;
    Ok(())
}

/// Read a CSV file written by [`write_csv`]
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv_reader(path)?;
    reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .with_context(|| format!("Failed to parse CSV file {}", path.display()))
}

/// Save the merged match history
pub fn save_matches(matches: &[MatchRecord], path: &Path) -> Result<()> {
    write_csv(matches, path)
}

/// Load the merged match history
pub fn load_matches(path: &Path) -> Result<Vec<MatchRecord>> {
    read_csv(path)
}

/// Load completed matches from the daily results feed. Rows without a final
/// score or a parseable date are skipped.
pub fn load_new_results(path: &Path) -> Result<Vec<NewResult>> {
    let rows: Vec<NewResultRow> = read_csv(path)?;
    let results = rows
        .into_iter()
        .filter_map(|row| {
            Some(NewResult {
                date: parse_match_date(&row.date).ok()?,
                league: non_empty(row.league),
                home_team: row.home_team,
                away_team: row.away_team,
                home_score: row.home_score?,
                away_score: row.away_score?,
            })
        })
        .collect();
    Ok(results)
}

/// Save data to a JSON cache file
pub fn save_to_cache<T: Serialize + ?Sized>(data: &T, cache_file: &Path) -> Result<()> {
    if let Some(parent) = cache_file.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(data).context("Failed to serialize cache data")?;
    std::fs::write(cache_file, json).context("Failed to write cache file")?;
    Ok(())
}

/// Load data from a JSON cache file
pub fn load_from_cache<T: DeserializeOwned>(cache_file: &Path) -> Result<T> {
    let json = std::fs::read_to_string(cache_file)
        .with_context(|| format!("Failed to read cache file {}", cache_file.display()))?;
    let data = serde_json::from_str(&json).context("Failed to deserialize cache data")?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("edgeplay_data_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_match_date() {
        assert_eq!(
            parse_match_date("13/08/2023").unwrap(),
            NaiveDate::from_ymd_opt(2023, 8, 13).unwrap()
        );
        assert_eq!(
            parse_match_date("05/02/19").unwrap(),
            NaiveDate::from_ymd_opt(2019, 2, 5).unwrap()
        );
        assert_eq!(
            parse_match_date("2024-05-19T14:00:00+00:00").unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 19).unwrap()
        );
        assert!(parse_match_date("not a date").is_err());
    }

    #[test]
    fn test_load_season_file_drops_bad_rows() {
        let dir = scratch_dir("season");
        let path = dir.join("E0.csv");
        std::fs::write(
            &path,
            " Div ,Date,HomeTeam,AwayTeam,FTHG,FTAG,FTR,B365H,B365D,B365A,Referee\n\
             E0,11/08/2023,Burnley,Man City,0,3,A,8.0,5.5,1.33,C Pawson\n\
             E0,bad-date,Arsenal,Forest,2,1,H,1.18,7.0,15.0,M Oliver\n\
             E0,12/08/2023,Bournemouth,West Ham,1,1,D,,3.6,2.6,P Bankes\n\
             E0,12/08/2023,Brighton,Luton,,,,1.3,6.0,9.5,D Coote\n",
        )
        .unwrap();

        let matches = load_season_file(&path).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].home_team, "Burnley");
        assert_eq!(matches[0].away_goals, 3);
        assert_eq!(matches[0].league.as_deref(), Some("E0"));
        assert_eq!(matches[0].source_file.as_deref(), Some("E0.csv"));
        assert_eq!(matches[1].odds_home, None);
        assert_eq!(matches[1].odds_draw, Some(3.6));
    }

    #[test]
    fn test_merge_dedupes_across_files() {
        let dir = scratch_dir("merge");
        let header = "Date,HomeTeam,AwayTeam,FTHG,FTAG\n";
        std::fs::write(
            dir.join("a.csv"),
            format!("{}01/01/2024,A,B,1,0\n02/01/2024,C,D,2,2\n", header),
        )
        .unwrap();
        std::fs::write(
            dir.join("b.csv"),
            format!("{}01/01/2024,A,B,1,0\n03/01/2024,B,A,0,1\n", header),
        )
        .unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let merged = merge_season_files(&dir).unwrap();
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].source_file.as_deref(), Some("a.csv"));
    }

    #[test]
    fn test_merge_skips_unreadable_file() {
        let dir = scratch_dir("unreadable");
        let header = "Date,HomeTeam,AwayTeam,FTHG,FTAG\n";
        std::fs::write(dir.join("a.csv"), format!("{}01/01/2024,A,B,1,0\n", header)).unwrap();
        let mut bad = header.as_bytes().to_vec();
        bad.extend_from_slice(b"02/01/2024,M\xe9ndez,C,2,1\n");
        std::fs::write(dir.join("b.csv"), bad).unwrap();

        let merged = merge_season_files(&dir).unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].source_file.as_deref(), Some("a.csv"));
    }

    #[test]
    fn test_merge_empty_dir() {
        let dir = scratch_dir("empty");
        assert!(merge_season_files(&dir).unwrap().is_empty());
    }

    #[test]
    fn test_history_and_new_results_files() {
        let dir = scratch_dir("history");
        let history = dir.join("out").join("historical_matches.csv");
        let record = MatchRecord {
            date: NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            league: Some("E0".to_string()),
            home_team: "Arsenal".to_string(),
            away_team: "Chelsea".to_string(),
            home_goals: 2,
            away_goals: 2,
            odds_home: Some(1.9),
            odds_draw: None,
            odds_away: Some(4.2),
            source_file: None,
        };
        save_matches(&[record.clone()], &history).unwrap();
        assert_eq!(load_matches(&history).unwrap(), vec![record]);

        let feed = dir.join("new_results.csv");
        std::fs::write(
            &feed,
            "date,league,home_team,away_team,home_score,away_score\n\
             2024-05-19,Premier League,Arsenal,Everton,2,1\n\
             2024-05-19,Premier League,Brentford,Newcastle,,\n",
        )
        .unwrap();
        let results = load_new_results(&feed).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].home_score, 2);
    }
}
