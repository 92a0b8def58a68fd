use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

const FOOTBALL_DATA_BASE_URL: &str = "https://www.football-data.co.uk/mmz4281";

/// Leagues fetched by default: (football-data league code, season code)
pub const DEFAULT_SEASONS: &[(&str, &str)] = &[("E0", "2324"), ("SP1", "2324")];

/// Downloads historical results and closing prices from football-data.co.uk
pub struct FootballDataClient {
    base_url: String,
    client: reqwest::Client,
}

impl FootballDataClient {
    pub fn new() -> Self {
        Self::with_base_url(FOOTBALL_DATA_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn season_url(&self, league_code: &str, season_code: &str) -> String {
        format!("{}/{}/{}.csv", self.base_url, season_code, league_code)
    }

    /// Fetch one season CSV as text
    pub async fn download_season(&self, league_code: &str, season_code: &str) -> Result<String> {
        let url = self.season_url(league_code, season_code);
        info!("Downloading {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "football-data.co.uk returned error for {} {}: {}",
                league_code,
                season_code,
                response.status()
            );
        }

        response
            .text()
            .await
            .context("Failed to read season CSV body")
    }

    /// Download a season and write it to `{dir}/{league}_{season}.csv`
    pub async fn save_season(
        &self,
        league_code: &str,
        season_code: &str,
        dir: &Path,
    ) -> Result<PathBuf> {
        let body = self.download_season(league_code, season_code).await?;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(format!("{}_{}.csv", league_code, season_code));
        std::fs::write(&path, body)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

impl Default for FootballDataClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::data::load_season_file;

    #[test]
    fn test_season_url() {
        let client = FootballDataClient::new();
        assert_eq!(
            client.season_url("E0", "2324"),
            "https://www.football-data.co.uk/mmz4281/2324/E0.csv"
        );
        let local = FootballDataClient::with_base_url("http://localhost:8080/");
        assert_eq!(local.season_url("SP1", "2425"), "http://localhost:8080/2425/SP1.csv");
    }

    #[tokio::test]
    #[ignore]
    async fn test_download_premier_league_season() {
        let client = FootballDataClient::new();
        let dir = std::env::temp_dir().join("edgeplay_download_test");
        let path = client.save_season("E0", "2324", &dir).await.unwrap();
        let matches = load_season_file(&path).unwrap();
        println!("Downloaded {} matches to {}", matches.len(), path.display());
        assert_eq!(matches.len(), 380);
    }
}
