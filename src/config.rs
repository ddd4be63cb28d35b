use chrono::{Datelike, NaiveDate, NaiveTime};
use clap::Parser;
use url::Url;

use crate::api::Dataset;
use crate::refresh::FreshnessPolicy;

/// NBA stats dashboard with snapshot-cached API-Sports data
#[derive(Parser, Debug, Clone)]
#[command(name = "courtside", version, about)]
pub struct Config {
    /// Basketball API base URL
    #[arg(
        long,
        env = "API_BASE_URL",
        default_value = "https://v1.basketball.api-sports.io/"
    )]
    pub api_base_url: String,

    /// API-Sports API key
    #[arg(long, env = "API_KEY")]
    pub api_key: Option<String>,

    /// API-Sports league id (12 = NBA)
    #[arg(long, env = "LEAGUE_ID", default_value = "12")]
    pub league_id: u32,

    /// Season override (defaults to the current NBA season)
    #[arg(long, env = "SEASON")]
    pub season: Option<i32>,

    /// Path of the snapshot cache file
    #[arg(long, env = "CACHE_FILE", default_value = "nba_data.json")]
    pub cache_file: String,

    /// Dashboard listen address
    #[arg(long, env = "DASHBOARD_ADDR", default_value = "0.0.0.0:8080")]
    pub dashboard_addr: String,

    /// Minutes a snapshot stays fresh before a load triggers a refetch
    #[arg(long, env = "REFRESH_INTERVAL_MINS", default_value = "30")]
    pub refresh_interval_mins: u64,

    /// Comma-separated HH:MM times at which loads refetch (overrides the
    /// interval policy when set, e.g. "07:00,12:00,15:00,22:00")
    #[arg(long, env = "REFRESH_TIMES", value_delimiter = ',')]
    pub refresh_times: Vec<String>,

    /// Keep the prior snapshot instead of overwriting it when every dataset
    /// fetch came back empty
    #[arg(long, env = "REQUIRE_PARTIAL_SUCCESS", default_value = "false")]
    pub require_partial_success: bool,
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        Url::parse(&self.api_base_url)
            .map_err(|e| anyhow::anyhow!("invalid api_base_url '{}': {}", self.api_base_url, e))?;
        if self.refresh_times.is_empty() && self.refresh_interval_mins == 0 {
            anyhow::bail!("refresh_interval_mins must be positive");
        }
        for t in &self.refresh_times {
            parse_hhmm(t)?;
        }
        Ok(())
    }

    /// The active freshness policy. A non-empty fixed-times list wins over
    /// the interval.
    pub fn freshness_policy(&self) -> anyhow::Result<FreshnessPolicy> {
        if self.refresh_times.is_empty() {
            Ok(FreshnessPolicy::Interval(chrono::Duration::minutes(
                self.refresh_interval_mins as i64,
            )))
        } else {
            let times = self
                .refresh_times
                .iter()
                .map(|t| parse_hhmm(t))
                .collect::<anyhow::Result<Vec<_>>>()?;
            Ok(FreshnessPolicy::FixedTimes(times))
        }
    }

    /// Datasets to fetch on a refresh cycle, rebuilt per cycle because the
    /// upcoming-games endpoint is keyed on today's date.
    pub fn datasets(&self, today: NaiveDate) -> Vec<Dataset> {
        let league = self.league_id.to_string();
        let season = self
            .season
            .unwrap_or_else(|| season_for(today))
            .to_string();
        vec![
            Dataset::new(
                "games",
                "games",
                &[("league", &league), ("season", &season)],
            ),
            Dataset::new(
                "live_games",
                "games",
                &[("league", &league), ("season", &season), ("live", "all")],
            ),
            Dataset::new(
                "upcoming_games",
                "games",
                &[
                    ("league", &league),
                    ("season", &season),
                    ("date", &today.format("%Y-%m-%d").to_string()),
                ],
            ),
            Dataset::new(
                "player_stats",
                "players/statistics",
                &[("league", &league), ("season", &season)],
            ),
        ]
    }
}

/// NBA seasons span the new year: July onward belongs to the season that
/// started that calendar year.
pub fn season_for(date: NaiveDate) -> i32 {
    if date.month() > 6 {
        date.year()
    } else {
        date.year() - 1
    }
}

pub fn parse_hhmm(s: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|e| anyhow::anyhow!("invalid refresh time '{}': {}", s, e))
}
