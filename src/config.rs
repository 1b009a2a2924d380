use crate::error::{AppError, Result};
use crate::types::{FeatureMode, Stage};

pub const DEADLOCK_API_URL: &str = "https://api.deadlock-api.com";

/// Every valid match has exactly this many player rows.
pub const PLAYERS_PER_MATCH: usize = 12;

/// Each of the two teams fields exactly this many players.
pub const PLAYERS_PER_TEAM: usize = 6;

/// Trailing window widths for `p_win_pct_{w}` / `p_loss_pct_{w}`.
pub const ROLLING_WINDOWS: [usize; 5] = [2, 3, 4, 5, 6];

/// Minimum streak lengths counted into `win_streaks_{n}plus` / `loss_streaks_{n}plus`.
pub const STREAK_BUCKETS: [usize; 4] = [2, 3, 4, 5];

/// HTTP request timeout (seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

pub const SECS_PER_DAY: i64 = 86_400;

/// Player stats folded into team aggregates when TEAM_STATS is not set.
pub const DEFAULT_TEAM_STATS: &[&str] = &[
    "p_avg_kd",
    "p_win_rate",
    "p_total_matches",
    "p_win_streak_avg",
    "p_loss_streak_avg",
    "win_streaks_3plus",
    "loss_streaks_3plus",
    "p_win_pct_3",
    "p_win_pct_5",
    "p_v_h_kd_pct",
    "p_v_h_pick_rate",
    "h_win_rate",
    "h_average_kd",
    "h_pick_rate",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub log_level: String,
    pub db_path: String,
    /// Skill floor for match and hero-stat queries (MIN_AVERAGE_BADGE)
    pub min_average_badge: u32,
    /// Number of one-day match windows to pull, newest first (FETCH_DAYS)
    pub fetch_days: u32,
    /// Max matches per day window (MATCH_LIMIT)
    pub match_limit: u32,
    /// Concurrent player-history requests (FETCH_WORKERS)
    pub fetch_workers: usize,
    /// Accounts processed per chunk (ACCOUNT_CHUNK_SIZE)
    pub account_chunk_size: usize,
    /// Attempts per upstream call before the record is skipped (FETCH_ATTEMPTS)
    pub fetch_attempts: u32,
    /// Fixed delay between attempts (RETRY_DELAY_MS)
    pub retry_delay_ms: u64,
    /// Length of the `prior_win_loss_streak` token (STREAK_LENGTH)
    pub streak_length: usize,
    /// Hero trend windows rebuilt each run, in days (HERO_TREND_WINDOWS, comma-separated)
    pub hero_trend_windows: Vec<u32>,
    /// Hero trend window used as the player-vs-hero baseline (HERO_BASELINE_WINDOW)
    pub hero_baseline_window: u32,
    pub feature_mode: FeatureMode,
    /// Player stats aggregated per team (TEAM_STATS, comma-separated)
    pub team_stats: Vec<String>,
    /// Stages to run, in pipeline order (RUN_STAGES, comma-separated)
    pub stages: Vec<Stage>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let hero_trend_windows = parse_list(&env_or("HERO_TREND_WINDOWS", "7,30"))
            .iter()
            .map(|s| {
                s.parse::<u32>().map_err(|_| {
                    AppError::Config(format!("HERO_TREND_WINDOWS entry '{s}' is not a day count"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let feature_mode_raw = env_or("FEATURE_MODE", "wide");
        let feature_mode = FeatureMode::parse(&feature_mode_raw).ok_or_else(|| {
            AppError::Config(format!(
                "FEATURE_MODE must be 'wide' or 'diff', got '{feature_mode_raw}'"
            ))
        })?;

        let team_stats = match std::env::var("TEAM_STATS") {
            Ok(raw) if !raw.trim().is_empty() => parse_list(&raw),
            _ => DEFAULT_TEAM_STATS.iter().map(|s| s.to_string()).collect(),
        };

        let stages = match std::env::var("RUN_STAGES") {
            Ok(raw) if !raw.trim().is_empty() => parse_stages(&raw)?,
            _ => Stage::ALL.to_vec(),
        };

        let streak_length = env_parse("STREAK_LENGTH", 6usize)?;
        if streak_length == 0 {
            return Err(AppError::Config("STREAK_LENGTH must be at least 1".to_string()));
        }

        Ok(Self {
            api_url: env_or("DEADLOCK_API_URL", DEADLOCK_API_URL),
            log_level: env_or("LOG_LEVEL", "info"),
            db_path: env_or("DB_PATH", "deadlock.db"),
            min_average_badge: env_parse("MIN_AVERAGE_BADGE", 100u32)?,
            fetch_days: env_parse("FETCH_DAYS", 3u32)?,
            match_limit: env_parse("MATCH_LIMIT", 5000u32)?,
            fetch_workers: env_parse("FETCH_WORKERS", 25usize)?.max(1),
            account_chunk_size: env_parse("ACCOUNT_CHUNK_SIZE", 500usize)?.max(1),
            fetch_attempts: env_parse("FETCH_ATTEMPTS", 5u32)?.max(1),
            retry_delay_ms: env_parse("RETRY_DELAY_MS", 2000u64)?,
            streak_length,
            hero_trend_windows,
            hero_baseline_window: env_parse("HERO_BASELINE_WINDOW", 30u32)?,
            feature_mode,
            team_stats,
            stages,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} must be a number, got '{raw}'"))),
        _ => Ok(default),
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_stages(raw: &str) -> Result<Vec<Stage>> {
    let requested = parse_list(raw)
        .iter()
        .map(|s| {
            Stage::parse(s)
                .ok_or_else(|| AppError::Config(format!("unknown stage '{s}' in RUN_STAGES")))
        })
        .collect::<Result<Vec<_>>>()?;
    // Pipeline order is fixed regardless of how the list was written.
    Ok(Stage::ALL
        .iter()
        .copied()
        .filter(|s| requested.contains(s))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_follow_pipeline_order() {
        let stages = parse_stages("training, matches").unwrap();
        assert_eq!(stages, vec![Stage::Matches, Stage::Training]);
    }

    #[test]
    fn unknown_stage_is_config_error() {
        assert!(matches!(parse_stages("matches,export"), Err(AppError::Config(_))));
    }

    #[test]
    fn list_parsing_drops_blanks() {
        assert_eq!(parse_list(" 7, ,30,"), vec!["7".to_string(), "30".to_string()]);
    }
}
