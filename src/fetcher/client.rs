use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{REQUEST_TIMEOUT_SECS, SECS_PER_DAY};
use crate::error::{AppError, Result};
use crate::fetcher::models::{parse_record_list, RawHeroStats, RawHistoryEntry, RawMatch};
use crate::fetcher::{fetch_with_retry, RetryPolicy};

/// Query window for the bulk match-metadata endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchWindow {
    pub min_unix_timestamp: i64,
    pub max_unix_timestamp: i64,
    pub min_average_badge: u32,
    pub limit: u32,
}

impl MatchWindow {
    /// The one-day window ending `days_ago` days before `now`.
    pub fn day(days_ago: u32, now: i64, min_average_badge: u32, limit: u32) -> Self {
        let max_unix_timestamp = now - i64::from(days_ago) * SECS_PER_DAY;
        Self {
            min_unix_timestamp: max_unix_timestamp - SECS_PER_DAY,
            max_unix_timestamp,
            min_average_badge,
            limit,
        }
    }
}

/// Thin client over the stats API. One instance is shared by every stage.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn fetch_match_metadata(&self, window: &MatchWindow) -> Result<Vec<RawMatch>> {
        let url = format!("{}/v1/matches/metadata", self.base_url);
        let query = [
            ("include_player_info", "true".to_string()),
            ("min_unix_timestamp", window.min_unix_timestamp.to_string()),
            ("max_unix_timestamp", window.max_unix_timestamp.to_string()),
            ("min_average_badge", window.min_average_badge.to_string()),
            ("limit", window.limit.to_string()),
        ];
        let body = self.get_text(&url, &query).await?;
        let (matches, rejected) = parse_record_list::<RawMatch>(&body)?;
        debug!(
            fetched = matches.len(),
            rejected,
            "match metadata {}..{}",
            window.min_unix_timestamp,
            window.max_unix_timestamp
        );
        Ok(matches)
    }

    /// One batch per day window, newest first. A day that still fails after
    /// the retry policy is logged and left out.
    pub async fn fetch_day_batches(
        &self,
        days: u32,
        now: i64,
        min_average_badge: u32,
        limit: u32,
        policy: RetryPolicy,
    ) -> Vec<Vec<RawMatch>> {
        let mut batches = Vec::with_capacity(days as usize);
        for days_ago in 0..days {
            let window = MatchWindow::day(days_ago, now, min_average_badge, limit);
            let label = format!("matches day -{days_ago}");
            match fetch_with_retry(&label, policy, || self.fetch_match_metadata(&window)).await {
                Some(batch) => {
                    info!(day = days_ago, matches = batch.len(), "Fetched match batch");
                    batches.push(batch);
                }
                None => warn!(day = days_ago, "[FETCH] skipping day window"),
            }
        }
        batches
    }

    /// Raw history records plus the count of elements that failed to parse.
    pub async fn fetch_player_history(
        &self,
        account_id: i64,
    ) -> Result<(Vec<RawHistoryEntry>, usize)> {
        let url = format!("{}/v1/players/{account_id}/match-history", self.base_url);
        let body = self
            .get_text(&url, &[("only_stored_history", "true".to_string())])
            .await?;
        parse_record_list::<RawHistoryEntry>(&body)
    }

    pub async fn fetch_hero_stats(
        &self,
        min_unix_timestamp: i64,
        min_average_badge: u32,
    ) -> Result<(Vec<RawHeroStats>, usize)> {
        let url = format!("{}/v1/analytics/hero-stats", self.base_url);
        let query = [
            ("min_unix_timestamp", min_unix_timestamp.to_string()),
            ("min_average_badge", min_average_badge.to_string()),
        ];
        let body = self.get_text(&url, &query).await?;
        parse_record_list::<RawHeroStats>(&body)
    }

    async fn get_text(&self, url: &str, query: &[(&str, String)]) -> Result<String> {
        let resp = self.http.get(url).query(query).send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            let sample: String = body.chars().take(200).collect();
            return Err(AppError::Upstream(format!("http {status} from {url}: {sample}")));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_windows_walk_backwards_without_gaps() {
        let now = 1_700_000_000;
        let today = MatchWindow::day(0, now, 100, 5000);
        let yesterday = MatchWindow::day(1, now, 100, 5000);
        assert_eq!(today.max_unix_timestamp, now);
        assert_eq!(today.min_unix_timestamp, now - SECS_PER_DAY);
        assert_eq!(yesterday.max_unix_timestamp, today.min_unix_timestamp);
    }
}
