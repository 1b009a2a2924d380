pub mod client;
pub mod models;

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;
use crate::fetcher::models::RawHistoryEntry;
use crate::types::HistoryEntry;

pub use client::ApiClient;

/// One account's history as delivered, with the count of records that were
/// unusable and left out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedHistory {
    pub entries: Vec<HistoryEntry>,
    pub rejected: usize,
}

impl FetchedHistory {
    /// Keep the complete records of a raw payload. `parse_rejected` counts
    /// elements that did not deserialize at all.
    pub fn from_raw(account_id: i64, raw: Vec<RawHistoryEntry>, parse_rejected: usize) -> Self {
        let total = raw.len();
        let entries: Vec<HistoryEntry> = raw
            .into_iter()
            .filter_map(|r| r.into_entry(account_id))
            .collect();
        let rejected = parse_rejected + (total - entries.len());
        if rejected > 0 {
            warn!(
                account_id,
                rejected,
                kept = entries.len(),
                "[FETCH] dropped incomplete history records"
            );
        }
        Self { entries, rejected }
    }
}

impl From<Vec<HistoryEntry>> for FetchedHistory {
    fn from(entries: Vec<HistoryEntry>) -> Self {
        Self {
            entries,
            rejected: 0,
        }
    }
}

/// Source of a player's historical matches. The pipeline only consumes this;
/// ordering of the returned entries is not guaranteed.
pub trait HistoryProvider {
    fn player_history(
        &self,
        account_id: i64,
    ) -> impl Future<Output = Result<FetchedHistory>> + Send;
}

impl HistoryProvider for ApiClient {
    async fn player_history(&self, account_id: i64) -> Result<FetchedHistory> {
        let (raw, parse_rejected) = self.fetch_player_history(account_id).await?;
        Ok(FetchedHistory::from_raw(account_id, raw, parse_rejected))
    }
}

/// Attempts and fixed delay for transient upstream failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay_ms: u64) -> Self {
        Self {
            attempts: attempts.max(1),
            delay: Duration::from_millis(delay_ms),
        }
    }
}

/// Runs `op` until it succeeds or `policy.attempts` is exhausted.
/// Exhaustion is logged and returns `None`; the caller skips the record.
pub async fn fetch_with_retry<T, F, Fut>(label: &str, policy: RetryPolicy, mut op: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 1..=policy.attempts {
        match op().await {
            Ok(value) => return Some(value),
            Err(e) if attempt < policy.attempts => {
                warn!("[FETCH] {label} attempt {attempt}/{} failed: {e}", policy.attempts);
                tokio::time::sleep(policy.delay).await;
            }
            Err(e) => {
                warn!("[FETCH] {label} giving up after {} attempts: {e}", policy.attempts);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::fetcher::models::parse_record_list;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn incomplete_history_records_are_counted() {
        let raw = r#"[
            {"match_id": 1, "hero_id": 7, "start_time": 100, "player_team": 0,
             "match_result": 0, "player_kills": 3, "player_deaths": 1, "player_assists": 4},
            {"match_id": 2, "hero_id": 7, "start_time": 200, "player_team": 0,
             "player_kills": 3, "player_deaths": 1, "player_assists": 4},
            {"match_id": "three"}
        ]"#;
        let (records, parse_rejected) = parse_record_list::<RawHistoryEntry>(raw).unwrap();
        let fetched = FetchedHistory::from_raw(42, records, parse_rejected);
        assert_eq!(fetched.entries.len(), 1);
        assert_eq!(fetched.entries[0].match_id, 1);
        assert_eq!(fetched.rejected, 2);
    }

    #[tokio::test]
    async fn retry_recovers_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let out = fetch_with_retry("account 1", RetryPolicy::new(5, 0), || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(AppError::Upstream("503".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(out, Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_attempt_limit() {
        let calls = AtomicU32::new(0);
        let out: Option<()> = fetch_with_retry("account 2", RetryPolicy::new(5, 0), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::Upstream("timeout".to_string())) }
        })
        .await;
        assert!(out.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
