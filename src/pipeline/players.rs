use futures_util::stream::{self, StreamExt};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::loader::{delete_keys, update_columns};
use crate::db::models::{distinct_accounts, latest_hero_trends};
use crate::db::schema::TableSchema;
use crate::db::{load, Table};
use crate::error::Result;
use crate::features::{apply_hero_differentials, HeroBaseline, PlayerFeatures, PlayerHistory};
use crate::fetcher::{fetch_with_retry, FetchedHistory, HistoryProvider, RetryPolicy};
use crate::pipeline::{retry_policy, RunSummary};
use crate::types::{HistoryEntry, PlayerHistoryRow, PlayerRollingStat, PlayerTrend};

const HERO_DIFF_COLUMNS: [&str; 2] = ["p_v_h_kd_pct", "p_v_h_pick_rate"];

/// Everything computed for one chunk of accounts.
#[derive(Debug, Default)]
pub struct ChunkOutput {
    pub trends: Vec<PlayerTrend>,
    pub rolling: Vec<PlayerRollingStat>,
    pub history: Vec<PlayerHistoryRow>,
    pub empty_histories: usize,
}

/// Recompute streak, rolling and hero-differential features for every stored
/// account, one chunk at a time. Earlier chunks stay written if a later one
/// fails.
pub async fn run<P>(
    cfg: &Config,
    pool: &SqlitePool,
    provider: &P,
    summary: &mut RunSummary,
) -> Result<()>
where
    P: HistoryProvider + Sync,
{
    let accounts = distinct_accounts(pool).await?;
    if accounts.is_empty() {
        warn!("[PLAYERS] no accounts stored; run the matches stage first");
        return Ok(());
    }

    let trends = latest_hero_trends(pool, cfg.hero_baseline_window).await?;
    let baseline = HeroBaseline::from_trends(&trends);
    if baseline.is_empty() {
        warn!(
            window_days = cfg.hero_baseline_window,
            "[PLAYERS] no hero baseline stored; hero differentials will be null"
        );
    }

    let policy = retry_policy(cfg);
    let chunk_count = accounts.len().div_ceil(cfg.account_chunk_size);
    for (i, chunk) in accounts.chunks(cfg.account_chunk_size).enumerate() {
        let fetched = fetch_histories(provider, chunk, cfg.fetch_workers, policy).await;
        let failed = chunk.len() - fetched.len();
        summary.skipped_accounts += failed;
        let rejected: usize = fetched.iter().map(|(_, h)| h.rejected).sum();
        summary.skipped_records += rejected;

        let histories = fetched.into_iter().map(|(id, h)| (id, h.entries)).collect();
        let output = compute_chunk(histories, &baseline, cfg.streak_length);
        info!(
            chunk = i + 1,
            of = chunk_count,
            accounts = chunk.len(),
            failed,
            rejected,
            empty = output.empty_histories,
            "[PLAYERS] chunk computed"
        );
        store_chunk(pool, &output, summary).await?;
    }
    Ok(())
}

/// Fetch histories with at most `workers` requests in flight. Accounts that
/// exhaust their retries are left out.
pub async fn fetch_histories<P>(
    provider: &P,
    accounts: &[i64],
    workers: usize,
    policy: RetryPolicy,
) -> Vec<(i64, FetchedHistory)>
where
    P: HistoryProvider + Sync,
{
    stream::iter(accounts.iter().copied())
        .map(|account_id| async move {
            let label = format!("history {account_id}");
            fetch_with_retry(&label, policy, || provider.player_history(account_id))
                .await
                .map(|history| (account_id, history))
        })
        .buffer_unordered(workers.max(1))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .flatten()
        .collect()
}

/// Pure per-account computation. Each history is sorted before any scan.
pub fn compute_chunk(
    fetched: Vec<(i64, Vec<HistoryEntry>)>,
    baseline: &HeroBaseline,
    streak_length: usize,
) -> ChunkOutput {
    let mut out = ChunkOutput::default();
    for (account_id, entries) in fetched {
        let history = PlayerHistory::new(account_id, entries);
        if history.is_empty() {
            debug!(account_id, "empty history");
            out.empty_histories += 1;
            continue;
        }
        let mut features = PlayerFeatures::compute(&history, streak_length);
        apply_hero_differentials(&history, baseline, &mut features.rolling);
        out.trends.extend(features.trend);
        out.rolling.extend(features.rolling);
        out.history.extend(features.history);
    }
    out
}

/// Player trends are replaced for the chunk's accounts; rolling stats and
/// history rows are insert-or-ignore, except the hero differential columns,
/// which are rewritten from the current history.
pub async fn store_chunk(
    pool: &SqlitePool,
    output: &ChunkOutput,
    summary: &mut RunSummary,
) -> Result<()> {
    let accounts: Vec<i64> = output.trends.iter().map(|t| t.account_id).collect();
    delete_keys(pool, "player_trends", "account_id", &accounts).await?;
    let trends = Table::from_records(&output.trends);
    summary.record(load(pool, &trends, &TableSchema::player_trends()).await?);

    let rolling = Table::from_records(&output.rolling);
    let rolling_schema = TableSchema::player_rolling_stats();
    summary.record(load(pool, &rolling, &rolling_schema).await?);
    let refreshed = update_columns(pool, &rolling, &rolling_schema, &HERO_DIFF_COLUMNS).await?;
    debug!(rows = refreshed, "[PLAYERS] hero differentials refreshed");

    let history = Table::from_records(&output.history);
    summary.record(load(pool, &history, &TableSchema::player_match_history()).await?);
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::DEFAULT_TEAM_STATS;
    use crate::db::loader::count_rows;
    use crate::db::test_pool;
    use crate::error::AppError;
    use crate::features::streaks::tests::entry;
    use crate::fetcher::models::{parse_record_list, RawHistoryEntry};
    use crate::types::{FeatureMode, HeroTrend, Stage};
    use std::collections::HashMap;

    /// In-memory history source; accounts not in the map always fail.
    pub(crate) struct MockProvider {
        pub histories: HashMap<i64, Vec<HistoryEntry>>,
    }

    impl HistoryProvider for MockProvider {
        async fn player_history(&self, account_id: i64) -> Result<FetchedHistory> {
            self.histories
                .get(&account_id)
                .cloned()
                .map(FetchedHistory::from)
                .ok_or_else(|| AppError::Upstream(format!("no history for {account_id}")))
        }
    }

    /// Serves the JSON body the stats API would return for each account.
    struct PayloadProvider {
        payloads: HashMap<i64, &'static str>,
    }

    impl HistoryProvider for PayloadProvider {
        async fn player_history(&self, account_id: i64) -> Result<FetchedHistory> {
            let body = self
                .payloads
                .get(&account_id)
                .ok_or_else(|| AppError::Upstream(format!("no history for {account_id}")))?;
            let (raw, parse_rejected) = parse_record_list::<RawHistoryEntry>(body)?;
            Ok(FetchedHistory::from_raw(account_id, raw, parse_rejected))
        }
    }

    async fn store_account(pool: &SqlitePool, account_id: i64) {
        sqlx::query(
            "INSERT INTO player_matches
                 (account_id, match_id, hero_id, team, kills, deaths, assists,
                  denies, net_worth, won)
             VALUES (?, 1000, 1, 0, 1, 1, 1, 1, 1, 1)",
        )
        .bind(account_id)
        .execute(pool)
        .await
        .unwrap();
    }

    pub(crate) fn test_config() -> Config {
        Config {
            api_url: "http://localhost".to_string(),
            log_level: "debug".to_string(),
            db_path: ":memory:".to_string(),
            min_average_badge: 100,
            fetch_days: 1,
            match_limit: 10,
            fetch_workers: 4,
            account_chunk_size: 2,
            fetch_attempts: 2,
            retry_delay_ms: 0,
            streak_length: 3,
            hero_trend_windows: vec![7, 30],
            hero_baseline_window: 30,
            feature_mode: FeatureMode::Wide,
            team_stats: DEFAULT_TEAM_STATS.iter().map(|s| s.to_string()).collect(),
            stages: Stage::ALL.to_vec(),
        }
    }

    /// `pattern` oldest first, one match per character.
    pub(crate) fn history(account_id: i64, pattern: &str) -> Vec<HistoryEntry> {
        pattern
            .chars()
            .enumerate()
            .map(|(i, c)| entry(account_id, 1_000 + i as i64, 10_000 + i as i64 * 60, c == 'W'))
            .collect()
    }

    #[tokio::test]
    async fn failed_accounts_are_skipped_not_fatal() {
        let provider = MockProvider {
            histories: HashMap::from([(1, history(1, "WL")), (3, history(3, "LLW"))]),
        };
        let fetched = fetch_histories(&provider, &[1, 2, 3], 2, RetryPolicy::new(2, 0)).await;
        let mut ids: Vec<i64> = fetched.iter().map(|(id, _)| *id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn reversed_history_matches_ordered_history() {
        let ordered = history(1, "WLLWWW");
        let mut reversed = ordered.clone();
        reversed.reverse();
        let a = compute_chunk(vec![(1, ordered)], &HeroBaseline::default(), 3);
        let b = compute_chunk(vec![(1, reversed)], &HeroBaseline::default(), 3);
        assert_eq!(a.rolling, b.rolling);
        assert_eq!(a.trends, b.trends);
        let last = &a.rolling[5];
        assert_eq!(last.prior_win_loss_streak.as_deref(), Some("WWL"));
        assert_eq!(last.win_pct.iter().find(|(w, _)| *w == 3).map(|(_, v)| *v), Some(Some(66.67)));
    }

    #[tokio::test]
    async fn chunks_load_and_trends_are_replaced() {
        let pool = test_pool().await;
        let cfg = test_config();
        for account in [1i64, 2, 3] {
            store_account(&pool, account).await;
        }
        let provider = MockProvider {
            histories: HashMap::from([
                (1, history(1, "WWLW")),
                (2, history(2, "L")),
                (3, Vec::new()),
            ]),
        };

        let mut summary = RunSummary::default();
        run(&cfg, &pool, &provider, &mut summary).await.unwrap();
        assert_eq!(summary.skipped_accounts, 0);
        assert_eq!(summary.inserted("player_trends"), 2);
        assert_eq!(summary.inserted("player_rolling_stats"), 5);
        assert_eq!(count_rows(&pool, "player_match_history").await.unwrap(), 5);

        // A longer history on the next run replaces the trend row.
        let provider = MockProvider {
            histories: HashMap::from([
                (1, history(1, "WWLWL")),
                (2, history(2, "L")),
                (3, Vec::new()),
            ]),
        };
        let mut rerun = RunSummary::default();
        run(&cfg, &pool, &provider, &mut rerun).await.unwrap();
        assert_eq!(rerun.inserted("player_rolling_stats"), 1);
        let total: i64 =
            sqlx::query_scalar("SELECT p_total_matches FROM player_trends WHERE account_id = 1")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(total, 5);
        assert_eq!(count_rows(&pool, "player_trends").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn incomplete_history_entries_are_counted() {
        let pool = test_pool().await;
        store_account(&pool, 7).await;
        let provider = PayloadProvider {
            payloads: HashMap::from([(
                7,
                r#"[
                    {"match_id": 1, "hero_id": 3, "start_time": 100, "player_team": 0,
                     "match_result": 0, "player_kills": 3, "player_deaths": 1, "player_assists": 4},
                    {"match_id": 2, "hero_id": 3, "start_time": 200, "player_team": 0,
                     "player_kills": 2, "player_deaths": 2, "player_assists": 1},
                    {"match_id": 3, "hero_id": 3, "start_time": 300, "player_team": 1,
                     "match_result": 0, "player_kills": 0, "player_deaths": 4, "player_assists": 2}
                ]"#,
            )]),
        };

        let mut summary = RunSummary::default();
        run(&test_config(), &pool, &provider, &mut summary).await.unwrap();
        assert_eq!(summary.skipped_records, 1);
        assert_eq!(summary.skipped_accounts, 0);
        assert_eq!(summary.inserted("player_rolling_stats"), 2);
    }

    #[tokio::test]
    async fn hero_differentials_follow_the_latest_baseline() {
        let pool = test_pool().await;
        let baseline = |average_kd: f64| {
            HeroBaseline::from_trends(&[HeroTrend {
                hero_id: 1,
                trend_start_date: 0,
                trend_end_date: 30,
                trend_date: 30,
                trend_window_days: 30,
                pick_rate: 100.0,
                win_rate: 50.0,
                average_kills: 4.0,
                average_deaths: 2.0,
                average_assists: 6.0,
                average_kd,
            }])
        };
        // Every `entry` plays hero 1 at 4 kills / 2 deaths.
        let first = compute_chunk(vec![(1, history(1, "WL"))], &baseline(1.0), 3);
        store_chunk(&pool, &first, &mut RunSummary::default()).await.unwrap();
        let second = compute_chunk(vec![(1, history(1, "WL"))], &baseline(1.5), 3);
        let mut summary = RunSummary::default();
        store_chunk(&pool, &second, &mut summary).await.unwrap();
        assert_eq!(summary.inserted("player_rolling_stats"), 0);

        let kd: Vec<Option<f64>> = sqlx::query_scalar(
            "SELECT p_v_h_kd_pct FROM player_rolling_stats WHERE account_id = 1 ORDER BY match_id",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(kd, vec![Some(50.0), Some(50.0)]);
    }
}
