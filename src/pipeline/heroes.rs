use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::loader::delete_keys;
use crate::db::schema::TableSchema;
use crate::db::{load, Table};
use crate::error::Result;
use crate::features::hero_diff::trend_bounds;
use crate::features::build_hero_trends;
use crate::fetcher::models::hero_totals;
use crate::fetcher::{fetch_with_retry, ApiClient};
use crate::pipeline::{retry_policy, RunSummary};
use crate::types::HeroTrend;

/// Rebuild hero trends for every configured window.
pub async fn run(
    cfg: &Config,
    pool: &SqlitePool,
    api: &ApiClient,
    now: i64,
    summary: &mut RunSummary,
) -> Result<()> {
    let policy = retry_policy(cfg);
    for &window in &cfg.hero_trend_windows {
        let (start, _) = trend_bounds(window, now);
        let label = format!("hero stats {window}d");
        let Some((raw, parse_rejected)) = fetch_with_retry(&label, policy, || {
            api.fetch_hero_stats(start, cfg.min_average_badge)
        })
        .await
        else {
            warn!(window_days = window, "[HEROES] keeping previous trends for window");
            continue;
        };

        let (totals, incomplete) = hero_totals(raw);
        let rejected = parse_rejected + incomplete;
        if rejected > 0 {
            warn!(window_days = window, rejected, "[HEROES] dropped incomplete hero rows");
            summary.skipped_records += rejected;
        }
        let trends = build_hero_trends(&totals, window, now);
        replace_window(pool, window, &trends, summary).await?;
    }
    Ok(())
}

/// Drop every stored row of the window, then load the fresh snapshot. An
/// empty snapshot leaves the stored rows alone.
pub async fn replace_window(
    pool: &SqlitePool,
    window_days: u32,
    trends: &[HeroTrend],
    summary: &mut RunSummary,
) -> Result<()> {
    if trends.is_empty() {
        warn!(window_days, "[HEROES] no hero stats returned");
        return Ok(());
    }
    let window = [i64::from(window_days)];
    let deleted = delete_keys(pool, "hero_trends", "trend_window_days", &window).await?;
    summary.record(load(pool, &Table::from_records(trends), &TableSchema::hero_trends()).await?);
    info!(window_days, heroes = trends.len(), replaced = deleted, "[HEROES] window rebuilt");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SECS_PER_DAY;
    use crate::db::models::latest_hero_trends;
    use crate::db::test_pool;
    use crate::fetcher::models::HeroTotals;

    fn totals(hero_id: i64, matches: i64) -> HeroTotals {
        HeroTotals {
            hero_id,
            matches,
            wins: matches / 2,
            total_kills: matches * 5,
            total_deaths: matches * 4,
            total_assists: matches * 7,
        }
    }

    #[tokio::test]
    async fn rebuild_replaces_window_wholesale() {
        let pool = test_pool().await;
        let mut summary = RunSummary::default();
        let day1 = 100 * SECS_PER_DAY;
        let day2 = 101 * SECS_PER_DAY;

        let old = build_hero_trends(&[totals(1, 10), totals(2, 30)], 7, day1);
        replace_window(&pool, 7, &old, &mut summary).await.unwrap();
        let month = build_hero_trends(&[totals(1, 50)], 30, day1);
        replace_window(&pool, 30, &month, &mut summary).await.unwrap();

        let fresh = build_hero_trends(&[totals(1, 20)], 7, day2);
        replace_window(&pool, 7, &fresh, &mut summary).await.unwrap();

        let week = latest_hero_trends(&pool, 7).await.unwrap();
        assert_eq!(week.len(), 1);
        assert_eq!(week[0].trend_end_date, day2);
        assert_eq!(week[0].pick_rate, 100.0);
        assert_eq!(latest_hero_trends(&pool, 30).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_day_rerun_is_stable() {
        let pool = test_pool().await;
        let mut summary = RunSummary::default();
        let now = 100 * SECS_PER_DAY + 5;
        let trends = build_hero_trends(&[totals(1, 10), totals(2, 10)], 7, now);
        replace_window(&pool, 7, &trends, &mut summary).await.unwrap();
        let later = build_hero_trends(&[totals(1, 10), totals(2, 10)], 7, now + 3_600);
        replace_window(&pool, 7, &later, &mut summary).await.unwrap();
        let stored = latest_hero_trends(&pool, 7).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].hero_id, 1);
        assert_eq!(stored[0].pick_rate, 50.0);
    }
}
