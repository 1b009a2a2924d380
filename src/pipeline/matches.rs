use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::config::Config;
use crate::db::schema::TableSchema;
use crate::db::{load, Table};
use crate::error::Result;
use crate::features::{attach_outcomes, normalize_matches, Normalized};
use crate::fetcher::ApiClient;
use crate::pipeline::{retry_policy, RunSummary};

/// Fetch the configured day windows, normalize and load.
pub async fn run(
    cfg: &Config,
    pool: &SqlitePool,
    api: &ApiClient,
    now: i64,
    summary: &mut RunSummary,
) -> Result<()> {
    let batches = api
        .fetch_day_batches(
            cfg.fetch_days,
            now,
            cfg.min_average_badge,
            cfg.match_limit,
            retry_policy(cfg),
        )
        .await;
    if batches.is_empty() {
        warn!("[MATCHES] no day window could be fetched");
        return Ok(());
    }
    store(pool, normalize_matches(&batches), summary).await
}

/// Attach outcomes and load both normalized tables. Matches go first so a
/// player row never exists without its match.
pub async fn store(
    pool: &SqlitePool,
    normalized: Normalized,
    summary: &mut RunSummary,
) -> Result<()> {
    let Normalized {
        matches,
        mut player_matches,
        stats,
    } = normalized;

    let unresolved = attach_outcomes(&matches, &mut player_matches);
    if unresolved > 0 {
        warn!(rows = unresolved, "[MATCHES] player rows without a known outcome");
    }
    summary.skipped_matches += stats.skipped();
    summary.skipped_players += stats.players_dropped;

    summary.record(load(pool, &Table::from_records(&matches), &TableSchema::matches()).await?);
    summary.record(
        load(pool, &Table::from_records(&player_matches), &TableSchema::player_matches()).await?,
    );
    info!(
        matches = matches.len(),
        players = player_matches.len(),
        "[MATCHES] stored"
    );
    Ok(())
}
