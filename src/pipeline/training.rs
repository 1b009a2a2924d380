use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db::schema::TableSchema;
use crate::db::{ensure_training_table, load, models, Table};
use crate::error::Result;
use crate::features::TeamAggregator;
use crate::pipeline::RunSummary;

/// Fold stored player features into one row per match and load them into the
/// training table for the configured mode.
pub async fn run(cfg: &Config, pool: &SqlitePool, summary: &mut RunSummary) -> Result<()> {
    let aggregator = TeamAggregator::new(cfg.team_stats.clone(), cfg.feature_mode);
    let (available, rows) = models::player_feature_rows(pool, cfg.hero_baseline_window).await?;
    aggregator.check_stats(&available)?;

    let (training, stats) = aggregator.aggregate_all(rows);
    summary.skipped_matches += stats.rejected();

    let columns = aggregator.feature_columns();
    let schema = TableSchema::training(aggregator.mode(), &columns);
    ensure_training_table(pool, &schema).await?;
    summary.record(load(pool, &Table::from_training(&training, &columns), &schema).await?);
    info!(
        table = %schema.name,
        features = columns.len(),
        matches = training.len(),
        "[TRAINING] built"
    );
    Ok(())
}
