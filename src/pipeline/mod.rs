pub mod heroes;
pub mod matches;
pub mod players;
pub mod training;

use std::time::{SystemTime, UNIX_EPOCH};

use sqlx::SqlitePool;
use tracing::info;

use crate::config::Config;
use crate::db::LoadReport;
use crate::error::Result;
use crate::fetcher::{ApiClient, RetryPolicy};
use crate::types::Stage;

/// Counts accumulated across every stage of one run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub skipped_matches: usize,
    pub skipped_players: usize,
    pub skipped_accounts: usize,
    /// History entries and hero rows dropped for missing or malformed fields.
    pub skipped_records: usize,
    /// One merged report per table, in first-load order.
    pub loads: Vec<LoadReport>,
}

impl RunSummary {
    /// Fold a load into the per-table totals.
    pub fn record(&mut self, report: LoadReport) {
        info!(
            table = %report.table,
            input = report.input_rows,
            inserted = report.inserted,
            "[LOAD] {} rows in, {} new",
            report.input_rows,
            report.inserted,
        );
        match self.loads.iter_mut().find(|r| r.table == report.table) {
            Some(existing) => {
                existing.input_rows += report.input_rows;
                existing.inserted += report.inserted;
            }
            None => self.loads.push(report),
        }
    }

    pub fn inserted(&self, table: &str) -> u64 {
        self.loads
            .iter()
            .find(|r| r.table == table)
            .map_or(0, |r| r.inserted)
    }

    pub fn log(&self) {
        info!(
            skipped_matches = self.skipped_matches,
            skipped_players = self.skipped_players,
            skipped_accounts = self.skipped_accounts,
            skipped_records = self.skipped_records,
            "Run complete"
        );
        for r in &self.loads {
            info!(
                table = %r.table,
                input = r.input_rows,
                inserted = r.inserted,
                skipped = r.skipped(),
                "  {:<24} {:>8} new / {:>8} in",
                r.table,
                r.inserted,
                r.input_rows,
            );
        }
    }
}

pub fn retry_policy(cfg: &Config) -> RetryPolicy {
    RetryPolicy::new(cfg.fetch_attempts, cfg.retry_delay_ms)
}

/// Run the configured stages in pipeline order.
pub async fn run(cfg: &Config, pool: &SqlitePool, api: &ApiClient) -> Result<RunSummary> {
    let now = now_unix();
    let mut summary = RunSummary::default();

    for &stage in &cfg.stages {
        info!("[PIPELINE] stage {stage}");
        match stage {
            Stage::Matches => matches::run(cfg, pool, api, now, &mut summary).await?,
            Stage::Heroes => heroes::run(cfg, pool, api, now, &mut summary).await?,
            Stage::Players => players::run(cfg, pool, api, &mut summary).await?,
            Stage::Training => training::run(cfg, pool, &mut summary).await?,
        }
    }
    Ok(summary)
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(table: &str, input_rows: usize, inserted: u64) -> LoadReport {
        LoadReport {
            table: table.to_string(),
            input_rows,
            inserted,
        }
    }

    #[test]
    fn reports_merge_per_table() {
        let mut summary = RunSummary::default();
        summary.record(report("player_trends", 500, 500));
        summary.record(report("player_rolling_stats", 9_000, 8_000));
        summary.record(report("player_trends", 120, 100));
        assert_eq!(summary.loads.len(), 2);
        assert_eq!(summary.inserted("player_trends"), 600);
        assert_eq!(summary.loads[0].input_rows, 620);
        assert_eq!(summary.inserted("matches"), 0);
    }
}
