mod config;
mod db;
mod error;
mod features;
mod fetcher;
mod pipeline;
mod types;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::ApiClient;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    let api = ApiClient::new(&cfg.api_url)?;
    let stages: Vec<String> = cfg.stages.iter().map(|s| s.to_string()).collect();
    info!(
        "Starting run: stages=[{}] days={} badge>={} workers={} chunk={} mode={} stats={}",
        stages.join(","),
        cfg.fetch_days,
        cfg.min_average_badge,
        cfg.fetch_workers,
        cfg.account_chunk_size,
        cfg.feature_mode,
        cfg.team_stats.len(),
    );

    let summary = pipeline::run(&cfg, &pool, &api).await?;
    summary.log();

    pool.close().await;
    Ok(())
}
