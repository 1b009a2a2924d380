//! Read-side row types and queries.

use std::collections::HashMap;

use sqlx::{Row, SqlitePool};
use tracing::warn;

use crate::db::schema::{player_feature_columns, quote_ident};
use crate::error::Result;
use crate::features::team::PlayerFeatureRow;
use crate::types::{HeroTrend, Team};

#[derive(Debug, sqlx::FromRow)]
pub struct HeroTrendRow {
    pub hero_id: i64,
    pub trend_start_date: i64,
    pub trend_end_date: i64,
    pub trend_date: i64,
    pub trend_window_days: i64,
    pub pick_rate: f64,
    pub win_rate: f64,
    pub average_kills: f64,
    pub average_deaths: f64,
    pub average_assists: f64,
    pub average_kd: f64,
}

impl From<HeroTrendRow> for HeroTrend {
    fn from(r: HeroTrendRow) -> Self {
        HeroTrend {
            hero_id: r.hero_id,
            trend_start_date: r.trend_start_date,
            trend_end_date: r.trend_end_date,
            trend_date: r.trend_date,
            trend_window_days: r.trend_window_days,
            pick_rate: r.pick_rate,
            win_rate: r.win_rate,
            average_kills: r.average_kills,
            average_deaths: r.average_deaths,
            average_assists: r.average_assists,
            average_kd: r.average_kd,
        }
    }
}

/// Every account seen in stored matches, ascending.
pub async fn distinct_accounts(pool: &SqlitePool) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT DISTINCT account_id FROM player_matches ORDER BY account_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// The most recent snapshot for a trend window.
pub async fn latest_hero_trends(pool: &SqlitePool, window_days: u32) -> Result<Vec<HeroTrend>> {
    let rows = sqlx::query_as::<_, HeroTrendRow>(
        r#"
        SELECT hero_id, trend_start_date, trend_end_date, trend_date, trend_window_days,
               pick_rate, win_rate, average_kills, average_deaths, average_assists, average_kd
        FROM hero_trends
        WHERE trend_window_days = ?
          AND trend_end_date = (
              SELECT MAX(trend_end_date) FROM hero_trends WHERE trend_window_days = ?
          )
        ORDER BY hero_id
        "#,
    )
    .bind(i64::from(window_days))
    .bind(i64::from(window_days))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(HeroTrend::from).collect())
}

/// Every stored player slot with the player's trend and rolling features for
/// that match, plus the latest `baseline_window` trend of the hero played.
/// Returns the feature names alongside the rows.
pub async fn player_feature_rows(
    pool: &SqlitePool,
    baseline_window: u32,
) -> Result<(Vec<String>, Vec<PlayerFeatureRow>)> {
    let features = player_feature_columns();
    let mut select = vec![
        "pm.account_id".to_string(),
        "pm.match_id".to_string(),
        "pm.team".to_string(),
        "pm.won".to_string(),
    ];
    for f in &features {
        select.push(format!(
            "CAST({}.{} AS REAL) AS {}",
            f.alias,
            quote_ident(&f.source)?,
            quote_ident(&f.name)?
        ));
    }
    let sql = format!(
        "SELECT {}
         FROM player_matches pm
         LEFT JOIN player_trends pt ON pt.account_id = pm.account_id
         LEFT JOIN player_rolling_stats rs
                ON rs.account_id = pm.account_id AND rs.match_id = pm.match_id
         LEFT JOIN hero_trends ht
                ON ht.hero_id = pm.hero_id
               AND ht.trend_window_days = ?
               AND ht.trend_end_date = (
                   SELECT MAX(trend_end_date) FROM hero_trends WHERE trend_window_days = ?
               )
         ORDER BY pm.match_id, pm.account_id",
        select.join(", ")
    );

    let names: Vec<String> = features.into_iter().map(|f| f.name).collect();
    let mut out = Vec::new();
    let mut bad_team = 0usize;
    let rows = sqlx::query(&sql)
        .bind(i64::from(baseline_window))
        .bind(i64::from(baseline_window))
        .fetch_all(pool)
        .await?;
    for row in rows {
        let team_idx: i64 = row.try_get("team")?;
        let Some(team) = Team::from_index(team_idx) else {
            bad_team += 1;
            continue;
        };
        let won: Option<i64> = row.try_get("won")?;
        let mut stats = HashMap::with_capacity(names.len());
        for name in &names {
            let value: Option<f64> = row.try_get(name.as_str())?;
            stats.insert(name.clone(), value);
        }
        out.push(PlayerFeatureRow {
            account_id: row.try_get("account_id")?,
            match_id: row.try_get("match_id")?,
            team,
            won: won.map(|w| w != 0),
            stats,
        });
    }
    if bad_team > 0 {
        warn!(rows = bad_team, "[TRAINING] skipped player rows with unknown team");
    }
    Ok((names, out))
}
