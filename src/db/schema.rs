use crate::config::{ROLLING_WINDOWS, STREAK_BUCKETS};
use crate::error::{AppError, Result};
use crate::types::FeatureMode;

/// Required columns and primary key of one target table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
    pub primary_key: Vec<String>,
}

impl TableSchema {
    fn fixed(name: &str, columns: &[&str], primary_key: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn matches() -> Self {
        Self::fixed(
            "matches",
            &["match_id", "start_time", "game_mode", "match_mode", "duration_s", "winning_team"],
            &["match_id"],
        )
    }

    pub fn player_matches() -> Self {
        Self::fixed(
            "player_matches",
            &[
                "account_id", "match_id", "hero_id", "team", "kills", "deaths", "assists",
                "denies", "net_worth", "won",
            ],
            &["account_id", "match_id"],
        )
    }

    pub fn player_match_history() -> Self {
        Self::fixed(
            "player_match_history",
            &[
                "account_id", "match_id", "start_time", "hero_id", "team", "kills", "deaths",
                "assists", "denies", "net_worth", "won", "prior_win_loss_streak",
            ],
            &["account_id", "match_id"],
        )
    }

    pub fn hero_trends() -> Self {
        Self::fixed(
            "hero_trends",
            &[
                "hero_id", "trend_start_date", "trend_end_date", "trend_date", "trend_window_days",
                "pick_rate", "win_rate", "average_kills", "average_deaths", "average_assists",
                "average_kd",
            ],
            &["hero_id", "trend_start_date", "trend_end_date", "trend_window_days"],
        )
    }

    pub fn player_trends() -> Self {
        let mut schema = Self::fixed(
            "player_trends",
            &[
                "account_id", "p_total_kills", "p_total_deaths", "p_average_kills",
                "p_average_deaths", "p_avg_kd", "p_win_rate", "p_total_matches",
            ],
            &["account_id"],
        );
        schema.columns.extend(streak_bucket_columns());
        schema.columns.push("p_win_streak_avg".to_string());
        schema.columns.push("p_loss_streak_avg".to_string());
        schema
    }

    pub fn player_rolling_stats() -> Self {
        let mut schema = Self::fixed(
            "player_rolling_stats",
            &["account_id", "match_id", "start_time"],
            &["account_id", "match_id"],
        );
        schema.columns.extend(rolling_columns());
        schema.columns.extend(
            ["prior_win_loss_streak", "p_v_h_kd_pct", "p_v_h_pick_rate"]
                .iter()
                .map(|c| c.to_string()),
        );
        schema
    }

    /// Training table for a feature mode; columns follow the configured stats.
    pub fn training(mode: FeatureMode, feature_columns: &[String]) -> Self {
        let mut columns = vec!["match_id".to_string(), "team0_won".to_string()];
        columns.extend(feature_columns.iter().cloned());
        Self {
            name: training_table_name(mode).to_string(),
            columns,
            primary_key: vec!["match_id".to_string()],
        }
    }

    /// `CREATE TABLE IF NOT EXISTS` for a training table. Key columns and
    /// the label are NOT NULL integers; feature columns are nullable REAL.
    pub fn training_ddl(&self) -> Result<String> {
        let mut defs = Vec::with_capacity(self.columns.len() + 1);
        for col in &self.columns {
            let ty = if self.primary_key.contains(col) || col == "team0_won" {
                "INTEGER NOT NULL"
            } else {
                "REAL"
            };
            defs.push(format!("{} {ty}", quote_ident(col)?));
        }
        let key = self
            .primary_key
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Result<Vec<_>>>()?;
        defs.push(format!("PRIMARY KEY ({})", key.join(", ")));
        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            quote_ident(&self.name)?,
            defs.join(",\n    ")
        ))
    }

    /// Positions of the primary key columns within `columns`.
    pub fn key_positions(&self) -> Vec<usize> {
        self.primary_key
            .iter()
            .filter_map(|k| self.columns.iter().position(|c| c == k))
            .collect()
    }
}

pub fn training_table_name(mode: FeatureMode) -> &'static str {
    match mode {
        FeatureMode::Wide => "training_features",
        FeatureMode::Differential => "training_features_diff",
    }
}

pub fn streak_bucket_columns() -> Vec<String> {
    let mut cols: Vec<String> =
        STREAK_BUCKETS.iter().map(|n| format!("win_streaks_{n}plus")).collect();
    cols.extend(STREAK_BUCKETS.iter().map(|n| format!("loss_streaks_{n}plus")));
    cols
}

pub fn rolling_columns() -> Vec<String> {
    let mut cols: Vec<String> = ROLLING_WINDOWS.iter().map(|w| format!("p_win_pct_{w}")).collect();
    cols.extend(ROLLING_WINDOWS.iter().map(|w| format!("p_loss_pct_{w}")));
    cols
}

/// Hero trend columns exposed to team aggregation, as `(source, feature name)`.
pub const HERO_FEATURES: [(&str, &str); 3] = [
    ("win_rate", "h_win_rate"),
    ("average_kd", "h_average_kd"),
    ("pick_rate", "h_pick_rate"),
];

/// A numeric per-player feature read for team aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureColumn {
    /// `pt` player_trends, `rs` player_rolling_stats, `ht` hero_trends.
    pub alias: &'static str,
    pub source: String,
    pub name: String,
}

impl FeatureColumn {
    fn new(alias: &'static str, source: &str, name: &str) -> Self {
        Self {
            alias,
            source: source.to_string(),
            name: name.to_string(),
        }
    }
}

pub fn player_feature_columns() -> Vec<FeatureColumn> {
    let trends = TableSchema::player_trends();
    let rolling = TableSchema::player_rolling_stats();
    let mut out: Vec<FeatureColumn> = trends
        .columns
        .iter()
        .filter(|c| c.as_str() != "account_id")
        .map(|c| FeatureColumn::new("pt", c, c))
        .collect();
    out.extend(
        rolling
            .columns
            .iter()
            .filter(|c| {
                !matches!(
                    c.as_str(),
                    "account_id" | "match_id" | "start_time" | "prior_win_loss_streak"
                )
            })
            .map(|c| FeatureColumn::new("rs", c, c)),
    );
    out.extend(HERO_FEATURES.iter().map(|(source, name)| FeatureColumn::new("ht", source, name)));
    out
}

/// Double-quote an identifier. Only `[A-Za-z0-9_]` names are accepted since
/// training columns come from configuration.
pub fn quote_ident(name: &str) -> Result<String> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::Config(format!("invalid column name '{name}'")));
    }
    Ok(format!("\"{name}\""))
}
