use crate::db::schema::{rolling_columns, streak_bucket_columns};
use crate::types::{
    HeroTrend, Match, PlayerHistoryRow, PlayerMatch, PlayerRollingStat, PlayerTrend, TrainingRow,
};

/// A single cell bound into an insert.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Int(i64),
    Real(f64),
    Text(String),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

/// NaN and infinities are stored as NULL.
impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        if v.is_finite() {
            SqlValue::Real(v)
        } else {
            SqlValue::Null
        }
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Column-named rows ready for the loader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl Table {
    pub fn from_records<R: Record>(records: &[R]) -> Self {
        Self {
            columns: R::columns(),
            rows: records.iter().map(Record::values).collect(),
        }
    }

    /// Training rows carry their own feature names; `feature_columns` fixes
    /// the order and fills absent features with NULL.
    pub fn from_training(rows: &[TrainingRow], feature_columns: &[String]) -> Self {
        let mut columns = vec!["match_id".to_string(), "team0_won".to_string()];
        columns.extend(feature_columns.iter().cloned());
        let rows = rows
            .iter()
            .map(|r| {
                let mut values = vec![SqlValue::Int(r.match_id), SqlValue::Int(r.team0_won)];
                values.extend(feature_columns.iter().map(|col| {
                    SqlValue::from(
                        r.features
                            .iter()
                            .find(|(name, _)| name == col)
                            .and_then(|(_, v)| *v),
                    )
                }));
                values
            })
            .collect();
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A domain row that knows its column names and cell values.
pub trait Record {
    fn columns() -> Vec<String>;
    fn values(&self) -> Vec<SqlValue>;
}

fn names(cols: &[&str]) -> Vec<String> {
    cols.iter().map(|c| c.to_string()).collect()
}

impl Record for Match {
    fn columns() -> Vec<String> {
        names(&["match_id", "start_time", "game_mode", "match_mode", "duration_s", "winning_team"])
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.match_id.into(),
            self.start_time.into(),
            self.game_mode.clone().into(),
            self.match_mode.clone().into(),
            self.duration_s.into(),
            self.winning_team.index().into(),
        ]
    }
}

impl Record for PlayerMatch {
    fn columns() -> Vec<String> {
        names(&[
            "account_id", "match_id", "hero_id", "team", "kills", "deaths", "assists", "denies",
            "net_worth", "won",
        ])
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.account_id.into(),
            self.match_id.into(),
            self.hero_id.into(),
            self.team.index().into(),
            self.kills.into(),
            self.deaths.into(),
            self.assists.into(),
            self.denies.into(),
            self.net_worth.into(),
            self.won.into(),
        ]
    }
}

impl Record for PlayerHistoryRow {
    fn columns() -> Vec<String> {
        names(&[
            "account_id", "match_id", "start_time", "hero_id", "team", "kills", "deaths", "assists",
            "denies", "net_worth", "won", "prior_win_loss_streak",
        ])
    }

    fn values(&self) -> Vec<SqlValue> {
        let e = &self.entry;
        vec![
            e.account_id.into(),
            e.match_id.into(),
            e.start_time.into(),
            e.hero_id.into(),
            e.team.index().into(),
            e.kills.into(),
            e.deaths.into(),
            e.assists.into(),
            e.denies.into(),
            e.net_worth.into(),
            e.won.into(),
            self.prior_win_loss_streak.clone().into(),
        ]
    }
}

impl Record for HeroTrend {
    fn columns() -> Vec<String> {
        names(&[
            "hero_id", "trend_start_date", "trend_end_date", "trend_date", "trend_window_days",
            "pick_rate", "win_rate", "average_kills", "average_deaths", "average_assists",
            "average_kd",
        ])
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.hero_id.into(),
            self.trend_start_date.into(),
            self.trend_end_date.into(),
            self.trend_date.into(),
            self.trend_window_days.into(),
            self.pick_rate.into(),
            self.win_rate.into(),
            self.average_kills.into(),
            self.average_deaths.into(),
            self.average_assists.into(),
            self.average_kd.into(),
        ]
    }
}

impl Record for PlayerTrend {
    fn columns() -> Vec<String> {
        let mut cols = names(&[
            "account_id", "p_total_kills", "p_total_deaths", "p_average_kills", "p_average_deaths",
            "p_avg_kd", "p_win_rate", "p_total_matches",
        ]);
        cols.extend(streak_bucket_columns());
        cols.push("p_win_streak_avg".to_string());
        cols.push("p_loss_streak_avg".to_string());
        cols
    }

    fn values(&self) -> Vec<SqlValue> {
        let mut values: Vec<SqlValue> = vec![
            self.account_id.into(),
            self.p_total_kills.into(),
            self.p_total_deaths.into(),
            self.p_average_kills.into(),
            self.p_average_deaths.into(),
            self.p_avg_kd.into(),
            self.p_win_rate.into(),
            self.p_total_matches.into(),
        ];
        values.extend(self.win_streaks.iter().map(|&(_, n)| SqlValue::Int(n)));
        values.extend(self.loss_streaks.iter().map(|&(_, n)| SqlValue::Int(n)));
        values.push(self.p_win_streak_avg.into());
        values.push(self.p_loss_streak_avg.into());
        values
    }
}

impl Record for PlayerRollingStat {
    fn columns() -> Vec<String> {
        let mut cols = names(&["account_id", "match_id", "start_time"]);
        cols.extend(rolling_columns());
        cols.extend(names(&["prior_win_loss_streak", "p_v_h_kd_pct", "p_v_h_pick_rate"]));
        cols
    }

    fn values(&self) -> Vec<SqlValue> {
        let mut values: Vec<SqlValue> = vec![
            self.account_id.into(),
            self.match_id.into(),
            self.start_time.into(),
        ];
        values.extend(self.win_pct.iter().map(|&(_, v)| SqlValue::from(v)));
        values.extend(self.loss_pct.iter().map(|&(_, v)| SqlValue::from(v)));
        values.push(self.prior_win_loss_streak.clone().into());
        values.push(self.p_v_h_kd_pct.into());
        values.push(self.p_v_h_pick_rate.into());
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Team;

    #[test]
    fn non_finite_reals_become_null() {
        assert_eq!(SqlValue::from(f64::NAN), SqlValue::Null);
        assert_eq!(SqlValue::from(f64::INFINITY), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(1.5)), SqlValue::Real(1.5));
        assert_eq!(SqlValue::from(None::<f64>), SqlValue::Null);
    }

    #[test]
    fn record_values_line_up_with_columns() {
        let m = Match {
            match_id: 1,
            start_time: 10,
            game_mode: "Normal".into(),
            match_mode: "Ranked".into(),
            duration_s: 1_500,
            winning_team: Team::Team1,
        };
        let t = Table::from_records(std::slice::from_ref(&m));
        assert_eq!(t.columns.len(), t.rows[0].len());
        assert_eq!(t.rows[0][5], SqlValue::Int(1));
    }

    #[test]
    fn training_table_fills_absent_features() {
        let row = TrainingRow {
            match_id: 9,
            team0_won: 0,
            features: vec![("a_min_diff".into(), Some(1.0))],
        };
        let cols = vec!["a_min_diff".to_string(), "b_min_diff".to_string()];
        let t = Table::from_training(&[row], &cols);
        assert_eq!(t.columns, vec!["match_id", "team0_won", "a_min_diff", "b_min_diff"]);
        assert_eq!(t.rows[0][2], SqlValue::Real(1.0));
        assert_eq!(t.rows[0][3], SqlValue::Null);
    }
}
