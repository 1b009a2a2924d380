use std::collections::{BTreeMap, HashMap};

use tracing::{info, warn};

use crate::config::{PLAYERS_PER_MATCH, PLAYERS_PER_TEAM};
use crate::error::{AppError, Result};
use crate::features::round_to;
use crate::types::{FeatureMode, Team, TrainingRow};

/// One player's slot in a match with the numeric features gathered for them.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerFeatureRow {
    pub account_id: i64,
    pub match_id: i64,
    pub team: Team,
    pub won: Option<bool>,
    pub stats: HashMap<String, Option<f64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agg {
    Min,
    Max,
    Mean,
    Std,
}

impl Agg {
    pub const ALL: [Agg; 4] = [Agg::Min, Agg::Max, Agg::Mean, Agg::Std];
}

impl std::fmt::Display for Agg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Agg::Min => "min",
            Agg::Max => "max",
            Agg::Mean => "mean",
            Agg::Std => "std",
        };
        write!(f, "{s}")
    }
}

/// Why a match produced no training row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeamRejection {
    RowCount(usize),
    TeamSplit { team0: usize, team1: usize },
    MissingOutcome,
    /// Players of the same team disagree on `won`.
    OutcomeDisagreement(Team),
    /// Both teams claim the same result.
    OutcomeConflict,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TeamStats {
    pub matches_seen: usize,
    pub rows_emitted: usize,
    pub rejected_row_count: usize,
    pub rejected_team_split: usize,
    pub rejected_outcome: usize,
}

impl TeamStats {
    pub fn rejected(&self) -> usize {
        self.rejected_row_count + self.rejected_team_split + self.rejected_outcome
    }
}

/// min / max / mean / sample std over the non-null values.
fn summarize(values: &[f64]) -> [Option<f64>; 4] {
    if values.is_empty() {
        return [None; 4];
    }
    let n = values.len() as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / n;
    let std = (values.len() >= 2).then(|| {
        let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (n - 1.0)).sqrt()
    });
    [Some(min), Some(max), Some(mean), std]
}

fn team_outcome(
    rows: &[&PlayerFeatureRow],
    team: Team,
) -> std::result::Result<bool, TeamRejection> {
    let mut outcome = None;
    for r in rows {
        let won = r.won.ok_or(TeamRejection::MissingOutcome)?;
        match outcome {
            None => outcome = Some(won),
            Some(prev) if prev != won => return Err(TeamRejection::OutcomeDisagreement(team)),
            Some(_) => {}
        }
    }
    outcome.ok_or(TeamRejection::MissingOutcome)
}

/// Fold the twelve player rows of one match into one training row.
pub fn aggregate_match(
    match_id: i64,
    rows: &[PlayerFeatureRow],
    stats: &[String],
    mode: FeatureMode,
) -> std::result::Result<TrainingRow, TeamRejection> {
    if rows.len() != PLAYERS_PER_MATCH {
        return Err(TeamRejection::RowCount(rows.len()));
    }
    let (team0, team1): (Vec<&PlayerFeatureRow>, Vec<&PlayerFeatureRow>) =
        rows.iter().partition(|r| r.team == Team::Team0);
    if team0.len() != PLAYERS_PER_TEAM || team1.len() != PLAYERS_PER_TEAM {
        return Err(TeamRejection::TeamSplit {
            team0: team0.len(),
            team1: team1.len(),
        });
    }

    let team0_won = team_outcome(&team0, Team::Team0)?;
    let team1_won = team_outcome(&team1, Team::Team1)?;
    if team0_won == team1_won {
        return Err(TeamRejection::OutcomeConflict);
    }

    let values = |team: &[&PlayerFeatureRow], stat: &str| -> Vec<f64> {
        team.iter()
            .filter_map(|r| r.stats.get(stat).copied().flatten())
            .filter(|v| v.is_finite())
            .collect()
    };

    let mut features = Vec::with_capacity(stats.len() * Agg::ALL.len() * 2);
    for stat in stats {
        let t0 = summarize(&values(&team0, stat));
        let t1 = summarize(&values(&team1, stat));
        for (i, agg) in Agg::ALL.iter().enumerate() {
            match mode {
                FeatureMode::Wide => {
                    features.push((format!("{stat}_{agg}_Team0"), t0[i]));
                    features.push((format!("{stat}_{agg}_Team1"), t1[i]));
                }
                FeatureMode::Differential => {
                    let diff = match (t0[i], t1[i]) {
                        (Some(a), Some(b)) => Some(round_to(a - b, 3)),
                        _ => None,
                    };
                    features.push((format!("{stat}_{agg}_diff"), diff));
                }
            }
        }
    }

    Ok(TrainingRow {
        match_id,
        team0_won: i64::from(team0_won),
        features,
    })
}

/// Configured stat set and output mode for a training run.
#[derive(Debug, Clone)]
pub struct TeamAggregator {
    stats: Vec<String>,
    mode: FeatureMode,
}

impl TeamAggregator {
    pub fn new(stats: Vec<String>, mode: FeatureMode) -> Self {
        Self { stats, mode }
    }

    pub fn mode(&self) -> FeatureMode {
        self.mode
    }

    /// Feature column names in output order.
    pub fn feature_columns(&self) -> Vec<String> {
        let mut cols = Vec::new();
        for stat in &self.stats {
            for agg in Agg::ALL {
                match self.mode {
                    FeatureMode::Wide => {
                        cols.push(format!("{stat}_{agg}_Team0"));
                        cols.push(format!("{stat}_{agg}_Team1"));
                    }
                    FeatureMode::Differential => cols.push(format!("{stat}_{agg}_diff")),
                }
            }
        }
        cols
    }

    /// Every configured stat must be a key of the player feature map.
    pub fn check_stats(&self, available: &[String]) -> Result<()> {
        let missing: Vec<String> = self
            .stats
            .iter()
            .filter(|s| !available.contains(s))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AppError::Schema {
                table: "player features".to_string(),
                missing,
            })
        }
    }

    /// Group rows by match and aggregate each; rejected matches are logged
    /// and counted.
    pub fn aggregate_all(&self, rows: Vec<PlayerFeatureRow>) -> (Vec<TrainingRow>, TeamStats) {
        let mut by_match: BTreeMap<i64, Vec<PlayerFeatureRow>> = BTreeMap::new();
        for r in rows {
            by_match.entry(r.match_id).or_default().push(r);
        }

        let mut stats = TeamStats::default();
        let mut out = Vec::with_capacity(by_match.len());
        for (match_id, players) in by_match {
            stats.matches_seen += 1;
            match aggregate_match(match_id, &players, &self.stats, self.mode) {
                Ok(row) => out.push(row),
                Err(rejection) => {
                    warn!(match_id, "[TEAM] dropping match: {rejection:?}");
                    match rejection {
                        TeamRejection::RowCount(_) => stats.rejected_row_count += 1,
                        TeamRejection::TeamSplit { .. } => stats.rejected_team_split += 1,
                        TeamRejection::MissingOutcome
                        | TeamRejection::OutcomeDisagreement(_)
                        | TeamRejection::OutcomeConflict => stats.rejected_outcome += 1,
                    }
                }
            }
        }
        stats.rows_emitted = out.len();
        info!(
            mode = %self.mode,
            seen = stats.matches_seen,
            emitted = stats.rows_emitted,
            rejected = stats.rejected(),
            "Aggregated team features"
        );
        (out, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> Vec<String> {
        vec!["p_avg_kd".to_string(), "p_win_rate".to_string()]
    }

    fn player(
        match_id: i64,
        slot: i64,
        team: Team,
        won: bool,
        kd: Option<f64>,
    ) -> PlayerFeatureRow {
        let mut map = HashMap::new();
        map.insert("p_avg_kd".to_string(), kd);
        map.insert("p_win_rate".to_string(), Some(50.0));
        PlayerFeatureRow {
            account_id: match_id * 100 + slot,
            match_id,
            team,
            won: Some(won),
            stats: map,
        }
    }

    /// Team0 kd 1..=6, Team1 kd 0.5 each; Team0 wins.
    fn full_match(match_id: i64) -> Vec<PlayerFeatureRow> {
        let mut rows: Vec<PlayerFeatureRow> = (0..6)
            .map(|i| player(match_id, i, Team::Team0, true, Some((i + 1) as f64)))
            .collect();
        rows.extend((6..12).map(|i| player(match_id, i, Team::Team1, false, Some(0.5))));
        rows
    }

    fn feature(row: &TrainingRow, name: &str) -> Option<f64> {
        row.features
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| *v)
    }

    #[test]
    fn wide_row_has_both_team_columns() {
        let row = aggregate_match(1, &full_match(1), &stats(), FeatureMode::Wide).unwrap();
        assert_eq!(row.team0_won, 1);
        assert_eq!(row.features.len(), 2 * 4 * 2);
        assert_eq!(feature(&row, "p_avg_kd_min_Team0"), Some(1.0));
        assert_eq!(feature(&row, "p_avg_kd_max_Team0"), Some(6.0));
        assert_eq!(feature(&row, "p_avg_kd_mean_Team0"), Some(3.5));
        assert_eq!(feature(&row, "p_avg_kd_std_Team1"), Some(0.0));
        let std0 = feature(&row, "p_avg_kd_std_Team0").unwrap();
        assert!((std0 - 1.870_828_693).abs() < 1e-6);
    }

    #[test]
    fn diff_row_subtracts_team1() {
        let row = aggregate_match(1, &full_match(1), &stats(), FeatureMode::Differential).unwrap();
        assert_eq!(row.features.len(), 2 * 4);
        assert_eq!(feature(&row, "p_avg_kd_mean_diff"), Some(3.0));
        assert_eq!(feature(&row, "p_win_rate_max_diff"), Some(0.0));
        assert_eq!(feature(&row, "p_avg_kd_std_diff"), Some(1.871));
        assert!(row.features.iter().all(|(n, _)| n.ends_with("_diff")));
    }

    #[test]
    fn seven_five_split_yields_no_row() {
        let mut rows = full_match(1);
        rows[6].team = Team::Team0;
        rows[6].won = Some(true);
        assert_eq!(
            aggregate_match(1, &rows, &stats(), FeatureMode::Wide),
            Err(TeamRejection::TeamSplit { team0: 7, team1: 5 })
        );
    }

    #[test]
    fn short_match_yields_no_row() {
        let mut rows = full_match(1);
        rows.pop();
        assert_eq!(
            aggregate_match(1, &rows, &stats(), FeatureMode::Wide),
            Err(TeamRejection::RowCount(11))
        );
    }

    #[test]
    fn outcome_disagreement_drops_match() {
        let mut rows = full_match(1);
        rows[2].won = Some(false);
        assert_eq!(
            aggregate_match(1, &rows, &stats(), FeatureMode::Wide),
            Err(TeamRejection::OutcomeDisagreement(Team::Team0))
        );
    }

    #[test]
    fn null_values_are_skipped_and_all_null_is_null() {
        let mut rows = full_match(1);
        for r in rows.iter_mut().filter(|r| r.team == Team::Team1) {
            r.stats.insert("p_avg_kd".to_string(), None);
        }
        rows[0].stats.insert("p_avg_kd".to_string(), None);
        let row = aggregate_match(1, &rows, &stats(), FeatureMode::Differential).unwrap();
        assert_eq!(feature(&row, "p_avg_kd_mean_diff"), None);

        let wide = aggregate_match(1, &rows, &stats(), FeatureMode::Wide).unwrap();
        assert_eq!(feature(&wide, "p_avg_kd_min_Team0"), Some(2.0));
        assert_eq!(feature(&wide, "p_avg_kd_mean_Team1"), None);
    }

    #[test]
    fn aggregate_all_counts_rejections() {
        let mut rows = full_match(1);
        let mut bad = full_match(2);
        bad.truncate(10);
        rows.extend(bad);
        let agg = TeamAggregator::new(stats(), FeatureMode::Wide);
        let (out, counts) = agg.aggregate_all(rows);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].match_id, 1);
        assert_eq!(counts.rejected_row_count, 1);
        let names: Vec<String> = out[0].features.iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names, agg.feature_columns());
    }

    #[test]
    fn unknown_stat_is_schema_error() {
        let agg = TeamAggregator::new(vec!["p_avg_kd".into(), "p_mmr".into()], FeatureMode::Wide);
        let err = agg.check_stats(&["p_avg_kd".to_string()]).unwrap_err();
        assert!(matches!(
            err,
            AppError::Schema { missing, .. } if missing == vec!["p_mmr".to_string()]
        ));
    }
}
