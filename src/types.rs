use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Teams
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Team {
    Team0,
    Team1,
}

impl Team {
    pub fn from_index(idx: i64) -> Option<Self> {
        match idx {
            0 => Some(Team::Team0),
            1 => Some(Team::Team1),
            _ => None,
        }
    }

    /// Accepts the API's `"Team0"`/`"Team1"` labels as well as bare `"0"`/`"1"`.
    pub fn parse_label(s: &str) -> Option<Self> {
        let s = s.trim();
        let digits = match s.get(..4) {
            Some(prefix) if prefix.eq_ignore_ascii_case("team") => &s[4..],
            _ => s,
        };
        digits.parse::<i64>().ok().and_then(Team::from_index)
    }

    pub fn index(self) -> i64 {
        match self {
            Team::Team0 => 0,
            Team::Team1 => 1,
        }
    }
}

impl std::fmt::Display for Team {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Team::Team0 => "Team0",
            Team::Team1 => "Team1",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Normalized match tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub match_id: i64,
    /// Unix seconds, UTC.
    pub start_time: i64,
    pub game_mode: String,
    pub match_mode: String,
    pub duration_s: i64,
    pub winning_team: Team,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerMatch {
    pub account_id: i64,
    pub match_id: i64,
    pub hero_id: i64,
    pub team: Team,
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub denies: i64,
    pub net_worth: i64,
    /// Unset by the normalizer; filled once the owning match's winner is known.
    pub won: Option<bool>,
}

/// One row of a player's own match history, as returned by the history endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub account_id: i64,
    pub match_id: i64,
    pub start_time: i64,
    pub hero_id: i64,
    pub team: Team,
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub denies: i64,
    pub net_worth: i64,
    pub won: bool,
}

/// A history entry as persisted, carrying the outcome token of the matches before it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerHistoryRow {
    pub entry: HistoryEntry,
    pub prior_win_loss_streak: Option<String>,
}

// ---------------------------------------------------------------------------
// Derived trend tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct HeroTrend {
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

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerTrend {
    pub account_id: i64,
    pub p_total_kills: i64,
    pub p_total_deaths: i64,
    pub p_average_kills: f64,
    pub p_average_deaths: f64,
    pub p_avg_kd: f64,
    pub p_win_rate: f64,
    pub p_total_matches: i64,
    /// `(min_len, count)` for win streaks of at least `min_len` matches.
    pub win_streaks: Vec<(usize, i64)>,
    pub loss_streaks: Vec<(usize, i64)>,
    pub p_win_streak_avg: Option<f64>,
    pub p_loss_streak_avg: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerRollingStat {
    pub account_id: i64,
    pub match_id: i64,
    pub start_time: i64,
    /// `(window, value)`; value is `None` until `window` prior matches exist.
    pub win_pct: Vec<(usize, Option<f64>)>,
    pub loss_pct: Vec<(usize, Option<f64>)>,
    pub prior_win_loss_streak: Option<String>,
    pub p_v_h_kd_pct: Option<f64>,
    pub p_v_h_pick_rate: Option<f64>,
}

// ---------------------------------------------------------------------------
// Training output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureMode {
    /// `<stat>_<agg>_Team0` and `<stat>_<agg>_Team1` columns.
    Wide,
    /// `<stat>_<agg>_diff` = Team0 − Team1 columns only.
    Differential,
}

impl FeatureMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "wide" | "team" => Some(FeatureMode::Wide),
            "diff" | "differential" => Some(FeatureMode::Differential),
            _ => None,
        }
    }
}

impl std::fmt::Display for FeatureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureMode::Wide => write!(f, "wide"),
            FeatureMode::Differential => write!(f, "diff"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub match_id: i64,
    pub team0_won: i64,
    pub features: Vec<(String, Option<f64>)>,
}

// ---------------------------------------------------------------------------
// Pipeline stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Matches,
    Heroes,
    Players,
    Training,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Matches, Stage::Heroes, Stage::Players, Stage::Training];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "matches" => Some(Stage::Matches),
            "heroes" => Some(Stage::Heroes),
            "players" => Some(Stage::Players),
            "training" => Some(Stage::Training),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Matches => "matches",
            Stage::Heroes => "heroes",
            Stage::Players => "players",
            Stage::Training => "training",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_labels_parse_both_shapes() {
        assert_eq!(Team::parse_label("Team0"), Some(Team::Team0));
        assert_eq!(Team::parse_label("team1"), Some(Team::Team1));
        assert_eq!(Team::parse_label("1"), Some(Team::Team1));
        assert_eq!(Team::parse_label("Team2"), None);
        assert_eq!(Team::parse_label("Spectator"), None);
    }

    #[test]
    fn feature_mode_parses_aliases() {
        assert_eq!(FeatureMode::parse("diff"), Some(FeatureMode::Differential));
        assert_eq!(FeatureMode::parse(" WIDE "), Some(FeatureMode::Wide));
        assert_eq!(FeatureMode::parse("pivot"), None);
    }
}
