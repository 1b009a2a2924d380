use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::config::SECS_PER_DAY;
use crate::error::{AppError, Result};
use crate::types::{HistoryEntry, Team};

static PARSE_FAILURES: AtomicU64 = AtomicU64::new(0);

/// A field the API sends either as a number or as a string label.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum RawLabel {
    Int(i64),
    Text(String),
}

impl RawLabel {
    pub fn as_text(&self) -> String {
        match self {
            RawLabel::Int(n) => n.to_string(),
            RawLabel::Text(s) => s.clone(),
        }
    }

    pub fn team(&self) -> Option<Team> {
        match self {
            RawLabel::Int(n) => Team::from_index(*n),
            RawLabel::Text(s) => Team::parse_label(s),
        }
    }
}

/// Unix seconds, or a `YYYY-MM-DD HH:MM:SS` / RFC 3339 string.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum RawTimestamp {
    Unix(i64),
    Fractional(f64),
    Text(String),
}

impl RawTimestamp {
    pub fn to_unix(&self) -> Option<i64> {
        match self {
            RawTimestamp::Unix(n) => Some(*n),
            RawTimestamp::Fractional(f) if f.is_finite() => Some(f.trunc() as i64),
            RawTimestamp::Fractional(_) => None,
            RawTimestamp::Text(s) => s
                .trim()
                .parse::<i64>()
                .ok()
                .or_else(|| parse_datetime_to_unix_secs(s)),
        }
    }
}

// ---------------------------------------------------------------------------
// Match metadata (GET /v1/matches/metadata)
// ---------------------------------------------------------------------------

/// One match from the bulk metadata endpoint. Every field is optional here;
/// required-field checks happen in the normalizer so a bad record is skipped,
/// not fatal.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RawMatch {
    pub match_id: Option<i64>,
    pub start_time: Option<RawTimestamp>,
    pub game_mode: Option<RawLabel>,
    pub match_mode: Option<RawLabel>,
    pub duration_s: Option<i64>,
    pub winning_team: Option<RawLabel>,
    pub players: Option<Vec<RawPlayer>>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RawPlayer {
    pub account_id: Option<i64>,
    pub team: Option<RawLabel>,
    pub hero_id: Option<i64>,
    pub kills: Option<i64>,
    pub deaths: Option<i64>,
    pub assists: Option<i64>,
    pub denies: Option<i64>,
    pub net_worth: Option<i64>,
}

// ---------------------------------------------------------------------------
// Player match history (GET /v1/players/{id}/match-history)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RawHistoryEntry {
    pub account_id: Option<i64>,
    pub match_id: Option<i64>,
    pub hero_id: Option<i64>,
    pub start_time: Option<RawTimestamp>,
    pub player_team: Option<RawLabel>,
    pub match_result: Option<RawLabel>,
    pub player_kills: Option<i64>,
    pub player_deaths: Option<i64>,
    pub player_assists: Option<i64>,
    pub denies: Option<i64>,
    pub net_worth: Option<i64>,
}

impl RawHistoryEntry {
    /// Converts to a complete entry, deriving `won` from team vs result.
    /// `account_id` falls back to the account the history was requested for.
    pub fn into_entry(self, requested_account: i64) -> Option<HistoryEntry> {
        let team = self.player_team.as_ref()?.team()?;
        let result = self.match_result.as_ref()?.team()?;
        Some(HistoryEntry {
            account_id: self.account_id.unwrap_or(requested_account),
            match_id: self.match_id?,
            start_time: self.start_time.as_ref()?.to_unix()?,
            hero_id: self.hero_id?,
            team,
            kills: self.player_kills?,
            deaths: self.player_deaths?,
            assists: self.player_assists?,
            denies: self.denies.unwrap_or(0),
            net_worth: self.net_worth.unwrap_or(0),
            won: team == result,
        })
    }
}

// ---------------------------------------------------------------------------
// Hero stats (GET /v1/analytics/hero-stats)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RawHeroStats {
    pub hero_id: Option<i64>,
    pub matches: Option<i64>,
    pub wins: Option<i64>,
    pub total_kills: Option<i64>,
    pub total_deaths: Option<i64>,
    pub total_assists: Option<i64>,
}

/// Population totals for one hero over one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeroTotals {
    pub hero_id: i64,
    pub matches: i64,
    pub wins: i64,
    pub total_kills: i64,
    pub total_deaths: i64,
    pub total_assists: i64,
}

impl RawHeroStats {
    pub fn into_totals(self) -> Option<HeroTotals> {
        Some(HeroTotals {
            hero_id: self.hero_id?,
            matches: self.matches?,
            wins: self.wins?,
            total_kills: self.total_kills.unwrap_or(0),
            total_deaths: self.total_deaths.unwrap_or(0),
            total_assists: self.total_assists.unwrap_or(0),
        })
    }
}

/// Complete hero rows of a payload, and how many were missing a required key.
pub fn hero_totals(raw: Vec<RawHeroStats>) -> (Vec<HeroTotals>, usize) {
    let total = raw.len();
    let totals: Vec<HeroTotals> = raw.into_iter().filter_map(RawHeroStats::into_totals).collect();
    let incomplete = total - totals.len();
    (totals, incomplete)
}

// ---------------------------------------------------------------------------
// List parsing
// ---------------------------------------------------------------------------

/// Parse a JSON list payload element by element.
///
/// `null` is an empty list. Anything other than an array is an upstream error.
/// Elements that fail to deserialize are dropped and counted, so one bad
/// record never discards the rest of the batch.
pub fn parse_record_list<T: DeserializeOwned>(raw: &str) -> Result<(Vec<T>, usize)> {
    let value: serde_json::Value = serde_json::from_str(raw.trim())?;
    let items = match value {
        serde_json::Value::Null => return Ok((Vec::new(), 0)),
        serde_json::Value::Array(items) => items,
        other => {
            return Err(AppError::Upstream(format!(
                "expected a JSON list, got {}",
                json_kind(&other)
            )))
        }
    };

    let mut out = Vec::with_capacity(items.len());
    let mut rejected = 0usize;
    for item in items {
        match serde_json::from_value::<T>(item) {
            Ok(rec) => out.push(rec),
            Err(e) => {
                rejected += 1;
                let count = PARSE_FAILURES.fetch_add(1, Ordering::Relaxed) + 1;
                if count <= 10 || count % 1000 == 0 {
                    warn!(count, "[PARSE] dropping malformed record: {e}");
                }
            }
        }
    }
    Ok((out, rejected))
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Parse `YYYY-MM-DD HH:MM:SS` or RFC 3339 into Unix seconds. Fractional
/// seconds and the zone suffix are ignored; the API reports UTC.
pub fn parse_datetime_to_unix_secs(s: &str) -> Option<i64> {
    let (date, time) = s.trim().split_once(|c: char| c == ' ' || c == 'T')?;

    let mut ymd = date.splitn(3, '-').map(|p| p.parse::<i64>().ok());
    let (year, month, day) = (ymd.next()??, ymd.next()??, ymd.next()??);
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }

    let clock = time.get(..8)?;
    let mut hms = clock.splitn(3, ':').map(|p| p.parse::<i64>().ok());
    let (hour, minute, second) = (hms.next()??, hms.next()??, hms.next()??);
    if hour > 23 || minute > 59 || second > 60 {
        return None;
    }

    Some(days_from_civil(year, month, day) * SECS_PER_DAY + hour * 3_600 + minute * 60 + second)
}

/// Days since 1970-01-01 in the proleptic Gregorian calendar.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let y = if month <= 2 { year - 1 } else { year };
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let mp = (month + 9) % 12;
    let doy = (153 * mp + 2) / 5 + day - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn datetime_formats_agree() {
        let spaced = parse_datetime_to_unix_secs("2025-08-19 12:30:00").unwrap();
        let rfc = parse_datetime_to_unix_secs("2025-08-19T12:30:00Z").unwrap();
        let offset = parse_datetime_to_unix_secs("2025-08-19T12:30:00.250+00:00").unwrap();
        assert_eq!(spaced, 1_755_606_600);
        assert_eq!(spaced, rfc);
        assert_eq!(spaced, offset);
        assert_eq!(parse_datetime_to_unix_secs("1970-01-02 00:00:00"), Some(86_400));
        assert_eq!(parse_datetime_to_unix_secs("2024-02-29T00:00:00Z"), Some(1_709_164_800));
        assert_eq!(parse_datetime_to_unix_secs("2025-08-19"), None);
        assert_eq!(parse_datetime_to_unix_secs("19-08-2025 12:30:00"), None);
    }

    #[test]
    fn timestamp_accepts_numbers_and_strings() {
        assert_eq!(RawTimestamp::Unix(1_700_000_000).to_unix(), Some(1_700_000_000));
        assert_eq!(RawTimestamp::Text("1700000000".into()).to_unix(), Some(1_700_000_000));
        assert_eq!(RawTimestamp::Fractional(12.9).to_unix(), Some(12));
    }

    #[test]
    fn malformed_elements_are_dropped_not_fatal() {
        let raw = r#"[{"match_id": 1}, {"match_id": "not-a-number"}, {"match_id": 3}]"#;
        let (rows, rejected) = parse_record_list::<RawMatch>(raw).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rejected, 1);
        assert_eq!(rows[1].match_id, Some(3));
    }

    #[test]
    fn null_list_is_empty_and_object_is_error() {
        let (rows, _) = parse_record_list::<RawMatch>("null").unwrap();
        assert!(rows.is_empty());
        assert!(matches!(
            parse_record_list::<RawMatch>(r#"{"error": "rate limited"}"#),
            Err(AppError::Upstream(_))
        ));
    }

    #[test]
    fn history_entry_derives_won_from_result() {
        let raw = r#"[{"match_id": 10, "hero_id": 7, "start_time": 1700000000,
                       "player_team": 1, "match_result": 1, "player_kills": 5,
                       "player_deaths": 2, "player_assists": 9}]"#;
        let (rows, _) = parse_record_list::<RawHistoryEntry>(raw).unwrap();
        let entry = rows[0].clone().into_entry(42).unwrap();
        assert_eq!(entry.account_id, 42);
        assert_eq!(entry.team, Team::Team1);
        assert!(entry.won);
        assert_eq!(entry.denies, 0);
    }

    #[test]
    fn hero_rows_without_match_count_are_counted() {
        let raw = r#"[{"hero_id": 1, "matches": 40, "wins": 22}, {"hero_id": 2, "wins": 5}]"#;
        let (rows, _) = parse_record_list::<RawHeroStats>(raw).unwrap();
        let (totals, incomplete) = hero_totals(rows);
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].total_kills, 0);
        assert_eq!(incomplete, 1);
    }

    #[test]
    fn history_entry_missing_outcome_is_rejected() {
        let raw = RawHistoryEntry {
            match_id: Some(10),
            hero_id: Some(7),
            start_time: Some(RawTimestamp::Unix(1)),
            player_team: Some(RawLabel::Int(0)),
            player_kills: Some(1),
            player_deaths: Some(1),
            player_assists: Some(1),
            ..Default::default()
        };
        assert!(raw.into_entry(42).is_none());
    }
}
