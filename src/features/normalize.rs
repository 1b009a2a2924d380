use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::config::{PLAYERS_PER_MATCH, PLAYERS_PER_TEAM};
use crate::fetcher::models::{RawMatch, RawPlayer};
use crate::types::{Match, PlayerMatch, Team};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NormalizeStats {
    pub matches_seen: usize,
    pub matches_kept: usize,
    pub skipped_missing_fields: usize,
    pub skipped_player_count: usize,
    pub skipped_team_split: usize,
    pub skipped_bad_player: usize,
    pub skipped_duplicate: usize,
    /// Player entries that belonged to rejected matches.
    pub players_dropped: usize,
}

impl NormalizeStats {
    pub fn skipped(&self) -> usize {
        self.skipped_missing_fields
            + self.skipped_player_count
            + self.skipped_team_split
            + self.skipped_bad_player
            + self.skipped_duplicate
    }
}

#[derive(Debug, Default, Clone)]
pub struct Normalized {
    pub matches: Vec<Match>,
    pub player_matches: Vec<PlayerMatch>,
    pub stats: NormalizeStats,
}

/// Why a raw match produced no rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingField(&'static str),
    PlayerCount(usize),
    TeamSplit { team0: usize, team1: usize },
    BadPlayer { index: usize, field: &'static str },
}

/// Flatten day batches of raw matches into `Match` and `PlayerMatch` rows.
///
/// A match is all-or-nothing: if any check fails no row of it is emitted.
/// `won` is left unset; see [`attach_outcomes`].
pub fn normalize_matches(day_batches: &[Vec<RawMatch>]) -> Normalized {
    let mut out = Normalized::default();
    let mut seen_ids = HashSet::new();

    for (day_idx, day) in day_batches.iter().enumerate() {
        for raw in day {
            out.stats.matches_seen += 1;
            let match_label = raw
                .match_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "unknown".to_string());

            match normalize_one(raw) {
                Ok((m, players)) => {
                    if !seen_ids.insert(m.match_id) {
                        out.stats.skipped_duplicate += 1;
                        continue;
                    }
                    out.stats.matches_kept += 1;
                    out.matches.push(m);
                    out.player_matches.extend(players);
                }
                Err(rejection) => {
                    out.stats.players_dropped += raw.players.as_ref().map_or(0, Vec::len);
                    warn!(
                        day = day_idx,
                        match_id = %match_label,
                        "[NORMALIZE] skipping match: {rejection:?}"
                    );
                    match rejection {
                        Rejection::MissingField(_) => out.stats.skipped_missing_fields += 1,
                        Rejection::PlayerCount(_) => out.stats.skipped_player_count += 1,
                        Rejection::TeamSplit { .. } => out.stats.skipped_team_split += 1,
                        Rejection::BadPlayer { .. } => out.stats.skipped_bad_player += 1,
                    }
                }
            }
        }
    }

    info!(
        seen = out.stats.matches_seen,
        kept = out.stats.matches_kept,
        skipped = out.stats.skipped(),
        "Normalized {} matches into {} player rows",
        out.matches.len(),
        out.player_matches.len(),
    );
    out
}

pub fn normalize_one(raw: &RawMatch) -> Result<(Match, Vec<PlayerMatch>), Rejection> {
    let match_id = raw.match_id.ok_or(Rejection::MissingField("match_id"))?;
    let start_time = raw
        .start_time
        .as_ref()
        .and_then(|t| t.to_unix())
        .ok_or(Rejection::MissingField("start_time"))?;
    let game_mode = raw
        .game_mode
        .as_ref()
        .map(|g| g.as_text())
        .ok_or(Rejection::MissingField("game_mode"))?;
    let match_mode = raw
        .match_mode
        .as_ref()
        .map(|g| g.as_text())
        .ok_or(Rejection::MissingField("match_mode"))?;
    let duration_s = raw.duration_s.ok_or(Rejection::MissingField("duration_s"))?;
    let winning_team = raw
        .winning_team
        .as_ref()
        .and_then(|t| t.team())
        .ok_or(Rejection::MissingField("winning_team"))?;

    let raw_players = raw.players.as_deref().unwrap_or_default();
    if raw_players.len() != PLAYERS_PER_MATCH {
        return Err(Rejection::PlayerCount(raw_players.len()));
    }

    let mut players = Vec::with_capacity(PLAYERS_PER_MATCH);
    let mut accounts = HashSet::new();
    for (index, p) in raw_players.iter().enumerate() {
        let row = normalize_player(match_id, p)
            .map_err(|field| Rejection::BadPlayer { index, field })?;
        if !accounts.insert(row.account_id) {
            return Err(Rejection::BadPlayer { index, field: "account_id" });
        }
        players.push(row);
    }

    let team0 = players.iter().filter(|p| p.team == Team::Team0).count();
    let team1 = players.len() - team0;
    if team0 != PLAYERS_PER_TEAM || team1 != PLAYERS_PER_TEAM {
        return Err(Rejection::TeamSplit { team0, team1 });
    }

    Ok((
        Match {
            match_id,
            start_time,
            game_mode,
            match_mode,
            duration_s,
            winning_team,
        },
        players,
    ))
}

fn normalize_player(match_id: i64, p: &RawPlayer) -> Result<PlayerMatch, &'static str> {
    Ok(PlayerMatch {
        account_id: p.account_id.ok_or("account_id")?,
        match_id,
        hero_id: p.hero_id.ok_or("hero_id")?,
        team: p.team.as_ref().and_then(|t| t.team()).ok_or("team")?,
        kills: p.kills.ok_or("kills")?,
        deaths: p.deaths.ok_or("deaths")?,
        assists: p.assists.ok_or("assists")?,
        denies: p.denies.ok_or("denies")?,
        net_worth: p.net_worth.ok_or("net_worth")?,
        won: None,
    })
}

/// Sets `won` on every player row whose match is present in `matches`.
/// Returns how many rows could not be resolved.
pub fn attach_outcomes(matches: &[Match], player_matches: &mut [PlayerMatch]) -> usize {
    let winners: HashMap<i64, Team> =
        matches.iter().map(|m| (m.match_id, m.winning_team)).collect();
    let mut unresolved = 0usize;
    for p in player_matches.iter_mut() {
        match winners.get(&p.match_id) {
            Some(winner) => p.won = Some(p.team == *winner),
            None => {
                p.won = None;
                unresolved += 1;
            }
        }
    }
    unresolved
}
