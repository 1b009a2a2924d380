use crate::config::{ROLLING_WINDOWS, STREAK_BUCKETS};
use crate::features::{ratio_or_zero, round_to};
use crate::types::{HistoryEntry, PlayerHistoryRow, PlayerRollingStat, PlayerTrend};

// ---------------------------------------------------------------------------
// Ordered history
// ---------------------------------------------------------------------------

/// One account's matches, oldest first.
///
/// The provider gives no ordering guarantee, so construction is the only way
/// in and it always sorts by `(start_time, match_id)`. Entries for other
/// accounts and repeated match ids are dropped.
#[derive(Debug, Clone)]
pub struct PlayerHistory {
    account_id: i64,
    entries: Vec<HistoryEntry>,
}

impl PlayerHistory {
    pub fn new(account_id: i64, mut entries: Vec<HistoryEntry>) -> Self {
        entries.retain(|e| e.account_id == account_id);
        entries.sort_by_key(|e| (e.start_time, e.match_id));
        let mut seen = std::collections::HashSet::new();
        entries.retain(|e| seen.insert(e.match_id));
        Self { account_id, entries }
    }

    pub fn account_id(&self) -> i64 {
        self.account_id
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn outcomes(&self) -> Vec<bool> {
        self.entries.iter().map(|e| e.won).collect()
    }
}

// ---------------------------------------------------------------------------
// Streaks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Streak {
    pub won: bool,
    pub len: usize,
}

/// Maximal runs of equal outcomes. A new run starts at every change point.
pub fn streaks(outcomes: &[bool]) -> Vec<Streak> {
    let mut runs: Vec<Streak> = Vec::new();
    for &won in outcomes {
        match runs.last_mut() {
            Some(run) if run.won == won => run.len += 1,
            _ => runs.push(Streak { won, len: 1 }),
        }
    }
    runs
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreakSummary {
    /// `(min_len, count)` per bucket; a count is 0, never absent.
    pub win_buckets: Vec<(usize, i64)>,
    pub loss_buckets: Vec<(usize, i64)>,
    /// Mean run length, `None` when the history has no run of that type.
    pub win_avg: Option<f64>,
    pub loss_avg: Option<f64>,
}

pub fn summarize_streaks(outcomes: &[bool], buckets: &[usize]) -> StreakSummary {
    let runs = streaks(outcomes);

    let bucket_counts = |won: bool| -> Vec<(usize, i64)> {
        buckets
            .iter()
            .map(|&min_len| {
                let n = runs.iter().filter(|r| r.won == won && r.len >= min_len).count();
                (min_len, n as i64)
            })
            .collect()
    };

    let mean_len = |won: bool| -> Option<f64> {
        let (total, n) = runs
            .iter()
            .filter(|r| r.won == won)
            .fold((0usize, 0usize), |(total, n), r| (total + r.len, n + 1));
        (n > 0).then(|| round_to(total as f64 / n as f64, 2))
    };

    StreakSummary {
        win_buckets: bucket_counts(true),
        loss_buckets: bucket_counts(false),
        win_avg: mean_len(true),
        loss_avg: mean_len(false),
    }
}

// ---------------------------------------------------------------------------
// Rolling windows
// ---------------------------------------------------------------------------

/// Win percentage over the `window` matches strictly before each position.
/// Position `i` is `None` while `i < window`.
pub fn rolling_win_pct(outcomes: &[bool], window: usize) -> Vec<Option<f64>> {
    let mut prefix_wins = Vec::with_capacity(outcomes.len() + 1);
    prefix_wins.push(0usize);
    for &won in outcomes {
        let last = prefix_wins.last().copied().unwrap_or(0);
        prefix_wins.push(last + usize::from(won));
    }

    (0..outcomes.len())
        .map(|i| {
            if window == 0 || i < window {
                return None;
            }
            let wins = prefix_wins[i] - prefix_wins[i - window];
            Some(round_to(wins as f64 / window as f64 * 100.0, 2))
        })
        .collect()
}

pub fn loss_pct(win_pct: Option<f64>) -> Option<f64> {
    win_pct.map(|w| round_to(100.0 - w, 2))
}

/// Outcomes of the `length` matches before each position, newest first
/// (`W`/`L`). Position `i` is `None` while `i < length`.
pub fn prior_streak_tokens(outcomes: &[bool], length: usize) -> Vec<Option<String>> {
    (0..outcomes.len())
        .map(|i| {
            if length == 0 || i < length {
                return None;
            }
            Some(
                outcomes[i - length..i]
                    .iter()
                    .rev()
                    .map(|&won| if won { 'W' } else { 'L' })
                    .collect(),
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Per-player outputs
// ---------------------------------------------------------------------------

/// Everything derived from one player's history in a single pass.
#[derive(Debug, Clone, Default)]
pub struct PlayerFeatures {
    pub trend: Option<PlayerTrend>,
    pub rolling: Vec<PlayerRollingStat>,
    pub history: Vec<PlayerHistoryRow>,
}

impl PlayerFeatures {
    /// Hero differential columns are left `None`; see
    /// [`apply_hero_differentials`](crate::features::apply_hero_differentials).
    pub fn compute(history: &PlayerHistory, streak_length: usize) -> Self {
        if history.is_empty() {
            return Self::default();
        }
        let outcomes = history.outcomes();
        let tokens = prior_streak_tokens(&outcomes, streak_length);
        let windows: Vec<(usize, Vec<Option<f64>>)> = ROLLING_WINDOWS
            .iter()
            .map(|&w| (w, rolling_win_pct(&outcomes, w)))
            .collect();

        let mut rolling = Vec::with_capacity(history.len());
        let mut rows = Vec::with_capacity(history.len());
        for (i, entry) in history.entries().iter().enumerate() {
            let win_pct: Vec<(usize, Option<f64>)> =
                windows.iter().map(|(w, values)| (*w, values[i])).collect();
            let losses = win_pct.iter().map(|&(w, v)| (w, loss_pct(v))).collect();
            rolling.push(PlayerRollingStat {
                account_id: history.account_id(),
                match_id: entry.match_id,
                start_time: entry.start_time,
                win_pct,
                loss_pct: losses,
                prior_win_loss_streak: tokens[i].clone(),
                p_v_h_kd_pct: None,
                p_v_h_pick_rate: None,
            });
            rows.push(PlayerHistoryRow {
                entry: entry.clone(),
                prior_win_loss_streak: tokens[i].clone(),
            });
        }

        Self {
            trend: player_trend(history),
            rolling,
            history: rows,
        }
    }
}

/// Lifetime aggregates for one account; `None` for an empty history.
pub fn player_trend(history: &PlayerHistory) -> Option<PlayerTrend> {
    if history.is_empty() {
        return None;
    }
    let entries = history.entries();
    let matches = entries.len() as f64;
    let kills: i64 = entries.iter().map(|e| e.kills).sum();
    let deaths: i64 = entries.iter().map(|e| e.deaths).sum();
    let wins = entries.iter().filter(|e| e.won).count() as f64;
    let summary = summarize_streaks(&history.outcomes(), &STREAK_BUCKETS);

    Some(PlayerTrend {
        account_id: history.account_id(),
        p_total_kills: kills,
        p_total_deaths: deaths,
        p_average_kills: round_to(kills as f64 / matches, 2),
        p_average_deaths: round_to(deaths as f64 / matches, 2),
        p_avg_kd: round_to(ratio_or_zero(kills as f64, deaths as f64), 2),
        p_win_rate: round_to(wins / matches * 100.0, 2),
        p_total_matches: entries.len() as i64,
        win_streaks: summary.win_buckets,
        loss_streaks: summary.loss_buckets,
        p_win_streak_avg: summary.win_avg,
        p_loss_streak_avg: summary.loss_avg,
    })
}
