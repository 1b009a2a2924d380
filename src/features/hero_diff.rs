use std::collections::HashMap;

use tracing::debug;

use crate::config::SECS_PER_DAY;
use crate::features::streaks::PlayerHistory;
use crate::features::{ratio_or_zero, round_to};
use crate::fetcher::models::HeroTotals;
use crate::types::{HeroTrend, PlayerRollingStat};

// ---------------------------------------------------------------------------
// Population baselines
// ---------------------------------------------------------------------------

/// `(start, end)` of a trend window. The window ends at the start of the
/// current UTC day so a rerun on the same day produces the same keys.
pub fn trend_bounds(window_days: u32, now: i64) -> (i64, i64) {
    let end = now - now.rem_euclid(SECS_PER_DAY);
    (end - i64::from(window_days) * SECS_PER_DAY, end)
}

/// Turn per-hero population totals for one window into trend rows.
/// Zero denominators fall back to 0.
pub fn build_hero_trends(totals: &[HeroTotals], window_days: u32, now: i64) -> Vec<HeroTrend> {
    let (trend_start_date, trend_end_date) = trend_bounds(window_days, now);
    let all_matches: i64 = totals.iter().map(|t| t.matches.max(0)).sum();

    let mut seen = std::collections::HashSet::new();
    totals
        .iter()
        .filter(|t| seen.insert(t.hero_id))
        .map(|t| {
            let matches = t.matches as f64;
            HeroTrend {
                hero_id: t.hero_id,
                trend_start_date,
                trend_end_date,
                trend_date: trend_end_date,
                trend_window_days: i64::from(window_days),
                pick_rate: round_to(ratio_or_zero(matches, all_matches as f64) * 100.0, 2),
                win_rate: round_to(ratio_or_zero(t.wins as f64, matches) * 100.0, 2),
                average_kills: round_to(ratio_or_zero(t.total_kills as f64, matches), 2),
                average_deaths: round_to(ratio_or_zero(t.total_deaths as f64, matches), 2),
                average_assists: round_to(ratio_or_zero(t.total_assists as f64, matches), 2),
                average_kd: round_to(
                    ratio_or_zero(t.total_kills as f64, t.total_deaths as f64),
                    2,
                ),
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineEntry {
    pub kd: f64,
    pub pick_rate: f64,
}

/// Hero trend snapshot for one window, keyed by hero.
#[derive(Debug, Clone, Default)]
pub struct HeroBaseline {
    by_hero: HashMap<i64, (i64, BaselineEntry)>,
}

impl HeroBaseline {
    /// Keeps the most recent trend per hero when several are present.
    pub fn from_trends(trends: &[HeroTrend]) -> Self {
        let mut by_hero: HashMap<i64, (i64, BaselineEntry)> = HashMap::new();
        for t in trends {
            let entry = BaselineEntry {
                kd: t.average_kd,
                pick_rate: t.pick_rate,
            };
            match by_hero.get(&t.hero_id) {
                Some((end, _)) if *end >= t.trend_end_date => {}
                _ => {
                    by_hero.insert(t.hero_id, (t.trend_end_date, entry));
                }
            }
        }
        Self { by_hero }
    }

    pub fn get(&self, hero_id: i64) -> Option<BaselineEntry> {
        self.by_hero.get(&hero_id).map(|(_, e)| *e)
    }

    pub fn len(&self) -> usize {
        self.by_hero.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hero.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Player vs hero
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct HeroUsage {
    matches: i64,
    kills: i64,
    deaths: i64,
}

/// A player's own per-hero record across their whole history.
#[derive(Debug, Clone, Default)]
pub struct PlayerHeroProfile {
    total_matches: i64,
    by_hero: HashMap<i64, HeroUsage>,
}

impl PlayerHeroProfile {
    pub fn from_history(history: &PlayerHistory) -> Self {
        let mut by_hero: HashMap<i64, HeroUsage> = HashMap::new();
        for e in history.entries() {
            let usage = by_hero.entry(e.hero_id).or_default();
            usage.matches += 1;
            usage.kills += e.kills;
            usage.deaths += e.deaths;
        }
        Self {
            total_matches: history.len() as i64,
            by_hero,
        }
    }

    pub fn kd(&self, hero_id: i64) -> f64 {
        self.by_hero
            .get(&hero_id)
            .map(|u| ratio_or_zero(u.kills as f64, u.deaths as f64))
            .unwrap_or(0.0)
    }

    pub fn pick_rate(&self, hero_id: i64) -> f64 {
        let matches = self.by_hero.get(&hero_id).map(|u| u.matches).unwrap_or(0);
        ratio_or_zero(matches as f64, self.total_matches as f64) * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeroDifferential {
    pub kd_pct: Option<f64>,
    pub pick_rate: Option<f64>,
}

/// Player minus population for one hero, scaled by 100. No baseline, no value.
pub fn hero_differential(
    profile: &PlayerHeroProfile,
    baseline: &HeroBaseline,
    hero_id: i64,
) -> HeroDifferential {
    match baseline.get(hero_id) {
        Some(base) => HeroDifferential {
            kd_pct: Some(round_to((profile.kd(hero_id) - base.kd) * 100.0, 2)),
            pick_rate: Some(round_to((profile.pick_rate(hero_id) - base.pick_rate) * 100.0, 2)),
        },
        None => HeroDifferential {
            kd_pct: None,
            pick_rate: None,
        },
    }
}

/// Fill `p_v_h_*` on each rolling row from the hero played in that match.
pub fn apply_hero_differentials(
    history: &PlayerHistory,
    baseline: &HeroBaseline,
    rolling: &mut [PlayerRollingStat],
) {
    let profile = PlayerHeroProfile::from_history(history);
    let hero_by_match: HashMap<i64, i64> = history
        .entries()
        .iter()
        .map(|e| (e.match_id, e.hero_id))
        .collect();

    let mut missing_baseline = 0usize;
    for row in rolling.iter_mut() {
        let Some(&hero_id) = hero_by_match.get(&row.match_id) else {
            continue;
        };
        let diff = hero_differential(&profile, baseline, hero_id);
        if diff.kd_pct.is_none() {
            missing_baseline += 1;
        }
        row.p_v_h_kd_pct = diff.kd_pct;
        row.p_v_h_pick_rate = diff.pick_rate;
    }
    if missing_baseline > 0 {
        debug!(
            account_id = history.account_id(),
            rows = missing_baseline,
            "no hero baseline for some matches"
        );
    }
}
