pub mod hero_diff;
pub mod normalize;
pub mod streaks;
pub mod team;

pub use hero_diff::{apply_hero_differentials, build_hero_trends, HeroBaseline};
pub use normalize::{attach_outcomes, normalize_matches, Normalized};
pub use streaks::{PlayerFeatures, PlayerHistory};
pub use team::TeamAggregator;

/// Round half away from zero to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// `num / den`, or 0 when the denominator is zero.
pub fn ratio_or_zero(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding_and_zero_guard() {
        assert_eq!(round_to(66.666_666, 2), 66.67);
        assert_eq!(round_to(-0.125_4, 3), -0.125);
        assert_eq!(ratio_or_zero(5.0, 0.0), 0.0);
        assert_eq!(ratio_or_zero(3.0, 2.0), 1.5);
    }
}
