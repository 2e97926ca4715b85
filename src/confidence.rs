use crate::models::Regularity;

pub const MIN_CONFIDENCE: f64 = 0.40;
pub const MAX_CONFIDENCE: f64 = 0.95;

/// Sample count at which the data boost saturates.
const FULL_HISTORY_SAMPLES: f64 = 12.0;
const DATA_BOOST: f64 = 0.08;
const ATYPICAL_LENGTH_PENALTY: f64 = 0.05;
const TYPICAL_CYCLE_DAYS: std::ops::RangeInclusive<f64> = 26.0..=32.0;

const COLD_START_BASE: f64 = 0.40;
const COLD_START_PER_RECORD: f64 = 0.10;

/// Per-cycle decay applied to projected cycles after the first.
pub const PROJECTION_DECAY: f64 = 0.95;

fn base_confidence(regularity: Regularity) -> f64 {
    match regularity {
        Regularity::VeryRegular => 0.92,
        Regularity::Regular => 0.82,
        Regularity::SomewhatIrregular => 0.67,
        Regularity::Irregular => 0.50,
    }
}

/// Confidence before clamping. Exposed for diagnostics and tests.
pub fn raw_score(std_deviation: f64, sample_count: usize, weighted_cycle_length: f64) -> f64 {
    let base = base_confidence(Regularity::from_std_deviation(std_deviation));
    let boost = (sample_count as f64 / FULL_HISTORY_SAMPLES).min(1.0) * DATA_BOOST;
    let adjustment = if TYPICAL_CYCLE_DAYS.contains(&weighted_cycle_length) {
        0.0
    } else {
        -ATYPICAL_LENGTH_PENALTY
    };
    base + boost + adjustment
}

/// Statistical-path confidence, always within `[MIN_CONFIDENCE, MAX_CONFIDENCE]`.
pub fn score(std_deviation: f64, sample_count: usize, weighted_cycle_length: f64) -> f64 {
    raw_score(std_deviation, sample_count, weighted_cycle_length).clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// Confidence for the default forecast. Not clamped: callers only reach it
/// with fewer records than the statistical threshold.
pub fn cold_start(record_count: usize) -> f64 {
    COLD_START_BASE + COLD_START_PER_RECORD * record_count as f64
}

/// Confidence of projected cycle `cycle` (1-based) given the first cycle's.
pub fn decayed(first: f64, cycle: u32) -> f64 {
    let steps = cycle.saturating_sub(1) as i32;
    (first * PROJECTION_DECAY.powi(steps)).max(MIN_CONFIDENCE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn very_regular_history_clamped_to_ceiling() {
        let raw = raw_score(0.976, 8, 27.667);
        assert!((raw - 0.9733).abs() < 0.001);
        assert_eq!(score(0.976, 8, 27.667), MAX_CONFIDENCE);
    }

    #[test]
    fn atypical_length_penalised() {
        // regular, 10 samples, weighted mean 24.49
        let raw = raw_score(3.86, 10, 24.49);
        assert!((raw - (0.82 + 10.0 / 12.0 * 0.08 - 0.05)).abs() < 1e-9);
    }

    #[test]
    fn boost_saturates_at_twelve_samples() {
        assert_eq!(raw_score(8.0, 12, 28.0), raw_score(8.0, 40, 28.0));
        assert!((raw_score(8.0, 12, 28.0) - 0.58).abs() < 1e-9);
    }

    #[test]
    fn typical_range_is_inclusive() {
        assert_eq!(raw_score(3.0, 6, 26.0), raw_score(3.0, 6, 32.0));
        assert!(raw_score(3.0, 6, 32.01) < raw_score(3.0, 6, 32.0));
    }

    #[test]
    fn cold_start_grows_per_record() {
        assert!((cold_start(0) - 0.40).abs() < 1e-9);
        assert!((cold_start(2) - 0.60).abs() < 1e-9);
        // The formula itself has no ceiling; six records would reach 1.00.
        assert!((cold_start(6) - 1.00).abs() < 1e-9);
    }

    #[test]
    fn projection_decay_and_floor() {
        assert_eq!(decayed(0.95, 1), 0.95);
        assert!((decayed(0.95, 2) - 0.95 * 0.95).abs() < 1e-12);
        assert!((decayed(0.95, 3) - 0.95 * 0.9025).abs() < 1e-12);
        assert_eq!(decayed(0.42, 6), MIN_CONFIDENCE);
    }

    proptest! {
        #[test]
        fn statistical_score_always_bounded(
            sd in 0.0f64..20.0,
            n in 0usize..50,
            len in 15.0f64..50.0
        ) {
            let c = score(sd, n, len);
            prop_assert!((MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&c));
        }
    }
}
