use crate::config::ForecastPolicy;
use crate::models::{CycleRecord, CycleStats, Regularity};

/// Compute cycle statistics from filtered interval samples (newest first) and
/// the records they came from. Returns `None` when no samples survived the filter.
pub fn compute(samples: &[f64], records: &[CycleRecord], policy: &ForecastPolicy) -> Option<CycleStats> {
    if samples.is_empty() {
        return None;
    }

    let mean_cycle_length = mean(samples);
    let std_deviation = std_deviation(samples);

    Some(CycleStats {
        mean_cycle_length,
        weighted_cycle_length: weighted_mean(samples),
        std_deviation,
        regularity: Regularity::from_std_deviation(std_deviation),
        avg_period_length: average_duration(records, policy),
        sample_count: samples.len(),
    })
}

/// Stats used when there is not enough history for estimation.
pub fn fallback(sample_count: usize, policy: &ForecastPolicy) -> CycleStats {
    CycleStats {
        mean_cycle_length: policy.default_cycle_length,
        weighted_cycle_length: policy.default_cycle_length,
        std_deviation: 0.0,
        regularity: Regularity::Irregular,
        avg_period_length: policy.default_period_length,
        sample_count,
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Recency-tiered mean. Up to 3 samples weigh equally; up to 6 the newest
/// three carry 70%; beyond that the tiers are 50/30/20.
pub fn weighted_mean(samples: &[f64]) -> f64 {
    match samples.len() {
        0..=3 => mean(samples),
        4..=6 => mean(&samples[..3]) * 0.7 + mean(&samples[3..]) * 0.3,
        _ => mean(&samples[..3]) * 0.5 + mean(&samples[3..6]) * 0.3 + mean(&samples[6..]) * 0.2,
    }
}

/// Population standard deviation around the unweighted mean.
pub fn std_deviation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    let variance = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Mean inclusive duration of closed records within the plausible range,
/// or the default period length when none qualify.
pub fn average_duration(records: &[CycleRecord], policy: &ForecastPolicy) -> f64 {
    let durations: Vec<f64> = records
        .iter()
        .filter_map(CycleRecord::duration_days)
        .filter(|d| (policy.min_period_days..=policy.max_period_days).contains(d))
        .map(|d| d as f64)
        .collect();

    if durations.is_empty() {
        policy.default_period_length
    } else {
        mean(&durations)
    }
}
