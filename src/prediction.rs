use chrono::{Duration, NaiveDate};
use tracing::{debug, warn};

use crate::config::ForecastPolicy;
use crate::confidence;
use crate::error::ForecastError;
use crate::flow;
use crate::history;
use crate::models::{
    CycleProjection, CycleRecord, CycleStats, FertileWindow, FlowCategory, MultiCycleForecast, PredictionResult,
};
use crate::stats;

/// Forecast the next cycle from a history snapshot.
///
/// Below `policy.min_records` completed records the default cycle and period
/// lengths are used with the cold-start confidence. `today` anchors the
/// forecast only when there are no completed records at all.
pub fn forecast(
    records: &[CycleRecord],
    today: NaiveDate,
    policy: &ForecastPolicy,
) -> Result<PredictionResult, ForecastError> {
    let history = history::completed_newest_first(records, policy);
    let samples = history::interval_samples(&history, policy);
    let predicted_flow = flow::predict(&history, policy);
    let anchor = history.first().map(|r| r.start_date).unwrap_or(today);

    let dropped = history::dropped_interval_count(history.len(), samples.len());
    if dropped > 0 {
        warn!(dropped, kept = samples.len(), "dropped implausible cycle intervals");
    }

    if history.len() < policy.min_records {
        debug!(records = history.len(), "not enough history, using default forecast");
        let stats = stats::fallback(samples.len(), policy);
        return assemble(anchor, stats, confidence::cold_start(history.len()), predicted_flow, policy);
    }

    match stats::compute(&samples, &history, policy) {
        Some(stats) => {
            let confidence = confidence::score(stats.std_deviation, stats.sample_count, stats.weighted_cycle_length);
            assemble(anchor, stats, confidence, predicted_flow, policy)
        }
        None => {
            debug!(records = history.len(), "no plausible intervals, using default forecast");
            let stats = stats::fallback(0, policy);
            assemble(anchor, stats, confidence::MIN_CONFIDENCE, predicted_flow, policy)
        }
    }
}

/// Project `cycles` cycles forward from a single-cycle forecast. The count is
/// clamped to `[1, policy.max_projected_cycles]`.
pub fn project(
    base: &PredictionResult,
    cycles: u32,
    policy: &ForecastPolicy,
) -> Result<MultiCycleForecast, ForecastError> {
    let cycles = policy.clamp_cycles(cycles);
    let step = base.stats.weighted_cycle_length.round() as i64;

    let mut projections = Vec::with_capacity(cycles as usize);
    let mut predicted_start = base.predicted_start;
    for cycle in 1..=cycles {
        if cycle > 1 {
            predicted_start = shift(predicted_start, step)?;
        }
        projections.push(CycleProjection {
            cycle,
            predicted_start,
            predicted_end: period_end(predicted_start, base.stats.avg_period_length)?,
            fertile_window: fertile_window(predicted_start, policy)?,
            confidence: confidence::decayed(base.confidence, cycle),
            predicted_flow: base.predicted_flow,
        });
    }

    Ok(MultiCycleForecast {
        cycles: projections,
        stats: base.stats.clone(),
    })
}

/// Ovulation is estimated a luteal phase before the predicted start; the
/// fertile window spans the days around it.
pub fn fertile_window(predicted_start: NaiveDate, policy: &ForecastPolicy) -> Result<FertileWindow, ForecastError> {
    let ovulation_day = shift(predicted_start, -policy.luteal_phase_days)?;
    Ok(FertileWindow {
        start: shift(ovulation_day, -policy.fertile_days_before_ovulation)?,
        end: shift(ovulation_day, policy.fertile_days_after_ovulation)?,
        ovulation_day,
    })
}

pub fn period_end(predicted_start: NaiveDate, avg_period_length: f64) -> Result<NaiveDate, ForecastError> {
    shift(predicted_start, (avg_period_length.round() as i64 - 1).max(0))
}

fn shift(date: NaiveDate, days: i64) -> Result<NaiveDate, ForecastError> {
    Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .ok_or(ForecastError::DateOutOfRange { date, days })
}

fn assemble(
    anchor: NaiveDate,
    stats: CycleStats,
    confidence: f64,
    predicted_flow: Option<FlowCategory>,
    policy: &ForecastPolicy,
) -> Result<PredictionResult, ForecastError> {
    let predicted_start = shift(anchor, stats.weighted_cycle_length.round() as i64)?;
    Ok(PredictionResult {
        predicted_start,
        predicted_end: period_end(predicted_start, stats.avg_period_length)?,
        fertile_window: fertile_window(predicted_start, policy)?,
        confidence,
        predicted_flow,
        stats,
    })
}
