use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::cache::{Cached, PredictionCache};
use crate::config::ForecastPolicy;
use crate::error::{ForecastError, HistoryError};
use crate::history::{HistorySource, HistoryStore};
use crate::models::*;
use crate::prediction;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NextCycleView {
    pub predicted_start: NaiveDate,
    pub predicted_end: NaiveDate,
    pub confidence: f64,
    pub predicted_flow: Option<FlowCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FertileWindowView {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleStatsView {
    pub average_cycle_length: i64,
    pub average_period_length: i64,
    pub regularity: Regularity,
    /// Two decimal places, e.g. `"0.97"`.
    pub standard_deviation: String,
    pub sample_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionResponse {
    pub next_cycle: NextCycleView,
    pub fertile_window: FertileWindowView,
    pub cycle_statistics: CycleStatsView,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectedCycleView {
    pub cycle: u32,
    pub next_cycle: NextCycleView,
    pub fertile_window: FertileWindowView,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultiCycleResponse {
    pub predictions: Vec<ProjectedCycleView>,
    pub cycle_statistics: CycleStatsView,
    pub cached: bool,
}

impl From<&FertileWindow> for FertileWindowView {
    fn from(window: &FertileWindow) -> Self {
        Self {
            start: window.start,
            end: window.end,
        }
    }
}

impl From<&CycleStats> for CycleStatsView {
    fn from(stats: &CycleStats) -> Self {
        Self {
            average_cycle_length: stats.weighted_cycle_length.round() as i64,
            average_period_length: stats.avg_period_length.round() as i64,
            regularity: stats.regularity,
            standard_deviation: format!("{:.2}", stats.std_deviation),
            sample_count: stats.sample_count,
        }
    }
}

impl From<Cached<PredictionResult>> for PredictionResponse {
    fn from(cached: Cached<PredictionResult>) -> Self {
        let result = cached.value;
        Self {
            next_cycle: NextCycleView {
                predicted_start: result.predicted_start,
                predicted_end: result.predicted_end,
                confidence: result.confidence,
                predicted_flow: result.predicted_flow,
            },
            fertile_window: FertileWindowView::from(&result.fertile_window),
            cycle_statistics: CycleStatsView::from(&result.stats),
            cached: cached.from_cache,
        }
    }
}

impl MultiCycleResponse {
    fn new(forecast: MultiCycleForecast, cached: bool) -> Self {
        let predictions = forecast
            .cycles
            .iter()
            .map(|c| ProjectedCycleView {
                cycle: c.cycle,
                next_cycle: NextCycleView {
                    predicted_start: c.predicted_start,
                    predicted_end: c.predicted_end,
                    confidence: c.confidence,
                    predicted_flow: c.predicted_flow,
                },
                fertile_window: FertileWindowView::from(&c.fertile_window),
            })
            .collect();
        Self {
            predictions,
            cycle_statistics: CycleStatsView::from(&forecast.stats),
            cached,
        }
    }
}

/// Forecast reads through the prediction cache, history writes with invalidation.
pub struct ForecastService<H> {
    history: Arc<H>,
    cache: PredictionCache,
    policy: ForecastPolicy,
}

impl<H: HistorySource> ForecastService<H> {
    pub fn new(history: Arc<H>, cache: PredictionCache, policy: ForecastPolicy) -> Self {
        Self { history, cache, policy }
    }

    /// A forecast over an empty history is anchored on `today` and is not cached.
    fn cached_forecast(&self, user: Uuid, today: NaiveDate) -> Result<Cached<PredictionResult>, ForecastError> {
        self.cache.get_or_compute_with(user, || {
            let records = self.history.recent_cycles(user, self.policy.max_records)?;
            let result = prediction::forecast(&records, today, &self.policy)?;
            let cacheable = records.iter().any(|r| r.end_date.is_some());
            info!(
                %user,
                samples = result.stats.sample_count,
                confidence = result.confidence,
                cacheable,
                "computed forecast"
            );
            Ok((result, cacheable))
        })
    }

    /// Next-cycle forecast. Fails when the history source is unreachable or a
    /// forecast date falls off the calendar.
    pub fn next_cycle(&self, user: Uuid, today: NaiveDate) -> Result<PredictionResponse, ForecastError> {
        self.cached_forecast(user, today).map(PredictionResponse::from)
    }

    /// `count` cycles ahead, clamped to `[1, policy.max_projected_cycles]`.
    /// The projection is derived from the cached next-cycle forecast.
    pub fn upcoming_cycles(
        &self,
        user: Uuid,
        count: u32,
        today: NaiveDate,
    ) -> Result<MultiCycleResponse, ForecastError> {
        let base = self.cached_forecast(user, today)?;
        let forecast = prediction::project(&base.value, count, &self.policy)?;
        Ok(MultiCycleResponse::new(forecast, base.from_cache))
    }

    /// Call after any write to `user`'s history made outside this service.
    pub fn history_changed(&self, user: Uuid) {
        self.cache.invalidate(user);
    }

    /// Drop `user`'s cached forecast if the history was modified at or after
    /// the time it was cached. For sources without a write path through this
    /// service, such as a file shared with a persistent cache.
    pub fn history_changed_at(&self, user: Uuid, changed_at: DateTime<Utc>) {
        if self.cache.invalidate_if_older(user, changed_at) {
            info!(%user, %changed_at, "history modified since last forecast");
        }
    }
}

impl<H: HistoryStore> ForecastService<H> {
    pub fn record_cycle(&self, user: Uuid, record: CycleRecord) -> Result<(), HistoryError> {
        self.history.append_record(user, record)?;
        self.cache.invalidate(user);
        info!(%user, "recorded cycle");
        Ok(())
    }

    pub fn log_day(&self, user: Uuid, log: DayLog, today: NaiveDate) -> Result<(), HistoryError> {
        self.history.log_day(user, log, today)?;
        self.cache.invalidate(user);
        Ok(())
    }
}
