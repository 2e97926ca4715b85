use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::config::ForecastPolicy;
use crate::error::HistoryError;
use crate::models::{CycleRecord, DayLog};

/// Read side of the external cycle history.
pub trait HistorySource: Send + Sync {
    /// Most recent completed records for `user`, newest first, at most `limit`.
    fn recent_cycles(&self, user: Uuid, limit: usize) -> Result<Vec<CycleRecord>, HistoryError>;
}

/// Write side. Every successful write must be followed by a cache invalidation
/// for the same user before the next forecast read.
pub trait HistoryStore: HistorySource {
    fn append_record(&self, user: Uuid, record: CycleRecord) -> Result<(), HistoryError>;

    /// Upsert one day of flow and rebuild the user's derived records.
    fn log_day(&self, user: Uuid, log: DayLog, today: NaiveDate) -> Result<(), HistoryError>;
}

/// Completed records only, newest first, capped to `policy.max_records`.
pub fn completed_newest_first(records: &[CycleRecord], policy: &ForecastPolicy) -> Vec<CycleRecord> {
    let mut completed: Vec<CycleRecord> = records
        .iter()
        .filter(|r| r.end_date.is_some())
        .cloned()
        .collect();
    completed.sort_by(|a, b| b.start_date.cmp(&a.start_date));
    completed.truncate(policy.max_records);
    completed
}

/// Day gaps between consecutive record starts, newest first.
///
/// Implausible gaps are dropped, never clamped, so the result may be shorter
/// than `records.len() - 1`. Fewer than two records yield no samples.
pub fn interval_samples(records: &[CycleRecord], policy: &ForecastPolicy) -> Vec<f64> {
    let considered = &records[..records.len().min(policy.max_records)];
    considered
        .windows(2)
        .map(|w| (w[0].start_date - w[1].start_date).num_days())
        .filter(|days| (policy.min_interval_days..=policy.max_interval_days).contains(days))
        .map(|days| days as f64)
        .collect()
}

/// Gaps between `records` consecutive starts that did not survive the filter
/// in [`interval_samples`].
pub fn dropped_interval_count(records: usize, samples: usize) -> usize {
    records.saturating_sub(1).saturating_sub(samples)
}

#[derive(Debug, Default)]
struct UserHistory {
    imported: Vec<CycleRecord>,
    day_logs: Vec<DayLog>,
    derived: Vec<CycleRecord>,
}

/// In-process history store. Records come either from direct imports or from
/// daily flow logs grouped into periods.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    users: Mutex<HashMap<Uuid, UserHistory>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records for `user` regardless of state, newest first.
    pub fn records(&self, user: Uuid) -> Result<Vec<CycleRecord>, HistoryError> {
        let users = self
            .users
            .lock()
            .map_err(|e| HistoryError::Unreachable(e.to_string()))?;
        let mut all: Vec<CycleRecord> = users
            .get(&user)
            .map(|h| h.imported.iter().chain(h.derived.iter()).cloned().collect())
            .unwrap_or_default();
        all.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(all)
    }
}

impl HistorySource for MemoryHistory {
    fn recent_cycles(&self, user: Uuid, limit: usize) -> Result<Vec<CycleRecord>, HistoryError> {
        let mut completed: Vec<CycleRecord> = self
            .records(user)?
            .into_iter()
            .filter(|r| r.end_date.is_some())
            .collect();
        completed.truncate(limit);
        Ok(completed)
    }
}

impl HistoryStore for MemoryHistory {
    fn append_record(&self, user: Uuid, record: CycleRecord) -> Result<(), HistoryError> {
        let mut users = self
            .users
            .lock()
            .map_err(|e| HistoryError::Unreachable(e.to_string()))?;
        users.entry(user).or_default().imported.push(record);
        Ok(())
    }

    fn log_day(&self, user: Uuid, log: DayLog, today: NaiveDate) -> Result<(), HistoryError> {
        let mut users = self
            .users
            .lock()
            .map_err(|e| HistoryError::Unreachable(e.to_string()))?;
        let history = users.entry(user).or_default();

        if let Some(existing) = history.day_logs.iter_mut().find(|l| l.date == log.date) {
            existing.flow = log.flow;
        } else {
            history.day_logs.push(log);
        }

        history.derived = rebuild_records(&history.day_logs, today);
        Ok(())
    }
}

/// Single-user history exported as a JSON array of records. The file is
/// re-read on every call; the `user` argument is ignored. A cache that
/// outlives the process must be checked against [`JsonFileHistory::modified_at`].
#[derive(Debug, Clone)]
pub struct JsonFileHistory {
    path: PathBuf,
}

impl JsonFileHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Last modification time of the history file.
    pub fn modified_at(&self) -> Result<DateTime<Utc>, HistoryError> {
        let modified = fs::metadata(&self.path)?.modified()?;
        Ok(DateTime::<Utc>::from(modified))
    }
}

impl HistorySource for JsonFileHistory {
    fn recent_cycles(&self, _user: Uuid, limit: usize) -> Result<Vec<CycleRecord>, HistoryError> {
        let raw = fs::read(&self.path)?;
        let mut records: Vec<CycleRecord> = serde_json::from_slice(&raw)?;
        records.retain(|r| r.end_date.is_some());
        records.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        records.truncate(limit);
        Ok(records)
    }
}

/// Group flow days into records. Days at most two apart belong to one period;
/// a period still within two days of `today` is left open. A record's flow is
/// the heaviest day logged in it.
pub fn rebuild_records(day_logs: &[DayLog], today: NaiveDate) -> Vec<CycleRecord> {
    let mut days: Vec<&DayLog> = day_logs.iter().collect();
    days.sort_by_key(|l| l.date);

    let Some(first) = days.first() else {
        return Vec::new();
    };

    let mut records = Vec::new();
    let mut start = first.date;
    let mut end = first.date;
    let mut heaviest = first.flow;

    for log in &days[1..] {
        if (log.date - end).num_days() <= 2 {
            end = log.date;
            heaviest = heaviest.max(log.flow);
        } else {
            records.push(CycleRecord::new(start, Some(end), Some(heaviest)));
            start = log.date;
            end = log.date;
            heaviest = log.flow;
        }
    }

    let last_end = if (today - end).num_days() <= 2 {
        None
    } else {
        Some(end)
    };
    records.push(CycleRecord::new(start, last_end, Some(heaviest)));
    records
}
