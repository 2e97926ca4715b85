use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Flow intensity recorded for a period. `None` on a record means nothing was logged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum FlowCategory {
    Light,
    Moderate,
    Heavy,
}

impl FlowCategory {
    pub const ALL: [FlowCategory; 3] = [FlowCategory::Light, FlowCategory::Moderate, FlowCategory::Heavy];

    pub fn as_str(&self) -> &'static str {
        match self {
            FlowCategory::Light => "light",
            FlowCategory::Moderate => "moderate",
            FlowCategory::Heavy => "heavy",
        }
    }
}

/// One tracked period. Owned by the history store; the engine only reads snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleRecord {
    /// Exports without ids get a fresh one on load.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub flow: Option<FlowCategory>,
}

impl CycleRecord {
    pub fn new(start_date: NaiveDate, end_date: Option<NaiveDate>, flow: Option<FlowCategory>) -> Self {
        Self {
            id: Uuid::new_v4(),
            start_date,
            end_date,
            flow,
        }
    }

    /// Inclusive length in days, if the record is closed.
    pub fn duration_days(&self) -> Option<i64> {
        self.end_date
            .map(|end| (end - self.start_date).num_days() + 1)
    }
}

/// A single day of logged flow, the raw input the history store groups into records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayLog {
    pub date: NaiveDate,
    pub flow: FlowCategory,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Regularity {
    VeryRegular,
    Regular,
    SomewhatIrregular,
    Irregular,
}

impl Regularity {
    /// Classify cycle variability from the population standard deviation.
    pub fn from_std_deviation(std_dev: f64) -> Self {
        if std_dev < 2.0 {
            Regularity::VeryRegular
        } else if std_dev < 4.0 {
            Regularity::Regular
        } else if std_dev < 7.0 {
            Regularity::SomewhatIrregular
        } else {
            Regularity::Irregular
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Regularity::VeryRegular => "very_regular",
            Regularity::Regular => "regular",
            Regularity::SomewhatIrregular => "somewhat_irregular",
            Regularity::Irregular => "irregular",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleStats {
    pub mean_cycle_length: f64,
    pub weighted_cycle_length: f64,
    pub std_deviation: f64,
    pub regularity: Regularity,
    pub avg_period_length: f64,
    /// Number of interval samples that passed the plausibility filter.
    pub sample_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FertileWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub ovulation_day: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionResult {
    pub predicted_start: NaiveDate,
    pub predicted_end: NaiveDate,
    pub fertile_window: FertileWindow,
    pub confidence: f64,
    pub predicted_flow: Option<FlowCategory>,
    pub stats: CycleStats,
}

/// One projected cycle in a multi-cycle forecast. `cycle` is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CycleProjection {
    pub cycle: u32,
    pub predicted_start: NaiveDate,
    pub predicted_end: NaiveDate,
    pub fertile_window: FertileWindow,
    pub confidence: f64,
    pub predicted_flow: Option<FlowCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MultiCycleForecast {
    pub cycles: Vec<CycleProjection>,
    pub stats: CycleStats,
}
