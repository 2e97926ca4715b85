use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Plausibility bounds and fallbacks used by every forecast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForecastPolicy {
    /// Records required before statistics replace the default forecast.
    pub min_records: usize,
    /// Most recent records considered per forecast.
    pub max_records: usize,
    pub min_interval_days: i64,
    pub max_interval_days: i64,
    pub min_period_days: i64,
    pub max_period_days: i64,
    pub default_cycle_length: f64,
    pub default_period_length: f64,
    /// Records with a flow category looked at by the flow predictor.
    pub flow_window: usize,
    pub flow_recency_count: usize,
    pub flow_recency_bonus: f64,
    pub max_projected_cycles: u32,
    /// Days between ovulation and the next period start.
    pub luteal_phase_days: i64,
    pub fertile_days_before_ovulation: i64,
    pub fertile_days_after_ovulation: i64,
}

impl Default for ForecastPolicy {
    fn default() -> Self {
        Self {
            min_records: 3,
            max_records: 12,
            min_interval_days: 21,
            max_interval_days: 45,
            min_period_days: 2,
            max_period_days: 10,
            default_cycle_length: 28.0,
            default_period_length: 5.0,
            flow_window: 6,
            flow_recency_count: 3,
            flow_recency_bonus: 0.5,
            max_projected_cycles: 6,
            luteal_phase_days: 14,
            fertile_days_before_ovulation: 5,
            fertile_days_after_ovulation: 1,
        }
    }
}

impl ForecastPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_interval_days <= 0 || self.min_interval_days > self.max_interval_days {
            return Err(ConfigError::Invalid("interval bounds are inverted or non-positive".into()));
        }
        if self.min_period_days <= 0 || self.min_period_days > self.max_period_days {
            return Err(ConfigError::Invalid("period bounds are inverted or non-positive".into()));
        }
        if self.max_records < 2 || self.min_records > self.max_records {
            return Err(ConfigError::Invalid(format!(
                "min_records ({}) must not exceed max_records ({})",
                self.min_records, self.max_records
            )));
        }
        if self.flow_window == 0 || self.max_projected_cycles == 0 {
            return Err(ConfigError::Invalid("flow_window and max_projected_cycles must be positive".into()));
        }
        if self.default_cycle_length <= 0.0 || self.default_period_length <= 0.0 {
            return Err(ConfigError::Invalid("default lengths must be positive".into()));
        }
        Ok(())
    }

    /// Clamp a requested projection length to `[1, max_projected_cycles]`.
    pub fn clamp_cycles(&self, requested: u32) -> u32 {
        requested.clamp(1, self.max_projected_cycles)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    None,
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    /// Upper bound on entries held by the in-memory backend.
    pub capacity: u64,
    /// Directory for the file backend. Defaults to the local data dir.
    pub directory: Option<PathBuf>,
    pub kdf_memory_kib: u32,
    pub kdf_iterations: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            capacity: 10_000,
            directory: None,
            kdf_memory_kib: 65536,
            kdf_iterations: 3,
        }
    }
}

impl CacheSettings {
    pub fn resolved_directory(&self) -> Result<PathBuf, ConfigError> {
        match &self.directory {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_local_dir()
                .map(|d| d.join("cykel").join("predictions"))
                .ok_or(ConfigError::NoDataDir),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ForecastConfig {
    pub policy: ForecastPolicy,
    pub cache: CacheSettings,
    pub log: LogSettings,
}

impl ForecastConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: ForecastConfig = toml::from_str(raw)?;
        config.policy.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}
