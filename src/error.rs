use crate::crypto::CryptoError;

/// Failure reading the external cycle history.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("history source unreachable: {0}")]
    Unreachable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed history: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Failures a forecast read can surface to its caller.
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] HistoryError),
    /// A forecast date would fall outside the representable calendar.
    #[error("date out of range: {date} shifted by {days} days")]
    DateOutOfRange { date: chrono::NaiveDate, days: i64 },
}

/// Cache backing store failures. These stay inside the cache layer.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("data directory not found")]
    NoDataDir,
}
