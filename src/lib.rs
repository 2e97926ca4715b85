//! Next-cycle forecasting from period history, served through a cache-aside
//! prediction store.
//!
//! History flows through [`history`] (plausibility filter) into [`stats`] and
//! [`confidence`]; [`prediction`] assembles the forecast and [`cache`] keeps one
//! result per user until it expires or the user's history changes.

pub mod cache;
pub mod confidence;
pub mod config;
pub mod crypto;
pub mod error;
pub mod flow;
pub mod history;
pub mod models;
pub mod prediction;
pub mod service;
pub mod stats;
pub mod storage;

pub use cache::PredictionCache;
pub use config::{ForecastConfig, ForecastPolicy};
pub use error::{ForecastError, HistoryError};
pub use service::ForecastService;
