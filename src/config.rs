use crate::analyzer::BinSpec;
use crate::model::{AnalysisError, ChangeKind, DateRange, MarketIndex};
use chrono::NaiveDate;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(#[from] AnalysisError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub indices: Vec<MarketIndex>,
    pub change_kinds: Vec<ChangeKind>,
    pub start_date: NaiveDate,
    /// Defaults to the day the batch runs.
    pub end_date: Option<NaiveDate>,
    pub bin_width_in_stdev: f64,
    pub bin_count: usize,
    pub fetch_timeout_seconds: u64,
    pub cache_max_entries: Option<usize>,
    pub price_source_url: Option<String>,
    pub database_path: PathBuf,
    /// Re-run the batch on this interval instead of exiting after one pass.
    pub refresh_interval_seconds: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            indices: MarketIndex::ALL.to_vec(),
            change_kinds: vec![ChangeKind::Intraday, ChangeKind::DayOverDay],
            start_date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default(),
            end_date: None,
            bin_width_in_stdev: 1.0,
            bin_count: 6,
            fetch_timeout_seconds: 30,
            cache_max_entries: None,
            price_source_url: None,
            database_path: PathBuf::from("output/reports.db"),
            refresh_interval_seconds: None,
        }
    }
}

impl AppConfig {
    pub fn bin_spec(&self) -> BinSpec {
        BinSpec {
            width_in_stdev: self.bin_width_in_stdev,
            bin_count: self.bin_count,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_seconds)
    }

    /// Date range to analyze when the batch runs on `today`.
    pub fn date_range(&self, today: NaiveDate) -> Result<DateRange, AnalysisError> {
        DateRange::new(self.start_date, self.end_date.unwrap_or(today))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.bin_spec().validate()?;
        if let Some(end) = self.end_date {
            DateRange::new(self.start_date, end)?;
        }
        Ok(())
    }
}

pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_json::from_str(content)?;
    config.validate()?;
    Ok(config)
}
