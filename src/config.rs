//! Engine configuration
//!
//! Every key is read from `CONFLUENCE_*` environment variables; anything
//! unset falls back to its default.

use chrono::FixedOffset;
use ::config::{Config as ConfigLoader, Environment};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::store::RetryPolicy;
use crate::types::Timeframe;

pub const ENV_PREFIX: &str = "CONFLUENCE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_watchlist")]
    pub watchlist: Vec<String>,
    #[serde(default = "default_timeframes")]
    pub timeframes: Vec<Timeframe>,
    #[serde(default = "default_entry_timeframe")]
    pub entry_timeframe: Timeframe,

    #[serde(default = "default_min_confluences")]
    pub min_confluences: usize,
    #[serde(default = "default_min_elite_confidence")]
    pub min_elite_confidence: f64,
    #[serde(default = "default_min_rr")]
    pub min_rr: f64,
    #[serde(default = "default_sentiment_conflict_threshold")]
    pub sentiment_conflict_threshold: f64,

    #[serde(default = "default_daily_quota")]
    pub daily_quota: u32,
    #[serde(default = "default_global_cooldown_secs")]
    pub global_cooldown_secs: u64,
    #[serde(default = "default_symbol_cooldown_secs")]
    pub symbol_cooldown_secs: u64,
    /// Minutes east of UTC where the quota day starts at local midnight
    #[serde(default)]
    pub quota_utc_offset_minutes: i32,

    #[serde(default = "default_stabilization_secs")]
    pub stabilization_secs: u64,
    #[serde(default = "default_cycle_period_secs")]
    pub cycle_period_secs: u64,
    #[serde(default = "default_max_concurrent_symbols")]
    pub max_concurrent_symbols: usize,
    #[serde(default = "default_min_series_len")]
    pub min_series_len: usize,
    #[serde(default = "default_series_limit")]
    pub series_limit: usize,
    #[serde(default = "default_max_hold_secs")]
    pub max_hold_secs: u64,

    #[serde(default = "default_notification_queue_capacity")]
    pub notification_queue_capacity: usize,
    #[serde(default = "default_persist_attempts")]
    pub persist_attempts: u32,
    #[serde(default = "default_persist_backoff_ms")]
    pub persist_backoff_ms: u64,

    #[serde(default = "default_data_retrieval_url")]
    pub data_retrieval_url: String,
    #[serde(default)]
    pub fundamentals_url: Option<String>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_watchlist() -> Vec<String> {
    vec!["BTC".to_string(), "ETH".to_string(), "SOL".to_string()]
}
fn default_timeframes() -> Vec<Timeframe> {
    Timeframe::ALL.to_vec()
}
fn default_entry_timeframe() -> Timeframe {
    Timeframe::Hour1
}
fn default_min_confluences() -> usize {
    3
}
fn default_min_elite_confidence() -> f64 {
    70.0
}
fn default_min_rr() -> f64 {
    1.8
}
fn default_sentiment_conflict_threshold() -> f64 {
    70.0
}
fn default_daily_quota() -> u32 {
    5
}
fn default_global_cooldown_secs() -> u64 {
    900
}
fn default_symbol_cooldown_secs() -> u64 {
    4 * 3600
}
fn default_stabilization_secs() -> u64 {
    60
}
fn default_cycle_period_secs() -> u64 {
    120
}
fn default_max_concurrent_symbols() -> usize {
    4
}
fn default_min_series_len() -> usize {
    50
}
fn default_series_limit() -> usize {
    200
}
fn default_max_hold_secs() -> u64 {
    3 * 86400
}
fn default_notification_queue_capacity() -> usize {
    64
}
fn default_persist_attempts() -> u32 {
    3
}
fn default_persist_backoff_ms() -> u64 {
    200
}
fn default_data_retrieval_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watchlist: default_watchlist(),
            timeframes: default_timeframes(),
            entry_timeframe: default_entry_timeframe(),
            min_confluences: default_min_confluences(),
            min_elite_confidence: default_min_elite_confidence(),
            min_rr: default_min_rr(),
            sentiment_conflict_threshold: default_sentiment_conflict_threshold(),
            daily_quota: default_daily_quota(),
            global_cooldown_secs: default_global_cooldown_secs(),
            symbol_cooldown_secs: default_symbol_cooldown_secs(),
            quota_utc_offset_minutes: 0,
            stabilization_secs: default_stabilization_secs(),
            cycle_period_secs: default_cycle_period_secs(),
            max_concurrent_symbols: default_max_concurrent_symbols(),
            min_series_len: default_min_series_len(),
            series_limit: default_series_limit(),
            max_hold_secs: default_max_hold_secs(),
            notification_queue_capacity: default_notification_queue_capacity(),
            persist_attempts: default_persist_attempts(),
            persist_backoff_ms: default_persist_backoff_ms(),
            data_retrieval_url: default_data_retrieval_url(),
            fundamentals_url: None,
            webhook_url: None,
            data_dir: None,
            log_level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Load from the process environment
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    /// Load from an explicit variable map instead of the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::load(Some(vars))
    }

    fn load(vars: Option<HashMap<String, String>>) -> Result<Self> {
        let env = Environment::with_prefix(ENV_PREFIX)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("watchlist")
            .with_list_parse_key("timeframes")
            .source(vars);

        let config: EngineConfig = ConfigLoader::builder()
            .add_source(env)
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.watchlist.iter().all(|s| s.trim().is_empty()) {
            return Err(EngineError::Config("watchlist is empty".to_string()));
        }
        if self.timeframes.is_empty() {
            return Err(EngineError::Config("no timeframes configured".to_string()));
        }
        if !self.timeframes.contains(&self.entry_timeframe) {
            return Err(EngineError::Config(format!(
                "entry timeframe {} is not among the analyzed timeframes",
                self.entry_timeframe
            )));
        }
        if self.min_rr <= 0.0 {
            return Err(EngineError::Config(format!(
                "min_rr must be positive, got {}",
                self.min_rr
            )));
        }
        if self.cycle_period_secs == 0 {
            return Err(EngineError::Config("cycle period must be non-zero".to_string()));
        }
        if self.max_concurrent_symbols == 0 {
            return Err(EngineError::Config(
                "max_concurrent_symbols must be at least 1".to_string(),
            ));
        }
        if self.min_confluences == 0 {
            return Err(EngineError::Config("min_confluences must be at least 1".to_string()));
        }
        self.quota_offset()?;
        Ok(())
    }

    /// Symbols, trimmed and upper-cased, blanks dropped
    pub fn symbols(&self) -> Vec<String> {
        self.watchlist
            .iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".confluence")
        })
    }

    pub fn quota_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.quota_utc_offset_minutes * 60).ok_or_else(|| {
            EngineError::Config(format!(
                "quota UTC offset out of range: {} minutes",
                self.quota_utc_offset_minutes
            ))
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.persist_attempts.max(1),
            base_delay: Duration::from_millis(self.persist_backoff_ms),
        }
    }

    pub fn log_level(&self) -> tracing::Level {
        self.log_level
            .parse()
            .unwrap_or(tracing::Level::INFO)
    }
}
