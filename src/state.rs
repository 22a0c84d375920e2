//! State Management - Write state/now.json after every cycle for observability

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Writes observability state files under `<data_dir>/state`
pub struct StateManager {
    state_dir: PathBuf,
}

/// Current status (state/now.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NowState {
    pub timestamp: String,
    pub scheduler_state: String,
    pub emitted_today: u32,
    pub daily_quota: u32,
    pub pending_signals: usize,
    pub cycles_completed: u64,
    pub last_cycle: Option<CycleSummary>,
    /// Rejections since start, by reason code
    pub rejections_by_reason: BTreeMap<String, u64>,
    /// Methods whose weight row failed to persist
    #[serde(default)]
    pub unpersisted_weights: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleSummary {
    pub started_at: String,
    pub duration_ms: i64,
    pub evaluated: usize,
    pub emitted: usize,
    pub rejected: usize,
    pub no_setup: usize,
    pub skipped: usize,
    pub failed: usize,
    pub exits_closed: usize,
}

impl StateManager {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            state_dir: data_dir.as_ref().join("state"),
        }
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.state_dir).await?;
        Ok(())
    }

    pub async fn write_now(&self, state: &NowState) -> anyhow::Result<()> {
        let path = self.state_dir.join("now.json");
        let tmp = self.state_dir.join("now.json.tmp");
        let json = serde_json::to_string_pretty(state)?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        debug!("Wrote state/now.json");
        Ok(())
    }
}
