//! Record store for signals, outcomes, rejections and method weights
//!
//! Signals and rejections are append-only; outcomes and weights are
//! upserted by key. Writes go through [`with_retry`] at the call sites that
//! must not lose data.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::types::{EmittedSignal, MethodWeight, RejectionRecord, SignalOutcome};

/// Emitted signal together with its current outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub signal: EmittedSignal,
    pub outcome: SignalOutcome,
}

#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Append an emitted signal with a pending outcome
    async fn append_signal(&self, signal: &EmittedSignal) -> Result<()>;

    async fn append_rejection(&self, record: &RejectionRecord) -> Result<()>;

    /// Replace the outcome of a stored signal
    async fn update_outcome(&self, outcome: &SignalOutcome) -> Result<()>;

    /// Insert or replace a weight row keyed by method name
    async fn upsert_weight(&self, weight: &MethodWeight) -> Result<()>;

    async fn load_weights(&self) -> Result<Vec<MethodWeight>>;

    async fn load_signals(&self) -> Result<Vec<SignalRecord>>;

    async fn load_rejections(&self) -> Result<Vec<RejectionRecord>>;
}

/// Retry configuration for store writes
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff: base, 2x base, 4x base ...
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * (1_u32 << attempt.min(6))
    }
}

/// Execute a fallible store operation with retry and backoff
pub async fn with_retry<F, Fut, T>(operation: &str, policy: &RetryPolicy, f: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        match f().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(
                    "Store {} failed (attempt {}/{}): {}",
                    operation,
                    attempt + 1,
                    attempts,
                    e
                );
                last_error = Some(e);
                if attempt + 1 < attempts {
                    let delay = policy.delay(attempt);
                    debug!("Retrying {} after {:?}", operation, delay);
                    sleep(delay).await;
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| EngineError::persistence(operation, "no attempt made")))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Tables {
    signals: Vec<SignalRecord>,
    rejections: Vec<RejectionRecord>,
    weights: BTreeMap<String, MethodWeight>,
}

impl Tables {
    fn set_outcome(&mut self, outcome: &SignalOutcome) -> Result<()> {
        let record = self
            .signals
            .iter_mut()
            .find(|r| r.signal.id == outcome.signal_id)
            .ok_or(EngineError::UnknownSignal(outcome.signal_id))?;
        record.outcome = outcome.clone();
        Ok(())
    }
}

/// Process-local store
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SignalStore for InMemoryStore {
    async fn append_signal(&self, signal: &EmittedSignal) -> Result<()> {
        self.tables.write().await.signals.push(SignalRecord {
            signal: signal.clone(),
            outcome: SignalOutcome::pending(signal.id),
        });
        Ok(())
    }

    async fn append_rejection(&self, record: &RejectionRecord) -> Result<()> {
        self.tables.write().await.rejections.push(record.clone());
        Ok(())
    }

    async fn update_outcome(&self, outcome: &SignalOutcome) -> Result<()> {
        self.tables.write().await.set_outcome(outcome)
    }

    async fn upsert_weight(&self, weight: &MethodWeight) -> Result<()> {
        self.tables
            .write()
            .await
            .weights
            .insert(weight.method_name.clone(), weight.clone());
        Ok(())
    }

    async fn load_weights(&self) -> Result<Vec<MethodWeight>> {
        Ok(self.tables.read().await.weights.values().cloned().collect())
    }

    async fn load_signals(&self) -> Result<Vec<SignalRecord>> {
        Ok(self.tables.read().await.signals.clone())
    }

    async fn load_rejections(&self) -> Result<Vec<RejectionRecord>> {
        Ok(self.tables.read().await.rejections.clone())
    }
}

const SIGNALS_FILE: &str = "signals.json";
const REJECTIONS_FILE: &str = "rejections.json";
const WEIGHTS_FILE: &str = "weights.json";

/// JSON files under a data directory, one per table.
///
/// Each write rewrites the affected table to a temp file and renames it
/// over the old one, so a crash never leaves a half-written table.
pub struct JsonFileStore {
    dir: PathBuf,
    tables: Mutex<Tables>,
}

impl JsonFileStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| EngineError::persistence("open", e))?;

        let signals: Vec<SignalRecord> = read_table(&dir.join(SIGNALS_FILE)).await?;
        let rejections: Vec<RejectionRecord> = read_table(&dir.join(REJECTIONS_FILE)).await?;
        let weights: Vec<MethodWeight> = read_table(&dir.join(WEIGHTS_FILE)).await?;
        debug!(
            "Opened store at {} ({} signals, {} rejections, {} weights)",
            dir.display(),
            signals.len(),
            rejections.len(),
            weights.len()
        );

        Ok(Self {
            dir,
            tables: Mutex::new(Tables {
                signals,
                rejections,
                weights: weights
                    .into_iter()
                    .map(|w| (w.method_name.clone(), w))
                    .collect(),
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn write_table<T: Serialize + ?Sized>(&self, file: &str, value: &T) -> Result<()> {
        let path = self.dir.join(file);
        let tmp = self.dir.join(format!("{}.tmp", file));
        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| EngineError::persistence(file, e))?;
        fs::write(&tmp, json)
            .await
            .map_err(|e| EngineError::persistence(file, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| EngineError::persistence(file, e))?;
        Ok(())
    }
}

async fn read_table<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::persistence("load", format!("{}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(EngineError::persistence("load", e)),
    }
}

#[async_trait]
impl SignalStore for JsonFileStore {
    async fn append_signal(&self, signal: &EmittedSignal) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let mut signals = tables.signals.clone();
        signals.push(SignalRecord {
            signal: signal.clone(),
            outcome: SignalOutcome::pending(signal.id),
        });
        // Memory only changes once the file is durable
        self.write_table(SIGNALS_FILE, &signals).await?;
        tables.signals = signals;
        Ok(())
    }

    async fn append_rejection(&self, record: &RejectionRecord) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let mut rejections = tables.rejections.clone();
        rejections.push(record.clone());
        self.write_table(REJECTIONS_FILE, &rejections).await?;
        tables.rejections = rejections;
        Ok(())
    }

    async fn update_outcome(&self, outcome: &SignalOutcome) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let mut next = tables.clone();
        next.set_outcome(outcome)?;
        self.write_table(SIGNALS_FILE, &next.signals).await?;
        *tables = next;
        Ok(())
    }

    async fn upsert_weight(&self, weight: &MethodWeight) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let mut weights = tables.weights.clone();
        weights.insert(weight.method_name.clone(), weight.clone());
        let rows: Vec<&MethodWeight> = weights.values().collect();
        self.write_table(WEIGHTS_FILE, &rows).await?;
        tables.weights = weights;
        Ok(())
    }

    async fn load_weights(&self) -> Result<Vec<MethodWeight>> {
        Ok(self.tables.lock().await.weights.values().cloned().collect())
    }

    async fn load_signals(&self) -> Result<Vec<SignalRecord>> {
        Ok(self.tables.lock().await.signals.clone())
    }

    async fn load_rejections(&self) -> Result<Vec<RejectionRecord>> {
        Ok(self.tables.lock().await.rejections.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Action, OutcomeStatus, RejectionReason, SignalCandidate, StopRule,
    };
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    fn signal() -> EmittedSignal {
        EmittedSignal {
            id: Uuid::new_v4(),
            candidate: SignalCandidate {
                symbol: "SOL".to_string(),
                action: Action::Buy,
                entry: Decimal::from(100),
                stop_loss: Decimal::from(97),
                target_price: Decimal::from(106),
                composite_confidence: 80.0,
                risk_reward_ratio: 2.0,
                confluences: BTreeSet::new(),
                contributing_methods: BTreeSet::new(),
                atr: Decimal::from(2),
                stop_rule: StopRule::AtrMultiple,
                timestamp: Utc::now(),
            },
            emitted_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_in_memory_outcome_update() {
        let store = InMemoryStore::new();
        let s = signal();
        store.append_signal(&s).await.unwrap();

        let mut outcome = SignalOutcome::pending(s.id);
        outcome.outcome = OutcomeStatus::Win;
        store.update_outcome(&outcome).await.unwrap();

        let records = store.load_signals().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].outcome.outcome, OutcomeStatus::Win);

        let unknown = SignalOutcome::pending(Uuid::new_v4());
        assert!(matches!(
            store.update_outcome(&unknown).await,
            Err(EngineError::UnknownSignal(_))
        ));
    }

    #[tokio::test]
    async fn test_json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let s = signal();
        {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            store.append_signal(&s).await.unwrap();
            store
                .append_rejection(&RejectionRecord {
                    symbol: "SOL".to_string(),
                    reason: RejectionReason::PoorRiskReward,
                    measured: 0.5,
                    threshold: 1.8,
                    action: Some(Action::Buy),
                    timestamp: Utc::now(),
                })
                .await
                .unwrap();
            store
                .upsert_weight(&MethodWeight::new("market-structure", 40.0))
                .await
                .unwrap();
            store
                .upsert_weight(&MethodWeight::new("market-structure", 60.0))
                .await
                .unwrap();
        }

        let reopened = JsonFileStore::open(dir.path()).await.unwrap();
        let signals = reopened.load_signals().await.unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].signal, s);
        assert!(signals[0].outcome.is_pending());
        assert_eq!(reopened.load_rejections().await.unwrap().len(), 1);

        let weights = reopened.load_weights().await.unwrap();
        assert_eq!(weights.len(), 1);
        assert_eq!(weights[0].weight, 60.0);
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };

        let result = with_retry("append", &policy, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(EngineError::persistence("append", "disk busy"))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
        };
        let result: Result<()> = with_retry("append", &policy, || async {
            Err(EngineError::persistence("append", "read-only filesystem"))
        })
        .await;
        assert!(matches!(result, Err(EngineError::PersistenceFailure { .. })));
    }
}
