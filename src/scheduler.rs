//! Scheduler - Main decision loop
//!
//! One timer drives analysis cycles over the watchlist. Symbols are
//! evaluated concurrently (bounded by a semaphore); emission is serialized
//! behind one mutex so two symbols can never both pass the cooldown check
//! inside the same window.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::analysis::{AnalyzerConfig, PressureConfig, PressureZoneDetector, TimeframeAnalyzer};
use crate::config::EngineConfig;
use crate::confluence::{AggregateOutcome, ConfluenceAggregator, ConfluenceConfig};
use crate::cooldown::EmissionGate;
use crate::error::{EngineError, Result};
use crate::learning::LearningEngine;
use crate::market::{FundamentalSource, MarketData};
use crate::notify::{NotificationQueue, Notifier};
use crate::outcome::OutcomeTracker;
use crate::pipeline::{PipelineConfig, SymbolPipeline};
use crate::risk::{RiskValidator, Verdict};
use crate::state::{CycleSummary, NowState, StateManager};
use crate::store::{with_retry, RetryPolicy, SignalStore};
use crate::types::{EmittedSignal, RejectionReason, RejectionRecord, SignalCandidate};

/// Lifecycle: Stopped -> Stabilizing -> Running -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Stabilizing,
    Running,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Stopped => "stopped",
            SchedulerState::Stabilizing => "stabilizing",
            SchedulerState::Running => "running",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub watchlist: Vec<String>,
    /// Warm-up after start during which no analysis runs
    pub stabilization: Duration,
    pub cycle_period: Duration,
    pub max_concurrent_symbols: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            watchlist: Vec::new(),
            stabilization: Duration::from_secs(60),
            cycle_period: Duration::from_secs(120),
            max_concurrent_symbols: 4,
        }
    }
}

/// Accepted signal; `persisted` is false when the store write failed
/// after all retries
#[derive(Debug, Clone, Serialize)]
pub struct Emission {
    pub signal: EmittedSignal,
    pub persisted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SymbolStatus {
    Skipped { reason: String },
    Failed { kind: String, message: String },
    NoSetup { confluences: usize, required: usize },
    Rejected { record: RejectionRecord },
    Emitted { emission: Emission },
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolReport {
    pub symbol: String,
    #[serde(flatten)]
    pub status: SymbolStatus,
    pub exits_closed: usize,
}

/// Result of one analysis cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// In watchlist order
    pub symbols: Vec<SymbolReport>,
}

impl CycleReport {
    pub fn emissions(&self) -> Vec<&Emission> {
        self.symbols
            .iter()
            .filter_map(|r| match &r.status {
                SymbolStatus::Emitted { emission } => Some(emission),
                _ => None,
            })
            .collect()
    }

    pub fn rejections(&self) -> Vec<&RejectionRecord> {
        self.symbols
            .iter()
            .filter_map(|r| match &r.status {
                SymbolStatus::Rejected { record } => Some(record),
                _ => None,
            })
            .collect()
    }

    /// (symbol, error kind) for every symbol whose evaluation failed
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.symbols
            .iter()
            .filter_map(|r| match &r.status {
                SymbolStatus::Failed { kind, .. } => Some((r.symbol.as_str(), kind.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Symbols that reached a decision (no skip, no failure)
    pub fn evaluated(&self) -> Vec<&str> {
        self.symbols
            .iter()
            .filter(|r| {
                !matches!(
                    r.status,
                    SymbolStatus::Skipped { .. } | SymbolStatus::Failed { .. }
                )
            })
            .map(|r| r.symbol.as_str())
            .collect()
    }

    pub fn status_of(&self, symbol: &str) -> Option<&SymbolStatus> {
        self.symbols
            .iter()
            .find(|r| r.symbol == symbol)
            .map(|r| &r.status)
    }

    fn summary(&self) -> CycleSummary {
        let mut summary = CycleSummary {
            started_at: self.started_at.to_rfc3339(),
            duration_ms: (self.finished_at - self.started_at).num_milliseconds(),
            ..Default::default()
        };
        for report in &self.symbols {
            summary.exits_closed += report.exits_closed;
            match report.status {
                SymbolStatus::Skipped { .. } => summary.skipped += 1,
                SymbolStatus::Failed { .. } => summary.failed += 1,
                SymbolStatus::NoSetup { .. } => summary.no_setup += 1,
                SymbolStatus::Rejected { .. } => summary.rejected += 1,
                SymbolStatus::Emitted { .. } => summary.emitted += 1,
            }
        }
        summary.evaluated = summary.no_setup + summary.rejected + summary.emitted;
        summary
    }
}

/// Collaborators and policies the scheduler is built from
pub struct SchedulerParts {
    pub pipeline: SymbolPipeline,
    pub validator: RiskValidator,
    pub gate: EmissionGate,
    pub learning: Arc<LearningEngine>,
    pub tracker: Arc<OutcomeTracker>,
    pub store: Arc<dyn SignalStore>,
    pub notifier: Option<Arc<dyn Notifier>>,
    pub notification_capacity: usize,
    pub state: Option<StateManager>,
    pub retry: RetryPolicy,
    pub settings: SchedulerSettings,
}

struct Core {
    pipeline: SymbolPipeline,
    validator: RiskValidator,
    gate: Mutex<EmissionGate>,
    learning: Arc<LearningEngine>,
    tracker: Arc<OutcomeTracker>,
    store: Arc<dyn SignalStore>,
    notifier: Option<Arc<dyn Notifier>>,
    notification_capacity: usize,
    /// Open queue and its worker; taken on stop so the backlog drains
    notifications: Mutex<Option<(NotificationQueue, JoinHandle<()>)>>,
    state_files: Option<StateManager>,
    retry: RetryPolicy,
    settings: SchedulerSettings,
    permits: Arc<Semaphore>,
    rejection_counts: Mutex<BTreeMap<RejectionReason, u64>>,
    cycles_completed: AtomicU64,
    last_report: RwLock<Option<CycleReport>>,
    state_tx: watch::Sender<SchedulerState>,
}

/// Owns the decision loop. Built once by the process entry point.
pub struct Scheduler {
    core: Arc<Core>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Must be called inside a tokio runtime; the notification worker is
    /// spawned here.
    pub fn new(parts: SchedulerParts) -> Self {
        let (state_tx, _) = watch::channel(SchedulerState::Stopped);
        let (shutdown_tx, _) = watch::channel(false);
        let permits = Arc::new(Semaphore::new(parts.settings.max_concurrent_symbols.max(1)));
        let notifications = parts
            .notifier
            .clone()
            .map(|n| NotificationQueue::spawn(n, parts.notification_capacity));
        Self {
            core: Arc::new(Core {
                pipeline: parts.pipeline,
                validator: parts.validator,
                gate: Mutex::new(parts.gate),
                learning: parts.learning,
                tracker: parts.tracker,
                store: parts.store,
                notifier: parts.notifier,
                notification_capacity: parts.notification_capacity,
                notifications: Mutex::new(notifications),
                state_files: parts.state,
                retry: parts.retry,
                settings: parts.settings,
                permits,
                rejection_counts: Mutex::new(BTreeMap::new()),
                cycles_completed: AtomicU64::new(0),
                last_report: RwLock::new(None),
                state_tx,
            }),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    /// Wire every component from configuration. Passing a `StateManager`
    /// turns on state/now.json.
    pub fn from_config(
        config: &EngineConfig,
        market: Arc<dyn MarketData>,
        fundamentals: Arc<dyn FundamentalSource>,
        store: Arc<dyn SignalStore>,
        notifier: Option<Arc<dyn Notifier>>,
        state: Option<StateManager>,
    ) -> Result<Self> {
        config.validate()?;
        let retry = config.retry_policy();

        let learning = Arc::new(LearningEngine::new(store.clone(), retry.clone()));
        let tracker = Arc::new(OutcomeTracker::new(
            learning.clone(),
            store.clone(),
            retry.clone(),
            chrono::Duration::seconds(config.max_hold_secs as i64),
        ));

        let pipeline = SymbolPipeline::new(
            market,
            fundamentals,
            learning.clone(),
            TimeframeAnalyzer::new(AnalyzerConfig {
                min_series_len: config.min_series_len,
                ..Default::default()
            }),
            PressureZoneDetector::new(PressureConfig::default()),
            ConfluenceAggregator::new(ConfluenceConfig {
                min_confluences: config.min_confluences,
                sentiment_conflict_threshold: config.sentiment_conflict_threshold,
                ..Default::default()
            }),
            PipelineConfig {
                timeframes: config.timeframes.clone(),
                entry_timeframe: config.entry_timeframe,
                series_limit: config.series_limit,
                ..Default::default()
            },
        );

        let gate = EmissionGate::new(
            chrono::Duration::seconds(config.global_cooldown_secs as i64),
            chrono::Duration::seconds(config.symbol_cooldown_secs as i64),
            config.daily_quota,
            config.quota_offset()?,
        );

        Ok(Self::new(SchedulerParts {
            pipeline,
            validator: RiskValidator::new(config.min_rr, config.min_elite_confidence),
            gate,
            learning,
            tracker,
            store,
            notifier,
            notification_capacity: config.notification_queue_capacity,
            state,
            retry,
            settings: SchedulerSettings {
                watchlist: config.symbols(),
                stabilization: Duration::from_secs(config.stabilization_secs),
                cycle_period: Duration::from_secs(config.cycle_period_secs),
                max_concurrent_symbols: config.max_concurrent_symbols,
            },
        }))
    }

    pub fn state(&self) -> SchedulerState {
        *self.core.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.core.state_tx.subscribe()
    }

    pub fn cycles_completed(&self) -> u64 {
        self.core.cycles_completed.load(Ordering::SeqCst)
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.core.last_report.read().await.clone()
    }

    pub fn learning(&self) -> &Arc<LearningEngine> {
        &self.core.learning
    }

    pub fn tracker(&self) -> &Arc<OutcomeTracker> {
        &self.core.tracker
    }

    /// Reload weights, pending signals and cooldown history from the store
    pub async fn restore(&self) -> Result<()> {
        self.core.learning.load().await?;
        self.core.tracker.restore().await?;
        let records = self.core.store.load_signals().await?;
        let mut gate = self.core.gate.lock().await;
        gate.restore(records.iter().map(|r| &r.signal));
        let count = self.core.store.load_rejections().await?.len();
        info!(
            "Scheduler restored ({} signals on record, {} rejections)",
            records.len(),
            count
        );
        Ok(())
    }

    /// Spawn the loop. Calling start on a started scheduler is a no-op.
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            warn!("Scheduler already started");
            return;
        }
        self.shutdown_tx.send_replace(false);
        self.core.open_notifications().await;
        let core = self.core.clone();
        let shutdown = self.shutdown_tx.subscribe();
        *task = Some(tokio::spawn(run_loop(core, shutdown)));
    }

    /// Stop the loop and flush queued notifications. An in-flight cycle
    /// runs to completion first.
    pub async fn stop(&self) {
        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            info!("Scheduler stopping...");
            self.shutdown_tx.send_replace(true);
            if let Err(e) = handle.await {
                error!("Scheduler loop ended abnormally: {}", e);
            }
            self.core.state_tx.send_replace(SchedulerState::Stopped);
        }
        self.core.drain_notifications().await;
        info!("Scheduler stopped");
    }

    /// Run one cycle now, outside the timer
    pub async fn run_cycle(&self) -> CycleReport {
        self.core.clone().run_cycle(Utc::now()).await
    }

    /// Run one cycle with an explicit clock
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> CycleReport {
        self.core.clone().run_cycle(now).await
    }
}

async fn run_loop(core: Arc<Core>, mut shutdown: watch::Receiver<bool>) {
    core.state_tx.send_replace(SchedulerState::Stabilizing);
    info!(
        "Scheduler stabilizing for {:?} before first cycle",
        core.settings.stabilization
    );
    tokio::select! {
        _ = sleep(core.settings.stabilization) => {}
        _ = shutdown.changed() => {
            core.state_tx.send_replace(SchedulerState::Stopped);
            return;
        }
    }

    core.state_tx.send_replace(SchedulerState::Running);
    info!(
        "Scheduler running: {} symbols every {:?}",
        core.settings.watchlist.len(),
        core.settings.cycle_period
    );

    let mut ticker = interval(core.settings.cycle_period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // The cycle is awaited here, outside select, so stop waits for it
                core.clone().run_cycle(Utc::now()).await;
            }
            _ = shutdown.changed() => break,
        }
    }
    core.state_tx.send_replace(SchedulerState::Stopped);
}

impl Core {
    async fn run_cycle(self: Arc<Self>, now: DateTime<Utc>) -> CycleReport {
        let started = Utc::now();
        debug!(
            "Cycle starting for {} symbols",
            self.settings.watchlist.len()
        );

        let mut tasks = JoinSet::new();
        for (index, symbol) in self.settings.watchlist.iter().cloned().enumerate() {
            let core = self.clone();
            tasks.spawn(async move {
                let report = match core.permits.clone().acquire_owned().await {
                    Ok(_permit) => core.process_symbol(&symbol, now).await,
                    Err(_) => SymbolReport {
                        symbol: symbol.clone(),
                        status: SymbolStatus::Failed {
                            kind: "Shutdown".to_string(),
                            message: "worker pool closed".to_string(),
                        },
                        exits_closed: 0,
                    },
                };
                (index, report)
            });
        }

        let mut reports = Vec::with_capacity(self.settings.watchlist.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(entry) => reports.push(entry),
                Err(e) => error!("Symbol task panicked: {}", e),
            }
        }
        reports.sort_by_key(|(index, _)| *index);

        let report = CycleReport {
            started_at: started,
            finished_at: Utc::now(),
            symbols: reports.into_iter().map(|(_, r)| r).collect(),
        };
        let summary = report.summary();
        info!(
            "Cycle complete: {} evaluated, {} emitted, {} rejected, {} skipped, {} failed",
            summary.evaluated, summary.emitted, summary.rejected, summary.skipped, summary.failed
        );

        self.cycles_completed.fetch_add(1, Ordering::SeqCst);
        *self.last_report.write().await = Some(report.clone());
        self.write_state(&report, now).await;
        report
    }

    async fn process_symbol(&self, symbol: &str, now: DateTime<Utc>) -> SymbolReport {
        let skip = self.gate.lock().await.check(symbol, now);
        if let Err(reason) = skip {
            info!("Skipping {}: {}", symbol, reason);
            debug!("{}", reason.to_error(symbol));
            let exits_closed = self.monitor_exits(symbol, now).await;
            return SymbolReport {
                symbol: symbol.to_string(),
                status: SymbolStatus::Skipped {
                    reason: reason.to_string(),
                },
                exits_closed,
            };
        }

        let evaluation = match self.pipeline.evaluate(symbol, now).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                match &e {
                    EngineError::InsufficientData { .. } => debug!("{}: {}", symbol, e),
                    _ => warn!("Analysis of {} failed ({}): {}", symbol, e.kind(), e),
                }
                return SymbolReport {
                    symbol: symbol.to_string(),
                    status: SymbolStatus::Failed {
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    },
                    exits_closed: 0,
                };
            }
        };

        let exits_closed = self
            .tracker
            .check_exits(symbol, &evaluation.entry_candles, now)
            .await
            .len();

        let status = match evaluation.outcome {
            AggregateOutcome::NoSetup {
                confluences,
                required,
            } => SymbolStatus::NoSetup {
                confluences,
                required,
            },
            AggregateOutcome::Conflict(record) => {
                self.record_rejection(&record).await;
                SymbolStatus::Rejected { record }
            }
            AggregateOutcome::Candidate(candidate) => self.emit(candidate, now).await,
        };

        SymbolReport {
            symbol: symbol.to_string(),
            status,
            exits_closed,
        }
    }

    /// Re-check the gate, validate, persist, start cooldowns and queue the
    /// notification, all under the emission lock
    async fn emit(&self, candidate: SignalCandidate, now: DateTime<Utc>) -> SymbolStatus {
        let mut gate = self.gate.lock().await;

        if let Err(reason) = gate.check(&candidate.symbol, now) {
            info!("Dropping {} candidate: {}", candidate.symbol, reason);
            return SymbolStatus::Skipped {
                reason: reason.to_string(),
            };
        }

        let signal = match self.validator.validate(&candidate, now) {
            Verdict::Accepted(signal) => signal,
            Verdict::Rejected(record) => {
                drop(gate);
                self.record_rejection(&record).await;
                return SymbolStatus::Rejected { record };
            }
        };

        let persisted = match self.tracker.track(&signal).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    "Signal {} for {} emitted but NOT persisted: {}",
                    signal.id,
                    signal.symbol(),
                    e
                );
                false
            }
        };
        gate.record_emission(signal.symbol(), signal.emitted_at);
        if let Some((queue, _)) = self.notifications.lock().await.as_ref() {
            queue.enqueue(&signal);
        }
        drop(gate);

        info!(
            signal_id = %signal.id,
            symbol = %signal.symbol(),
            action = %signal.action(),
            entry = %signal.candidate.entry,
            stop = %signal.candidate.stop_loss,
            target = %signal.candidate.target_price,
            confidence = signal.candidate.composite_confidence,
            rr = signal.candidate.risk_reward_ratio,
            persisted,
            "signal emitted"
        );
        SymbolStatus::Emitted {
            emission: Emission { signal, persisted },
        }
    }

    async fn record_rejection(&self, record: &RejectionRecord) {
        *self
            .rejection_counts
            .lock()
            .await
            .entry(record.reason)
            .or_default() += 1;
        if let Err(e) = with_retry("append_rejection", &self.retry, || {
            self.store.append_rejection(record)
        })
        .await
        {
            error!(
                "Rejection of {} ({}) not persisted: {}",
                record.symbol, record.reason, e
            );
        }
    }

    /// Exit monitoring for symbols skipped this cycle that still hold
    /// pending signals
    async fn monitor_exits(&self, symbol: &str, now: DateTime<Utc>) -> usize {
        if !self.tracker.pending_symbols().await.contains(symbol) {
            return 0;
        }
        let candles = match self
            .pipeline
            .market()
            .price_series(
                symbol,
                self.pipeline.entry_timeframe(),
                self.pipeline.series_limit(),
            )
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                warn!("Exit check for {} skipped: {}", symbol, e);
                return 0;
            }
        };
        self.tracker.check_exits(symbol, &candles, now).await.len()
    }

    async fn open_notifications(&self) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        let mut slot = self.notifications.lock().await;
        if slot.is_none() {
            *slot = Some(NotificationQueue::spawn(
                notifier.clone(),
                self.notification_capacity,
            ));
        }
    }

    /// Close the queue and wait for the worker to deliver the backlog
    async fn drain_notifications(&self) {
        let Some((queue, worker)) = self.notifications.lock().await.take() else {
            return;
        };
        drop(queue);
        if let Err(e) = worker.await {
            error!("Notification worker ended abnormally: {}", e);
        }
        debug!("Notification queue drained");
    }

    async fn write_state(&self, report: &CycleReport, now: DateTime<Utc>) {
        let Some(files) = &self.state_files else {
            return;
        };
        let (emitted_today, daily_quota) = {
            let gate = self.gate.lock().await;
            (gate.emitted_today(now), gate.daily_quota())
        };
        let rejections_by_reason = self
            .rejection_counts
            .lock()
            .await
            .iter()
            .map(|(reason, count)| (reason.as_str().to_string(), *count))
            .collect();

        // Copy out so the watch guard is not held across the awaits below
        let scheduler_state = self.state_tx.borrow().as_str().to_string();
        let pending_signals = self.tracker.pending_count().await;
        let unpersisted_weights = self.learning.unpersisted_weights().await;

        let state = NowState {
            timestamp: Utc::now().to_rfc3339(),
            scheduler_state,
            emitted_today,
            daily_quota,
            pending_signals,
            cycles_completed: self.cycles_completed.load(Ordering::SeqCst),
            last_cycle: Some(report.summary()),
            rejections_by_reason,
            unpersisted_weights,
        };
        if let Err(e) = files.write_now(&state).await {
            warn!("Failed to write state file: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Action;

    // Compile-time: the loop must be spawnable on the multi-thread runtime
    #[allow(dead_code)]
    fn run_loop_future_is_send(core: Arc<Core>, shutdown: watch::Receiver<bool>) {
        fn is_send<T: Send>(_: &T) {}
        is_send(&run_loop(core, shutdown));
    }

    fn report(symbol: &str, status: SymbolStatus) -> SymbolReport {
        SymbolReport {
            symbol: symbol.to_string(),
            status,
            exits_closed: 0,
        }
    }

    #[test]
    fn test_cycle_report_summary() {
        let now = Utc::now();
        let rejection = RejectionRecord {
            symbol: "ETH".to_string(),
            reason: RejectionReason::PoorRiskReward,
            measured: 1.2,
            threshold: 1.8,
            action: Some(Action::Buy),
            timestamp: now,
        };
        let cycle = CycleReport {
            started_at: now,
            finished_at: now + chrono::Duration::milliseconds(40),
            symbols: vec![
                report(
                    "BTC",
                    SymbolStatus::NoSetup {
                        confluences: 1,
                        required: 3,
                    },
                ),
                report("ETH", SymbolStatus::Rejected { record: rejection }),
                report(
                    "SOL",
                    SymbolStatus::Failed {
                        kind: "DataUnavailable".to_string(),
                        message: "timeout".to_string(),
                    },
                ),
                report(
                    "ARB",
                    SymbolStatus::Skipped {
                        reason: "global cooldown, 10s remaining".to_string(),
                    },
                ),
            ],
        };

        let summary = cycle.summary();
        assert_eq!(summary.evaluated, 2);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.duration_ms, 40);
        assert_eq!(cycle.evaluated(), vec!["BTC", "ETH"]);
        assert_eq!(cycle.failures(), vec![("SOL", "DataUnavailable")]);
        assert_eq!(cycle.rejections()[0].reason, RejectionReason::PoorRiskReward);
        assert!(cycle.emissions().is_empty());
    }

    #[test]
    fn test_symbol_report_serializes_flat() {
        let value = serde_json::to_value(report(
            "BTC",
            SymbolStatus::Skipped {
                reason: "symbol cooldown, 60s remaining".to_string(),
            },
        ))
        .unwrap();
        assert_eq!(value["symbol"], "BTC");
        assert_eq!(value["status"], "skipped");
        assert_eq!(value["reason"], "symbol cooldown, 60s remaining");
    }
}
