//! Outcome tracking for emitted signals
//!
//! Holds every signal that has not closed yet. A signal closes exactly once,
//! either through [`OutcomeTracker::record_outcome`] or when
//! [`OutcomeTracker::check_exits`] sees its stop, target or holding limit hit.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::learning::LearningEngine;
use crate::store::{with_retry, RetryPolicy, SignalStore};
use crate::types::{Action, Candle, EmittedSignal, ExitReason, SignalOutcome};

#[derive(Default)]
struct Book {
    pending: BTreeMap<Uuid, EmittedSignal>,
    closed: HashSet<Uuid>,
}

pub struct OutcomeTracker {
    book: Mutex<Book>,
    learning: Arc<LearningEngine>,
    store: Arc<dyn SignalStore>,
    retry: RetryPolicy,
    max_hold: Duration,
}

impl OutcomeTracker {
    pub fn new(
        learning: Arc<LearningEngine>,
        store: Arc<dyn SignalStore>,
        retry: RetryPolicy,
        max_hold: Duration,
    ) -> Self {
        Self {
            book: Mutex::new(Book::default()),
            learning,
            store,
            retry,
            max_hold,
        }
    }

    /// Start tracking an emitted signal and persist it with a pending outcome.
    ///
    /// The signal is tracked even when the write fails; the error tells the
    /// caller the emission is not durable.
    pub async fn track(&self, signal: &EmittedSignal) -> Result<()> {
        self.book
            .lock()
            .await
            .pending
            .insert(signal.id, signal.clone());
        debug!("Tracking signal {} for {}", signal.id, signal.symbol());

        with_retry("append_signal", &self.retry, || self.store.append_signal(signal)).await
    }

    /// Reload pending signals from the store after a restart
    pub async fn restore(&self) -> Result<usize> {
        let records = self.store.load_signals().await?;
        let mut book = self.book.lock().await;
        for record in records {
            if record.outcome.is_pending() {
                book.pending.insert(record.signal.id, record.signal);
            } else {
                book.closed.insert(record.signal.id);
            }
        }
        info!(
            "Restored {} pending and {} closed signals",
            book.pending.len(),
            book.closed.len()
        );
        Ok(book.pending.len())
    }

    pub async fn pending_count(&self) -> usize {
        self.book.lock().await.pending.len()
    }

    pub async fn pending_symbols(&self) -> BTreeSet<String> {
        self.book
            .lock()
            .await
            .pending
            .values()
            .map(|s| s.symbol().to_string())
            .collect()
    }

    pub async fn pending_signals(&self) -> Vec<EmittedSignal> {
        self.book.lock().await.pending.values().cloned().collect()
    }

    /// Close a signal by id, feed the result to the learning engine and
    /// persist the outcome
    pub async fn record_outcome(
        &self,
        signal_id: Uuid,
        exit_price: Decimal,
        exit_reason: ExitReason,
        closed_at: DateTime<Utc>,
    ) -> Result<SignalOutcome> {
        let signal = {
            let mut book = self.book.lock().await;
            match book.pending.remove(&signal_id) {
                Some(signal) => {
                    book.closed.insert(signal_id);
                    signal
                }
                None if book.closed.contains(&signal_id) => {
                    return Err(EngineError::AlreadyClosed(signal_id))
                }
                None => return Err(EngineError::UnknownSignal(signal_id)),
            }
        };

        let outcome = self
            .learning
            .record_outcome(&signal, exit_price, exit_reason, closed_at)
            .await?;

        if let Err(e) =
            with_retry("update_outcome", &self.retry, || self.store.update_outcome(&outcome)).await
        {
            error!("Outcome for signal {} not persisted: {}", signal_id, e);
        }

        info!(
            signal_id = %signal_id,
            symbol = %signal.symbol(),
            reason = ?exit_reason,
            exit_price = %exit_price,
            outcome = ?outcome.outcome,
            "signal closed"
        );
        Ok(outcome)
    }

    /// Close pending signals for `symbol` whose levels were touched by
    /// candles after emission, or whose holding time ran out
    pub async fn check_exits(
        &self,
        symbol: &str,
        candles: &[Candle],
        now: DateTime<Utc>,
    ) -> Vec<SignalOutcome> {
        let candidates: Vec<EmittedSignal> = self
            .book
            .lock()
            .await
            .pending
            .values()
            .filter(|s| s.symbol() == symbol)
            .cloned()
            .collect();

        let mut closed = Vec::new();
        for signal in candidates {
            let Some((price, reason, at)) = self.find_exit(&signal, candles, now) else {
                continue;
            };
            match self.record_outcome(signal.id, price, reason, at).await {
                Ok(outcome) => closed.push(outcome),
                // Closed concurrently through the manual path
                Err(EngineError::AlreadyClosed(_)) => {}
                Err(e) => warn!("Could not close signal {}: {}", signal.id, e),
            }
        }
        closed
    }

    fn find_exit(
        &self,
        signal: &EmittedSignal,
        candles: &[Candle],
        now: DateTime<Utc>,
    ) -> Option<(Decimal, ExitReason, DateTime<Utc>)> {
        let c = &signal.candidate;
        for candle in candles.iter().filter(|k| k.timestamp > signal.emitted_at) {
            let (stop_hit, target_hit) = match c.action {
                Action::Buy => (candle.low <= c.stop_loss, candle.high >= c.target_price),
                Action::Sell => (candle.high >= c.stop_loss, candle.low <= c.target_price),
            };
            // Intrabar order is unknown; assume the stop filled first
            if stop_hit {
                return Some((c.stop_loss, ExitReason::StopLoss, candle.timestamp));
            }
            if target_hit {
                return Some((c.target_price, ExitReason::TargetHit, candle.timestamp));
            }
        }

        if now - signal.emitted_at >= self.max_hold {
            let last = candles.last()?;
            return Some((last.close, ExitReason::Expired, now));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::types::{methods, OutcomeStatus, SignalCandidate, StopRule};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
    }

    fn tracker(max_hold_hours: i64) -> (OutcomeTracker, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let retry = RetryPolicy {
            max_attempts: 1,
            base_delay: std::time::Duration::from_millis(1),
        };
        let learning = Arc::new(LearningEngine::new(store.clone(), retry.clone()));
        (
            OutcomeTracker::new(learning, store.clone(), retry, Duration::hours(max_hold_hours)),
            store,
        )
    }

    fn signal(action: Action) -> EmittedSignal {
        let (stop, target) = match action {
            Action::Buy => (97, 106),
            Action::Sell => (103, 94),
        };
        EmittedSignal {
            id: Uuid::new_v4(),
            candidate: SignalCandidate {
                symbol: "ETH".to_string(),
                action,
                entry: Decimal::from(100),
                stop_loss: Decimal::from(stop),
                target_price: Decimal::from(target),
                composite_confidence: 80.0,
                risk_reward_ratio: 2.0,
                confluences: Default::default(),
                contributing_methods: [methods::MARKET_STRUCTURE.to_string()].into(),
                atr: Decimal::from(2),
                stop_rule: StopRule::AtrMultiple,
                timestamp: t0(),
            },
            emitted_at: t0(),
        }
    }

    fn bar(hours: i64, high: i64, low: i64, close: i64) -> Candle {
        Candle {
            timestamp: t0() + Duration::hours(hours),
            open: Decimal::from(100),
            high: Decimal::from(high),
            low: Decimal::from(low),
            close: Decimal::from(close),
            volume: Decimal::from(10),
        }
    }

    #[tokio::test]
    async fn test_manual_close_exactly_once() {
        let (tracker, store) = tracker(48);
        let s = signal(Action::Buy);
        tracker.track(&s).await.unwrap();
        assert_eq!(tracker.pending_count().await, 1);

        let outcome = tracker
            .record_outcome(s.id, Decimal::from(104), ExitReason::Manual, t0())
            .await
            .unwrap();
        assert_eq!(outcome.outcome, OutcomeStatus::Win);
        assert_eq!(tracker.pending_count().await, 0);

        let again = tracker
            .record_outcome(s.id, Decimal::from(104), ExitReason::Manual, t0())
            .await;
        assert!(matches!(again, Err(EngineError::AlreadyClosed(id)) if id == s.id));

        let records = store.load_signals().await.unwrap();
        assert_eq!(records[0].outcome.outcome, OutcomeStatus::Win);
    }

    #[tokio::test]
    async fn test_unknown_signal() {
        let (tracker, _) = tracker(48);
        let id = Uuid::new_v4();
        let result = tracker
            .record_outcome(id, Decimal::from(1), ExitReason::Manual, t0())
            .await;
        assert!(matches!(result, Err(EngineError::UnknownSignal(_))));
    }

    #[tokio::test]
    async fn test_target_hit_closes_win() {
        let (tracker, _) = tracker(48);
        let s = signal(Action::Sell);
        tracker.track(&s).await.unwrap();

        let candles = vec![bar(-1, 110, 80, 100), bar(1, 101, 98, 99), bar(2, 99, 93, 95)];
        let closed = tracker.check_exits("ETH", &candles, t0() + Duration::hours(3)).await;

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].exit_reason, Some(ExitReason::TargetHit));
        assert_eq!(closed[0].exit_price, Some(Decimal::from(94)));
        assert_eq!(closed[0].outcome, OutcomeStatus::Win);
    }

    #[tokio::test]
    async fn test_stop_wins_same_candle_tie() {
        let (tracker, _) = tracker(48);
        let s = signal(Action::Buy);
        tracker.track(&s).await.unwrap();

        let candles = vec![bar(1, 107, 96, 100)];
        let closed = tracker.check_exits("ETH", &candles, t0() + Duration::hours(2)).await;

        assert_eq!(closed[0].exit_reason, Some(ExitReason::StopLoss));
        assert_eq!(closed[0].outcome, OutcomeStatus::Loss);
    }

    #[tokio::test]
    async fn test_expiry_after_max_hold() {
        let (tracker, _) = tracker(24);
        let s = signal(Action::Buy);
        tracker.track(&s).await.unwrap();

        let candles = vec![bar(1, 101, 99, 101), bar(2, 102, 100, 102)];
        let early = tracker.check_exits("ETH", &candles, t0() + Duration::hours(3)).await;
        assert!(early.is_empty());

        let late = tracker.check_exits("ETH", &candles, t0() + Duration::hours(25)).await;
        assert_eq!(late.len(), 1);
        assert_eq!(late[0].exit_reason, Some(ExitReason::Expired));
        assert_eq!(late[0].exit_price, Some(Decimal::from(102)));
    }

    #[tokio::test]
    async fn test_restore_pending_from_store() {
        let (tracker, store) = tracker(48);
        let open = signal(Action::Buy);
        let done = signal(Action::Sell);
        tracker.track(&open).await.unwrap();
        tracker.track(&done).await.unwrap();
        tracker
            .record_outcome(done.id, Decimal::from(94), ExitReason::TargetHit, t0())
            .await
            .unwrap();

        let retry = RetryPolicy::default();
        let learning = Arc::new(LearningEngine::new(store.clone(), retry.clone()));
        let restored = OutcomeTracker::new(learning, store, retry, Duration::hours(48));
        assert_eq!(restored.restore().await.unwrap(), 1);
        assert!(matches!(
            restored
                .record_outcome(done.id, Decimal::from(94), ExitReason::Manual, t0())
                .await,
            Err(EngineError::AlreadyClosed(_))
        ));
    }
}
