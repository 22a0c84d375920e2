//! Adaptive method weights
//!
//! Every closed signal updates the running statistics of the methods that
//! contributed to it, then all weights are recomputed and persisted before
//! `record_outcome` returns. Readers get a cloned snapshot.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::error::Result;
use crate::indicators::to_f64;
use crate::store::{with_retry, RetryPolicy, SignalStore};
use crate::types::{
    methods, Action, EmittedSignal, ExitReason, MethodWeight, OutcomeStatus, SignalOutcome,
};

/// Score of a method with no closed signals yet
const PRIOR_SCORE: f64 = 0.5;
const PROFIT_FACTOR_CAP: f64 = 3.0;
/// Sample count at which the volume bonus saturates
const VOLUME_BONUS_SAMPLES: f64 = 50.0;
const VOLUME_BONUS_MAX: f64 = 0.25;
/// Drawdown (percentage points) that would zero the penalty factor
const DRAWDOWN_SCALE: f64 = 50.0;
const DRAWDOWN_FLOOR: f64 = 0.25;
const RECENT_WINDOW: usize = 20;
const BASE_BLEND: f64 = 0.7;
const RECENCY_BLEND: f64 = 0.3;
/// Normalised floor so a losing method keeps a small say
const WEIGHT_FLOOR: f64 = 0.05;
pub const WEIGHT_TOTAL: f64 = 100.0;

/// Direction-aware return of a trade in percent
pub fn profit_percent(action: Action, entry: Decimal, exit: Decimal) -> f64 {
    if entry.is_zero() {
        return 0.0;
    }
    let diff = match action {
        Action::Buy => exit - entry,
        Action::Sell => entry - exit,
    };
    to_f64(diff / entry * Decimal::from(100))
}

pub struct LearningEngine {
    book: RwLock<BTreeMap<String, MethodWeight>>,
    /// Methods whose latest row did not reach the store
    unpersisted: RwLock<BTreeSet<String>>,
    store: Arc<dyn SignalStore>,
    retry: RetryPolicy,
}

impl LearningEngine {
    /// Start with every known method at an equal share
    pub fn new(store: Arc<dyn SignalStore>, retry: RetryPolicy) -> Self {
        let share = WEIGHT_TOTAL / methods::ALL.len() as f64;
        let book = methods::ALL
            .iter()
            .map(|m| (m.to_string(), MethodWeight::new(m, share)))
            .collect();
        Self {
            book: RwLock::new(book),
            unpersisted: RwLock::new(BTreeSet::new()),
            store,
            retry,
        }
    }

    /// Restore persisted statistics and rebuild the weights from them
    pub async fn load(&self) -> Result<usize> {
        let stored = self.store.load_weights().await?;
        let count = stored.len();
        let mut book = self.book.write().await;
        for weight in stored {
            book.insert(weight.method_name.clone(), weight);
        }
        recompute(&mut book);
        info!("Restored {} method weight rows", count);
        Ok(count)
    }

    /// Snapshot of the current weights, ordered by method name
    pub async fn weights(&self) -> Vec<MethodWeight> {
        self.book.read().await.values().cloned().collect()
    }

    /// Methods whose current statistics exist only in memory. Cleared once
    /// a later upsert succeeds.
    pub async fn unpersisted_weights(&self) -> Vec<String> {
        self.unpersisted.read().await.iter().cloned().collect()
    }

    /// Close a signal, update its methods and recompute every weight
    pub async fn record_outcome(
        &self,
        signal: &EmittedSignal,
        exit_price: Decimal,
        exit_reason: ExitReason,
        closed_at: DateTime<Utc>,
    ) -> Result<SignalOutcome> {
        let pct = profit_percent(signal.action(), signal.candidate.entry, exit_price);
        // Breakeven does not count as a win
        let status = if pct > 0.0 {
            OutcomeStatus::Win
        } else {
            OutcomeStatus::Loss
        };

        let rows = {
            let mut book = self.book.write().await;
            for method in &signal.candidate.contributing_methods {
                let entry = book
                    .entry(method.clone())
                    .or_insert_with(|| MethodWeight::new(method, 0.0));
                apply_return(entry, pct, closed_at);
            }
            recompute(&mut book);
            book.values().cloned().collect::<Vec<_>>()
        };

        info!(
            signal_id = %signal.id,
            symbol = %signal.symbol(),
            profit_percent = format!("{:.2}", pct),
            outcome = ?status,
            methods = signal.candidate.contributing_methods.len(),
            "outcome recorded, weights recomputed"
        );

        let mut failed = Vec::new();
        for row in &rows {
            if let Err(e) =
                with_retry("upsert_weight", &self.retry, || self.store.upsert_weight(row)).await
            {
                error!("Weight for {} not persisted: {}", row.method_name, e);
                failed.push(row.method_name.clone());
            }
        }
        {
            let mut unpersisted = self.unpersisted.write().await;
            unpersisted.clear();
            unpersisted.extend(failed);
        }

        Ok(SignalOutcome {
            signal_id: signal.id,
            exit_price: Some(exit_price),
            exit_reason: Some(exit_reason),
            profit_percent: Some(pct),
            outcome: status,
            closed_at: Some(closed_at),
        })
    }
}

/// Fold one realized return into a method's running statistics
fn apply_return(w: &mut MethodWeight, pct: f64, at: DateTime<Utc>) {
    w.total_signals += 1;
    if pct > 0.0 {
        w.wins += 1;
        w.avg_profit += (pct - w.avg_profit) / w.wins as f64;
    } else {
        let losses = w.losses() as f64;
        w.avg_loss += (pct.abs() - w.avg_loss) / losses;
    }
    w.success_rate = w.wins as f64 / w.total_signals as f64;

    w.sum_returns += pct;
    w.sum_sq_returns += pct * pct;
    let n = w.total_signals as f64;
    let mean = w.sum_returns / n;
    let variance = (w.sum_sq_returns / n - mean * mean).max(0.0);
    w.sharpe_ratio = if variance > 0.0 { mean / variance.sqrt() } else { 0.0 };

    w.cumulative_return += pct;
    w.peak_cumulative_return = w.peak_cumulative_return.max(w.cumulative_return);
    w.max_drawdown = w
        .max_drawdown
        .max(w.peak_cumulative_return - w.cumulative_return);

    w.recent_returns.push(pct);
    if w.recent_returns.len() > RECENT_WINDOW {
        let excess = w.recent_returns.len() - RECENT_WINDOW;
        w.recent_returns.drain(..excess);
    }
    w.last_updated = at;
}

fn capped_profit_factor(gross_win: f64, gross_loss: f64) -> f64 {
    if gross_loss > 0.0 {
        (gross_win / gross_loss).min(PROFIT_FACTOR_CAP)
    } else if gross_win > 0.0 {
        PROFIT_FACTOR_CAP
    } else {
        0.0
    }
}

/// success_rate x profit_factor x volume_bonus x drawdown_penalty
fn performance_score(w: &MethodWeight) -> f64 {
    if w.total_signals == 0 {
        return PRIOR_SCORE;
    }
    let profit_factor = capped_profit_factor(
        w.avg_profit * w.wins as f64,
        w.avg_loss * w.losses() as f64,
    );
    let samples = (w.total_signals as f64).min(VOLUME_BONUS_SAMPLES);
    let volume_bonus = 1.0 + samples / VOLUME_BONUS_SAMPLES * VOLUME_BONUS_MAX;
    let drawdown_penalty = (1.0 - w.max_drawdown / DRAWDOWN_SCALE).clamp(DRAWDOWN_FLOOR, 1.0);
    w.success_rate * profit_factor * volume_bonus * drawdown_penalty
}

/// Same shape as the performance score over the recent window, newer
/// returns weighted linearly higher
fn recency_score(recent: &[f64]) -> f64 {
    if recent.is_empty() {
        return PRIOR_SCORE;
    }
    let mut weight_sum = 0.0;
    let mut win_weight = 0.0;
    let mut gross_win = 0.0;
    let mut gross_loss = 0.0;
    for (i, r) in recent.iter().enumerate() {
        let w = (i + 1) as f64;
        weight_sum += w;
        if *r > 0.0 {
            win_weight += w;
            gross_win += w * r;
        } else {
            gross_loss += w * r.abs();
        }
    }
    (win_weight / weight_sum) * capped_profit_factor(gross_win, gross_loss)
}

/// Blend, min-max normalise with a floor and scale to the weight total
fn recompute(book: &mut BTreeMap<String, MethodWeight>) {
    if book.is_empty() {
        return;
    }
    let scores: Vec<f64> = book
        .values()
        .map(|w| {
            BASE_BLEND * performance_score(w) + RECENCY_BLEND * recency_score(&w.recent_returns)
        })
        .collect();

    let min = scores.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let normalized: Vec<f64> = if max - min < 1e-12 {
        vec![1.0; scores.len()]
    } else {
        scores
            .iter()
            .map(|s| WEIGHT_FLOOR + (1.0 - WEIGHT_FLOOR) * (s - min) / (max - min))
            .collect()
    };
    let total: f64 = normalized.iter().sum();

    for (w, n) in book.values_mut().zip(normalized) {
        w.weight = n / total * WEIGHT_TOTAL;
    }
    debug!(
        weights = ?book.iter().map(|(k, w)| (k.as_str(), (w.weight * 100.0).round() / 100.0)).collect::<Vec<_>>(),
        "weights recomputed"
    );
}
