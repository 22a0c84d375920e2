//! Stop/target planning and admission control
//!
//! The validator is the last gate before emission. It never adjusts a
//! candidate; anything that fails a rule becomes a [`RejectionRecord`].

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::indicators::to_f64;
use crate::types::{
    Action, EmittedSignal, PressureZone, RejectionReason, RejectionRecord, SignalCandidate,
    StopRule,
};

/// Stop distance in ATRs
pub fn stop_atr_multiple() -> Decimal {
    Decimal::new(15, 1)
}

/// Target distance in ATRs
pub fn target_atr_multiple() -> Decimal {
    Decimal::from(3)
}

/// Buffer beyond a psychological level when the stop hides behind it
pub fn level_buffer_atr_multiple() -> Decimal {
    Decimal::new(25, 2)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelPlan {
    pub stop: Decimal,
    pub target: Decimal,
    pub rule: StopRule,
}

/// Place stop and target around `entry`.
///
/// Default is the ATR rule. When the pressure zone's psychological level
/// sits between entry and the ATR stop, the stop moves just beyond that level.
pub fn plan_levels(
    action: Action,
    entry: Decimal,
    atr: Decimal,
    zone: Option<&PressureZone>,
) -> LevelPlan {
    let stop_distance = atr * stop_atr_multiple();
    let target_distance = atr * target_atr_multiple();
    let buffer = atr * level_buffer_atr_multiple();

    let (atr_stop, target) = match action {
        Action::Buy => (entry - stop_distance, entry + target_distance),
        Action::Sell => (entry + stop_distance, entry - target_distance),
    };

    let level = zone
        .filter(|z| z.psychological_level > 0.0)
        .and_then(|z| Decimal::from_f64(z.psychological_level));

    let level_stop = level.and_then(|level| match action {
        Action::Buy if level > atr_stop && level < entry => Some(level - buffer),
        Action::Sell if level < atr_stop && level > entry => Some(level + buffer),
        _ => None,
    });

    match level_stop {
        Some(stop) => LevelPlan {
            stop,
            target,
            rule: StopRule::PressureZone,
        },
        None => LevelPlan {
            stop: atr_stop,
            target,
            rule: StopRule::AtrMultiple,
        },
    }
}

/// |target - entry| / |entry - stop|; `None` when entry equals stop
pub fn risk_reward(entry: Decimal, stop: Decimal, target: Decimal) -> Option<Decimal> {
    let risk = (entry - stop).abs();
    if risk.is_zero() {
        return None;
    }
    Some((target - entry).abs() / risk)
}

/// BUY: stop < entry < target. SELL: target < entry < stop.
pub fn ordering_holds(action: Action, entry: Decimal, stop: Decimal, target: Decimal) -> bool {
    match action {
        Action::Buy => stop < entry && entry < target,
        Action::Sell => target < entry && entry < stop,
    }
}

/// Validation result
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted(EmittedSignal),
    Rejected(RejectionRecord),
}

#[derive(Debug, Clone)]
pub struct RiskValidator {
    min_rr: f64,
    min_elite_confidence: f64,
}

impl Default for RiskValidator {
    fn default() -> Self {
        Self::new(1.8, 70.0)
    }
}

impl RiskValidator {
    pub fn new(min_rr: f64, min_elite_confidence: f64) -> Self {
        Self {
            min_rr,
            min_elite_confidence,
        }
    }

    pub fn min_rr(&self) -> f64 {
        self.min_rr
    }

    /// Check ordering, then risk/reward, then confidence
    pub fn validate(&self, candidate: &SignalCandidate, now: DateTime<Utc>) -> Verdict {
        let reject = |reason: RejectionReason, measured: f64, threshold: f64| {
            warn!(
                symbol = %candidate.symbol,
                action = %candidate.action,
                reason = %reason,
                measured = format!("{:.4}", measured),
                threshold = format!("{:.4}", threshold),
                "candidate rejected"
            );
            Verdict::Rejected(RejectionRecord {
                symbol: candidate.symbol.clone(),
                reason,
                measured,
                threshold,
                action: Some(candidate.action),
                timestamp: now,
            })
        };

        if !ordering_holds(
            candidate.action,
            candidate.entry,
            candidate.stop_loss,
            candidate.target_price,
        ) {
            return reject(RejectionReason::InvalidOrdering, 0.0, 0.0);
        }

        // Recomputed from the prices; the candidate's own figure is not trusted
        let rr = risk_reward(candidate.entry, candidate.stop_loss, candidate.target_price)
            .map(to_f64)
            .unwrap_or(0.0);
        if rr < self.min_rr {
            return reject(RejectionReason::PoorRiskReward, rr, self.min_rr);
        }

        if candidate.composite_confidence < self.min_elite_confidence {
            return reject(
                RejectionReason::LowConfidence,
                candidate.composite_confidence,
                self.min_elite_confidence,
            );
        }

        let mut accepted = candidate.clone();
        accepted.risk_reward_ratio = rr;
        let signal = EmittedSignal {
            id: Uuid::new_v4(),
            candidate: accepted,
            emitted_at: now,
        };
        debug!(
            signal_id = %signal.id,
            symbol = %signal.candidate.symbol,
            rr = format!("{:.2}", rr),
            "candidate accepted"
        );
        Verdict::Accepted(signal)
    }
}
