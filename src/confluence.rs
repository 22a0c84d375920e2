//! Confluence aggregation
//!
//! Folds the per-timeframe scores, the pressure zone, fundamentals and the
//! learned method weights into one directional decision. Pure: identical
//! inputs give identical output, the timestamp included.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use crate::indicators::to_f64;
use crate::risk::{plan_levels, risk_reward};
use crate::types::{
    methods, Action, MethodWeight, PressureLevel, PressureZone, RejectionReason, RejectionRecord,
    SignalCandidate, TimeframeScore, Trend,
};

pub const HIGH_CONFIDENCE_CLUSTER: &str = "high-confidence-cluster";
pub const FUNDAMENTAL_CATALYST: &str = "fundamental-catalyst";

#[derive(Debug, Clone)]
pub struct ConfluenceConfig {
    pub min_confluences: usize,
    /// Opposing sentiment above this turns a setup into a direction conflict
    pub sentiment_conflict_threshold: f64,
    pub alignment_min_timeframes: usize,
    pub cluster_min_timeframes: usize,
    pub cluster_min_conviction: f64,
    pub family_min_timeframes: usize,
    pub catalyst_min_boost: f64,
    pub max_composite: f64,
}

impl Default for ConfluenceConfig {
    fn default() -> Self {
        Self {
            min_confluences: 3,
            sentiment_conflict_threshold: 70.0,
            alignment_min_timeframes: 4,
            cluster_min_timeframes: 3,
            cluster_min_conviction: 80.0,
            family_min_timeframes: 2,
            catalyst_min_boost: 5.0,
            max_composite: 95.0,
        }
    }
}

/// Everything one aggregation looks at
#[derive(Debug, Clone)]
pub struct ConfluenceInputs<'a> {
    pub symbol: &'a str,
    pub scores: &'a [TimeframeScore],
    pub pressure: &'a PressureZone,
    pub fundamental_boost: f64,
    /// External sentiment on 0-100 (50 neutral); `None` when unavailable
    pub sentiment: Option<f64>,
    pub weights: &'a [MethodWeight],
    pub entry: Decimal,
    pub atr: Decimal,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateOutcome {
    Candidate(SignalCandidate),
    /// Not enough independent agreement for a setup
    NoSetup { confluences: usize, required: usize },
    /// Technical majority contradicts strong external sentiment
    Conflict(RejectionRecord),
}

#[derive(Debug, Clone, Default)]
pub struct ConfluenceAggregator {
    config: ConfluenceConfig,
}

impl ConfluenceAggregator {
    pub fn new(config: ConfluenceConfig) -> Self {
        Self { config }
    }

    pub fn aggregate(&self, inputs: &ConfluenceInputs<'_>) -> AggregateOutcome {
        let cfg = &self.config;
        let usable: Vec<&TimeframeScore> = inputs
            .scores
            .iter()
            .filter(|s| !s.insufficient_data)
            .collect();

        let bulls = usable.iter().filter(|s| s.trend == Trend::Bullish).count();
        let bears = usable.iter().filter(|s| s.trend == Trend::Bearish).count();
        let action = match bulls.cmp(&bears) {
            std::cmp::Ordering::Greater => Action::Buy,
            std::cmp::Ordering::Less => Action::Sell,
            std::cmp::Ordering::Equal => {
                debug!(symbol = inputs.symbol, bulls, bears, "no directional majority");
                return AggregateOutcome::NoSetup {
                    confluences: 0,
                    required: cfg.min_confluences,
                };
            }
        };
        let direction = action.trend();
        let agreeing: Vec<&TimeframeScore> = usable
            .iter()
            .copied()
            .filter(|s| s.trend == direction)
            .collect();

        let mut confluences = BTreeSet::new();
        let mut contributing = BTreeSet::new();

        if agreeing.len() >= cfg.alignment_min_timeframes {
            confluences.insert(methods::TIMEFRAME_ALIGNMENT.to_string());
            contributing.insert(methods::TIMEFRAME_ALIGNMENT.to_string());
        }

        let strong = agreeing
            .iter()
            .filter(|s| s.conviction(action) > cfg.cluster_min_conviction)
            .count();
        if strong >= cfg.cluster_min_timeframes {
            confluences.insert(HIGH_CONFIDENCE_CLUSTER.to_string());
        }

        let mut families: BTreeMap<&'static str, usize> = BTreeMap::new();
        for score in &agreeing {
            for (method, trend) in score.detector_outputs.votes() {
                if trend == direction {
                    *families.entry(method).or_default() += 1;
                }
            }
        }
        for (method, count) in &families {
            if *count >= cfg.family_min_timeframes {
                confluences.insert(method.to_string());
                contributing.insert(method.to_string());
            }
        }

        let opposing_candle = inputs
            .pressure
            .candle_behavior
            .map(|c| c.bias() == opposite(direction))
            .unwrap_or(false);
        if inputs.pressure.pressure_level >= PressureLevel::High && !opposing_candle {
            confluences.insert(methods::EMOTIONAL_PRESSURE.to_string());
            contributing.insert(methods::EMOTIONAL_PRESSURE.to_string());
        }

        if inputs.fundamental_boost >= cfg.catalyst_min_boost {
            confluences.insert(FUNDAMENTAL_CATALYST.to_string());
        }

        if confluences.len() < cfg.min_confluences {
            debug!(
                symbol = inputs.symbol,
                action = %action,
                confluences = confluences.len(),
                required = cfg.min_confluences,
                "insufficient confluences"
            );
            return AggregateOutcome::NoSetup {
                confluences: confluences.len(),
                required: cfg.min_confluences,
            };
        }

        if let Some(sentiment) = inputs.sentiment {
            let opposing = match action {
                Action::Buy => 100.0 - sentiment,
                Action::Sell => sentiment,
            };
            if opposing > cfg.sentiment_conflict_threshold {
                info!(
                    symbol = inputs.symbol,
                    action = %action,
                    sentiment,
                    threshold = cfg.sentiment_conflict_threshold,
                    "direction conflict with external sentiment"
                );
                return AggregateOutcome::Conflict(RejectionRecord {
                    symbol: inputs.symbol.to_string(),
                    reason: RejectionReason::DirectionConflict,
                    measured: opposing,
                    threshold: cfg.sentiment_conflict_threshold,
                    action: Some(action),
                    timestamp: inputs.now,
                });
            }
        }

        let composite = (self.weighted_conviction(&usable, action, inputs.weights)
            + inputs.fundamental_boost
            + pressure_bonus(inputs.pressure.pressure_level))
        .clamp(0.0, cfg.max_composite);

        let plan = plan_levels(action, inputs.entry, inputs.atr, Some(inputs.pressure));
        let rr = risk_reward(inputs.entry, plan.stop, plan.target)
            .map(to_f64)
            .unwrap_or(0.0);

        debug!(
            symbol = inputs.symbol,
            action = %action,
            composite = format!("{:.1}", composite),
            confluences = ?confluences,
            rr = format!("{:.2}", rr),
            "candidate assembled"
        );

        AggregateOutcome::Candidate(SignalCandidate {
            symbol: inputs.symbol.to_string(),
            action,
            entry: inputs.entry,
            stop_loss: plan.stop,
            target_price: plan.target,
            composite_confidence: composite,
            risk_reward_ratio: rr,
            confluences,
            contributing_methods: contributing,
            atr: inputs.atr,
            stop_rule: plan.rule,
            timestamp: inputs.now,
        })
    }

    /// Mean conviction in `action`, each timeframe weighted by its importance
    /// times the learned factor of the methods that voted with it.
    fn weighted_conviction(
        &self,
        scores: &[&TimeframeScore],
        action: Action,
        weights: &[MethodWeight],
    ) -> f64 {
        let neutral = if weights.is_empty() {
            0.0
        } else {
            100.0 / weights.len() as f64
        };
        let lookup: BTreeMap<&str, f64> = weights
            .iter()
            .map(|w| (w.method_name.as_str(), w.weight))
            .collect();

        let mut total = 0.0;
        let mut weight_sum = 0.0;
        for score in scores {
            let learned: Vec<f64> = score
                .detector_outputs
                .votes()
                .into_iter()
                .filter(|(_, trend)| *trend == action.trend())
                .filter_map(|(method, _)| lookup.get(method).copied())
                .collect();
            let factor = if learned.is_empty() || neutral == 0.0 {
                1.0
            } else {
                learned.iter().sum::<f64>() / learned.len() as f64 / neutral
            };
            let w = score.timeframe.importance() * factor;
            total += score.conviction(action) * w;
            weight_sum += w;
        }
        if weight_sum > 0.0 {
            total / weight_sum
        } else {
            0.0
        }
    }
}

fn opposite(trend: Trend) -> Trend {
    match trend {
        Trend::Bullish => Trend::Bearish,
        Trend::Bearish => Trend::Bullish,
        Trend::Neutral => Trend::Neutral,
    }
}

fn pressure_bonus(level: PressureLevel) -> f64 {
    match level {
        PressureLevel::Extreme => 8.0,
        PressureLevel::High => 5.0,
        PressureLevel::Medium => 2.0,
        PressureLevel::Low => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        CandleBehavior, DetectorOutputs, Divergence, Phase, StructureType, Timeframe, VolumeContext,
    };
    use chrono::TimeZone;

    fn score(tf: Timeframe, confidence: f64, trend: Trend) -> TimeframeScore {
        TimeframeScore {
            symbol: "BTC".to_string(),
            timeframe: tf,
            confidence,
            trend,
            confluence_tags: BTreeSet::new(),
            detector_outputs: DetectorOutputs::default(),
            insufficient_data: false,
        }
    }

    fn zone(level: PressureLevel) -> PressureZone {
        PressureZone {
            symbol: "BTC".to_string(),
            pressure_level: level,
            score: 70.0,
            psychological_level: 0.0,
            resistance_strength: 0.0,
            support_strength: 0.0,
            volume_context: VolumeContext::default(),
            candle_behavior: None,
        }
    }

    fn uniform_weights() -> Vec<MethodWeight> {
        let share = 100.0 / methods::ALL.len() as f64;
        methods::ALL.iter().map(|m| MethodWeight::new(m, share)).collect()
    }

    fn inputs<'a>(
        scores: &'a [TimeframeScore],
        pressure: &'a PressureZone,
        weights: &'a [MethodWeight],
        boost: f64,
        sentiment: Option<f64>,
    ) -> ConfluenceInputs<'a> {
        ConfluenceInputs {
            symbol: "BTC",
            scores,
            pressure,
            fundamental_boost: boost,
            sentiment,
            weights,
            entry: Decimal::from(100),
            atr: Decimal::from(2),
            now: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_full_bullish_alignment_produces_candidate() {
        let scores: Vec<_> = Timeframe::ALL
            .iter()
            .map(|tf| score(*tf, 85.0, Trend::Bullish))
            .collect();
        let pressure = zone(PressureLevel::High);
        let weights = uniform_weights();

        let outcome = ConfluenceAggregator::default()
            .aggregate(&inputs(&scores, &pressure, &weights, 10.0, None));
        let AggregateOutcome::Candidate(candidate) = outcome else {
            panic!("expected candidate, got {:?}", outcome);
        };
        assert_eq!(candidate.action, Action::Buy);
        assert!(candidate.confluences.len() >= 3);
        assert!(candidate.composite_confidence >= 75.0);
        assert!(candidate.composite_confidence <= 95.0);
        assert!(candidate.stop_loss < candidate.entry && candidate.entry < candidate.target_price);
    }

    #[test]
    fn test_six_equal_weights_full_alignment() {
        let scores: Vec<_> = Timeframe::ALL
            .iter()
            .map(|tf| {
                let mut s = score(*tf, 85.0, Trend::Bullish);
                s.detector_outputs = DetectorOutputs {
                    phase: Some(Phase::Markup),
                    structure_type: Some(StructureType::BreakOfStructureUp),
                    ..Default::default()
                };
                s
            })
            .collect();
        let pressure = zone(PressureLevel::High);
        let weights: Vec<_> = [
            methods::WYCKOFF_ACCUMULATION,
            methods::WYCKOFF_DISTRIBUTION,
            methods::MARKET_STRUCTURE,
            methods::FIBONACCI_RETRACEMENT,
            methods::VOLUME_PROFILE,
            methods::RSI_DIVERGENCE,
        ]
        .iter()
        .map(|m| MethodWeight::new(m, 100.0 / 6.0))
        .collect();

        let outcome = ConfluenceAggregator::default()
            .aggregate(&inputs(&scores, &pressure, &weights, 10.0, None));
        let AggregateOutcome::Candidate(candidate) = outcome else {
            panic!("expected candidate, got {:?}", outcome);
        };
        assert_eq!(candidate.action, Action::Buy);
        assert!(candidate.confluences.len() >= 3);
        assert!(candidate.composite_confidence >= 75.0);
    }

    #[test]
    fn test_two_of_six_bullish_is_no_setup() {
        let scores: Vec<_> = Timeframe::ALL
            .iter()
            .enumerate()
            .map(|(i, tf)| {
                if i < 2 {
                    score(*tf, 85.0, Trend::Bullish)
                } else {
                    score(*tf, 50.0, Trend::Neutral)
                }
            })
            .collect();
        let pressure = zone(PressureLevel::High);
        let weights = uniform_weights();

        let outcome = ConfluenceAggregator::default()
            .aggregate(&inputs(&scores, &pressure, &weights, 10.0, None));
        assert!(matches!(outcome, AggregateOutcome::NoSetup { required: 3, .. }));
    }

    #[test]
    fn test_tie_is_no_setup() {
        let scores = vec![
            score(Timeframe::Hour1, 85.0, Trend::Bullish),
            score(Timeframe::Hour4, 15.0, Trend::Bearish),
        ];
        let pressure = zone(PressureLevel::Extreme);
        let outcome =
            ConfluenceAggregator::default().aggregate(&inputs(&scores, &pressure, &[], 10.0, None));
        assert_eq!(
            outcome,
            AggregateOutcome::NoSetup {
                confluences: 0,
                required: 3
            }
        );
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let scores: Vec<_> = Timeframe::ALL
            .iter()
            .map(|tf| score(*tf, 15.0, Trend::Bearish))
            .collect();
        let pressure = zone(PressureLevel::Extreme);
        let weights = uniform_weights();
        let aggregator = ConfluenceAggregator::default();

        let first = aggregator.aggregate(&inputs(&scores, &pressure, &weights, 0.0, Some(40.0)));
        let second = aggregator.aggregate(&inputs(&scores, &pressure, &weights, 0.0, Some(40.0)));
        assert_eq!(first, second);
        assert!(matches!(first, AggregateOutcome::Candidate(ref c) if c.action == Action::Sell));
    }

    #[test]
    fn test_opposing_sentiment_is_direction_conflict() {
        let scores: Vec<_> = Timeframe::ALL
            .iter()
            .map(|tf| score(*tf, 85.0, Trend::Bullish))
            .collect();
        let pressure = zone(PressureLevel::High);

        let outcome = ConfluenceAggregator::default()
            .aggregate(&inputs(&scores, &pressure, &[], 10.0, Some(20.0)));
        let AggregateOutcome::Conflict(record) = outcome else {
            panic!("expected conflict, got {:?}", outcome);
        };
        assert_eq!(record.reason, RejectionReason::DirectionConflict);
        assert_eq!(record.measured, 80.0);
        assert_eq!(record.action, Some(Action::Buy));
    }

    #[test]
    fn test_opposing_candle_drops_pressure_confluence() {
        let scores: Vec<_> = Timeframe::ALL
            .iter()
            .map(|tf| score(*tf, 85.0, Trend::Bullish))
            .collect();
        let mut pressure = zone(PressureLevel::Extreme);
        pressure.candle_behavior = Some(CandleBehavior::BearishRejection);

        let outcome = ConfluenceAggregator::default()
            .aggregate(&inputs(&scores, &pressure, &[], 10.0, None));
        let AggregateOutcome::Candidate(candidate) = outcome else {
            panic!("expected candidate, got {:?}", outcome);
        };
        assert!(!candidate.confluences.contains(methods::EMOTIONAL_PRESSURE));
    }

    #[test]
    fn test_method_family_confluence_and_learned_weight() {
        let with_structure = |tf, confidence| {
            let mut s = score(tf, confidence, Trend::Bullish);
            s.detector_outputs = DetectorOutputs {
                phase: Some(Phase::Markup),
                structure_type: Some(StructureType::BreakOfStructureUp),
                rsi_divergence: Some(Divergence::Bullish),
                ..Default::default()
            };
            s
        };
        let scores = vec![
            with_structure(Timeframe::Hour1, 70.0),
            with_structure(Timeframe::Hour4, 90.0),
            score(Timeframe::Day1, 70.0, Trend::Bullish),
        ];
        let pressure = zone(PressureLevel::Low);

        let mut weights = uniform_weights();
        let outcome = ConfluenceAggregator::default()
            .aggregate(&inputs(&scores, &pressure, &weights, 0.0, None));
        let AggregateOutcome::Candidate(base) = outcome else {
            panic!("expected candidate, got {:?}", outcome);
        };
        assert!(base.confluences.contains(methods::MARKET_STRUCTURE));
        assert!(base.confluences.contains(methods::WYCKOFF_ACCUMULATION));
        assert!(base.contributing_methods.contains(methods::MARKET_STRUCTURE));

        // Doubling the weight of methods voting on the strongest timeframes lifts the composite
        for w in weights.iter_mut() {
            if w.method_name == methods::MARKET_STRUCTURE
                || w.method_name == methods::WYCKOFF_ACCUMULATION
            {
                w.weight *= 2.0;
            }
        }
        let outcome = ConfluenceAggregator::default()
            .aggregate(&inputs(&scores, &pressure, &weights, 0.0, None));
        let AggregateOutcome::Candidate(boosted) = outcome else {
            panic!("expected candidate, got {:?}", outcome);
        };
        assert!(boosted.composite_confidence > base.composite_confidence);
    }
}
