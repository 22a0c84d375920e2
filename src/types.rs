//! Core domain types
//!
//! Every value flowing through decide -> validate -> emit -> learn is one of the
//! closed types below. Prices are `Decimal`; scores and statistics are `f64`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Analysis method names. Detector families map onto these, and the learning
/// engine keeps one weight per entry.
pub mod methods {
    pub const WYCKOFF_ACCUMULATION: &str = "wyckoff-accumulation";
    pub const WYCKOFF_DISTRIBUTION: &str = "wyckoff-distribution";
    pub const MARKET_STRUCTURE: &str = "market-structure";
    pub const FIBONACCI_RETRACEMENT: &str = "fibonacci-retracement";
    pub const VOLUME_PROFILE: &str = "volume-profile";
    pub const RSI_DIVERGENCE: &str = "rsi-divergence";
    pub const EMOTIONAL_PRESSURE: &str = "emotional-pressure";
    pub const TIMEFRAME_ALIGNMENT: &str = "multi-timeframe-alignment";

    pub const ALL: &[&str] = &[
        WYCKOFF_ACCUMULATION,
        WYCKOFF_DISTRIBUTION,
        MARKET_STRUCTURE,
        FIBONACCI_RETRACEMENT,
        VOLUME_PROFILE,
        RSI_DIVERGENCE,
        EMOTIONAL_PRESSURE,
        TIMEFRAME_ALIGNMENT,
    ];
}

/// OHLCV candle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Standalone volume observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumePoint {
    pub timestamp: DateTime<Utc>,
    pub volume: Decimal,
}

/// Supported analysis timeframes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "1h")]
    Hour1,
    #[serde(rename = "4h")]
    Hour4,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1w")]
    Week1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::Minute5,
        Timeframe::Minute15,
        Timeframe::Hour1,
        Timeframe::Hour4,
        Timeframe::Day1,
        Timeframe::Week1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::Minute5 => "5m",
            Timeframe::Minute15 => "15m",
            Timeframe::Hour1 => "1h",
            Timeframe::Hour4 => "4h",
            Timeframe::Day1 => "1d",
            Timeframe::Week1 => "1w",
        }
    }

    pub fn to_seconds(&self) -> i64 {
        match self {
            Timeframe::Minute5 => 300,
            Timeframe::Minute15 => 900,
            Timeframe::Hour1 => 3600,
            Timeframe::Hour4 => 14400,
            Timeframe::Day1 => 86400,
            Timeframe::Week1 => 604800,
        }
    }

    /// Importance weight; longer timeframes weigh more
    pub fn importance(&self) -> f64 {
        match self {
            Timeframe::Minute5 => 0.60,
            Timeframe::Minute15 => 0.70,
            Timeframe::Hour1 => 0.85,
            Timeframe::Hour4 => 1.00,
            Timeframe::Day1 => 1.15,
            Timeframe::Week1 => 1.30,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::ALL
            .iter()
            .copied()
            .find(|tf| tf.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown timeframe: {}", s))
    }
}

/// Directional opinion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Bullish,
    Bearish,
    Neutral,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trend::Bullish => "bullish",
            Trend::Bearish => "bearish",
            Trend::Neutral => "neutral",
        }
    }

    /// +1 for bullish, -1 for bearish, 0 otherwise
    pub fn sign(&self) -> f64 {
        match self {
            Trend::Bullish => 1.0,
            Trend::Bearish => -1.0,
            Trend::Neutral => 0.0,
        }
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
        }
    }

    pub fn trend(&self) -> Trend {
        match self {
            Action::Buy => Trend::Bullish,
            Action::Sell => Trend::Bearish,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Market cycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Accumulation,
    Markup,
    Distribution,
    Markdown,
    Ranging,
}

impl Phase {
    pub fn bias(&self) -> Trend {
        match self {
            Phase::Accumulation | Phase::Markup => Trend::Bullish,
            Phase::Distribution | Phase::Markdown => Trend::Bearish,
            Phase::Ranging => Trend::Neutral,
        }
    }

    pub fn method(&self) -> Option<&'static str> {
        match self.bias() {
            Trend::Bullish => Some(methods::WYCKOFF_ACCUMULATION),
            Trend::Bearish => Some(methods::WYCKOFF_DISTRIBUTION),
            Trend::Neutral => None,
        }
    }
}

/// Swing structure event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureType {
    BreakOfStructureUp,
    BreakOfStructureDown,
    ChangeOfCharacterUp,
    ChangeOfCharacterDown,
}

impl StructureType {
    pub fn bias(&self) -> Trend {
        match self {
            StructureType::BreakOfStructureUp | StructureType::ChangeOfCharacterUp => {
                Trend::Bullish
            }
            StructureType::BreakOfStructureDown | StructureType::ChangeOfCharacterDown => {
                Trend::Bearish
            }
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            StructureType::BreakOfStructureUp => "bos-up",
            StructureType::BreakOfStructureDown => "bos-down",
            StructureType::ChangeOfCharacterUp => "choch-up",
            StructureType::ChangeOfCharacterDown => "choch-down",
        }
    }
}

/// Price sitting on a retracement level of the last impulse leg
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FibLevel {
    /// Retracement ratio (0.382, 0.5, 0.618, 0.786)
    pub ratio: f64,
    pub price: f64,
    pub bias: Trend,
}

/// Where price sits relative to the point of control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValuePosition {
    Above,
    Below,
    At,
}

/// Volume-at-price summary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeProfile {
    pub point_of_control: f64,
    /// Share of total volume traded in the node around price, normalised to [0, 1]
    pub node_strength: f64,
    pub position: ValuePosition,
    pub bias: Trend,
}

/// Price/RSI divergence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Divergence {
    Bullish,
    Bearish,
}

impl Divergence {
    pub fn bias(&self) -> Trend {
        match self {
            Divergence::Bullish => Trend::Bullish,
            Divergence::Bearish => Trend::Bearish,
        }
    }
}

/// Named optional detector outputs of one timeframe analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorOutputs {
    pub phase: Option<Phase>,
    pub structure_type: Option<StructureType>,
    pub fib_level: Option<FibLevel>,
    pub volume_profile: Option<VolumeProfile>,
    pub rsi_divergence: Option<Divergence>,
}

impl DetectorOutputs {
    /// Directional votes per detector family, skipping neutral outputs
    pub fn votes(&self) -> Vec<(&'static str, Trend)> {
        let mut votes = Vec::new();
        if let Some(phase) = self.phase {
            if let Some(method) = phase.method() {
                votes.push((method, phase.bias()));
            }
        }
        if let Some(structure) = self.structure_type {
            votes.push((methods::MARKET_STRUCTURE, structure.bias()));
        }
        if let Some(fib) = self.fib_level {
            if fib.bias != Trend::Neutral {
                votes.push((methods::FIBONACCI_RETRACEMENT, fib.bias));
            }
        }
        if let Some(profile) = self.volume_profile {
            if profile.bias != Trend::Neutral {
                votes.push((methods::VOLUME_PROFILE, profile.bias));
            }
        }
        if let Some(divergence) = self.rsi_divergence {
            votes.push((methods::RSI_DIVERGENCE, divergence.bias()));
        }
        votes
    }
}

/// Per-timeframe analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeScore {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Directional score: >60 bullish, <40 bearish
    pub confidence: f64,
    pub trend: Trend,
    pub confluence_tags: BTreeSet<String>,
    pub detector_outputs: DetectorOutputs,
    /// Series was too short; the score carries no opinion
    pub insufficient_data: bool,
}

impl TimeframeScore {
    pub fn no_opinion(symbol: &str, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.to_string(),
            timeframe,
            confidence: 0.0,
            trend: Trend::Neutral,
            confluence_tags: BTreeSet::new(),
            detector_outputs: DetectorOutputs::default(),
            insufficient_data: true,
        }
    }

    /// Conviction in a given direction on the 0-100 scale
    pub fn conviction(&self, action: Action) -> f64 {
        match action {
            Action::Buy => self.confidence,
            Action::Sell => 100.0 - self.confidence,
        }
    }
}

/// Pressure bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    Low,
    Medium,
    High,
    Extreme,
}

impl PressureLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            PressureLevel::Extreme
        } else if score >= 65.0 {
            PressureLevel::High
        } else if score >= 40.0 {
            PressureLevel::Medium
        } else {
            PressureLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PressureLevel::Low => "low",
            PressureLevel::Medium => "medium",
            PressureLevel::High => "high",
            PressureLevel::Extreme => "extreme",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeContext {
    pub surge: bool,
    pub dry_up: bool,
    pub absorption: bool,
}

/// Rejection candle printed near the psychological level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandleBehavior {
    BullishRejection,
    BearishRejection,
}

impl CandleBehavior {
    pub fn bias(&self) -> Trend {
        match self {
            CandleBehavior::BullishRejection => Trend::Bullish,
            CandleBehavior::BearishRejection => Trend::Bearish,
        }
    }
}

/// Emotional pressure around one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureZone {
    pub symbol: String,
    pub pressure_level: PressureLevel,
    pub score: f64,
    pub psychological_level: f64,
    pub resistance_strength: f64,
    pub support_strength: f64,
    pub volume_context: VolumeContext,
    pub candle_behavior: Option<CandleBehavior>,
}

impl PressureZone {
    /// Zone with no pressure at all (empty or unusable series)
    pub fn calm(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            pressure_level: PressureLevel::Low,
            score: 0.0,
            psychological_level: 0.0,
            resistance_strength: 0.0,
            support_strength: 0.0,
            volume_context: VolumeContext::default(),
            candle_behavior: None,
        }
    }
}

/// Learned weight and running performance of one analysis method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodWeight {
    pub method_name: String,
    pub weight: f64,
    pub success_rate: f64,
    pub total_signals: u32,
    #[serde(default)]
    pub wins: u32,
    /// Mean winning return, percent
    pub avg_profit: f64,
    /// Mean losing return magnitude, percent
    pub avg_loss: f64,
    #[serde(default)]
    pub sharpe_ratio: f64,
    /// Peak-to-trough of cumulative returns, percentage points
    pub max_drawdown: f64,
    #[serde(default)]
    pub sum_returns: f64,
    #[serde(default)]
    pub sum_sq_returns: f64,
    #[serde(default)]
    pub cumulative_return: f64,
    #[serde(default)]
    pub peak_cumulative_return: f64,
    /// Most recent realized returns, oldest first
    #[serde(default)]
    pub recent_returns: Vec<f64>,
    pub last_updated: DateTime<Utc>,
}

impl MethodWeight {
    pub fn new(method_name: &str, weight: f64) -> Self {
        Self {
            method_name: method_name.to_string(),
            weight,
            success_rate: 0.0,
            total_signals: 0,
            wins: 0,
            avg_profit: 0.0,
            avg_loss: 0.0,
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
            sum_returns: 0.0,
            sum_sq_returns: 0.0,
            cumulative_return: 0.0,
            peak_cumulative_return: 0.0,
            recent_returns: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn losses(&self) -> u32 {
        self.total_signals.saturating_sub(self.wins)
    }
}

/// How the stop was placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopRule {
    AtrMultiple,
    PressureZone,
}

/// Composite decision awaiting risk validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalCandidate {
    pub symbol: String,
    pub action: Action,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub target_price: Decimal,
    pub composite_confidence: f64,
    pub risk_reward_ratio: f64,
    pub confluences: BTreeSet<String>,
    pub contributing_methods: BTreeSet<String>,
    pub atr: Decimal,
    pub stop_rule: StopRule,
    pub timestamp: DateTime<Utc>,
}

/// Accepted decision; immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedSignal {
    pub id: Uuid,
    #[serde(flatten)]
    pub candidate: SignalCandidate,
    pub emitted_at: DateTime<Utc>,
}

impl EmittedSignal {
    pub fn symbol(&self) -> &str {
        &self.candidate.symbol
    }

    pub fn action(&self) -> Action {
        self.candidate.action
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Pending,
    Win,
    Loss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TargetHit,
    StopLoss,
    Expired,
    Manual,
}

/// Result of an emitted signal; pending until the trade closes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalOutcome {
    pub signal_id: Uuid,
    pub exit_price: Option<Decimal>,
    pub exit_reason: Option<ExitReason>,
    pub profit_percent: Option<f64>,
    pub outcome: OutcomeStatus,
    pub closed_at: Option<DateTime<Utc>>,
}

impl SignalOutcome {
    pub fn pending(signal_id: Uuid) -> Self {
        Self {
            signal_id,
            exit_price: None,
            exit_reason: None,
            profit_percent: None,
            outcome: OutcomeStatus::Pending,
            closed_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.outcome == OutcomeStatus::Pending
    }
}

/// Rejection reason codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionReason {
    InvalidOrdering,
    PoorRiskReward,
    LowConfidence,
    DirectionConflict,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::InvalidOrdering => "invalid-ordering",
            RejectionReason::PoorRiskReward => "poor-risk-reward",
            RejectionReason::LowConfidence => "low-confidence",
            RejectionReason::DirectionConflict => "direction-conflict",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only record of a refused decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub symbol: String,
    pub reason: RejectionReason,
    pub measured: f64,
    pub threshold: f64,
    pub action: Option<Action>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeframe_parse_and_importance() {
        assert_eq!("4h".parse::<Timeframe>().unwrap(), Timeframe::Hour4);
        assert_eq!(" 1D ".parse::<Timeframe>().unwrap(), Timeframe::Day1);
        assert!("2h".parse::<Timeframe>().is_err());

        // Longer timeframes weigh more
        for pair in Timeframe::ALL.windows(2) {
            assert!(pair[0].importance() < pair[1].importance());
        }
    }

    #[test]
    fn test_pressure_level_buckets() {
        assert_eq!(PressureLevel::from_score(80.0), PressureLevel::Extreme);
        assert_eq!(PressureLevel::from_score(79.9), PressureLevel::High);
        assert_eq!(PressureLevel::from_score(65.0), PressureLevel::High);
        assert_eq!(PressureLevel::from_score(40.0), PressureLevel::Medium);
        assert_eq!(PressureLevel::from_score(39.9), PressureLevel::Low);
    }

    #[test]
    fn test_detector_votes_skip_neutral() {
        let outputs = DetectorOutputs {
            phase: Some(Phase::Ranging),
            structure_type: Some(StructureType::BreakOfStructureUp),
            fib_level: Some(FibLevel {
                ratio: 0.618,
                price: 100.0,
                bias: Trend::Neutral,
            }),
            volume_profile: None,
            rsi_divergence: Some(Divergence::Bearish),
        };

        let votes = outputs.votes();
        assert_eq!(
            votes,
            vec![
                (methods::MARKET_STRUCTURE, Trend::Bullish),
                (methods::RSI_DIVERGENCE, Trend::Bearish),
            ]
        );
    }

    #[test]
    fn test_rejection_reason_codes() {
        let json = serde_json::to_string(&RejectionReason::PoorRiskReward).unwrap();
        assert_eq!(json, "\"poor-risk-reward\"");
        assert_eq!(RejectionReason::InvalidOrdering.to_string(), "invalid-ordering");
    }
}
