//! Per-timeframe analysis

use std::collections::BTreeSet;
use tracing::debug;

use super::detectors;
use crate::indicators::{self, Series};
use crate::types::{
    Candle, DetectorOutputs, Divergence, Timeframe, TimeframeScore, Trend, ValuePosition,
    VolumePoint,
};

/// Confidence above which a timeframe reads bullish
pub const BULLISH_THRESHOLD: f64 = 60.0;
/// Confidence below which a timeframe reads bearish
pub const BEARISH_THRESHOLD: f64 = 40.0;

const BASE_CONFIDENCE: f64 = 50.0;
/// Cap on the momentum contribution to the base confidence
const MOMENTUM_CAP: f64 = 10.0;

/// Analyzer tuning
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Below this many candles the analyzer returns "no opinion"
    pub min_series_len: usize,
    /// Fixed bonus per detected confluence tag
    pub tag_bonus: f64,
    pub phase_lookback: usize,
    pub swing_wing: usize,
    pub retracement_lookback: usize,
    pub profile_lookback: usize,
    pub rsi_period: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_series_len: 50,
            tag_bonus: 12.0,
            phase_lookback: 50,
            swing_wing: 2,
            retracement_lookback: 60,
            profile_lookback: 100,
            rsi_period: 14,
        }
    }
}

/// Runs the detector battery against one symbol/timeframe pair
#[derive(Debug, Clone, Default)]
pub struct TimeframeAnalyzer {
    config: AnalyzerConfig,
}

impl TimeframeAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn min_series_len(&self) -> usize {
        self.config.min_series_len
    }

    /// Score one timeframe. Short series produce a zero-confidence score
    /// flagged `insufficient_data` instead of an error.
    pub fn analyze(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
        volumes: &[VolumePoint],
    ) -> TimeframeScore {
        if candles.len() < self.config.min_series_len {
            debug!(
                symbol,
                timeframe = %timeframe,
                available = candles.len(),
                required = self.config.min_series_len,
                "insufficient data, no opinion"
            );
            return TimeframeScore::no_opinion(symbol, timeframe);
        }

        let mut series = Series::from_candles(candles);
        // Feeds without per-candle volume supply it as a separate series
        if series.volume.iter().all(|v| *v == 0.0) && volumes.len() >= series.len() {
            let vols = indicators::volumes(volumes);
            series.volume = vols[vols.len() - series.len()..].to_vec();
        }

        let outputs = DetectorOutputs {
            phase: detectors::detect_phase(&series, self.config.phase_lookback),
            structure_type: detectors::detect_structure_break(&series, self.config.swing_wing),
            fib_level: detectors::detect_retracement(&series, self.config.retracement_lookback),
            volume_profile: detectors::detect_volume_profile(
                &series,
                self.config.profile_lookback,
            ),
            rsi_divergence: detectors::detect_rsi_divergence(
                &series,
                self.config.rsi_period,
                self.config.swing_wing,
            ),
        };

        let tags = confluence_tags(&outputs);
        let votes = outputs.votes();

        let slope = indicators::normalized_slope(&series.close[series.len().saturating_sub(20)..]);
        let momentum = (slope * 1000.0).clamp(-MOMENTUM_CAP, MOMENTUM_CAP);
        let raw = BASE_CONFIDENCE
            + momentum
            + votes
                .iter()
                .map(|(_, trend)| trend.sign() * self.config.tag_bonus)
                .sum::<f64>();

        let confidence =
            (BASE_CONFIDENCE + (raw - BASE_CONFIDENCE) * timeframe.importance()).clamp(0.0, 100.0);
        let trend = trend_for(confidence);

        debug!(
            symbol,
            timeframe = %timeframe,
            confidence = format!("{:.1}", confidence),
            trend = trend.as_str(),
            tags = ?tags,
            "timeframe analyzed"
        );

        TimeframeScore {
            symbol: symbol.to_string(),
            timeframe,
            confidence,
            trend,
            confluence_tags: tags,
            detector_outputs: outputs,
            insufficient_data: false,
        }
    }
}

/// Map a directional confidence onto a trend
pub fn trend_for(confidence: f64) -> Trend {
    if confidence > BULLISH_THRESHOLD {
        Trend::Bullish
    } else if confidence < BEARISH_THRESHOLD {
        Trend::Bearish
    } else {
        Trend::Neutral
    }
}

fn confluence_tags(outputs: &DetectorOutputs) -> BTreeSet<String> {
    let mut tags = BTreeSet::new();
    if let Some(method) = outputs.phase.and_then(|p| p.method()) {
        tags.insert(method.to_string());
    }
    if let Some(structure) = outputs.structure_type {
        tags.insert(structure.tag().to_string());
    }
    if let Some(fib) = outputs.fib_level {
        tags.insert(format!("fib-{}", (fib.ratio * 1000.0).round() as u32));
    }
    if let Some(profile) = outputs.volume_profile {
        if profile.bias != Trend::Neutral {
            let side = match profile.position {
                ValuePosition::Above => "above",
                ValuePosition::Below => "below",
                ValuePosition::At => "at",
            };
            tags.insert(format!("value-{}-poc", side));
        }
    }
    if let Some(divergence) = outputs.rsi_divergence {
        tags.insert(
            match divergence {
                Divergence::Bullish => "rsi-divergence-bullish",
                Divergence::Bearish => "rsi-divergence-bearish",
            }
            .to_string(),
        );
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn candles(closes: &[f64]) -> Vec<Candle> {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut prev = closes[0];
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let candle = Candle {
                    timestamp: start + Duration::hours(i as i64),
                    open: Decimal::from_f64_retain(prev).unwrap(),
                    high: Decimal::from_f64_retain(c + 0.5).unwrap(),
                    low: Decimal::from_f64_retain(c - 0.5).unwrap(),
                    close: Decimal::from_f64_retain(c).unwrap(),
                    volume: Decimal::from(1000),
                };
                prev = c;
                candle
            })
            .collect()
    }

    #[test]
    fn test_short_series_is_no_opinion() {
        let analyzer = TimeframeAnalyzer::default();
        let score = analyzer.analyze("BTC", Timeframe::Hour1, &candles(&[100.0; 10]), &[]);

        assert!(score.insufficient_data);
        assert_eq!(score.confidence, 0.0);
        assert_eq!(score.trend, Trend::Neutral);
    }

    #[test]
    fn test_rising_market_reads_bullish() {
        let closes: Vec<f64> = (0..80).map(|i| 100.0 + i as f64).collect();
        let analyzer = TimeframeAnalyzer::default();
        let score = analyzer.analyze("BTC", Timeframe::Day1, &candles(&closes), &[]);

        assert!(!score.insufficient_data);
        assert!(score.confidence > BULLISH_THRESHOLD, "confidence {}", score.confidence);
        assert_eq!(score.trend, Trend::Bullish);
        assert!(score.confluence_tags.contains("wyckoff-accumulation"));
    }

    #[test]
    fn test_falling_market_reads_bearish() {
        let closes: Vec<f64> = (0..80).map(|i| 300.0 - i as f64).collect();
        let analyzer = TimeframeAnalyzer::default();
        let score = analyzer.analyze("BTC", Timeframe::Hour4, &candles(&closes), &[]);

        assert!(score.confidence < BEARISH_THRESHOLD, "confidence {}", score.confidence);
        assert_eq!(score.trend, Trend::Bearish);
    }

    #[test]
    fn test_confidence_clamped() {
        let closes: Vec<f64> = (0..120).map(|i| 100.0 * 1.05_f64.powi(i)).collect();
        let analyzer = TimeframeAnalyzer::default();
        let score = analyzer.analyze("BTC", Timeframe::Week1, &candles(&closes), &[]);
        assert!((0.0..=100.0).contains(&score.confidence));
    }

    #[test]
    fn test_trend_thresholds() {
        assert_eq!(trend_for(60.1), Trend::Bullish);
        assert_eq!(trend_for(60.0), Trend::Neutral);
        assert_eq!(trend_for(40.0), Trend::Neutral);
        assert_eq!(trend_for(39.9), Trend::Bearish);
    }
}
