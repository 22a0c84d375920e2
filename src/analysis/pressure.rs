//! Emotional pressure zones
//!
//! Scores how much crowd pressure sits around the current price: distance to
//! a round number, recent volatility, abnormal volume and rejection candles.

use tracing::debug;

use crate::indicators::{self, Series};
use crate::types::{
    Candle, CandleBehavior, PressureLevel, PressureZone, VolumeContext, VolumePoint,
};

/// Reference per-bar volatility that counts as fully "emotional"
const VOLATILITY_REFERENCE: f64 = 0.02;
/// Half-step round numbers attract less attention than whole steps
const HALF_STEP_WEIGHT: f64 = 0.7;
const DRY_UP_RUN: usize = 5;

#[derive(Debug, Clone)]
pub struct PressureConfig {
    pub min_points: usize,
    pub trailing_window: usize,
    pub surge_multiple: f64,
    pub dry_up_multiple: f64,
    pub absorption_volume_multiple: f64,
    pub absorption_range_multiple: f64,
    /// Candles scanned for touches of the psychological level
    pub touch_lookback: usize,
}

impl Default for PressureConfig {
    fn default() -> Self {
        Self {
            min_points: 20,
            trailing_window: 20,
            surge_multiple: 2.5,
            dry_up_multiple: 0.6,
            absorption_volume_multiple: 1.5,
            absorption_range_multiple: 0.5,
            touch_lookback: 100,
        }
    }
}

/// Nearest round-number level and how close price sits to it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundLevel {
    pub level: f64,
    /// Half of the round-number step
    pub half_step: f64,
    /// 1.0 on the level, 0.0 at a quarter step away or further
    pub proximity: f64,
    pub whole_step: bool,
}

/// Locate the nearest round number. The step is one order of magnitude
/// below the price (100-999 -> 10, 1000-9999 -> 100) and half steps count.
pub fn round_level(price: f64) -> Option<RoundLevel> {
    if !price.is_finite() || price <= 0.0 {
        return None;
    }
    let step = 10f64.powf(price.log10().floor() - 1.0);
    let half_step = step / 2.0;
    let level = (price / half_step).round() * half_step;
    let distance = (price - level).abs();
    let proximity = (1.0 - distance / (half_step / 2.0)).clamp(0.0, 1.0);
    let ratio = level / step;
    let whole_step = (ratio - ratio.round()).abs() < 1e-9;
    Some(RoundLevel {
        level,
        half_step,
        proximity,
        whole_step,
    })
}

#[derive(Debug, Clone, Default)]
pub struct PressureZoneDetector {
    config: PressureConfig,
}

impl PressureZoneDetector {
    pub fn new(config: PressureConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, symbol: &str, candles: &[Candle], volumes: &[VolumePoint]) -> PressureZone {
        if candles.len() < self.config.min_points {
            return PressureZone::calm(symbol);
        }

        let mut series = Series::from_candles(candles);
        if series.volume.iter().all(|v| *v == 0.0) && volumes.len() >= series.len() {
            let vols = indicators::volumes(volumes);
            series.volume = vols[vols.len() - series.len()..].to_vec();
        }

        let Some(price) = series.last_close() else {
            return PressureZone::calm(symbol);
        };
        let Some(round) = round_level(price) else {
            return PressureZone::calm(symbol);
        };

        let level_weight = if round.whole_step { 1.0 } else { HALF_STEP_WEIGHT };
        let volatility = self.volatility_factor(&series);
        let volume_context = self.volume_context(&series);
        let (resistance_strength, support_strength) = self.level_strengths(&series, &round);
        let candle_behavior = pin_bar(&series, &round);

        let flag = |on: bool| if on { 1.0 } else { 0.0 };
        let score = (30.0 * round.proximity * level_weight
            + 15.0 * volatility
            + 20.0 * flag(volume_context.surge)
            + 10.0 * flag(volume_context.dry_up)
            + 15.0 * flag(volume_context.absorption)
            + 10.0 * flag(candle_behavior.is_some())
            + 10.0 * resistance_strength.max(support_strength) / 100.0)
            .clamp(0.0, 100.0);
        let pressure_level = PressureLevel::from_score(score);

        debug!(
            symbol,
            score = format!("{:.1}", score),
            level = pressure_level.as_str(),
            psychological_level = round.level,
            surge = volume_context.surge,
            dry_up = volume_context.dry_up,
            absorption = volume_context.absorption,
            "pressure zone"
        );

        PressureZone {
            symbol: symbol.to_string(),
            pressure_level,
            score,
            psychological_level: round.level,
            resistance_strength,
            support_strength,
            volume_context,
            candle_behavior,
        }
    }

    fn volatility_factor(&self, series: &Series) -> f64 {
        let closes = &series.close[series.len().saturating_sub(self.config.trailing_window + 1)..];
        let returns = indicators::log_returns(closes);
        (indicators::stdev(&returns) / VOLATILITY_REFERENCE).min(1.0)
    }

    fn volume_context(&self, series: &Series) -> VolumeContext {
        let n = series.len();
        let window = self.config.trailing_window.min(n - 1);
        if window == 0 {
            return VolumeContext::default();
        }
        let last = n - 1;
        let trailing = &series.volume[last - window..last];
        let avg_volume = indicators::mean(trailing);
        if avg_volume <= 0.0 {
            return VolumeContext::default();
        }
        let volume = series.volume[last];

        let ranges: Vec<f64> = (last - window..last)
            .map(|i| series.high[i] - series.low[i])
            .collect();
        let avg_range = indicators::mean(&ranges);
        let range = series.high[last] - series.low[last];

        // Dry-up compares the last run against the average that preceded it
        let dry_up = n > DRY_UP_RUN + 1 && {
            let run_start = n - DRY_UP_RUN;
            let base_start = run_start.saturating_sub(self.config.trailing_window);
            let base = indicators::mean(&series.volume[base_start..run_start]);
            base > 0.0
                && series.volume[run_start..]
                    .iter()
                    .all(|v| *v <= self.config.dry_up_multiple * base)
        };

        VolumeContext {
            surge: volume >= self.config.surge_multiple * avg_volume,
            dry_up,
            absorption: volume >= self.config.absorption_volume_multiple * avg_volume
                && avg_range > 0.0
                && range <= self.config.absorption_range_multiple * avg_range,
        }
    }

    /// Touch counts of the round level above and below price, scaled to 0-100
    fn level_strengths(&self, series: &Series, round: &RoundLevel) -> (f64, f64) {
        let price = series.last_close().unwrap_or(round.level);
        let (above, below) = if round.level >= price {
            (round.level, round.level - round.half_step)
        } else {
            (round.level + round.half_step, round.level)
        };
        let tolerance = 0.1 * round.half_step;
        let start = series.len().saturating_sub(self.config.touch_lookback);

        let touches = |values: &[f64], level: f64| {
            values[start..]
                .iter()
                .filter(|v| (**v - level).abs() <= tolerance)
                .count() as f64
        };
        let resistance = (touches(&series.high, above) * 20.0).min(100.0);
        let support = (touches(&series.low, below) * 20.0).min(100.0);
        (resistance, support)
    }
}

/// Pin bar printed at the level: long wick, small body
fn pin_bar(series: &Series, round: &RoundLevel) -> Option<CandleBehavior> {
    if round.proximity < 0.5 {
        return None;
    }
    let i = series.len().checked_sub(1)?;
    let (open, high, low, close) = (series.open[i], series.high[i], series.low[i], series.close[i]);
    let range = high - low;
    if range <= 0.0 {
        return None;
    }
    let body = (close - open).abs();
    let upper = high - open.max(close);
    let lower = open.min(close) - low;

    if lower >= 2.0 * body && lower >= 0.5 * range && lower > upper {
        Some(CandleBehavior::BullishRejection)
    } else if upper >= 2.0 * body && upper >= 0.5 * range && upper > lower {
        Some(CandleBehavior::BearishRejection)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    fn d(v: f64) -> Decimal {
        Decimal::from_f64_retain(v).unwrap()
    }

    fn candle(i: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::hours(i),
            open: d(open),
            high: d(high),
            low: d(low),
            close: d(close),
            volume: d(volume),
        }
    }

    /// Quiet chop well away from any round number
    fn quiet(n: usize) -> Vec<Candle> {
        (0..n as i64)
            .map(|i| {
                let c = if i % 2 == 0 { 102.4 } else { 102.6 };
                candle(i, 102.5, c + 0.3, c - 0.3, c, 100.0)
            })
            .collect()
    }

    #[test]
    fn test_round_level_steps() {
        let r = round_level(123.0).unwrap();
        assert_eq!(r.level, 125.0);
        assert_eq!(r.half_step, 5.0);
        assert!(!r.whole_step);

        let r = round_level(2003.0).unwrap();
        assert_eq!(r.level, 2000.0);
        assert!(r.whole_step);
        assert!((r.proximity - (1.0 - 3.0 / 25.0)).abs() < 1e-9);

        assert!(round_level(0.0).is_none());
    }

    #[test]
    fn test_short_series_is_calm() {
        let zone = PressureZoneDetector::default().detect("ETH", &quiet(5), &[]);
        assert_eq!(zone.pressure_level, PressureLevel::Low);
        assert_eq!(zone.score, 0.0);
    }

    #[test]
    fn test_quiet_market_low_pressure() {
        let zone = PressureZoneDetector::default().detect("ETH", &quiet(40), &[]);
        assert_eq!(zone.pressure_level, PressureLevel::Low);
        assert!(!zone.volume_context.surge);
        assert!(zone.candle_behavior.is_none());
    }

    #[test]
    fn test_surge_at_round_number_raises_pressure() {
        let mut candles: Vec<Candle> = (0..30)
            .map(|i| {
                let c = if i % 2 == 0 { 99.6 } else { 100.4 };
                candle(i, 100.0, c + 0.3, c - 0.3, c, 100.0)
            })
            .collect();
        candles.push(candle(30, 100.0, 100.3, 99.7, 100.0, 400.0));

        let zone = PressureZoneDetector::default().detect("ETH", &candles, &[]);
        assert!(zone.volume_context.surge);
        assert_eq!(zone.psychological_level, 100.0);
        assert!(zone.pressure_level >= PressureLevel::Medium, "score {}", zone.score);
    }

    #[test]
    fn test_bullish_pin_bar_near_level() {
        let mut candles = quiet(30);
        candles.push(candle(30, 100.4, 100.6, 98.5, 100.5, 100.0));

        let zone = PressureZoneDetector::default().detect("ETH", &candles, &[]);
        assert_eq!(zone.candle_behavior, Some(CandleBehavior::BullishRejection));
    }

    #[test]
    fn test_volume_series_fallback() {
        let candles: Vec<Candle> = quiet(30)
            .into_iter()
            .map(|mut c| {
                c.volume = Decimal::ZERO;
                c
            })
            .collect();
        let mut volumes: Vec<VolumePoint> = candles
            .iter()
            .map(|c| VolumePoint {
                timestamp: c.timestamp,
                volume: d(100.0),
            })
            .collect();
        if let Some(last) = volumes.last_mut() {
            last.volume = d(500.0);
        }

        let zone = PressureZoneDetector::default().detect("ETH", &candles, &volumes);
        assert!(zone.volume_context.surge);
    }

    #[test]
    fn test_detection_is_deterministic() {
        let candles = quiet(50);
        let detector = PressureZoneDetector::default();
        assert_eq!(
            detector.detect("ETH", &candles, &[]),
            detector.detect("ETH", &candles, &[])
        );
    }
}
