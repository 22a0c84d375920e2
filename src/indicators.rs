//! Indicator building blocks
//!
//! Pure functions over `f64` series. Candles arrive as `Decimal` and are
//! converted once through [`Series::from_candles`].

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::types::{Candle, VolumePoint};

/// Column view of a candle series
#[derive(Debug, Clone, Default)]
pub struct Series {
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl Series {
    pub fn from_candles(candles: &[Candle]) -> Self {
        let mut series = Series {
            open: Vec::with_capacity(candles.len()),
            high: Vec::with_capacity(candles.len()),
            low: Vec::with_capacity(candles.len()),
            close: Vec::with_capacity(candles.len()),
            volume: Vec::with_capacity(candles.len()),
        };
        for c in candles {
            series.open.push(to_f64(c.open));
            series.high.push(to_f64(c.high));
            series.low.push(to_f64(c.low));
            series.close.push(to_f64(c.close));
            series.volume.push(to_f64(c.volume));
        }
        series
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.close.last().copied()
    }
}

pub fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

pub fn volumes(points: &[VolumePoint]) -> Vec<f64> {
    points.iter().map(|p| to_f64(p.volume)).collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
pub fn stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Simple moving average of the last `period` values
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    Some(mean(&values[values.len() - period..]))
}

/// Least-squares slope per bar, normalised by the mean level
pub fn normalized_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let xm = (n - 1) as f64 / 2.0;
    let ym = mean(values);
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - xm;
        num += dx * (y - ym);
        den += dx * dx;
    }
    if den == 0.0 || ym == 0.0 {
        return 0.0;
    }
    (num / den) / ym
}

/// Log returns between consecutive closes
pub fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect()
}

/// RSI series with Wilder smoothing; entries before `period` are NaN.
/// avg_loss == 0 gives 100, avg_gain == 0 gives 0.
pub fn rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = rsi_from(avg_gain, avg_loss);

    for i in (period + 1)..n {
        let change = closes[i] - closes[i - 1];
        let (gain, loss) = if change > 0.0 { (change, 0.0) } else { (0.0, -change) };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        result[i] = rsi_from(avg_gain, avg_loss);
    }
    result
}

fn rsi_from(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// True range: max(high-low, |high-prev_close|, |low-prev_close|)
pub fn true_range(series: &Series) -> Vec<f64> {
    let n = series.len();
    let mut tr = Vec::with_capacity(n);
    for i in 0..n {
        let range = series.high[i] - series.low[i];
        if i == 0 {
            tr.push(range);
        } else {
            let pc = series.close[i - 1];
            tr.push(
                range
                    .max((series.high[i] - pc).abs())
                    .max((series.low[i] - pc).abs()),
            );
        }
    }
    tr
}

/// Average true range with Wilder smoothing, seeded from the first `period` TRs
pub fn atr(series: &Series, period: usize) -> Option<f64> {
    let tr = true_range(series);
    if period == 0 || tr.len() < period + 1 {
        return None;
    }
    // TR[0] has no previous close, seed from index 1
    let mut value = mean(&tr[1..=period]);
    for t in &tr[(period + 1)..] {
        value = (value * (period as f64 - 1.0) + t) / period as f64;
    }
    Some(value)
}

/// Fractal swing highs: bar higher than `wing` bars on each side
pub fn swing_highs(highs: &[f64], wing: usize) -> Vec<usize> {
    swings(highs, wing, |center, other| center > other)
}

/// Fractal swing lows: bar lower than `wing` bars on each side
pub fn swing_lows(lows: &[f64], wing: usize) -> Vec<usize> {
    swings(lows, wing, |center, other| center < other)
}

fn swings(values: &[f64], wing: usize, beats: impl Fn(f64, f64) -> bool) -> Vec<usize> {
    let n = values.len();
    if wing == 0 || n < 2 * wing + 1 {
        return Vec::new();
    }
    (wing..n - wing)
        .filter(|&i| {
            (i - wing..i)
                .chain(i + 1..=i + wing)
                .all(|j| beats(values[i], values[j]))
        })
        .collect()
}
