//! Deterministic pattern detectors
//!
//! Each detector is a pure function: series in, classification out. None of
//! them hold state or draw random numbers, so identical input always yields
//! identical output.

use crate::indicators::{self, Series};
use crate::types::{
    Divergence, FibLevel, Phase, StructureType, Trend, ValuePosition, VolumeProfile,
};

/// Per-bar normalised slope above which a range is considered trending
const TREND_SLOPE: f64 = 0.002;
/// Recent-to-full range ratio below which the range is compressed
const COMPRESSION_RATIO: f64 = 0.35;
const RETRACEMENT_RATIOS: [f64; 4] = [0.382, 0.5, 0.618, 0.786];
/// Distance to a retracement level, as a fraction of the leg, that counts as a touch
const RETRACEMENT_TOLERANCE: f64 = 0.02;
const PROFILE_BINS: usize = 24;
/// Minimum RSI gap between the two swings of a divergence
const DIVERGENCE_MIN_GAP: f64 = 2.0;

fn window(values: &[f64], lookback: usize) -> &[f64] {
    &values[values.len().saturating_sub(lookback)..]
}

/// Classify the market cycle phase from range position, compression,
/// slope and the up/down volume balance.
pub fn detect_phase(series: &Series, lookback: usize) -> Option<Phase> {
    if series.len() < 20 {
        return None;
    }
    let highs = window(&series.high, lookback);
    let lows = window(&series.low, lookback);
    let closes = window(&series.close, lookback);
    let opens = window(&series.open, lookback);
    let vols = window(&series.volume, lookback);

    let range_high = highs.iter().cloned().fold(f64::MIN, f64::max);
    let range_low = lows.iter().cloned().fold(f64::MAX, f64::min);
    let range = range_high - range_low;
    if range <= 0.0 {
        return Some(Phase::Ranging);
    }

    let close = *closes.last()?;
    let position = (close - range_low) / range;

    let recent = 10.min(highs.len());
    let recent_high = highs[highs.len() - recent..].iter().cloned().fold(f64::MIN, f64::max);
    let recent_low = lows[lows.len() - recent..].iter().cloned().fold(f64::MAX, f64::min);
    let compression = (recent_high - recent_low) / range;

    let slope = indicators::normalized_slope(window(closes, 20));

    let tail = 20.min(closes.len());
    let (mut up_vol, mut down_vol) = (0.0, 0.0);
    for i in closes.len() - tail..closes.len() {
        if closes[i] >= opens[i] {
            up_vol += vols[i];
        } else {
            down_vol += vols[i];
        }
    }
    let up_ratio = if up_vol + down_vol > 0.0 {
        up_vol / (up_vol + down_vol)
    } else {
        0.5
    };

    let phase = if slope > TREND_SLOPE && position > 0.6 {
        Phase::Markup
    } else if slope < -TREND_SLOPE && position < 0.4 {
        Phase::Markdown
    } else if position < 0.35 && compression < COMPRESSION_RATIO && up_ratio > 0.55 {
        Phase::Accumulation
    } else if position > 0.65 && compression < COMPRESSION_RATIO && up_ratio < 0.45 {
        Phase::Distribution
    } else {
        Phase::Ranging
    };
    Some(phase)
}

/// Detect a close beyond the last confirmed swing high/low.
///
/// A break in the direction of the prior swing sequence is a break of
/// structure; a break against it is a change of character.
pub fn detect_structure_break(series: &Series, wing: usize) -> Option<StructureType> {
    let highs_idx = indicators::swing_highs(&series.high, wing);
    let lows_idx = indicators::swing_lows(&series.low, wing);
    if highs_idx.len() < 2 || lows_idx.len() < 2 {
        return None;
    }

    let h1 = series.high[highs_idx[highs_idx.len() - 2]];
    let h2 = series.high[highs_idx[highs_idx.len() - 1]];
    let l1 = series.low[lows_idx[lows_idx.len() - 2]];
    let l2 = series.low[lows_idx[lows_idx.len() - 1]];
    let close = series.last_close()?;

    let uptrend = h2 > h1 && l2 > l1;
    let downtrend = h2 < h1 && l2 < l1;

    if close > h2 {
        Some(if downtrend {
            StructureType::ChangeOfCharacterUp
        } else {
            StructureType::BreakOfStructureUp
        })
    } else if close < l2 {
        Some(if uptrend {
            StructureType::ChangeOfCharacterDown
        } else {
            StructureType::BreakOfStructureDown
        })
    } else {
        None
    }
}

/// Check whether price sits on a retracement level of the last impulse leg
pub fn detect_retracement(series: &Series, lookback: usize) -> Option<FibLevel> {
    if series.len() < 20 {
        return None;
    }
    let highs = window(&series.high, lookback);
    let lows = window(&series.low, lookback);
    let close = series.last_close()?;

    let (hi_idx, hi) = highs
        .iter()
        .enumerate()
        .fold((0, f64::MIN), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
    let (lo_idx, lo) = lows
        .iter()
        .enumerate()
        .fold((0, f64::MAX), |acc, (i, &v)| if v < acc.1 { (i, v) } else { acc });
    let leg = hi - lo;
    // Extremes on the same bar are a range, not an impulse leg
    if leg <= 0.0 || hi_idx == lo_idx {
        return None;
    }

    // Up leg: retracements measured down from the high act as support
    let up_leg = lo_idx < hi_idx;
    RETRACEMENT_RATIOS
        .iter()
        .map(|&ratio| {
            let price = if up_leg { hi - ratio * leg } else { lo + ratio * leg };
            (ratio, price, (close - price).abs())
        })
        .filter(|(_, _, dist)| *dist <= RETRACEMENT_TOLERANCE * leg)
        .min_by(|a, b| a.2.total_cmp(&b.2))
        .map(|(ratio, price, _)| FibLevel {
            ratio,
            price,
            bias: if up_leg { Trend::Bullish } else { Trend::Bearish },
        })
}

/// Build a volume-at-price histogram and locate price against the point of control
pub fn detect_volume_profile(series: &Series, lookback: usize) -> Option<VolumeProfile> {
    if series.len() < 20 {
        return None;
    }
    let highs = window(&series.high, lookback);
    let lows = window(&series.low, lookback);
    let closes = window(&series.close, lookback);
    let vols = window(&series.volume, lookback);

    let top = highs.iter().cloned().fold(f64::MIN, f64::max);
    let bottom = lows.iter().cloned().fold(f64::MAX, f64::min);
    let total: f64 = vols.iter().sum();
    if top <= bottom || total <= 0.0 {
        return None;
    }

    let bin_width = (top - bottom) / PROFILE_BINS as f64;
    let bin_of = |price: f64| (((price - bottom) / bin_width) as usize).min(PROFILE_BINS - 1);

    let mut bins = [0.0_f64; PROFILE_BINS];
    for i in 0..closes.len() {
        let typical = (highs[i] + lows[i] + closes[i]) / 3.0;
        bins[bin_of(typical)] += vols[i];
    }

    let (poc_bin, poc_vol) = bins
        .iter()
        .enumerate()
        .fold((0, 0.0), |acc, (i, &v)| if v > acc.1 { (i, v) } else { acc });
    let point_of_control = bottom + (poc_bin as f64 + 0.5) * bin_width;

    let close = *closes.last()?;
    let price_bin = bin_of(close);
    let node_vol: f64 = bins[price_bin.saturating_sub(1)..=(price_bin + 1).min(PROFILE_BINS - 1)]
        .iter()
        .sum();
    let uniform_share = 3.0 / PROFILE_BINS as f64;
    let node_strength = ((node_vol / total) / uniform_share / 3.0).clamp(0.0, 1.0);

    let position = if (close - point_of_control).abs() <= bin_width {
        ValuePosition::At
    } else if close > point_of_control {
        ValuePosition::Above
    } else {
        ValuePosition::Below
    };

    // A flat profile has no distinct value area to accept or reject
    let distinct = poc_vol / total >= 1.5 / PROFILE_BINS as f64;
    let bias = match (distinct, position) {
        (true, ValuePosition::Above) => Trend::Bullish,
        (true, ValuePosition::Below) => Trend::Bearish,
        _ => Trend::Neutral,
    };

    Some(VolumeProfile {
        point_of_control,
        node_strength,
        position,
        bias,
    })
}

/// Compare the last two swing lows/highs in price against RSI
pub fn detect_rsi_divergence(series: &Series, period: usize, wing: usize) -> Option<Divergence> {
    let rsi = indicators::rsi_series(&series.close, period);
    let n = series.len();
    let recent_limit = n.saturating_sub(10 + wing);

    let valid = |idx: &usize| !rsi[*idx].is_nan();
    let lows: Vec<usize> = indicators::swing_lows(&series.low, wing)
        .into_iter()
        .filter(valid)
        .collect();
    let highs: Vec<usize> = indicators::swing_highs(&series.high, wing)
        .into_iter()
        .filter(valid)
        .collect();

    let bullish = match lows.as_slice() {
        [.., a, b] if *b >= recent_limit => {
            (series.low[*b] < series.low[*a] && rsi[*b] > rsi[*a] + DIVERGENCE_MIN_GAP)
                .then_some(*b)
        }
        _ => None,
    };
    let bearish = match highs.as_slice() {
        [.., a, b] if *b >= recent_limit => {
            (series.high[*b] > series.high[*a] && rsi[*b] < rsi[*a] - DIVERGENCE_MIN_GAP)
                .then_some(*b)
        }
        _ => None,
    };

    match (bullish, bearish) {
        (Some(b), Some(s)) => Some(if b >= s {
            Divergence::Bullish
        } else {
            Divergence::Bearish
        }),
        (Some(_), None) => Some(Divergence::Bullish),
        (None, Some(_)) => Some(Divergence::Bearish),
        (None, None) => None,
    }
}
