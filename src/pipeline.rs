//! One symbol, one decision: fetch, analyze, aggregate

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::analysis::{PressureZoneDetector, TimeframeAnalyzer};
use crate::confluence::{AggregateOutcome, ConfluenceAggregator, ConfluenceInputs};
use crate::error::{EngineError, Result};
use crate::indicators::{self, Series};
use crate::learning::LearningEngine;
use crate::market::{FundamentalSource, MarketData};
use crate::types::{Candle, PressureZone, Timeframe, TimeframeScore, VolumePoint};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub timeframes: Vec<Timeframe>,
    /// Timeframe whose last close is the entry and whose ATR sizes the levels
    pub entry_timeframe: Timeframe,
    pub series_limit: usize,
    pub atr_period: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeframes: Timeframe::ALL.to_vec(),
            entry_timeframe: Timeframe::Hour1,
            series_limit: 200,
            atr_period: 14,
        }
    }
}

/// Everything one symbol evaluation produced
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub symbol: String,
    pub scores: Vec<TimeframeScore>,
    pub pressure: PressureZone,
    pub outcome: AggregateOutcome,
    /// Entry-timeframe candles, reused for exit monitoring
    pub entry_candles: Vec<Candle>,
}

pub struct SymbolPipeline {
    market: Arc<dyn MarketData>,
    fundamentals: Arc<dyn FundamentalSource>,
    learning: Arc<LearningEngine>,
    analyzer: TimeframeAnalyzer,
    pressure: PressureZoneDetector,
    aggregator: ConfluenceAggregator,
    config: PipelineConfig,
}

impl SymbolPipeline {
    pub fn new(
        market: Arc<dyn MarketData>,
        fundamentals: Arc<dyn FundamentalSource>,
        learning: Arc<LearningEngine>,
        analyzer: TimeframeAnalyzer,
        pressure: PressureZoneDetector,
        aggregator: ConfluenceAggregator,
        config: PipelineConfig,
    ) -> Self {
        Self {
            market,
            fundamentals,
            learning,
            analyzer,
            pressure,
            aggregator,
            config,
        }
    }

    pub fn market(&self) -> &Arc<dyn MarketData> {
        &self.market
    }

    pub fn entry_timeframe(&self) -> Timeframe {
        self.config.entry_timeframe
    }

    pub fn series_limit(&self) -> usize {
        self.config.series_limit
    }

    /// Evaluate one symbol. Any failed fetch aborts the evaluation with
    /// `DataUnavailable`; nothing is estimated or reused from earlier cycles.
    pub async fn evaluate(&self, symbol: &str, now: DateTime<Utc>) -> Result<Evaluation> {
        let volumes = self
            .market
            .volume_series(symbol)
            .await
            .map_err(|e| as_unavailable(symbol, e))?;

        let mut scores = Vec::with_capacity(self.config.timeframes.len());
        let mut entry_candles = Vec::new();
        for &timeframe in &self.config.timeframes {
            let candles = self
                .market
                .price_series(symbol, timeframe, self.config.series_limit)
                .await
                .map_err(|e| as_unavailable(symbol, e))?;

            // Standalone volume points line up with the entry timeframe only
            let tf_volumes: &[VolumePoint] = if timeframe == self.config.entry_timeframe {
                volumes.as_slice()
            } else {
                &[]
            };
            scores.push(self.analyzer.analyze(symbol, timeframe, &candles, tf_volumes));
            if timeframe == self.config.entry_timeframe {
                entry_candles = candles;
            }
        }

        let series = Series::from_candles(&entry_candles);
        let atr = indicators::atr(&series, self.config.atr_period)
            .and_then(Decimal::from_f64)
            .filter(|a| *a > Decimal::ZERO)
            .ok_or(EngineError::InsufficientData {
                required: self.config.atr_period + 1,
                available: entry_candles.len(),
            })?;
        let entry = entry_candles
            .last()
            .map(|c| c.close)
            .ok_or(EngineError::InsufficientData {
                required: 1,
                available: 0,
            })?;

        let pressure = self.pressure.detect(symbol, &entry_candles, &volumes);

        let fundamental_boost = match self.fundamentals.confidence_boost(symbol).await {
            Ok(boost) => boost,
            Err(e) => {
                warn!("Fundamental boost unavailable for {}, using 0: {}", symbol, e);
                0.0
            }
        };
        let sentiment = match self.fundamentals.sentiment_score(symbol).await {
            Ok(score) => Some(score),
            Err(e) => {
                warn!("Sentiment unavailable for {}, skipping conflict check: {}", symbol, e);
                None
            }
        };

        let weights = self.learning.weights().await;
        let outcome = self.aggregator.aggregate(&ConfluenceInputs {
            symbol,
            scores: &scores,
            pressure: &pressure,
            fundamental_boost,
            sentiment,
            weights: &weights,
            entry,
            atr,
            now,
        });

        debug!(
            symbol,
            entry = %entry,
            atr = %atr,
            pressure = pressure.pressure_level.as_str(),
            "symbol evaluated"
        );

        Ok(Evaluation {
            symbol: symbol.to_string(),
            scores,
            pressure,
            outcome,
            entry_candles,
        })
    }
}

fn as_unavailable(symbol: &str, e: EngineError) -> EngineError {
    match e {
        EngineError::DataUnavailable { .. } => e,
        other => EngineError::data_unavailable(symbol, other),
    }
}
