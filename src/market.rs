//! Market data and fundamentals collaborators
//!
//! Both are traits so the pipeline can be driven by live HTTP services or
//! by in-process fakes. A failed fetch is always an error, never a
//! made-up value.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::types::{Candle, Timeframe, VolumePoint};

#[async_trait]
pub trait MarketData: Send + Sync {
    /// Most recent `limit` candles, oldest first
    async fn price_series(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    async fn volume_series(&self, symbol: &str) -> Result<Vec<VolumePoint>>;
}

#[async_trait]
pub trait FundamentalSource: Send + Sync {
    /// Additive confidence boost from news/on-chain catalysts
    async fn confidence_boost(&self, symbol: &str) -> Result<f64>;

    /// Market sentiment on 0-100, 50 neutral
    async fn sentiment_score(&self, symbol: &str) -> Result<f64>;
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| EngineError::Config(format!("http client: {}", e)))
}

/// Client for the data-retrieval service
pub struct HttpMarketData {
    client: Client,
    base_url: String,
}

impl HttpMarketData {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(30)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, symbol: &str, url: &str) -> Result<T> {
        debug!("Fetching {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::data_unavailable(symbol, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(EngineError::data_unavailable(
                symbol,
                format!("{} - {}", status, text),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| EngineError::data_unavailable(symbol, format!("invalid response: {}", e)))
    }
}

#[async_trait]
impl MarketData for HttpMarketData {
    async fn price_series(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/candles/{}?timeframe={}&limit={}",
            self.base_url, symbol, timeframe, limit
        );
        let mut candles: Vec<Candle> = self.get_json(symbol, &url).await?;
        if candles.is_empty() {
            return Err(EngineError::data_unavailable(symbol, "empty candle series"));
        }
        candles.sort_by_key(|c| c.timestamp);
        Ok(candles)
    }

    async fn volume_series(&self, symbol: &str) -> Result<Vec<VolumePoint>> {
        let url = format!("{}/volume/{}", self.base_url, symbol);
        let mut points: Vec<VolumePoint> = self.get_json(symbol, &url).await?;
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }
}

/// Fundamentals response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundamentalSnapshot {
    pub confidence_boost: f64,
    pub sentiment_score: f64,
}

pub struct HttpFundamentals {
    client: Client,
    base_url: String,
}

impl HttpFundamentals {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            client: http_client(10)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn snapshot(&self, symbol: &str) -> Result<FundamentalSnapshot> {
        let url = format!("{}/fundamentals/{}", self.base_url, symbol);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::data_unavailable(symbol, e))?;
        if !response.status().is_success() {
            return Err(EngineError::data_unavailable(
                symbol,
                format!("fundamentals: {}", response.status()),
            ));
        }
        response
            .json()
            .await
            .map_err(|e| EngineError::data_unavailable(symbol, e))
    }
}

#[async_trait]
impl FundamentalSource for HttpFundamentals {
    async fn confidence_boost(&self, symbol: &str) -> Result<f64> {
        Ok(self.snapshot(symbol).await?.confidence_boost)
    }

    async fn sentiment_score(&self, symbol: &str) -> Result<f64> {
        Ok(self.snapshot(symbol).await?.sentiment_score.clamp(0.0, 100.0))
    }
}

/// No catalysts, neutral sentiment
#[derive(Debug, Clone, Copy, Default)]
pub struct NeutralFundamentals;

#[async_trait]
impl FundamentalSource for NeutralFundamentals {
    async fn confidence_boost(&self, _symbol: &str) -> Result<f64> {
        Ok(0.0)
    }

    async fn sentiment_score(&self, _symbol: &str) -> Result<f64> {
        Ok(50.0)
    }
}
