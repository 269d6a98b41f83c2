//! Binance historical candles (REST klines).
//!
//! Windows longer than one page are fetched page by page, each page
//! starting one millisecond after the previous page's last open time.

use crate::config::HttpConfig;
use crate::domain::market::{Candle, CandleInterval, CandleSeries};
use crate::domain::ports::CandleSource;
use crate::infrastructure::core::http_client_factory::{HttpClientFactory, build_url_with_query};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest_middleware::ClientWithMiddleware;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Maximum bars Binance returns per klines request
pub const KLINES_PAGE_LIMIT: usize = 1000;

const KLINES_PATH: &str = "/api/v3/klines";

#[derive(Debug, Error)]
pub enum BinanceSourceError {
    #[error("Interval {0} is not offered by Binance klines")]
    UnsupportedInterval(CandleInterval),

    #[error("Binance klines fetch failed with status {status}: {body}")]
    Http { status: u16, body: String },
}

pub struct BinanceCandleSource {
    client: ClientWithMiddleware,
    base_url: String,
}

impl BinanceCandleSource {
    pub fn new(base_url: impl Into<String>, http: &HttpConfig) -> Self {
        Self {
            client: HttpClientFactory::create_client(http),
            base_url: base_url.into(),
        }
    }

    async fn fetch_page(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<Candle>> {
        let start_ms = start_ms.to_string();
        let end_ms = end_ms.to_string();
        let limit = KLINES_PAGE_LIMIT.to_string();
        let url = build_url_with_query(
            &self.base_url,
            KLINES_PATH,
            &[
                ("symbol", symbol),
                ("interval", interval),
                ("startTime", start_ms.as_str()),
                ("endTime", end_ms.as_str()),
                ("limit", limit.as_str()),
            ],
        )?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to fetch klines from Binance")?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(BinanceSourceError::Http { status, body }.into());
        }

        let klines: Vec<Value> = response
            .json()
            .await
            .context("Failed to parse Binance klines response")?;

        Ok(parse_klines(&klines))
    }
}

#[async_trait]
impl CandleSource for BinanceCandleSource {
    async fn fetch(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        interval: CandleInterval,
    ) -> Result<CandleSeries> {
        let binance_interval = interval
            .to_binance_string()
            .ok_or(BinanceSourceError::UnsupportedInterval(interval))?;

        let end_ms = to.timestamp_millis();
        let mut start_ms = from.timestamp_millis();
        let mut series = CandleSeries::new();

        while start_ms <= end_ms {
            let page = self
                .fetch_page(instrument_id, binance_interval, start_ms, end_ms)
                .await?;
            let page_len = page.len();
            debug!(
                "BinanceCandleSource: Page of {} bars for {} from {}",
                page_len, instrument_id, start_ms
            );

            let Some(last) = page.last() else {
                break;
            };
            start_ms = last.timestamp.timestamp_millis() + 1;
            series.extend(page);

            if page_len < KLINES_PAGE_LIMIT {
                break;
            }
        }

        info!(
            "BinanceCandleSource: Fetched {} bars for {} ({})",
            series.len(),
            instrument_id,
            interval
        );
        Ok(series)
    }
}

/// Converts raw klines (`[open_time, open, high, low, close, volume, ...]`)
/// to candles. Volume is rounded to whole units; malformed entries are skipped.
pub fn parse_klines(klines: &[Value]) -> Vec<Candle> {
    let candles: Vec<Candle> = klines.iter().filter_map(parse_kline).collect();
    if candles.len() < klines.len() {
        warn!(
            "BinanceCandleSource: Skipped {} malformed klines",
            klines.len() - candles.len()
        );
    }
    candles
}

fn parse_kline(kline: &Value) -> Option<Candle> {
    let arr = kline.as_array()?;
    if arr.len() < 6 {
        return None;
    }

    let timestamp = DateTime::from_timestamp_millis(arr[0].as_i64()?)?;
    let price = |idx: usize| arr[idx].as_str()?.parse::<f64>().ok();
    let volume = price(5)?;

    Some(Candle::new(
        price(1)?,
        price(2)?,
        price(3)?,
        price(4)?,
        volume.round() as i64,
        timestamp,
    ))
}
