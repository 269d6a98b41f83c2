use crate::domain::market::{Candle, CandleInterval, CandleSeries};
use crate::domain::ports::CandleSource;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use tracing::debug;

/// One recorded `fetch` invocation
#[derive(Debug, Clone, PartialEq)]
pub struct FetchCall {
    pub instrument_id: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub interval: CandleInterval,
}

/// Deterministic candle source backed by memory.
///
/// Serves seeded candles, or synthesizes a smooth price path when
/// constructed with [`synthetic`](Self::synthetic). Every call is recorded.
#[derive(Default)]
pub struct InMemoryCandleSource {
    candles: RwLock<HashMap<(String, CandleInterval), Vec<Candle>>>,
    calls: Mutex<Vec<FetchCall>>,
    synthetic: bool,
    now: Option<DateTime<Utc>>,
    failure: Option<String>,
}

impl InMemoryCandleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates bars on every interval step for instruments without seeded data
    pub fn synthetic() -> Self {
        Self {
            synthetic: true,
            ..Self::default()
        }
    }

    /// Fixes the clock used to decide whether a bar is complete
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Makes every fetch fail with `message`
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn seed(
        &self,
        instrument_id: &str,
        interval: CandleInterval,
        candles: impl IntoIterator<Item = Candle>,
    ) {
        let mut map = self.candles.write().unwrap_or_else(|e| e.into_inner());
        let entry = map
            .entry((instrument_id.to_string(), interval))
            .or_default();
        entry.extend(candles);
        entry.sort_by_key(|c| c.timestamp);
    }

    pub fn calls(&self) -> Vec<FetchCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn synthesize(
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        interval: CandleInterval,
    ) -> Vec<Candle> {
        let step = interval.duration();
        let mut candles = Vec::new();
        let mut ts = from;
        while ts <= to {
            let phase = ts.timestamp() as f64 / step.num_seconds().max(1) as f64;
            let close = 100.0 + 5.0 * (phase / 10.0).sin();
            let open = 100.0 + 5.0 * ((phase - 1.0) / 10.0).sin();
            candles.push(Candle::new(
                open,
                open.max(close) + 0.5,
                open.min(close) - 0.5,
                close,
                1_000 + (phase as i64).rem_euclid(500),
                ts,
            ));
            ts += step;
        }
        candles
    }
}

#[async_trait]
impl CandleSource for InMemoryCandleSource {
    async fn fetch(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        interval: CandleInterval,
    ) -> Result<CandleSeries> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(FetchCall {
                instrument_id: instrument_id.to_string(),
                from,
                to,
                interval,
            });

        if let Some(message) = &self.failure {
            anyhow::bail!("{}", message);
        }

        let seeded = {
            let map = self.candles.read().unwrap_or_else(|e| e.into_inner());
            map.get(&(instrument_id.to_string(), interval)).map(|candles| {
                candles
                    .iter()
                    .filter(|c| c.timestamp >= from && c.timestamp <= to)
                    .copied()
                    .collect::<Vec<_>>()
            })
        };

        let candles = match seeded {
            Some(candles) => candles,
            None if self.synthetic => Self::synthesize(from, to, interval),
            None => Vec::new(),
        };

        debug!(
            "InMemoryCandleSource: Serving {} bars for {} [{} .. {}]",
            candles.len(),
            instrument_id,
            from,
            to
        );
        Ok(CandleSeries::from_candles(candles))
    }

    fn is_complete(&self, candle: &Candle, interval: CandleInterval) -> bool {
        candle.timestamp + interval.duration() <= self.now.unwrap_or_else(Utc::now)
    }
}
