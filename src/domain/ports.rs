use crate::domain::market::{Candle, CandleInterval, CandleSeries};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Remote provider of historical candles.
///
/// `fetch` returns candles covering `[from, to]` when data exists. The
/// bars at either boundary are included, so they may repeat candles that
/// are already cached.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn fetch(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        interval: CandleInterval,
    ) -> Result<CandleSeries>;

    /// Whether a bar is final. In-progress bars must not be cached.
    ///
    /// The default considers a bar complete once its whole interval has elapsed.
    fn is_complete(&self, candle: &Candle, interval: CandleInterval) -> bool {
        candle.timestamp + interval.duration() <= Utc::now()
    }
}
