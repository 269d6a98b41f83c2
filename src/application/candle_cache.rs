use crate::domain::errors::{CacheError, StoreError};
use crate::domain::market::{Candle, CandleInterval, CandleSeries, HolidayCalendar};
use crate::domain::ports::CandleSource;
use crate::infrastructure::persistence::CsvCandleStore;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Reads allowed per request before giving up on closing a gap
pub const MAX_ATTEMPTS: usize = 3;

/// One `(instrument, interval, window)` to reconcile
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    pub instrument_id: String,
    pub interval: CandleInterval,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl SyncRequest {
    pub fn new(
        instrument_id: impl Into<String>,
        interval: CandleInterval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            interval,
            from,
            to,
        }
    }
}

/// Serves candle windows from the file cache, fetching what is missing.
///
/// A read that finds the cache short at the head backfills older bars with
/// an insert; one that finds it short at the tail fetches newer bars and
/// appends them. Each request gets at most [`MAX_ATTEMPTS`] reads.
///
/// Requests for the same `(instrument, interval)` are serialized, so each
/// cache file has a single writer at a time.
pub struct CandleCache {
    base_dir: PathBuf,
    source: Arc<dyn CandleSource>,
    holidays: Arc<HolidayCalendar>,
    file_locks: Mutex<HashMap<(String, CandleInterval), Arc<tokio::sync::Mutex<()>>>>,
}

impl CandleCache {
    pub fn new(base_dir: impl Into<PathBuf>, source: Arc<dyn CandleSource>) -> Self {
        Self {
            base_dir: base_dir.into(),
            source,
            holidays: Arc::default(),
            file_locks: Mutex::default(),
        }
    }

    pub fn with_holidays(mut self, holidays: Arc<HolidayCalendar>) -> Self {
        self.holidays = holidays;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn store(&self, instrument_id: &str, interval: CandleInterval) -> CsvCandleStore {
        CsvCandleStore::new(&self.base_dir, instrument_id, interval)
            .with_holidays(self.holidays.clone())
    }

    /// Candles of `instrument_id` within `[from, to]`, topping up the cache first.
    pub async fn download_or_read(
        &self,
        instrument_id: &str,
        interval: CandleInterval,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CandleSeries, CacheError> {
        let store = self.store(instrument_id, interval);
        let file_lock = self.file_lock(instrument_id, interval);
        let _guard = file_lock.lock().await;

        let result = self.reconcile(&store, from, to).await;
        if let Err(e) = &result {
            error!(
                path = ?store.path(),
                %from,
                %to,
                "CandleCache: Failed to serve {} ({}): {}",
                instrument_id,
                interval,
                e
            );
        }
        result
    }

    /// Reconciles several requests concurrently. Results keep request order.
    pub async fn sync_many(
        &self,
        requests: &[SyncRequest],
    ) -> Vec<Result<CandleSeries, CacheError>> {
        info!("CandleCache: Syncing {} series", requests.len());
        join_all(requests.iter().map(|r| {
            self.download_or_read(&r.instrument_id, r.interval, r.from, r.to)
        }))
        .await
    }

    fn file_lock(
        &self,
        instrument_id: &str,
        interval: CandleInterval,
    ) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.file_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry((instrument_id.to_string(), interval))
            .or_default()
            .clone()
    }

    async fn reconcile(
        &self,
        store: &CsvCandleStore,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CandleSeries, CacheError> {
        if !store.exists().await? {
            return self.initial_fill(store, from, to).await;
        }

        let instrument_id = store.instrument_id();
        let interval = store.interval();
        let (mut from, mut to) = (from, to);
        let mut partial = CandleSeries::with_holidays(self.holidays.clone());

        for attempt in 1..=MAX_ATTEMPTS {
            let cached = store.read_all().await?;
            // A header-only file is filled like a missing one
            if attempt == 1 && cached.is_empty() {
                return self.initial_fill(store, from, to).await;
            }

            match store.covering(cached, from, to) {
                Ok(series) => return Ok(series),

                Err(StoreError::NeedAppend {
                    boundary,
                    partial: window,
                }) => {
                    debug!(
                        "CandleCache: Attempt {} appending {} after {}",
                        attempt, instrument_id, boundary
                    );
                    let fetched = self.source.fetch(instrument_id, boundary, to, interval).await?;
                    let fresh: Vec<Candle> = fetched
                        .into_iter()
                        .filter(|c| c.timestamp > boundary)
                        .collect();

                    let only_in_progress = fresh.len() == 1
                        && !self.source.is_complete(&fresh[0], interval);
                    if fresh.is_empty() || only_in_progress {
                        // Nothing newer is final yet: accept the cached tail
                        to = boundary;
                    } else {
                        let fresh = self.drop_in_progress(fresh, interval);
                        store.append(&fresh).await?;
                    }
                    partial = window;
                }

                Err(StoreError::NeedInsert { boundary }) => {
                    if attempt == MAX_ATTEMPTS {
                        return Err(CacheError::IncorrectFirstCandle {
                            path: store.path().to_path_buf(),
                            from,
                            boundary,
                        });
                    }
                    debug!(
                        "CandleCache: Attempt {} backfilling {} before {}",
                        attempt, instrument_id, boundary
                    );
                    let fetched = self.source.fetch(instrument_id, from, boundary, interval).await?;
                    let older: CandleSeries = fetched
                        .into_iter()
                        .filter(|c| c.timestamp < boundary)
                        .collect();

                    if older.is_empty() {
                        // The source has nothing earlier: serve from the cached head
                        from = boundary;
                    } else {
                        store.insert(&older).await?;
                    }
                }

                Err(e) => return Err(e.into()),
            }
        }

        warn!(
            path = ?store.path(),
            %from,
            %to,
            "CandleCache: Tail of {} still missing after {} attempts, returning {} cached candles",
            instrument_id,
            MAX_ATTEMPTS,
            partial.len()
        );
        Ok(partial)
    }

    async fn initial_fill(
        &self,
        store: &CsvCandleStore,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CandleSeries, CacheError> {
        store.prepare_new().await?;

        let fetched = self
            .source
            .fetch(store.instrument_id(), from, to, store.interval())
            .await?;
        let series = self.drop_in_progress(fetched.into_candles(), store.interval());
        store.append(&series).await?;

        info!(
            "CandleCache: Cached {} candles for {} ({})",
            series.len(),
            store.instrument_id(),
            store.interval()
        );
        Ok(series)
    }

    /// Drops a trailing bar that is still forming
    fn drop_in_progress(&self, mut candles: Vec<Candle>, interval: CandleInterval) -> CandleSeries {
        if let Some(last) = candles.last()
            && !self.source.is_complete(last, interval)
        {
            debug!("CandleCache: Dropping in-progress candle at {}", last.timestamp);
            candles.pop();
        }

        let mut series = CandleSeries::with_holidays(self.holidays.clone());
        series.extend(candles);
        series
    }
}
