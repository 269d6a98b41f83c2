use crate::domain::errors::StoreError;
use crate::domain::market::{CandleInterval, CandleSeries, HolidayCalendar};
use crate::infrastructure::persistence::csv_codec::CsvCodec;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

pub const FILE_EXTENSION: &str = "csv";

/// Cache file of one instrument at one interval.
///
/// Lives at `<base_dir>/<interval>/<instrument_id>.csv`. The file only
/// grows: forward through [`append`](Self::append), backward through
/// [`insert`](Self::insert). A single writer per file is assumed.
pub struct CsvCandleStore {
    instrument_id: String,
    interval: CandleInterval,
    path: PathBuf,
    codec: CsvCodec,
    holidays: Arc<HolidayCalendar>,
}

impl CsvCandleStore {
    pub fn new(
        base_dir: impl AsRef<Path>,
        instrument_id: impl Into<String>,
        interval: CandleInterval,
    ) -> Self {
        let instrument_id = instrument_id.into();
        let path = base_dir
            .as_ref()
            .join(interval.dir_name())
            .join(format!("{}.{}", instrument_id, FILE_EXTENSION));

        Self {
            instrument_id,
            interval,
            path,
            codec: CsvCodec::new(),
            holidays: Arc::default(),
        }
    }

    pub fn with_codec(mut self, codec: CsvCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Calendar attached to every series this store returns
    pub fn with_holidays(mut self, holidays: Arc<HolidayCalendar>) -> Self {
        self.holidays = holidays;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn interval(&self) -> CandleInterval {
        self.interval
    }

    pub async fn exists(&self) -> Result<bool, StoreError> {
        fs::try_exists(&self.path).await.map_err(|e| self.io_error(e))
    }

    /// Every cached candle, in file order
    pub async fn read_all(&self) -> Result<CandleSeries, StoreError> {
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        let candles = self.codec.decode(&content)?;

        let mut series = CandleSeries::with_holidays(self.holidays.clone());
        series.extend(candles);
        Ok(series)
    }

    /// Cached candles with `from <= timestamp <= to`.
    ///
    /// Fails with a gap signal when the file does not cover the window:
    /// `NeedInsert` when the first cached bar is later than `from` (a daily
    /// file starting on `from`'s date counts as covering it), otherwise
    /// `NeedAppend` when the last cached bar is stale relative to `to`.
    pub async fn read(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CandleSeries, StoreError> {
        let all = self.read_all().await?;
        self.covering(all, from, to)
    }

    /// Applies the window checks of [`read`](Self::read) to an already
    /// loaded file content.
    pub fn covering(
        &self,
        all: CandleSeries,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<CandleSeries, StoreError> {
        let (Some(first), Some(last)) = (all.first().copied(), all.last().copied()) else {
            return Ok(all);
        };

        let window = all.window(from, to);

        let same_day_daily =
            self.interval == CandleInterval::Day && first.timestamp.date_naive() == from.date_naive();
        if first.timestamp > from && !same_day_daily {
            debug!(
                "CsvCandleStore: {:?} starts at {}, requested from {}",
                self.path, first.timestamp, from
            );
            return Err(StoreError::NeedInsert {
                boundary: first.timestamp,
            });
        }

        if last.timestamp < to && self.tail_is_stale(last.timestamp, to) {
            debug!(
                "CsvCandleStore: {:?} ends at {}, requested to {}",
                self.path, last.timestamp, to
            );
            return Err(StoreError::NeedAppend {
                boundary: last.timestamp,
                partial: window,
            });
        }

        Ok(window)
    }

    fn tail_is_stale(&self, last: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        match self.interval.append_tolerance() {
            Some(tolerance) => last.date_naive() == to.date_naive() && to - last > tolerance,
            None => self.interval == CandleInterval::Day && last.date_naive() < to.date_naive(),
        }
    }

    /// Appends rows after the current tail. The caller guarantees they are
    /// later than the last cached candle.
    pub async fn append(&self, candles: &CandleSeries) -> Result<(), StoreError> {
        if candles.is_empty() {
            return Ok(());
        }

        let rows = self.codec.encode_rows(candles.as_slice())?;
        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(rows.as_bytes())
            .await
            .map_err(|e| self.io_error(e))?;
        file.flush().await.map_err(|e| self.io_error(e))?;

        info!(
            "CsvCandleStore: Appended {} candles to {:?}",
            candles.len(),
            self.path
        );
        Ok(())
    }

    /// Prepends rows before the current head, keeping existing rows as they are.
    ///
    /// The new content is written to a sibling temp file and renamed over the
    /// cache file, so a crash leaves either the old or the new file.
    pub async fn insert(&self, candles: &CandleSeries) -> Result<(), StoreError> {
        let header = self.codec.header();
        let existing = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(self.io_error(e)),
        };

        let body = match existing.split_once('\n') {
            Some((stored_header, body)) if format!("{}\n", stored_header.trim_end()) == header => {
                body.to_string()
            }
            // Header in another layout: re-encode the body with ours
            Some(_) => {
                let decoded = self.codec.decode(&existing)?;
                self.codec.encode_rows(&decoded)?
            }
            None => String::new(),
        };

        let mut content = header;
        content.push_str(&self.codec.encode_rows(candles.as_slice())?);
        content.push_str(&body);
        if !content.ends_with('\n') {
            content.push('\n');
        }

        let temp_path = self.path.with_extension(format!("{}.tmp", FILE_EXTENSION));
        fs::write(&temp_path, content)
            .await
            .map_err(|e| self.io_error(e))?;
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;

        info!(
            "CsvCandleStore: Inserted {} candles at the head of {:?}",
            candles.len(),
            self.path
        );
        Ok(())
    }

    /// Truncates the file to a bare header, creating directories as needed.
    pub async fn prepare_new(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        fs::write(&self.path, self.codec.header())
            .await
            .map_err(|e| self.io_error(e))?;

        info!("CsvCandleStore: Created cache file {:?}", self.path);
        Ok(())
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
