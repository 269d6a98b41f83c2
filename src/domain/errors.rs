use crate::domain::market::series::CandleSeries;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by candle values, series and the row codec
#[derive(Debug, Error)]
pub enum CandleError {
    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("Candle #{index} at {current} is earlier than its predecessor at {previous}")]
    OutOfOrder {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("Cannot combine candle series: one of the operands is empty")]
    EmptySeries,

    #[error("Unexpected candle interval: '{0}'")]
    UnexpectedInterval(String),
}

/// Outcomes of a cache file operation that are not a plain series.
///
/// `NeedInsert` and `NeedAppend` are gap signals consumed by the
/// reconciler; the remaining variants are real failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cache starts at {boundary}, after the requested window start")]
    NeedInsert { boundary: DateTime<Utc> },

    #[error("Cache ends at {boundary}, before the requested window end")]
    NeedAppend {
        boundary: DateTime<Utc>,
        partial: CandleSeries,
    },

    #[error(transparent)]
    Codec(#[from] CandleError),

    #[error("Failed to encode rows: {0}")]
    Encode(#[from] csv::Error),

    #[error("I/O failure on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Terminal failures of a reconciled cache read
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(
        "First cached candle of {path:?} stays at {boundary} after backfilling from {from}: source is inconsistent with the cache"
    )]
    IncorrectFirstCandle {
        path: PathBuf,
        from: DateTime<Utc>,
        boundary: DateTime<Utc>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] anyhow::Error),
}
