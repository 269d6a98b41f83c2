use crate::domain::errors::CandleError;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sampling granularity of a candle series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CandleInterval {
    Min1,
    Min2,
    Min3,
    Min5,
    Min10,
    Min15,
    Min30,
    Hour,
    Hour2,
    Hour4,
    Day,
    Week,
    Month,
}

impl CandleInterval {
    /// Returns the nominal length of this interval in minutes
    pub fn to_minutes(&self) -> i64 {
        match self {
            CandleInterval::Min1 => 1,
            CandleInterval::Min2 => 2,
            CandleInterval::Min3 => 3,
            CandleInterval::Min5 => 5,
            CandleInterval::Min10 => 10,
            CandleInterval::Min15 => 15,
            CandleInterval::Min30 => 30,
            CandleInterval::Hour => 60,
            CandleInterval::Hour2 => 120,
            CandleInterval::Hour4 => 240,
            CandleInterval::Day => 1440,
            CandleInterval::Week => 10080,
            CandleInterval::Month => 43200,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.to_minutes())
    }

    /// True for every interval shorter than a day.
    pub fn is_intraday(&self) -> bool {
        self.to_minutes() < CandleInterval::Day.to_minutes()
    }

    /// Largest tail gap a cache file may have before it is considered stale.
    ///
    /// One interval plus one minute, so a bar that is still being formed
    /// at the exchange does not trigger a refetch. `None` for daily and
    /// longer intervals, which are compared by calendar date instead.
    pub fn append_tolerance(&self) -> Option<Duration> {
        if self.is_intraday() {
            Some(Duration::minutes(self.to_minutes() + 1))
        } else {
            None
        }
    }

    /// Directory name used to partition the cache by interval
    pub fn dir_name(&self) -> &'static str {
        match self {
            CandleInterval::Min1 => "1min",
            CandleInterval::Min2 => "2min",
            CandleInterval::Min3 => "3min",
            CandleInterval::Min5 => "5min",
            CandleInterval::Min10 => "10min",
            CandleInterval::Min15 => "15min",
            CandleInterval::Min30 => "30min",
            CandleInterval::Hour => "1hour",
            CandleInterval::Hour2 => "2hour",
            CandleInterval::Hour4 => "4hour",
            CandleInterval::Day => "1day",
            CandleInterval::Week => "1week",
            CandleInterval::Month => "1month",
        }
    }

    /// Converts to Binance API interval string, if Binance serves this granularity
    pub fn to_binance_string(&self) -> Option<&'static str> {
        match self {
            CandleInterval::Min1 => Some("1m"),
            CandleInterval::Min3 => Some("3m"),
            CandleInterval::Min5 => Some("5m"),
            CandleInterval::Min15 => Some("15m"),
            CandleInterval::Min30 => Some("30m"),
            CandleInterval::Hour => Some("1h"),
            CandleInterval::Hour2 => Some("2h"),
            CandleInterval::Hour4 => Some("4h"),
            CandleInterval::Day => Some("1d"),
            CandleInterval::Week => Some("1w"),
            CandleInterval::Month => Some("1M"),
            CandleInterval::Min2 | CandleInterval::Min10 => None,
        }
    }

    /// Returns all intervals in ascending order
    pub fn all() -> Vec<CandleInterval> {
        vec![
            CandleInterval::Min1,
            CandleInterval::Min2,
            CandleInterval::Min3,
            CandleInterval::Min5,
            CandleInterval::Min10,
            CandleInterval::Min15,
            CandleInterval::Min30,
            CandleInterval::Hour,
            CandleInterval::Hour2,
            CandleInterval::Hour4,
            CandleInterval::Day,
            CandleInterval::Week,
            CandleInterval::Month,
        ]
    }
}

impl FromStr for CandleInterval {
    type Err = CandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1m" | "1min" | "min_1" => Ok(CandleInterval::Min1),
            "2m" | "2min" | "min_2" => Ok(CandleInterval::Min2),
            "3m" | "3min" | "min_3" => Ok(CandleInterval::Min3),
            "5m" | "5min" | "min_5" => Ok(CandleInterval::Min5),
            "10m" | "10min" | "min_10" => Ok(CandleInterval::Min10),
            "15m" | "15min" | "min_15" => Ok(CandleInterval::Min15),
            "30m" | "30min" | "min_30" => Ok(CandleInterval::Min30),
            "1h" | "1hour" | "hour" => Ok(CandleInterval::Hour),
            "2h" | "2hour" | "hour_2" => Ok(CandleInterval::Hour2),
            "4h" | "4hour" | "hour_4" => Ok(CandleInterval::Hour4),
            "1d" | "1day" | "day" => Ok(CandleInterval::Day),
            "1w" | "1week" | "week" => Ok(CandleInterval::Week),
            "1mo" | "1month" | "month" => Ok(CandleInterval::Month),
            _ => Err(CandleError::UnexpectedInterval(s.to_string())),
        }
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
