//! Cache location and trading calendar settings.

use crate::domain::market::HolidayCalendar;
use anyhow::Result;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_CACHE_DIR: &str = "data/candles";

/// Built-in holiday calendars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalendarKind {
    #[default]
    None,
    Russia,
}

impl FromStr for CalendarKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "" => Ok(CalendarKind::None),
            "ru" | "russia" | "moex" => Ok(CalendarKind::Russia),
            _ => anyhow::bail!("Invalid HOLIDAY_CALENDAR: {}. Must be 'none' or 'ru'", s),
        }
    }
}

/// Cache environment configuration
#[derive(Debug, Clone)]
pub struct CacheEnvConfig {
    pub cache_dir: PathBuf,
    pub calendar: CalendarKind,
    /// Overrides `calendar` when set
    pub holiday_file: Option<PathBuf>,
}

impl Default for CacheEnvConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            calendar: CalendarKind::None,
            holiday_file: None,
        }
    }
}

impl CacheEnvConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let calendar = match lookup("HOLIDAY_CALENDAR") {
            Some(value) => CalendarKind::from_str(&value)?,
            None => CalendarKind::None,
        };

        Ok(Self {
            cache_dir: lookup("CANDLE_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
            calendar,
            holiday_file: lookup("HOLIDAY_FILE")
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn holidays(&self) -> Result<HolidayCalendar> {
        if let Some(path) = &self.holiday_file {
            return HolidayCalendar::load(path);
        }
        Ok(match self.calendar {
            CalendarKind::None => HolidayCalendar::empty(),
            CalendarKind::Russia => HolidayCalendar::russia(),
        })
    }
}
