//! Non-trading dates used to filter candle series.
//!
//! A calendar is a plain set of dates. It can be built from any list,
//! loaded from a text file (one `YYYY-MM-DD` per line, `#` comments allowed),
//! or generated for the Moscow Exchange from the official fixed-date
//! public holidays of the Russian Federation.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Utc, Weekday};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::info;

/// Earliest year covered by generated calendars
pub const FIRST_CALENDAR_YEAR: i32 = 1970;

/// How many years past the current one generated calendars reach
const YEARS_AHEAD: i32 = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayCalendar {
    dates: BTreeSet<NaiveDate>,
}

impl HolidayCalendar {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_dates(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    /// Russian public holidays from 1970 through four years past the current year.
    pub fn russia() -> Self {
        Self::russia_for_years(FIRST_CALENDAR_YEAR, Utc::now().year() + YEARS_AHEAD)
    }

    /// Russian public holidays for `first_year..=last_year`.
    ///
    /// The exchange trades through the extended New Year break, so
    /// January 3-8 are not treated as holidays, and 2023-05-08 (a
    /// transferred day off) was a regular session.
    pub fn russia_for_years(first_year: i32, last_year: i32) -> Self {
        let mut dates = BTreeSet::new();
        for year in first_year..=last_year {
            for rule in RU_HOLIDAYS {
                if year < rule.since || rule.until.is_some_and(|until| year > until) {
                    continue;
                }
                if let Some(date) = NaiveDate::from_ymd_opt(year, rule.month, rule.day) {
                    dates.insert(date);
                }
            }
        }

        let calendar = Self { dates };
        calendar.without(|date| {
            (date.month() == 1 && (3..=8).contains(&date.day()))
                || NaiveDate::from_ymd_opt(2023, 5, 8) == Some(*date)
        })
    }

    /// Loads a calendar from a text file with one ISO date per line.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read holiday file {:?}", path))?;

        let mut dates = BTreeSet::new();
        for (idx, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let date = NaiveDate::parse_from_str(line, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{}' at line {} of {:?}", line, idx + 1, path)
            })?;
            dates.insert(date);
        }

        info!("Loaded {} holidays from {:?}", dates.len(), path);
        Ok(Self { dates })
    }

    /// Returns a copy with every date matching `predicate` removed.
    pub fn without(mut self, predicate: impl Fn(&NaiveDate) -> bool) -> Self {
        self.dates.retain(|date| !predicate(date));
        self
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NaiveDate> {
        self.dates.iter()
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

struct AnnualHoliday {
    month: u32,
    day: u32,
    since: i32,
    until: Option<i32>,
}

const fn annual(month: u32, day: u32, since: i32, until: Option<i32>) -> AnnualHoliday {
    AnnualHoliday {
        month,
        day,
        since,
        until,
    }
}

// Fixed-date public holidays. Weekend transfers are decree-based and not generated.
const RU_HOLIDAYS: &[AnnualHoliday] = &[
    annual(1, 1, 1970, None),
    annual(1, 2, 1992, None),
    annual(1, 7, 1991, None),
    annual(2, 23, 2002, None),
    annual(3, 8, 1970, None),
    annual(5, 1, 1970, None),
    annual(5, 2, 1970, Some(2004)),
    annual(5, 9, 1970, None),
    annual(6, 12, 1992, None),
    annual(11, 4, 2005, None),
    annual(11, 7, 1970, Some(2004)),
    annual(11, 8, 1970, Some(1991)),
    annual(12, 12, 1994, Some(2004)),
];
