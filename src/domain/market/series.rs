use crate::domain::errors::CandleError;
use crate::domain::market::candle::{Candle, MathOperation};
use crate::domain::market::holidays::{HolidayCalendar, is_weekend};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::sync::Arc;

/// Chronologically ordered candles plus the holiday calendar used to filter them.
///
/// Order is not enforced on push; call [`CandleSeries::check_time_order`]
/// after assembling a series from an untrusted source.
#[derive(Debug, Clone, Default)]
pub struct CandleSeries {
    candles: Vec<Candle>,
    holidays: Arc<HolidayCalendar>,
}

impl PartialEq for CandleSeries {
    fn eq(&self, other: &Self) -> bool {
        self.candles == other.candles
    }
}

impl CandleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_holidays(holidays: Arc<HolidayCalendar>) -> Self {
        Self {
            candles: Vec::new(),
            holidays,
        }
    }

    pub fn from_candles(candles: Vec<Candle>) -> Self {
        Self {
            candles,
            holidays: Arc::default(),
        }
    }

    /// Builds a series sharing this series' holiday calendar
    pub fn derive(&self, candles: Vec<Candle>) -> Self {
        Self {
            candles,
            holidays: self.holidays.clone(),
        }
    }

    pub fn holidays(&self) -> &Arc<HolidayCalendar> {
        &self.holidays
    }

    pub fn push(&mut self, candle: Candle) {
        self.candles.push(candle);
    }

    pub fn extend(&mut self, candles: impl IntoIterator<Item = Candle>) {
        self.candles.extend(candles);
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn first(&self) -> Option<&Candle> {
        self.candles.first()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn into_candles(self) -> Vec<Candle> {
        self.candles
    }

    /// Candles with `from <= timestamp <= to`
    pub fn window(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.filtered(|c| from <= c.timestamp && c.timestamp <= to)
    }

    fn filtered(&self, keep: impl Fn(&Candle) -> bool) -> Self {
        self.derive(self.candles.iter().filter(|c| keep(c)).copied().collect())
    }

    /// Fails on the first candle whose timestamp precedes its predecessor's.
    pub fn check_time_order(&self) -> Result<(), CandleError> {
        for (idx, pair) in self.candles.windows(2).enumerate() {
            if pair[0].timestamp > pair[1].timestamp {
                return Err(CandleError::OutOfOrder {
                    index: idx + 1,
                    previous: pair[0].timestamp,
                    current: pair[1].timestamp,
                });
            }
        }
        Ok(())
    }

    /// Drops bars that repeat the previously retained bar under a new timestamp.
    ///
    /// The last candle of the input is always kept, even when it repeats
    /// its predecessor, so a trailing duplicate pair survives intact.
    pub fn collapse_repeats(&self) -> Self {
        let last_idx = self.candles.len().saturating_sub(1);
        let mut kept: Vec<Candle> = Vec::with_capacity(self.candles.len());

        for (idx, candle) in self.candles.iter().enumerate() {
            let repeats_previous = kept.last().is_some_and(|prev| {
                prev.same_ohlcv(candle) && prev.timestamp != candle.timestamp
            });
            if idx == last_idx || !repeats_previous {
                kept.push(*candle);
            }
        }

        self.derive(kept)
    }

    pub fn exclude_weekends(&self) -> Self {
        self.filtered(|c| !is_weekend(c.timestamp.date_naive()))
    }

    pub fn exclude_holidays(&self, calendar: &HolidayCalendar) -> Self {
        self.filtered(|c| !calendar.contains(c.timestamp.date_naive()))
    }

    pub fn exclude_weekends_and_holidays(&self, calendar: &HolidayCalendar) -> Self {
        self.filtered(|c| {
            let date = c.timestamp.date_naive();
            !is_weekend(date) && !calendar.contains(date)
        })
    }

    /// Weekend and holiday filter using the calendar this series carries
    pub fn trading_days_only(&self) -> Self {
        self.exclude_weekends_and_holidays(&self.holidays)
    }

    pub fn scale(&self, factor: f64) -> Self {
        self.derive(self.candles.iter().map(|c| c.scale(factor)).collect())
    }

    /// Aligns two series by timestamp and combines them candle by candle.
    ///
    /// Where one side has no bar at the other side's timestamp, its last
    /// exact value is held (stale-value merge, no interpolation). A leading
    /// bar with nothing to hold against on the other side is skipped.
    ///
    /// # Panics
    /// When the cursors do not reach the ends of both series together. That
    /// means the inputs do not advance at a comparable cadence and any
    /// output would silently misalign.
    pub fn combine(&self, other: &CandleSeries, op: MathOperation) -> Result<Self, CandleError> {
        if self.is_empty() || other.is_empty() {
            return Err(CandleError::EmptySeries);
        }

        let (lhs, rhs) = (&self.candles, &other.candles);
        let mut combined = Vec::with_capacity(lhs.len().max(rhs.len()));
        let (mut i, mut j) = (0usize, 0usize);

        while i < lhs.len() && j < rhs.len() {
            let (a, b) = (&lhs[i], &rhs[j]);
            let pair = match a.timestamp.cmp(&b.timestamp) {
                Ordering::Equal => {
                    i += 1;
                    j += 1;
                    Some((a, b))
                }
                Ordering::Greater => {
                    j += 1;
                    i.checked_sub(1).map(|prev| (&lhs[prev], b))
                }
                Ordering::Less => {
                    i += 1;
                    j.checked_sub(1).map(|prev| (a, &rhs[prev]))
                }
            };

            if let Some((a, b)) = pair {
                combined.push(a.combine(b, op));
            }
        }

        assert!(
            i == lhs.len() && j == rhs.len(),
            "merge shape mismatch: {} stopped at {}/{} and {}/{}",
            op,
            i,
            lhs.len(),
            j,
            rhs.len()
        );

        Ok(self.derive(combined))
    }

    pub fn add(&self, other: &CandleSeries) -> Result<Self, CandleError> {
        self.combine(other, MathOperation::Add)
    }

    pub fn sub(&self, other: &CandleSeries) -> Result<Self, CandleError> {
        self.combine(other, MathOperation::Sub)
    }

    pub fn mul(&self, other: &CandleSeries) -> Result<Self, CandleError> {
        self.combine(other, MathOperation::Mul)
    }

    pub fn div(&self, other: &CandleSeries) -> Result<Self, CandleError> {
        self.combine(other, MathOperation::Div)
    }
}

impl FromIterator<Candle> for CandleSeries {
    fn from_iter<T: IntoIterator<Item = Candle>>(iter: T) -> Self {
        Self::from_candles(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a CandleSeries {
    type Item = &'a Candle;
    type IntoIter = std::slice::Iter<'a, Candle>;

    fn into_iter(self) -> Self::IntoIter {
        self.candles.iter()
    }
}

impl IntoIterator for CandleSeries {
    type Item = Candle;
    type IntoIter = std::vec::IntoIter<Candle>;

    fn into_iter(self) -> Self::IntoIter {
        self.candles.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn at(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, min, 0).unwrap()
    }

    fn flat(price: f64, volume: i64, ts: DateTime<Utc>) -> Candle {
        Candle::new(price, price, price, price, volume, ts)
    }

    fn minutes(prices: &[(u32, f64)]) -> CandleSeries {
        prices
            .iter()
            .map(|(min, price)| flat(*price, 1, at(4, 10, *min)))
            .collect()
    }

    #[test]
    fn test_check_time_order() {
        let mut series = minutes(&[(0, 1.0), (1, 2.0), (2, 3.0)]);
        assert!(series.check_time_order().is_ok());

        series.push(flat(4.0, 1, at(4, 10, 1)));
        match series.check_time_order() {
            Err(CandleError::OutOfOrder { index, .. }) => assert_eq!(index, 3),
            other => panic!("expected OutOfOrder, got {:?}", other),
        }
    }

    #[test]
    fn test_equal_timestamps_are_in_order() {
        let series = minutes(&[(0, 1.0), (0, 2.0)]);
        assert!(series.check_time_order().is_ok());
    }

    #[test]
    fn test_collapse_repeats_drops_repeated_bars() {
        let series = minutes(&[(0, 1.0), (1, 1.0), (2, 1.0), (3, 2.0), (4, 3.0)]);
        let collapsed = series.collapse_repeats();

        let stamps: Vec<_> = collapsed.iter().map(|c| c.timestamp).collect();
        assert_eq!(stamps, vec![at(4, 10, 0), at(4, 10, 3), at(4, 10, 4)]);
    }

    #[test]
    fn test_collapse_repeats_keeps_trailing_duplicate_pair() {
        let series = minutes(&[(0, 5.0), (1, 1.0), (2, 1.0)]);
        let collapsed = series.collapse_repeats();

        assert_eq!(collapsed.len(), 3);
        assert_eq!(collapsed.last().unwrap().timestamp, at(4, 10, 2));
    }

    #[test]
    fn test_collapse_repeats_keeps_same_timestamp_copies() {
        let series = minutes(&[(0, 1.0), (0, 1.0), (1, 2.0)]);
        assert_eq!(series.collapse_repeats().len(), 3);
    }

    #[test]
    fn test_collapse_repeats_is_idempotent() {
        let series = minutes(&[(0, 1.0), (1, 1.0), (2, 2.0), (3, 2.0), (4, 2.0), (5, 3.0)]);
        let once = series.collapse_repeats();
        let twice = once.collapse_repeats();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_collapse_repeats_empty() {
        assert!(CandleSeries::new().collapse_repeats().is_empty());
    }

    #[test]
    fn test_exclude_weekends_and_holidays() {
        // 2024-03-08 is a Friday holiday, 9th/10th a weekend
        let series: CandleSeries = (7..=11).map(|day| flat(1.0, 1, at(day, 12, 0))).collect();
        let holidays = HolidayCalendar::from_dates([NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()]);

        assert_eq!(series.exclude_weekends().len(), 3);
        assert_eq!(series.exclude_holidays(&holidays).len(), 4);

        let days: Vec<_> = series
            .exclude_weekends_and_holidays(&holidays)
            .iter()
            .map(|c| c.timestamp)
            .collect();
        assert_eq!(days, vec![at(7, 12, 0), at(11, 12, 0)]);
    }

    #[test]
    fn test_trading_days_uses_attached_calendar() {
        let holidays = Arc::new(HolidayCalendar::from_dates([
            NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
        ]));
        let mut series = CandleSeries::with_holidays(holidays);
        series.extend((7..=11).map(|day| flat(1.0, 1, at(day, 12, 0))));

        let filtered = series.trading_days_only();
        assert_eq!(filtered.len(), 2);
        assert!(filtered.holidays().contains(NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()));
    }

    #[test]
    fn test_add_single_candles() {
        let a: CandleSeries = [Candle::new(1.0, 2.0, 0.0, 1.0, 10, at(4, 10, 0))]
            .into_iter()
            .collect();
        let b: CandleSeries = [Candle::new(2.0, 3.0, 1.0, 2.0, 20, at(4, 10, 0))]
            .into_iter()
            .collect();

        let sum = a.add(&b).unwrap();
        assert_eq!(sum.as_slice(), &[Candle::new(3.0, 5.0, 1.0, 3.0, 30, at(4, 10, 0))]);
    }

    #[test]
    fn test_combine_holds_stale_values() {
        let a = minutes(&[(0, 10.0), (2, 30.0)]);
        let b = minutes(&[(0, 1.0), (1, 2.0), (2, 3.0)]);

        let diff = a.sub(&b).unwrap();
        let closes: Vec<_> = diff.iter().map(|c| (c.timestamp, c.close)).collect();
        assert_eq!(
            closes,
            vec![(at(4, 10, 0), 9.0), (at(4, 10, 1), 8.0), (at(4, 10, 2), 27.0)]
        );

        let ratio = b.div(&a).unwrap();
        let closes: Vec<_> = ratio.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![0.1, 0.2, 0.1]);
    }

    #[test]
    fn test_combine_skips_leading_bar_without_history() {
        let a = minutes(&[(1, 10.0), (2, 20.0)]);
        let b = minutes(&[(0, 1.0), (1, 2.0), (2, 3.0)]);

        let product = a.mul(&b).unwrap();
        let closes: Vec<_> = product.iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![20.0, 60.0]);
    }

    #[test]
    fn test_combine_rejects_empty() {
        let a = minutes(&[(0, 1.0)]);
        assert!(matches!(
            a.add(&CandleSeries::new()),
            Err(CandleError::EmptySeries)
        ));
        assert!(matches!(
            CandleSeries::new().add(&a),
            Err(CandleError::EmptySeries)
        ));
    }

    #[test]
    #[should_panic(expected = "merge shape mismatch")]
    fn test_combine_mismatched_tails_is_fatal() {
        let a = minutes(&[(0, 1.0), (1, 2.0)]);
        let b = minutes(&[(0, 1.0), (1, 2.0), (2, 3.0)]);
        let _ = a.add(&b);
    }

    #[test]
    fn test_scale() {
        let series = minutes(&[(0, 1.0), (1, 2.0)]);
        let closes: Vec<_> = series.scale(10.0).iter().map(|c| c.close).collect();
        assert_eq!(closes, vec![10.0, 20.0]);
    }

    #[test]
    fn test_window_is_inclusive() {
        let series = minutes(&[(0, 1.0), (1, 2.0), (2, 3.0), (3, 4.0)]);
        let window = series.window(at(4, 10, 1), at(4, 10, 2));
        assert_eq!(window.len(), 2);
    }
}
