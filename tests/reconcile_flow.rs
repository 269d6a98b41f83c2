use candlecache::application::{CandleCache, SyncRequest};
use candlecache::domain::errors::CacheError;
use candlecache::domain::market::{Candle, CandleInterval, HolidayCalendar, MathOperation};
use candlecache::infrastructure::InMemoryCandleSource;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_base_dir() -> PathBuf {
    let unique_id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!(
        "candlecache_flow_{}_{}",
        std::process::id(),
        unique_id
    ))
}

fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, 7, 0, 0).unwrap()
}

fn daily(instrument_price: f64, days: std::ops::RangeInclusive<u32>) -> Vec<Candle> {
    days.map(|d| {
        let p = instrument_price + d as f64;
        Candle::new(p, p + 1.0, p - 1.0, p + 0.5, 100 * d as i64, day(d))
    })
    .collect()
}

#[tokio::test]
async fn test_cache_grows_both_ways_and_stays_ordered() {
    let base = temp_base_dir();
    let source = InMemoryCandleSource::new();
    source.seed("SBER", CandleInterval::Day, daily(250.0, 1..=29));
    let source = Arc::new(source);
    let cache = CandleCache::new(&base, source.clone());

    // Middle of the month first, then widen on both sides
    let middle = cache
        .download_or_read("SBER", CandleInterval::Day, day(11), day(15))
        .await
        .unwrap();
    assert_eq!(middle.len(), 5);

    let wide = cache
        .download_or_read("SBER", CandleInterval::Day, day(4), day(22))
        .await
        .unwrap();
    assert_eq!(wide.len(), 19);
    assert!(wide.check_time_order().is_ok());
    assert_eq!(wide.first().unwrap().timestamp, day(4));
    assert_eq!(wide.last().unwrap().timestamp, day(22));

    let on_disk = cache
        .store("SBER", CandleInterval::Day)
        .read_all()
        .await
        .unwrap();
    assert_eq!(on_disk.len(), 19);
    assert!(on_disk.check_time_order().is_ok());

    // Fully cached window needs no more fetches
    let fetches = source.calls().len();
    cache
        .download_or_read("SBER", CandleInterval::Day, day(5), day(20))
        .await
        .unwrap();
    assert_eq!(source.calls().len(), fetches);

    tokio::fs::remove_dir_all(base).await.ok();
}

#[tokio::test]
async fn test_daily_request_from_midnight_uses_same_day_bar() {
    let base = temp_base_dir();
    let source = InMemoryCandleSource::new();
    source.seed("SBER", CandleInterval::Day, daily(250.0, 4..=8));
    let source = Arc::new(source);
    let cache = CandleCache::new(&base, source.clone());

    cache
        .download_or_read("SBER", CandleInterval::Day, day(4), day(8))
        .await
        .unwrap();

    // The bar of the 4th opens at 07:00, after midnight, yet covers the day
    let midnight = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
    let series = cache
        .download_or_read("SBER", CandleInterval::Day, midnight, day(8))
        .await
        .unwrap();
    assert_eq!(series.len(), 5);
    assert_eq!(source.calls().len(), 1);

    tokio::fs::remove_dir_all(base).await.ok();
}

#[tokio::test]
async fn test_spread_of_two_cached_instruments() {
    let base = temp_base_dir();
    let source = InMemoryCandleSource::new();
    source.seed("SBER", CandleInterval::Day, daily(250.0, 1..=15));
    source.seed("SBERP", CandleInterval::Day, daily(240.0, 1..=15));
    let holidays = Arc::new(HolidayCalendar::from_dates([
        NaiveDate::from_ymd_opt(2024, 3, 8).unwrap(),
    ]));
    let cache = CandleCache::new(&base, Arc::new(source)).with_holidays(holidays);

    let results = cache
        .sync_many(&[
            SyncRequest::new("SBER", CandleInterval::Day, day(1), day(15)),
            SyncRequest::new("SBERP", CandleInterval::Day, day(1), day(15)),
        ])
        .await;
    let mut results = results.into_iter();
    let lhs = results.next().unwrap().unwrap();
    let rhs = results.next().unwrap().unwrap();

    let spread = lhs.combine(&rhs, MathOperation::Sub).unwrap();
    assert_eq!(spread.len(), 15);
    assert!(spread.iter().all(|c| (c.close - 10.0).abs() < 1e-9));
    assert_eq!(spread.first().unwrap().volume, 200);

    // Mar 2-3 and 9-10 are weekends; Mar 8 is a holiday
    let trading = spread.trading_days_only();
    assert_eq!(trading.len(), 10);
    assert!(
        trading
            .iter()
            .all(|c| c.timestamp.date_naive() != NaiveDate::from_ymd_opt(2024, 3, 8).unwrap())
    );

    // Volumes differ day to day, so nothing collapses
    assert_eq!(spread.collapse_repeats().len(), 15);

    tokio::fs::remove_dir_all(base).await.ok();
}

#[tokio::test]
async fn test_unreachable_head_is_reported() {
    let base = temp_base_dir();
    let source = InMemoryCandleSource::new().failing("source offline");
    let cache = CandleCache::new(&base, Arc::new(source));

    let err = cache
        .download_or_read(
            "SBER",
            CandleInterval::Min5,
            day(4),
            day(4) + Duration::hours(1),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Source(_)));

    // The cache file was still prepared
    assert!(
        cache
            .store("SBER", CandleInterval::Min5)
            .exists()
            .await
            .unwrap()
    );
    tokio::fs::remove_dir_all(base).await.ok();
}
