//! Row codec for cache files.
//!
//! Rows are `;`-separated, `\n`-terminated, and start with a header naming
//! the columns. Decoding resolves columns by header name, so files written
//! with a different column order (or with `dt` instead of `time`) still load.

use crate::domain::errors::CandleError;
use crate::domain::market::Candle;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use std::sync::Arc;

pub const DELIMITER: u8 = b';';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Open,
    High,
    Low,
    Close,
    Volume,
    Time,
}

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::Open => "open",
            Column::High => "high",
            Column::Low => "low",
            Column::Close => "close",
            Column::Volume => "volume",
            Column::Time => "time",
        }
    }

    /// Maps a canonical header cell to its column
    pub fn from_header(header: &str) -> Option<Column> {
        match header.trim().to_lowercase().as_str() {
            "open" => Some(Column::Open),
            "high" => Some(Column::High),
            "low" => Some(Column::Low),
            "close" => Some(Column::Close),
            "volume" => Some(Column::Volume),
            "time" => Some(Column::Time),
            _ => None,
        }
    }

    fn format(&self, candle: &Candle) -> String {
        match self {
            Column::Open => candle.open.to_string(),
            Column::High => candle.high.to_string(),
            Column::Low => candle.low.to_string(),
            Column::Close => candle.close.to_string(),
            Column::Volume => candle.volume.to_string(),
            Column::Time => candle
                .timestamp
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }
}

/// Column layout of a cache file
pub trait RowSchema: Send + Sync {
    /// Columns in the order they are written
    fn columns(&self) -> &[Column];

    /// Extra header names read as the time column
    fn time_aliases(&self) -> &[&'static str] {
        &["dt"]
    }

    /// Column a header cell maps to; unknown headers are ignored by the decoder
    fn column_for(&self, header: &str) -> Option<Column> {
        Column::from_header(header).or_else(|| {
            let header = header.trim().to_lowercase();
            self.time_aliases()
                .iter()
                .any(|alias| *alias == header)
                .then_some(Column::Time)
        })
    }
}

/// `open;high;low;close;volume;time`
#[derive(Debug, Clone, Copy, Default)]
pub struct OhlcvSchema;

impl RowSchema for OhlcvSchema {
    fn columns(&self) -> &[Column] {
        &[
            Column::Open,
            Column::High,
            Column::Low,
            Column::Close,
            Column::Volume,
            Column::Time,
        ]
    }
}

#[derive(Clone)]
pub struct CsvCodec {
    schema: Arc<dyn RowSchema>,
}

impl Default for CsvCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvCodec {
    pub fn new() -> Self {
        Self::with_schema(Arc::new(OhlcvSchema))
    }

    pub fn with_schema(schema: Arc<dyn RowSchema>) -> Self {
        Self { schema }
    }

    /// Header row including its line terminator
    pub fn header(&self) -> String {
        let names: Vec<_> = self.schema.columns().iter().map(|c| c.name()).collect();
        format!("{}\n", names.join(&(DELIMITER as char).to_string()))
    }

    /// Encodes candles as data rows, each terminated by `\n`. No header.
    pub fn encode_rows(&self, candles: &[Candle]) -> csv::Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        for candle in candles {
            writer.write_record(self.schema.columns().iter().map(|c| c.format(candle)))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Decodes a whole file (header + rows).
    ///
    /// An empty input or a header without rows yields no candles.
    pub fn decode(&self, content: &str) -> Result<Vec<Candle>, CandleError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| malformed(1, e.to_string()))?
            .clone();
        if headers.is_empty() || headers.iter().all(str::is_empty) {
            return Ok(Vec::new());
        }

        let positions = self.resolve_positions(&headers)?;

        let mut candles = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| {
                let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
                malformed(line, e.to_string())
            })?;
            let line = record.position().map(|p| p.line() as usize).unwrap_or(0);

            if record.len() != headers.len() {
                return Err(malformed(
                    line,
                    format!(
                        "expected {} columns, found {}",
                        headers.len(),
                        record.len()
                    ),
                ));
            }

            candles.push(row_to_candle(&record, &positions, line)?);
        }

        Ok(candles)
    }

    fn resolve_positions(&self, headers: &csv::StringRecord) -> Result<Positions, CandleError> {
        let find = |column: Column| -> Result<usize, CandleError> {
            headers
                .iter()
                .position(|h| self.schema.column_for(h) == Some(column))
                .ok_or_else(|| malformed(1, format!("missing column '{}'", column.name())))
        };

        for column in self.schema.columns() {
            find(*column)?;
        }

        Ok(Positions {
            open: find(Column::Open)?,
            high: find(Column::High)?,
            low: find(Column::Low)?,
            close: find(Column::Close)?,
            volume: find(Column::Volume)?,
            time: find(Column::Time)?,
        })
    }
}

struct Positions {
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
    time: usize,
}

fn row_to_candle(
    record: &csv::StringRecord,
    positions: &Positions,
    line: usize,
) -> Result<Candle, CandleError> {
    let field = |idx: usize| record.get(idx).unwrap_or_default();
    let price = |idx: usize, name: &str| -> Result<f64, CandleError> {
        field(idx)
            .parse::<f64>()
            .map_err(|e| malformed(line, format!("{} '{}': {}", name, field(idx), e)))
    };

    let volume = field(positions.volume)
        .parse::<i64>()
        .map_err(|e| malformed(line, format!("volume '{}': {}", field(positions.volume), e)))?;
    let timestamp = parse_timestamp(field(positions.time))
        .ok_or_else(|| malformed(line, format!("time '{}' is not ISO-8601", field(positions.time))))?;

    Ok(Candle {
        open: price(positions.open, "open")?,
        high: price(positions.high, "high")?,
        low: price(positions.low, "low")?,
        close: price(positions.close, "close")?,
        volume,
        timestamp,
    })
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]+HH:MM`, naive date-times (as UTC)
/// and bare dates (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn malformed(line: usize, reason: impl Into<String>) -> CandleError {
    CandleError::MalformedRow {
        line,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, hour, min, 0).unwrap()
    }

    #[test]
    fn test_header() {
        assert_eq!(CsvCodec::new().header(), "open;high;low;close;volume;time\n");
    }

    #[test]
    fn test_encode_rows_format() {
        let codec = CsvCodec::new();
        let rows = codec
            .encode_rows(&[
                Candle::new(100.5, 101.0, 99.25, 100.0, 1200, ts(10, 0)),
                Candle::new(100.0, 100.0, 100.0, 100.0, 0, ts(10, 1)),
            ])
            .unwrap();

        assert_eq!(
            rows,
            "100.5;101;99.25;100;1200;2024-03-04T10:00:00Z\n100;100;100;100;0;2024-03-04T10:01:00Z\n"
        );
        assert_eq!(codec.encode_rows(&[]).unwrap(), "");
    }

    #[test]
    fn test_round_trip() {
        let codec = CsvCodec::new();
        let candles = vec![
            Candle::new(0.1, 0.30000000000000004, 1e-9, 12345.6789, 7, ts(9, 59)),
            Candle::new(271.5, 280.0, 270.0, 279.75, i64::MAX, ts(10, 0)),
        ];

        let content = codec.header() + &codec.encode_rows(&candles).unwrap();
        assert_eq!(codec.decode(&content).unwrap(), candles);
    }

    #[test]
    fn test_decode_by_header_name() {
        let content = "dt;volume;close;low;high;open\n2024-03-04 10:00:00+00:00;15;4.0;1.0;5.0;2.0\n";
        let candles = CsvCodec::new().decode(content).unwrap();

        assert_eq!(candles, vec![Candle::new(2.0, 5.0, 1.0, 4.0, 15, ts(10, 0))]);
    }

    #[test]
    fn test_decode_ignores_unknown_columns() {
        let content = "open;high;low;close;volume;time;is_complete\n1;2;0.5;1.5;3;2024-03-04T10:00:00;true\n";
        let candles = CsvCodec::new().decode(content).unwrap();
        assert_eq!(candles[0].timestamp, ts(10, 0));
    }

    #[test]
    fn test_decode_empty_inputs() {
        let codec = CsvCodec::new();
        assert!(codec.decode("").unwrap().is_empty());
        assert!(codec.decode(&codec.header()).unwrap().is_empty());
    }

    #[test]
    fn test_decode_wrong_column_count() {
        let content = "open;high;low;close;volume;time\n1;2;3;4;5;2024-03-04T10:00:00Z\n1;2;3;4;5\n";
        match CsvCodec::new().decode(content) {
            Err(CandleError::MalformedRow { line, reason }) => {
                assert_eq!(line, 3);
                assert!(reason.contains("expected 6 columns, found 5"));
            }
            other => panic!("expected MalformedRow, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_bad_values() {
        let codec = CsvCodec::new();
        let bad_price = "open;high;low;close;volume;time\nabc;2;3;4;5;2024-03-04T10:00:00Z\n";
        let bad_volume = "open;high;low;close;volume;time\n1;2;3;4;5.5;2024-03-04T10:00:00Z\n";
        let bad_time = "open;high;low;close;volume;time\n1;2;3;4;5;yesterday\n";

        for content in [bad_price, bad_volume, bad_time] {
            assert!(matches!(
                codec.decode(content),
                Err(CandleError::MalformedRow { line: 2, .. })
            ));
        }
    }

    #[test]
    fn test_decode_missing_column() {
        let content = "open;high;low;close;time\n1;2;3;4;2024-03-04T10:00:00Z\n";
        match CsvCodec::new().decode(content) {
            Err(CandleError::MalformedRow { line, reason }) => {
                assert_eq!(line, 1);
                assert!(reason.contains("volume"));
            }
            other => panic!("expected MalformedRow, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = ts(10, 0);
        assert_eq!(parse_timestamp("2024-03-04T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-04T13:00:00+03:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-04 10:00:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-04 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-03-04T10:00:00.000"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-03-04"),
            Some(Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("04.03.2024"), None);
    }
}
