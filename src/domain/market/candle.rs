use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Field-wise operation applied when two candles are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MathOperation {
    Add,
    Sub,
    Mul,
    Div,
}

impl MathOperation {
    fn apply(&self, lhs: f64, rhs: f64) -> f64 {
        match self {
            MathOperation::Add => lhs + rhs,
            MathOperation::Sub => lhs - rhs,
            MathOperation::Mul => lhs * rhs,
            MathOperation::Div => lhs / rhs,
        }
    }
}

impl fmt::Display for MathOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MathOperation::Add => write!(f, "add"),
            MathOperation::Sub => write!(f, "sub"),
            MathOperation::Mul => write!(f, "mul"),
            MathOperation::Div => write!(f, "div"),
        }
    }
}

impl FromStr for MathOperation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "add" | "+" => Ok(MathOperation::Add),
            "sub" | "-" => Ok(MathOperation::Sub),
            "mul" | "*" => Ok(MathOperation::Mul),
            "div" | "/" => Ok(MathOperation::Div),
            _ => anyhow::bail!("Invalid operation: '{}'. Valid options: add, sub, mul, div", s),
        }
    }
}

/// One OHLCV bar. Immutable: every operation returns a new value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    pub timestamp: DateTime<Utc>,
}

impl Candle {
    pub fn new(
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: i64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
            timestamp,
        }
    }

    /// Combines two candles field-wise on OHLC.
    ///
    /// Volume is summed (saturating) for every operation and the result
    /// carries the later of the two timestamps.
    pub fn combine(&self, other: &Candle, op: MathOperation) -> Candle {
        Candle {
            open: op.apply(self.open, other.open),
            high: op.apply(self.high, other.high),
            low: op.apply(self.low, other.low),
            close: op.apply(self.close, other.close),
            volume: self.volume.saturating_add(other.volume),
            timestamp: self.timestamp.max(other.timestamp),
        }
    }

    pub fn add_candles(&self, other: &Candle) -> Candle {
        self.combine(other, MathOperation::Add)
    }

    pub fn sub_candles(&self, other: &Candle) -> Candle {
        self.combine(other, MathOperation::Sub)
    }

    pub fn mul_candles(&self, other: &Candle) -> Candle {
        self.combine(other, MathOperation::Mul)
    }

    pub fn div_candles(&self, other: &Candle) -> Candle {
        self.combine(other, MathOperation::Div)
    }

    /// Scales OHLC by a constant; volume and timestamp are kept.
    pub fn scale(&self, factor: f64) -> Candle {
        Candle {
            open: self.open * factor,
            high: self.high * factor,
            low: self.low * factor,
            close: self.close * factor,
            ..*self
        }
    }

    /// Same prices and volume, regardless of timestamp
    pub fn same_ohlcv(&self, other: &Candle) -> bool {
        self.open == other.open
            && self.high == other.high
            && self.low == other.low
            && self.close == other.close
            && self.volume == other.volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, min, 0).unwrap()
    }

    #[test]
    fn test_add_equal_timestamps() {
        let a = Candle::new(1.0, 2.0, 0.0, 1.0, 10, ts(10, 0));
        let b = Candle::new(2.0, 3.0, 1.0, 2.0, 20, ts(10, 0));

        let c = a.add_candles(&b);
        assert_eq!(c, Candle::new(3.0, 5.0, 1.0, 3.0, 30, ts(10, 0)));
    }

    #[test]
    fn test_volume_is_summed_for_every_operation() {
        let a = Candle::new(10.0, 12.0, 8.0, 11.0, 5, ts(10, 0));
        let b = Candle::new(2.0, 4.0, 2.0, 1.0, 7, ts(10, 0));

        for op in [
            MathOperation::Add,
            MathOperation::Sub,
            MathOperation::Mul,
            MathOperation::Div,
        ] {
            assert_eq!(a.combine(&b, op).volume, 12, "operation {}", op);
        }

        let d = a.div_candles(&b);
        assert_eq!(d.open, 5.0);
        assert_eq!(d.high, 3.0);
        assert_eq!(d.low, 4.0);
        assert_eq!(d.close, 11.0);

        let s = a.sub_candles(&b);
        assert_eq!(s.open, 8.0);
        assert_eq!(s.close, 10.0);
    }

    #[test]
    fn test_result_takes_later_timestamp() {
        let early = Candle::new(1.0, 1.0, 1.0, 1.0, 1, ts(10, 0));
        let late = Candle::new(2.0, 2.0, 2.0, 2.0, 1, ts(10, 5));

        assert_eq!(early.mul_candles(&late).timestamp, ts(10, 5));
        assert_eq!(late.mul_candles(&early).timestamp, ts(10, 5));
    }

    #[test]
    fn test_scale_keeps_volume_and_timestamp() {
        let c = Candle::new(1.5, 2.0, 1.0, 1.75, 42, ts(9, 30));
        let scaled = c.scale(2.0);

        assert_eq!(scaled, Candle::new(3.0, 4.0, 2.0, 3.5, 42, ts(9, 30)));
    }

    #[test]
    fn test_same_ohlcv_ignores_timestamp() {
        let a = Candle::new(1.0, 2.0, 0.5, 1.5, 100, ts(10, 0));
        let b = Candle { timestamp: ts(10, 1), ..a };
        let c = Candle { volume: 101, ..a };

        assert!(a.same_ohlcv(&b));
        assert!(!a.same_ohlcv(&c));
    }

    #[test]
    fn test_operation_from_str() {
        assert_eq!("ADD".parse::<MathOperation>().unwrap(), MathOperation::Add);
        assert_eq!("/".parse::<MathOperation>().unwrap(), MathOperation::Div);
        assert!("pow".parse::<MathOperation>().is_err());
    }

    #[test]
    fn test_volume_sum_saturates() {
        let a = Candle::new(1.0, 1.0, 1.0, 1.0, i64::MAX, ts(10, 0));
        assert_eq!(a.add_candles(&a).volume, i64::MAX);

        let b = Candle::new(1.0, 1.0, 1.0, 1.0, i64::MIN, ts(10, 0));
        assert_eq!(b.sub_candles(&b).volume, i64::MIN);
    }
}
