pub mod candle;
pub mod holidays;
pub mod interval;
pub mod series;

pub use candle::{Candle, MathOperation};
pub use holidays::HolidayCalendar;
pub use interval::CandleInterval;
pub use series::CandleSeries;
