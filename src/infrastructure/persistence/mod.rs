pub mod candle_store;
pub mod csv_codec;

pub use candle_store::CsvCandleStore;
pub use csv_codec::{Column, CsvCodec, OhlcvSchema, RowSchema};
