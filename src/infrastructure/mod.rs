pub mod binance;
pub mod core;
pub mod factory;
pub mod mock;
pub mod persistence;

pub use binance::BinanceCandleSource;
pub use factory::ServiceFactory;
pub use mock::InMemoryCandleSource;
pub use persistence::{CsvCandleStore, CsvCodec};
