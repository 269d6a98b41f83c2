// Cache reconciliation against a candle source
pub mod candle_cache;

pub use candle_cache::{CandleCache, MAX_ATTEMPTS, SyncRequest};
