// Candles, series algebra, intervals and calendars
pub mod market;

// Port interfaces
pub mod ports;

// Domain-specific error types
pub mod errors;
