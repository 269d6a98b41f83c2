//! Configuration loaded from environment variables.
//!
//! Organized by concern: where the cache lives and which calendar filters
//! it (`CacheEnvConfig`), and where missing candles come from
//! (`SourceEnvConfig`).

mod cache_config;
mod source_config;

pub use cache_config::{CacheEnvConfig, CalendarKind, DEFAULT_CACHE_DIR};
pub use source_config::{DEFAULT_BINANCE_BASE_URL, HttpConfig, SourceEnvConfig, SourceKind};

use anyhow::{Context, Result};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub cache: CacheEnvConfig,
    pub source: SourceEnvConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let cache = CacheEnvConfig::from_env().context("Failed to load cache config")?;
        let source = SourceEnvConfig::from_env().context("Failed to load source config")?;

        Ok(Self { cache, source })
    }
}
