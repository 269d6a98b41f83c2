use crate::application::CandleCache;
use crate::config::{Config, SourceEnvConfig, SourceKind};
use crate::domain::ports::CandleSource;
use crate::infrastructure::binance::BinanceCandleSource;
use crate::infrastructure::mock::InMemoryCandleSource;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

pub struct ServiceFactory;

impl ServiceFactory {
    pub fn create_source(config: &SourceEnvConfig) -> Arc<dyn CandleSource> {
        match config.kind {
            SourceKind::Mock => {
                info!("ServiceFactory: Using synthetic in-memory candle source");
                Arc::new(InMemoryCandleSource::synthetic())
            }
            SourceKind::Binance => {
                info!(
                    "ServiceFactory: Using Binance candle source at {}",
                    config.binance_base_url
                );
                Arc::new(BinanceCandleSource::new(
                    config.binance_base_url.clone(),
                    &config.http,
                ))
            }
        }
    }

    /// Cache wired to the configured source and holiday calendar
    pub fn create_cache(config: &Config) -> Result<CandleCache> {
        let holidays = config
            .cache
            .holidays()
            .context("Failed to load holiday calendar")?;
        info!(
            "ServiceFactory: Cache at {:?} with {} holidays",
            config.cache.cache_dir,
            holidays.len()
        );

        Ok(
            CandleCache::new(&config.cache.cache_dir, Self::create_source(&config.source))
                .with_holidays(Arc::new(holidays)),
        )
    }
}
