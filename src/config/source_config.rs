//! Candle source selection and HTTP client settings.

use anyhow::Result;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BINANCE_BASE_URL: &str = "https://api.binance.com";

/// Where missing candles are fetched from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Mock,
    Binance,
}

impl FromStr for SourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(SourceKind::Mock),
            "binance" => Ok(SourceKind::Binance),
            _ => anyhow::bail!("Invalid CANDLE_SOURCE: {}. Must be 'mock' or 'binance'", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub max_retries: u32,
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Source environment configuration
#[derive(Debug, Clone)]
pub struct SourceEnvConfig {
    pub kind: SourceKind,
    pub binance_base_url: String,
    pub http: HttpConfig,
}

impl Default for SourceEnvConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Binance,
            binance_base_url: DEFAULT_BINANCE_BASE_URL.to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl SourceEnvConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = HttpConfig::default();
        let kind = match lookup("CANDLE_SOURCE") {
            Some(value) => SourceKind::from_str(&value)?,
            None => SourceKind::Binance,
        };

        Ok(Self {
            kind,
            binance_base_url: lookup("BINANCE_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BINANCE_BASE_URL.to_string()),
            http: HttpConfig {
                max_retries: lookup("HTTP_MAX_RETRIES")
                    .and_then(|v| v.parse::<u32>().ok())
                    .unwrap_or(defaults.max_retries),
                timeout: lookup("HTTP_TIMEOUT_SECS")
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.timeout),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_config_defaults() {
        let config = SourceEnvConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.kind, SourceKind::Binance);
        assert_eq!(config.binance_base_url, "https://api.binance.com");
        assert_eq!(config.http.max_retries, 3);
        assert_eq!(config.http.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_source_config_overrides() {
        let config = SourceEnvConfig::from_lookup(|key| match key {
            "CANDLE_SOURCE" => Some("Mock".to_string()),
            "HTTP_MAX_RETRIES" => Some("5".to_string()),
            "HTTP_TIMEOUT_SECS" => Some("10".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.kind, SourceKind::Mock);
        assert_eq!(config.http.max_retries, 5);
        assert_eq!(config.http.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_unparsable_numbers_fall_back() {
        let config = SourceEnvConfig::from_lookup(|key| match key {
            "HTTP_MAX_RETRIES" => Some("many".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.http.max_retries, 3);
    }

    #[test]
    fn test_invalid_source_rejected() {
        assert!(SourceKind::from_str("alpaca").is_err());
    }
}
