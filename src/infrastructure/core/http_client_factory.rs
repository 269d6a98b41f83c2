use crate::config::HttpConfig;
use anyhow::{Context, Result};
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use std::time::Duration;
use url::Url;

pub struct HttpClientFactory;

impl HttpClientFactory {
    /// HTTP client retrying transient failures with exponential backoff
    pub fn create_client(config: &HttpConfig) -> ClientWithMiddleware {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);

        let client = Client::builder()
            .pool_max_idle_per_host(5)
            .timeout(config.timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build()
    }
}

/// Joins `path` onto `base_url` and appends percent-encoded query parameters.
///
/// The middleware client has no `.query()` builder, so the query string is
/// baked into the URL.
pub fn build_url_with_query<K, V>(base_url: &str, path: &str, params: &[(K, V)]) -> Result<Url>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let base = Url::parse(base_url).with_context(|| format!("Invalid base URL '{}'", base_url))?;
    let mut url = base
        .join(path)
        .with_context(|| format!("Cannot join '{}' onto '{}'", path, base_url))?;

    if !params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in params {
            pairs.append_pair(key.as_ref(), value.as_ref());
        }
    }
    Ok(url)
}
