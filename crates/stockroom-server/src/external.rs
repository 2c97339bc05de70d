//! Upstream data fetched with a bearer token.
//!
//! The token comes from the shared [`TokenCache`]; the data call itself is
//! retried with doubling backoff before the failure is surfaced.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use stockroom_core::{CoreError, Result};

use crate::config::OauthConfig;
use crate::oauth::TokenCache;

/// Retries after the initial attempt.
const UPSTREAM_RETRIES: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Cloned into every request via the router state; clones share the
/// token cache and the connection pool.
#[derive(Clone)]
pub struct ExternalDataClient {
    tokens: Arc<TokenCache>,
    http: reqwest::Client,
    config: OauthConfig,
}

impl ExternalDataClient {
    #[must_use]
    pub fn new(tokens: Arc<TokenCache>, http: reqwest::Client, config: OauthConfig) -> Self {
        Self {
            tokens,
            http,
            config,
        }
    }

    /// Fetches the upstream payload, authenticating with a cached token.
    pub async fn fetch_data(&self) -> Result<Value> {
        let token = self.tokens.get_token().await?;
        retry_with_backoff(UPSTREAM_RETRIES, INITIAL_BACKOFF, || {
            self.fetch_once(&token)
        })
        .await
    }

    async fn fetch_once(&self, token: &str) -> Result<Value> {
        let response = self
            .http
            .get(&self.config.data_url)
            .bearer_auth(token)
            .timeout(Duration::from_millis(self.config.request_timeout_ms))
            .send()
            .await
            .map_err(|e| CoreError::upstream_unavailable(format!("data request: {e}")))?
            .error_for_status()
            .map_err(|e| CoreError::upstream_unavailable(format!("data request: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| CoreError::upstream_unavailable(format!("data response: {e}")))
    }
}

/// Runs `op`, retrying failures up to `retries` times with a delay that
/// doubles each round.
pub async fn retry_with_backoff<T, F, Fut>(
    retries: u32,
    initial_delay: Duration,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut remaining = retries;
    let mut delay = initial_delay;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if remaining == 0 => return Err(e),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    remaining,
                    delay_ms = delay.as_millis() as u64,
                    "Upstream call failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay *= 2;
                remaining -= 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{DynKeyValueClient, MemoryKv};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_clones_share_the_token_cache() {
        let kv: DynKeyValueClient = Arc::new(MemoryKv::new());
        let tokens = Arc::new(TokenCache::new(
            kv,
            reqwest::Client::new(),
            OauthConfig::default(),
        ));
        let client =
            ExternalDataClient::new(tokens, reqwest::Client::new(), OauthConfig::default());

        let cloned = client.clone();
        assert!(Arc::ptr_eq(&client.tokens, &cloned.tokens));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(3, Duration::from_millis(1), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(CoreError::upstream_unavailable("flaky"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_returns_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = retry_with_backoff(2, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CoreError::upstream_unavailable("down")) }
        })
        .await;

        assert!(result.is_err());
        // Initial attempt plus two retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_on_immediate_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(3, Duration::from_millis(1), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok("data") }
        })
        .await;

        assert_eq!(result.unwrap(), "data");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
