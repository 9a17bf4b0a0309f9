use crate::error::{ConfigError, ResolveError, Result};
use crate::message::Message;
use crate::proxy::{Proxy, SharedProxy};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::debug;

/// Configuration for outbound query rate limiting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    pub enabled: bool,

    /// Sustained queries per second
    pub queries_per_second: u32,

    /// Burst allowance
    pub burst_size: u32,

    /// How long a caller may wait for a token before failing, in milliseconds
    pub acquire_timeout_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queries_per_second: 20,
            burst_size: 50,
            acquire_timeout_ms: 5000,
        }
    }
}

impl RateLimitConfig {
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.queries_per_second == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "Queries per second must be greater than 0".to_string(),
            ));
        }
        if self.burst_size == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "Burst size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Token-bucket limiter in front of the inner chain.
///
/// Callers wait for a token without spinning. If none arrives within the acquire timeout, or the
/// caller's own future is dropped first, the query is not sent.
pub struct RateLimitProxy {
    inner: SharedProxy,
    limiter: DefaultDirectRateLimiter,
    acquire_timeout: Duration,
}

impl RateLimitProxy {
    pub fn new(
        inner: SharedProxy,
        config: &RateLimitConfig,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let rate = NonZeroU32::new(config.queries_per_second)
            .ok_or_else(|| ConfigError::InvalidRateLimit("zero rate".to_string()))?;
        let burst = NonZeroU32::new(config.burst_size)
            .ok_or_else(|| ConfigError::InvalidRateLimit("zero burst".to_string()))?;
        let quota = Quota::per_second(rate).allow_burst(burst);

        Ok(Self {
            inner,
            limiter: RateLimiter::direct(quota),
            acquire_timeout: config.acquire_timeout(),
        })
    }

    async fn acquire(&self) -> Result<()> {
        match tokio::time::timeout(self.acquire_timeout, self.limiter.until_ready()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                debug!("Rate limit token not available within {:?}", self.acquire_timeout);
                Err(ResolveError::RateLimited(format!(
                    "no token available within {:?}",
                    self.acquire_timeout
                )))
            }
        }
    }
}

#[async_trait]
impl Proxy for RateLimitProxy {
    async fn proxy(&self, request: Message) -> Result<Message> {
        self.acquire().await?;
        self.inner.proxy(request).await
    }
}
