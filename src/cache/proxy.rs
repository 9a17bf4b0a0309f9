use super::DnsCache;
use crate::error::Result;
use crate::message::{DEFAULT_EMPTY_TTL, Message};
use crate::proxy::{Proxy, SharedProxy};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{trace, warn};

/// Serves repeated questions from a [`DnsCache`].
///
/// Hits are re-served under the caller's transaction id. Misses go to the inner chain and
/// successful responses are cached for their minimum answer TTL, or `empty_ttl` when the answer
/// section is empty.
pub struct CacheProxy {
    inner: SharedProxy,
    cache: Arc<DnsCache>,
    empty_ttl: u32,
}

impl CacheProxy {
    pub fn new(inner: SharedProxy, cache: Arc<DnsCache>) -> Self {
        Self {
            inner,
            cache,
            empty_ttl: DEFAULT_EMPTY_TTL,
        }
    }

    /// TTL for NODATA/NXDOMAIN answers
    pub fn with_empty_ttl(mut self, ttl: u32) -> Self {
        self.empty_ttl = ttl;
        self
    }

    pub fn cache(&self) -> &Arc<DnsCache> {
        &self.cache
    }
}

#[async_trait]
impl Proxy for CacheProxy {
    async fn proxy(&self, request: Message) -> Result<Message> {
        let key = request.cache_key();

        if let Some(wire) = self.cache.get(&key) {
            match Message::from_wire(&wire) {
                Ok(mut cached) => {
                    cached.set_id(request.id());
                    trace!("Serving {} from cache", key);
                    return Ok(cached);
                }
                Err(e) => {
                    warn!("Dropping undecodable cache entry {}: {}", key, e);
                    self.cache.remove(&key);
                }
            }
        }

        let response = self.inner.proxy(request).await?;

        match response.to_wire() {
            Ok(wire) => {
                let ttl = response.min_answer_ttl().unwrap_or(self.empty_ttl);
                self.cache.set(key, Bytes::from(wire), ttl);
            }
            Err(e) => warn!("Not caching {}: {}", key, e),
        }

        Ok(response)
    }
}
