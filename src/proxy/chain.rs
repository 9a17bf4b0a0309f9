use super::log::LogProxy;
use super::{AsyncResolver, QueryResolver, SharedProxy};
use crate::cache::{CacheProxy, DnsCache};
use crate::config::BifrostConfig;
use crate::dnssec::{DnssecProxy, DnssecValidator, TrustAnchorSet};
use crate::error::{ConfigError, Result};
use crate::providers::endpoint_pool;
use crate::rate_limiter::{RateLimitConfig, RateLimitProxy};
use crate::store::{MemoryStore, PersistProxy, PersistentStore, PreloadReport, RedisStore, StoreConfig};
use std::sync::Arc;
use tracing::{info, warn};

/// Attaches layers around a base proxy, innermost first.
///
/// Each attachment wraps the current chain in a new layer; the wrapped value is never modified.
/// The conventional order is `with_persistence`, `with_cache`, `with_dnssec`, `with_rate_limit`,
/// `with_log`, which keeps the cache below the validator so only validated answers are served.
pub struct ChainBuilder {
    proxy: SharedProxy,
    /// Chain below the rate limit and log layers, used to replay stored questions
    core: SharedProxy,
    cache: Option<Arc<DnsCache>>,
    persisters: Vec<Arc<PersistProxy>>,
}

impl ChainBuilder {
    pub fn new(base: SharedProxy) -> Self {
        Self {
            core: base.clone(),
            proxy: base,
            cache: None,
            persisters: Vec::new(),
        }
    }

    pub fn with_cache(self, cache: Arc<DnsCache>) -> Self {
        self.with_cache_proxy(cache, None)
    }

    fn with_cache_proxy(mut self, cache: Arc<DnsCache>, empty_ttl: Option<u32>) -> Self {
        let mut layer = CacheProxy::new(self.proxy.clone(), cache.clone());
        if let Some(ttl) = empty_ttl {
            layer = layer.with_empty_ttl(ttl);
        }
        self.cache = Some(cache);
        self.attach_core(Arc::new(layer))
    }

    /// Validate signed answers against `anchors`, fetching key material through the chain as
    /// built so far
    pub fn with_dnssec(self, anchors: TrustAnchorSet, enforce: bool, trace: bool) -> Self {
        self.with_validator(enforce, |resolver| {
            DnssecValidator::new(resolver, anchors).with_trace(trace)
        })
    }

    /// Like [`with_dnssec`](Self::with_dnssec), with the validator built by `build` from a
    /// resolver over the chain as built so far
    pub fn with_validator(
        self,
        enforce: bool,
        build: impl FnOnce(AsyncResolver) -> DnssecValidator,
    ) -> Self {
        let validator = build(AsyncResolver::new(self.proxy.clone()));
        let layer = DnssecProxy::with_validator(self.proxy.clone(), validator).enforcing(enforce);
        self.attach_core(Arc::new(layer))
    }

    /// Write every successful response through to `store`
    pub fn with_persistence(
        mut self,
        store: Arc<dyn PersistentStore>,
        config: &StoreConfig,
    ) -> Self {
        let layer = Arc::new(PersistProxy::new(self.proxy.clone(), store, config));
        self.persisters.push(layer.clone());
        self.attach_core(layer)
    }

    pub fn with_rate_limit(self, config: &RateLimitConfig) -> std::result::Result<Self, ConfigError> {
        let layer = RateLimitProxy::new(self.proxy.clone(), config)?;
        Ok(self.attach(Arc::new(layer)))
    }

    pub fn with_log(self) -> Self {
        let layer = LogProxy::new(self.proxy.clone());
        self.attach(Arc::new(layer))
    }

    /// Attach an arbitrary layer built from the current chain
    pub fn layer(self, wrap: impl FnOnce(SharedProxy) -> SharedProxy) -> Self {
        let layer = wrap(self.proxy.clone());
        self.attach(layer)
    }

    fn attach(mut self, layer: SharedProxy) -> Self {
        self.proxy = layer;
        self
    }

    fn attach_core(mut self, layer: SharedProxy) -> Self {
        self.core = layer.clone();
        self.proxy = layer;
        self
    }

    pub fn build(self) -> Chain {
        Chain {
            proxy: self.proxy,
            core: self.core,
            cache: self.cache,
            persisters: self.persisters,
        }
    }
}

/// A fully assembled resolution chain
#[derive(Clone)]
pub struct Chain {
    proxy: SharedProxy,
    core: SharedProxy,
    cache: Option<Arc<DnsCache>>,
    persisters: Vec<Arc<PersistProxy>>,
}

impl Chain {
    /// Assemble the chain described by `config`:
    /// log, rate limit, DNSSEC, cache, persistence, pool of DoH transports
    pub async fn from_config(config: &BifrostConfig) -> Result<Chain> {
        config.validate()?;

        let endpoints = if config.endpoints.is_empty() {
            config.provider()?.endpoints()
        } else {
            config.endpoints.clone()
        };
        let pool = endpoint_pool(&endpoints, &config.transport)?;
        info!("Resolving through {} endpoints", pool.len());

        let mut builder = ChainBuilder::new(Arc::new(pool));

        if config.store.enabled {
            let store: Arc<dyn PersistentStore> = match RedisStore::connect(&config.store).await {
                Some(redis) => Arc::new(redis),
                None => {
                    warn!("Falling back to the in-memory store");
                    Arc::new(MemoryStore::new())
                }
            };
            builder = builder.with_persistence(store, &config.store);
        }

        if config.cache.enabled {
            let cache = Arc::new(DnsCache::new(config.cache.max_size));
            builder = builder.with_cache_proxy(cache, Some(config.cache.empty_ttl));
        }

        if config.dnssec.enabled {
            builder = builder.with_dnssec(
                config.dnssec.anchor_set(),
                config.dnssec.enforce,
                config.dnssec.trace,
            );
        }

        if config.rate_limit.enabled {
            builder = builder.with_rate_limit(&config.rate_limit)?;
        }

        if config.log_queries {
            builder = builder.with_log();
        }

        Ok(builder.build())
    }

    pub fn proxy(&self) -> SharedProxy {
        self.proxy.clone()
    }

    pub fn resolver(&self) -> QueryResolver {
        QueryResolver::new(self.proxy.clone())
    }

    pub fn async_resolver(&self) -> AsyncResolver {
        AsyncResolver::new(self.proxy.clone())
    }

    pub fn cache(&self) -> Option<&Arc<DnsCache>> {
        self.cache.as_ref()
    }

    /// Replay every persisted question to warm the layers above the store
    pub async fn preload(&self) -> PreloadReport {
        let mut report = PreloadReport::default();
        for persister in &self.persisters {
            report.merge(persister.preload(self.core.clone()).await);
        }
        report
    }
}
