use crate::dnssec::{TrustAnchor, TrustAnchorSet};
use crate::error::ConfigError;
use crate::message::DEFAULT_EMPTY_TTL;
use crate::providers::Provider;
use crate::rate_limiter::RateLimitConfig;
use crate::store::StoreConfig;
use crate::transport::{Endpoint, TransportConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// In-memory cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Maximum number of cached questions
    pub max_size: usize,

    /// TTL in seconds for answers with an empty answer section
    pub empty_ttl: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 10_000,
            empty_ttl: DEFAULT_EMPTY_TTL,
        }
    }
}

/// DNSSEC validation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnssecConfig {
    pub enabled: bool,

    /// Fail answers that carry no RRSIG
    pub enforce: bool,

    /// Log each chain step at debug level
    pub trace: bool,

    /// Root trust anchors; the IANA root anchors when empty
    pub trust_anchors: Vec<TrustAnchor>,
}

impl Default for DnssecConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            enforce: false,
            trace: false,
            trust_anchors: Vec::new(),
        }
    }
}

impl DnssecConfig {
    pub fn anchor_set(&self) -> TrustAnchorSet {
        if self.trust_anchors.is_empty() {
            TrustAnchorSet::iana_root()
        } else {
            TrustAnchorSet::new(self.trust_anchors.clone())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BifrostConfig {
    /// Provider name (`google`, `cloudflare`, `quad9`, `all`, `nextdns:<id>`)
    pub provider: String,

    /// Explicit endpoints, used instead of the provider's when non-empty
    pub endpoints: Vec<Endpoint>,

    /// Log every resolution at info level
    pub log_queries: bool,

    pub transport: TransportConfig,

    pub cache: CacheConfig,

    pub dnssec: DnssecConfig,

    pub rate_limit: RateLimitConfig,

    pub store: StoreConfig,
}

impl Default for BifrostConfig {
    fn default() -> Self {
        Self {
            provider: "google".to_string(),
            endpoints: Vec::new(),
            log_queries: true,
            transport: TransportConfig::default(),
            cache: CacheConfig::default(),
            dnssec: DnssecConfig::default(),
            rate_limit: RateLimitConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl BifrostConfig {
    /// Load a TOML configuration file. Missing sections and fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: BifrostConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `BIFROST_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Override fields from `BIFROST_*` environment variables
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(provider) = std::env::var("BIFROST_PROVIDER") {
            self.provider = provider;
        }

        if let Ok(endpoints) = std::env::var("BIFROST_ENDPOINTS") {
            let endpoints: Vec<Endpoint> = endpoints
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Endpoint::new)
                .collect();
            if endpoints.is_empty() {
                return Err(ConfigError::InvalidEndpoint(
                    "No valid endpoints provided".to_string(),
                ));
            }
            self.endpoints = endpoints;
        }

        if let Ok(log_queries) = std::env::var("BIFROST_LOG_QUERIES") {
            self.log_queries = parse_bool(&log_queries, true);
        }

        if let Ok(timeout) = std::env::var("BIFROST_TIMEOUT_MS") {
            self.transport.timeout_ms = timeout
                .parse()
                .map_err(|_| ConfigError::InvalidTimeout(timeout.clone()))?;
        }

        if let Ok(retries) = std::env::var("BIFROST_RETRIES") {
            self.transport.retries = retries
                .parse()
                .map_err(|_| ConfigError::ParseError(format!("Invalid retries: {}", retries)))?;
        }

        if let Ok(enabled) = std::env::var("BIFROST_CACHE_ENABLED") {
            self.cache.enabled = parse_bool(&enabled, true);
        }

        if let Ok(max_size) = std::env::var("BIFROST_CACHE_SIZE") {
            self.cache.max_size = max_size
                .parse()
                .map_err(|_| ConfigError::InvalidCacheSize(max_size.clone()))?;
        }

        if let Ok(enabled) = std::env::var("BIFROST_DNSSEC_ENABLED") {
            self.dnssec.enabled = parse_bool(&enabled, true);
        }

        if let Ok(enforce) = std::env::var("BIFROST_DNSSEC_ENFORCE") {
            self.dnssec.enforce = parse_bool(&enforce, false);
        }

        if let Ok(trace) = std::env::var("BIFROST_DNSSEC_TRACE") {
            self.dnssec.trace = parse_bool(&trace, false);
        }

        if let Ok(enabled) = std::env::var("BIFROST_RATE_LIMIT_ENABLED") {
            self.rate_limit.enabled = parse_bool(&enabled, true);
        }

        if let Ok(qps) = std::env::var("BIFROST_QUERIES_PER_SECOND") {
            self.rate_limit.queries_per_second = qps
                .parse()
                .map_err(|_| ConfigError::InvalidRateLimit(qps.clone()))?;
        }

        if let Ok(burst) = std::env::var("BIFROST_BURST_SIZE") {
            self.rate_limit.burst_size = burst
                .parse()
                .map_err(|_| ConfigError::InvalidRateLimit(burst.clone()))?;
        }

        if let Ok(enabled) = std::env::var("BIFROST_STORE_ENABLED") {
            self.store.enabled = parse_bool(&enabled, false);
        }

        if let Ok(redis_url) = std::env::var("BIFROST_REDIS_URL") {
            self.store.redis_url = Some(redis_url);
        }

        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoints.is_empty() {
            self.provider.parse::<Provider>()?;
        }

        for endpoint in &self.endpoints {
            if !endpoint.url.starts_with("https://") {
                return Err(ConfigError::InvalidEndpoint(format!(
                    "{}: only https endpoints are supported",
                    endpoint.url
                )));
            }
        }

        if self.transport.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(
                "Timeout must be greater than 0".to_string(),
            ));
        }
        if self.transport.timeout_ms > 300_000 {
            return Err(ConfigError::InvalidTimeout(
                "Timeout too large (max 300 seconds)".to_string(),
            ));
        }

        if self.cache.enabled && self.cache.max_size == 0 {
            return Err(ConfigError::InvalidCacheSize(
                "Cache size must be greater than 0 when caching is enabled".to_string(),
            ));
        }
        if self.cache.max_size > 10_000_000 {
            return Err(ConfigError::InvalidCacheSize(
                "Cache size too large (max 10 million entries)".to_string(),
            ));
        }

        for anchor in &self.dnssec.trust_anchors {
            if hex::decode(&anchor.digest).is_err() {
                return Err(ConfigError::InvalidTrustAnchor(format!(
                    "key tag {}: digest is not hex",
                    anchor.key_tag
                )));
            }
        }

        if self.rate_limit.enabled {
            self.rate_limit.validate()?;
        }
        if self.store.enabled {
            self.store.validate()?;
        }

        Ok(())
    }

    /// The provider to build the pool from when no endpoints are configured
    pub fn provider(&self) -> Result<Provider, ConfigError> {
        self.provider.parse()
    }
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}
