//! Durable response store.
//!
//! The store keeps the last successful wire-format response per question so a restarted process
//! can warm its in-memory cache before serving traffic. See [`PersistProxy`].

pub mod persist;
pub mod redis_backend;

pub use persist::{PersistProxy, PreloadReport};
pub use redis_backend::RedisStore;

use crate::error::{ConfigError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Byte-key/byte-value store with per-entry TTL and key enumeration
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()>;

    /// Every live key
    async fn keys(&self) -> Result<Vec<String>>;
}

/// Persistent store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Enable the persistent store
    pub enabled: bool,

    /// Redis URL (e.g., redis://localhost:6379). The in-memory store is used when absent.
    pub redis_url: Option<String>,

    /// Key prefix for stored responses
    pub key_prefix: String,

    /// Entry lifetime in seconds
    pub ttl_secs: u64,

    /// Pending writes buffered before new ones are dropped
    pub queue_size: usize,

    /// Workers replaying stored questions at startup
    pub preload_workers: usize,

    /// Connection attempts before giving up on Redis
    pub max_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            redis_url: None,
            key_prefix: "bifrost:dns".to_string(),
            ttl_secs: 24 * 60 * 60,
            queue_size: 100,
            preload_workers: 10,
            max_retries: 3,
        }
    }
}

impl StoreConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.queue_size == 0 {
            return Err(ConfigError::ParseError(
                "Store queue size must be greater than 0".to_string(),
            ));
        }
        if self.preload_workers == 0 {
            return Err(ConfigError::ParseError(
                "Preload workers must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Process-local store, used when no Redis is configured and in tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, (Bytes, Instant)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let found = self
            .entries
            .get(key)
            .map(|entry| (entry.1 <= Instant::now(), entry.0.clone()));
        match found {
            Some((false, value)) => Ok(Some(value)),
            Some((true, _)) => {
                self.entries
                    .remove_if(key, |_, entry| entry.1 <= Instant::now());
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.value().1 > now)
            .map(|entry| entry.key().clone())
            .collect())
    }
}
