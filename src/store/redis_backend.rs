use super::{PersistentStore, StoreConfig};
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{info, warn};

/// Redis-backed persistent store
pub struct RedisStore {
    client: ConnectionManager,
    key_prefix: String,
}

impl RedisStore {
    /// Connect to Redis
    pub async fn new(redis_url: &str, key_prefix: String) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection_manager = ConnectionManager::new(client).await?;

        info!("Connected to Redis at {}", redis_url);

        Ok(Self {
            client: connection_manager,
            key_prefix,
        })
    }

    /// Try to connect with retries, `None` when Redis is disabled or unreachable
    pub async fn connect(config: &StoreConfig) -> Option<Self> {
        let url = config.redis_url.as_ref()?;
        let mut retries = 0;

        loop {
            match Self::new(url, config.key_prefix.clone()).await {
                Ok(store) => return Some(store),
                Err(e) => {
                    retries += 1;
                    if retries > config.max_retries {
                        warn!(
                            "Failed to connect to Redis after {} attempts: {}",
                            config.max_retries, e
                        );
                        return None;
                    }
                    warn!(
                        "Failed to connect to Redis (attempt {}/{}): {}",
                        retries, config.max_retries, e
                    );
                    tokio::time::sleep(Duration::from_secs(retries as u64)).await;
                }
            }
        }
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    fn strip_prefix<'a>(&self, redis_key: &'a str) -> Option<&'a str> {
        redis_key
            .strip_prefix(self.key_prefix.as_str())
            .and_then(|rest| rest.strip_prefix(':'))
    }
}

#[async_trait]
impl PersistentStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.client.clone();
        let data: Option<Vec<u8>> = conn.get(self.redis_key(key)).await?;
        Ok(data.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<()> {
        let mut conn = self.client.clone();
        let ttl = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(self.redis_key(key), value.as_ref(), ttl)
            .await?;
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let pattern = format!("{}:*", self.key_prefix);
        let mut conn = self.client.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(1000)
                .query_async(&mut conn)
                .await?;

            keys.extend(
                batch
                    .iter()
                    .filter_map(|k| self.strip_prefix(k))
                    .map(str::to_string),
            );

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }
}
