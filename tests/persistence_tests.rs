mod common;

use async_trait::async_trait;
use bifrost::cache::DnsCache;
use bifrost::error::{ResolveError, Result};
use bifrost::message::{CacheKey, Message};
use bifrost::proxy::{ChainBuilder, Proxy, SharedProxy};
use bifrost::store::{MemoryStore, PersistProxy, PersistentStore, StoreConfig};
use bytes::Bytes;
use common::{StaticUpstream, a_record, name};
use hickory_proto::rr::{DNSClass, RecordType};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Store whose writes always fail
#[derive(Default)]
struct BrokenStore {
    writes: AtomicUsize,
}

#[async_trait]
impl PersistentStore for BrokenStore {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>> {
        Err(ResolveError::Store("unavailable".to_string()))
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        Err(ResolveError::Store("unavailable".to_string()))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Err(ResolveError::Store("unavailable".to_string()))
    }
}

fn upstream() -> Arc<StaticUpstream> {
    Arc::new(StaticUpstream::new(vec![
        a_record(&name("one.test."), Ipv4Addr::new(192, 0, 2, 1)),
        a_record(&name("two.test."), Ipv4Addr::new(192, 0, 2, 2)),
    ]))
}

/// Wait for the background writer to catch up
async fn wait_for(mut done: impl FnMut() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within a second");
}

#[tokio::test]
async fn test_responses_are_written_through() {
    let store = Arc::new(MemoryStore::new());
    let persist = PersistProxy::new(upstream(), store.clone(), &StoreConfig::default());

    let response = persist
        .proxy(Message::query(name("one.test."), RecordType::A))
        .await
        .unwrap();
    assert_eq!(response.answers().len(), 1);

    wait_for(|| store.len() == 1).await;

    let key = CacheKey::new(&name("one.test."), RecordType::A, DNSClass::IN);
    let stored = store
        .get(key.as_str())
        .await
        .unwrap()
        .expect("response should be stored under its cache key");
    let decoded = Message::from_wire(&stored).unwrap();
    assert_eq!(decoded.answers().len(), 1);
}

#[tokio::test]
async fn test_store_failures_are_swallowed() {
    let store = Arc::new(BrokenStore::default());
    let persist = PersistProxy::new(upstream(), store.clone(), &StoreConfig::default());

    let response = persist
        .proxy(Message::query(name("one.test."), RecordType::A))
        .await;
    assert!(response.is_ok(), "a failing store must not fail the query");

    wait_for(|| store.writes.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn test_preload_replays_stored_questions() {
    let store = Arc::new(MemoryStore::new());
    let ttl = Duration::from_secs(60);
    for key in ["one.test./A/IN", "two.test./A/IN", "three.test./TXT/IN"] {
        store.set(key, Bytes::from_static(b"stale"), ttl).await.unwrap();
    }
    store.set("not a key", Bytes::new(), ttl).await.unwrap();

    let base = upstream();
    let config = StoreConfig {
        preload_workers: 2,
        ..Default::default()
    };
    let persist = PersistProxy::new(base.clone(), store.clone(), &config);

    let report = persist.preload(base.clone()).await;
    assert_eq!(report.replayed, 3);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.total(), 4);
    assert_eq!(base.calls(), 3);
}

#[tokio::test]
async fn test_preload_with_unreadable_store() {
    let persist = PersistProxy::new(
        upstream(),
        Arc::new(BrokenStore::default()),
        &StoreConfig::default(),
    );

    let report = persist.preload(upstream()).await;
    assert_eq!(report.total(), 0);
}

#[tokio::test]
async fn test_chain_preload_warms_cache() {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(DnsCache::new(100));
    let base: SharedProxy = upstream();

    // First process: resolve and persist
    let chain = ChainBuilder::new(base.clone())
        .with_persistence(store.clone(), &StoreConfig::default())
        .with_cache(Arc::new(DnsCache::new(100)))
        .build();
    for owner in ["one.test.", "two.test."] {
        chain
            .proxy()
            .proxy(Message::query(name(owner), RecordType::A))
            .await
            .unwrap();
    }
    wait_for(|| store.len() == 2).await;

    // Second process: same store, cold cache
    let restarted = ChainBuilder::new(base)
        .with_persistence(store.clone(), &StoreConfig::default())
        .with_cache(cache.clone())
        .with_log()
        .build();
    assert!(cache.is_empty());

    let report = restarted.preload().await;
    assert_eq!(report.replayed, 2);
    assert_eq!(cache.len(), 2, "replayed answers should land in the cache");
}
