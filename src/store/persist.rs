use super::{PersistentStore, StoreConfig};
use crate::error::Result;
use crate::message::{CacheKey, Message};
use crate::proxy::{Proxy, SharedProxy};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Outcome of a startup replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreloadReport {
    /// Stored questions answered again
    pub replayed: usize,
    /// Replays that returned an error
    pub failed: usize,
    /// Keys that could not be turned back into a question
    pub skipped: usize,
}

impl PreloadReport {
    pub fn merge(&mut self, other: PreloadReport) {
        self.replayed += other.replayed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    pub fn total(&self) -> usize {
        self.replayed + self.failed + self.skipped
    }
}

/// Write-through layer persisting every successful response.
///
/// Writes are queued and performed by a background task, so callers never wait on the store.
/// Store failures and a full queue are logged and otherwise ignored.
pub struct PersistProxy {
    inner: SharedProxy,
    store: Arc<dyn PersistentStore>,
    writes: mpsc::Sender<(CacheKey, Bytes)>,
    workers: usize,
}

impl PersistProxy {
    /// Spawns the writer task; must be called within a tokio runtime
    pub fn new(inner: SharedProxy, store: Arc<dyn PersistentStore>, config: &StoreConfig) -> Self {
        let (writes, queue) = mpsc::channel(config.queue_size.max(1));
        tokio::spawn(write_loop(store.clone(), queue, config.ttl()));

        Self {
            inner,
            store,
            writes,
            workers: config.preload_workers.max(1),
        }
    }

    /// Replay every stored question against `target` through a fixed pool of workers.
    ///
    /// Keys are fed through a bounded queue that is closed once enumeration is done, so the
    /// workers exit after draining it.
    pub async fn preload(&self, target: SharedProxy) -> PreloadReport {
        let keys = match self.store.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Unable to enumerate stored responses: {}", e);
                return PreloadReport::default();
            }
        };
        info!("Preloading {} stored questions with {} workers", keys.len(), self.workers);

        let (feed, queue) = mpsc::channel::<String>(self.workers * 2);
        let queue = Arc::new(Mutex::new(queue));

        let mut workers = JoinSet::new();
        for worker in 0..self.workers {
            workers.spawn(replay_worker(worker, queue.clone(), target.clone()));
        }

        for key in keys {
            if feed.send(key).await.is_err() {
                break;
            }
        }
        drop(feed);

        let mut report = PreloadReport::default();
        while let Some(result) = workers.join_next().await {
            match result {
                Ok(worker_report) => report.merge(worker_report),
                Err(e) => warn!("Preload worker stopped: {}", e),
            }
        }

        info!(
            "Preload done: {} replayed, {} failed, {} skipped",
            report.replayed, report.failed, report.skipped
        );
        report
    }
}

#[async_trait]
impl Proxy for PersistProxy {
    async fn proxy(&self, request: Message) -> Result<Message> {
        let key = request.cache_key();
        let response = self.inner.proxy(request).await?;

        match response.to_wire() {
            Ok(wire) => {
                if let Err(e) = self.writes.try_send((key, Bytes::from(wire))) {
                    warn!("Persistent store queue rejected write: {}", e);
                }
            }
            Err(e) => warn!("Not persisting {}: {}", key, e),
        }

        Ok(response)
    }
}

async fn write_loop(
    store: Arc<dyn PersistentStore>,
    mut queue: mpsc::Receiver<(CacheKey, Bytes)>,
    ttl: Duration,
) {
    while let Some((key, wire)) = queue.recv().await {
        match store.set(key.as_str(), wire, ttl).await {
            Ok(()) => debug!("Persisted {}", key),
            Err(e) => warn!("Failed to persist {}: {}", key, e),
        }
    }
    debug!("Persistent store writer stopped");
}

async fn replay_worker(
    worker: usize,
    queue: Arc<Mutex<mpsc::Receiver<String>>>,
    target: SharedProxy,
) -> PreloadReport {
    let mut report = PreloadReport::default();

    loop {
        let next = queue.lock().await.recv().await;
        let Some(key) = next else {
            break;
        };

        let Some((name, record_type, _class)) = CacheKey::parse(&key) else {
            warn!("Skipping unparseable stored key {}", key);
            report.skipped += 1;
            continue;
        };

        match target.proxy(Message::query(name, record_type)).await {
            Ok(_) => report.replayed += 1,
            Err(e) => {
                debug!("Preload worker {} failed to replay {}: {}", worker, key, e);
                report.failed += 1;
            }
        }
    }

    report
}
