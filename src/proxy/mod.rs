//! The resolution chain.
//!
//! Every layer implements [`Proxy`] and wraps exactly one inner `Arc<dyn Proxy>`. Chains are put
//! together with [`ChainBuilder`]; [`QueryResolver`] and [`AsyncResolver`] adapt a chain to the
//! `query(name, type)` surface and to a spawn-now, await-later surface.

pub mod chain;
pub mod log;

pub use chain::{Chain, ChainBuilder};
pub use log::LogProxy;

use crate::error::{ResolveError, Result};
use crate::message::Message;
use async_trait::async_trait;
use hickory_proto::rr::RecordType;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A middleware layer of the resolution chain
#[async_trait]
pub trait Proxy: Send + Sync {
    async fn proxy(&self, request: Message) -> Result<Message>;
}

pub type SharedProxy = Arc<dyn Proxy>;

/// Name/type lookups
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn query(&self, name: &str, record_type: RecordType) -> Result<Message>;
}

/// Turns a chain into a [`Resolver`] by synthesizing the question message
#[derive(Clone)]
pub struct QueryResolver {
    chain: SharedProxy,
}

impl QueryResolver {
    pub fn new(chain: SharedProxy) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl Resolver for QueryResolver {
    async fn query(&self, name: &str, record_type: RecordType) -> Result<Message> {
        let request = Message::query_str(name, record_type)?;
        self.chain.proxy(request).await
    }
}

/// Runs requests on the runtime and hands back a handle to collect the outcome later
#[derive(Clone)]
pub struct AsyncResolver {
    chain: SharedProxy,
}

impl AsyncResolver {
    pub fn new(chain: SharedProxy) -> Self {
        Self { chain }
    }

    /// Start resolving `request` immediately
    pub fn submit(&self, request: Message) -> PendingResponse {
        let chain = self.chain.clone();
        PendingResponse {
            handle: Some(tokio::spawn(async move { chain.proxy(request).await })),
        }
    }

    pub fn query(&self, name: &str, record_type: RecordType) -> Result<PendingResponse> {
        Ok(self.submit(Message::query_str(name, record_type)?))
    }
}

/// In-flight request started by [`AsyncResolver`]. Dropping it before awaiting
/// [`result`](PendingResponse::result) aborts the request.
pub struct PendingResponse {
    handle: Option<JoinHandle<Result<Message>>>,
}

impl PendingResponse {
    /// Wait for the outcome
    pub async fn result(mut self) -> Result<Message> {
        let Some(handle) = self.handle.take() else {
            return Err(ResolveError::Transport("response already taken".to_string()));
        };
        match handle.await {
            Ok(result) => result,
            Err(e) => Err(ResolveError::Transport(format!("query task failed: {}", e))),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(|h| h.is_finished())
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
