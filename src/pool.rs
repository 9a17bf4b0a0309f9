use crate::error::{ResolveError, Result};
use crate::message::Message;
use crate::proxy::{Proxy, SharedProxy};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Ordered failover across equivalent upstream chains.
///
/// Members are tried strictly in list order and the first success wins. There is no health
/// tracking and no shuffling: the first member is always asked first.
pub struct ResolverPool {
    members: Vec<SharedProxy>,
}

impl ResolverPool {
    pub fn new(members: Vec<SharedProxy>) -> Self {
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[async_trait]
impl Proxy for ResolverPool {
    async fn proxy(&self, request: Message) -> Result<Message> {
        if self.members.is_empty() {
            return Err(ResolveError::AllResolversFailed(vec![
                "no resolvers configured".to_string(),
            ]));
        }

        let mut failures = Vec::with_capacity(self.members.len());
        for (index, member) in self.members.iter().enumerate() {
            match member.proxy(request.clone()).await {
                Ok(response) => {
                    if index > 0 {
                        debug!("{} answered by pool member {}", request.name(), index);
                    }
                    return Ok(response);
                }
                Err(e) => {
                    warn!("Pool member {} failed for {}: {}", index, request.name(), e);
                    failures.push(e.to_string());
                }
            }
        }

        Err(ResolveError::AllResolversFailed(failures))
    }
}
