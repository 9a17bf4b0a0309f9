use super::{Proxy, SharedProxy};
use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{info, warn};

/// Logs every resolution with its elapsed time
pub struct LogProxy {
    inner: SharedProxy,
}

impl LogProxy {
    pub fn new(inner: SharedProxy) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Proxy for LogProxy {
    async fn proxy(&self, request: Message) -> Result<Message> {
        let name = request.name().clone();
        let record_type = request.record_type();
        let started = Instant::now();

        let result = self.inner.proxy(request).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(response) => {
                let dnssec = if response.has_rrsig() { " +dnssec" } else { "" };
                info!(
                    "{} {} {} answers in {:?}{}",
                    name,
                    record_type,
                    response.answers().len(),
                    elapsed,
                    dnssec
                );
            }
            Err(e) => warn!("{} {} failed in {:?}: {}", name, record_type, elapsed, e),
        }

        result
    }
}
