use super::trust_anchor::TrustAnchorSet;
use super::validator::DnssecValidator;
use crate::error::{ResolveError, Result};
use crate::message::Message;
use crate::proxy::{AsyncResolver, Proxy, SharedProxy};
use async_trait::async_trait;
use tracing::debug;

/// Validates signed answers coming back from the inner chain.
///
/// Unsigned answers pass through unless the proxy is enforcing, in which case they fail with
/// `ResolveError::Unsigned`. Key material is fetched through the same inner chain.
pub struct DnssecProxy {
    inner: SharedProxy,
    validator: DnssecValidator,
    enforce: bool,
}

impl DnssecProxy {
    pub fn new(inner: SharedProxy, anchors: TrustAnchorSet) -> Self {
        let validator = DnssecValidator::new(AsyncResolver::new(inner.clone()), anchors);
        Self::with_validator(inner, validator)
    }

    pub fn with_validator(inner: SharedProxy, validator: DnssecValidator) -> Self {
        Self {
            inner,
            validator,
            enforce: false,
        }
    }

    /// Reject answers that carry no RRSIG
    pub fn enforcing(mut self, enforce: bool) -> Self {
        self.enforce = enforce;
        self
    }
}

#[async_trait]
impl Proxy for DnssecProxy {
    async fn proxy(&self, request: Message) -> Result<Message> {
        let response = self.inner.proxy(request).await?;

        if !response.has_rrsig() {
            if self.enforce {
                return Err(ResolveError::Unsigned {
                    name: response.name().to_string(),
                    message: Box::new(response),
                });
            }
            debug!("{} is unsigned, passing through", response.name());
            return Ok(response);
        }

        self.validator.verify(&response).await?;
        Ok(response)
    }
}
