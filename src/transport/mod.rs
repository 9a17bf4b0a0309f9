//! DNS-over-HTTPS upstream transport.
//!
//! [`SecureTransport`] is the byte-level exchange with an HTTPS endpoint; [`DohTransport`] puts
//! the message encoding, retries and response header checks on top of it and joins the chain as
//! its innermost [`Proxy`](crate::proxy::Proxy).

pub mod doh;

pub use doh::{DohTransport, HttpsTransport};

use crate::error::{ResolveError, Result};
use crate::message::Message;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Media type for wire-format DNS over HTTPS (RFC 8484)
pub const DNS_MESSAGE: &str = "application/dns-message";

/// A DoH endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Endpoint URL, e.g. `https://8.8.8.8/dns-query`
    pub url: String,

    /// TLS server name to present when the URL host is an IP address
    #[serde(default)]
    pub server_name: Option<String>,

    /// PEM root certificate to trust instead of the built-in roots
    #[serde(default)]
    pub root_certificate: Option<PathBuf>,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            server_name: None,
            root_certificate: None,
        }
    }

    pub fn with_server_name(mut self, server_name: impl Into<String>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }

    pub fn with_root_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.root_certificate = Some(path.into());
        self
    }
}

/// Transport tuning shared by every endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,

    /// Extra attempts after a network failure
    pub retries: usize,

    /// Delay between attempts in milliseconds
    pub retry_delay_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            retries: 1,
            retry_delay_ms: 100,
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Byte-level request/response exchange with an upstream
#[async_trait]
pub trait SecureTransport: Send + Sync {
    async fn send(&self, wire: Bytes) -> Result<Bytes>;

    /// Where the exchange goes, for logging
    fn describe(&self) -> String;
}

/// Reject responses the chain must not accept: mismatched id, truncated, no recursion
/// available, or checking disabled
pub fn check_response_header(request: &Message, response: &Message) -> Result<()> {
    if response.id() != request.id() {
        return Err(ResolveError::Protocol(format!(
            "response id {} does not match request id {}",
            response.id(),
            request.id()
        )));
    }
    if response.truncated() {
        return Err(ResolveError::Protocol(format!(
            "truncated response for {}",
            request.name()
        )));
    }
    if !response.recursion_available() || response.checking_disabled() {
        return Err(ResolveError::Protocol(format!(
            "unacceptable header flags for {} (ra={}, cd={})",
            request.name(),
            response.recursion_available(),
            response.checking_disabled()
        )));
    }
    Ok(())
}
