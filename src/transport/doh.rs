use super::{DNS_MESSAGE, Endpoint, SecureTransport, TransportConfig, check_response_header};
use crate::error::{ConfigError, ResolveError, Result};
use crate::message::Message;
use crate::proxy::Proxy;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::RetryIf;
use tokio_retry::strategy::FixedInterval;
use tracing::{debug, trace};

/// HTTPS POST exchange with a single DoH endpoint
pub struct HttpsTransport {
    client: reqwest::Client,
    url: Url,
}

impl HttpsTransport {
    pub fn new(endpoint: &Endpoint, config: &TransportConfig) -> std::result::Result<Self, ConfigError> {
        let mut url = Url::parse(&endpoint.url)
            .map_err(|e| ConfigError::InvalidEndpoint(format!("{}: {}", endpoint.url, e)))?;
        if url.scheme() != "https" {
            return Err(ConfigError::InvalidEndpoint(format!(
                "{}: only https endpoints are supported",
                endpoint.url
            )));
        }

        let mut builder = reqwest::Client::builder()
            .https_only(true)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .min_tls_version(reqwest::tls::Version::TLS_1_2)
            .timeout(config.timeout())
            .user_agent(concat!("bifrost/", env!("CARGO_PKG_VERSION")));

        if let Some(path) = &endpoint.root_certificate {
            let pem = std::fs::read(path)?;
            let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                ConfigError::InvalidEndpoint(format!("{}: {}", path.display(), e))
            })?;
            builder = builder
                .tls_built_in_root_certs(false)
                .add_root_certificate(certificate);
        }

        // Pin the IP from the URL while presenting the provider's server name
        if let Some(server_name) = &endpoint.server_name {
            let ip = url.host_str().and_then(|h| h.parse::<IpAddr>().ok());
            if let Some(ip) = ip {
                let port = url.port_or_known_default().unwrap_or(443);
                url.set_host(Some(server_name.as_str())).map_err(|e| {
                    ConfigError::InvalidEndpoint(format!("{}: {}", server_name, e))
                })?;
                builder = builder.resolve(server_name, SocketAddr::new(ip, port));
            }
        }

        let client = builder
            .build()
            .map_err(|e| ConfigError::InvalidEndpoint(format!("{}: {}", endpoint.url, e)))?;

        Ok(Self { client, url })
    }
}

#[async_trait]
impl SecureTransport for HttpsTransport {
    async fn send(&self, wire: Bytes) -> Result<Bytes> {
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, DNS_MESSAGE)
            .header(ACCEPT, DNS_MESSAGE)
            .body(wire)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Transport(format!(
                "{} returned HTTP {}",
                self.url, status
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with(DNS_MESSAGE) {
            return Err(ResolveError::Protocol(format!(
                "{} answered with content type {:?}",
                self.url, content_type
            )));
        }

        Ok(response.bytes().await?)
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

/// Innermost layer of the chain: encodes the request, sends it over a [`SecureTransport`] and
/// validates the response header. Network failures are retried here and nowhere else.
pub struct DohTransport {
    transport: Arc<dyn SecureTransport>,
    retries: usize,
    retry_delay: Duration,
}

impl DohTransport {
    pub fn new(transport: Arc<dyn SecureTransport>, config: &TransportConfig) -> Self {
        Self {
            transport,
            retries: config.retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// HTTPS transport to `endpoint`
    pub fn https(
        endpoint: &Endpoint,
        config: &TransportConfig,
    ) -> std::result::Result<Self, ConfigError> {
        let transport = HttpsTransport::new(endpoint, config)?;
        Ok(Self::new(Arc::new(transport), config))
    }
}

#[async_trait]
impl Proxy for DohTransport {
    async fn proxy(&self, request: Message) -> Result<Message> {
        let wire = Bytes::from(request.to_wire()?);
        trace!("Sending {} to {}", request, self.transport.describe());

        let strategy = FixedInterval::new(self.retry_delay).take(self.retries);
        let body = RetryIf::start(
            strategy,
            || self.transport.send(wire.clone()),
            |e: &ResolveError| {
                let retry = matches!(e, ResolveError::Transport(_));
                if retry {
                    debug!("Retrying {} after: {}", self.transport.describe(), e);
                }
                retry
            },
        )
        .await?;

        let response = Message::from_wire(&body)?;
        check_response_header(&request, &response)?;
        Ok(response)
    }
}
