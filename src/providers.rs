//! Well-known public DoH providers

use crate::error::ConfigError;
use crate::pool::ResolverPool;
use crate::proxy::SharedProxy;
use crate::transport::{DohTransport, Endpoint, TransportConfig};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provider {
    Google,
    Cloudflare,
    Quad9,
    /// NextDNS with a configuration id
    NextDns(String),
    /// Google, then Cloudflare, then Quad9
    All,
}

impl Provider {
    /// Endpoints in the order the pool tries them. IP-addressed URLs carry the TLS server name.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        match self {
            Provider::Google => vec![
                Endpoint::new("https://8.8.8.8/dns-query").with_server_name("dns.google"),
                Endpoint::new("https://8.8.4.4/dns-query").with_server_name("dns.google"),
            ],
            Provider::Cloudflare => vec![
                Endpoint::new("https://1.1.1.1/dns-query").with_server_name("cloudflare-dns.com"),
                Endpoint::new("https://1.0.0.1/dns-query").with_server_name("cloudflare-dns.com"),
            ],
            Provider::Quad9 => {
                vec![Endpoint::new("https://9.9.9.9/dns-query").with_server_name("quad9.net")]
            }
            Provider::NextDns(id) => vec![Endpoint::new(format!("https://dns.nextdns.io/{}", id))],
            Provider::All => [Provider::Google, Provider::Cloudflare, Provider::Quad9]
                .iter()
                .flat_map(Provider::endpoints)
                .collect(),
        }
    }

    /// A pool of DoH transports, one per endpoint
    pub fn pool(&self, config: &TransportConfig) -> Result<ResolverPool, ConfigError> {
        endpoint_pool(&self.endpoints(), config)
    }
}

/// A pool of DoH transports for explicitly configured endpoints
pub fn endpoint_pool(
    endpoints: &[Endpoint],
    config: &TransportConfig,
) -> Result<ResolverPool, ConfigError> {
    if endpoints.is_empty() {
        return Err(ConfigError::InvalidEndpoint(
            "at least one endpoint is required".to_string(),
        ));
    }

    let members = endpoints
        .iter()
        .map(|endpoint| {
            DohTransport::https(endpoint, config).map(|t| Arc::new(t) as SharedProxy)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ResolverPool::new(members))
}

impl FromStr for Provider {
    type Err = ConfigError;

    /// `google`, `cloudflare`, `quad9`, `all` or `nextdns:<id>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "google" => Ok(Provider::Google),
            "cloudflare" => Ok(Provider::Cloudflare),
            "quad9" => Ok(Provider::Quad9),
            "all" => Ok(Provider::All),
            _ => match lower.strip_prefix("nextdns:") {
                Some(id) if !id.is_empty() => Ok(Provider::NextDns(id.to_string())),
                _ => Err(ConfigError::UnknownProvider(s.to_string())),
            },
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Google => write!(f, "google"),
            Provider::Cloudflare => write!(f, "cloudflare"),
            Provider::Quad9 => write!(f, "quad9"),
            Provider::NextDns(id) => write!(f, "nextdns:{}", id),
            Provider::All => write!(f, "all"),
        }
    }
}
