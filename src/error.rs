use crate::dnssec::DnsSecError;
use crate::message::Message;
use thiserror::Error;

/// Errors surfaced by the resolution chain
#[derive(Error, Debug, Clone)]
pub enum ResolveError {
    /// Network or HTTP failure. Triggers pool failover.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed message or unacceptable header flags
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The answer failed chain-of-trust validation. The unvalidated message is kept so the
    /// caller can decide what to do with it.
    #[error("dnssec validation failed: {source}")]
    Validation {
        #[source]
        source: DnsSecError,
        message: Box<Message>,
    },

    /// Key material needed to validate the answer could not be fetched. The unvalidated message
    /// is kept as for `Validation`.
    #[error("dnssec key fetch failed: {source}")]
    KeyFetch {
        #[source]
        source: Box<ResolveError>,
        message: Box<Message>,
    },

    /// Enforcing mode received an answer without any RRSIG
    #[error("no dnssec signature for {name}")]
    Unsigned { name: String, message: Box<Message> },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("all resolvers returned error: {}", join_failures(.0))]
    AllResolversFailed(Vec<String>),

    #[error("store error: {0}")]
    Store(String),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl ResolveError {
    /// The message that accompanied the failure, if any
    pub fn message(&self) -> Option<&Message> {
        match self {
            Self::Validation { message, .. }
            | Self::KeyFetch { message, .. }
            | Self::Unsigned { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Whether the error came from the DNSSEC layer
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::KeyFetch { .. } | Self::Unsigned { .. }
        )
    }
}

fn join_failures(failures: &[String]) -> String {
    failures
        .iter()
        .map(|f| format!("[{}]", f))
        .collect::<Vec<_>>()
        .join(" ")
}

impl From<reqwest::Error> for ResolveError {
    fn from(err: reqwest::Error) -> Self {
        ResolveError::Transport(err.to_string())
    }
}

impl From<hickory_proto::error::ProtoError> for ResolveError {
    fn from(err: hickory_proto::error::ProtoError) -> Self {
        ResolveError::Protocol(err.to_string())
    }
}

impl From<redis::RedisError> for ResolveError {
    fn from(err: redis::RedisError) -> Self {
        ResolveError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ResolveError>;

/// Configuration loading and validation errors
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid cache size: {0}")]
    InvalidCacheSize(String),

    #[error("Invalid rate limit: {0}")]
    InvalidRateLimit(String),

    #[error("Invalid trust anchor: {0}")]
    InvalidTrustAnchor(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
