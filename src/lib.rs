pub mod cache;
pub mod config;
pub mod dnssec;
pub mod error;
pub mod message;
pub mod pool;
pub mod providers;
pub mod proxy;
pub mod rate_limiter;
pub mod store;
pub mod transport;

pub use config::BifrostConfig;
pub use error::{ResolveError, Result};
pub use message::Message;
pub use proxy::{Chain, ChainBuilder, Proxy, Resolver};
