pub mod denial;
pub mod digest;
pub mod errors;
pub mod proxy;
pub mod rrsig;
pub mod trust_anchor;
pub mod validator;

pub use digest::DigestType;
pub use errors::DnsSecError;
pub use proxy::DnssecProxy;
pub use trust_anchor::{TrustAnchor, TrustAnchorSet};
pub use validator::DnssecValidator;
