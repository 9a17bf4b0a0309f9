use thiserror::Error;

/// Chain-of-trust validation failures, each tagged with the offending zone
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DnsSecError {
    /// The DNSKEY RRset signature did not verify or is outside its validity window
    #[error("zone: {zone} : invalid DNSKEY: {reason}")]
    InvalidDnskeySignature { zone: String, reason: String },

    /// The parent's signature over the DS RRset did not verify
    #[error("zone: {zone} : invalid DS signature: {reason}")]
    InvalidDsSignature { zone: String, reason: String },

    #[error("zone: {zone} : DS digest does not match any DNSKEY")]
    DsDigestMismatch { zone: String },

    #[error("zone: {zone} : unable to match trust anchor")]
    TrustAnchorMismatch { zone: String },

    /// A DNSKEY RRset exists but the parent has neither a DS nor a denial proof
    #[error("zone: {zone} : no DS record")]
    NoDsRecord { zone: String },

    /// No key in the chain matches the answer's RRSIG key tag
    #[error("zone: {zone} : no DNSKEY matches key tag {key_tag}")]
    NoMatchingKey { zone: String, key_tag: u16 },

    #[error("zone: {zone} : missing non-existence proof: {reason}")]
    MissingNonExistenceProof { zone: String, reason: String },
}

impl DnsSecError {
    /// Zone the failure was detected at
    pub fn zone(&self) -> &str {
        match self {
            Self::InvalidDnskeySignature { zone, .. }
            | Self::InvalidDsSignature { zone, .. }
            | Self::DsDigestMismatch { zone }
            | Self::TrustAnchorMismatch { zone }
            | Self::NoDsRecord { zone }
            | Self::NoMatchingKey { zone, .. }
            | Self::MissingNonExistenceProof { zone, .. } => zone,
        }
    }
}

pub type Result<T> = std::result::Result<T, DnsSecError>;
