use hickory_proto::rr::Name;
use hickory_proto::rr::dnssec::rdata::DNSKEY;
use std::fmt;

/// DNSKEY protocol field, fixed by RFC 4034
pub const DNSKEY_PROTOCOL: u8 = 3;

const FLAG_ZONE_KEY: u16 = 0x0100;
const FLAG_REVOKE: u16 = 0x0080;
const FLAG_SECURE_ENTRY_POINT: u16 = 0x0001;

/// DS digest type algorithms (RFC 4034, 4509, 6605)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DigestType {
    /// SHA-1 (RFC 3658)
    Sha1 = 1,
    /// SHA-256 (RFC 4509)
    Sha256 = 2,
    /// SHA-384 (RFC 6605)
    Sha384 = 4,
}

impl DigestType {
    /// Create from digest type number, `None` for anything unsupported
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Sha1),
            2 => Some(Self::Sha256),
            4 => Some(Self::Sha384),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Expected digest length in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha384 => 48,
        }
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        use ring::digest;
        let algorithm = match self {
            Self::Sha1 => &digest::SHA1_FOR_LEGACY_USE_ONLY,
            Self::Sha256 => &digest::SHA256,
            Self::Sha384 => &digest::SHA384,
        };
        digest::digest(algorithm, data).as_ref().to_vec()
    }
}

impl fmt::Display for DigestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sha1 => write!(f, "SHA1"),
            Self::Sha256 => write!(f, "SHA256"),
            Self::Sha384 => write!(f, "SHA384"),
        }
    }
}

/// Owner name in canonical wire form: lowercased labels, root terminated
pub fn canonical_name(name: &Name) -> Vec<u8> {
    let mut wire = Vec::with_capacity(name.len() + 1);
    for label in name.to_lowercase().iter() {
        wire.push(label.len() as u8);
        wire.extend_from_slice(label);
    }
    wire.push(0);
    wire
}

/// DNSKEY flags field reassembled from the key's flag accessors
pub fn dnskey_flags(key: &DNSKEY) -> u16 {
    let mut flags = 0;
    if key.zone_key() {
        flags |= FLAG_ZONE_KEY;
    }
    if key.revoke() {
        flags |= FLAG_REVOKE;
    }
    if key.secure_entry_point() {
        flags |= FLAG_SECURE_ENTRY_POINT;
    }
    flags
}

/// DNSKEY RDATA in wire form (flags | protocol | algorithm | public key)
pub fn dnskey_rdata(key: &DNSKEY) -> Vec<u8> {
    let public_key = key.public_key();
    let mut rdata = Vec::with_capacity(4 + public_key.len());
    rdata.extend_from_slice(&dnskey_flags(key).to_be_bytes());
    rdata.push(DNSKEY_PROTOCOL);
    rdata.push(u8::from(key.algorithm()));
    rdata.extend_from_slice(public_key);
    rdata
}

/// DS digest of `key` owned by `owner` (RFC 4034 section 5.1.4)
pub fn ds_digest(owner: &Name, key: &DNSKEY, digest_type: DigestType) -> Vec<u8> {
    let mut data = canonical_name(owner);
    data.extend_from_slice(&dnskey_rdata(key));
    digest_type.digest(&data)
}
