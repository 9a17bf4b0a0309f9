use super::digest::{DigestType, dnskey_flags, ds_digest};
use chrono::{DateTime, Utc};
use hickory_proto::rr::Name;
use hickory_proto::rr::dnssec::rdata::DNSKEY;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::trace;

/// DNSKEY flags expected on a root key-signing key (zone key + SEP)
pub const KSK_FLAGS: u16 = 257;

/// A root trust anchor in the IANA `root-anchors.xml` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustAnchor {
    pub key_tag: u16,
    pub algorithm: u8,
    pub digest_type: u8,
    /// Hex encoded digest
    pub digest: String,
    pub valid_from: DateTime<Utc>,
    /// Open ended when absent
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl TrustAnchor {
    /// Whether the anchor is in force at `at`
    pub fn is_valid_at(&self, at: DateTime<Utc>) -> bool {
        if at < self.valid_from {
            return false;
        }
        match self.valid_until {
            Some(until) => at <= until,
            None => true,
        }
    }

    /// Whether `key`, owned by the root, is the key this anchor describes
    pub fn matches(&self, key: &DNSKEY) -> bool {
        let Ok(key_tag) = key.calculate_key_tag() else {
            return false;
        };
        if key_tag != self.key_tag
            || u8::from(key.algorithm()) != self.algorithm
            || dnskey_flags(key) != KSK_FLAGS
        {
            return false;
        }

        // the digest covers the protocol field
        let Some(digest_type) = DigestType::from_u8(self.digest_type) else {
            trace!("trust anchor {} uses unsupported digest type {}", self.key_tag, self.digest_type);
            return false;
        };
        let Ok(expected) = hex::decode(&self.digest) else {
            return false;
        };

        ds_digest(&Name::root(), key, digest_type) == expected
    }
}

/// Immutable set of root trust anchors
#[derive(Debug, Clone)]
pub struct TrustAnchorSet {
    anchors: Arc<[TrustAnchor]>,
}

impl TrustAnchorSet {
    pub fn new(anchors: Vec<TrustAnchor>) -> Self {
        Self {
            anchors: anchors.into(),
        }
    }

    /// The IANA root KSKs (KSK-2017 and KSK-2024)
    pub fn iana_root() -> Self {
        let from_2017 = DateTime::parse_from_rfc3339("2017-02-02T00:00:00+00:00")
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_default();
        let from_2024 = DateTime::parse_from_rfc3339("2024-07-18T00:00:00+00:00")
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_default();

        Self::new(vec![
            TrustAnchor {
                key_tag: 20326,
                algorithm: 8,
                digest_type: 2,
                digest: "E06D44B80B8F1D39A95C0B0D7C65D08458E880409BBC683457104237C7F8EC8D"
                    .to_string(),
                valid_from: from_2017,
                valid_until: None,
            },
            TrustAnchor {
                key_tag: 38696,
                algorithm: 8,
                digest_type: 2,
                digest: "683D2D0ACB8C9B712A1948B27F741219298D0A450D612C483AF444A4C0FB2B16"
                    .to_string(),
                valid_from: from_2024,
                valid_until: None,
            },
        ])
    }

    /// Anchors in force at `at`
    pub fn valid_at(&self, at: DateTime<Utc>) -> impl Iterator<Item = &TrustAnchor> {
        self.anchors.iter().filter(move |a| a.is_valid_at(at))
    }

    /// Whether any anchor in force at `at` matches `key`
    pub fn matches(&self, key: &DNSKEY, at: DateTime<Utc>) -> bool {
        self.valid_at(at).any(|anchor| anchor.matches(key))
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

impl Default for TrustAnchorSet {
    fn default() -> Self {
        Self::iana_root()
    }
}
