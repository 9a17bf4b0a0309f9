//! Typed view over a wire-format DNS message.
//!
//! Encoding and decoding is delegated to `hickory-proto`; this module only exposes the pieces the
//! resolution chain inspects (question, answer and authority sections, DNSSEC record kinds) and the
//! cache key scheme shared by the in-memory cache and the persistent store.

use crate::error::{ResolveError, Result};
use hickory_proto::op::{Edns, Message as WireMessage, MessageType, OpCode, Query};
use hickory_proto::rr::dnssec::rdata::{DNSSECRData, DNSKEY, DS, NSEC3, RRSIG};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use std::fmt;
use std::str::FromStr;

/// EDNS0 payload size advertised on every query
pub const EDNS_PAYLOAD_SIZE: u16 = 4096;

/// TTL applied to answers without records (NODATA/NXDOMAIN)
pub const DEFAULT_EMPTY_TTL: u32 = 300;

/// A DNS message with exactly one question
#[derive(Debug, Clone)]
pub struct Message {
    inner: WireMessage,
}

impl Message {
    /// Build a recursive query with the DO bit set and a random transaction id
    pub fn query(name: Name, record_type: RecordType) -> Self {
        let mut name = name;
        name.set_fqdn(true);

        let mut edns = Edns::new();
        edns.set_max_payload(EDNS_PAYLOAD_SIZE);
        edns.set_dnssec_ok(true);

        let mut inner = WireMessage::new();
        inner
            .set_id(rand::random::<u16>())
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(true)
            .add_query(Query::query(name, record_type));
        inner.set_edns(edns);

        Self { inner }
    }

    /// Parse a query name and build a query for it
    pub fn query_str(name: &str, record_type: RecordType) -> Result<Self> {
        let name = Name::from_ascii(name)
            .map_err(|e| ResolveError::Protocol(format!("invalid name {}: {}", name, e)))?;
        Ok(Self::query(name, record_type))
    }

    /// Decode a wire-format message
    pub fn from_wire(bytes: &[u8]) -> Result<Self> {
        let inner = WireMessage::from_vec(bytes)?;
        Self::from_inner(inner)
    }

    /// Wrap a decoded message, rejecting anything without exactly one question
    pub fn from_inner(inner: WireMessage) -> Result<Self> {
        if inner.queries().len() != 1 {
            return Err(ResolveError::Protocol(format!(
                "expected exactly one question, got {}",
                inner.queries().len()
            )));
        }
        Ok(Self { inner })
    }

    pub fn to_wire(&self) -> Result<Vec<u8>> {
        Ok(self.inner.to_vec()?)
    }

    pub fn inner(&self) -> &WireMessage {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut WireMessage {
        &mut self.inner
    }

    pub fn into_inner(self) -> WireMessage {
        self.inner
    }

    pub fn id(&self) -> u16 {
        self.inner.id()
    }

    pub fn set_id(&mut self, id: u16) {
        self.inner.set_id(id);
    }

    pub fn question(&self) -> &Query {
        // from_inner and query() both guarantee a single question
        &self.inner.queries()[0]
    }

    pub fn name(&self) -> &Name {
        self.question().name()
    }

    pub fn record_type(&self) -> RecordType {
        self.question().query_type()
    }

    pub fn answers(&self) -> &[Record] {
        self.inner.answers()
    }

    pub fn authorities(&self) -> &[Record] {
        self.inner.name_servers()
    }

    pub fn recursion_available(&self) -> bool {
        self.inner.recursion_available()
    }

    pub fn checking_disabled(&self) -> bool {
        self.inner.checking_disabled()
    }

    pub fn truncated(&self) -> bool {
        self.inner.truncated()
    }

    /// Whether the answer section carries at least one RRSIG
    pub fn has_rrsig(&self) -> bool {
        self.answers()
            .iter()
            .any(|r| r.record_type() == RecordType::RRSIG)
    }

    /// Answer records of a given type, excluding their signatures
    pub fn answers_of(&self, record_type: RecordType) -> impl Iterator<Item = &Record> {
        self.answers()
            .iter()
            .filter(move |r| r.record_type() == record_type)
    }

    /// RRSIG records from the answer section with their owner record
    pub fn answer_rrsigs(&self) -> impl Iterator<Item = (&Record, &RRSIG)> {
        signatures(self.answers())
    }

    /// RRSIG records from the authority section with their owner record
    pub fn authority_rrsigs(&self) -> impl Iterator<Item = (&Record, &RRSIG)> {
        signatures(self.authorities())
    }

    pub fn dnskeys(&self) -> Vec<&DNSKEY> {
        self.answers()
            .iter()
            .filter_map(|r| match r.data() {
                Some(RData::DNSSEC(DNSSECRData::DNSKEY(key))) => Some(key),
                _ => None,
            })
            .collect()
    }

    /// DNSKEY records whose computed key tag equals `key_tag`
    pub fn dnskeys_by_tag(&self, key_tag: u16) -> Vec<&DNSKEY> {
        self.dnskeys()
            .into_iter()
            .filter(|key| key.calculate_key_tag().ok() == Some(key_tag))
            .collect()
    }

    pub fn ds(&self) -> Vec<&DS> {
        self.answers()
            .iter()
            .filter_map(|r| match r.data() {
                Some(RData::DNSSEC(DNSSECRData::DS(ds))) => Some(ds),
                _ => None,
            })
            .collect()
    }

    /// NSEC3 records from the authority section with their owner record
    pub fn nsec3(&self) -> Vec<(&Record, &NSEC3)> {
        self.authorities()
            .iter()
            .filter_map(|r| match r.data() {
                Some(RData::DNSSEC(DNSSECRData::NSEC3(nsec3))) => Some((r, nsec3)),
                _ => None,
            })
            .collect()
    }

    /// Smallest TTL across the answer section
    pub fn min_answer_ttl(&self) -> Option<u32> {
        self.answers().iter().map(|r| r.ttl()).min()
    }

    /// TTL used when caching this message
    pub fn cache_ttl(&self) -> u32 {
        self.min_answer_ttl().unwrap_or(DEFAULT_EMPTY_TTL)
    }

    pub fn cache_key(&self) -> CacheKey {
        let q = self.question();
        CacheKey::new(q.name(), q.query_type(), q.query_class())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (id {}, {} answers)",
            self.name(),
            self.record_type(),
            self.id(),
            self.answers().len()
        )
    }
}

fn signatures(records: &[Record]) -> impl Iterator<Item = (&Record, &RRSIG)> {
    records.iter().filter_map(|r| match r.data() {
        Some(RData::DNSSEC(DNSSECRData::RRSIG(sig))) => Some((r, sig)),
        _ => None,
    })
}

/// `"name/type/class"` key shared by the cache and the persistent store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(name: &Name, record_type: RecordType, class: DNSClass) -> Self {
        let mut name = name.to_lowercase();
        name.set_fqdn(true);
        Self(format!("{}/{}/{}", name, record_type, class))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split the key back into its question parts
    pub fn parse(key: &str) -> Option<(Name, RecordType, DNSClass)> {
        let mut parts = key.rsplitn(3, '/');
        let class = DNSClass::from_str(parts.next()?).ok()?;
        let record_type = RecordType::from_str(parts.next()?).ok()?;
        let name = Name::from_ascii(parts.next()?).ok()?;
        Some((name, record_type, class))
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<CacheKey> for String {
    fn from(key: CacheKey) -> Self {
        key.0
    }
}
