//! Shared fixtures: a locally signed DNS hierarchy served by an in-process upstream, plus a few
//! misbehaving upstreams.

#![allow(dead_code)] // Each test file uses a different subset

use async_trait::async_trait;
use bifrost::dnssec::digest::{DigestType, ds_digest};
use bifrost::dnssec::{TrustAnchor, TrustAnchorSet};
use bifrost::error::{ResolveError, Result};
use bifrost::message::Message;
use bifrost::proxy::Proxy;
use chrono::{DateTime, Utc};
use hickory_proto::op::{Message as WireMessage, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::dnssec::rdata::{DNSKEY, DNSSECRData, DS, NSEC3, RRSIG};
use hickory_proto::rr::dnssec::{Algorithm, DigestType as WireDigestType, Nsec3HashAlgorithm, tbs};
use hickory_proto::rr::rdata::{A, TXT};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};
use parking_lot::Mutex;
use ring::signature::{Ed25519KeyPair, KeyPair};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const INCEPTION: u32 = 1_700_000_000;
pub const EXPIRATION: u32 = 1_800_000_000;
pub const TTL: u32 = 3600;

/// An instant inside every fixture signature's validity window
pub fn now() -> DateTime<Utc> {
    DateTime::from_timestamp(1_750_000_000, 0).unwrap()
}

pub fn name(s: &str) -> Name {
    Name::from_ascii(s).unwrap()
}

/// A zone signing key. One key per zone acts as both KSK and ZSK.
pub struct ZoneKey {
    pair: Ed25519KeyPair,
    pub dnskey: DNSKEY,
}

impl ZoneKey {
    /// Deterministic key derived from `label`
    pub fn derive(label: &str) -> Self {
        let seed = ring::digest::digest(&ring::digest::SHA256, label.as_bytes());
        let pair = Ed25519KeyPair::from_seed_unchecked(seed.as_ref()).unwrap();
        let dnskey = DNSKEY::new(
            true,
            true,
            false,
            Algorithm::ED25519,
            pair.public_key().as_ref().to_vec(),
        );
        Self { pair, dnskey }
    }

    pub fn key_tag(&self) -> u16 {
        self.dnskey.calculate_key_tag().unwrap()
    }

    pub fn record(&self, zone: &Name) -> Record {
        Record::from_rdata(
            zone.clone(),
            TTL,
            RData::DNSSEC(DNSSECRData::DNSKEY(self.dnskey.clone())),
        )
    }

    /// RRSIG over `rrset` (all records share owner and type) with `signer` as signer name
    pub fn sign(&self, rrset: &[Record], signer: &Name) -> Record {
        self.sign_within(rrset, signer, INCEPTION, EXPIRATION)
    }

    pub fn sign_within(
        &self,
        rrset: &[Record],
        signer: &Name,
        inception: u32,
        expiration: u32,
    ) -> Record {
        let owner = rrset[0].name().clone();
        let covered = rrset[0].record_type();
        let make = |signature: Vec<u8>| {
            RRSIG::new(
                covered,
                Algorithm::ED25519,
                owner.num_labels(),
                TTL,
                expiration,
                inception,
                self.key_tag(),
                signer.clone(),
                signature,
            )
        };

        let tbs = tbs::rrset_tbs_with_sig(&owner, DNSClass::IN, &make(Vec::new()), rrset).unwrap();
        let signature = self.pair.sign(tbs.as_ref()).as_ref().to_vec();

        rrsig_record(&owner, make(signature))
    }

    /// Trust anchor describing this key as the root KSK
    pub fn anchor(&self) -> TrustAnchor {
        TrustAnchor {
            key_tag: self.key_tag(),
            algorithm: u8::from(Algorithm::ED25519),
            digest_type: 2,
            digest: hex::encode(ds_digest(&Name::root(), &self.dnskey, DigestType::Sha256)),
            valid_from: DateTime::<Utc>::UNIX_EPOCH,
            valid_until: None,
        }
    }

    /// DS record for this key published at `zone`
    pub fn ds(&self, zone: &Name) -> Record {
        let digest = ds_digest(zone, &self.dnskey, DigestType::Sha256);
        ds_record(zone, self.key_tag(), digest)
    }
}

pub fn rrsig_record(owner: &Name, sig: RRSIG) -> Record {
    Record::from_rdata(owner.clone(), TTL, RData::DNSSEC(DNSSECRData::RRSIG(sig)))
}

pub fn ds_record(zone: &Name, key_tag: u16, digest: Vec<u8>) -> Record {
    let ds = DS::new(key_tag, Algorithm::ED25519, WireDigestType::SHA256, digest);
    Record::from_rdata(zone.clone(), TTL, RData::DNSSEC(DNSSECRData::DS(ds)))
}

pub fn a_record(owner: &Name, ip: Ipv4Addr) -> Record {
    Record::from_rdata(owner.clone(), TTL, RData::A(A(ip)))
}

pub fn txt_record(owner: &Name, text: &str) -> Record {
    Record::from_rdata(owner.clone(), TTL, RData::TXT(TXT::new(vec![text.to_string()])))
}

/// Answer and authority sections served for one question
#[derive(Clone, Default)]
pub struct Answer {
    pub answers: Vec<Record>,
    pub authorities: Vec<Record>,
}

/// Faults injected into a delegation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    None,
    /// DNSKEY RRSIG with a corrupted signature
    BadDnskeySignature,
    /// DS digest that matches no key, correctly signed by the parent
    WrongDsDigest,
    /// DS signed by a key the parent does not publish
    BadDsSignature,
    /// No DS and no denial proof
    MissingDs,
}

/// In-process upstream answering from a table of signed records.
///
/// Unknown questions get an empty NOERROR answer. Every request is counted.
#[derive(Default)]
pub struct MockUpstream {
    table: Mutex<HashMap<(Name, RecordType), Answer>>,
    failures: Mutex<HashMap<(Name, RecordType), String>>,
    delays: Mutex<HashMap<(Name, RecordType), Duration>>,
    calls: AtomicUsize,
    log: Mutex<Vec<(Name, RecordType)>>,
}

impl MockUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, owner: &Name, record_type: RecordType, answer: Answer) {
        self.table
            .lock()
            .insert((owner.to_lowercase(), record_type), answer);
    }

    /// Make `(owner, record_type)` fail with a transport error
    pub fn fail(&self, owner: &Name, record_type: RecordType) {
        self.failures.lock().insert(
            (owner.to_lowercase(), record_type),
            format!("connection reset fetching {} {}", owner, record_type),
        );
    }

    /// Hold the answer to `(owner, record_type)` back for `delay`
    pub fn delay(&self, owner: &Name, record_type: RecordType, delay: Duration) {
        self.delays
            .lock()
            .insert((owner.to_lowercase(), record_type), delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, owner: &str, record_type: RecordType) -> usize {
        let owner = name(owner).to_lowercase();
        self.log
            .lock()
            .iter()
            .filter(|(n, t)| *n == owner && *t == record_type)
            .count()
    }
}

#[async_trait]
impl Proxy for MockUpstream {
    async fn proxy(&self, request: Message) -> Result<Message> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = (request.name().to_lowercase(), request.record_type());
        self.log.lock().push(key.clone());

        if let Some(reason) = self.failures.lock().get(&key) {
            return Err(ResolveError::Transport(reason.clone()));
        }

        let delay = self.delays.lock().get(&key).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let answer = self.table.lock().get(&key).cloned().unwrap_or_default();
        // Serve what a real upstream would: the decoded wire form
        Message::from_wire(&response_to(&request, answer).to_wire()?)
    }
}

/// Build a response to `request` the way a recursive resolver would
pub fn response_to(request: &Message, answer: Answer) -> Message {
    let mut wire = WireMessage::new();
    wire.set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .set_recursion_available(true)
        .set_response_code(ResponseCode::NoError)
        .add_query(request.question().clone());
    wire.add_answers(answer.answers);
    wire.add_name_servers(answer.authorities);
    Message::from_inner(wire).unwrap()
}

/// A signed hierarchy rooted at a locally generated root key
pub struct Hierarchy {
    pub upstream: Arc<MockUpstream>,
    keys: HashMap<Name, ZoneKey>,
}

impl Hierarchy {
    pub fn new() -> Self {
        let hierarchy = Self {
            upstream: Arc::new(MockUpstream::new()),
            keys: HashMap::new(),
        };
        hierarchy.with_root()
    }

    fn with_root(mut self) -> Self {
        let root = Name::root();
        let key = ZoneKey::derive(".");
        self.publish_dnskey(&root, &key, Fault::None);
        self.keys.insert(root, key);
        self
    }

    /// The hierarchy used by most tests: `google.`, `dns.google.`, `fr.`, `icourrier.fr.`,
    /// with `dns.google. A` and `_dmarc.icourrier.fr. TXT` signed
    pub fn standard() -> Self {
        let mut hierarchy = Self::new();
        hierarchy.add_zone("google.", Fault::None);
        hierarchy.add_zone("dns.google.", Fault::None);
        hierarchy.add_zone("fr.", Fault::None);
        hierarchy.add_zone("icourrier.fr.", Fault::None);
        hierarchy.add_signed(
            "dns.google.",
            "dns.google.",
            vec![
                a_record(&name("dns.google."), Ipv4Addr::new(8, 8, 8, 8)),
                a_record(&name("dns.google."), Ipv4Addr::new(8, 8, 4, 4)),
            ],
        );
        hierarchy.add_signed(
            "_dmarc.icourrier.fr.",
            "icourrier.fr.",
            vec![txt_record(
                &name("_dmarc.icourrier.fr."),
                "v=DMARC1; p=none",
            )],
        );
        hierarchy
    }

    pub fn key(&self, zone: &str) -> &ZoneKey {
        &self.keys[&name(zone)]
    }

    pub fn anchors(&self) -> TrustAnchorSet {
        TrustAnchorSet::new(vec![self.key(".").anchor()])
    }

    /// Publish `zone` with its own key and a DS in its parent
    pub fn add_zone(&mut self, zone: &str, fault: Fault) {
        let zone = name(zone);
        let parent = zone.base_name();
        let key = ZoneKey::derive(&zone.to_string());

        self.publish_dnskey(&zone, &key, fault);

        let parent_key = &self.keys[&parent];
        match fault {
            Fault::MissingDs => {}
            Fault::WrongDsDigest => {
                let ds = vec![ds_record(&zone, key.key_tag(), vec![0xab; 32])];
                let rrsig = parent_key.sign(&ds, &parent);
                self.serve(&zone, RecordType::DS, ds, rrsig);
            }
            Fault::BadDsSignature => {
                let ds = vec![key.ds(&zone)];
                let rrsig = ZoneKey::derive("rogue").sign(&ds, &parent);
                self.serve(&zone, RecordType::DS, ds, rrsig);
            }
            Fault::None | Fault::BadDnskeySignature => {
                let ds = vec![key.ds(&zone)];
                let rrsig = parent_key.sign(&ds, &parent);
                self.serve(&zone, RecordType::DS, ds, rrsig);
            }
        }

        self.keys.insert(zone, key);
    }

    /// Publish `zone` with its own key and an NSEC3 proof in the parent that it has no DS.
    /// With `list_ds` the NSEC3 type bitmap claims a DS exists, which breaks the proof.
    pub fn add_insecure_zone(&mut self, zone: &str, list_ds: bool) {
        let zone = name(zone);
        let parent = zone.base_name();
        let key = ZoneKey::derive(&zone.to_string());
        self.publish_dnskey(&zone, &key, Fault::None);

        let hash = nsec3_hash_of(&zone);
        let mut types = vec![RecordType::NS];
        if list_ds {
            types.push(RecordType::DS);
        }
        let nsec3 = vec![nsec3_record(&parent, &hash, &hash_after(&hash), types)];
        let rrsig = self.keys[&parent].sign(&nsec3, &parent);

        let mut authorities = nsec3;
        authorities.push(rrsig);
        self.upstream.set(
            &zone,
            RecordType::DS,
            Answer {
                answers: Vec::new(),
                authorities,
            },
        );

        self.keys.insert(zone, key);
    }

    /// Publish `zone` with its own key while the parent denies the name outright: the NSEC3
    /// records in `proof` are built in the parent zone and each is signed by the parent key.
    /// With `bad_signature` the first record's RRSIG is corrupted.
    pub fn add_denied_zone(&mut self, zone: &str, proof: &[Nsec3Proof], bad_signature: bool) {
        let zone = name(zone);
        let parent = zone.base_name();
        let key = ZoneKey::derive(&zone.to_string());
        self.publish_dnskey(&zone, &key, Fault::None);

        let mut authorities = Vec::new();
        for (index, entry) in proof.iter().enumerate() {
            let record = match entry {
                Nsec3Proof::Matching(target) => {
                    let hash = nsec3_hash_of(&name(target));
                    nsec3_record(
                        &parent,
                        &hash,
                        &hash_after(&hash),
                        vec![RecordType::NS, RecordType::SOA, RecordType::RRSIG],
                    )
                }
                Nsec3Proof::Covering(target) => {
                    let hash = nsec3_hash_of(&name(target));
                    nsec3_record(
                        &parent,
                        &hash_before(&hash),
                        &hash_after(&hash),
                        vec![RecordType::NS],
                    )
                }
            };
            let record = vec![record];
            let mut rrsig = self.keys[&parent].sign(&record, &parent);
            if bad_signature && index == 0 {
                rrsig = corrupt(rrsig);
            }
            authorities.extend(record);
            authorities.push(rrsig);
        }

        self.upstream.set(
            &zone,
            RecordType::DS,
            Answer {
                answers: Vec::new(),
                authorities,
            },
        );

        self.keys.insert(zone, key);
    }

    /// Serve `records` at their owner, signed by the key of `signer_zone`
    pub fn add_signed(&self, owner: &str, signer_zone: &str, records: Vec<Record>) {
        let signer = name(signer_zone);
        let rrsig = self.keys[&signer].sign(&records, &signer);
        let record_type = records[0].record_type();
        self.serve(&name(owner), record_type, records, rrsig);
    }

    /// Serve `records` at their owner with an RRSIG made by `key` under `signer_zone`
    pub fn add_signed_by(&self, owner: &str, signer_zone: &str, key: &ZoneKey, records: Vec<Record>) {
        let rrsig = key.sign(&records, &name(signer_zone));
        let record_type = records[0].record_type();
        self.serve(&name(owner), record_type, records, rrsig);
    }

    pub fn add_unsigned(&self, owner: &str, records: Vec<Record>) {
        let record_type = records[0].record_type();
        self.upstream.set(
            &name(owner),
            record_type,
            Answer {
                answers: records,
                authorities: Vec::new(),
            },
        );
    }

    fn publish_dnskey(&self, zone: &Name, key: &ZoneKey, fault: Fault) {
        let dnskeys = vec![key.record(zone)];
        let mut rrsig = key.sign(&dnskeys, zone);
        if fault == Fault::BadDnskeySignature {
            rrsig = corrupt(rrsig);
        }
        self.serve(zone, RecordType::DNSKEY, dnskeys, rrsig);
    }

    fn serve(&self, owner: &Name, record_type: RecordType, mut records: Vec<Record>, rrsig: Record) {
        records.push(rrsig);
        self.upstream.set(
            owner,
            record_type,
            Answer {
                answers: records,
                authorities: Vec::new(),
            },
        );
    }
}

impl Default for Hierarchy {
    fn default() -> Self {
        Self::new()
    }
}

/// One NSEC3 record of a denial proof
#[derive(Clone, Copy, Debug)]
pub enum Nsec3Proof {
    /// Owner hash equal to the hash of the name
    Matching(&'static str),
    /// Owner and next hash straddling the hash of the name
    Covering(&'static str),
}

const NSEC3_SALT: [u8; 2] = [0xaa, 0xbb];
const NSEC3_ITERATIONS: u16 = 1;

pub fn nsec3_hash_of(target: &Name) -> Vec<u8> {
    bifrost::dnssec::denial::nsec3_hash(target, &NSEC3_SALT, NSEC3_ITERATIONS)
}

/// NSEC3 record in `zone` whose owner carries `owner_hash`
pub fn nsec3_record(zone: &Name, owner_hash: &[u8], next: &[u8], types: Vec<RecordType>) -> Record {
    let label = base32::encode(base32::Alphabet::Rfc4648Hex { padding: false }, owner_hash)
        .to_lowercase();
    let owner = Name::from_ascii(&label)
        .unwrap()
        .append_domain(zone)
        .unwrap();
    let nsec3 = NSEC3::new(
        Nsec3HashAlgorithm::SHA1,
        false,
        NSEC3_ITERATIONS,
        NSEC3_SALT.to_vec(),
        next.to_vec(),
        types,
    );
    Record::from_rdata(owner, TTL, RData::DNSSEC(DNSSECRData::NSEC3(nsec3)))
}

/// The hash one below `hash`, as a big-endian number
pub fn hash_before(hash: &[u8]) -> Vec<u8> {
    let mut out = hash.to_vec();
    for byte in out.iter_mut().rev() {
        let (value, borrow) = byte.overflowing_sub(1);
        *byte = value;
        if !borrow {
            break;
        }
    }
    out
}

/// The hash one above `hash`, as a big-endian number
pub fn hash_after(hash: &[u8]) -> Vec<u8> {
    let mut out = hash.to_vec();
    for byte in out.iter_mut().rev() {
        let (value, carry) = byte.overflowing_add(1);
        *byte = value;
        if !carry {
            break;
        }
    }
    out
}

/// Flip a bit in an RRSIG's signature
fn corrupt(rrsig: Record) -> Record {
    let Some(RData::DNSSEC(DNSSECRData::RRSIG(sig))) = rrsig.data() else {
        panic!("not an RRSIG");
    };
    let mut signature = sig.sig().to_vec();
    signature[0] ^= 0x01;
    let broken = RRSIG::new(
        sig.type_covered(),
        sig.algorithm(),
        sig.num_labels(),
        sig.original_ttl(),
        sig.sig_expiration(),
        sig.sig_inception(),
        sig.key_tag(),
        sig.signer_name().clone(),
        signature,
    );
    rrsig_record(rrsig.name(), broken)
}

/// Upstream that always fails
pub struct FailingUpstream {
    pub reason: String,
    pub calls: AtomicUsize,
}

impl FailingUpstream {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Proxy for FailingUpstream {
    async fn proxy(&self, _request: Message) -> Result<Message> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ResolveError::Transport(self.reason.clone()))
    }
}

/// Upstream answering every question with a fixed record set
pub struct StaticUpstream {
    answers: Vec<Record>,
    pub calls: AtomicUsize,
}

impl StaticUpstream {
    pub fn new(answers: Vec<Record>) -> Self {
        Self {
            answers,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Proxy for StaticUpstream {
    async fn proxy(&self, request: Message) -> Result<Message> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let answers = self
            .answers
            .iter()
            .filter(|r| r.name() == request.name())
            .cloned()
            .collect();
        Ok(response_to(
            &request,
            Answer {
                answers,
                authorities: Vec::new(),
            },
        ))
    }
}
