use super::denial;
use super::digest::{DigestType, ds_digest};
use super::errors::DnsSecError;
use super::rrsig;
use super::trust_anchor::TrustAnchorSet;
use crate::error::{ResolveError, Result};
use crate::message::Message;
use crate::proxy::{AsyncResolver, PendingResponse};
use chrono::{DateTime, Utc};
use hickory_proto::rr::dnssec::rdata::{DNSKEY, RRSIG};
use hickory_proto::rr::{Name, RecordType};
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, trace, warn};

/// Zone path from the root down to an owner name. Real names rarely exceed this depth.
type ZonePath = SmallVec<[Name; 8]>;

/// Outcome of a single zone step: either a chain failure or a transport error from phase 1
enum Failure {
    Chain(DnsSecError),
    Resolve(ResolveError),
}

impl From<DnsSecError> for Failure {
    fn from(err: DnsSecError) -> Self {
        Failure::Chain(err)
    }
}

impl From<ResolveError> for Failure {
    fn from(err: ResolveError) -> Self {
        Failure::Resolve(err)
    }
}

/// Pending DNSKEY and DS lookups for one zone of the path
struct ZoneQueries {
    zone: Name,
    dnskey: PendingResponse,
    ds: Option<PendingResponse>,
}

/// A zone whose DNSKEY RRset has been proven trusted
struct TrustedZone {
    zone: Name,
    dnskey_response: Message,
}

impl TrustedZone {
    fn keys(&self) -> Vec<&DNSKEY> {
        self.dnskey_response.dnskeys()
    }
}

/// DNSSEC chain-of-trust validator.
///
/// Proves that an answer's RRSIG is transitively trusted from the root trust anchors down to the
/// owner name. Key material is fetched through `resolver`, usually the cached pool beneath the
/// DNSSEC layer, so repeated validations of the same path are served from the cache.
pub struct DnssecValidator {
    resolver: AsyncResolver,
    anchors: TrustAnchorSet,
    trace: bool,
    fixed_time: Option<DateTime<Utc>>,
}

impl DnssecValidator {
    pub fn new(resolver: AsyncResolver, anchors: TrustAnchorSet) -> Self {
        Self {
            resolver,
            anchors,
            trace: false,
            fixed_time: None,
        }
    }

    /// Log every chain step at debug level instead of trace
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// Pin the verification instant (signature windows and anchor validity)
    pub fn with_time(mut self, at: DateTime<Utc>) -> Self {
        self.fixed_time = Some(at);
        self
    }

    fn step(&self, args: fmt::Arguments<'_>) {
        if self.trace {
            debug!("{}", args);
        } else {
            trace!("{}", args);
        }
    }

    /// Validate the signed answer in `answer`.
    ///
    /// Chain failures are returned as `ResolveError::Validation` carrying the unvalidated answer.
    /// Failures while fetching key material abort the walk immediately and are returned as
    /// `ResolveError::KeyFetch`, also carrying the answer.
    pub async fn verify(&self, answer: &Message) -> Result<()> {
        // one instant for the whole walk
        let now = self.fixed_time.unwrap_or_else(Utc::now);

        let Some((owner, sig)) = target_signature(answer) else {
            return Err(ResolveError::Unsigned {
                name: answer.name().to_string(),
                message: Box::new(answer.clone()),
            });
        };

        match self.walk(answer, &owner, sig, now).await {
            Ok(()) => {
                self.step(format_args!("{} validated", owner));
                Ok(())
            }
            Err(Failure::Chain(source)) => {
                warn!("DNSSEC validation of {} failed: {}", owner, source);
                Err(ResolveError::Validation {
                    source,
                    message: Box::new(answer.clone()),
                })
            }
            Err(Failure::Resolve(e)) => {
                warn!("DNSSEC key fetch for {} failed: {}", owner, e);
                Err(ResolveError::KeyFetch {
                    source: Box::new(e),
                    message: Box::new(answer.clone()),
                })
            }
        }
    }

    async fn walk(
        &self,
        answer: &Message,
        owner: &Name,
        sig: &RRSIG,
        now: DateTime<Utc>,
    ) -> std::result::Result<(), Failure> {
        let now_secs = now.timestamp() as u32;

        // Phase 1: submit every lookup up front, root first
        let mut queue = self.submit_path(owner);

        // Phase 2: drain strictly in submission order
        let mut trusted: Vec<TrustedZone> = Vec::with_capacity(queue.len());
        while let Some(pending) = queue.pop_front() {
            let dnskey_response = pending.dnskey.result().await?;
            let ds_response = match pending.ds {
                Some(ds) => Some(ds.result().await?),
                None => None,
            };

            let parent = trusted.last();
            let has_keys = self.verify_zone(
                &pending.zone,
                &dnskey_response,
                ds_response.as_ref(),
                parent,
                now,
                now_secs,
            )?;

            if has_keys {
                trusted.push(TrustedZone {
                    zone: pending.zone,
                    dnskey_response,
                });
            }
        }

        // Termination: the owner's own keys first, then the carried parent key sets
        let rrset = rrsig::rrset(answer.answers(), owner, sig.type_covered());
        for zone in trusted.iter().rev() {
            let keys = zone.keys();
            match rrsig::verify_with_keys(owner, sig, &rrset, &keys, now_secs) {
                Ok(_) => {
                    self.step(format_args!(
                        "answer {} {} verified with key {} of {}",
                        owner,
                        sig.type_covered(),
                        sig.key_tag(),
                        zone.zone
                    ));
                    return Ok(());
                }
                Err(reason) => self.step(format_args!("{}: {}", zone.zone, reason)),
            }
        }

        Err(DnsSecError::NoMatchingKey {
            zone: owner.to_string(),
            key_tag: sig.key_tag(),
        }
        .into())
    }

    fn submit_path(&self, owner: &Name) -> VecDeque<ZoneQueries> {
        let zones = zone_path(owner);
        let mut queue = VecDeque::with_capacity(zones.len());
        for zone in zones {
            let dnskey = self
                .resolver
                .submit(Message::query(zone.clone(), RecordType::DNSKEY));
            let ds = (!zone.is_root())
                .then(|| self.resolver.submit(Message::query(zone.clone(), RecordType::DS)));
            queue.push_back(ZoneQueries { zone, dnskey, ds });
        }
        queue
    }

    /// Verify one zone of the path. Returns whether the zone published a DNSKEY RRset.
    fn verify_zone(
        &self,
        zone: &Name,
        dnskey_response: &Message,
        ds_response: Option<&Message>,
        parent: Option<&TrustedZone>,
        now: DateTime<Utc>,
        now_secs: u32,
    ) -> std::result::Result<bool, DnsSecError> {
        let keys = dnskey_response.dnskeys();
        if keys.is_empty() {
            self.step(format_args!("zone: {} : no DNSKEY, skipping", zone));
            return Ok(false);
        }

        // DNSKEY RRset must be self-signed before anything else about the zone is believed
        let signers = rrsig::verify_section(
            dnskey_response.answers(),
            zone,
            RecordType::DNSKEY,
            &keys,
            now_secs,
        )
        .map_err(|reason| DnsSecError::InvalidDnskeySignature {
            zone: zone.to_string(),
            reason,
        })?;
        self.step(format_args!(
            "zone: {} : DNSKEY RRset verified ({} keys)",
            zone,
            keys.len()
        ));

        if zone.is_root() {
            if !signers.iter().any(|key| self.anchors.matches(key, now)) {
                return Err(DnsSecError::TrustAnchorMismatch {
                    zone: zone.to_string(),
                });
            }
            self.step(format_args!("zone: . : trust anchor matched"));
            return Ok(true);
        }

        let parent_keys = parent.map(TrustedZone::keys).unwrap_or_default();
        let Some(ds_response) = ds_response else {
            return Err(DnsSecError::NoDsRecord {
                zone: zone.to_string(),
            });
        };

        let ds_records = ds_response.ds();
        if ds_records.is_empty() {
            if ds_response.nsec3().is_empty() {
                return Err(DnsSecError::NoDsRecord {
                    zone: zone.to_string(),
                });
            }
            denial::verify_ds_denial(ds_response, zone, &parent_keys, now_secs)?;
            return Ok(true);
        }

        rrsig::verify_section(
            ds_response.answers(),
            zone,
            RecordType::DS,
            &parent_keys,
            now_secs,
        )
        .map_err(|reason| DnsSecError::InvalidDsSignature {
            zone: zone.to_string(),
            reason,
        })?;

        let delegated = ds_records.iter().any(|ds| {
            let Some(digest_type) = DigestType::from_u8(u8::from(ds.digest_type())) else {
                return false;
            };
            signers.iter().any(|key| {
                key.calculate_key_tag().ok() == Some(ds.key_tag())
                    && key.algorithm() == ds.algorithm()
                    && ds_digest(zone, key, digest_type) == ds.digest()
            })
        });
        if !delegated {
            return Err(DnsSecError::DsDigestMismatch {
                zone: zone.to_string(),
            });
        }
        self.step(format_args!("zone: {} : DS digest matched", zone));

        Ok(true)
    }
}

/// Zones from the root down to `owner`, inclusive
pub fn zone_path(owner: &Name) -> ZonePath {
    let depth = owner.iter().count();
    (0..=depth).map(|labels| owner.trim_to(labels)).collect()
}

/// The answer RRSIG to validate and its owner: the one covering the question type, otherwise
/// the first one present
fn target_signature(answer: &Message) -> Option<(Name, &RRSIG)> {
    let qtype = answer.record_type();
    answer
        .answer_rrsigs()
        .find(|(_, sig)| sig.type_covered() == qtype)
        .or_else(|| answer.answer_rrsigs().next())
        .map(|(record, sig)| (record.name().clone(), sig))
}
